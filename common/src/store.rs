use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|source| StoreError::Json {
                    path: self.path.clone(),
                    source,
                }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(&self.path, source)),
        }
    }

    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(parent, source))?;
        }

        let payload = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|source| self.io_error(&tmp, source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(&self.path, source))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        every_s: u64,
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load::<Sample>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_creates_parents_and_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("controller.json");
        let store = ConfigStore::new(&path);

        let first = Sample {
            name: "boiler".to_string(),
            every_s: 30,
        };
        store.save(&first).await.unwrap();
        let second = Sample {
            every_s: 60,
            ..first
        };
        store.save(&second).await.unwrap();

        assert_eq!(store.load::<Sample>().await.unwrap(), Some(second));
        assert!(!dir.path().join("nested").join("controller.json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::new(path).load::<Sample>().await.unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }
}
