//! There is no authentication tag: a wrong key is only noticed when the
//! padding or the JSON fails to parse.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::{CodecError, DecodeError},
    types::Message,
};

pub const NONCE_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

#[derive(Clone)]
pub struct PasswordKey([u8; KEY_SIZE]);

impl PasswordKey {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordKey([REDACTED])")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

pub fn encrypt(key: &PasswordKey, message: &Message) -> Result<Envelope, CodecError> {
    let mut iv = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut iv).map_err(CodecError::Random)?;

    let cleartext = serde_json::to_vec(message)?;
    let ciphertext = Encryptor::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| CodecError::Cipher)?
        .encrypt_padded_vec_mut::<Pkcs7>(&cleartext);

    Ok(Envelope {
        nonce: Some(STANDARD.encode(iv)),
        payload: Some(STANDARD.encode(ciphertext)),
    })
}

pub fn decrypt(key: &PasswordKey, envelope: &Envelope) -> Result<Message, DecodeError> {
    let nonce = envelope.nonce.as_deref().ok_or(DecodeError::MissingNonce)?;
    let payload = envelope
        .payload
        .as_deref()
        .ok_or(DecodeError::MissingPayload)?;

    let iv = STANDARD.decode(nonce)?;
    if iv.len() != NONCE_SIZE {
        return Err(DecodeError::NonceLength(iv.len()));
    }
    let ciphertext = STANDARD.decode(payload)?;

    let cleartext = Decryptor::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| DecodeError::Padding)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecodeError::Padding)?;

    Ok(serde_json::from_slice(&cleartext)?)
}
