use chrono::{DateTime, SecondsFormat, SubsecRound, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ConfigError;

pub fn format_iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_iso8601(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Drops sub-microsecond precision so a timestamp survives the wire unchanged.
pub fn wire_now(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

pub fn hhmm<Z: TimeZone>(now: DateTime<Utc>, zone: &Z) -> i32 {
    let local = now.with_timezone(zone);
    (local.hour() * 100 + local.minute()) as i32
}

pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::Timezone(name.to_string()))
}

pub mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso8601(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso8601(&raw).map_err(D::Error::custom)
    }
}
