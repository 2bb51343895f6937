//! Serde helpers for BSON-specific representations.

/// (De)serialize an optional [`chrono::DateTime`] as an optional BSON datetime,
/// mirroring [`mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime`].
pub mod optional_chrono_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson::{self, serde_helpers::chrono_datetime_as_bson_datetime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(datetime) => chrono_datetime_as_bson_datetime::serialize(datetime, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let datetime = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(datetime.map(bson::DateTime::to_chrono))
    }
}
