// Utility functions and helpers

pub mod crypto;

/// Serde adapter encoding byte vectors as standard base64 strings
pub mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Short hex prefix of a hash for log lines
pub fn short_hash(bytes: &[u8]) -> String {
    let encoded = hex::encode(bytes);
    encoded.chars().take(12).collect()
}
