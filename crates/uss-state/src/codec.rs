//! Pluggable encodings for shared state.
//!
//! A [`Codec`] turns the in-memory value into the bytes that are published on
//! commit, and back. The same store machinery can therefore back different
//! schemas with different encodings.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialize/deserialize pair for a state value.
pub trait Codec<T>: Send + Sync {
    /// Encode a value into its published form.
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a published value.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON encoding. Handles every serde feature (untagged enums, skipped fields).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact bincode encoding.
///
/// Only suitable for schemas without `skip_serializing_if` or self-describing
/// types such as `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> Codec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
