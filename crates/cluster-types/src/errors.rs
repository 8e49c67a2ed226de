//! # Error Types

use thiserror::Error;

/// Failure to turn a raw channel payload into a [`crate::Frame`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON, or does not match any event shape.
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("Payload is not a JSON object")]
    NotAnObject,
}
