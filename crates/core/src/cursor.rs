use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Opaque `(created_at, id)` keyset pagination cursor.
///
/// Encodes as base64-url(JSON) so callers can pass it back verbatim without
/// inspecting its shape; decoding is the only place that cares about the
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    /// `created_at` of the last row on the previous page.
    pub created_at: DateTime<Utc>,
    /// `id` of the last row on the previous page, used as a tiebreaker.
    pub id: Uuid,
}

impl PaginationCursor {
    /// Creates a cursor from a row's `(created_at, id)` pair.
    #[must_use]
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Encodes the cursor as an opaque base64-url string.
    pub fn encode(&self) -> AppResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|error| AppError::Internal(format!("failed to encode cursor: {error}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a cursor previously produced by [`PaginationCursor::encode`].
    pub fn decode(encoded: &str) -> AppResult<Self> {
        if encoded.is_empty() {
            return Err(AppError::Validation(
                "pagination cursor must not be empty".to_owned(),
            ));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|error| AppError::Validation(format!("invalid pagination cursor: {error}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|error| AppError::Validation(format!("invalid pagination cursor: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::PaginationCursor;
    use crate::AppError;

    #[test]
    fn encode_then_decode_round_trips() {
        let cursor = PaginationCursor::new(Utc::now(), Uuid::new_v4());
        let encoded = cursor.encode();
        assert!(encoded.is_ok());
        let encoded = encoded.unwrap_or_default();
        let decoded = PaginationCursor::decode(&encoded);
        assert!(decoded.is_ok());
        assert_eq!(Some(cursor), decoded.ok());
    }

    #[test]
    fn encode_is_stable_across_repeated_calls() {
        let cursor = PaginationCursor::new(Utc::now(), Uuid::new_v4());
        let first = cursor.encode().unwrap_or_default();
        let second = cursor.encode().unwrap_or_default();
        assert_eq!(first, second);
    }

    #[test]
    fn decode_empty_string_errors() {
        let result = PaginationCursor::decode("");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn decode_garbage_errors() {
        let result = PaginationCursor::decode("not-a-valid-cursor!!");
        assert!(result.is_err());
    }
}
