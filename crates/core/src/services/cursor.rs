//! Opaque pagination cursors.
//!
//! A cursor is the URL-safe base64 encoding (no padding) of the ID of the
//! last post on a page. It carries no other state, so a cursor stays valid
//! for as long as the post it names exists.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use plaza_common::{AppError, AppResult, normalize_id};

/// Encodes and decodes feed cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorCodec;

impl CursorCodec {
    /// Encode a sort key into an opaque cursor.
    #[must_use]
    pub fn encode(sort_key: &str) -> String {
        URL_SAFE_NO_PAD.encode(sort_key.as_bytes())
    }

    /// Decode a cursor back into the sort key it was built from.
    ///
    /// Anything that is not base64 of a well-formed post ID is rejected with
    /// [`AppError::InvalidCursor`].
    pub fn decode(cursor: &str) -> AppResult<String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.trim().trim_end_matches('='))
            .map_err(|_| AppError::InvalidCursor)?;
        let raw = String::from_utf8(bytes).map_err(|_| AppError::InvalidCursor)?;

        normalize_id(&raw).ok_or(AppError::InvalidCursor)
    }

    /// Decode an optional cursor query parameter. A missing or blank value
    /// means "start from the newest post".
    pub fn decode_optional(cursor: Option<&str>) -> AppResult<Option<String>> {
        match cursor.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::decode(value).map(Some),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use plaza_common::IdGenerator;

    #[test]
    fn test_round_trip() {
        let id = IdGenerator::new().generate().unwrap();
        let cursor = CursorCodec::encode(&id);

        assert_ne!(cursor, id);
        assert_eq!(CursorCodec::decode(&cursor).unwrap(), id);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let id = IdGenerator::new().generate().unwrap();
        let cursor = CursorCodec::encode(&id);

        assert!(
            cursor
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            CursorCodec::decode("not-base64!"),
            Err(AppError::InvalidCursor)
        ));
        assert!(matches!(
            CursorCodec::decode("not-base64"),
            Err(AppError::InvalidCursor)
        ));
    }

    #[test]
    fn test_rejects_base64_of_non_id() {
        let cursor = URL_SAFE_NO_PAD.encode("hello world");
        assert!(matches!(
            CursorCodec::decode(&cursor),
            Err(AppError::InvalidCursor)
        ));
    }

    #[test]
    fn test_tampered_cursor_is_rejected() {
        let id = IdGenerator::new().generate().unwrap();
        let mut cursor = CursorCodec::encode(&id);
        cursor.truncate(cursor.len() - 3);

        assert!(CursorCodec::decode(&cursor).is_err());
    }

    #[test]
    fn test_decode_optional_blank_means_start() {
        assert_eq!(CursorCodec::decode_optional(None).unwrap(), None);
        assert_eq!(CursorCodec::decode_optional(Some("   ")).unwrap(), None);
        assert!(CursorCodec::decode_optional(Some("@@@")).is_err());
    }
}
