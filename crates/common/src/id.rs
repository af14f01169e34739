//! ID generation utilities.

use std::fmt;
use std::sync::{Arc, Mutex};

use ulid::{Generator, Ulid};

use crate::{AppError, AppResult};

/// ID generator for entities.
///
/// Clones share the same underlying generator, so every ID handed out by a
/// generator and its clones is strictly greater than the previous one.
#[derive(Clone)]
pub struct IdGenerator {
    inner: Arc<Mutex<Generator>>,
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Generator::new())),
        }
    }
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are:
    /// - Lexicographically sortable
    /// - Monotonically increasing within the same millisecond (the random
    ///   component is incremented instead of redrawn)
    /// - Shorter than UUIDs when represented as strings
    pub fn generate(&self) -> AppResult<String> {
        let mut generator = self
            .inner
            .lock()
            .map_err(|_| AppError::Internal("ID generator lock poisoned".to_string()))?;

        generator
            .generate()
            .map(|ulid| ulid.to_string().to_lowercase())
            .map_err(|e| AppError::Internal(format!("Failed to generate ID: {e}")))
    }

    /// Generate an ID strictly greater than `floor`.
    ///
    /// Used when IDs handed out by other processes may run ahead of this
    /// generator's clock. A floor that is not a valid ID is ignored.
    pub fn generate_after(&self, floor: Option<&str>) -> AppResult<String> {
        let id = self.generate()?;
        let Some(floor) = floor.and_then(|f| Ulid::from_string(f).ok()) else {
            return Ok(id);
        };

        if id > floor.to_string().to_lowercase() {
            return Ok(id);
        }

        floor
            .increment()
            .map(|ulid| ulid.to_string().to_lowercase())
            .ok_or_else(|| AppError::Internal("ID space exhausted".to_string()))
    }
}

/// Normalize an ID to its canonical lowercase form.
pub fn normalize_id(id: &str) -> Option<String> {
    Ulid::from_string(id)
        .ok()
        .map(|ulid| ulid.to_string().to_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate().unwrap();
        let id2 = id_gen.generate().unwrap();

        assert_eq!(id1.len(), 26);
        assert_eq!(id2.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_is_strictly_increasing() {
        let id_gen = IdGenerator::new();
        let ids: Vec<String> = (0..1000).map(|_| id_gen.generate().unwrap()).collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_clones_share_sequence() {
        let id_gen = IdGenerator::new();
        let cloned = id_gen.clone();

        let a = id_gen.generate().unwrap();
        let b = cloned.generate().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_debug_does_not_expose_state() {
        let rendered = format!("{:?}", IdGenerator::new());
        assert_eq!(rendered, "IdGenerator { .. }");
    }

    #[test]
    fn test_generate_after_past_floor_uses_clock() {
        let id_gen = IdGenerator::new();
        let old = id_gen.generate().unwrap();

        let id = id_gen.generate_after(Some(&old)).unwrap();
        assert!(id > old);
    }

    #[test]
    fn test_generate_after_future_floor_increments_it() {
        let id_gen = IdGenerator::new();
        // Far-future timestamp, as written by a process with a skewed clock.
        let future = "7zzzzzzzzz0000000000000000";

        let id = id_gen.generate_after(Some(future)).unwrap();
        assert_eq!(id, "7zzzzzzzzz0000000000000001");
    }

    #[test]
    fn test_generate_after_ignores_invalid_floor() {
        let id = IdGenerator::new().generate_after(Some("garbage")).unwrap();
        assert_eq!(id.len(), 26);
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert_eq!(normalize_id("not-an-id"), None);
        assert_eq!(normalize_id(""), None);
    }

    #[test]
    fn test_normalize_id() {
        let id = IdGenerator::new().generate().unwrap();
        assert_eq!(normalize_id(&id.to_uppercase()), Some(id));
        assert_eq!(normalize_id("nope"), None);
    }
}
