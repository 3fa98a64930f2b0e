//! Versioned key→blob persistence port.

use crate::domain::error::IncrementalError;

/// Key→blob storage with newest-wins retrieval.
///
/// `store` overwrites: after it returns, `load` of the same key yields the
/// new payload and nothing older. `load` of a key that was never stored is
/// `Ok(None)`; only transport or I/O failures are errors.
pub trait PersistStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), IncrementalError>;

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, IncrementalError>;

    /// Release backend resources. Safe to call more than once.
    fn close(&self) -> Result<(), IncrementalError> {
        Ok(())
    }
}
