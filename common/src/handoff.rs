//! Page-scoped key/value hand-off between the capture step and the review form.
//!
//! The capture session stashes the extracted fields once; the form consumes
//! them once and the key is gone afterwards.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::extracted::ExtractedData;

/// Key the extracted fields are stored under.
pub const EXTRACTED_DATA_KEY: &str = "datosExtraidos";

pub trait HandoffStore: Send + Sync {
    fn set_item(&self, key: &str, value: String);
    fn get_item(&self, key: &str) -> Option<String>;
    fn remove_item(&self, key: &str);
}

/// In-process store, lives as long as the capture process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandoffStore for MemoryStore {
    fn set_item(&self, key: &str, value: String) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn remove_item(&self, key: &str) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Serialize `datos` as JSON under [`EXTRACTED_DATA_KEY`].
pub fn stash_extracted(store: &dyn HandoffStore, datos: &ExtractedData) -> Result<(), HandoffError> {
    let json = serde_json::to_string(datos).map_err(HandoffError::Encode)?;
    debug!(bytes = json.len(), key = EXTRACTED_DATA_KEY, "stashing extracted data");
    store.set_item(EXTRACTED_DATA_KEY, json);
    Ok(())
}

/// Read and delete the stashed fields. `Ok(None)` when nothing is stashed.
///
/// The key is removed even when its content does not parse.
pub fn take_extracted(store: &dyn HandoffStore) -> Result<Option<ExtractedData>, HandoffError> {
    let Some(json) = store.get_item(EXTRACTED_DATA_KEY) else {
        return Ok(None);
    };
    store.remove_item(EXTRACTED_DATA_KEY);

    match serde_json::from_str(&json) {
        Ok(datos) => Ok(Some(datos)),
        Err(e) => {
            warn!(error = %e, "stashed extracted data is not valid JSON, discarded");
            Err(HandoffError::Decode(e))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("failed to serialize extracted data: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stashed extracted data is malformed: {0}")]
    Decode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtractedData {
        ExtractedData {
            numero_documento: Some("12345678".into()),
            prenombres: Some("ANA".into()),
            ..Default::default()
        }
    }

    #[test]
    fn take_consumes_exactly_once() {
        let store = MemoryStore::new();
        stash_extracted(&store, &sample()).unwrap();
        assert_eq!(store.len(), 1);

        let first = take_extracted(&store).unwrap();
        assert_eq!(first, Some(sample()));
        assert!(store.is_empty());

        assert_eq!(take_extracted(&store).unwrap(), None);
    }

    #[test]
    fn stored_value_is_plain_json() {
        let store = MemoryStore::new();
        stash_extracted(&store, &sample()).unwrap();
        let raw = store.get_item(EXTRACTED_DATA_KEY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "numeroDocumento": "12345678", "prenombres": "ANA" })
        );
    }

    #[test]
    fn malformed_entry_is_removed() {
        let store = MemoryStore::new();
        store.set_item(EXTRACTED_DATA_KEY, "{not json".into());
        assert!(matches!(take_extracted(&store), Err(HandoffError::Decode(_))));
        assert!(store.get_item(EXTRACTED_DATA_KEY).is_none());
    }
}
