//! JSON file chain store.
//!
//! The whole chain lives in one document:
//!
//! ```json
//! { "format": "chaintrader-chain", "version": 1, "blocks": [ ... ] }
//! ```
//!
//! Each block serializes as `index`, `timestamp` (RFC 3339, UTC),
//! `name`, `payload`, `previous_hash` and `hash`. Saves write a sibling
//! temp file and rename it over the target.

use crate::domain::chain::Block;
use crate::domain::error::ChaintraderError;
use crate::ports::chain_port::ChainStorePort;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CHAIN_FORMAT: &str = "chaintrader-chain";
pub const CHAIN_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ChainDocumentRef<'a> {
    format: &'a str,
    version: u32,
    blocks: &'a [Block],
}

#[derive(Deserialize)]
struct ChainDocument {
    format: String,
    version: u32,
    blocks: Vec<Block>,
}

pub struct JsonFileChainStore {
    path: PathBuf,
}

impl JsonFileChainStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ChainStorePort for JsonFileChainStore {
    /// A missing file is an empty chain.
    fn load(&self) -> Result<Vec<Block>, ChaintraderError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let doc: ChainDocument = serde_json::from_str(&content)?;
        if doc.format != CHAIN_FORMAT || doc.version != CHAIN_FORMAT_VERSION {
            return Err(ChaintraderError::ChainIntegrity {
                index: 0,
                reason: format!(
                    "unsupported chain file format '{}' version {} in {}",
                    doc.format,
                    doc.version,
                    self.path.display()
                ),
            });
        }
        Ok(doc.blocks)
    }

    fn save(&self, blocks: &[Block]) -> Result<(), ChaintraderError> {
        let doc = ChainDocumentRef {
            format: CHAIN_FORMAT,
            version: CHAIN_FORMAT_VERSION,
            blocks,
        };
        let json = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), blocks = blocks.len(), "saved chain file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::Chain;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileChainStore::new(dir.path().join("chain.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_blocks() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileChainStore::new(dir.path().join("nested").join("chain.json"));

        let mut chain = Chain::new();
        chain.append("RedFoxChef", "[]".to_string());
        store.save(chain.blocks()).unwrap();

        let loaded = Chain::from_blocks(store.load().unwrap());
        assert_eq!(loaded.blocks(), chain.blocks());
        assert!(loaded.verify());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn document_is_versioned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.json");
        let store = JsonFileChainStore::new(&path);
        store.save(Chain::new().blocks()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["format"], CHAIN_FORMAT);
        assert_eq!(raw["version"], CHAIN_FORMAT_VERSION);
        assert_eq!(raw["blocks"][0]["name"], "Genesis Block");
    }

    #[test]
    fn unknown_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(
            &path,
            r#"{"format":"chaintrader-chain","version":99,"blocks":[]}"#,
        )
        .unwrap();
        let result = JsonFileChainStore::new(&path).load();
        assert!(matches!(result, Err(ChaintraderError::ChainIntegrity { .. })));
    }

    #[test]
    fn garbage_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(&path, "not json").unwrap();
        let result = JsonFileChainStore::new(&path).load();
        assert!(matches!(result, Err(ChaintraderError::Serialization(_))));
    }
}
