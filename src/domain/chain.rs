//! Append-only, hash-linked record of completed runs.
//!
//! Each block stores one run's snapshot sequence as canonical JSON. A
//! block's hash is the SHA-256 of its index, timestamp, name, payload and
//! the previous block's hash, so editing any stored block breaks either its
//! own hash or the link from its successor.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::error::ChaintraderError;
use super::portfolio::PortfolioSnapshot;
use crate::ports::chain_port::ChainStorePort;

pub const GENESIS_NAME: &str = "Genesis Block";
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub payload: String,
    pub previous_hash: String,
    pub hash: String,
}

impl Block {
    pub fn new(
        index: usize,
        timestamp: DateTime<Utc>,
        name: impl Into<String>,
        payload: impl Into<String>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            name: name.into(),
            payload: payload.into(),
            previous_hash: previous_hash.into(),
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The fixed first block of every chain.
    pub fn genesis() -> Self {
        Block::new(0, DateTime::<Utc>::UNIX_EPOCH, GENESIS_NAME, "", GENESIS_PREVIOUS_HASH)
    }

    /// SHA-256 over every field, each prefixed with its byte length so no
    /// field boundary can shift without changing the digest.
    pub fn compute_hash(&self) -> String {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut hasher = Sha256::new();
        hasher.update((self.index as u64).to_le_bytes());
        for field in [
            timestamp.as_str(),
            self.name.as_str(),
            self.payload.as_str(),
            self.previous_hash.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn snapshots(&self) -> Result<Vec<PortfolioSnapshot>, ChaintraderError> {
        if self.payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Chain::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            blocks: vec![Block::genesis()],
        }
    }

    /// Wrap stored blocks as they are. Nothing is repaired; an empty list
    /// starts a fresh chain.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            Chain::new()
        } else {
            Chain { blocks }
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append `payload` under `name`, stamped with the current time.
    pub fn append(&mut self, name: &str, payload: String) -> &Block {
        let previous_hash = self
            .blocks
            .last()
            .map_or_else(|| GENESIS_PREVIOUS_HASH.to_string(), |b| b.hash.clone());
        let block = Block::new(self.blocks.len(), Utc::now(), name, payload, previous_hash);
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    /// Index of the first block whose hash, index or link is wrong.
    pub fn first_invalid_block(&self) -> Option<usize> {
        let genesis = Block::genesis();
        for (i, block) in self.blocks.iter().enumerate() {
            if block.index != i || block.hash != block.compute_hash() {
                return Some(i);
            }
            match i {
                0 if *block != genesis => return Some(0),
                0 => {}
                _ if block.previous_hash != self.blocks[i - 1].hash => return Some(i),
                _ => {}
            }
        }
        None
    }

    pub fn verify(&self) -> bool {
        match self.first_invalid_block() {
            None => true,
            Some(index) => {
                tracing::warn!(index, "chain verification failed");
                false
            }
        }
    }

    pub fn ensure_valid(&self) -> Result<(), ChaintraderError> {
        match self.first_invalid_block() {
            None => Ok(()),
            Some(index) => Err(ChaintraderError::ChainIntegrity {
                index,
                reason: self.describe_fault(index),
            }),
        }
    }

    fn describe_fault(&self, index: usize) -> String {
        let block = &self.blocks[index];
        if block.index != index {
            format!("stored index {} at position {index}", block.index)
        } else if block.hash != block.compute_hash() {
            "hash does not match contents".to_string()
        } else if index == 0 {
            "genesis block altered".to_string()
        } else {
            "previous hash does not match predecessor".to_string()
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(80);
        for block in &self.blocks {
            writeln!(f, "{rule}")?;
            writeln!(f, "Block {}", block.index)?;
            writeln!(f, "{rule}")?;
            writeln!(f, "Backtest: {}", block.name)?;
            writeln!(
                f,
                "Timestamp: {}",
                block.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
            writeln!(f, "Payload: {} bytes", block.payload.len())?;
            writeln!(f, "Hash: {}", block.hash)?;
            writeln!(f, "Previous Hash: {}", block.previous_hash)?;
        }
        writeln!(f, "{rule}")
    }
}

/// A chain bound to its backing store. Every append is flushed before it
/// returns.
pub struct ResultLedger {
    chain: Chain,
    store: Box<dyn ChainStorePort>,
}

impl ResultLedger {
    /// Load the chain from `store`, creating and persisting a genesis-only
    /// chain when the store is empty.
    pub fn open(store: Box<dyn ChainStorePort>) -> Result<Self, ChaintraderError> {
        let blocks = store.load()?;
        let fresh = blocks.is_empty();
        let chain = Chain::from_blocks(blocks);
        if fresh {
            store.save(chain.blocks())?;
            tracing::info!("created new result chain");
        } else {
            tracing::debug!(blocks = chain.len(), "loaded result chain");
        }
        Ok(ResultLedger { chain, store })
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn blocks(&self) -> &[Block] {
        self.chain.blocks()
    }

    pub fn verify(&self) -> bool {
        self.chain.verify()
    }

    /// Append a run's snapshots as a new block and persist the chain.
    ///
    /// Refuses to extend a chain that no longer verifies.
    pub fn append(
        &mut self,
        name: &str,
        snapshots: &[PortfolioSnapshot],
    ) -> Result<Block, ChaintraderError> {
        self.chain.ensure_valid()?;
        let payload = serde_json::to_string(snapshots)?;
        let block = self.chain.append(name, payload).clone();
        if let Err(e) = self.store.save(self.chain.blocks()) {
            self.chain.blocks.pop();
            return Err(e);
        }
        tracing::info!(
            index = block.index,
            name = %block.name,
            hash = %block.hash,
            snapshots = snapshots.len(),
            "appended block"
        );
        Ok(block)
    }
}

const COLORS: [&str; 20] = [
    "Red", "Blue", "Green", "Yellow", "Black", "White", "Purple", "Orange", "Brown", "Grey",
    "Pink", "Violet", "Crimson", "Turquoise", "Gold", "Silver", "Amber", "Magenta", "Teal",
    "Indigo",
];

const ANIMALS: [&str; 20] = [
    "Eagle", "Tiger", "Lion", "Wolf", "Bear", "Falcon", "Shark", "Panther", "Leopard", "Cheetah",
    "Hawk", "Fox", "Owl", "Cobra", "Jaguar", "Horse", "Elephant", "Dolphin", "Gorilla", "Lynx",
];

const PROFESSIONS: [&str; 20] = [
    "Carpenter", "Engineer", "Doctor", "Pilot", "Farmer", "Artist", "Blacksmith", "Chef",
    "Teacher", "Mechanic", "Architect", "Scientist", "Soldier", "Nurse", "Firefighter", "Plumber",
    "Astronaut", "Tailor", "Photographer", "Lawyer",
];

/// A memorable run name such as `TealFoxPilot`.
pub fn random_run_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or_default();
    let animal = ANIMALS.choose(rng).copied().unwrap_or_default();
    let profession = PROFESSIONS.choose(rng).copied().unwrap_or_default();
    format!("{color}{animal}{profession}")
}

pub fn generate_run_name() -> String {
    random_run_name(&mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryStore {
        blocks: Rc<RefCell<Vec<Block>>>,
        saves: Rc<RefCell<usize>>,
    }

    impl ChainStorePort for MemoryStore {
        fn load(&self) -> Result<Vec<Block>, ChaintraderError> {
            Ok(self.blocks.borrow().clone())
        }

        fn save(&self, blocks: &[Block]) -> Result<(), ChaintraderError> {
            *self.blocks.borrow_mut() = blocks.to_vec();
            *self.saves.borrow_mut() += 1;
            Ok(())
        }
    }

    fn snapshot(cash: f64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            cash,
            positions: BTreeMap::new(),
            total_value: cash,
        }
    }

    fn chain_with(payloads: &[&str]) -> Chain {
        let mut chain = Chain::new();
        for (i, p) in payloads.iter().enumerate() {
            chain.append(&format!("run{i}"), p.to_string());
        }
        chain
    }

    #[test]
    fn genesis_is_deterministic() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a, b);
        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn appended_blocks_link_and_verify() {
        let chain = chain_with(&["a", "b", "c"]);
        assert_eq!(chain.len(), 4);
        for i in 1..chain.len() {
            assert_eq!(chain.blocks()[i].previous_hash, chain.blocks()[i - 1].hash);
            assert_eq!(chain.blocks()[i].index, i);
        }
        assert!(chain.verify());
        assert!(chain.ensure_valid().is_ok());
    }

    #[test]
    fn payload_mutation_detected_at_block() {
        let chain = chain_with(&["a", "b", "c"]);
        let mut blocks = chain.blocks().to_vec();
        blocks[2].payload.push('x');
        let tampered = Chain::from_blocks(blocks);

        assert!(!tampered.verify());
        assert_eq!(tampered.first_invalid_block(), Some(2));
        match tampered.ensure_valid() {
            Err(ChaintraderError::ChainIntegrity { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bytes_moved_between_name_and_payload_detected() {
        let mut chain = Chain::new();
        chain.append("RedFoxChef", r#"[{"cash":1}]"#.to_string());
        let mut blocks = chain.blocks().to_vec();
        blocks[1].name = "RedFoxChe".into();
        blocks[1].payload = r#"f[{"cash":1}]"#.into();
        let tampered = Chain::from_blocks(blocks);

        assert!(!tampered.verify());
        assert_eq!(tampered.first_invalid_block(), Some(1));
    }

    #[test]
    fn rehashed_block_breaks_successor_link() {
        let chain = chain_with(&["a", "b", "c"]);
        let mut blocks = chain.blocks().to_vec();
        blocks[1].payload = "forged".into();
        blocks[1].hash = blocks[1].compute_hash();
        let tampered = Chain::from_blocks(blocks);
        assert_eq!(tampered.first_invalid_block(), Some(2));
    }

    #[test]
    fn altered_genesis_detected() {
        let mut blocks = Chain::new().blocks().to_vec();
        blocks[0].name = "Other".into();
        blocks[0].hash = blocks[0].compute_hash();
        assert_eq!(Chain::from_blocks(blocks).first_invalid_block(), Some(0));
    }

    #[test]
    fn ledger_creates_genesis_and_flushes_each_append() {
        let store = MemoryStore::default();
        let mut ledger = ResultLedger::open(Box::new(store.clone())).unwrap();
        assert_eq!(store.blocks.borrow().len(), 1);

        let block = ledger.append("TealFoxPilot", &[snapshot(100.0)]).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(store.blocks.borrow().len(), 2);
        assert_eq!(*store.saves.borrow(), 2);
        assert_eq!(block.snapshots().unwrap(), vec![snapshot(100.0)]);

        let reopened = ResultLedger::open(Box::new(store.clone())).unwrap();
        assert_eq!(reopened.blocks(), ledger.blocks());
        assert!(reopened.verify());
    }

    #[test]
    fn ledger_refuses_to_extend_corrupt_chain() {
        let store = MemoryStore::default();
        let mut ledger = ResultLedger::open(Box::new(store.clone())).unwrap();
        ledger.append("first", &[snapshot(1.0)]).unwrap();

        store.blocks.borrow_mut()[1].payload = "[]".into();
        let mut reopened = ResultLedger::open(Box::new(store.clone())).unwrap();
        assert!(!reopened.verify());
        assert!(matches!(
            reopened.append("second", &[]),
            Err(ChaintraderError::ChainIntegrity { index: 1, .. })
        ));
        assert_eq!(store.blocks.borrow().len(), 2);
    }

    #[test]
    fn display_lists_every_block() {
        let text = chain_with(&["a"]).to_string();
        assert!(text.contains("Block 0"));
        assert!(text.contains("Backtest: Genesis Block"));
        assert!(text.contains("Block 1"));
        assert!(text.contains("Backtest: run0"));
    }

    #[test]
    fn run_names_come_from_word_lists() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = random_run_name(&mut rng);
        let color = COLORS.iter().find(|c| name.starts_with(*c)).unwrap();
        let rest = &name[color.len()..];
        let animal = ANIMALS.iter().find(|a| rest.starts_with(*a)).unwrap();
        assert!(PROFESSIONS.contains(&&rest[animal.len()..]));
    }
}
