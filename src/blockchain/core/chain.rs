use crate::blockchain::core::validation::{is_block_hash_valid, is_linked_to};
use crate::clock::{Clock, SystemClock};
use crate::error::ChainError;
use crate::persistence::KeyValueStore;
use crate::star::StarRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payload sealed into the block created when a ledger is opened over an empty store.
pub const GENESIS_BODY: &str = "First block in the chain - Genesis block";

/// Block payload: a registered star, or free text (the genesis block, ungated appends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockBody {
    Star(StarRecord),
    Text(String),
}

impl BlockBody {
    /// Owner address, for star records.
    pub fn address(&self) -> Option<&str> {
        match self {
            BlockBody::Star(record) => Some(&record.address),
            BlockBody::Text(_) => None,
        }
    }

    fn strip_decoded_story(&mut self) {
        if let BlockBody::Star(record) = self {
            record.star.story_decoded = None;
        }
    }

    fn attach_decoded_story(&mut self) {
        if let BlockBody::Star(record) = self {
            record.star.story_decoded = record.star.decode_story();
        }
    }
}

/// Decoding is strict: a stored block carrying fields the hash never covered
/// does not decode, so it cannot pass validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    pub body: BlockBody,
    pub time: u64,
    pub previous_block_hash: String,
}

impl Block {
    /// An unsealed block: no height, time, link or hash yet.
    pub fn new(body: BlockBody) -> Self {
        Block {
            hash: String::new(),
            height: 0,
            body,
            time: 0,
            previous_block_hash: String::new(),
        }
    }

    /// SHA-256 over the canonical JSON of the block with `hash` emptied and the
    /// decoded story removed.
    pub fn calculate_hash(&self) -> Result<String, ChainError> {
        let mut unsealed = self.clone();
        unsealed.hash.clear();
        unsealed.body.strip_decoded_story();

        let canonical = serde_json::to_vec(&unsealed)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Stored form: canonical JSON without the decoded story.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        let mut stored = self.clone();
        stored.body.strip_decoded_story();
        Ok(serde_json::to_vec(&stored)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn with_decoded_story(mut self) -> Self {
        self.body.attach_decoded_story();
        self
    }
}

/// Parse a caller-supplied height. Negative, fractional and non-numeric input
/// all resolve to `NotFound`.
pub fn parse_height(raw: &str) -> Result<u64, ChainError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ChainError::NotFound(format!("Block #{} not found", raw)))
}

/// Append-only, hash-linked ledger over one key-value namespace.
///
/// The current height lives behind the append mutex; appends hold it for the
/// whole read-link-hash-write sequence, so two appends can never claim the same
/// height or link to a stale predecessor. Reads only take it to copy the height.
pub struct Ledger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    height: Mutex<Option<u64>>,
}

impl Ledger {
    /// Open the ledger with wall-clock timestamps.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self, ChainError> {
        Self::open_with_clock(store, Arc::new(SystemClock))
    }

    /// Resolve the current height from the store, creating the genesis block if
    /// the store is empty.
    pub fn open_with_clock(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ChainError> {
        let mut resolved: Option<u64> = None;
        for (key, _) in store.scan()? {
            let height = key.parse::<u64>().map_err(|_| {
                ChainError::Storage(format!("Unexpected key in block namespace: {}", key))
            })?;
            resolved = Some(resolved.map_or(height, |h| h.max(height)));
        }

        let ledger = Ledger {
            store,
            clock,
            height: Mutex::new(resolved),
        };

        match resolved {
            Some(height) => info!("Opened ledger at height {}", height),
            None => {
                let genesis = ledger.append(BlockBody::Text(GENESIS_BODY.to_string()))?;
                info!("Created genesis block {}", genesis.hash);
            }
        }

        Ok(ledger)
    }

    /// Height of the newest block.
    pub fn height(&self) -> u64 {
        self.height.lock().unwrap_or(0)
    }

    /// Seal `body` into the next block and persist it. The height only advances
    /// once the store write has succeeded.
    pub fn append(&self, body: BlockBody) -> Result<Block, ChainError> {
        let mut height = self.height.lock();

        let mut block = Block::new(body);
        block.body.strip_decoded_story();
        block.height = height.map_or(0, |h| h + 1);
        block.time = self.clock.now();

        if let Some(current) = *height {
            block.previous_block_hash = self.load(current)?.hash;
        }

        block.hash = block.calculate_hash()?;
        self.store.put(&block.height.to_string(), &block.to_bytes()?)?;
        *height = Some(block.height);

        debug!("Appended block #{} ({})", block.height, block.hash);
        Ok(block.with_decoded_story())
    }

    pub fn get_by_height(&self, height: u64) -> Result<Block, ChainError> {
        self.ensure_within_height(height)?;
        Ok(self.load(height)?.with_decoded_story())
    }

    /// Every star block owned by `address`, ascending by height. Genesis is never matched.
    pub fn get_by_address(&self, address: &str) -> Result<Vec<Block>, ChainError> {
        let mut matches: Vec<Block> = self
            .scan_blocks()?
            .filter(|block| block.body.address() == Some(address))
            .map(Block::with_decoded_story)
            .collect();

        if matches.is_empty() {
            return Err(ChainError::NotFound(format!(
                "No stars registered by {}",
                address
            )));
        }

        // Keys are decimal strings, so store order is lexicographic ("10" < "2").
        matches.sort_by_key(|block| block.height);
        Ok(matches)
    }

    /// First non-genesis block whose stored hash equals `hash`.
    pub fn get_by_hash(&self, hash: &str) -> Result<Block, ChainError> {
        self.scan_blocks()?
            .find(|block| block.hash == hash)
            .map(Block::with_decoded_story)
            .ok_or_else(|| ChainError::NotFound(format!("Block with hash {} not found", hash)))
    }

    /// Every block from genesis to the current height, in height order.
    pub fn blocks(&self) -> Result<Vec<Block>, ChainError> {
        (0..=self.height())
            .map(|height| self.load(height).map(Block::with_decoded_story))
            .collect()
    }

    /// Whether the stored hash of block `height` matches a recomputation.
    /// A stored block that no longer decodes is invalid.
    pub fn validate_block(&self, height: u64) -> Result<bool, ChainError> {
        self.ensure_within_height(height)?;

        match Block::from_bytes(&self.load_bytes(height)?) {
            Ok(block) => is_block_hash_valid(&block),
            Err(e) => {
                warn!("Block #{} is unreadable: {}", height, e);
                Ok(false)
            }
        }
    }

    /// Heights that fail their own hash check or their link to the previous
    /// block's stored hash. Each failing height appears once, ascending.
    /// Missing or undecodable blocks count as failures; store I/O errors propagate.
    pub fn validate_chain(&self) -> Result<Vec<u64>, ChainError> {
        let mut invalid = Vec::new();
        let mut previous_hash = String::new();

        for height in 0..=self.height() {
            let block = match self.store.get(&height.to_string())? {
                Some(bytes) => Block::from_bytes(&bytes).ok(),
                None => None,
            };

            let Some(block) = block else {
                warn!("Block #{} is missing or unreadable", height);
                invalid.push(height);
                previous_hash.clear();
                continue;
            };

            let hash_ok = is_block_hash_valid(&block)?;
            let link_ok = is_linked_to(&block, &previous_hash);
            if !hash_ok || !link_ok {
                warn!(
                    "Block #{} failed validation (hash ok: {}, link ok: {})",
                    height, hash_ok, link_ok
                );
                invalid.push(height);
            }

            previous_hash = block.hash;
        }

        if invalid.is_empty() {
            info!("Chain validation completed: no errors detected");
        } else {
            warn!("Chain validation completed: {} invalid block(s)", invalid.len());
        }
        Ok(invalid)
    }

    /// Decoded non-genesis blocks in store order. Undecodable entries are skipped,
    /// as `validate_chain` reports them.
    fn scan_blocks(&self) -> Result<impl Iterator<Item = Block>, ChainError> {
        let entries = self.store.scan()?;
        Ok(entries
            .into_iter()
            .filter(|(key, _)| key.as_str() != "0")
            .filter_map(|(key, value)| match Block::from_bytes(&value) {
                Ok(block) => Some(block),
                Err(e) => {
                    warn!("Skipping unreadable block at key {}: {}", key, e);
                    None
                }
            }))
    }

    fn ensure_within_height(&self, height: u64) -> Result<(), ChainError> {
        let current = self.height();
        if height > current {
            return Err(ChainError::NotFound(format!(
                "Block #{} not found (chain height is {})",
                height, current
            )));
        }
        Ok(())
    }

    fn load_bytes(&self, height: u64) -> Result<Vec<u8>, ChainError> {
        self.store
            .get(&height.to_string())?
            .ok_or_else(|| ChainError::NotFound(format!("Block #{} not found", height)))
    }

    fn load(&self, height: u64) -> Result<Block, ChainError> {
        Block::from_bytes(&self.load_bytes(height)?)
    }
}
