//! Shared types: hashes, addresses, the minimal chain model seen at the
//! collaborator seams, and the two fixed-width index records.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::IndexerError;

// ─── Hash256 ──────────────────────────────────────────────────────────────────

/// A 32-byte transaction or block hash. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const LEN: usize = 32;

    /// The all-zero hash (used by null outpoints).
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Build a hash from a 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

impl FromStr for Hash256 {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| IndexerError::InvalidInput(format!("hash '{s}': {e}")))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            IndexerError::InvalidInput(format!("hash '{s}': expected 32 bytes, got {}", bytes.len()))
        })
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

// ─── Address ──────────────────────────────────────────────────────────────────

/// An address as attributed by the classifier: a one-byte type prefix plus the
/// address hash. Textual form is `<prefix>:<hex hash>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    prefix: u8,
    hash: Vec<u8>,
}

impl Address {
    /// Longest address hash the key codec can length-prefix.
    pub const MAX_HASH_LEN: usize = 64;

    pub fn new(prefix: u8, hash: impl Into<Vec<u8>>) -> Result<Self, IndexerError> {
        let hash = hash.into();
        if hash.is_empty() || hash.len() > Self::MAX_HASH_LEN {
            return Err(IndexerError::InvalidInput(format!(
                "address hash must be 1..={} bytes, got {}",
                Self::MAX_HASH_LEN,
                hash.len()
            )));
        }
        Ok(Self { prefix, hash })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, hex::encode(&self.hash))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, hash) = s
            .split_once(':')
            .ok_or_else(|| IndexerError::InvalidInput(format!("address '{s}': expected <prefix>:<hex>")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| IndexerError::InvalidInput(format!("address '{s}': prefix: {e}")))?;
        let hash = hex::decode(hash)
            .map_err(|e| IndexerError::InvalidInput(format!("address '{s}': {e}")))?;
        Self::new(prefix, hash)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

// ─── Chain model ──────────────────────────────────────────────────────────────

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    /// The coinbase prevout.
    pub fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == Hash256::ZERO && self.index == u32::MAX
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub prevout: OutPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    /// `None` for outputs with no standard address (e.g. data carriers).
    pub address: Option<Address>,
}

/// The parts of a transaction the index needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash256,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }
}

/// A spendable (or spent) output with its owning address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: u64,
    pub address: Option<Address>,
    /// `None` while unconfirmed.
    pub height: Option<u32>,
    /// Token amount carried by this output, when the token-info source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenOutputRecord>,
}

/// Previous outputs spent by a set of transactions, keyed by outpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinView {
    coins: HashMap<OutPoint, Coin>,
}

impl CoinView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coin: Coin) {
        self.coins.insert(coin.outpoint, coin);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.coins.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Coin> {
        self.coins.values_mut()
    }
}

impl FromIterator<Coin> for CoinView {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        let mut view = Self::new();
        for coin in iter {
            view.insert(coin);
        }
        view
    }
}

/// A block as delivered by the host's connect/disconnect notifications.
#[derive(Debug, Clone)]
pub struct ConnectedBlock {
    pub height: u32,
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
    /// Coins spent by `transactions`.
    pub view: CoinView,
}

impl ConnectedBlock {
    /// Position of a transaction inside this block.
    pub fn position_of(&self, hash: &Hash256) -> Option<(u32, &Transaction)> {
        self.transactions
            .iter()
            .enumerate()
            .find(|(_, tx)| tx.hash == *hash)
            .map(|(i, tx)| (i as u32, tx))
    }
}

/// A fully materialized transaction as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxView {
    pub tx: Transaction,
    /// Confirmation height; `None` for unconfirmed transactions.
    pub height: Option<u32>,
    /// Block timestamp (seconds since epoch) when confirmed.
    pub time: Option<i64>,
    /// Coins spent by `tx`, for address attribution.
    #[serde(skip)]
    pub coins: CoinView,
    /// The token `tx` moves, when the token-info source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRecord>,
    /// Per-output token amounts, ordered by output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_tokens: Vec<TokenOutputRecord>,
}

impl TxView {
    pub fn hash(&self) -> Hash256 {
        self.tx.hash
    }

    pub fn is_confirmed(&self) -> bool {
        self.height.is_some()
    }
}

// ─── Token info ──────────────────────────────────────────────────────────────

/// Descriptive record of a token, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: Hash256,
    pub ticker: String,
    pub name: String,
    pub document_uri: Option<String>,
    pub decimals: u8,
}

/// Token amount assigned to one output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOutputRecord {
    pub vout: u32,
    /// `None` for token types the source does not describe.
    pub token_id: Option<Hash256>,
    pub amount: u64,
}

// ─── Index records ────────────────────────────────────────────────────────────

/// Position of a transaction in the chain: block height plus position within
/// the block. Field order makes the derived `Ord` chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Count {
    pub height: u32,
    pub pos: u32,
}

impl Count {
    pub fn new(height: u32, pos: u32) -> Self {
        Self { height, pos }
    }
}

/// Per-height ledger entry: the sequential indices in `(start, last]` were
/// introduced by this height and by no other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockRecord {
    pub start: u32,
    pub last: u32,
}

impl BlockRecord {
    /// A record for a height that begins right after `last` was issued.
    pub fn starting_after(last: u32) -> Self {
        Self { start: last, last }
    }

    /// Indices introduced by this height, ascending.
    pub fn introduced(&self) -> impl DoubleEndedIterator<Item = u32> {
        (self.start..self.last).map(|i| i + 1)
    }

    /// Number of indices introduced by this height.
    pub fn len(&self) -> u32 {
        self.last - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.last
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
