//! Fixed-width, order-preserving key and value encodings for every record class.
//!
//! Every key starts with its record class's namespace byte from [`KeySchema`].
//! All integers are big-endian, so byte-lexicographic order over keys equals
//! numeric order over heights and positions. Address hashes are written with
//! a one-byte length prefix so the key range of one address can never
//! overlap the range of another address under the same type prefix.
//!
//! ```text
//! d | hash(32)                               -> index(4)
//! D | index(4)                               -> hash(32)
//! I | height(4)                              -> start(4) last(4)
//! M | prefix(1) len(1) addr_hash height(4) pos(4) -> (empty)
//! C | height(4) pos(4)                       -> hash(32)
//! c | hash(32)                               -> height(4) pos(4)
//! R | name                                   -> JSON
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::types::{Address, BlockRecord, Count, Hash256};

/// Namespace bytes for each persisted record class.
///
/// Built once at startup and shared by reference with every component that
/// touches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySchema {
    /// hash -> sequential index
    pub hash_to_index: u8,
    /// sequential index -> hash
    pub index_to_hash: u8,
    /// height -> BlockRecord
    pub block_record: u8,
    /// address existence markers
    pub address: u8,
    /// (height, pos) -> hash
    pub forward: u8,
    /// hash -> (height, pos)
    pub reverse: u8,
    /// engine metadata (rollback checkpoint)
    pub meta: u8,
}

impl Default for KeySchema {
    fn default() -> Self {
        Self {
            hash_to_index: b'd',
            index_to_hash: b'D',
            block_record: b'I',
            address: b'M',
            forward: b'C',
            reverse: b'c',
            meta: b'R',
        }
    }
}

impl KeySchema {
    /// Reject schemas where two record classes share a namespace byte.
    pub fn validate(&self) -> Result<()> {
        let bytes = [
            self.hash_to_index,
            self.index_to_hash,
            self.block_record,
            self.address,
            self.forward,
            self.reverse,
            self.meta,
        ];
        for (i, a) in bytes.iter().enumerate() {
            if bytes[i + 1..].contains(a) {
                return Err(IndexerError::Config(format!(
                    "key schema reuses namespace byte 0x{a:02x}"
                )));
            }
        }
        Ok(())
    }

    // ─── Allocator ───────────────────────────────────────────────────────────

    pub fn hash_index_key(&self, hash: &Hash256) -> Vec<u8> {
        prefixed(self.hash_to_index, hash.as_bytes())
    }

    pub fn index_hash_key(&self, index: u32) -> Vec<u8> {
        prefixed(self.index_to_hash, &index.to_be_bytes())
    }

    // ─── Block records ───────────────────────────────────────────────────────

    pub fn block_record_key(&self, height: u32) -> Vec<u8> {
        prefixed(self.block_record, &height.to_be_bytes())
    }

    pub fn decode_block_record_key(&self, key: &[u8]) -> Result<u32> {
        let body = strip(self.block_record, key, "BlockRecord key")?;
        decode_u32(body, "BlockRecord key")
    }

    // ─── Address index ───────────────────────────────────────────────────────

    /// Key prefix shared by every entry of one address.
    pub fn address_prefix(&self, address: &Address) -> Vec<u8> {
        let hash = address.hash();
        let mut key = Vec::with_capacity(3 + hash.len() + 8);
        key.push(self.address);
        key.push(address.prefix());
        key.push(hash.len() as u8);
        key.extend_from_slice(hash);
        key
    }

    pub fn address_key(&self, address: &Address, count: Count) -> Vec<u8> {
        let mut key = self.address_prefix(address);
        key.extend_from_slice(&count.to_bytes());
        key
    }

    /// Smallest and largest possible keys for `address`, both inclusive.
    pub fn address_bounds(&self, address: &Address) -> (Vec<u8>, Vec<u8>) {
        (
            self.address_key(address, Count::new(0, 0)),
            self.address_key(address, Count::new(u32::MAX, u32::MAX)),
        )
    }

    /// Recover the `(height, pos)` suffix of an address entry key.
    pub fn decode_address_key(&self, key: &[u8]) -> Result<Count> {
        let body = strip(self.address, key, "address key")?;
        // prefix(1) + len(1) + hash(len) + count(8)
        if body.len() < 2 {
            return Err(IndexerError::malformed("address key", "truncated header"));
        }
        let hash_len = body[1] as usize;
        let expected = 2 + hash_len + 8;
        if body.len() != expected {
            return Err(IndexerError::malformed(
                "address key",
                format!("expected {expected} bytes after namespace, got {}", body.len()),
            ));
        }
        Count::from_bytes(&body[2 + hash_len..])
    }

    pub fn forward_key(&self, count: Count) -> Vec<u8> {
        prefixed(self.forward, &count.to_bytes())
    }

    pub fn reverse_key(&self, hash: &Hash256) -> Vec<u8> {
        prefixed(self.reverse, hash.as_bytes())
    }

    // ─── Metadata ────────────────────────────────────────────────────────────

    pub fn meta_key(&self, name: &str) -> Vec<u8> {
        prefixed(self.meta, name.as_bytes())
    }
}

fn prefixed(namespace: u8, body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + body.len());
    key.push(namespace);
    key.extend_from_slice(body);
    key
}

fn strip<'a>(namespace: u8, key: &'a [u8], record: &'static str) -> Result<&'a [u8]> {
    match key.split_first() {
        Some((first, rest)) if *first == namespace => Ok(rest),
        Some((first, _)) => Err(IndexerError::malformed(
            record,
            format!("namespace 0x{first:02x}, expected 0x{namespace:02x}"),
        )),
        None => Err(IndexerError::malformed(record, "empty key")),
    }
}

// ─── Value codecs ─────────────────────────────────────────────────────────────

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_u32(bytes: &[u8], record: &'static str) -> Result<u32> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| {
        IndexerError::malformed(record, format!("expected 4 bytes, got {}", bytes.len()))
    })?;
    Ok(u32::from_be_bytes(arr))
}

pub fn decode_hash(bytes: &[u8], record: &'static str) -> Result<Hash256> {
    Hash256::from_slice(bytes).ok_or_else(|| {
        IndexerError::malformed(record, format!("expected 32 bytes, got {}", bytes.len()))
    })
}

impl Count {
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.height.to_be_bytes());
        out[4..].copy_from_slice(&self.pos.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(IndexerError::malformed(
                "Count",
                format!("expected 8 bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self {
            height: decode_u32(&bytes[..4], "Count")?,
            pos: decode_u32(&bytes[4..], "Count")?,
        })
    }
}

impl BlockRecord {
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.start.to_be_bytes());
        out[4..].copy_from_slice(&self.last.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(IndexerError::malformed(
                "BlockRecord",
                format!("expected 8 bytes, got {}", bytes.len()),
            ));
        }
        let record = Self {
            start: decode_u32(&bytes[..4], "BlockRecord")?,
            last: decode_u32(&bytes[4..], "BlockRecord")?,
        };
        if record.start > record.last {
            return Err(IndexerError::malformed(
                "BlockRecord",
                format!("start {} above last {}", record.start, record.last),
            ));
        }
        Ok(record)
    }
}
