//! Path to wire-token compression
//!
//! Paths can be arbitrarily long, so on the wire every registered node is
//! addressed by a compact [`Token`] instead. A token packs two halves into a
//! single `u64`:
//!
//! - the low 32 bits are the FNV-1a hash of the path
//! - the high 32 bits are the *bucket*, which disambiguates paths that share
//!   a hash
//!
//! The first path to land on a hash gets bucket `0b1`. Each colliding path
//! claims the next bit above the highest bit currently held on that hash and
//! carries the resulting occupancy mask as its bucket. A token therefore owns
//! exactly the highest bit of its bucket, which is the only bit released when
//! it is removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::path::Path;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(u64);

impl Token {
    /// Bucket value meaning "any bucket" when matching on hash alone
    pub const ANY_BUCKET: u32 = 0;
    /// Sentinel for a failed allocation
    pub const INVALID: Token = Token(u64::MAX);

    pub fn new(bucket: u32, hash: u32) -> Self {
        Token((u64::from(bucket) << 32) | u64::from(hash))
    }

    pub fn from_u64(raw: u64) -> Self {
        Token(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn bucket(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn hash(&self) -> u32 {
        self.0 as u32
    }

    pub fn is_valid(&self) -> bool {
        *self != Token::INVALID && self.bucket() != Token::ANY_BUCKET
    }

    /// The single occupancy bit this token holds in its hash chain
    fn own_bit(&self) -> u32 {
        let bucket = self.bucket();
        if bucket == 0 {
            0
        } else {
            1 << (31 - bucket.leading_zeros())
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}:{:08x}", self.bucket(), self.hash())
    }
}

impl From<Token> for u64 {
    fn from(token: Token) -> Self {
        token.0
    }
}

/// Allocates tokens for paths and keeps the reverse token -> path map
#[derive(Debug, Default)]
pub struct TokenAllocator {
    /// hash -> occupancy mask of the collision chain
    chains: HashMap<u32, u32>,
    /// live tokens and the path each one stands for
    paths: HashMap<Token, Arc<str>>,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a token for `path`
    ///
    /// Returns [`Token::INVALID`] when the hash chain is exhausted.
    pub fn create_token(&mut self, path: &Path) -> Token {
        let hash = fnv1a_32(path.as_str().as_bytes());
        self.allocate(hash, Arc::from(path.as_str()))
    }

    pub(crate) fn allocate(&mut self, hash: u32, path: Arc<str>) -> Token {
        let mask = self.chains.entry(hash).or_insert(0);
        let bit = if *mask == 0 {
            1
        } else {
            let highest = 31 - mask.leading_zeros();
            if highest == 31 {
                tracing::error!("token chain for hash {:08x} exhausted ({})", hash, path);
                return Token::INVALID;
            }
            1 << (highest + 1)
        };
        let token = Token::new(*mask | bit, hash);
        if token == Token::INVALID {
            return Token::INVALID;
        }
        *mask |= bit;
        if *mask != bit {
            tracing::debug!("hash collision on {:08x} for {}, bucket {:#x}", hash, path, *mask);
        }
        self.paths.insert(token, path);
        token
    }

    /// Release a token, making its bit in the chain reusable
    ///
    /// Returns false if the token was not live.
    pub fn remove_token(&mut self, token: Token) -> bool {
        if self.paths.remove(&token).is_none() {
            return false;
        }
        let hash = token.hash();
        if let Some(mask) = self.chains.get_mut(&hash) {
            *mask &= !token.own_bit();
            if *mask == 0 {
                self.chains.remove(&hash);
            }
        }
        true
    }

    pub fn path_of(&self, token: Token) -> Option<Arc<str>> {
        self.paths.get(&token).cloned()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
