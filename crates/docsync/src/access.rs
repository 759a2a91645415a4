//! Capability checks for documents.
//!
//! Every document carries two secrets. The write key grants read and write,
//! the read key grants read only. A key is valid iff it equals one of them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Document;
use crate::{DocError, DocResult};

/// Access level requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// Generate a new capability secret.
///
/// 32 random bytes, base64url without padding.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two secrets without leaking content or length through timing.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes.
pub fn keys_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0 && !presented.is_empty()
}

/// True if `key` grants read access.
pub fn authorize_read(document: &Document, key: &str) -> bool {
    let write = keys_match(key, &document.write_key);
    let read = keys_match(key, &document.read_key);
    write | read
}

/// True if `key` grants write access.
pub fn authorize_write(document: &Document, key: &str) -> bool {
    keys_match(key, &document.write_key)
}

/// Strongest access `key` grants, if any.
pub fn access_level(document: &Document, key: &str) -> Option<Access> {
    let write = keys_match(key, &document.write_key);
    let read = keys_match(key, &document.read_key);
    if write {
        Some(Access::Write)
    } else if read {
        Some(Access::Read)
    } else {
        None
    }
}

/// Fail with [`DocError::Unauthorized`] unless `key` grants `wanted`.
pub fn authorize(document: &Document, key: &str, wanted: Access) -> DocResult<()> {
    match access_level(document, key) {
        Some(granted) if granted >= wanted => Ok(()),
        _ => Err(DocError::Unauthorized),
    }
}
