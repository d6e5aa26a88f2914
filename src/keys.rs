//! Fixed-width composite key encoding for LMDB storage.
//!
//! Every id is a 16-byte UUID, so composite keys are plain concatenations:
//! - `pair(a, b)`: [a:16][b:16], scanned by prefix `a`
//! - `page_assignee(page, assignee)`: [page:16][tag:1][id:16]
//!
//! Big-endian UUID bytes keep prefix scans grouped by their first part.

use uuid::Uuid;

use crate::assignee::Assignee;

pub const ID_LEN: usize = 16;
pub const PAIR_LEN: usize = 32;
pub const ASSIGNEE_KEY_LEN: usize = 33;

/// Build a 32-byte key from two ids
#[inline]
pub fn pair(a: &Uuid, b: &Uuid) -> [u8; PAIR_LEN] {
    let mut k = [0u8; PAIR_LEN];
    k[..ID_LEN].copy_from_slice(a.as_bytes());
    k[ID_LEN..].copy_from_slice(b.as_bytes());
    k
}

/// Build the unique (page, assignee) key
#[inline]
pub fn page_assignee(page: &Uuid, assignee: &Assignee) -> [u8; ASSIGNEE_KEY_LEN] {
    let mut k = [0u8; ASSIGNEE_KEY_LEN];
    k[..ID_LEN].copy_from_slice(page.as_bytes());
    k[ID_LEN..].copy_from_slice(&assignee.key_bytes());
    k
}

/// Read the trailing id of a pair key, `None` if the key is malformed
#[inline]
pub fn pair_tail(k: &[u8]) -> Option<Uuid> {
    if k.len() != PAIR_LEN {
        return None;
    }
    read_id(&k[ID_LEN..])
}

/// Decode a 16-byte value into an id
#[inline]
pub fn read_id(bytes: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(bytes).ok()
}
