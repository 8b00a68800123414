//! Row-count agreement between the ciphertext and key tables.
//!
//! Rows are paired purely by scan position, so the counts must match before
//! anything is decoded.

use crate::error::{KeeperError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    /// Both tables empty; a fresh store
    Empty,
    /// Both tables non-empty with equal row counts
    Aligned,
    /// Keys left behind with no ciphertext
    OrphanKeys,
    /// Any other disagreement in row counts
    Mismatch,
}

impl TableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Aligned => "aligned",
            Self::OrphanKeys => "orphan_keys",
            Self::Mismatch => "mismatch",
        }
    }

    pub fn is_decodable(&self) -> bool {
        matches!(self, Self::Empty | Self::Aligned)
    }
}

/// Classifies a pair of row counts.
///
/// Ciphertext without keys is a `Mismatch`: the rows cannot be decoded.
pub fn classify(cipher_rows: usize, key_rows: usize) -> TableState {
    match (cipher_rows, key_rows) {
        (0, 0) => TableState::Empty,
        (0, _) => TableState::OrphanKeys,
        (c, k) if c == k => TableState::Aligned,
        _ => TableState::Mismatch,
    }
}

/// Classifies the two loaded tables.
pub fn check<C, K>(cipher_rows: &[C], key_rows: &[K]) -> TableState {
    classify(cipher_rows.len(), key_rows.len())
}

/// Like `check`, but turns undecodable states into their errors.
pub fn ensure_decodable<C, K>(cipher_rows: &[C], key_rows: &[K]) -> Result<TableState> {
    match check(cipher_rows, key_rows) {
        TableState::OrphanKeys => Err(KeeperError::OrphanKeys {
            key_rows: key_rows.len(),
        }),
        TableState::Mismatch => Err(KeeperError::Alignment {
            cipher_rows: cipher_rows.len(),
            key_rows: key_rows.len(),
        }),
        state => Ok(state),
    }
}
