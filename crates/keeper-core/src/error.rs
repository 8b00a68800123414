//! Error types for keeper-core

use crate::model::Field;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Table alignment error: {cipher_rows} ciphertext rows vs {key_rows} key rows")]
    Alignment { cipher_rows: usize, key_rows: usize },

    #[error("Ciphertext table is empty but key table holds {key_rows} rows; clear the key table first")]
    OrphanKeys { key_rows: usize },

    #[error("Malformed key in row {row} ({field}): ciphertext has {ciphertext_len} chars, key has {key_len} shifts")]
    MalformedKey {
        row: usize,
        field: Field,
        ciphertext_len: usize,
        key_len: usize,
    },

    #[error("Character U+{codepoint:04X} at position {position} is outside the cipher range 0..=127")]
    CipherRange { codepoint: u32, position: usize },

    #[error("No printable shift found for codepoint {codepoint} after {draws} draws")]
    ShiftSearchExhausted { codepoint: u32, draws: u32 },

    #[error("Key length mismatch: ciphertext has {ciphertext_len} chars, key has {key_len} shifts")]
    KeyLength { ciphertext_len: usize, key_len: usize },

    #[error("Shift {shift} at position {position} decodes outside the cipher range")]
    InvalidShift { position: usize, shift: i32 },

    #[error("Key token {token:?} is not an integer")]
    KeyParse { token: String },

    #[error("Record not found: {0}")]
    RecordNotFound(u32),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Export target already exists: {}", .0.display())]
    ExportTargetExists(PathBuf),

    #[error("No account set up")]
    NoAccount,

    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Password must contain {0}")]
    PasswordRules(String),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KeeperError {
    /// Errors caused by the two tables disagreeing with each other.
    /// These need an explicit, user-confirmed repair.
    pub fn is_table_inconsistency(&self) -> bool {
        matches!(self, Self::Alignment { .. } | Self::OrphanKeys { .. })
    }
}
