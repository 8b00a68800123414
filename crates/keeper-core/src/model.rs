//! Record types for the plaintext set and the two persisted tables
//!
//! `PlainRecord` only ever lives in memory. `CipherRecord` and `KeyRecord`
//! mirror one row of the ciphertext and key tables respectively.

use crate::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Fields
// ============================================================================

/// One of the three encrypted columns of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Site,
    Username,
    Password,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Site, Field::Username, Field::Password];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Username => "username",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Plaintext
// ============================================================================

/// A decrypted credential. Zeroized when dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct PlainRecord {
    pub id: u32,
    pub site: String,
    pub username: String,
    pub password: String,
}

impl PlainRecord {
    pub fn new(
        id: u32,
        site: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id,
            site: site.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Site => &self.site,
            Field::Username => &self.username,
            Field::Password => &self.password,
        }
    }
}

// ============================================================================
// Persisted rows
// ============================================================================

/// One row of the ciphertext table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherRecord {
    /// Storage sequence number; 0 until the row has been persisted
    pub row_index: i64,
    pub site_ct: String,
    pub username_ct: String,
    pub password_ct: String,
}

impl CipherRecord {
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Site => &self.site_ct,
            Field::Username => &self.username_ct,
            Field::Password => &self.password_ct,
        }
    }
}

/// One row of the key table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub row_index: i64,
    pub site_key: KeySequence,
    pub username_key: KeySequence,
    pub password_key: KeySequence,
}

impl KeyRecord {
    pub fn field(&self, field: Field) -> &KeySequence {
        match field {
            Field::Site => &self.site_key,
            Field::Username => &self.username_key,
            Field::Password => &self.password_key,
        }
    }
}

/// Per-character shifts for one field, one entry per character.
///
/// Stored as integers joined by single spaces; any whitespace is accepted
/// when parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySequence(pub Vec<i32>);

impl KeySequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shifts(&self) -> &[i32] {
        &self.0
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for shift in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{shift}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for KeySequence {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self> {
        s.split_whitespace()
            .map(|token| {
                token.parse::<i32>().map_err(|_| KeeperError::KeyParse {
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(KeySequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_sequence_text_form() {
        let key = KeySequence(vec![3, -4, -10, 2, 0]);
        assert_eq!(key.to_string(), "3 -4 -10 2 0");
        let parsed: KeySequence = "  3 -4\t-10\n2 0 ".parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(KeySequence::default().to_string(), "");
        assert!("".parse::<KeySequence>().unwrap().is_empty());
    }

    #[test]
    fn key_sequence_rejects_garbage() {
        let err = "1 two 3".parse::<KeySequence>().unwrap_err();
        assert!(matches!(err, KeeperError::KeyParse { ref token } if token == "two"));
    }

    #[test]
    fn field_accessors_line_up() {
        let rec = PlainRecord::new(1, "Google", "user@x.com", "Secret1!");
        assert_eq!(rec.field(Field::Site), "Google");
        assert_eq!(rec.field(Field::Username), "user@x.com");
        assert_eq!(rec.field(Field::Password), "Secret1!");
    }
}
