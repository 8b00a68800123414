//! Master account: one user whose password gates the record store.
//!
//! The password is only ever kept as an Argon2id PHC string in
//! `account.json`. Every login attempt, good or bad, goes to the login log.

use crate::error::{KeeperError, Result};
use crate::store::DualTableStore;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const ACCOUNT_FILE: &str = "account.json";

pub const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Password rules
// ============================================================================

#[derive(Debug, Default)]
struct CharClasses {
    lower: bool,
    upper: bool,
    digit: bool,
    special: bool,
}

impl CharClasses {
    fn of(password: &str) -> Self {
        let mut classes = Self::default();
        for c in password.chars() {
            match c {
                'a'..='z' => classes.lower = true,
                'A'..='Z' => classes.upper = true,
                '0'..='9' => classes.digit = true,
                ' ' => classes.special = true,
                c if c.is_ascii_punctuation() => classes.special = true,
                _ => {}
            }
        }
        classes
    }

    fn count(&self) -> usize {
        [self.lower, self.upper, self.digit, self.special]
            .iter()
            .filter(|&&present| present)
            .count()
    }
}

/// Fails with `PasswordRules` naming everything the password lacks.
pub fn check_rules(password: &str) -> Result<()> {
    let classes = CharClasses::of(password);
    let mut missing = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        missing.push("at least 8 characters");
    }
    if !classes.lower {
        missing.push("a lower-case letter");
    }
    if !classes.upper {
        missing.push("an upper-case letter");
    }
    if !classes.digit {
        missing.push("a digit");
    }
    if !classes.special {
        missing.push("a special character");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(KeeperError::PasswordRules(missing.join(", ")))
    }
}

/// Rough password rating, 1 (very weak) to 5 (very strong)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    VeryWeak = 1,
    Weak = 2,
    Medium = 3,
    Strong = 4,
    VeryStrong = 5,
}

impl Strength {
    pub fn score(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryWeak => "very weak",
            Self::Weak => "weak",
            Self::Medium => "medium",
            Self::Strong => "strong",
            Self::VeryStrong => "very strong",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length earns 1 or 2 points and each extra character class one more.
/// A single class rates very weak whatever the length.
pub fn strength(password: &str) -> Strength {
    let base = if password.chars().count() >= MIN_PASSWORD_LEN {
        2
    } else {
        1
    };
    let score = match CharClasses::of(password).count() {
        2 => base + 1,
        3 => base + 2,
        4 => base + 3,
        _ => 1,
    };
    match score {
        1 => Strength::VeryWeak,
        2 => Strength::Weak,
        3 => Strength::Medium,
        4 => Strength::Strong,
        _ => Strength::VeryStrong,
    }
}

// ============================================================================
// Hashing
// ============================================================================

fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let salt =
        SaltString::encode_b64(&salt).map_err(|e| KeeperError::PasswordHash(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| KeeperError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    password_hash: String,
}

impl Account {
    /// New account. The password must be typed twice and pass `check_rules`.
    pub fn create(username: &str, password: &str, confirm: &str) -> Result<Self> {
        if username.trim().is_empty() {
            return Err(KeeperError::EmptyUsername);
        }
        if password != confirm {
            return Err(KeeperError::PasswordMismatch);
        }
        check_rules(password)?;
        Ok(Self {
            username: username.to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool> {
        let parsed = PasswordHash::new(&self.password_hash)
            .map_err(|e| KeeperError::PasswordHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Changes the username and/or password. Nothing changes unless
    /// `current` is the right password and every new value is valid.
    pub fn change(
        &mut self,
        current: &str,
        new_username: Option<&str>,
        new_password: Option<(&str, &str)>,
    ) -> Result<()> {
        if !self.verify(current)? {
            return Err(KeeperError::IncorrectPassword);
        }
        if new_username.is_some_and(|u| u.trim().is_empty()) {
            return Err(KeeperError::EmptyUsername);
        }
        let new_hash = match new_password {
            Some((password, confirm)) => {
                if password != confirm {
                    return Err(KeeperError::PasswordMismatch);
                }
                check_rules(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        if let Some(username) = new_username {
            self.username = username.to_string();
        }
        if let Some(hash) = new_hash {
            self.password_hash = hash;
        }
        info!(user = %self.username, "account details changed");
        Ok(())
    }

    /// Checks `user`/`password` and appends the attempt to the login log.
    pub fn log_in(&self, store: &DualTableStore, user: &str, password: &str) -> Result<bool> {
        let success = user == self.username && self.verify(password)?;
        store.record_login(user, success)?;
        if success {
            info!(user, "login succeeded");
        } else {
            warn!(user, "login failed");
        }
        Ok(success)
    }
}

/// Reads `account.json` from `dir`; `None` before the first `init`.
pub fn load_account(dir: &Path) -> Result<Option<Account>> {
    let path = dir.join(ACCOUNT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&fs::read(&path)?)?))
}

pub fn save_account(dir: &Path, account: &Account) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(ACCOUNT_FILE), serde_json::to_vec_pretty(account)?)?;
    Ok(())
}
