//! Per-character randomized substitution cipher.
//!
//! Every character is shifted by its own random amount so that the result
//! lands on a printable ASCII character other than `\`. The shifts form the
//! key and are stored apart from the ciphertext. This only protects against
//! someone holding the ciphertext table alone; it is not a cryptographic
//! cipher.

use crate::error::{KeeperError, Result};
use crate::model::KeySequence;
use rand::Rng;

/// Highest codepoint the cipher accepts
pub const MAX_CODEPOINT: u32 = 127;

/// Printable output range, inclusive
pub const PRINTABLE_MIN: u32 = 32;
pub const PRINTABLE_MAX: u32 = 126;

/// Never emitted; it corrupts escape handling in stored text
pub const BACKSLASH: u32 = 92;

/// Upper bound on redraws for one character. Roughly 73% of draws succeed,
/// so only a broken generator ever reaches this.
pub const MAX_SHIFT_DRAWS: u32 = 1024;

fn is_valid_output(codepoint: i64) -> bool {
    codepoint >= PRINTABLE_MIN as i64
        && codepoint <= PRINTABLE_MAX as i64
        && codepoint != BACKSLASH as i64
}

/// Encrypts one character, returning the produced character and its shift.
///
/// The shift is drawn uniformly from `[-codepoint, 127 - codepoint]` and
/// redrawn until the output is printable and not a backslash.
pub fn encrypt_char<R: Rng + ?Sized>(codepoint: u32, rng: &mut R) -> Result<(char, i32)> {
    shift_char(codepoint, 0, rng)
}

fn shift_char<R: Rng + ?Sized>(codepoint: u32, position: usize, rng: &mut R) -> Result<(char, i32)> {
    if codepoint > MAX_CODEPOINT {
        return Err(KeeperError::CipherRange { codepoint, position });
    }
    let low = -(codepoint as i32);
    let high = MAX_CODEPOINT as i32 - codepoint as i32;
    for _ in 0..MAX_SHIFT_DRAWS {
        let shift = rng.gen_range(low..=high);
        let produced = codepoint as i64 + shift as i64;
        if is_valid_output(produced) {
            // valid output is ASCII, so the conversion cannot fail
            if let Some(c) = char::from_u32(produced as u32) {
                return Ok((c, shift));
            }
        }
    }
    Err(KeeperError::ShiftSearchExhausted {
        codepoint,
        draws: MAX_SHIFT_DRAWS,
    })
}

/// Reverses one shift. The result may be out of range for corrupt keys;
/// `decrypt` checks it.
pub fn decrypt_char(cipher_char: u32, shift: i32) -> i64 {
    cipher_char as i64 - shift as i64
}

/// Fails with `CipherRange` on the first character the cipher cannot carry.
pub fn check_ascii(text: &str) -> Result<()> {
    match text.chars().enumerate().find(|(_, c)| !c.is_ascii()) {
        Some((position, c)) => Err(KeeperError::CipherRange {
            codepoint: c as u32,
            position,
        }),
        None => Ok(()),
    }
}

/// Encrypts `text` with the thread-local generator.
pub fn encrypt(text: &str) -> Result<(String, KeySequence)> {
    encrypt_with(text, &mut rand::thread_rng())
}

/// Encrypts `text` with the given generator.
///
/// Non-ASCII input is rejected before anything is drawn.
pub fn encrypt_with<R: Rng + ?Sized>(text: &str, rng: &mut R) -> Result<(String, KeySequence)> {
    check_ascii(text)?;

    let mut ciphertext = String::with_capacity(text.len());
    let mut shifts = Vec::with_capacity(text.len());
    for (position, c) in text.chars().enumerate() {
        let (produced, shift) = shift_char(c as u32, position, rng)?;
        ciphertext.push(produced);
        shifts.push(shift);
    }
    Ok((ciphertext, KeySequence(shifts)))
}

/// Decrypts `ciphertext` with a whitespace-separated key string.
pub fn decrypt(ciphertext: &str, key_text: &str) -> Result<String> {
    let key: KeySequence = key_text.parse()?;
    decrypt_with_key(ciphertext, &key)
}

/// Decrypts `ciphertext` with parsed shifts. The key must hold exactly one
/// shift per character; nothing is truncated or padded.
pub fn decrypt_with_key(ciphertext: &str, key: &KeySequence) -> Result<String> {
    let ciphertext_len = ciphertext.chars().count();
    if ciphertext_len != key.len() {
        return Err(KeeperError::KeyLength {
            ciphertext_len,
            key_len: key.len(),
        });
    }

    ciphertext
        .chars()
        .zip(key.shifts())
        .enumerate()
        .map(|(position, (c, &shift))| {
            let plain = decrypt_char(c as u32, shift);
            if !(0..=MAX_CODEPOINT as i64).contains(&plain) {
                return Err(KeeperError::InvalidShift { position, shift });
            }
            char::from_u32(plain as u32).ok_or(KeeperError::InvalidShift { position, shift })
        })
        .collect()
}
