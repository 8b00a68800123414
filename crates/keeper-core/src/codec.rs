//! Whole-record encoding between the plaintext set and table rows.
//!
//! In memory a ciphertext row and its key row always travel together as a
//! `RowPair`; the split into two tables only happens at the storage
//! boundary.

use crate::cipher;
use crate::consistency::{self, TableState};
use crate::error::{KeeperError, Result};
use crate::model::{CipherRecord, Field, KeyRecord, KeySequence, PlainRecord};
use crate::records::RecordSet;
use rand::Rng;

/// A ciphertext row with the key row that decodes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPair {
    pub cipher: CipherRecord,
    pub key: KeyRecord,
}

impl RowPair {
    /// Decrypts this pair. `row` is the 1-based scan position used in errors.
    pub fn decode(&self, row: usize, id: u32) -> Result<PlainRecord> {
        decode_row(&self.cipher, &self.key, row, id)
    }
}

/// Ordered encoded rows, ready to be written as two tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowArena {
    pairs: Vec<RowPair>,
}

impl RowArena {
    /// Pairs loaded tables by position. Refuses anything but `Empty` or
    /// `Aligned`.
    pub fn pair(cipher_rows: Vec<CipherRecord>, key_rows: Vec<KeyRecord>) -> Result<Self> {
        consistency::ensure_decodable(&cipher_rows, &key_rows)?;
        let pairs = cipher_rows
            .into_iter()
            .zip(key_rows)
            .map(|(cipher, key)| RowPair { cipher, key })
            .collect();
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowPair> {
        self.pairs.iter()
    }

    pub fn state(&self) -> TableState {
        if self.pairs.is_empty() {
            TableState::Empty
        } else {
            TableState::Aligned
        }
    }

    /// Splits into the ciphertext table and the key table, same order.
    pub fn into_tables(self) -> (Vec<CipherRecord>, Vec<KeyRecord>) {
        self.pairs.into_iter().map(|p| (p.cipher, p.key)).unzip()
    }

    /// Decodes every pair, numbering ids from 1.
    pub fn decode(&self) -> Result<Vec<PlainRecord>> {
        self.pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| pair.decode(i + 1, i as u32 + 1))
            .collect()
    }
}

/// Encodes every record in id order with the thread-local generator.
pub fn encode_all(records: &RecordSet) -> Result<RowArena> {
    encode_all_with(records, &mut rand::thread_rng())
}

/// Encodes every record in id order with the given generator.
pub fn encode_all_with<R: Rng + ?Sized>(records: &RecordSet, rng: &mut R) -> Result<RowArena> {
    let pairs = records
        .iter()
        .map(|record| encode_record(record, rng))
        .collect::<Result<Vec<_>>>()?;
    Ok(RowArena { pairs })
}

fn encode_record<R: Rng + ?Sized>(record: &PlainRecord, rng: &mut R) -> Result<RowPair> {
    let (site_ct, site_key) = cipher::encrypt_with(&record.site, rng)?;
    let (username_ct, username_key) = cipher::encrypt_with(&record.username, rng)?;
    let (password_ct, password_key) = cipher::encrypt_with(&record.password, rng)?;
    Ok(RowPair {
        cipher: CipherRecord {
            row_index: 0,
            site_ct,
            username_ct,
            password_ct,
        },
        key: KeyRecord {
            row_index: 0,
            site_key,
            username_key,
            password_key,
        },
    })
}

/// Decodes the two loaded tables into plaintext records with ids from 1.
///
/// Fails on any state other than `Empty` or `Aligned`, and on any field
/// whose key length differs from its ciphertext length.
pub fn decode_all(cipher_rows: &[CipherRecord], key_rows: &[KeyRecord]) -> Result<Vec<PlainRecord>> {
    consistency::ensure_decodable(cipher_rows, key_rows)?;
    cipher_rows
        .iter()
        .zip(key_rows)
        .enumerate()
        .map(|(i, (cipher, key))| decode_row(cipher, key, i + 1, i as u32 + 1))
        .collect()
}

fn decode_row(cipher: &CipherRecord, key: &KeyRecord, row: usize, id: u32) -> Result<PlainRecord> {
    let site = decode_field(cipher, key, Field::Site, row)?;
    let username = decode_field(cipher, key, Field::Username, row)?;
    let password = decode_field(cipher, key, Field::Password, row)?;
    Ok(PlainRecord::new(id, site, username, password))
}

fn decode_field(cipher: &CipherRecord, key: &KeyRecord, field: Field, row: usize) -> Result<String> {
    let ciphertext = cipher.field(field);
    let shifts: &KeySequence = key.field(field);
    cipher::decrypt_with_key(ciphertext, shifts).map_err(|err| match err {
        KeeperError::KeyLength {
            ciphertext_len,
            key_len,
        } => KeeperError::MalformedKey {
            row,
            field,
            ciphertext_len,
            key_len,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn google() -> RecordSet {
        let mut set = RecordSet::new();
        set.add("Google", "user@x.com", "Secret1!").unwrap();
        set
    }

    #[test]
    fn concrete_record_lengths() {
        let (cipher_rows, key_rows) = encode_all(&google()).unwrap().into_tables();
        assert_eq!(cipher_rows.len(), 1);
        assert_eq!(key_rows.len(), 1);

        let c = &cipher_rows[0];
        assert_eq!(c.site_ct.chars().count(), 6);
        assert_eq!(c.username_ct.chars().count(), 10);
        assert_eq!(c.password_ct.chars().count(), 8);

        let k = &key_rows[0];
        assert_eq!(k.site_key.len(), 6);
        assert_eq!(k.username_key.len(), 10);
        assert_eq!(k.password_key.len(), 8);

        let decoded = decode_all(&cipher_rows, &key_rows).unwrap();
        assert_eq!(decoded, vec![PlainRecord::new(1, "Google", "user@x.com", "Secret1!")]);
    }

    #[test]
    fn empty_set_encodes_to_empty_tables() {
        let arena = encode_all(&RecordSet::new()).unwrap();
        assert!(arena.is_empty());
        assert_eq!(arena.state(), TableState::Empty);
        let (c, k) = arena.into_tables();
        assert!(c.is_empty() && k.is_empty());
        assert!(decode_all(&c, &k).unwrap().is_empty());
    }

    #[test]
    fn order_is_preserved_and_ids_renumbered() {
        let mut set = RecordSet::new();
        for site in ["a", "b", "c", "d"] {
            set.add(site, "u", "p").unwrap();
        }
        set.remove(2).unwrap();

        let arena = encode_all_with(&set, &mut StdRng::seed_from_u64(1)).unwrap();
        let decoded = arena.decode().unwrap();
        let got: Vec<(u32, &str)> = decoded.iter().map(|r| (r.id, r.site.as_str())).collect();
        assert_eq!(got, vec![(1, "a"), (2, "c"), (3, "d")]);
    }

    #[test]
    fn mismatched_tables_are_refused() {
        let mut set = google();
        set.add("Twitter", "me", "pw").unwrap();
        let (cipher_rows, key_rows) = encode_all(&set).unwrap().into_tables();

        let err = decode_all(&cipher_rows[..1], &key_rows).unwrap_err();
        assert!(matches!(err, KeeperError::Alignment { cipher_rows: 1, key_rows: 2 }));

        let err = decode_all(&[], &key_rows).unwrap_err();
        assert!(matches!(err, KeeperError::OrphanKeys { key_rows: 2 }));

        let err = RowArena::pair(cipher_rows, Vec::new()).unwrap_err();
        assert!(matches!(err, KeeperError::Alignment { cipher_rows: 2, key_rows: 0 }));
    }

    #[test]
    fn short_key_is_malformed_not_truncated() {
        let (cipher_rows, mut key_rows) = encode_all(&google()).unwrap().into_tables();
        key_rows[0].password_key.0.pop();

        let err = decode_all(&cipher_rows, &key_rows).unwrap_err();
        assert!(matches!(
            err,
            KeeperError::MalformedKey {
                row: 1,
                field: Field::Password,
                ciphertext_len: 8,
                key_len: 7,
            }
        ));
    }

    #[test]
    fn pair_then_decode_matches_decode_all() {
        let mut set = google();
        set.add("GitHub", "octo", "hunter2").unwrap();
        let (c, k) = encode_all(&set).unwrap().into_tables();
        let direct = decode_all(&c, &k).unwrap();
        let paired = RowArena::pair(c, k).unwrap().decode().unwrap();
        assert_eq!(direct, paired);
    }
}
