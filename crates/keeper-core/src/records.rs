//! In-memory record set for one session.
//!
//! Records are keyed by id and iterate in id order. New ids are always
//! `max + 1`, so id order is also insertion order.

use crate::cipher::check_ascii;
use crate::error::{KeeperError, Result};
use crate::model::{Field, PlainRecord};
use std::collections::BTreeMap;
use zeroize::Zeroize;

#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: BTreeMap<u32, PlainRecord>,
    dirty: bool,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a clean set from decoded records, keyed by their ids.
    pub fn from_records(records: impl IntoIterator<Item = PlainRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id, r)).collect(),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in id order
    pub fn iter(&self) -> impl Iterator<Item = &PlainRecord> {
        self.records.values()
    }

    pub fn get(&self, id: u32) -> Option<&PlainRecord> {
        self.records.get(&id)
    }

    fn next_id(&self) -> u32 {
        self.records.keys().next_back().map_or(1, |max| max + 1)
    }

    /// Adds a record and returns its id.
    pub fn add(&mut self, site: &str, username: &str, password: &str) -> Result<u32> {
        validate(site, username, password)?;
        let id = self.next_id();
        self.records
            .insert(id, PlainRecord::new(id, site, username, password));
        self.dirty = true;
        Ok(id)
    }

    /// Replaces all three fields of an existing record.
    pub fn update(&mut self, id: u32, site: &str, username: &str, password: &str) -> Result<()> {
        validate(site, username, password)?;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(KeeperError::RecordNotFound(id))?;
        overwrite(&mut record.site, site);
        overwrite(&mut record.username, username);
        overwrite(&mut record.password, password);
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, id: u32) -> Result<PlainRecord> {
        let removed = self
            .records
            .remove(&id)
            .ok_or(KeeperError::RecordNotFound(id))?;
        self.dirty = true;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.dirty = true;
        }
        self.records.clear();
    }

    /// Case-insensitive substring search over the chosen fields.
    ///
    /// An empty query matches every record; an empty field list matches none.
    pub fn search(&self, query: &str, fields: &[Field]) -> Vec<&PlainRecord> {
        if fields.is_empty() {
            return Vec::new();
        }
        if query.is_empty() {
            return self.iter().collect();
        }
        let needle = query.to_lowercase();
        self.iter()
            .filter(|record| {
                fields
                    .iter()
                    .any(|&f| record.field(f).to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Unsaved changes since load or the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
}

/// Scrubs the old value before reusing the buffer for the new one.
fn overwrite(field: &mut String, value: &str) {
    field.zeroize();
    field.push_str(value);
}

fn validate(site: &str, username: &str, password: &str) -> Result<()> {
    check_ascii(site)?;
    check_ascii(username)?;
    check_ascii(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordSet {
        let mut set = RecordSet::new();
        set.add("Google", "user@x.com", "Secret1!").unwrap();
        set.add("Twitter", "@NDV_99", "nfn2334SDF/#'").unwrap();
        set.add("GitHub", "octo", "hunter2").unwrap();
        set
    }

    #[test]
    fn ids_follow_max_plus_one() {
        let mut set = sample();
        assert_eq!(set.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        set.remove(2).unwrap();
        // a hole in the middle is not reused
        assert_eq!(set.add("Bank", "me", "pin").unwrap(), 4);
        set.remove(4).unwrap();
        set.remove(3).unwrap();
        assert_eq!(set.add("Mail", "me", "pw").unwrap(), 2);
    }

    #[test]
    fn dirty_flag_tracks_edits() {
        let mut set = RecordSet::from_records(vec![PlainRecord::new(1, "a", "b", "c")]);
        assert!(!set.is_dirty());
        set.update(1, "a", "b", "d").unwrap();
        assert!(set.is_dirty());
        set.mark_saved();
        assert!(!set.is_dirty());
        assert!(matches!(set.remove(9), Err(KeeperError::RecordNotFound(9))));
        assert!(!set.is_dirty());
    }

    #[test]
    fn update_rewrites_fields_in_place() {
        let mut set = sample();
        set.update(2, "X", "me", "pw").unwrap();
        assert_eq!(set.get(2), Some(&PlainRecord::new(2, "X", "me", "pw")));

        // the old secret's buffer is scrubbed and reused, not freed as is
        let mut field = String::from("nfn2334SDF/#'");
        let capacity = field.capacity();
        overwrite(&mut field, "pw");
        assert_eq!(field, "pw");
        assert_eq!(field.capacity(), capacity);
    }

    #[test]
    fn non_ascii_fields_are_refused() {
        let mut set = RecordSet::new();
        let err = set.add("caf\u{e9}", "u", "p").unwrap_err();
        assert!(matches!(err, KeeperError::CipherRange { .. }));
        assert!(set.is_empty());
        assert!(!set.is_dirty());
    }

    #[test]
    fn search_respects_fields_and_case() {
        let set = sample();
        let hits: Vec<u32> = set.search("GIT", &[Field::Site]).iter().map(|r| r.id).collect();
        assert_eq!(hits, vec![3]);
        assert!(set.search("git", &[Field::Password]).is_empty());
        assert_eq!(set.search("", &Field::ALL).len(), 3);
        assert!(set.search("google", &[]).is_empty());
        let hits: Vec<u32> = set
            .search("x.com", &[Field::Site, Field::Username])
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(hits, vec![1]);
    }
}
