//! Plaintext database export.
//!
//! Writes the decoded records into a separate SQLite file with a single
//! `records` table. The output is unencrypted. An existing file is never
//! written to.

use crate::error::{KeeperError, Result};
use crate::records::RecordSet;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

/// Exports every record in id order to a new file. Returns the number of
/// rows written.
pub fn export_plain_db(records: &RecordSet, path: &Path) -> Result<usize> {
    if path.exists() {
        return Err(KeeperError::ExportTargetExists(path.to_path_buf()));
    }
    let mut conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            site TEXT NOT NULL,
            username TEXT NOT NULL,
            password TEXT NOT NULL
        );",
    )?;

    let tx = conn.transaction()?;
    {
        let mut insert =
            tx.prepare("INSERT INTO records (site, username, password) VALUES (?1, ?2, ?3)")?;
        for record in records.iter() {
            insert.execute(params![record.site, record.username, record.password])?;
        }
    }
    tx.commit()?;

    info!(rows = records.len(), path = %path.display(), "plaintext export written");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn export_writes_plain_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.db");
        let mut set = RecordSet::new();
        set.add("Google", "example@gmail.com", "password").unwrap();
        set.add("Twitter", "@me", "hunter2").unwrap();

        assert_eq!(export_plain_db(&set, &path).unwrap(), 2);

        let conn = Connection::open(&path).unwrap();
        let rows: Vec<(String, String, String)> = conn
            .prepare("SELECT site, username, password FROM records ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0], ("Google".into(), "example@gmail.com".into(), "password".into()));
        assert_eq!(rows[1].2, "hunter2");
    }

    #[test]
    fn existing_target_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.db");
        let mut set = RecordSet::new();
        set.add("Google", "example@gmail.com", "password").unwrap();
        export_plain_db(&set, &path).unwrap();

        let err = export_plain_db(&set, &path).unwrap_err();
        assert!(matches!(err, KeeperError::ExportTargetExists(ref p) if p == &path));

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
