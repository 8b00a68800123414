//! SQLite persistence for the ciphertext and key tables
//!
//! The two tables are paired only by row order. Every save clears both and
//! rewrites them inside one transaction, so a failed or interrupted save
//! leaves the previous contents in place.

use crate::codec::RowArena;
use crate::error::{KeeperError, Result};
use crate::model::{CipherRecord, KeyRecord};
use chrono::Local;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Ciphertext,
    Keys,
    LoginLog,
}

impl Table {
    /// SQL table name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ciphertext => "ciphertext",
            Self::Keys => "keys",
            Self::LoginLog => "login_log",
        }
    }
}

impl FromStr for Table {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ciphertext" => Ok(Self::Ciphertext),
            "keys" => Ok(Self::Keys),
            "log" | "login_log" => Ok(Self::LoginLog),
            other => Err(KeeperError::UnknownTable(other.to_string())),
        }
    }
}

/// One login attempt from the audit table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginEntry {
    pub log_id: i64,
    pub date: String,
    pub user: String,
    pub success: bool,
}

// ============================================================================
// Store seam
// ============================================================================

/// The operations the save path needs from persistence
pub trait TableStore: Send + Sync {
    /// Replaces both tables with the given rows.
    fn save_all(&self, arena: &RowArena) -> Result<()>;

    /// Both tables in scan order.
    fn load_all(&self) -> Result<(Vec<CipherRecord>, Vec<KeyRecord>)>;

    /// Empties one table and restarts its row ids at 1.
    fn clear(&self, table: Table) -> Result<()>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

pub struct DualTableStore {
    conn: Mutex<Connection>,
}

impl DualTableStore {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        info!(path = %path.display(), "record store opened");
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        if current_version < 1 {
            debug!(from = current_version, to = SCHEMA_VERSION, "migrating schema");
            Self::migrate_v1(&conn)?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ciphertext (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_ct TEXT NOT NULL,
                username_ct TEXT NOT NULL,
                password_ct TEXT NOT NULL
            );

            -- paired with ciphertext by row order only
            CREATE TABLE IF NOT EXISTS keys (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_key TEXT NOT NULL,
                username_key TEXT NOT NULL,
                password_key TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS login_log (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                user TEXT NOT NULL,
                success TEXT NOT NULL
            );

            INSERT OR REPLACE INTO schema_version (version) VALUES (1);
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Record tables
    // ========================================================================

    /// Clear both record tables and write `arena` in order, atomically.
    pub fn save_all(&self, arena: &RowArena) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        clear_table(&tx, Table::Ciphertext)?;
        clear_table(&tx, Table::Keys)?;
        {
            let mut insert_ct = tx.prepare(
                "INSERT INTO ciphertext (site_ct, username_ct, password_ct) VALUES (?1, ?2, ?3)",
            )?;
            let mut insert_key = tx.prepare(
                "INSERT INTO keys (site_key, username_key, password_key) VALUES (?1, ?2, ?3)",
            )?;
            for pair in arena.iter() {
                let c = &pair.cipher;
                insert_ct.execute(params![c.site_ct, c.username_ct, c.password_ct])?;
                let k = &pair.key;
                insert_key.execute(params![
                    k.site_key.to_string(),
                    k.username_key.to_string(),
                    k.password_key.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        info!(rows = arena.len(), "records saved");
        Ok(())
    }

    /// All rows of both record tables in row id order
    pub fn load_all(&self) -> Result<(Vec<CipherRecord>, Vec<KeyRecord>)> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT row_id, site_ct, username_ct, password_ct FROM ciphertext ORDER BY row_id ASC",
        )?;
        let cipher_rows = stmt
            .query_map([], |row| {
                Ok(CipherRecord {
                    row_index: row.get(0)?,
                    site_ct: row.get(1)?,
                    username_ct: row.get(2)?,
                    password_ct: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT row_id, site_key, username_key, password_key FROM keys ORDER BY row_id ASC",
        )?;
        let raw_keys = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let key_rows = raw_keys
            .into_iter()
            .map(|(row_index, site, username, password)| {
                Ok(KeyRecord {
                    row_index,
                    site_key: site.parse()?,
                    username_key: username.parse()?,
                    password_key: password.parse()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            cipher_rows = cipher_rows.len(),
            key_rows = key_rows.len(),
            "record tables loaded"
        );
        Ok((cipher_rows, key_rows))
    }

    /// Empty exactly one table and restart its row ids at 1
    pub fn clear(&self, table: Table) -> Result<()> {
        let conn = self.conn.lock();
        clear_table(&conn, table)?;
        info!(table = table.as_str(), "table cleared");
        Ok(())
    }

    /// Empty both record tables in one transaction
    pub fn clear_records(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        clear_table(&tx, Table::Ciphertext)?;
        clear_table(&tx, Table::Keys)?;
        tx.commit()?;
        info!("record tables cleared");
        Ok(())
    }

    /// Number of stored records (ciphertext rows)
    pub fn count_records(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ciphertext", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // Login audit
    // ========================================================================

    /// Append a login attempt with the current local time
    pub fn record_login(&self, user: &str, success: bool) -> Result<()> {
        let conn = self.conn.lock();
        let date = Local::now().format(LOG_DATE_FORMAT).to_string();
        conn.execute(
            "INSERT INTO login_log (date, user, success) VALUES (?1, ?2, ?3)",
            params![date, user, if success { "Successful" } else { "Failed" }],
        )?;
        Ok(())
    }

    /// Login attempts, newest first
    pub fn read_log(&self, limit: Option<usize>) -> Result<Vec<LoginEntry>> {
        let conn = self.conn.lock();
        let limit = limit.map_or(-1, |l| l as i64);
        let mut stmt = conn.prepare(
            "SELECT log_id, date, user, success FROM login_log
             ORDER BY date DESC, log_id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(LoginEntry {
                    log_id: row.get(0)?,
                    date: row.get(1)?,
                    user: row.get(2)?,
                    success: row.get::<_, String>(3)? == "Successful",
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn clear_table(conn: &Connection, table: Table) -> Result<()> {
    conn.execute(&format!("DELETE FROM {}", table.as_str()), [])?;
    conn.execute(
        "DELETE FROM sqlite_sequence WHERE name = ?1",
        params![table.as_str()],
    )?;
    Ok(())
}

impl TableStore for DualTableStore {
    fn save_all(&self, arena: &RowArena) -> Result<()> {
        DualTableStore::save_all(self, arena)
    }

    fn load_all(&self) -> Result<(Vec<CipherRecord>, Vec<KeyRecord>)> {
        DualTableStore::load_all(self)
    }

    fn clear(&self, table: Table) -> Result<()> {
        DualTableStore::clear(self, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_all, encode_all};
    use crate::consistency::{check, TableState};
    use crate::records::RecordSet;

    fn sample(n: usize) -> RecordSet {
        let mut set = RecordSet::new();
        for i in 0..n {
            set.add(&format!("site{i}"), &format!("user{i}"), &format!("pw-{i}!"))
                .unwrap();
        }
        set
    }

    #[test]
    fn fresh_store_is_empty() {
        let store = DualTableStore::open_in_memory().unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!(check(&c, &k), TableState::Empty);
        assert_eq!(store.count_records().unwrap(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = DualTableStore::open_in_memory().unwrap();
        let set = sample(5);
        store.save_all(&encode_all(&set).unwrap()).unwrap();

        let (c, k) = store.load_all().unwrap();
        assert_eq!(check(&c, &k), TableState::Aligned);
        let decoded = decode_all(&c, &k).unwrap();
        let original: Vec<_> = set.iter().cloned().collect();
        assert_eq!(decoded, original);
    }

    #[test]
    fn every_save_rewrites_from_row_one() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.save_all(&encode_all(&sample(4)).unwrap()).unwrap();
        store.save_all(&encode_all(&sample(2)).unwrap()).unwrap();

        let (c, k) = store.load_all().unwrap();
        assert_eq!(c.iter().map(|r| r.row_index).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(k.iter().map(|r| r.row_index).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.count_records().unwrap(), 2);
    }

    #[test]
    fn clear_touches_one_table_only() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.save_all(&encode_all(&sample(3)).unwrap()).unwrap();

        store.clear(Table::Ciphertext).unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!(check(&c, &k), TableState::OrphanKeys);
        assert_eq!(k.len(), 3);

        store.clear(Table::Keys).unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!(check(&c, &k), TableState::Empty);
    }

    #[test]
    fn failed_save_keeps_previous_rows() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.save_all(&encode_all(&sample(3)).unwrap()).unwrap();

        store
            .conn
            .lock()
            .execute_batch("ALTER TABLE keys RENAME TO keys_gone;")
            .unwrap();
        assert!(store.save_all(&encode_all(&sample(1)).unwrap()).is_err());
        store
            .conn
            .lock()
            .execute_batch("ALTER TABLE keys_gone RENAME TO keys;")
            .unwrap();

        // the ciphertext clear was rolled back with the rest
        let (c, k) = store.load_all().unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(k.len(), 3);
    }

    #[test]
    fn clear_records_is_all_or_nothing() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.save_all(&encode_all(&sample(3)).unwrap()).unwrap();
        store.record_login("alice", true).unwrap();

        store
            .conn
            .lock()
            .execute_batch("ALTER TABLE keys RENAME TO keys_gone;")
            .unwrap();
        assert!(store.clear_records().is_err());
        store
            .conn
            .lock()
            .execute_batch("ALTER TABLE keys_gone RENAME TO keys;")
            .unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!((c.len(), k.len()), (3, 3));

        store.clear_records().unwrap();
        let (c, k) = store.load_all().unwrap();
        assert!(c.is_empty() && k.is_empty());
        assert_eq!(store.read_log(None).unwrap().len(), 1);

        // row ids restart at 1 after the clear
        store.save_all(&encode_all(&sample(1)).unwrap()).unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!((c[0].row_index, k[0].row_index), (1, 1));
    }

    #[test]
    fn corrupt_key_text_is_reported() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.save_all(&encode_all(&sample(1)).unwrap()).unwrap();
        store
            .conn
            .lock()
            .execute("UPDATE keys SET site_key = '1 2 x'", [])
            .unwrap();
        let err = store.load_all().unwrap_err();
        assert!(matches!(err, KeeperError::KeyParse { .. }));
    }

    #[test]
    fn login_log_is_newest_first() {
        let store = DualTableStore::open_in_memory().unwrap();
        store.record_login("admin", true).unwrap();
        store.record_login("mallory", false).unwrap();

        let log = store.read_log(None).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].user, "mallory");
        assert!(!log[0].success);
        assert!(log[1].success);
        assert_eq!(store.read_log(Some(1)).unwrap().len(), 1);

        // record saves never touch the log
        store.save_all(&encode_all(&sample(2)).unwrap()).unwrap();
        assert_eq!(store.read_log(None).unwrap().len(), 2);

        store.clear(Table::LoginLog).unwrap();
        assert!(store.read_log(None).unwrap().is_empty());
    }

    #[test]
    fn table_names_parse() {
        assert_eq!("keys".parse::<Table>().unwrap(), Table::Keys);
        assert_eq!("log".parse::<Table>().unwrap(), Table::LoginLog);
        assert!(matches!(
            "passwords".parse::<Table>(),
            Err(KeeperError::UnknownTable(_))
        ));
    }

    #[test]
    fn reopening_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let store = DualTableStore::open(&path).unwrap();
            store.save_all(&encode_all(&sample(2)).unwrap()).unwrap();
        }
        let store = DualTableStore::open(&path).unwrap();
        let (c, k) = store.load_all().unwrap();
        assert_eq!(decode_all(&c, &k).unwrap().len(), 2);
    }
}
