//! Session coordinator: the loaded record set plus the save protocol.
//!
//! Every path that rewrites the tables (autosave tick, manual save, logout,
//! shutdown) goes through one save lock, so two rewrites never interleave
//! and nothing writes after the session has been closed.

use crate::codec::{self, RowArena};
use crate::consistency::{self, TableState};
use crate::error::{KeeperError, Result};
use crate::export;
use crate::records::RecordSet;
use crate::settings::KeeperSettings;
use crate::store::{DualTableStore, Table, TableStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a pass through the save critical section did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// Both tables rewritten with this many rows
    Saved { rows: usize },
    /// No unsaved changes; nothing written
    Clean,
    /// Session closed without writing
    Discarded,
    /// Session was already closed; nothing written
    Closed,
}

#[derive(Debug, Default)]
struct SaveState {
    closed: bool,
}

struct Shared<S> {
    store: S,
    settings: KeeperSettings,
    records: Mutex<RecordSet>,
    save_lock: Mutex<SaveState>,
    autosave: Mutex<Option<JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
}

/// Handle to an open session. Clones share the same state.
pub struct Keeper<S: TableStore = DualTableStore> {
    shared: Arc<Shared<S>>,
}

impl<S: TableStore> Clone for Keeper<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Loads and decodes both tables into a fresh record set.
pub fn load_records<S: TableStore + ?Sized>(store: &S) -> Result<RecordSet> {
    let (cipher_rows, key_rows) = store.load_all()?;
    let state = consistency::check(&cipher_rows, &key_rows);
    if !state.is_decodable() {
        warn!(
            state = state.as_str(),
            cipher_rows = cipher_rows.len(),
            key_rows = key_rows.len(),
            "record tables are inconsistent"
        );
    }
    let arena = RowArena::pair(cipher_rows, key_rows)?;
    Ok(RecordSet::from_records(arena.decode()?))
}

/// Clears a key table left without ciphertext, but only once the user has
/// confirmed it. Any other state is returned untouched.
pub fn clear_orphan_keys<S: TableStore + ?Sized>(store: &S, confirmed: bool) -> Result<TableState> {
    let (cipher_rows, key_rows) = store.load_all()?;
    match consistency::check(&cipher_rows, &key_rows) {
        TableState::OrphanKeys if confirmed => {
            store.clear(Table::Keys)?;
            info!(key_rows = key_rows.len(), "orphan key rows cleared");
            Ok(TableState::Empty)
        }
        TableState::OrphanKeys => Err(KeeperError::OrphanKeys {
            key_rows: key_rows.len(),
        }),
        state => Ok(state),
    }
}

impl<S: TableStore + 'static> Keeper<S> {
    /// Loads the record set from `store`. Fails on inconsistent tables.
    pub fn open(store: S, settings: KeeperSettings) -> Result<Self> {
        settings.validate()?;
        let records = load_records(&store)?;
        info!(records = records.len(), "records loaded");
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                settings,
                records: Mutex::new(records),
                save_lock: Mutex::new(SaveState::default()),
                autosave: Mutex::new(None),
                last_activity: Mutex::new(Instant::now()),
            }),
        })
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn settings(&self) -> &KeeperSettings {
        &self.shared.settings
    }

    pub fn is_closed(&self) -> bool {
        self.shared.save_lock.lock().closed
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn with_records<R>(&self, f: impl FnOnce(&RecordSet) -> R) -> R {
        self.touch();
        f(&self.shared.records.lock())
    }

    pub fn with_records_mut<R>(&self, f: impl FnOnce(&mut RecordSet) -> R) -> R {
        self.touch();
        f(&mut self.shared.records.lock())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.shared.records.lock().is_dirty()
    }

    // ========================================================================
    // Save critical section
    // ========================================================================

    /// Writes the record set if it has unsaved changes.
    pub fn save(&self) -> Result<SaveOutcome> {
        let state = self.shared.save_lock.lock();
        if state.closed {
            return Ok(SaveOutcome::Closed);
        }
        self.write_records(false)
    }

    /// One autosave tick. A no-op once the session is closed.
    pub fn autosave_tick(&self) -> Result<SaveOutcome> {
        let state = self.shared.save_lock.lock();
        if state.closed {
            debug!("autosave tick after close skipped");
            return Ok(SaveOutcome::Closed);
        }
        self.write_records(false)
    }

    /// Logout or shutdown: optionally saves, then stops autosave and closes.
    ///
    /// A failed save leaves the session open with its changes, so the
    /// caller can retry.
    pub fn close(&self, save: bool) -> Result<SaveOutcome> {
        let mut state = self.shared.save_lock.lock();
        if state.closed {
            return Ok(SaveOutcome::Closed);
        }
        let outcome = if save {
            self.write_records(true)?
        } else {
            SaveOutcome::Discarded
        };
        state.closed = true;
        self.stop_autosave();
        info!(?outcome, "session closed");
        Ok(outcome)
    }

    /// Empties the record set and both tables in one rewrite.
    pub fn clear_all(&self) -> Result<SaveOutcome> {
        let state = self.shared.save_lock.lock();
        if state.closed {
            return Ok(SaveOutcome::Closed);
        }
        self.shared.records.lock().clear();
        self.write_records(true)
    }

    /// Saves, then writes the decoded set to a separate plaintext database.
    pub fn export_plain_db(&self, path: &Path) -> Result<usize> {
        {
            let state = self.shared.save_lock.lock();
            if !state.closed {
                self.write_records(false)?;
            }
        }
        let records = self.shared.records.lock();
        export::export_plain_db(&records, path)
    }

    /// Caller must hold the save lock.
    fn write_records(&self, force: bool) -> Result<SaveOutcome> {
        let mut records = self.shared.records.lock();
        if !force && !records.is_dirty() {
            return Ok(SaveOutcome::Clean);
        }
        let arena = codec::encode_all(&records)?;
        self.shared.store.save_all(&arena)?;
        records.mark_saved();
        Ok(SaveOutcome::Saved { rows: arena.len() })
    }

    // ========================================================================
    // Autosave
    // ========================================================================

    /// Starts autosave at the configured interval. Needs a tokio runtime.
    pub fn start_autosave(&self) -> bool {
        match self.shared.settings.autosave_interval() {
            Some(period) => {
                self.start_autosave_every(period);
                true
            }
            None => false,
        }
    }

    /// Starts autosave with an explicit period, replacing any running task.
    pub fn start_autosave_every(&self, period: Duration) {
        let keeper = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let tick = keeper.clone();
                // the save runs to completion even if this task is aborted
                match tokio::task::spawn_blocking(move || tick.autosave_tick()).await {
                    Ok(Ok(SaveOutcome::Closed)) => break,
                    Ok(Ok(outcome)) => debug!(?outcome, "autosave tick"),
                    Ok(Err(err)) => warn!(error = %err, "autosave failed"),
                    Err(err) => warn!(error = %err, "autosave task failed"),
                }
            }
        });
        if let Some(previous) = self.shared.autosave.lock().replace(handle) {
            previous.abort();
        }
        info!(period_secs = period.as_secs_f64(), "autosave started");
    }

    /// Cancels future ticks. Never interrupts a save already in progress.
    pub fn stop_autosave(&self) {
        if let Some(handle) = self.shared.autosave.lock().take() {
            handle.abort();
        }
    }

    pub fn autosave_running(&self) -> bool {
        self.shared
            .autosave
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // ========================================================================
    // Idle timeout
    // ========================================================================

    /// Record activity (resets the idle timer).
    pub fn touch(&self) {
        *self.shared.last_activity.lock() = Instant::now();
    }

    pub fn idle_elapsed(&self) -> Duration {
        self.shared.last_activity.lock().elapsed()
    }

    /// True once the configured idle timeout has passed. Always false when
    /// the timeout is disabled.
    pub fn is_idle_expired(&self) -> bool {
        self.shared
            .settings
            .idle_timeout()
            .is_some_and(|limit| self.idle_elapsed() >= limit)
    }
}
