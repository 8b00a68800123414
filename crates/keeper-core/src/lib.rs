//! keeper-core: record cipher and dual-table storage for the keeper
//! credential manager
//!
//! # Storage protocol
//! Each credential field is encrypted character by character with a random
//! per-character shift. The ciphertext goes to the `ciphertext` table and
//! the shifts to the `keys` table. The tables are paired only by row order:
//! - a save clears and rewrites both tables in one SQLite transaction;
//! - a load checks both row counts agree before decoding anything.
//!
//! The cipher keeps the ciphertext table alone from being read back. It is
//! not a cryptographic cipher.

pub mod account;
pub mod cipher;
pub mod codec;
pub mod consistency;
pub mod error;
pub mod export;
pub mod model;
pub mod paths;
pub mod records;
pub mod session;
pub mod settings;
pub mod store;

pub use account::{Account, Strength};
pub use codec::{decode_all, encode_all, RowArena, RowPair};
pub use consistency::TableState;
pub use error::{KeeperError, Result};
pub use model::{CipherRecord, Field, KeyRecord, KeySequence, PlainRecord};
pub use records::RecordSet;
pub use session::{Keeper, SaveOutcome};
pub use settings::KeeperSettings;
pub use store::{DualTableStore, Table, TableStore};
