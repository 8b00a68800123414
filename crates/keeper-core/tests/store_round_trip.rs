//! End-to-end: record set → encode → two tables on disk → load → decode.

use keeper_core::consistency::{self, TableState};
use keeper_core::session::load_records;
use keeper_core::{
    decode_all, encode_all, DualTableStore, Field, Keeper, KeeperError, KeeperSettings,
    PlainRecord, RecordSet, SaveOutcome, Table,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_ascii(rng: &mut StdRng, max_len: usize) -> String {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| char::from(rng.gen_range(0u8..=127))).collect()
}

fn random_set(rng: &mut StdRng, n: usize) -> RecordSet {
    let mut set = RecordSet::new();
    for _ in 0..n {
        let site = random_ascii(rng, 24);
        let user = random_ascii(rng, 32);
        let pass = random_ascii(rng, 40);
        set.add(&site, &user, &pass).unwrap();
    }
    set
}

fn fields(records: &[PlainRecord]) -> Vec<(String, String, String)> {
    records
        .iter()
        .map(|r| (r.site.clone(), r.username.clone(), r.password.clone()))
        .collect()
}

#[test]
fn random_record_sets_survive_the_store() {
    let mut rng = StdRng::seed_from_u64(2024);
    let store = DualTableStore::open_in_memory().unwrap();

    for n in [0, 1, 7, 40] {
        let mut set = random_set(&mut rng, n);
        // punch holes so ids are not contiguous before the save
        if n > 3 {
            set.remove(2).unwrap();
            set.remove(3).unwrap();
        }
        let before: Vec<PlainRecord> = set.iter().cloned().collect();

        store.save_all(&encode_all(&set).unwrap()).unwrap();
        let (c, k) = store.load_all().unwrap();
        for (cipher, key) in c.iter().zip(&k) {
            for field in Field::ALL {
                assert_eq!(cipher.field(field).chars().count(), key.field(field).len());
            }
        }
        let after = decode_all(&c, &k).unwrap();

        assert_eq!(fields(&after), fields(&before));
        let ids: Vec<u32> = after.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=after.len() as u32).collect::<Vec<_>>());
    }
}

#[test]
fn ciphertext_never_contains_backslash_or_controls() {
    let mut rng = StdRng::seed_from_u64(99);
    let set = random_set(&mut rng, 25);
    let store = DualTableStore::open_in_memory().unwrap();
    store.save_all(&encode_all(&set).unwrap()).unwrap();

    let (c, _) = store.load_all().unwrap();
    for row in &c {
        for field in Field::ALL {
            assert!(row
                .field(field)
                .chars()
                .all(|ch| (' '..='~').contains(&ch) && ch != '\\'));
        }
    }
}

#[test]
fn session_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("data.db");

    {
        let keeper = Keeper::open(DualTableStore::open(&db).unwrap(), KeeperSettings::default())
            .unwrap();
        keeper
            .with_records_mut(|r| r.add("Google", "user@x.com", "Secret1!"))
            .unwrap();
        keeper
            .with_records_mut(|r| r.add("GitHub", "octo", "hunter2"))
            .unwrap();
        assert_eq!(keeper.close(true).unwrap(), SaveOutcome::Saved { rows: 2 });
    }

    let keeper =
        Keeper::open(DualTableStore::open(&db).unwrap(), KeeperSettings::default()).unwrap();
    let google = keeper.with_records(|r| r.get(1).cloned()).unwrap();
    assert_eq!(google, PlainRecord::new(1, "Google", "user@x.com", "Secret1!"));
    assert!(!keeper.has_unsaved_changes());
}

#[test]
fn mismatched_tables_block_the_session() {
    let store = DualTableStore::open_in_memory().unwrap();
    let mut set = RecordSet::new();
    set.add("a", "b", "c").unwrap();
    set.add("d", "e", "f").unwrap();
    store.save_all(&encode_all(&set).unwrap()).unwrap();

    // ciphertext left without its keys
    store.clear(Table::Keys).unwrap();
    let (c, k) = store.load_all().unwrap();
    assert_eq!(consistency::check(&c, &k), TableState::Mismatch);

    let err = load_records(&store).unwrap_err();
    assert!(matches!(err, KeeperError::Alignment { cipher_rows: 2, key_rows: 0 }));
    assert!(Keeper::open(store, KeeperSettings::default()).is_err());
}
