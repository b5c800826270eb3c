#[cfg(test)]
mod tests {
    use crate::infrastructure::SnapshotStore;
    use crate::infrastructure_in_memory::InMemorySnapshotStore;

    #[test]
    fn test_in_memory_store_starts_empty() {
        let store = InMemorySnapshotStore::new();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.checkpoints(), 0);
    }

    #[test]
    fn test_in_memory_store_keeps_latest() {
        let mut store = InMemorySnapshotStore::new();
        store.save(b"first").unwrap();
        store.save(b"second").unwrap();

        assert_eq!(store.load().unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(store.checkpoints(), 2);
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use crate::infrastructure::SnapshotStore;
        use crate::infrastructure_sqlite::SqliteSnapshotStore;

        #[test]
        fn test_sqlite_store_keeps_latest_and_prunes() {
            let mut store = SqliteSnapshotStore::open_in_memory().unwrap();
            assert_eq!(store.load().unwrap(), None);

            store.save(b"one").unwrap();
            store.save(b"two").unwrap();
            assert_eq!(store.load().unwrap().as_deref(), Some(&b"two"[..]));
            assert_eq!(store.checkpoints(), 2);
        }

        #[test]
        fn test_sqlite_store_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rlock.db");
            let path = path.to_str().unwrap();

            {
                let mut store = SqliteSnapshotStore::open(path).unwrap();
                store.save(b"checkpoint-1").unwrap();
                store.save(b"checkpoint-2").unwrap();
            }

            let reopened = SqliteSnapshotStore::open(path).unwrap();
            assert_eq!(reopened.load().unwrap().as_deref(), Some(&b"checkpoint-2"[..]));
            // Counter is per process
            assert_eq!(reopened.checkpoints(), 0);
        }

        #[test]
        fn test_sqlite_store_holds_one_row_at_rest() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rlock.db");
            let path = path.to_str().unwrap();

            let mut store = SqliteSnapshotStore::open(path).unwrap();
            for i in 0..5u8 {
                store.save(&[i]).unwrap();
            }
            drop(store);

            let conn = rusqlite::Connection::open(path).unwrap();
            let rows: i64 = conn
                .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
                .unwrap();
            assert_eq!(rows, 1);
        }
    }
}
