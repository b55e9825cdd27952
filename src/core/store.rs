//! In-memory user store.
//!
//! Authoritative state while the process runs; the durable backend only
//! repopulates it at startup. A single mutex over the whole map serializes
//! the read-check-write sequence for claims, which is what prevents two
//! concurrent claims of the same type from both observing "eligible".

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::core::{UserId, UserRecord};

#[derive(Debug, Default)]
pub struct UserStore {
    inner: Mutex<BTreeMap<UserId, UserRecord>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record for `id`, if any. Absence is not an error.
    pub fn get(&self, id: UserId) -> Option<UserRecord> {
        self.lock().get(&id).cloned()
    }

    /// Insert or replace wholesale. Last writer wins.
    pub fn upsert(&self, record: UserRecord) {
        self.lock().insert(record.id, record);
    }

    /// Full record set, for persistence. Iteration order is not significant.
    pub fn snapshot_all(&self) -> Vec<UserRecord> {
        self.lock().values().cloned().collect()
    }

    /// Bulk-replace the whole map. Used once at startup.
    pub fn load_all(&self, records: Vec<UserRecord>) {
        let mut map = self.lock();
        map.clear();
        for record in records {
            map.insert(record.id, record);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` on the record for `id` under the store lock, creating the
    /// record first if absent. Returns the record as it stands after `f`,
    /// together with the full set (for file backends) and `f`'s result.
    ///
    /// Creation is idempotent: an existing record keeps its fields, except
    /// that an empty username is filled in when the caller supplies one.
    pub fn with_record<T>(
        &self,
        id: UserId,
        username: &str,
        f: impl FnOnce(&mut UserRecord) -> T,
    ) -> (UserRecord, Vec<UserRecord>, T) {
        let mut map = self.lock();
        let record = map
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, username));
        if record.username.is_empty() && !username.is_empty() {
            record.username = username.to_string();
        }
        let out = f(record);
        let updated = record.clone();
        let all = map.values().cloned().collect();
        (updated, all, out)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<UserId, UserRecord>> {
        // A poisoned lock means a panic mid-mutation; the map holds only
        // whole records, so the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_without_creating() {
        let store = UserStore::new();
        assert!(store.get(UserId(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn with_record_creates_once() {
        let store = UserStore::new();
        let (rec, _, _) = store.with_record(UserId(1), "ada", |_| ());
        assert_eq!(rec.username, "ada");
        assert_eq!(rec.dots, 0);

        // Second ensure is a no-op on existing fields.
        let (rec, all, _) = store.with_record(UserId(1), "other", |r| r.dots += 10);
        assert_eq!(rec.username, "ada");
        assert_eq!(rec.dots, 10);
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn with_record_fills_empty_username() {
        let store = UserStore::new();
        store.with_record(UserId(1), "", |_| ());
        let (rec, _, _) = store.with_record(UserId(1), "ada", |_| ());
        assert_eq!(rec.username, "ada");
    }

    #[test]
    fn load_all_replaces() {
        let store = UserStore::new();
        store.upsert(UserRecord::new(UserId(1), "a"));
        store.load_all(vec![
            UserRecord::new(UserId(2), "b"),
            UserRecord::new(UserId(3), "c"),
        ]);
        assert!(store.get(UserId(1)).is_none());
        assert_eq!(store.len(), 2);
    }
}
