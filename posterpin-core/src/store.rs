use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use posterpin_model::{FilmSlug, PosterAssignment, PosterMap, PosterRecord, PosterUrl, UserId};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::remote::PosterService;
use crate::storage::KeyValueStore;

/// Latest local write per (user, film), stamped with a sequence number.
/// `None` marks a deletion. Bounded by the films touched in one session.
#[derive(Debug, Default)]
struct WriteJournal {
    seq: u64,
    entries: BTreeMap<(UserId, FilmSlug), (u64, Option<PosterUrl>)>,
}

/// Cache of every known user's poster map, persisted as one record.
///
/// Mutations read the whole record, change it and write it back while
/// holding `record_lock`, so overlapping mutations from one session do not
/// lose each other. Other processes sharing the storage are not coordinated.
///
/// A refresh never undoes a `set` or `delete` made while its fetch was in
/// flight: local writes newer than the fetch are laid over the fetched map.
#[derive(Clone)]
pub struct PosterStore {
    storage: Arc<dyn KeyValueStore>,
    service: Arc<dyn PosterService>,
    key: String,
    journal: Arc<Mutex<WriteJournal>>,
    record_lock: Arc<tokio::sync::Mutex<()>>,
}

impl fmt::Debug for PosterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosterStore")
            .field("key", &self.key)
            .field("write_seq", &self.write_seq())
            .finish()
    }
}

impl PosterStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        service: Arc<dyn PosterService>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            service,
            key: key.into(),
            journal: Arc::new(Mutex::new(WriteJournal::default())),
            record_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn service(&self) -> Arc<dyn PosterService> {
        Arc::clone(&self.service)
    }

    /// Sequence number of the latest local `set` or `delete`.
    pub fn write_seq(&self) -> u64 {
        self.journal.lock().seq
    }

    /// Apply to `posters` every local write for `user` made after `since`.
    pub fn overlay_local_writes(&self, user: &UserId, since: u64, posters: &mut PosterMap) {
        let journal = self.journal.lock();
        for ((owner, film), (seq, url)) in &journal.entries {
            if owner != user || *seq <= since {
                continue;
            }
            match url {
                Some(url) => {
                    posters.insert(film.clone(), url.clone());
                }
                None => {
                    posters.remove(film);
                }
            }
        }
    }

    fn journal_write(&self, user: &UserId, film: &FilmSlug, url: Option<PosterUrl>) {
        let mut journal = self.journal.lock();
        journal.seq += 1;
        let seq = journal.seq;
        journal
            .entries
            .insert((user.clone(), film.clone()), (seq, url));
    }

    async fn read_record(&self) -> Result<PosterRecord> {
        match self.storage.get(&self.key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(PosterRecord::new()),
        }
    }

    /// Stored record, or an empty one when it is missing or unreadable so the
    /// next write replaces it.
    async fn load_record(&self) -> PosterRecord {
        match self.read_record().await {
            Ok(record) => record,
            Err(err) => {
                warn!(key = %self.key, error = %err, "poster cache unreadable, starting over");
                PosterRecord::new()
            }
        }
    }

    async fn write_record(&self, record: &PosterRecord) -> Result<()> {
        self.storage
            .set(&self.key, serde_json::to_value(record)?)
            .await
    }

    /// Fetch the authoritative map for `user` and store it, keeping every
    /// other user's cached map. Only the fetch can fail: a failed local write
    /// is logged and the fetched map is still returned.
    pub async fn refresh(&self, user: &UserId) -> Result<PosterMap> {
        self.refresh_from(user, self.write_seq()).await
    }

    /// [`refresh`](Self::refresh) where every local write made after `since`,
    /// a [`write_seq`](Self::write_seq) taken earlier, wins over the fetch.
    pub async fn refresh_from(&self, user: &UserId, since: u64) -> Result<PosterMap> {
        let mut posters = self.service.fetch_posters(user).await?;

        let _guard = self.record_lock.lock().await;
        self.overlay_local_writes(user, since, &mut posters);
        let mut record = self.load_record().await;
        record.replace_user(user.clone(), posters.clone());
        if let Err(err) = self.write_record(&record).await {
            warn!(%user, error = %err, "refreshed posters not cached locally");
        }

        info!(%user, count = posters.len(), "poster cache refreshed");
        Ok(posters)
    }

    /// Cached map for `user`. Anything going wrong reads as "no overrides".
    pub async fn get(&self, user: &UserId) -> PosterMap {
        self.load_record()
            .await
            .user(user)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn lookup(&self, user: &UserId, film: &FilmSlug) -> Option<PosterUrl> {
        self.get(user).await.get(film).cloned()
    }

    pub async fn set(&self, user: &UserId, film: &FilmSlug, url: PosterUrl) -> Result<()> {
        self.journal_write(user, film, Some(url.clone()));
        let _guard = self.record_lock.lock().await;
        let mut record = self.load_record().await;
        record.assign(PosterAssignment {
            user: user.clone(),
            film: film.clone(),
            url,
        });
        self.write_record(&record).await?;
        debug!(%user, %film, "poster cached");
        Ok(())
    }

    /// Returns the URL that was removed, if there was one.
    pub async fn delete(&self, user: &UserId, film: &FilmSlug) -> Result<Option<PosterUrl>> {
        self.journal_write(user, film, None);
        let _guard = self.record_lock.lock().await;
        let mut record = self.load_record().await;
        let removed = record.unassign(user, film);
        if removed.is_some() {
            self.write_record(&record).await?;
            debug!(%user, %film, "poster removed from cache");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosterError;
    use crate::remote::MockPosterService;
    use crate::storage::MemoryKvStore;
    use serde_json::json;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn film(slug: &str) -> FilmSlug {
        FilmSlug::new(slug).unwrap()
    }

    #[tokio::test]
    async fn refresh_merges_into_existing_record() {
        let storage = Arc::new(MemoryKvStore::new());
        storage
            .set("customPosters", json!({"bob": {"alien": "https://img/bob.jpg"}}))
            .await
            .unwrap();

        let mut service = MockPosterService::new();
        service
            .expect_fetch_posters()
            .withf(|user| user.as_str() == "alice")
            .times(1)
            .returning(|_| {
                Ok([(film("dune-2021"), PosterUrl::from_trusted("https://img/x.jpg"))]
                    .into_iter()
                    .collect())
            });

        let store = PosterStore::new(storage.clone(), Arc::new(service), "customPosters");
        let fetched = store.refresh(&user("alice")).await.unwrap();
        assert_eq!(fetched.len(), 1);

        assert_eq!(
            storage.get("customPosters").await.unwrap(),
            Some(json!({
                "alice": {"dune-2021": "https://img/x.jpg"},
                "bob": {"alien": "https://img/bob.jpg"}
            }))
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cached_map() {
        let storage = Arc::new(MemoryKvStore::new());
        storage
            .set("customPosters", json!({"alice": {"dune-2021": "https://img/old.jpg"}}))
            .await
            .unwrap();

        let mut service = MockPosterService::new();
        service.expect_fetch_posters().returning(|_| {
            Err(PosterError::Service {
                endpoint: "/{username}".into(),
                status: 503,
            })
        });

        let store = PosterStore::new(storage, Arc::new(service), "customPosters");
        assert!(store.refresh(&user("alice")).await.is_err());
        assert_eq!(
            store.lookup(&user("alice"), &film("dune-2021")).await,
            Some(PosterUrl::from_trusted("https://img/old.jpg"))
        );
    }

    #[tokio::test]
    async fn corrupt_storage_reads_as_empty() {
        let storage = Arc::new(MemoryKvStore::new());
        storage.set("customPosters", json!(["not", "a", "map"])).await.unwrap();

        let store = PosterStore::new(storage, Arc::new(MockPosterService::new()), "customPosters");
        assert!(store.get(&user("alice")).await.is_empty());
    }

    #[tokio::test]
    async fn refresh_heals_corrupt_storage() {
        let storage = Arc::new(MemoryKvStore::new());
        storage.set("customPosters", json!(["garbage"])).await.unwrap();

        let mut service = MockPosterService::new();
        service.expect_fetch_posters().returning(|_| {
            Ok([(film("dune-2021"), PosterUrl::from_trusted("https://img/x.jpg"))]
                .into_iter()
                .collect())
        });

        let store = PosterStore::new(storage.clone(), Arc::new(service), "customPosters");
        let fetched = store.refresh(&user("alice")).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(
            storage.get("customPosters").await.unwrap(),
            Some(json!({"alice": {"dune-2021": "https://img/x.jpg"}}))
        );

        store
            .set(&user("bob"), &film("alien"), PosterUrl::from_trusted("https://img/b.jpg"))
            .await
            .unwrap();
        assert!(store.lookup(&user("alice"), &film("dune-2021")).await.is_some());
    }

    #[tokio::test]
    async fn set_over_corrupt_storage_starts_a_new_record() {
        let storage = Arc::new(MemoryKvStore::new());
        storage.set("customPosters", json!("garbage")).await.unwrap();

        let store = PosterStore::new(storage, Arc::new(MockPosterService::new()), "customPosters");
        store
            .set(&user("alice"), &film("dune-2021"), PosterUrl::from_trusted("https://img/x.jpg"))
            .await
            .unwrap();
        assert_eq!(
            store.lookup(&user("alice"), &film("dune-2021")).await,
            Some(PosterUrl::from_trusted("https://img/x.jpg"))
        );
    }

    #[tokio::test]
    async fn local_writes_newer_than_a_fetch_win() {
        let store = PosterStore::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(MockPosterService::new()),
            "customPosters",
        );
        let alice = user("alice");
        let since = store.write_seq();

        store
            .set(&alice, &film("dune-2021"), PosterUrl::from_trusted("https://img/new.jpg"))
            .await
            .unwrap();
        store.delete(&alice, &film("alien")).await.unwrap();
        store
            .set(&user("bob"), &film("heat"), PosterUrl::from_trusted("https://img/bob.jpg"))
            .await
            .unwrap();

        let mut fetched: PosterMap = [
            (film("dune-2021"), PosterUrl::from_trusted("https://img/old.jpg")),
            (film("alien"), PosterUrl::from_trusted("https://img/alien.jpg")),
        ]
        .into_iter()
        .collect();
        store.overlay_local_writes(&alice, since, &mut fetched);

        assert_eq!(
            fetched.get(&film("dune-2021")),
            Some(&PosterUrl::from_trusted("https://img/new.jpg"))
        );
        assert!(!fetched.contains(&film("alien")));
        assert!(!fetched.contains(&film("heat")));

        let mut untouched = PosterMap::new();
        store.overlay_local_writes(&alice, store.write_seq(), &mut untouched);
        assert!(untouched.is_empty());
    }

    #[tokio::test]
    async fn refresh_from_keeps_choices_made_after_it_started() {
        let mut service = MockPosterService::new();
        service.expect_fetch_posters().returning(|_| {
            Ok([(film("dune-2021"), PosterUrl::from_trusted("https://img/old.jpg"))]
                .into_iter()
                .collect())
        });
        let store = PosterStore::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(service),
            "customPosters",
        );
        let alice = user("alice");

        let since = store.write_seq();
        store
            .set(&alice, &film("dune-2021"), PosterUrl::from_trusted("https://img/x.jpg"))
            .await
            .unwrap();

        let fetched = store.refresh_from(&alice, since).await.unwrap();
        assert_eq!(
            fetched.get(&film("dune-2021")),
            Some(&PosterUrl::from_trusted("https://img/x.jpg"))
        );
        assert_eq!(
            store.lookup(&alice, &film("dune-2021")).await,
            Some(PosterUrl::from_trusted("https://img/x.jpg"))
        );

        // A plain refresh starts after the choice, so the fetch is taken as is.
        store.refresh(&alice).await.unwrap();
        assert_eq!(
            store.lookup(&alice, &film("dune-2021")).await,
            Some(PosterUrl::from_trusted("https://img/old.jpg"))
        );
    }

    #[tokio::test]
    async fn set_then_delete() {
        let store = PosterStore::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(MockPosterService::new()),
            "customPosters",
        );
        let alice = user("alice");
        let dune = film("dune-2021");

        store
            .set(&alice, &dune, PosterUrl::from_trusted("https://img/x.jpg"))
            .await
            .unwrap();
        assert!(store.lookup(&alice, &dune).await.is_some());

        let removed = store.delete(&alice, &dune).await.unwrap();
        assert_eq!(removed, Some(PosterUrl::from_trusted("https://img/x.jpg")));
        assert_eq!(store.lookup(&alice, &dune).await, None);
        assert_eq!(store.delete(&alice, &dune).await.unwrap(), None);
    }
}
