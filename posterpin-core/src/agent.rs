use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use posterpin_model::{FilmSlug, PosterMap, PosterUrl};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actions::{ActionLinks, inject_action_links};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::identity::{self, Identity};
use crate::page::HostPage;
use crate::reconcile::ReconciliationSession;
use crate::remote::HttpPosterService;
use crate::slug::page_film_slug;
use crate::storage::{FileKvStore, KeyValueStore, MemoryKvStore};
use crate::store::PosterStore;
use crate::sweep::{ActiveOverrides, SweepHandle, spawn_sweep};
use crate::watcher::PopupWatcher;
use crate::write_path::{PosterChoice, WritePath};

/// Everything posterpin runs for one page, from load until navigation.
///
/// Booting resolves who is looking at which film, applies the cached map
/// immediately, starts the sweep, and refreshes the cache from the poster
/// service in the background.
pub struct PosterAgent {
    page: Arc<dyn HostPage>,
    identity: Identity,
    film: Option<FilmSlug>,
    overrides: ActiveOverrides,
    reconciler: ReconciliationSession,
    watcher: Option<PopupWatcher>,
    write_path: Option<WritePath>,
    action_links: Option<ActionLinks>,
    sweep: Option<SweepHandle>,
    refresh: Option<JoinHandle<()>>,
}

impl fmt::Debug for PosterAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosterAgent")
            .field("identity", &self.identity)
            .field("film", &self.film)
            .field("overrides", &self.overrides.read().len())
            .field("reconciler", &self.reconciler)
            .field("write_path", &self.write_path)
            .finish()
    }
}

impl PosterAgent {
    /// Wire the HTTP poster service and the configured storage, then boot.
    pub async fn from_config(page: Arc<dyn HostPage>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let service = Arc::new(HttpPosterService::new(
            config.service_url.clone(),
            config.request_timeout(),
        )?);
        let storage: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileKvStore::new(dir.clone())),
            None => Arc::new(MemoryKvStore::new()),
        };
        let store = PosterStore::new(storage, service, config.storage_key.clone());
        Ok(Self::boot(page, store, &config).await)
    }

    pub async fn boot(page: Arc<dyn HostPage>, store: PosterStore, config: &EngineConfig) -> Self {
        let identity = identity::resolve(page.as_ref());
        let film = page_film_slug(page.as_ref());
        let active = identity.active_user().cloned();
        info!(
            viewer = ?identity.viewer,
            profile = ?identity.profile,
            film = ?film,
            "poster agent booting"
        );

        let cached = match &active {
            Some(user) => store.get(user).await,
            None => PosterMap::new(),
        };
        let overrides: ActiveOverrides = Arc::new(RwLock::new(cached));

        let reconciler = ReconciliationSession::new(Arc::clone(&page), config.reconcile.clone());
        let watcher = film
            .clone()
            .map(|film| PopupWatcher::new(Arc::clone(&page), film));

        if let (Some(film), Some(watcher)) = (&film, &watcher) {
            let target = overrides.read().get(film).cloned();
            if let Some(url) = target {
                reconciler.start(url.clone());
                watcher.arm(url);
            }
        }

        let write_path = match (&identity.viewer, &film, &watcher) {
            (Some(viewer), Some(film), Some(watcher)) => {
                let shared = (active.as_ref() == Some(viewer)).then(|| Arc::clone(&overrides));
                Some(WritePath::new(
                    Arc::clone(&page),
                    store.clone(),
                    viewer.clone(),
                    film.clone(),
                    shared,
                    reconciler.clone(),
                    watcher.clone(),
                ))
            }
            _ => None,
        };
        let action_links = write_path
            .as_ref()
            .and_then(|_| inject_action_links(page.as_ref()));

        let sweep = spawn_sweep(Arc::clone(&page), Arc::clone(&overrides), config.sweep.interval());

        let refresh = {
            let users = identity.observed_users();
            let store = store.clone();
            let overrides = Arc::clone(&overrides);
            let reconciler = reconciler.clone();
            let watcher = watcher.clone();
            let film = film.clone();
            // Taken before the task first runs: anything written from here on
            // is newer than what the fetch can return.
            let since = store.write_seq();
            tokio::spawn(async move {
                let results =
                    join_all(users.iter().map(|user| store.refresh_from(user, since))).await;
                for (user, result) in users.into_iter().zip(results) {
                    let mut posters = match result {
                        Ok(posters) => posters,
                        Err(err) => {
                            warn!(%user, error = %err, "poster refresh failed, keeping cached map");
                            continue;
                        }
                    };
                    if active.as_ref() != Some(&user) {
                        continue;
                    }

                    // Choices made while the fetch was in flight stay applied.
                    let target = {
                        let mut current = overrides.write();
                        store.overlay_local_writes(&user, since, &mut posters);
                        let target = film.as_ref().and_then(|film| posters.get(film).cloned());
                        *current = posters;
                        target
                    };
                    if let (Some(url), Some(watcher)) = (target, &watcher)
                        && reconciler.target().as_ref() != Some(&url)
                    {
                        debug!(url = %url, "refresh changed the main poster target");
                        reconciler.retarget(url.clone());
                        watcher.arm(url);
                    }
                }
            })
        };

        Self {
            page,
            identity,
            film,
            overrides,
            reconciler,
            watcher,
            write_path,
            action_links,
            sweep: Some(sweep),
            refresh: Some(refresh),
        }
    }

    pub fn page(&self) -> &Arc<dyn HostPage> {
        &self.page
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn film(&self) -> Option<&FilmSlug> {
        self.film.as_ref()
    }

    /// Snapshot of the poster map currently applied page-wide.
    pub fn overrides(&self) -> PosterMap {
        self.overrides.read().clone()
    }

    pub fn reconciler(&self) -> &ReconciliationSession {
        &self.reconciler
    }

    pub fn watcher(&self) -> Option<&PopupWatcher> {
        self.watcher.as_ref()
    }

    pub fn write_path(&self) -> Option<&WritePath> {
        self.write_path.as_ref()
    }

    pub fn action_links(&self) -> Option<ActionLinks> {
        self.action_links
    }

    /// Wait for the background cache refresh started at boot.
    pub async fn refreshed(&mut self) {
        if let Some(handle) = self.refresh.take() {
            let _ = handle.await;
        }
    }

    /// Submit the poster form. `Ok(None)` when there is no logged-in viewer
    /// or no film on this page.
    pub async fn choose_poster(&self, choice: PosterChoice) -> Result<Option<PosterUrl>> {
        match &self.write_path {
            Some(write_path) => write_path.submit(choice).await.map(Some),
            None => {
                debug!("poster choice ignored outside a film page");
                Ok(None)
            }
        }
    }

    /// Delete the viewer's poster for this film. `Ok(false)` when there is
    /// nothing to delete or nothing resolved.
    pub async fn delete_poster(&self) -> Result<bool> {
        match &self.write_path {
            Some(write_path) => write_path.delete().await,
            None => Ok(false),
        }
    }

    /// Stop every loop and subscription this agent started.
    pub async fn shutdown(mut self) {
        self.reconciler.stop();
        if let Some(watcher) = &self.watcher {
            watcher.shutdown();
        }
        if let Some(refresh) = self.refresh.take() {
            refresh.abort();
        }
        if let Some(sweep) = self.sweep.take() {
            sweep.shutdown().await;
        }
        debug!("poster agent shut down");
    }
}
