//! Choosing and deleting a poster for the film on screen.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use posterpin_model::{FilmSlug, PosterUrl, UserId};
use tracing::{debug, error, info, warn};

use crate::error::{PosterError, Result};
use crate::page::HostPage;
use crate::reconcile::ReconciliationSession;
use crate::remote::PosterFile;
use crate::store::PosterStore;
use crate::sweep::ActiveOverrides;
use crate::watcher::PopupWatcher;

pub const MISSING_INPUT_ALERT: &str = "Choose a file or paste a URL!";
pub const INVALID_LINK_ALERT: &str = "That link is not a valid image URL.";

/// Values of the poster form. A file wins over a pasted link.
#[derive(Debug, Clone, Default)]
pub struct PosterChoice {
    pub file: Option<PosterFile>,
    pub link: String,
}

impl PosterChoice {
    pub fn from_link(link: impl Into<String>) -> Self {
        Self {
            file: None,
            link: link.into(),
        }
    }

    pub fn from_file(file: PosterFile) -> Self {
        Self {
            file: Some(file),
            link: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    Submitting,
    Persisted(PosterUrl),
    Failed(String),
}

enum Submission {
    Upload(PosterFile),
    Link(PosterUrl),
}

/// Write path for one (viewer, film) pair. Only built when both are known.
#[derive(Clone)]
pub struct WritePath {
    page: Arc<dyn HostPage>,
    store: PosterStore,
    user: UserId,
    film: FilmSlug,
    overrides: Option<ActiveOverrides>,
    reconciler: ReconciliationSession,
    watcher: PopupWatcher,
    state: Arc<RwLock<WriteState>>,
}

impl fmt::Debug for WritePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePath")
            .field("user", &self.user)
            .field("film", &self.film)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl WritePath {
    /// `overrides` is the sweep's map when it belongs to `user`, so new
    /// choices show up on listing elements without a reload.
    pub fn new(
        page: Arc<dyn HostPage>,
        store: PosterStore,
        user: UserId,
        film: FilmSlug,
        overrides: Option<ActiveOverrides>,
        reconciler: ReconciliationSession,
        watcher: PopupWatcher,
    ) -> Self {
        Self {
            page,
            store,
            user,
            film,
            overrides,
            reconciler,
            watcher,
            state: Arc::new(RwLock::new(WriteState::Idle)),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn film(&self) -> &FilmSlug {
        &self.film
    }

    pub fn state(&self) -> WriteState {
        self.state.read().clone()
    }

    fn set_state(&self, state: WriteState) {
        *self.state.write() = state;
    }

    fn prepare(&self, choice: PosterChoice) -> Result<Submission> {
        if let Some(file) = choice.file {
            file.ensure_image()?;
            return Ok(Submission::Upload(file));
        }

        let link = choice.link.trim();
        if link.is_empty() {
            self.page.alert(MISSING_INPUT_ALERT);
            return Err(PosterError::MissingInput(
                "neither a file nor a link was given".into(),
            ));
        }

        PosterUrl::parse(link).map(Submission::Link).map_err(|err| {
            self.page.alert(INVALID_LINK_ALERT);
            PosterError::from(err)
        })
    }

    /// Persist the choice remotely, cache it and show it right away. Failures
    /// are logged and left for the user to retry.
    pub async fn submit(&self, choice: PosterChoice) -> Result<PosterUrl> {
        let submission = self.prepare(choice)?;
        self.set_state(WriteState::Submitting);

        let service = self.store.service();
        let persisted = match submission {
            Submission::Upload(file) => {
                debug!(user = %self.user, film = %self.film, file = ?file, "uploading poster");
                service.upload_poster(&self.user, &self.film, file).await
            }
            Submission::Link(url) => {
                debug!(user = %self.user, film = %self.film, url = %url, "registering poster link");
                let registered = service.register_link(&self.user, &self.film, &url).await;
                registered.map(|()| url)
            }
        };

        let url = match persisted {
            Ok(url) => url,
            Err(err) => {
                error!(user = %self.user, film = %self.film, error = %err, "poster submission failed");
                self.set_state(WriteState::Failed(err.to_string()));
                return Err(err);
            }
        };

        if let Err(err) = self.store.set(&self.user, &self.film, url.clone()).await {
            warn!(error = %err, "poster saved remotely but not cached locally");
        }
        if let Some(overrides) = &self.overrides {
            overrides.write().insert(self.film.clone(), url.clone());
        }

        self.reconciler.retarget(url.clone());
        self.watcher.arm(url.clone());

        info!(user = %self.user, film = %self.film, url = %url, "custom poster applied");
        self.set_state(WriteState::Persisted(url.clone()));
        Ok(url)
    }

    /// Remove the custom poster for this film and reload the page so the
    /// native poster comes back. Returns `false` when there was nothing to
    /// remove.
    pub async fn delete(&self) -> Result<bool> {
        if self.store.lookup(&self.user, &self.film).await.is_none() {
            debug!(user = %self.user, film = %self.film, "no custom poster to delete");
            return Ok(false);
        }

        if let Err(err) = self.store.service().delete_poster(&self.user, &self.film).await {
            error!(user = %self.user, film = %self.film, error = %err, "poster delete failed");
            return Err(err);
        }

        // The remote entry is gone; a stale cache must not keep it on screen.
        if let Err(err) = self.store.delete(&self.user, &self.film).await {
            warn!(user = %self.user, film = %self.film, error = %err, "deleted poster still cached");
        }
        if let Some(overrides) = &self.overrides {
            overrides.write().remove(&self.film);
        }
        self.reconciler.stop();
        self.watcher.disarm();
        self.set_state(WriteState::Idle);

        info!(user = %self.user, film = %self.film, "custom poster deleted, reloading");
        self.page.reload();
        Ok(true)
    }
}
