//! Insertion watcher for poster images that appear after the main loop has
//! settled, e.g. inside pop-ups, modals and diary forms.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use posterpin_model::{FilmSlug, PosterUrl};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::apply::force_poster;
use crate::contract::{IMG, LIST_POSTER_IMAGES, POPUP_POSTER_IMAGES, POSTER_CONTAINERS};
use crate::page::{DomMutation, HostPage, NodeId};
use crate::slug::element_film_slug;

/// Force `url` onto the pop-up and poster-list images of a freshly inserted
/// subtree, `root` included. Images inside a poster that names a different
/// film are left alone. Returns the number of images rewritten.
pub fn apply_to_inserted(
    page: &dyn HostPage,
    root: NodeId,
    film: &FilmSlug,
    url: &PosterUrl,
) -> usize {
    let mut images = BTreeSet::new();
    for selector in [&*POPUP_POSTER_IMAGES, &*LIST_POSTER_IMAGES] {
        if page.matches(root, selector) {
            images.insert(root);
        }
        images.extend(page.query_all(root, selector));
    }
    if images.is_empty() {
        return 0;
    }

    let mut containers = page.query_all(root, &POSTER_CONTAINERS);
    if page.matches(root, &POSTER_CONTAINERS) {
        containers.push(root);
    }
    for container in containers {
        match element_film_slug(page, container) {
            Some(slug) if &slug != film => {
                for img in page.query_all(container, &IMG) {
                    images.remove(&img);
                }
            }
            _ => {}
        }
    }

    images
        .into_iter()
        .filter(|img| force_poster(page, *img, url))
        .count()
}

struct WatcherInner {
    page: Arc<dyn HostPage>,
    film: FilmSlug,
    target: RwLock<Option<PosterUrl>>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Subscription to page insertions for one film page. Arming it a second
/// time only swaps the target; there is never more than one subscription.
#[derive(Clone)]
pub struct PopupWatcher {
    inner: Arc<WatcherInner>,
}

impl fmt::Debug for PopupWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupWatcher")
            .field("film", &self.inner.film)
            .field("target", &*self.inner.target.read())
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl PopupWatcher {
    pub fn new(page: Arc<dyn HostPage>, film: FilmSlug) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                page,
                film,
                target: RwLock::new(None),
                token: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn target(&self) -> Option<PosterUrl> {
        self.inner.target.read().clone()
    }

    pub fn is_armed(&self) -> bool {
        self.inner.task.lock().is_some() && !self.inner.token.is_cancelled()
    }

    /// Start watching with `url` as the target, or retarget the running
    /// subscription. Must be called from within a Tokio runtime.
    pub fn arm(&self, url: PosterUrl) {
        *self.inner.target.write() = Some(url);

        let mut task = self.inner.task.lock();
        if task.is_some() || self.inner.token.is_cancelled() {
            return;
        }

        // Subscribe before spawning so nothing inserted from here on is missed.
        let rx = self.inner.page.subscribe();
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            watch_insertions(inner, rx).await;
        }));
        debug!(film = %self.inner.film, "popup watcher armed");
    }

    /// Keep the subscription but stop rewriting inserted images.
    pub fn disarm(&self) {
        if self.inner.target.write().take().is_some() {
            debug!(film = %self.inner.film, "popup watcher disarmed");
        }
    }

    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }
}

async fn watch_insertions(
    inner: Arc<WatcherInner>,
    mut rx: tokio::sync::broadcast::Receiver<DomMutation>,
) {
    loop {
        let root = tokio::select! {
            _ = inner.token.cancelled() => break,
            received = rx.recv() => match received {
                Ok(DomMutation::Inserted { node, .. }) => node,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "popup watcher lagged, rescanning body");
                    inner.page.body()
                }
                Err(RecvError::Closed) => break,
            },
        };

        let Some(url) = inner.target.read().clone() else {
            continue;
        };
        let fixed = apply_to_inserted(inner.page.as_ref(), root, &inner.film, &url);
        if fixed > 0 {
            debug!(film = %inner.film, fixed, "inserted poster images corrected");
        }
    }
    debug!(film = %inner.film, "popup watcher stopped");
}
