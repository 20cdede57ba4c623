//! Page-wide sweep that applies the active user's whole poster map to every
//! poster-shaped element, on any kind of page.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use posterpin_model::PosterMap;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::apply::force_poster;
use crate::contract::{IMG, POSTER_CONTAINERS};
use crate::page::HostPage;
use crate::slug::element_film_slug;

/// The poster map the sweep and the write path share. Reads are lock-only,
/// with no storage or network access.
pub type ActiveOverrides = Arc<RwLock<PosterMap>>;

/// One pass over every poster-shaped element. Returns how many images were
/// rewritten.
pub fn sweep_once(page: &dyn HostPage, posters: &PosterMap) -> usize {
    if posters.is_empty() {
        return 0;
    }

    let mut changed = 0;
    for element in page.query_all(page.document(), &POSTER_CONTAINERS) {
        let Some(slug) = element_film_slug(page, element) else {
            continue;
        };
        let Some(url) = posters.get(&slug) else {
            continue;
        };
        if let Some(img) = page.query_first(element, &IMG)
            && force_poster(page, img, url)
        {
            changed += 1;
        }
    }
    changed
}

/// Handle to the running sweep task.
#[derive(Debug)]
pub struct SweepHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the sweep and wait for the task to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// Spawn the permanent sweep. It only stops through its [`SweepHandle`].
pub fn spawn_sweep(
    page: Arc<dyn HostPage>,
    overrides: ActiveOverrides,
    every: Duration,
) -> SweepHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "universal poster sweep started");
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Guard is released at the end of the statement, before any await.
            let changed = sweep_once(page.as_ref(), &overrides.read());
            if changed > 0 {
                debug!(changed, "sweep rewrote posters");
            }
        }
        debug!("universal poster sweep stopped");
    });

    SweepHandle { token, handle }
}
