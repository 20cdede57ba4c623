//! Bounded polling loop that holds the main poster on the chosen URL until
//! the host page stops rewriting it.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use posterpin_model::PosterUrl;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::apply::force_poster;
use crate::config::ReconcileConfig;
use crate::contract::MAIN_POSTER_IMAGES;
use crate::page::HostPage;

/// Result of one reconciliation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No poster image exists yet.
    NoElements,
    /// This many images had to be rewritten.
    Changed(usize),
    Unchanged,
}

/// Apply `url` to every main poster image currently on the page.
pub fn reconcile_tick(page: &dyn HostPage, url: &PosterUrl) -> TickOutcome {
    let images = page.query_all(page.document(), &MAIN_POSTER_IMAGES);
    if images.is_empty() {
        return TickOutcome::NoElements;
    }

    let changed = images
        .into_iter()
        .filter(|img| force_poster(page, *img, url))
        .count();
    if changed == 0 {
        TickOutcome::Unchanged
    } else {
        TickOutcome::Changed(changed)
    }
}

/// Consecutive ticks that changed nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stability {
    stable_ticks: u32,
}

impl Stability {
    pub fn observe(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::NoElements => {}
            TickOutcome::Changed(_) => self.stable_ticks = 0,
            TickOutcome::Unchanged => self.stable_ticks = self.stable_ticks.saturating_add(1),
        }
    }

    pub fn stable_ticks(&self) -> u32 {
        self.stable_ticks
    }

    pub fn is_settled(&self, threshold: u32) -> bool {
        self.stable_ticks > threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Never started.
    Idle,
    Running,
    /// Stopped on its own after the page held still long enough.
    Settled,
    /// Stopped by the owner.
    Stopped,
}

struct RunningLoop {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct SessionInner {
    page: Arc<dyn HostPage>,
    config: ReconcileConfig,
    target: RwLock<Option<PosterUrl>>,
    phase: watch::Sender<SessionPhase>,
    running: Mutex<Option<RunningLoop>>,
    generation: Mutex<u64>,
}

/// Owner of the main-poster loop: its target, its stability state and its
/// task. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct ReconciliationSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for ReconciliationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationSession")
            .field("config", &self.inner.config)
            .field("target", &*self.inner.target.read())
            .field("phase", &self.phase())
            .finish()
    }
}

impl ReconciliationSession {
    pub fn new(page: Arc<dyn HostPage>, config: ReconcileConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Self {
            inner: Arc::new(SessionInner {
                page,
                config,
                target: RwLock::new(None),
                phase,
                running: Mutex::new(None),
                generation: Mutex::new(0),
            }),
        }
    }

    pub fn target(&self) -> Option<PosterUrl> {
        self.inner.target.read().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Start driving the main poster toward `url`, replacing any loop that is
    /// still running. Must be called from within a Tokio runtime.
    pub fn start(&self, url: PosterUrl) {
        let generation = {
            let mut generation = self.inner.generation.lock();
            *generation += 1;
            *generation
        };

        let token = CancellationToken::new();
        let mut running = self.inner.running.lock();
        if let Some(previous) = running.take() {
            previous.token.cancel();
        }

        *self.inner.target.write() = Some(url.clone());
        self.inner.phase.send_replace(SessionPhase::Running);
        info!(url = %url, "main poster reconciliation started");

        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            run_loop(inner, url, loop_token, generation).await;
        });

        *running = Some(RunningLoop {
            generation,
            token,
            handle,
        });
    }

    /// Point the session at a new URL, restarting the stability window.
    pub fn retarget(&self, url: PosterUrl) {
        self.start(url);
    }

    pub fn stop(&self) {
        if let Some(previous) = self.inner.running.lock().take() {
            previous.token.cancel();
            previous.handle.abort();
            self.inner.phase.send_replace(SessionPhase::Stopped);
            debug!("main poster reconciliation stopped");
        }
    }

    /// Wait until the current loop is no longer running.
    pub async fn settled(&self) -> SessionPhase {
        let mut rx = self.inner.phase.subscribe();
        match rx.wait_for(|phase| *phase != SessionPhase::Running).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        }
    }
}

async fn run_loop(
    inner: Arc<SessionInner>,
    url: PosterUrl,
    token: CancellationToken,
    generation: u64,
) {
    let mut ticker = interval(inner.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stability = Stability::default();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let outcome = reconcile_tick(inner.page.as_ref(), &url);
        stability.observe(outcome);
        ticks += 1;

        if stability.is_settled(inner.config.stability_threshold) {
            let mut running = inner.running.lock();
            if running.as_ref().map(|r| r.generation) == Some(generation) {
                running.take();
                inner.phase.send_replace(SessionPhase::Settled);
                info!(url = %url, ticks, "main poster settled");
            }
            return;
        }
    }
}
