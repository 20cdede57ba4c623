//! Shared fixtures for posterpin-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use posterpin_core::page::{ElementSpec, HostPage, MemoryPage, NodeId};
use posterpin_core::remote::{PosterFile, PosterService};
use posterpin_core::storage::{KeyValueStore, MemoryKvStore};
use posterpin_core::{
    EngineConfig, FilmSlug, PosterError, PosterMap, PosterStore, PosterUrl, Result, UserId,
};

pub const NATIVE_SRC: &str = "https://native.example/dune-2021.jpg";
pub const CUSTOM_SRC: &str = "https://img.example/x.jpg";
pub const UPLOADED_SRC: &str = "https://cdn.example/uploads/dune.png";

/// Requests the engine sent to the poster service, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(String),
    Upload { user: String, film: String, file_name: String },
    Link { user: String, film: String, url: String },
    Delete { user: String, film: String },
}

/// Poster service double that records every request.
#[derive(Debug, Default)]
pub struct FakePosterService {
    calls: Mutex<Vec<Call>>,
    remote: Mutex<HashMap<String, PosterMap>>,
    fail_writes: Mutex<bool>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl FakePosterService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed the map the service returns for `user`.
    pub fn with_remote(self: Arc<Self>, user: &str, posters: &[(&str, &str)]) -> Arc<Self> {
        let map: PosterMap = posters
            .iter()
            .map(|(film, url)| (slug(film), PosterUrl::from_trusted(*url)))
            .collect();
        self.remote.lock().insert(user.to_string(), map);
        self
    }

    /// Make every fetch take `delay` before answering.
    pub fn slow_fetches(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.fetch_delay.lock() = Some(delay);
        self
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        let write = !matches!(call, Call::Fetch(_));
        self.calls.lock().push(call);
        if write && *self.fail_writes.lock() {
            return Err(PosterError::Service {
                endpoint: "fake".into(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PosterService for FakePosterService {
    async fn fetch_posters(&self, user: &UserId) -> Result<PosterMap> {
        self.record(Call::Fetch(user.to_string()))?;
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .remote
            .lock()
            .get(user.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_poster(
        &self,
        user: &UserId,
        film: &FilmSlug,
        file: PosterFile,
    ) -> Result<PosterUrl> {
        self.record(Call::Upload {
            user: user.to_string(),
            film: film.to_string(),
            file_name: file.file_name,
        })?;
        Ok(PosterUrl::from_trusted(UPLOADED_SRC))
    }

    async fn register_link(&self, user: &UserId, film: &FilmSlug, url: &PosterUrl) -> Result<()> {
        self.record(Call::Link {
            user: user.to_string(),
            film: film.to_string(),
            url: url.to_string(),
        })
    }

    async fn delete_poster(&self, user: &UserId, film: &FilmSlug) -> Result<()> {
        self.record(Call::Delete {
            user: user.to_string(),
            film: film.to_string(),
        })
    }
}

pub fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

pub fn slug(film: &str) -> FilmSlug {
    FilmSlug::new(film).unwrap()
}

pub fn store_with(service: Arc<FakePosterService>) -> PosterStore {
    store_over(Arc::new(MemoryKvStore::new()), service)
}

pub fn store_over(storage: Arc<dyn KeyValueStore>, service: Arc<FakePosterService>) -> PosterStore {
    PosterStore::new(storage, service, EngineConfig::default().storage_key)
}

/// In-memory storage whose writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    fail_sets: Mutex<bool>,
}

impl FlakyKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_sets(&self) {
        *self.fail_sets.lock() = true;
    }
}

#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        if *self.fail_sets.lock() {
            return Err(PosterError::Storage(format!("{key} is read-only")));
        }
        self.inner.set(key, value).await
    }
}

/// Film page nodes the tests poke at.
#[derive(Debug, Clone, Copy)]
pub struct FilmPage {
    pub main_image: NodeId,
    pub actions_panel: NodeId,
}

/// Page at `path` with `viewer` logged in (if any), a main poster showing the
/// native artwork and an empty actions panel.
pub fn film_page(path: &str, viewer: Option<&str>) -> (Arc<MemoryPage>, FilmPage) {
    let page = Arc::new(MemoryPage::new(path));
    if let Some(viewer) = viewer {
        page.insert(
            page.body(),
            ElementSpec::new("nav").child(ElementSpec::new("a").attr("href", "#").text(viewer)),
        );
    }

    let poster = page.insert(page.body(), ElementSpec::new("div").class("film-poster"));
    let main_image = page.insert(
        poster,
        ElementSpec::new("img")
            .attr("src", NATIVE_SRC)
            .attr("srcset", "https://native.example/dune-2021-2x.jpg 2x"),
    );
    let actions_panel = page.insert(page.body(), ElementSpec::new("ul").class("js-actions-panel"));

    (
        page,
        FilmPage {
            main_image,
            actions_panel,
        },
    )
}

/// A listing tile linking to `/film/{film}/`.
pub fn poster_tile(page: &MemoryPage, parent: NodeId, film: &str) -> NodeId {
    let tile = page.insert(
        parent,
        ElementSpec::new("div").class("poster").child(
            ElementSpec::new("a")
                .attr("href", format!("/film/{film}/"))
                .child(
                    ElementSpec::new("img")
                        .attr("src", format!("https://native.example/{film}.jpg")),
                ),
        ),
    );
    page.query_first(tile, &posterpin_core::contract::IMG).unwrap()
}

pub fn src(page: &MemoryPage, img: NodeId) -> Option<String> {
    page.attribute(img, "src")
}
