//! # posterpin core
//!
//! Poster reconciliation engine: keeps a personally chosen poster on screen
//! for each (user, film) pair while the host page keeps re-rendering its own
//! artwork.
//!
//! ## Architecture
//!
//! - [`store`]: per-user poster cache persisted through a [`storage::KeyValueStore`]
//!   and refreshed from the remote [`remote::PosterService`]
//! - [`reconcile`]: bounded loop holding the main poster of a film page
//! - [`watcher`]: insertion watcher for posters created later in pop-ups
//! - [`sweep`]: permanent page-wide sweep applying the whole map
//! - [`write_path`]: choosing, uploading and deleting a poster
//! - [`agent`]: the page-lifetime context wiring all of the above
//!
//! Everything touches the page through the [`page::HostPage`] trait.
//!
//! ```no_run
//! use std::sync::Arc;
//! use posterpin_core::{EngineConfig, PosterAgent, page::MemoryPage};
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     posterpin_core::telemetry::init_tracing();
//!     let page = Arc::new(MemoryPage::new("/film/dune-2021/"));
//!     let agent = PosterAgent::from_config(page, EngineConfig::default()).await?;
//!     agent.reconciler().settled().await;
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod actions;
pub mod agent;
pub mod apply;
pub mod config;
pub mod contract;
pub mod error;
pub mod identity;
pub mod page;
pub mod reconcile;
pub mod remote;
pub mod slug;
pub mod storage;
pub mod store;
pub mod sweep;
pub mod telemetry;
pub mod watcher;
pub mod write_path;

pub use agent::PosterAgent;
pub use config::{EngineConfig, ReconcileConfig, SweepConfig};
pub use error::{PosterError, Result};
pub use posterpin_model::{FilmSlug, PosterAssignment, PosterMap, PosterRecord, PosterUrl, UserId};
pub use remote::{HttpPosterService, PosterFile, PosterService};
pub use store::PosterStore;
pub use write_path::{PosterChoice, WritePath, WriteState};
