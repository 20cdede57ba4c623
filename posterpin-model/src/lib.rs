//! Core data model definitions shared across posterpin crates.
#![allow(missing_docs)]

pub mod error;
pub mod ids;
pub mod posters;

pub use error::{ModelError, Result as ModelResult};
pub use ids::{FilmSlug, PosterUrl, UserId};
pub use posters::{PosterAssignment, PosterMap, PosterRecord};
