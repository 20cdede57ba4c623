//! Selectors and markers of the host site's page shape.

use once_cell::sync::Lazy;

use crate::page::Selector;

fn literal(source: &str) -> Selector {
    Selector::parse(source).expect("host page selector literal must parse")
}

/// Poster-shaped containers on any page.
pub static POSTER_CONTAINERS: Lazy<Selector> = Lazy::new(|| literal(".film-poster, .poster"));

/// Images of the main poster on a film page.
pub static MAIN_POSTER_IMAGES: Lazy<Selector> =
    Lazy::new(|| literal("div.film-poster img, div.poster img"));

/// Poster images inside pop-ups and modals.
pub static POPUP_POSTER_IMAGES: Lazy<Selector> = Lazy::new(|| literal(".modal img, .poster img"));

/// Poster images inside diary entries and poster lists.
pub static LIST_POSTER_IMAGES: Lazy<Selector> = Lazy::new(|| {
    literal(".poster-list .poster img, .poster-list .film-poster img")
});

/// Link to a film-detail page nested in a poster.
pub static FILM_LINK: Lazy<Selector> = Lazy::new(|| literal("a[href*='/film/']"));

pub static SPAN: Lazy<Selector> = Lazy::new(|| literal("span"));

pub static IMG: Lazy<Selector> = Lazy::new(|| literal("img"));

/// The account menu link whose text is the logged-in username.
pub static ACCOUNT_LINK: Lazy<Selector> = Lazy::new(|| literal("a[href='#']"));

pub static ACTIONS_PANEL: Lazy<Selector> = Lazy::new(|| literal("ul.js-actions-panel"));

pub static CHOOSE_BUTTON: Lazy<Selector> = Lazy::new(|| literal(".custom-poster-btn"));

pub const CHOOSE_BUTTON_CLASS: &str = "custom-poster-btn menu-item";
pub const DELETE_BUTTON_CLASS: &str = "custom-poster-delete-btn menu-item";
pub const CHOOSE_BUTTON_LABEL: &str = "Choose your poster";
pub const DELETE_BUTTON_LABEL: &str = "Delete custom poster";

/// Fallback slug attribute on poster containers (`dataset.filmSlug`).
pub const FILM_SLUG_ATTR: &str = "data-film-slug";

/// First path segments that never name a member profile.
pub const RESERVED_PATH_SEGMENTS: &[&str] =
    &["films", "film", "pro", "lists", "members", "journal"];
