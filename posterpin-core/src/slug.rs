//! Film slug extraction, page-scoped and element-scoped. `None` always means
//! "skip", never an error.

use once_cell::sync::Lazy;
use posterpin_model::FilmSlug;
use regex::Regex;

use crate::contract::{FILM_LINK, FILM_SLUG_ATTR, POSTER_CONTAINERS, SPAN};
use crate::page::{HostPage, NodeId};

static FILM_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/film/([^/]+)/").expect("film path regex must compile"));

/// Slug from a film-detail path such as `/film/dune-2021/` or
/// `/film/dune-2021/reviews/`.
pub fn slug_from_path(path: &str) -> Option<FilmSlug> {
    FILM_PATH
        .captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|segment| FilmSlug::new(segment.as_str()).ok())
}

/// Slug of the film whose detail page is displayed, if any.
///
/// The path decides whether this is a film page. The slug itself is taken
/// from the main poster's nested `span span` text when present, since that is
/// the identifier listing pages use as well, and from the path otherwise.
pub fn page_film_slug(page: &dyn HostPage) -> Option<FilmSlug> {
    let from_path = slug_from_path(&page.location_path())?;

    let nested = page
        .query_first(page.document(), &POSTER_CONTAINERS)
        .and_then(|poster| page.query_first(poster, &SPAN))
        .and_then(|outer| page.query_first(outer, &SPAN))
        .and_then(|inner| FilmSlug::new(page.text_content(inner)).ok());

    Some(nested.unwrap_or(from_path))
}

/// Slug of the film a poster-shaped element depicts.
///
/// Tries the text of the first `span` inside the nested film link, then the
/// element's `data-film-slug`, then the link's own `/film/{slug}/` href.
pub fn element_film_slug(page: &dyn HostPage, element: NodeId) -> Option<FilmSlug> {
    let link = page.query_first(element, &FILM_LINK);

    if let Some(link) = link
        && let Some(span) = page.query_first(link, &SPAN)
        && let Ok(slug) = FilmSlug::new(page.text_content(span))
    {
        return Some(slug);
    }

    if let Some(value) = page.attribute(element, FILM_SLUG_ATTR)
        && let Ok(slug) = FilmSlug::new(value)
    {
        return Some(slug);
    }

    link.and_then(|link| page.attribute(link, "href"))
        .and_then(|href| slug_from_path(&href))
}
