use std::collections::BTreeMap;

use crate::ids::{FilmSlug, PosterUrl, UserId};

/// A single (user, film, poster) choice.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosterAssignment {
    pub user: UserId,
    pub film: FilmSlug,
    pub url: PosterUrl,
}

/// Film slug to poster URL for one user. Inserting over an existing slug
/// replaces it; there is no versioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PosterMap(BTreeMap<FilmSlug, PosterUrl>);

impl PosterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, film: &FilmSlug) -> Option<&PosterUrl> {
        self.0.get(film)
    }

    /// Returns the URL that was replaced, if any.
    pub fn insert(&mut self, film: FilmSlug, url: PosterUrl) -> Option<PosterUrl> {
        self.0.insert(film, url)
    }

    pub fn remove(&mut self, film: &FilmSlug) -> Option<PosterUrl> {
        self.0.remove(film)
    }

    pub fn contains(&self, film: &FilmSlug) -> bool {
        self.0.contains_key(film)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FilmSlug, &PosterUrl)> {
        self.0.iter()
    }
}

impl FromIterator<(FilmSlug, PosterUrl)> for PosterMap {
    fn from_iter<T: IntoIterator<Item = (FilmSlug, PosterUrl)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Every cached user map, persisted wholesale as one storage value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PosterRecord(BTreeMap<UserId, PosterMap>);

impl PosterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, user: &UserId) -> Option<&PosterMap> {
        self.0.get(user)
    }

    /// Replace one user's map, leaving every other user untouched.
    pub fn replace_user(&mut self, user: UserId, posters: PosterMap) {
        self.0.insert(user, posters);
    }

    pub fn assign(&mut self, assignment: PosterAssignment) -> Option<PosterUrl> {
        self.0
            .entry(assignment.user)
            .or_default()
            .insert(assignment.film, assignment.url)
    }

    pub fn unassign(&mut self, user: &UserId, film: &FilmSlug) -> Option<PosterUrl> {
        self.0.get_mut(user).and_then(|posters| posters.remove(film))
    }

    pub fn lookup(&self, user: &UserId, film: &FilmSlug) -> Option<&PosterUrl> {
        self.0.get(user).and_then(|posters| posters.get(film))
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.0.keys()
    }
}
