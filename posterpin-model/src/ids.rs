use std::fmt;

use crate::error::{ModelError, Result};

/// Lower-cased account name whose poster preferences apply.
///
/// Deserialization is transparent and does not re-normalize; records written by
/// this crate only ever contain normalized names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UserId(String);

impl UserId {
    /// Trim and lower-case a raw username.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let normalized = raw.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ModelError::EmptyUser);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Film identifier as it appears in `/film/{slug}/` paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FilmSlug(String);

impl FilmSlug {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty()
            || trimmed.contains('/')
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(ModelError::InvalidSlug(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilmSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FilmSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Image URL shown in place of the site's native poster.
///
/// [`PosterUrl::parse`] validates user input. URLs coming back from storage or
/// the poster service go through [`PosterUrl::from_trusted`] untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PosterUrl(String);

impl PosterUrl {
    /// Accept a pasted link if it is an absolute http(s) URL. Whether it
    /// resolves to an image is not checked.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|err| ModelError::InvalidPosterUrl(format!("{trimmed}: {err}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self(trimmed.to_string())),
            other => Err(ModelError::InvalidPosterUrl(format!(
                "unsupported scheme {other:?} in {trimmed}"
            ))),
        }
    }

    pub fn from_trusted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PosterUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PosterUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_is_trimmed_and_lowercased() {
        let user = UserId::new("  Alice ").unwrap();
        assert_eq!(user.as_str(), "alice");
        assert_eq!(UserId::new("   "), Err(ModelError::EmptyUser));
    }

    #[test]
    fn film_slug_rejects_path_fragments() {
        assert_eq!(FilmSlug::new(" dune-2021 ").unwrap().as_str(), "dune-2021");
        assert!(FilmSlug::new("film/dune").is_err());
        assert!(FilmSlug::new("two words").is_err());
        assert!(FilmSlug::new("").is_err());
    }

    #[test]
    fn poster_url_requires_absolute_http() {
        let url = PosterUrl::parse(" https://img.example/x.jpg ").unwrap();
        assert_eq!(url.as_str(), "https://img.example/x.jpg");
        assert!(PosterUrl::parse("not a url").is_err());
        assert!(PosterUrl::parse("file:///tmp/x.jpg").is_err());
    }
}
