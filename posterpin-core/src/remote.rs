//! Client for the remote poster service.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use posterpin_model::{FilmSlug, PosterMap, PosterUrl, UserId};
use reqwest::{Client, StatusCode, multipart};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PosterError, Result};

/// An image file picked for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct PosterFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PosterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosterFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PosterFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Read an image from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "poster".to_string());
        let content_type = guess_image_type(path).map(str::to_string);
        Ok(Self::new(file_name, content_type, bytes))
    }

    /// Only images may be uploaded. Files without a known type are left to
    /// the service to judge.
    pub fn ensure_image(&self) -> Result<()> {
        match &self.content_type {
            Some(kind) if !kind.starts_with("image/") => Err(PosterError::InvalidInput(format!(
                "{} is {kind}, not an image",
                self.file_name
            ))),
            _ if self.bytes.is_empty() => Err(PosterError::InvalidInput(format!(
                "{} is empty",
                self.file_name
            ))),
            _ => Ok(()),
        }
    }
}

fn guess_image_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    })
}

/// The backend that stores and serves poster assignments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PosterService: Send + Sync {
    /// `GET /{username}`
    async fn fetch_posters(&self, user: &UserId) -> Result<PosterMap>;

    /// `POST /upload`, returns the hosted URL of the uploaded image.
    async fn upload_poster(
        &self,
        user: &UserId,
        film: &FilmSlug,
        file: PosterFile,
    ) -> Result<PosterUrl>;

    /// `POST /link`
    async fn register_link(
        &self,
        user: &UserId,
        film: &FilmSlug,
        link: &PosterUrl,
    ) -> Result<()>;

    /// `POST /delete`
    async fn delete_poster(&self, user: &UserId, film: &FilmSlug) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct LinkRequest<'a> {
    film: &'a str,
    username: &'a str,
    link: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    film: &'a str,
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

/// [`PosterService`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpPosterService {
    client: Client,
    base_url: String,
}

impl HttpPosterService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into());
        Url::parse(&base_url).map_err(|err| {
            PosterError::Config(format!("invalid poster service url {base_url:?}: {err}"))
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        info!(base_url = %base_url, "poster service client created");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        format!("{}/{}", self.base_url, path.as_ref().trim_start_matches('/'))
    }

    /// `{base}/{user}` with the username as a single escaped path segment.
    pub fn user_url(&self, user: &UserId) -> Result<String> {
        let invalid = |reason: String| {
            PosterError::Config(format!("poster service url {:?}: {reason}", self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot take a path".into()))?
            .pop_if_empty()
            .push(user.as_str());
        Ok(url.into())
    }

    fn check_status(endpoint: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        warn!(endpoint, status = status.as_u16(), "poster service rejected request");
        Err(PosterError::Service {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Trim whitespace and trailing slashes, and add `https://` when the scheme
/// is missing.
fn normalize_base_url(raw: String) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[async_trait]
impl PosterService for HttpPosterService {
    async fn fetch_posters(&self, user: &UserId) -> Result<PosterMap> {
        let url = self.user_url(user)?;
        debug!(%user, url = %url, "fetching posters");

        let response = self.client.get(&url).send().await?;
        Self::check_status("/{username}", response.status())?;

        // Entries that are not valid slugs are dropped rather than failing
        // the whole map.
        let raw: BTreeMap<String, String> = response.json().await?;
        let posters: PosterMap = raw
            .into_iter()
            .filter_map(|(film, url)| match FilmSlug::new(&film) {
                Ok(slug) => Some((slug, PosterUrl::from_trusted(url))),
                Err(err) => {
                    warn!(%user, error = %err, "skipping poster entry");
                    None
                }
            })
            .collect();

        debug!(%user, count = posters.len(), "posters fetched");
        Ok(posters)
    }

    async fn upload_poster(
        &self,
        user: &UserId,
        film: &FilmSlug,
        file: PosterFile,
    ) -> Result<PosterUrl> {
        file.ensure_image()?;

        let mut part = multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(kind) = &file.content_type {
            part = part.mime_str(kind)?;
        }
        let form = multipart::Form::new()
            .part("poster", part)
            .text("film", film.to_string())
            .text("username", user.to_string());

        let response = self
            .client
            .post(self.build_url("upload"))
            .multipart(form)
            .send()
            .await?;
        Self::check_status("/upload", response.status())?;

        let body: UploadResponse = response.json().await?;
        let url = body
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| PosterError::MalformedResponse("/upload".to_string()))?;
        info!(%user, %film, "poster uploaded");
        Ok(PosterUrl::from_trusted(url))
    }

    async fn register_link(
        &self,
        user: &UserId,
        film: &FilmSlug,
        link: &PosterUrl,
    ) -> Result<()> {
        let body = LinkRequest {
            film: film.as_str(),
            username: user.as_str(),
            link: link.as_str(),
        };
        let response = self
            .client
            .post(self.build_url("link"))
            .json(&body)
            .send()
            .await?;
        Self::check_status("/link", response.status())?;
        info!(%user, %film, "poster link registered");
        Ok(())
    }

    async fn delete_poster(&self, user: &UserId, film: &FilmSlug) -> Result<()> {
        let body = DeleteRequest {
            film: film.as_str(),
            username: user.as_str(),
        };
        let response = self
            .client
            .post(self.build_url("delete"))
            .json(&body)
            .send()
            .await?;
        Self::check_status("/delete", response.status())?;
        info!(%user, %film, "poster deleted remotely");
        Ok(())
    }
}
