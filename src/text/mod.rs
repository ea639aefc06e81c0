//! Loading of the text that is burnt into images.
//!
//! The text is fetched from a [`TextSource`] at most once per [`OverlayTextLoader`], optionally
//! mirrored to a cache directory so that later processes do not need to fetch it again.

use crate::config::{TextConfig, TextSourceConfig};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

const CACHE_FILE_NAME: &str = "viewer_text.txt";

#[derive(Debug, Error)]
pub enum TextSourceError {
	#[error("failed to read overlay text from {path}: {source}")]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("failed to fetch overlay text from {url}: {source}")]
	Http { url: String, source: reqwest::Error },
}

/// What to do when the overlay text cannot be fetched.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchFailurePolicy {
	/// Fail the request that needed the text.
	#[default]
	Propagate,
	/// Log the failure and continue with empty text.
	Empty,
}

#[async_trait]
pub trait TextSource: Send + Sync {
	async fn fetch(&self) -> Result<String, TextSourceError>;

	/// Human readable location of the source, used in logs.
	fn location(&self) -> String;
}

pub struct FileSource {
	path: PathBuf,
}

impl FileSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

#[async_trait]
impl TextSource for FileSource {
	async fn fetch(&self) -> Result<String, TextSourceError> {
		tokio::fs::read_to_string(&self.path)
			.await
			.map_err(|source| TextSourceError::Io {
				path: self.path.clone(),
				source,
			})
	}

	fn location(&self) -> String {
		self.path.display().to_string()
	}
}

pub struct HttpSource {
	url: String,
	client: reqwest::Client,
}

impl HttpSource {
	pub fn new(url: impl Into<String>) -> Self {
		Self::with_client(url, reqwest::Client::new())
	}

	pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
		Self {
			url: url.into(),
			client,
		}
	}
}

#[async_trait]
impl TextSource for HttpSource {
	async fn fetch(&self) -> Result<String, TextSourceError> {
		let http_error = |source| TextSourceError::Http {
			url: self.url.clone(),
			source,
		};
		self.client
			.get(&self.url)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(http_error)?
			.text()
			.await
			.map_err(http_error)
	}

	fn location(&self) -> String {
		self.url.clone()
	}
}

/// Lazily loads the overlay text and keeps it for the lifetime of the loader.
///
/// Concurrent callers wait for a single fetch. Failed fetches are not cached, so a later call
/// tries again.
pub struct OverlayTextLoader {
	source: Box<dyn TextSource>,
	cache_dir: Option<PathBuf>,
	policy: FetchFailurePolicy,
	text: OnceCell<Arc<str>>,
}

impl OverlayTextLoader {
	pub fn new(
		source: Box<dyn TextSource>,
		cache_dir: Option<PathBuf>,
		policy: FetchFailurePolicy,
	) -> Self {
		Self {
			source,
			cache_dir,
			policy,
			text: OnceCell::new(),
		}
	}

	pub fn from_config(config: &TextConfig) -> Self {
		let source: Box<dyn TextSource> = match &config.source {
			TextSourceConfig::File { path } => Box::new(FileSource::new(path)),
			TextSourceConfig::Http { url } => Box::new(HttpSource::new(url)),
		};
		Self::new(source, config.cache_dir.clone(), config.on_fetch_error)
	}

	/// Returns the overlay text, fetching it on first use.
	///
	/// # Errors
	/// Fails if the text cannot be fetched and the policy is [`FetchFailurePolicy::Propagate`].
	pub async fn text(&self) -> Result<Arc<str>, TextSourceError> {
		match self.text.get_or_try_init(|| self.load()).await {
			Ok(text) => Ok(Arc::clone(text)),
			Err(err) if self.policy == FetchFailurePolicy::Empty => {
				error!("Continuing without overlay text: {err}");
				Ok(Arc::from(""))
			}
			Err(err) => Err(err),
		}
	}

	async fn load(&self) -> Result<Arc<str>, TextSourceError> {
		let cache_path = self.cache_dir.as_deref().map(|dir| dir.join(CACHE_FILE_NAME));

		if let Some(path) = &cache_path {
			if let Ok(text) = tokio::fs::read_to_string(path).await {
				debug!(path = %path.display(), "Using cached overlay text");
				return Ok(Arc::from(text));
			}
		}

		info!(source = self.source.location(), "Fetching overlay text");
		let text = self.source.fetch().await?;

		if let Some(path) = &cache_path {
			if let Err(err) = write_cache(path, &text).await {
				warn!(path = %path.display(), "Failed to cache overlay text: {err}");
			}
		}

		Ok(Arc::from(text))
	}
}

async fn write_cache(path: &Path, text: &str) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	tokio::fs::write(path, text).await
}
