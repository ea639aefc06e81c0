use crate::rendering::{Alignment, Location};
use crate::text::FetchFailurePolicy;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub network: NetworkConfig,
	pub tls: TlsConfig,
	pub overlay: OverlayConfig,
	pub text: TextConfig,
}

impl AppConfig {
	/// Loads the configuration from the embedded defaults, an optional config file and
	/// environment variables prefixed with `OSIRIX_OVERLAY`.
	///
	/// Without an explicit `path`, `config.toml` in the working directory is used if present.
	pub fn new(path: Option<&Path>) -> Result<Self, config::ConfigError> {
		use config::Config;
		let file = match path {
			Some(path) => config::File::from(path).required(true),
			None => config::File::with_name("config.toml").required(false),
		};

		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(file)
			.add_source(
				config::Environment::with_prefix("OSIRIX_OVERLAY")
					.prefix_separator("_")
					.separator("__")
					.try_parsing(true),
			)
			.build()?;

		s.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	// Also configurable via RUST_LOG and OSIRIX_OVERLAY_TELEMETRY__LEVEL
	#[serde(deserialize_with = "deserialize_level")]
	pub level: Level,
	/// Sentry DSN. Sentry stays disabled when unset.
	pub sentry: Option<String>,
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
	D: Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	s.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
	// The address the server binds to and the client connects to
	pub host: String,
	pub port: u16,
	/// Number of runtime worker threads serving requests.
	pub workers: usize,
	/// Maximum size of an outgoing message in bytes.
	pub max_send_message_size: usize,
	/// Maximum size of an incoming message in bytes.
	pub max_receive_message_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
	/// Whether to use a mutually authenticated channel.
	pub enabled: bool,
	/// Root of the per-peer certificate directories.
	/// Defaults to `~/certs/osirix-overlay`.
	pub cert_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
	pub location: Location,
	/// Fraction of the image the text may occupy in each dimension, in `(0, 1]`.
	pub scale: f32,
	/// Margin between the text and the image border as a fraction of the image size.
	pub offset: f32,
	pub align: Alignment,
	/// Sample value written where the text mask is set.
	pub value: f32,
	/// Sample value written behind the text if `remove_background` is enabled.
	pub bg_value: f32,
	pub remove_background: bool,
	/// TrueType font used for rasterization. The built-in bitmap font is used when unset.
	pub font_path: Option<PathBuf>,
	pub font_size: f32,
	/// Gray level above which a rasterized pixel becomes part of the mask.
	pub threshold: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextConfig {
	pub source: TextSourceConfig,
	/// Directory in which a fetched copy of the text is kept.
	pub cache_dir: Option<PathBuf>,
	pub on_fetch_error: FetchFailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TextSourceConfig {
	File { path: PathBuf },
	Http { url: String },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config: AppConfig = config::Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap();

		assert_eq!(config.network.host, "127.0.0.1");
		assert_eq!(config.network.port, 50051);
		assert_eq!(config.network.max_send_message_size, 512 * 1024 * 1024);
		assert_eq!(config.network.max_receive_message_size, 512 * 1024 * 1024);
		assert!(!config.tls.enabled);
		assert_eq!(config.telemetry.level, Level::INFO);
		assert_eq!(config.overlay.location, Location::TopLeft);
		assert!((config.overlay.scale - 0.75).abs() < f32::EPSILON);
		assert!((config.overlay.value - 4095.0).abs() < f32::EPSILON);
		assert_eq!(config.text.on_fetch_error, FetchFailurePolicy::Propagate);
		assert!(matches!(config.text.source, TextSourceConfig::File { .. }));
	}

	#[test]
	fn http_source_is_parsed() {
		let config: TextConfig = config::Config::builder()
			.add_source(config::File::from_str(
				r#"
				on_fetch_error = "empty"
				[source]
				kind = "http"
				url = "https://example.org/viewer_text.txt"
				"#,
				config::FileFormat::Toml,
			))
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap();

		assert_eq!(config.on_fetch_error, FetchFailurePolicy::Empty);
		assert!(
			matches!(config.source, TextSourceConfig::Http { url } if url.ends_with("viewer_text.txt"))
		);
	}
}
