pub(crate) mod client;
pub(crate) mod codec;
pub(crate) mod config;
pub(crate) mod grid;
pub(crate) mod proto;
pub(crate) mod rendering;
pub(crate) mod server;
pub(crate) mod text;
pub(crate) mod transport;
pub(crate) mod viewer;

use crate::client::OverlayClient;
use crate::config::AppConfig;
use crate::rendering::{paste_icon, read_icon, IconImage};
use crate::server::{OverlayServer, OverlayService};
use crate::transport::TransportOptions;
use crate::viewer::{DicomFileViewer, Pix, Viewer, ViewerError};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
	/// Serve the image overlay service
	Server,
	/// Send the images of a DICOM file to the server and write the result
	Client,
	/// Paste an icon into the images of a DICOM file
	Icon,
}

#[derive(Debug, Parser)]
#[command(version, about = "Burns overlay text into medical images over gRPC")]
struct Args {
	#[arg(long, value_enum, default_value_t = Mode::Server)]
	mode: Mode,
	/// Address to listen on (server) or connect to (client)
	#[arg(long = "ip_address")]
	ip_address: Option<String>,
	#[arg(long)]
	port: Option<u16>,
	/// Configuration file to use instead of ./config.toml
	#[arg(long)]
	config: Option<PathBuf>,
	/// Use mutual TLS
	#[arg(long, conflicts_with = "insecure")]
	secure: bool,
	/// Use a plaintext channel
	#[arg(long)]
	insecure: bool,
	/// DICOM file to read (client and icon mode)
	#[arg(long, required_if_eq_any = [("mode", "client"), ("mode", "icon")])]
	input: Option<PathBuf>,
	/// Where to write the modified DICOM file, defaults to overwriting the input
	#[arg(long)]
	output: Option<PathBuf>,
	/// Only process this frame
	#[arg(long)]
	frame: Option<usize>,
	/// Icon image (icon mode)
	#[arg(long, required_if_eq("mode", "icon"))]
	icon: Option<PathBuf>,
	/// Icon size relative to the image (icon mode)
	#[arg(long, default_value_t = 0.1)]
	scale: f32,
}

impl Args {
	fn apply(&self, config: &mut AppConfig) {
		if let Some(ip_address) = &self.ip_address {
			config.network.host.clone_from(ip_address);
		}
		if let Some(port) = self.port {
			config.network.port = port;
		}
		if self.secure {
			config.tls.enabled = true;
		} else if self.insecure {
			config.tls.enabled = false;
		}
	}
}

fn init_logger(level: tracing::Level) {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::fmt::layer()
				.compact()
				.with_ansi(true)
				.with_file(false)
				.with_line_number(false)
				.with_target(false),
		)
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(level).into())
				.from_env_lossy(),
		)
		.with(sentry::integrations::tracing::layer())
		.init();
}

fn init_sentry(config: &AppConfig) -> sentry::ClientInitGuard {
	let guard = sentry::init((
		// An empty string will disable Sentry
		config.telemetry.sentry.as_deref().unwrap_or_default(),
		sentry::ClientOptions {
			release: sentry::release_name!(),
			traces_sample_rate: 1.0,
			..Default::default()
		},
	));

	if let Some(dsn) = &config.telemetry.sentry {
		info!(dsn, "Enabled Sentry for tracing and error tracking");
	};

	guard
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let mut config = AppConfig::new(args.config.as_deref())?;
	args.apply(&mut config);
	init_logger(config.telemetry.level);

	// The Sentry client has to exist before the runtime, so #[tokio::main] is not an option.
	let _sentry = init_sentry(&config);

	let failed = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(config.network.workers.max(1))
		.enable_all()
		.build()?
		.block_on(async move {
			let result = match args.mode {
				Mode::Server => run_server(config).await,
				Mode::Client => run_client(config, &args).await,
				Mode::Icon => run_icon(&args),
			};
			result.map_err(|error| error!("{error:#}")).is_err()
		});

	if failed {
		std::process::exit(1);
	}
	Ok(())
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
	let transport = TransportOptions::from_config(&config)?;
	let service = OverlayService::from_config(&config).context("Failed to set up overlay")?;

	OverlayServer::new(transport, config.network.workers, service)
		.serve(shutdown_signal())
		.await?;
	Ok(())
}

fn open_viewer(args: &Args) -> anyhow::Result<DicomFileViewer> {
	let input = args.input.as_deref().context("--input is required")?;
	let output = args.output.clone().unwrap_or_else(|| input.to_owned());
	DicomFileViewer::open(input, output)
		.with_context(|| format!("Failed to open {}", input.display()))
}

/// The frames of the viewer selected by `--frame`.
fn selected_frames<'a>(
	viewer: &'a mut DicomFileViewer,
	frame: Option<usize>,
) -> Result<&'a mut [<DicomFileViewer as Viewer>::Pix], ViewerError> {
	let frames = viewer.pix_list(0)?;
	match frame {
		None => Ok(frames),
		Some(index) => {
			let count = frames.len();
			frames
				.get_mut(index..=index)
				.ok_or(ViewerError::FrameOutOfRange { index, count })
		}
	}
}

async fn run_client(config: AppConfig, args: &Args) -> anyhow::Result<()> {
	let mut viewer = open_viewer(args)?;
	let mut client = OverlayClient::connect_with(TransportOptions::from_config(&config)?).await?;

	if args.frame.is_none() {
		client.write_text_in_viewer(&mut viewer, None).await?;
	} else {
		for pix in selected_frames(&mut viewer, args.frame)? {
			client.write_text_in_pix(pix).await?;
		}
		viewer.needs_display_update()?;
	}

	client.close();
	Ok(())
}

fn run_icon(args: &Args) -> anyhow::Result<()> {
	let path = args.icon.as_deref().context("--icon is required")?;
	let icon = read_icon(path)?;
	let mut viewer = open_viewer(args)?;

	for pix in selected_frames(&mut viewer, args.frame)? {
		paste_icon_into(pix, &icon, args.scale)?;
	}

	viewer.needs_display_update()?;
	info!(icon = %path.display(), "Pasted icon");
	Ok(())
}

fn paste_icon_into<P: Pix>(pix: &mut P, icon: &IconImage, scale: f32) -> anyhow::Result<()> {
	if pix.is_rgb() {
		return Err(ViewerError::UnsupportedColor.into());
	}
	let mut grid = pix.read_grid();
	// The icon is stored in [0, 1], bring it to the intensity range of the image
	let intensity = grid.max().unwrap_or(1.0);
	paste_icon(icon, &mut grid, scale, intensity)?;
	pix.write_grid(grid)?;
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {err}");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				error!("Failed to listen for SIGTERM: {err}");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
	info!("Shutting down");
}
