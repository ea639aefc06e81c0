use crate::codec::{self, CodecError};
use crate::config::AppConfig;
use crate::proto::image_overlay_service_server::ImageOverlayService;
use crate::proto::Image;
use crate::rendering::{paste_text, OverlayOptions, RenderingError, TextRenderer};
use crate::text::{OverlayTextLoader, TextSourceError};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{error, instrument, trace};

/// Burns the overlay text into every image it receives.
pub struct OverlayService {
	loader: OverlayTextLoader,
	renderer: Arc<TextRenderer>,
	options: OverlayOptions,
}

impl OverlayService {
	pub const fn new(
		loader: OverlayTextLoader,
		renderer: Arc<TextRenderer>,
		options: OverlayOptions,
	) -> Self {
		Self {
			loader,
			renderer,
			options,
		}
	}

	/// Creates the service from the `overlay` and `text` sections of the config.
	///
	/// # Errors
	/// Fails if the configured font cannot be loaded or the overlay options are invalid.
	pub fn from_config(config: &AppConfig) -> Result<Self, RenderingError> {
		let options = OverlayOptions::from(&config.overlay);
		options.validate()?;
		let renderer = TextRenderer::from_font_path(
			config.overlay.font_path.as_deref(),
			config.overlay.font_size,
			config.overlay.align,
		)?;
		Ok(Self::new(
			OverlayTextLoader::from_config(&config.text),
			Arc::new(renderer),
			options,
		))
	}
}

fn decode_status(err: CodecError) -> Status {
	Status::invalid_argument(err.to_string())
}

fn text_status(err: TextSourceError) -> Status {
	error!("Failed to load overlay text: {err}");
	Status::unavailable(err.to_string())
}

#[tonic::async_trait]
impl ImageOverlayService for OverlayService {
	#[instrument(skip_all, fields(rows = request.get_ref().rows, columns = request.get_ref().columns))]
	async fn process_image(&self, request: Request<Image>) -> Result<Response<Image>, Status> {
		let mut grid = codec::decode(request.into_inner()).map_err(decode_status)?;
		let text = self.loader.text().await.map_err(text_status)?;

		let renderer = Arc::clone(&self.renderer);
		let options = self.options.clone();
		let grid = tokio::task::spawn_blocking(move || {
			paste_text(&renderer, &text, &mut grid, &options).map(|()| grid)
		})
		.await
		.map_err(|err| Status::internal(format!("overlay task failed: {err}")))?
		.map_err(|err| Status::internal(err.to_string()))?;

		trace!("Overlay applied");
		let image = codec::encode(grid).map_err(|err| Status::internal(err.to_string()))?;
		Ok(Response::new(image))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rendering::{Alignment, Font};
	use crate::text::{FetchFailurePolicy, FileSource};

	fn service(text_path: &std::path::Path, policy: FetchFailurePolicy) -> OverlayService {
		OverlayService::new(
			OverlayTextLoader::new(Box::new(FileSource::new(text_path)), None, policy),
			Arc::new(TextRenderer::new(Font::Builtin, 40.0, Alignment::Left)),
			OverlayOptions::default(),
		)
	}

	fn zeros(rows: i32, columns: i32) -> Image {
		Image {
			rows,
			columns,
			image: vec![0.0; usize::try_from(rows * columns).unwrap()],
		}
	}

	#[tokio::test]
	async fn mismatched_image_is_invalid_argument() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("text.txt");
		std::fs::write(&path, "X").unwrap();

		let request = Request::new(Image {
			rows: 10,
			columns: 10,
			image: vec![0.0; 99],
		});
		let status = service(&path, FetchFailurePolicy::Propagate)
			.process_image(request)
			.await
			.unwrap_err();
		assert_eq!(status.code(), tonic::Code::InvalidArgument);
	}

	#[tokio::test]
	async fn missing_text_is_unavailable() {
		let dir = tempfile::tempdir().unwrap();
		let status = service(&dir.path().join("missing.txt"), FetchFailurePolicy::Propagate)
			.process_image(Request::new(zeros(4, 4)))
			.await
			.unwrap_err();
		assert_eq!(status.code(), tonic::Code::Unavailable);
	}

	#[tokio::test]
	async fn missing_text_can_be_ignored() {
		let dir = tempfile::tempdir().unwrap();
		let response = service(&dir.path().join("missing.txt"), FetchFailurePolicy::Empty)
			.process_image(Request::new(zeros(4, 4)))
			.await
			.unwrap()
			.into_inner();
		assert_eq!(response, zeros(4, 4));
	}

	#[tokio::test]
	async fn text_is_burnt_into_image() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("text.txt");
		std::fs::write(&path, "TEST").unwrap();

		let response = service(&path, FetchFailurePolicy::Propagate)
			.process_image(Request::new(zeros(64, 64)))
			.await
			.unwrap()
			.into_inner();
		assert_eq!((response.rows, response.columns), (64, 64));
		assert!(response.image.iter().any(|&v| v == 4095.0));
	}
}
