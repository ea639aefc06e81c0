//! Client side of the overlay service.
//!
//! An [`OverlayClient`] moves through `Unconnected -> Connected -> Closed`. There is no
//! reconnect: a closed client stays closed, and failed calls are not retried.

use crate::codec::{self, CodecError};
use crate::grid::PixelGrid;
use crate::proto::image_overlay_service_client::ImageOverlayServiceClient;
use crate::transport::{CredentialError, Role, TransportOptions};
use crate::viewer::{Pix, Viewer, ViewerError};
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ClientError {
	#[error(transparent)]
	Credentials(#[from] CredentialError),
	#[error("failed to connect to {endpoint}: {source}")]
	Transport {
		endpoint: String,
		source: tonic::transport::Error,
	},
	#[error(transparent)]
	Rpc(#[from] tonic::Status),
	#[error("client is not connected")]
	NotConnected,
	#[error("client connection is closed")]
	Closed,
	#[error(transparent)]
	Codec(#[from] CodecError),
	#[error(transparent)]
	Viewer(#[from] ViewerError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
	Unconnected,
	Connected,
	Closed,
}

enum Connection {
	Unconnected,
	Connected(ImageOverlayServiceClient<Channel>),
	Closed,
}

pub struct OverlayClient {
	transport: TransportOptions,
	connection: Connection,
}

impl OverlayClient {
	pub const fn new(transport: TransportOptions) -> Self {
		Self {
			transport,
			connection: Connection::Unconnected,
		}
	}

	/// Creates a client and connects it.
	pub async fn connect_with(transport: TransportOptions) -> Result<Self, ClientError> {
		let mut client = Self::new(transport);
		client.connect().await?;
		Ok(client)
	}

	pub const fn state(&self) -> ConnectionState {
		match self.connection {
			Connection::Unconnected => ConnectionState::Unconnected,
			Connection::Connected(_) => ConnectionState::Connected,
			Connection::Closed => ConnectionState::Closed,
		}
	}

	/// Opens the channel to the server. Credentials are read before any socket is opened.
	///
	/// # Errors
	/// Fails if the client was closed, a credential file is missing, or the server cannot be
	/// reached.
	pub async fn connect(&mut self) -> Result<(), ClientError> {
		match self.connection {
			Connection::Connected(_) => return Ok(()),
			Connection::Closed => return Err(ClientError::Closed),
			Connection::Unconnected => {}
		}

		let credentials = self.transport.credentials(Role::Client)?;
		let endpoint_url = self.transport.endpoint_url();
		let transport_error = |source| ClientError::Transport {
			endpoint: endpoint_url.clone(),
			source,
		};

		let mut endpoint = Endpoint::from_shared(endpoint_url.clone()).map_err(transport_error)?;
		if let Some(credentials) = &credentials {
			endpoint = endpoint
				.tls_config(credentials.client_tls_config(&self.transport.host))
				.map_err(transport_error)?;
		}
		let channel = endpoint.connect().await.map_err(transport_error)?;

		let stub = ImageOverlayServiceClient::new(channel)
			.max_decoding_message_size(self.transport.max_receive_message_size)
			.max_encoding_message_size(self.transport.max_send_message_size);

		info!(
			endpoint = %endpoint_url,
			secure = credentials.is_some(),
			"Connected to overlay server"
		);
		self.connection = Connection::Connected(stub);
		Ok(())
	}

	/// Drops the channel. The client cannot be used afterwards.
	pub fn close(&mut self) {
		if matches!(self.connection, Connection::Connected(_)) {
			debug!("Closing connection to overlay server");
		}
		self.connection = Connection::Closed;
	}

	fn stub(&self) -> Result<ImageOverlayServiceClient<Channel>, ClientError> {
		match &self.connection {
			Connection::Connected(stub) => Ok(stub.clone()),
			Connection::Unconnected => Err(ClientError::NotConnected),
			Connection::Closed => Err(ClientError::Closed),
		}
	}

	/// Sends a grid to the server and returns the processed grid.
	#[instrument(skip_all, fields(rows = grid.rows(), columns = grid.columns()))]
	pub async fn process_grid(&self, grid: PixelGrid) -> Result<PixelGrid, ClientError> {
		let mut stub = self.stub()?;
		let image = codec::encode(grid)?;
		let response = stub.process_image(image).await?;
		Ok(codec::decode(response.into_inner())?)
	}

	/// Burns the overlay text into a single image of the viewer.
	///
	/// # Errors
	/// Colour images are rejected with [`ViewerError::UnsupportedColor`] before anything is sent.
	pub async fn write_text_in_pix<P: Pix>(&self, pix: &mut P) -> Result<(), ClientError> {
		if pix.is_rgb() {
			return Err(ViewerError::UnsupportedColor.into());
		}
		let processed = self.process_grid(pix.read_grid()).await?;
		pix.write_grid(processed)?;
		Ok(())
	}

	/// Burns the overlay text into all images of one movie, or of every movie if `movie` is
	/// `None`, and refreshes the viewer. Returns the number of processed images.
	pub async fn write_text_in_viewer<V: Viewer>(
		&self,
		viewer: &mut V,
		movie: Option<usize>,
	) -> Result<usize, ClientError> {
		let movies: Vec<usize> = match movie {
			Some(index) => vec![index],
			None => (0..viewer.movie_count()).collect(),
		};

		let mut processed = 0;
		for index in movies {
			for pix in viewer.pix_list(index)?.iter_mut() {
				self.write_text_in_pix(pix).await?;
				processed += 1;
			}
		}
		viewer.needs_display_update()?;
		info!(images = processed, "Wrote overlay text into viewer");
		Ok(processed)
	}
}
