use crate::proto::image_overlay_service_server::ImageOverlayServiceServer;
use crate::transport::{CredentialError, Role, Security, TransportOptions};
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::info;

mod service;

pub use service::OverlayService;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Credentials(#[from] CredentialError),
	#[error("invalid listen address {address}: {source}")]
	Address {
		address: String,
		source: std::net::AddrParseError,
	},
	#[error(transparent)]
	Transport(#[from] tonic::transport::Error),
}

pub struct OverlayServer {
	transport: TransportOptions,
	workers: usize,
	service: OverlayService,
}

impl OverlayServer {
	pub const fn new(transport: TransportOptions, workers: usize, service: OverlayService) -> Self {
		Self {
			transport,
			workers,
			service,
		}
	}

	/// Builds the tonic router. TLS credentials are loaded here, before any socket is bound.
	///
	/// # Errors
	/// Fails if mutual TLS is configured and a credential file is missing.
	pub fn into_router(self) -> Result<Router, ServerError> {
		let mut builder = Server::builder().concurrency_limit_per_connection(self.workers);
		if let Some(credentials) = self.transport.credentials(Role::Server)? {
			builder = builder.tls_config(credentials.server_tls_config())?;
		}

		let service = ImageOverlayServiceServer::new(self.service)
			.max_decoding_message_size(self.transport.max_receive_message_size)
			.max_encoding_message_size(self.transport.max_send_message_size);

		Ok(builder
			.trace_fn(|_| tracing::info_span!("overlay_request"))
			.add_service(service))
	}

	/// Serves requests on the configured address until `shutdown` completes.
	pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> Result<(), ServerError> {
		let address = self.transport.address();
		let addr: SocketAddr = address
			.parse()
			.map_err(|source| ServerError::Address { address, source })?;
		let secure = matches!(self.transport.security, Security::MutualTls { .. });

		let router = self.into_router()?;
		info!(%addr, secure, "Server is running");
		router.serve_with_shutdown(addr, shutdown).await?;
		info!("Server stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rendering::{Alignment, Font, OverlayOptions, TextRenderer};
	use crate::text::{FetchFailurePolicy, FileSource, OverlayTextLoader};
	use std::sync::Arc;

	fn service() -> OverlayService {
		OverlayService::new(
			OverlayTextLoader::new(
				Box::new(FileSource::new("data/viewer_text.txt")),
				None,
				FetchFailurePolicy::Propagate,
			),
			Arc::new(TextRenderer::new(Font::Builtin, 40.0, Alignment::Left)),
			OverlayOptions::default(),
		)
	}

	#[tokio::test]
	async fn secure_server_without_certificates_fails_before_binding() {
		let root = tempfile::tempdir().unwrap();
		let mut transport = crate::transport::tests::plaintext(0);
		transport.security = Security::MutualTls {
			cert_root: root.path().join("missing"),
		};

		let result = OverlayServer::new(transport, 10, service())
			.serve(std::future::ready(()))
			.await;
		assert!(matches!(
			result,
			Err(ServerError::Credentials(CredentialError::Missing {
				role: Role::Server,
				..
			}))
		));
	}
}
