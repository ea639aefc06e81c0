//! Channel setup shared by the overlay server and client.

use crate::config::AppConfig;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};
use tracing::debug;

/// Default location of the per-peer certificate directories below the home directory.
pub const DEFAULT_CERT_DIR: &str = "certs/osirix-overlay";

const CA_CERTIFICATE: &str = "ca.crt";

#[derive(Debug, Error)]
pub enum CredentialError {
	#[error("no {file} found for this {role} at {}", path.display())]
	Missing {
		role: Role,
		file: String,
		path: PathBuf,
	},
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("cannot determine the home directory; configure tls.cert_root")]
	NoCertRoot,
}

/// Which side of the channel a peer is on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
	Client,
	Server,
}

impl Role {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Client => "client",
			Self::Server => "server",
		}
	}
}

impl Display for Role {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Security {
	Plaintext,
	/// Mutual TLS with credentials read from `<cert_root>/<role>/<host>/`.
	MutualTls { cert_root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
	pub host: String,
	pub port: u16,
	pub max_send_message_size: usize,
	pub max_receive_message_size: usize,
	pub security: Security,
}

impl TransportOptions {
	/// Builds the options from the application config.
	///
	/// # Errors
	/// Fails if TLS is enabled without a certificate root and no home directory is known.
	pub fn from_config(config: &AppConfig) -> Result<Self, CredentialError> {
		let security = if config.tls.enabled {
			let cert_root = match &config.tls.cert_root {
				Some(root) => root.clone(),
				None => dirs::home_dir()
					.ok_or(CredentialError::NoCertRoot)?
					.join(DEFAULT_CERT_DIR),
			};
			Security::MutualTls { cert_root }
		} else {
			Security::Plaintext
		};

		Ok(Self {
			host: config.network.host.clone(),
			port: config.network.port,
			max_send_message_size: config.network.max_send_message_size,
			max_receive_message_size: config.network.max_receive_message_size,
			security,
		})
	}

	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	pub fn endpoint_url(&self) -> String {
		match self.security {
			Security::Plaintext => format!("http://{}", self.address()),
			Security::MutualTls { .. } => format!("https://{}", self.address()),
		}
	}

	/// Loads the credentials of `role` if the channel is secured.
	///
	/// # Errors
	/// Fails if any of the required files is missing or unreadable.
	pub fn credentials(&self, role: Role) -> Result<Option<Credentials>, CredentialError> {
		match &self.security {
			Security::Plaintext => Ok(None),
			Security::MutualTls { cert_root } => {
				Credentials::load(cert_root, role, &self.host).map(Some)
			}
		}
	}
}

/// The PEM encoded certificate authority, certificate and private key of one peer.
pub struct Credentials {
	role: Role,
	ca: Vec<u8>,
	certificate: Vec<u8>,
	key: Vec<u8>,
}

impl Credentials {
	/// The directory holding the credentials of `role` for `host`.
	pub fn directory(cert_root: &Path, role: Role, host: &str) -> PathBuf {
		cert_root.join(role.as_str()).join(host)
	}

	/// Reads `ca.crt`, `<role>.crt` and `<role>.key` from the peer's certificate directory.
	///
	/// # Errors
	/// Returns [`CredentialError::Missing`] naming the first file that does not exist.
	pub fn load(cert_root: &Path, role: Role, host: &str) -> Result<Self, CredentialError> {
		let directory = Self::directory(cert_root, role, host);
		debug!(%role, directory = %directory.display(), "Loading TLS credentials");

		let key = read_credential(&directory, role, &format!("{role}.key"))?;
		let certificate = read_credential(&directory, role, &format!("{role}.crt"))?;
		let ca = read_credential(&directory, role, CA_CERTIFICATE)?;

		Ok(Self {
			role,
			ca,
			certificate,
			key,
		})
	}

	pub const fn role(&self) -> Role {
		self.role
	}

	/// Server side TLS requiring client certificates signed by the CA.
	pub fn server_tls_config(&self) -> ServerTlsConfig {
		ServerTlsConfig::new()
			.identity(Identity::from_pem(&self.certificate, &self.key))
			.client_ca_root(Certificate::from_pem(&self.ca))
	}

	/// Client side TLS presenting the client certificate to `domain`.
	pub fn client_tls_config(&self, domain: &str) -> ClientTlsConfig {
		ClientTlsConfig::new()
			.ca_certificate(Certificate::from_pem(&self.ca))
			.identity(Identity::from_pem(&self.certificate, &self.key))
			.domain_name(domain)
	}
}

fn read_credential(directory: &Path, role: Role, file: &str) -> Result<Vec<u8>, CredentialError> {
	let path = directory.join(file);
	if !path.exists() {
		return Err(CredentialError::Missing {
			role,
			file: file.to_owned(),
			path,
		});
	}
	std::fs::read(&path).map_err(|source| CredentialError::Io { path, source })
}
