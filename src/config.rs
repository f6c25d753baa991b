//! Config for the directory connection and naming contexts.
use std::{path::PathBuf, sync::Arc, time::Duration};

use ldap3::LdapConnSettings;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Bridge configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	pub connection: ConnectionConfig,
	/// The DN to bind as for all operations
	pub bind_dn: String,
	/// The password for the bind DN
	pub bind_password: String,
	/// Naming contexts and object classes for person and group entries
	pub naming: NamingConfig,
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// Deadline for each directory operation. A stalled call fails with a
	/// retryable timeout instead of stalling its request forever.
	pub operation_timeout: Duration,

	/// TLS config
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		ConnectionConfig {
			timeout: 5,
			operation_timeout: Duration::from_secs(5),
			tls: TLSConfig {
				starttls: false,
				no_tls_verify: false,
				root_certificates_path: None,
				client_key_path: None,
				client_certificate_path: None,
			},
		}
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

/// Where person and group entries live, and how they are classed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamingConfig {
	/// The search base holding person entries
	pub user_base: String,
	/// The search base holding group entries
	pub group_base: String,
	/// Object class of person entries
	#[serde(default = "default_user_object_class")]
	pub user_object_class: String,
	/// Object class of group entries
	#[serde(default = "default_group_object_class")]
	pub group_object_class: String,
	/// `gidNumber` assigned to newly created group entries
	#[serde(default = "default_group_gid")]
	pub group_gid: u32,
}

/// Person entries are inetOrgPerson unless configured otherwise.
fn default_user_object_class() -> String {
	"inetOrgPerson".to_owned()
}

/// Group entries are posixGroup unless configured otherwise.
fn default_group_object_class() -> String {
	"posixGroup".to_owned()
}

/// posixGroup requires a gidNumber; a fixed one suffices for provisioning.
fn default_group_gid() -> u32 {
	2000
}

impl NamingConfig {
	/// Returns an example NamingConfig
	#[allow(dead_code)]
	pub(crate) fn example() -> Self {
		NamingConfig {
			user_base: "ou=Users,dc=example,dc=org".to_owned(),
			group_base: "ou=Groups,dc=example,dc=org".to_owned(),
			user_object_class: default_user_object_class(),
			group_object_class: default_group_object_class(),
			group_gid: default_group_gid(),
		}
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let mut roots = RootCertStore::empty();
			let pem = tokio::fs::read(path).await?;
			let certs = rustls_pemfile::certs(&mut pem.as_slice())
				.map_err(|_| Error::InvalidConfig("Could not read root certificate".to_owned()))?;
			for cert in certs {
				roots.add(&Certificate(cert)).map_err(|_| {
					Error::InvalidConfig("Could not parse root certificate".to_owned())
				})?;
			}

			let builder =
				ClientConfig::builder().with_safe_defaults().with_root_certificates(roots);

			let client_config = match (&self.tls.client_key_path, &self.tls.client_certificate_path)
			{
				(Some(key_path), Some(cert_path)) => {
					let cert_pem = tokio::fs::read(cert_path).await?;
					let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
						.map_err(|_| {
							Error::InvalidConfig("Could not read client certificate".to_owned())
						})?
						.into_iter()
						.map(Certificate)
						.collect();
					let key_pem = tokio::fs::read(key_path).await?;
					let mut keys = rustls_pemfile::pkcs8_private_keys(&mut key_pem.as_slice())
						.map_err(|_| Error::InvalidConfig("Could not read client key".to_owned()))?;
					let key = keys.pop().ok_or_else(|| {
						Error::InvalidConfig("Client key file contains no PKCS8 key".to_owned())
					})?;
					builder.with_client_auth_cert(certs, PrivateKey(key)).map_err(|_| {
						Error::InvalidConfig("Client certificate and key do not match".to_owned())
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => Err(Error::InvalidConfig(
					"Both a client certificate and key file in PKCS8 format must be specified"
						.to_owned(),
				))?,
			};
			settings = settings.set_config(Arc::new(client_config));
		}
		Ok(settings)
	}
}
