//! The directory client contract and its `ldap3` implementation.
//!
//! The provisioning core only needs four operations: search, add, modify and
//! delete. They are lifted into the [`Directory`] trait so the orchestrator
//! and the reconciler can run against any backing store; production code uses
//! [`LdapDirectory`], tests can substitute an in-memory implementation.

use std::{collections::HashSet, future::Future, sync::Arc};

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapError, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{config::Config, error::Error};

/// The directory operations the provisioning core consumes.
#[async_trait]
pub trait Directory: Send + Sync {
	/// Search under `base` with the given scope and filter, returning the
	/// matching entries restricted to `attrs`.
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &str,
		attrs: Vec<String>,
	) -> Result<Vec<SearchEntry>, Error>;

	/// Add an entry at `dn` with the given attribute value sets.
	async fn add(&self, dn: &str, attrs: Vec<(String, HashSet<String>)>) -> Result<(), Error>;

	/// Apply modifications to the entry at `dn`.
	async fn modify(&self, dn: &str, mods: Vec<Mod<String>>) -> Result<(), Error>;

	/// Delete the entry at `dn`.
	async fn delete(&self, dn: &str) -> Result<(), Error>;
}

/// An explicitly owned LDAP client handle.
///
/// The connection is established lazily on first use and cached; a transport
/// failure or timeout drops the cached handle so the next call reconnects.
/// Every operation runs under the configured per-call deadline and fails with
/// a retryable [`Error::Timeout`] instead of stalling its request.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
	/// Connection, bind and naming configuration.
	config: Config,
	/// Cached connection handle, lazily initialized.
	connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
	/// Create a directory client. No connection is made until the first call.
	#[must_use]
	pub fn new(config: Config) -> Self {
		LdapDirectory { config, connection: Arc::new(RwLock::new(None)) }
	}

	/// The configuration this client was built from.
	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Get the cached connection, establishing and binding one if necessary.
	async fn get_connection(&self) -> Result<Ldap, Error> {
		{
			let guard = self.connection.read().await;
			if let Some(ldap) = guard.as_ref() {
				return Ok(ldap.clone());
			}
		}

		let ldap = self.connect().await?;
		*self.connection.write().await = Some(ldap.clone());
		Ok(ldap)
	}

	/// Establish a connection and bind with the configured credentials.
	async fn connect(&self) -> Result<Ldap, Error> {
		let settings = self.config.connection.to_settings().await?;
		debug!(url = %self.config.url, "connecting to directory");
		let (conn, mut ldap) =
			LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
		tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		let result = ldap.simple_bind(&self.config.bind_dn, &self.config.bind_password).await?;
		if result.rc == 49 {
			return Err(Error::InvalidConfig(format!(
				"bind as {} rejected: invalid credentials",
				self.config.bind_dn
			)));
		}
		result.success()?;

		info!(url = %self.config.url, "directory connection established");
		Ok(ldap)
	}

	/// Drop the cached connection so the next call reconnects.
	async fn invalidate(&self) {
		*self.connection.write().await = None;
	}

	/// Run one directory call under the operation deadline, invalidating the
	/// cached connection on timeout or transport failure.
	async fn deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T, Error>
	where
		F: Future<Output = Result<T, LdapError>> + Send,
	{
		let timeout = self.config.connection.operation_timeout;
		match tokio::time::timeout(timeout, call).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(err)) => {
				if !matches!(err, LdapError::LdapResult { .. }) {
					self.invalidate().await;
				}
				Err(Error::Directory(err))
			}
			Err(_elapsed) => {
				warn!(operation, "directory call exceeded {timeout:?}");
				self.invalidate().await;
				Err(Error::Timeout(operation.to_owned()))
			}
		}
	}
}

/// Map an operation result error onto the taxonomy: 32 (noSuchObject) means
/// the target is missing, 68 (entryAlreadyExists) is a conflict.
fn map_result_error(err: Error, dn: &str) -> Error {
	match &err {
		Error::Directory(LdapError::LdapResult { result }) if result.rc == 32 => {
			Error::NotFound(dn.to_owned())
		}
		Error::Directory(LdapError::LdapResult { result }) if result.rc == 68 => {
			Error::Conflict(dn.to_owned())
		}
		_ => err,
	}
}

#[async_trait]
impl Directory for LdapDirectory {
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &str,
		attrs: Vec<String>,
	) -> Result<Vec<SearchEntry>, Error> {
		let mut ldap = self.get_connection().await?;
		let result = self
			.deadline("search", async move {
				ldap.search(base, scope, filter, attrs).await?.success()
			})
			.await
			.map_err(|err| map_result_error(err, base))?;
		let (entries, _res) = result;
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	async fn add(&self, dn: &str, attrs: Vec<(String, HashSet<String>)>) -> Result<(), Error> {
		let mut ldap = self.get_connection().await?;
		debug!(dn, "adding directory entry");
		self.deadline("add", async move { ldap.add(dn, attrs).await?.success() })
			.await
			.map_err(|err| map_result_error(err, dn))?;
		Ok(())
	}

	async fn modify(&self, dn: &str, mods: Vec<Mod<String>>) -> Result<(), Error> {
		let mut ldap = self.get_connection().await?;
		debug!(dn, "modifying directory entry");
		self.deadline("modify", async move { ldap.modify(dn, mods).await?.success() })
			.await
			.map_err(|err| map_result_error(err, dn))?;
		Ok(())
	}

	async fn delete(&self, dn: &str) -> Result<(), Error> {
		let mut ldap = self.get_connection().await?;
		debug!(dn, "deleting directory entry");
		self.deadline("delete", async move { ldap.delete(dn).await?.success() })
			.await
			.map_err(|err| map_result_error(err, dn))?;
		Ok(())
	}
}
