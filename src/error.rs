//! Error taxonomy and mapping to the SCIM error resource.
//!
//! Every failure the provisioning core can produce is represented here and
//! carries a protocol status code. Callers embedding this crate under an HTTP
//! layer convert any [`Error`] into the wire shape with
//! [`Error::to_response`].

use serde::{Deserialize, Serialize};

/// Schema URN carried by SCIM error responses.
const ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// Errors that can occur while servicing a provisioning operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A required field was missing or malformed on a submitted resource.
	#[error("invalid resource: {0}")]
	InvalidResource(String),
	/// A filter expression could not be parsed or referenced an unknown
	/// attribute.
	#[error("invalid filter: {0}")]
	InvalidFilter(String),
	/// The requested identifier matched no directory entry.
	#[error("resource not found: {0}")]
	NotFound(String),
	/// A referenced member could not be resolved during reconciliation.
	#[error("member not found: {0}")]
	MemberNotFound(String),
	/// The patch operation kind (or target path) is not handled.
	#[error("unsupported operation: {0}")]
	UnsupportedOperation(String),
	/// An entry with the same distinguished name already exists.
	#[error("conflict: {0}")]
	Conflict(String),
	/// A directory call did not complete within the configured deadline.
	/// Retryable.
	#[error("directory operation timed out: {0}")]
	Timeout(String),
	/// An underlying protocol error occurred, or the directory connection
	/// failed.
	#[error(transparent)]
	Directory(#[from] ldap3::LdapError),
	/// The client configuration was unusable (bad credentials, bad TLS
	/// material).
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	/// Reading configuration material from disk failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// The protocol status code for this error.
	///
	/// Validation and reconciliation failures keep the reference behavior's
	/// 400; unsupported patch operations keep 403. The taxonomy is widened
	/// beyond that: missing entries are 404, duplicate creates 409, and
	/// transport failures 503 so callers can tell a retryable outage from a
	/// bad request.
	#[must_use]
	pub fn status_code(&self) -> u16 {
		match self {
			Error::InvalidResource(_) | Error::InvalidFilter(_) | Error::MemberNotFound(_) => 400,
			Error::UnsupportedOperation(_) => 403,
			Error::NotFound(_) => 404,
			Error::Conflict(_) => 409,
			Error::Timeout(_) | Error::Directory(_) => 503,
			Error::InvalidConfig(_) | Error::Io(_) => 500,
		}
	}

	/// Whether a caller may sensibly retry the failed operation unchanged.
	#[must_use]
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::Timeout(_) | Error::Directory(_))
	}

	/// Convert this error into the SCIM error resource returned to callers.
	#[must_use]
	pub fn to_response(&self) -> ErrorResponse {
		ErrorResponse {
			schemas: vec![ERROR_SCHEMA.to_owned()],
			status: self.status_code().to_string(),
			detail: self.to_string(),
		}
	}
}

/// The SCIM error resource (RFC 7644 section 3.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Always the SCIM error message URN.
	pub schemas: Vec<String>,
	/// Protocol status code, as a string per the SCIM wire format.
	pub status: String,
	/// Human-readable description of the failure.
	pub detail: String,
}
