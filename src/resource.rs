//! SCIM resource models exchanged with the provisioning caller.
//!
//! Field names follow RFC 7643 exactly (`userName`, `givenName`,
//! `totalResults`, ...). Fields that are required at write time are still
//! modeled as `Option` here: presence is a validation concern of the
//! attribute mapper, which reports a missing field as `InvalidResource`
//! rather than a deserialization failure.

use serde::{Deserialize, Serialize};

/// Schema URN for a single User resource.
pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
/// Schema URN for a single Group resource.
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
/// Schema URN for list envelopes.
pub const LIST_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";

/// A SCIM User backed by a person entry in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	/// Schema URNs. Defaults to the core User schema.
	#[serde(default = "user_schemas")]
	pub schemas: Vec<String>,
	/// Distinguished name of the backing entry. Assigned by the directory,
	/// absent on create payloads.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Unique login handle, stored as `uid`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_name: Option<String>,
	/// Mail address, stored as `mail`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// First name, stored as `givenName`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub given_name: Option<String>,
	/// Last name, stored as `sn`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub family_name: Option<String>,
	/// Whether the account exists. The directory has no deactivation flag, so
	/// every live entry reads back as `true`; deactivation deletes the entry.
	#[serde(default = "default_active")]
	pub active: bool,
	/// Groups whose member list contains this user's login handle. Computed
	/// by reverse lookup on read; never persisted on the user entry.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub groups: Vec<GroupRef>,
}

impl User {
	/// A resource representing a removed or deactivated account.
	#[must_use]
	pub fn deactivated(id: &str) -> Self {
		User {
			schemas: user_schemas(),
			id: Some(id.to_owned()),
			user_name: None,
			email: None,
			given_name: None,
			family_name: None,
			active: false,
			groups: Vec::new(),
		}
	}
}

/// A SCIM Group backed by a group entry in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
	/// Schema URNs. Defaults to the core Group schema.
	#[serde(default = "group_schemas")]
	pub schemas: Vec<String>,
	/// Distinguished name of the backing entry.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Group name, stored as `cn`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	/// Member references. The group entry is authoritative for membership;
	/// the stored form is a flat list of login handles.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub members: Vec<MemberRef>,
}

/// A reference from a group to a user, as carried in protocol payloads.
///
/// `value` is the user's full identifier (distinguished name), not the login
/// handle the directory stores; the membership reconciler translates between
/// the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
	/// The referenced user's identifier.
	pub value: String,
	/// Optional display text for the member.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display: Option<String>,
}

impl MemberRef {
	/// Reference a user by identifier with no display text.
	#[must_use]
	pub fn new(value: impl Into<String>) -> Self {
		MemberRef { value: value.into(), display: None }
	}
}

/// A reference from a user's derived `groups` field to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
	/// The referenced group's identifier.
	pub value: String,
	/// The group's display name.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display: Option<String>,
}

/// Paginated list envelope for User or Group list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
	/// Always the SCIM ListResponse URN.
	pub schemas: Vec<String>,
	/// Number of entries matched by the query, before windowing.
	pub total_results: usize,
	/// 1-based index of the first returned entry.
	pub start_index: usize,
	/// Number of entries actually returned.
	pub items_per_page: usize,
	/// The windowed resources.
	#[serde(rename = "Resources")]
	pub resources: Vec<T>,
}

impl<T> ListResponse<T> {
	/// Assemble a list envelope from a pagination window.
	#[must_use]
	pub fn new(total_results: usize, start_index: usize, resources: Vec<T>) -> Self {
		ListResponse {
			schemas: vec![LIST_SCHEMA.to_owned()],
			total_results,
			start_index,
			items_per_page: resources.len(),
			resources,
		}
	}
}

/// A SCIM PATCH request (RFC 7644 section 3.5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRequest {
	/// Schema URNs; not interpreted.
	#[serde(default)]
	pub schemas: Vec<String>,
	/// The operations to apply, in order.
	#[serde(rename = "Operations")]
	pub operations: Vec<PatchOperation>,
}

/// A single PATCH operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOperation {
	/// Operation kind: `add`, `remove` or `replace` (case-insensitive).
	pub op: String,
	/// Target attribute path, e.g. `members` or `members[value eq "<id>"]`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Operation value; shape depends on `op` and `path`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub value: Option<serde_json::Value>,
}

/// Query parameters accepted by the list operations.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
	/// 1-based index of the first result to return. Defaults to 1.
	pub start_index: Option<usize>,
	/// Maximum number of results to return. Defaults to 100.
	pub count: Option<usize>,
	/// Optional single-equality filter expression.
	pub filter: Option<String>,
}

/// Default schema list for User resources.
fn user_schemas() -> Vec<String> {
	vec![USER_SCHEMA.to_owned()]
}

/// Default schema list for Group resources.
fn group_schemas() -> Vec<String> {
	vec![GROUP_SCHEMA.to_owned()]
}

/// Users are active unless a payload says otherwise.
fn default_active() -> bool {
	true
}
