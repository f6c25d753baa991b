//! Orchestration of the provisioning operations.
//!
//! One [`ProvisioningAdapter`] instance serves all requests; each operation
//! is a single pass of directory round-trips with no state kept between
//! requests. The external request layer hands this type already-parsed
//! resources and query parameters and converts any returned [`Error`] with
//! [`Error::to_response`](crate::error::Error::to_response); nothing here
//! touches HTTP.

use std::{collections::HashSet, sync::Arc};

use ldap3::{Mod, Scope, SearchEntry};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
	config::{Config, NamingConfig},
	directory::{Directory, LdapDirectory},
	entry::SearchEntryExt,
	error::Error,
	filter,
	mapper::{self, directory_attribute, AttributeMapper, ResourceKind},
	membership::MembershipReconciler,
	page,
	resource::{Group, ListQuery, ListResponse, MemberRef, PatchRequest, User},
};

/// The provisioning adapter: composes the mapper, filter translator,
/// pagination and membership reconciliation into the six operations for
/// Users and Groups.
#[derive(Debug)]
pub struct ProvisioningAdapter<D> {
	/// Directory handle shared with the reconciler.
	directory: Arc<D>,
	/// Resource-to-entry mapping.
	mapper: AttributeMapper,
	/// Membership diffing and reconciliation.
	reconciler: MembershipReconciler<D>,
	/// Naming contexts and object classes.
	naming: NamingConfig,
}

impl ProvisioningAdapter<LdapDirectory> {
	/// Build an adapter over a live LDAP directory described by `config`.
	#[must_use]
	pub fn from_config(config: Config) -> Self {
		let naming = config.naming.clone();
		Self::new(LdapDirectory::new(config), naming)
	}
}

impl<D: Directory> ProvisioningAdapter<D> {
	/// Build an adapter over an already-constructed directory handle.
	#[must_use]
	pub fn new(directory: D, naming: NamingConfig) -> Self {
		let directory = Arc::new(directory);
		ProvisioningAdapter {
			mapper: AttributeMapper::new(naming.clone()),
			reconciler: MembershipReconciler::new(Arc::clone(&directory), naming.clone()),
			directory,
			naming,
		}
	}

	/// The directory handle backing this adapter.
	#[must_use]
	pub fn directory(&self) -> &D {
		&self.directory
	}

	/// The base search filter for a resource kind, or the translated filter
	/// when the query carries an expression.
	fn search_filter(&self, kind: ResourceKind, query: &ListQuery) -> Result<String, Error> {
		let object_class = match kind {
			ResourceKind::User => &self.naming.user_object_class,
			ResourceKind::Group => &self.naming.group_object_class,
		};
		match &query.filter {
			Some(expression) => Ok(filter::translate(kind, expression)?.to_ldap(object_class)),
			None => Ok(format!("(objectClass={})", filter::escape_filter_value(object_class))),
		}
	}

	/// Fetch the single entry addressed by `id`, or fail with `NotFound`.
	async fn entry_by_id(&self, id: &str, attrs: Vec<String>) -> Result<SearchEntry, Error> {
		let entries = self.directory.search(id, Scope::Base, "(objectClass=*)", attrs).await?;
		entries.into_iter().next().ok_or_else(|| Error::NotFound(id.to_owned()))
	}

	/// Map an entry to a User and fill in the derived `groups` field.
	async fn user_with_groups(&self, entry: &SearchEntry) -> Result<User, Error> {
		let mut user = self.mapper.user_from_entry(entry);
		if let Some(handle) = user.user_name.clone() {
			user.groups = self.reconciler.groups_for_user(&handle).await?;
		}
		Ok(user)
	}

	/// Map an entry to a Group with its member handles resolved back to
	/// member references.
	async fn group_with_members(&self, entry: &SearchEntry) -> Result<Group, Error> {
		let (mut group, handles) = self.mapper.group_from_entry(entry);
		group.members = self.reconciler.resolve_member_refs(&handles).await?;
		Ok(group)
	}

	// --- Users ---

	/// List users, optionally filtered, with pagination.
	pub async fn list_users(&self, query: &ListQuery) -> Result<ListResponse<User>, Error> {
		let filter = self.search_filter(ResourceKind::User, query)?;
		let entries = self
			.directory
			.search(&self.naming.user_base, Scope::Subtree, &filter, mapper::user_attributes())
			.await?;

		// Window first: only the returned page pays the reverse-lookup cost.
		let window = page::window(entries, query.start_index, query.count);
		let mut users = Vec::with_capacity(window.items.len());
		for entry in &window.items {
			users.push(self.user_with_groups(entry).await?);
		}
		Ok(ListResponse::new(window.total_results, window.start_index, users))
	}

	/// Fetch a single user by identifier.
	pub async fn get_user(&self, id: &str) -> Result<User, Error> {
		let entry = self.entry_by_id(id, mapper::user_attributes()).await?;
		self.user_with_groups(&entry).await
	}

	/// Create a user entry, then reconcile any submitted group references.
	pub async fn create_user(&self, user: &User) -> Result<User, Error> {
		let attrs = self.mapper.user_to_entry(user)?;
		let dn = self.mapper.user_dn(user)?;
		self.directory.add(&dn, attrs).await?;
		info!(dn = %dn, "created user entry");

		// The submitted groups list is provisioning input here, unlike the
		// derived read-only field it is on reads.
		if let Some(handle) = user.user_name.as_deref() {
			for group in &user.groups {
				self.reconciler.add_handle(&group.value, handle).await?;
			}
		}

		let mut created = user.clone();
		created.id = Some(dn);
		created.active = true;
		Ok(created)
	}

	/// Replace a user's mutable attributes (full PUT semantics).
	///
	/// The composite `cn` is the entry's naming attribute; a payload whose
	/// name fields would change it needs a DN rename, which the directory
	/// contract in scope does not offer, so it is rejected.
	pub async fn update_user(&self, id: &str, user: &User) -> Result<User, Error> {
		let current = self.entry_by_id(id, mapper::user_attributes()).await?;

		let user_name = user
			.user_name
			.as_deref()
			.ok_or_else(|| Error::InvalidResource("missing required field userName".to_owned()))?;
		let given = user
			.given_name
			.as_deref()
			.ok_or_else(|| Error::InvalidResource("missing required field givenName".to_owned()))?;
		let family = user.family_name.as_deref().ok_or_else(|| {
			Error::InvalidResource("missing required field familyName".to_owned())
		})?;

		let new_cn = format!("{given} {family}");
		if current.attr_first("cn").is_some_and(|cn| cn != new_cn) {
			return Err(Error::UnsupportedOperation(
				"changing givenName/familyName would rename the entry".to_owned(),
			));
		}

		let mods = vec![
			Mod::Replace("uid".to_owned(), HashSet::from([user_name.to_owned()])),
			Mod::Replace("givenName".to_owned(), HashSet::from([given.to_owned()])),
			Mod::Replace("sn".to_owned(), HashSet::from([family.to_owned()])),
			// Replace-to-empty removes the attribute without erroring when it
			// was already absent.
			Mod::Replace("mail".to_owned(), user.email.iter().cloned().collect()),
		];
		self.directory.modify(id, mods).await?;
		self.get_user(id).await
	}

	/// Apply a patch to a user.
	///
	/// Only `replace` is supported for users. Replacing `active` with false
	/// deletes the entry: the directory has no deactivation flag.
	pub async fn patch_user(&self, id: &str, patch: &PatchRequest) -> Result<User, Error> {
		let mut mods: Vec<Mod<String>> = Vec::new();
		for operation in &patch.operations {
			if !operation.op.eq_ignore_ascii_case("replace") {
				return Err(Error::UnsupportedOperation(format!(
					"patch op {:?} is not supported for users",
					operation.op
				)));
			}
			for (attribute, value) in patch_pairs(operation.path.as_deref(), &operation.value)? {
				if attribute.eq_ignore_ascii_case("active") {
					if value_is_false(&value) {
						debug!(id, "deactivation requested, deleting entry");
						self.directory.delete(id).await?;
						return Ok(User::deactivated(id));
					}
					// active=true is the steady state of every live entry.
					continue;
				}
				let directory_attr =
					directory_attribute(ResourceKind::User, &attribute).ok_or_else(|| {
						Error::UnsupportedOperation(format!("cannot patch attribute {attribute}"))
					})?;
				mods.push(Mod::Replace(
					directory_attr.to_owned(),
					HashSet::from([scalar_string(&attribute, &value)?]),
				));
			}
		}
		if !mods.is_empty() {
			self.directory.modify(id, mods).await?;
		}
		self.get_user(id).await
	}

	/// Delete a user entry, returning a resource reflecting the removal.
	pub async fn delete_user(&self, id: &str) -> Result<User, Error> {
		self.directory.delete(id).await?;
		info!(dn = %id, "deleted user entry");
		Ok(User::deactivated(id))
	}

	// --- Groups ---

	/// List groups, optionally filtered, with pagination.
	pub async fn list_groups(&self, query: &ListQuery) -> Result<ListResponse<Group>, Error> {
		let filter = self.search_filter(ResourceKind::Group, query)?;
		let entries = self
			.directory
			.search(&self.naming.group_base, Scope::Subtree, &filter, mapper::group_attributes())
			.await?;

		let window = page::window(entries, query.start_index, query.count);
		let mut groups = Vec::with_capacity(window.items.len());
		for entry in &window.items {
			groups.push(self.group_with_members(entry).await?);
		}
		Ok(ListResponse::new(window.total_results, window.start_index, groups))
	}

	/// Fetch a single group by identifier.
	pub async fn get_group(&self, id: &str) -> Result<Group, Error> {
		let entry = self.entry_by_id(id, mapper::group_attributes()).await?;
		self.group_with_members(&entry).await
	}

	/// Create a group entry with its submitted members.
	///
	/// Member references are resolved before the entry is written, so an
	/// unresolvable reference fails the create without leaving a group
	/// behind.
	pub async fn create_group(&self, group: &Group) -> Result<Group, Error> {
		let mut attrs = self.mapper.group_to_entry(group)?;
		let dn = self.mapper.group_dn(group)?;

		let handles = self.reconciler.resolve_refs(&group.members).await?;
		if !handles.is_empty() {
			attrs.push(("memberUid".to_owned(), handles.into_iter().collect()));
		}
		self.directory.add(&dn, attrs).await?;
		info!(dn = %dn, "created group entry");

		let mut created = group.clone();
		created.id = Some(dn);
		Ok(created)
	}

	/// Replace a group's member list (full PUT semantics).
	///
	/// `displayName` is the entry's naming attribute; a payload that would
	/// change it is rejected for the same reason as a user rename.
	pub async fn update_group(&self, id: &str, group: &Group) -> Result<Group, Error> {
		let current = self.entry_by_id(id, mapper::group_attributes()).await?;
		if let Some(name) = group.display_name.as_deref() {
			if current.attr_first("cn").is_some_and(|cn| cn != name) {
				return Err(Error::UnsupportedOperation(
					"changing displayName would rename the entry".to_owned(),
				));
			}
		}
		self.reconciler.replace_all(id, &group.members).await?;
		self.get_group(id).await
	}

	/// Apply a patch to a group: `add` on `members`, `remove` on
	/// `members[value eq "<id>"]`, or `replace` on `members`/`displayName`.
	pub async fn patch_group(&self, id: &str, patch: &PatchRequest) -> Result<Group, Error> {
		for operation in &patch.operations {
			match operation.op.to_ascii_lowercase().as_str() {
				"add" => {
					if operation.path.as_deref().is_some_and(|path| path != "members") {
						return Err(Error::UnsupportedOperation(format!(
							"cannot add to path {:?}",
							operation.path
						)));
					}
					let members = member_refs(&operation.value)?;
					self.reconciler.add_members(id, &members).await?;
				}
				"remove" => {
					let path = operation.path.as_deref().ok_or_else(|| {
						Error::UnsupportedOperation("remove requires a path".to_owned())
					})?;
					let member_id = filter::parse_member_path(path)?;
					self.reconciler.remove_member(id, &MemberRef::new(member_id)).await?;
				}
				"replace" => {
					self.patch_group_replace(id, operation.path.as_deref(), &operation.value)
						.await?;
				}
				other => {
					return Err(Error::UnsupportedOperation(format!(
						"patch op {other:?} is not supported for groups"
					)));
				}
			}
		}
		self.get_group(id).await
	}

	/// The `replace` arm of a group patch.
	async fn patch_group_replace(
		&self,
		id: &str,
		path: Option<&str>,
		value: &Option<Value>,
	) -> Result<(), Error> {
		match path {
			Some("members") => {
				let members = member_refs(value)?;
				self.reconciler.replace_all(id, &members).await?;
				Ok(())
			}
			Some("displayName") => self.check_display_name(id, value.as_ref()).await,
			Some(other) => {
				Err(Error::UnsupportedOperation(format!("cannot replace path {other:?}")))
			}
			None => {
				// No path: the value object names the attributes to replace.
				let object = value
					.as_ref()
					.and_then(Value::as_object)
					.ok_or_else(|| Error::InvalidResource("replace needs a value object".to_owned()))?;
				for (attribute, attribute_value) in object {
					match attribute.as_str() {
						"members" => {
							let members = member_refs(&Some(attribute_value.clone()))?;
							self.reconciler.replace_all(id, &members).await?;
						}
						"displayName" => {
							self.check_display_name(id, Some(attribute_value)).await?;
						}
						other => {
							return Err(Error::UnsupportedOperation(format!(
								"cannot replace path {other:?}"
							)));
						}
					}
				}
				Ok(())
			}
		}
	}

	/// A `displayName` replace is accepted only when it matches the current
	/// name; anything else would rename the entry.
	async fn check_display_name(&self, id: &str, value: Option<&Value>) -> Result<(), Error> {
		let requested = value
			.and_then(Value::as_str)
			.ok_or_else(|| Error::InvalidResource("displayName must be a string".to_owned()))?;
		let current = self.entry_by_id(id, mapper::group_attributes()).await?;
		if current.attr_first("cn").is_some_and(|cn| cn != requested) {
			return Err(Error::UnsupportedOperation(
				"changing displayName would rename the entry".to_owned(),
			));
		}
		Ok(())
	}

	/// Delete a group entry, returning a resource reflecting the removal.
	pub async fn delete_group(&self, id: &str) -> Result<Group, Error> {
		self.directory.delete(id).await?;
		info!(dn = %id, "deleted group entry");
		Ok(Group {
			schemas: vec![crate::resource::GROUP_SCHEMA.to_owned()],
			id: Some(id.to_owned()),
			display_name: None,
			members: Vec::new(),
		})
	}
}

/// Flatten a patch operation into `(attribute, value)` pairs: either an
/// explicit path with a scalar value, or a pathless value object.
fn patch_pairs(path: Option<&str>, value: &Option<Value>) -> Result<Vec<(String, Value)>, Error> {
	match (path, value) {
		(Some(path), Some(value)) => Ok(vec![(path.to_owned(), value.clone())]),
		(None, Some(Value::Object(object))) => {
			Ok(object.iter().map(|(key, val)| (key.clone(), val.clone())).collect())
		}
		_ => Err(Error::InvalidResource("replace needs a value".to_owned())),
	}
}

/// Whether a patch value means boolean false; Okta-style callers send both
/// `false` and `"False"`.
fn value_is_false(value: &Value) -> bool {
	match value {
		Value::Bool(flag) => !flag,
		Value::String(text) => text.eq_ignore_ascii_case("false"),
		_ => false,
	}
}

/// Render a scalar patch value as the directory attribute string.
fn scalar_string(attribute: &str, value: &Value) -> Result<String, Error> {
	match value {
		Value::String(text) => Ok(text.clone()),
		Value::Number(number) => Ok(number.to_string()),
		Value::Bool(flag) => Ok(flag.to_string()),
		_ => Err(Error::InvalidResource(format!("attribute {attribute} needs a scalar value"))),
	}
}

/// Extract member references from a patch value: either a bare array or an
/// object with a `members` array.
fn member_refs(value: &Option<Value>) -> Result<Vec<MemberRef>, Error> {
	let value = value
		.as_ref()
		.ok_or_else(|| Error::InvalidResource("expected a member list".to_owned()))?;
	let list = match value {
		Value::Array(_) => value.clone(),
		Value::Object(object) => object
			.get("members")
			.cloned()
			.ok_or_else(|| Error::InvalidResource("expected a member list".to_owned()))?,
		_ => return Err(Error::InvalidResource("expected a member list".to_owned())),
	};
	serde_json::from_value(list)
		.map_err(|err| Error::InvalidResource(format!("malformed member list: {err}")))
}
