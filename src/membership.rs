//! Group membership reconciliation.
//!
//! The group entry is authoritative for membership: it stores a flat,
//! de-duplicated list of member login handles (`memberUid`), while protocol
//! payloads reference members by their full identifier. The directory offers
//! no atomic append, so every membership change is a read-modify-write that
//! replaces the whole list. Writes to the same group are serialized through a
//! per-group mutex, otherwise two concurrent read-modify-write cycles could
//! silently drop one side's change.
//!
//! Any referenced member that cannot be resolved fails the reconciliation
//! before a single write is issued.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use ldap3::{Mod, Scope};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::{
	config::NamingConfig,
	directory::Directory,
	entry::SearchEntryExt,
	error::Error,
	filter::escape_filter_value,
	mapper,
	resource::{GroupRef, MemberRef},
};

/// Computes and applies membership changes against group entries.
#[derive(Debug)]
pub struct MembershipReconciler<D> {
	/// Directory handle shared with the orchestrator.
	directory: Arc<D>,
	/// Naming contexts for the reverse lookups.
	naming: NamingConfig,
	/// Per-group write locks, keyed by group DN. Grows with the number of
	/// distinct groups touched; entries are never removed.
	locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<D: Directory> MembershipReconciler<D> {
	/// Create a reconciler over the given directory handle.
	#[must_use]
	pub fn new(directory: Arc<D>, naming: NamingConfig) -> Self {
		MembershipReconciler { directory, naming, locks: Mutex::new(HashMap::new()) }
	}

	/// Acquire the write lock for one group.
	async fn lock_group(&self, group_id: &str) -> OwnedMutexGuard<()> {
		let mutex = {
			let mut locks = self.locks.lock().await;
			locks.entry(group_id.to_owned()).or_default().clone()
		};
		mutex.lock_owned().await
	}

	/// Resolve a member reference to the login handle stored on group
	/// entries. Fails with [`Error::MemberNotFound`] if the referenced user
	/// entry does not exist or carries no handle.
	async fn resolve_handle(&self, user_id: &str) -> Result<String, Error> {
		let entries = self
			.directory
			.search(user_id, Scope::Base, "(objectClass=*)", vec!["uid".to_owned()])
			.await
			.map_err(|err| match err {
				Error::NotFound(_) => Error::MemberNotFound(user_id.to_owned()),
				other => other,
			})?;
		entries
			.first()
			.and_then(|entry| entry.attr_first("uid"))
			.map(str::to_owned)
			.ok_or_else(|| Error::MemberNotFound(user_id.to_owned()))
	}

	/// Resolve a list of references to a de-duplicated handle list,
	/// preserving first-occurrence order.
	pub async fn resolve_refs(&self, members: &[MemberRef]) -> Result<Vec<String>, Error> {
		let mut handles = Vec::with_capacity(members.len());
		for member in members {
			let handle = self.resolve_handle(&member.value).await?;
			if !handles.contains(&handle) {
				handles.push(handle);
			}
		}
		Ok(handles)
	}

	/// Read the member handle list currently stored on a group entry.
	async fn read_members(&self, group_id: &str) -> Result<Vec<String>, Error> {
		let entries = self
			.directory
			.search(group_id, Scope::Base, "(objectClass=*)", mapper::group_attributes())
			.await?;
		let entry = entries.first().ok_or_else(|| Error::NotFound(group_id.to_owned()))?;
		Ok(entry.attr_all("memberUid").to_vec())
	}

	/// Replace the stored member list with an attribute-replace modification.
	async fn write_members(&self, group_id: &str, handles: &[String]) -> Result<(), Error> {
		debug!(group = group_id, members = handles.len(), "writing group member list");
		let values: HashSet<String> = handles.iter().cloned().collect();
		self.directory
			.modify(group_id, vec![Mod::Replace("memberUid".to_owned(), values)])
			.await
	}

	/// Replace a group's entire member list with the given references.
	///
	/// Returns the handle list that was written.
	pub async fn replace_all(
		&self,
		group_id: &str,
		members: &[MemberRef],
	) -> Result<Vec<String>, Error> {
		let _guard = self.lock_group(group_id).await;
		let handles = self.resolve_refs(members).await?;
		self.write_members(group_id, &handles).await?;
		Ok(handles)
	}

	/// Add the referenced members to a group, skipping handles already
	/// present. Applying the same reference set twice leaves the list
	/// unchanged, and the second application issues no write at all.
	pub async fn add_members(
		&self,
		group_id: &str,
		members: &[MemberRef],
	) -> Result<Vec<String>, Error> {
		let _guard = self.lock_group(group_id).await;
		let additions = self.resolve_refs(members).await?;
		let current = self.read_members(group_id).await?;
		self.merge_into(group_id, current, additions).await
	}

	/// Add one already-resolved login handle to a group. Used when the user
	/// entry was just created and its handle is known without a lookup.
	pub async fn add_handle(&self, group_id: &str, handle: &str) -> Result<Vec<String>, Error> {
		let _guard = self.lock_group(group_id).await;
		let current = self.read_members(group_id).await?;
		self.merge_into(group_id, current, vec![handle.to_owned()]).await
	}

	/// Append missing handles and write back only if anything changed.
	async fn merge_into(
		&self,
		group_id: &str,
		mut current: Vec<String>,
		additions: Vec<String>,
	) -> Result<Vec<String>, Error> {
		let mut changed = false;
		for handle in additions {
			if !current.contains(&handle) {
				current.push(handle);
				changed = true;
			}
		}
		if changed {
			self.write_members(group_id, &current).await?;
		} else {
			debug!(group = group_id, "membership unchanged, skipping write");
		}
		Ok(current)
	}

	/// Remove the referenced member from a group.
	///
	/// An unresolvable reference is an error; a resolved member that is not
	/// in the list is a no-op, not an error.
	pub async fn remove_member(
		&self,
		group_id: &str,
		member: &MemberRef,
	) -> Result<Vec<String>, Error> {
		let _guard = self.lock_group(group_id).await;
		let handle = self.resolve_handle(&member.value).await?;
		let mut current = self.read_members(group_id).await?;
		if let Some(index) = current.iter().position(|existing| *existing == handle) {
			current.remove(index);
			self.write_members(group_id, &current).await?;
		} else {
			debug!(group = group_id, handle = %handle, "member not in list, nothing to remove");
		}
		Ok(current)
	}

	/// Reverse lookup: every group whose member list contains the handle.
	/// Populates a User resource's derived `groups` field.
	pub async fn groups_for_user(&self, handle: &str) -> Result<Vec<GroupRef>, Error> {
		let filter = format!(
			"(&(objectClass={})(memberUid={}))",
			escape_filter_value(&self.naming.group_object_class),
			escape_filter_value(handle)
		);
		let entries = self
			.directory
			.search(&self.naming.group_base, Scope::Subtree, &filter, vec!["cn".to_owned()])
			.await?;
		Ok(entries
			.into_iter()
			.map(|entry| GroupRef {
				display: entry.attr_first("cn").map(str::to_owned),
				value: entry.dn,
			})
			.collect())
	}

	/// Resolve stored login handles back to full member references for a
	/// group read. A handle whose user entry has vanished is skipped with a
	/// warning; referential integrity is only checked when membership is
	/// written, and a read should still render the rest of the group.
	pub async fn resolve_member_refs(&self, handles: &[String]) -> Result<Vec<MemberRef>, Error> {
		let mut members = Vec::with_capacity(handles.len());
		for handle in handles {
			let filter = format!(
				"(&(objectClass={})(uid={}))",
				escape_filter_value(&self.naming.user_object_class),
				escape_filter_value(handle)
			);
			let entries = self
				.directory
				.search(
					&self.naming.user_base,
					Scope::Subtree,
					&filter,
					vec!["uid".to_owned(), "cn".to_owned()],
				)
				.await?;
			match entries.into_iter().next() {
				Some(entry) => members.push(MemberRef {
					display: entry.attr_first("cn").map(str::to_owned),
					value: entry.dn,
				}),
				None => warn!(handle = %handle, "member handle has no user entry, skipping"),
			}
		}
		Ok(members)
	}
}
