//! Mapping between SCIM resources and directory entry field sets.
//!
//! The mapping is a pure transformation in both directions; nothing here
//! touches the directory. Membership resolution (login handles to member
//! references and back) is the reconciler's job, so a group read surfaces the
//! raw `memberUid` handles for it to resolve.

use std::collections::HashSet;

use ldap3::SearchEntry;

use crate::{
	config::NamingConfig,
	entry::SearchEntryExt,
	error::Error,
	resource::{Group, User},
};

/// The two resource kinds the bridge provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
	/// A person entry.
	User,
	/// A group entry.
	Group,
}

impl ResourceKind {
	/// Resource type name as used in messages.
	#[must_use]
	pub fn name(self) -> &'static str {
		match self {
			ResourceKind::User => "User",
			ResourceKind::Group => "Group",
		}
	}
}

/// Map a protocol attribute name to its directory attribute. One table for
/// both the attribute mapper and the filter translator.
#[must_use]
pub fn directory_attribute(kind: ResourceKind, protocol_name: &str) -> Option<&'static str> {
	let table: &[(&str, &str)] = match kind {
		ResourceKind::User => &[
			("userName", "uid"),
			("email", "mail"),
			("givenName", "givenName"),
			("familyName", "sn"),
		],
		ResourceKind::Group => &[("displayName", "cn")],
	};
	table
		.iter()
		.find(|(protocol, _)| protocol.eq_ignore_ascii_case(protocol_name))
		.map(|&(_, directory)| directory)
}

/// Entry attributes requested when searching person entries.
#[must_use]
pub fn user_attributes() -> Vec<String> {
	["uid", "cn", "mail", "givenName", "sn"].map(str::to_owned).to_vec()
}

/// Entry attributes requested when searching group entries.
#[must_use]
pub fn group_attributes() -> Vec<String> {
	["cn", "memberUid"].map(str::to_owned).to_vec()
}

/// Converts resources to directory entry field sets and back.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
	/// Naming contexts and object classes for new entries.
	naming: NamingConfig,
}

impl AttributeMapper {
	/// Create a mapper for the given naming configuration.
	#[must_use]
	pub fn new(naming: NamingConfig) -> Self {
		AttributeMapper { naming }
	}

	/// The composite common name written for a user entry.
	fn user_cn(user: &User) -> Result<String, Error> {
		let given = require(user.given_name.as_deref(), "givenName")?;
		let family = require(user.family_name.as_deref(), "familyName")?;
		Ok(format!("{given} {family}"))
	}

	/// Distinguished name a created user entry will get.
	pub fn user_dn(&self, user: &User) -> Result<String, Error> {
		Ok(format!("cn={},{}", escape_dn_value(&Self::user_cn(user)?), self.naming.user_base))
	}

	/// Distinguished name a created group entry will get.
	pub fn group_dn(&self, group: &Group) -> Result<String, Error> {
		let name = require(group.display_name.as_deref(), "displayName")?;
		Ok(format!("cn={},{}", escape_dn_value(name), self.naming.group_base))
	}

	/// Convert a User resource into the attribute list for a directory add.
	///
	/// `active` has no directory counterpart and is not written; the derived
	/// `groups` field is never persisted on the user entry.
	pub fn user_to_entry(&self, user: &User) -> Result<Vec<(String, HashSet<String>)>, Error> {
		let user_name = require(user.user_name.as_deref(), "userName")?;
		let cn = Self::user_cn(user)?;

		let mut attrs = vec![
			attr("objectClass", &self.naming.user_object_class),
			attr("uid", user_name),
			attr("cn", &cn),
			attr("givenName", require(user.given_name.as_deref(), "givenName")?),
			attr("sn", require(user.family_name.as_deref(), "familyName")?),
		];
		if let Some(mail) = user.email.as_deref().filter(|mail| !mail.is_empty()) {
			attrs.push(attr("mail", mail));
		}
		Ok(attrs)
	}

	/// Convert a Group resource into the attribute list for a directory add.
	///
	/// Members are not written here; group creation populates `memberUid`
	/// through the reconciler after resolving the submitted references.
	pub fn group_to_entry(&self, group: &Group) -> Result<Vec<(String, HashSet<String>)>, Error> {
		let name = require(group.display_name.as_deref(), "displayName")?;
		Ok(vec![
			attr("objectClass", &self.naming.group_object_class),
			attr("cn", name),
			attr("gidNumber", &self.naming.group_gid.to_string()),
		])
	}

	/// Convert a directory entry into a User resource.
	///
	/// `active` is synthesized as `true` for every entry a search returns;
	/// the directory has no activity attribute. `groups` is left empty for
	/// the reconciler's reverse lookup.
	#[must_use]
	pub fn user_from_entry(&self, entry: &SearchEntry) -> User {
		User {
			schemas: vec![crate::resource::USER_SCHEMA.to_owned()],
			id: Some(entry.dn.clone()),
			user_name: entry.attr_first("uid").map(str::to_owned),
			email: entry.attr_first("mail").map(str::to_owned),
			given_name: entry.attr_first("givenName").map(str::to_owned),
			family_name: entry.attr_first("sn").map(str::to_owned),
			active: true,
			groups: Vec::new(),
		}
	}

	/// Convert a directory entry into a Group resource plus the raw member
	/// login handles stored on the entry.
	#[must_use]
	pub fn group_from_entry(&self, entry: &SearchEntry) -> (Group, Vec<String>) {
		let group = Group {
			schemas: vec![crate::resource::GROUP_SCHEMA.to_owned()],
			id: Some(entry.dn.clone()),
			display_name: entry.attr_first("cn").map(str::to_owned),
			members: Vec::new(),
		};
		(group, entry.attr_all("memberUid").to_vec())
	}
}

/// Build a single-valued attribute pair.
fn attr(name: &str, value: &str) -> (String, HashSet<String>) {
	(name.to_owned(), HashSet::from([value.to_owned()]))
}

/// A write-time-required field: present and non-empty, or `InvalidResource`.
fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, Error> {
	match value {
		Some(value) if !value.trim().is_empty() => Ok(value),
		_ => Err(Error::InvalidResource(format!("missing required field {field}"))),
	}
}

/// Escape a DN attribute value per RFC 4514.
///
/// Distinct from filter escaping: `,` `+` `"` `\` `<` `>` `;` `=` always,
/// space only leading or trailing, `#` only leading, NUL as hex.
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
	let chars: Vec<char> = value.chars().collect();
	let mut result = String::with_capacity(value.len() * 2);
	for (i, &c) in chars.iter().enumerate() {
		let is_first = i == 0;
		let is_last = i == chars.len() - 1;
		match c {
			',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
				result.push('\\');
				result.push(c);
			}
			'\0' => result.push_str("\\00"),
			' ' if is_first || is_last => result.push_str("\\20"),
			'#' if is_first => result.push_str("\\23"),
			_ => result.push(c),
		}
	}
	result
}
