//! Shared test support: an in-memory directory double plus helpers for the
//! docker-backed live server tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	error::Error as StdError,
	sync::Mutex,
};

use ldap3::{LdapConnAsync, Mod, Scope, SearchEntry};
use scim_ldap_bridge::{error::Error, Directory};

/// An in-memory directory keyed by DN. Mirrors the slice of LDAP behavior
/// the bridge depends on, including the result codes the live directory
/// would produce for missing and duplicate entries.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
	entries: Mutex<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

impl MemoryDirectory {
	pub fn new() -> Self {
		MemoryDirectory::default()
	}

	/// Insert an entry directly, bypassing the [`Directory`] contract.
	pub fn seed(&self, dn: &str, attrs: &[(&str, &[&str])]) {
		let mut entries = self.entries.lock().unwrap();
		entries.insert(
			dn.to_owned(),
			attrs
				.iter()
				.map(|(name, values)| {
					((*name).to_owned(), values.iter().map(|value| (*value).to_owned()).collect())
				})
				.collect(),
		);
	}

	pub fn contains(&self, dn: &str) -> bool {
		self.entries.lock().unwrap().contains_key(dn)
	}

	pub fn attribute(&self, dn: &str, name: &str) -> Vec<String> {
		self.entries
			.lock()
			.unwrap()
			.get(dn)
			.and_then(|attrs| attrs.get(name))
			.cloned()
			.unwrap_or_default()
	}

	fn to_entry(dn: &str, attrs: &BTreeMap<String, Vec<String>>) -> SearchEntry {
		SearchEntry {
			dn: dn.to_owned(),
			attrs: attrs.iter().map(|(name, values)| (name.clone(), values.clone())).collect(),
			bin_attrs: HashMap::new(),
		}
	}
}

#[async_trait::async_trait]
impl Directory for MemoryDirectory {
	async fn search(
		&self,
		base: &str,
		scope: Scope,
		filter: &str,
		_attrs: Vec<String>,
	) -> Result<Vec<SearchEntry>, Error> {
		let entries = self.entries.lock().unwrap();
		match scope {
			Scope::Base => {
				let attrs =
					entries.get(base).ok_or_else(|| Error::NotFound(base.to_owned()))?;
				if filter_matches(filter, attrs) {
					Ok(vec![Self::to_entry(base, attrs)])
				} else {
					Ok(Vec::new())
				}
			}
			_ => {
				if !entries.contains_key(base) {
					return Err(Error::NotFound(base.to_owned()));
				}
				Ok(entries
					.iter()
					.filter(|(dn, _)| {
						*dn == base || dn.ends_with(&format!(",{base}"))
					})
					.filter(|(_, attrs)| filter_matches(filter, attrs))
					.map(|(dn, attrs)| Self::to_entry(dn, attrs))
					.collect())
			}
		}
	}

	async fn add(&self, dn: &str, attrs: Vec<(String, HashSet<String>)>) -> Result<(), Error> {
		let mut entries = self.entries.lock().unwrap();
		if entries.contains_key(dn) {
			return Err(Error::Conflict(dn.to_owned()));
		}
		entries.insert(
			dn.to_owned(),
			attrs
				.into_iter()
				.map(|(name, values)| {
					let mut values: Vec<String> = values.into_iter().collect();
					values.sort();
					(name, values)
				})
				.collect(),
		);
		Ok(())
	}

	async fn modify(&self, dn: &str, mods: Vec<Mod<String>>) -> Result<(), Error> {
		let mut entries = self.entries.lock().unwrap();
		let attrs = entries.get_mut(dn).ok_or_else(|| Error::NotFound(dn.to_owned()))?;
		for modification in mods {
			match modification {
				Mod::Replace(name, values) => {
					if values.is_empty() {
						attrs.remove(&name);
					} else {
						let mut values: Vec<String> = values.into_iter().collect();
						values.sort();
						attrs.insert(name, values);
					}
				}
				Mod::Add(name, values) => {
					attrs.entry(name).or_default().extend(values);
				}
				Mod::Delete(name, values) => {
					if values.is_empty() {
						attrs.remove(&name);
					} else if let Some(current) = attrs.get_mut(&name) {
						current.retain(|value| !values.contains(value));
					}
				}
				Mod::Increment(..) => {}
			}
		}
		Ok(())
	}

	async fn delete(&self, dn: &str) -> Result<(), Error> {
		let mut entries = self.entries.lock().unwrap();
		entries.remove(dn).map(|_| ()).ok_or_else(|| Error::NotFound(dn.to_owned()))
	}
}

/// Match the filter shapes the bridge emits: presence, a single equality,
/// or a conjunction of equalities.
fn filter_matches(filter: &str, attrs: &BTreeMap<String, Vec<String>>) -> bool {
	let Some(inner) = filter.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) else {
		return false;
	};
	if let Some(conjunction) = inner.strip_prefix('&') {
		return split_components(conjunction).iter().all(|component| {
			filter_matches(component, attrs)
		});
	}
	let Some((name, value)) = inner.split_once('=') else {
		return false;
	};
	let values = attrs
		.iter()
		.find(|(attr, _)| attr.eq_ignore_ascii_case(name))
		.map(|(_, values)| values.as_slice())
		.unwrap_or_default();
	if value == "*" {
		return !values.is_empty();
	}
	let value = unescape_filter_value(value);
	values.iter().any(|candidate| *candidate == value)
}

/// Split `(a=b)(c=d)` into its parenthesized components.
fn split_components(input: &str) -> Vec<&str> {
	let mut components = Vec::new();
	let mut depth = 0_usize;
	let mut start = 0_usize;
	for (index, character) in input.char_indices() {
		match character {
			'(' => {
				if depth == 0 {
					start = index;
				}
				depth += 1;
			}
			')' => {
				depth = depth.saturating_sub(1);
				if depth == 0 {
					components.push(&input[start..=index]);
				}
			}
			_ => {}
		}
	}
	components
}

/// Undo RFC 4515 `\XX` escapes so stored values can be compared literally.
fn unescape_filter_value(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(character) = chars.next() {
		if character == '\\' {
			let high = chars.next();
			let low = chars.next();
			let code = high
				.zip(low)
				.and_then(|(high, low)| {
					u8::from_str_radix(&format!("{high}{low}"), 16).ok()
				});
			match code {
				Some(code) => out.push(code as char),
				None => out.push(character),
			}
		} else {
			out.push(character);
		}
	}
	out
}

// Helpers below talk to the docker-backed server used by the ignored live
// tests.

#[allow(dead_code)]
pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn StdError>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?;
	Ok(ldap)
}

#[allow(dead_code)]
pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn StdError>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

#[allow(dead_code)]
pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn StdError>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

#[allow(dead_code)]
pub async fn ldap_delete_entry(ldap: &mut ldap3::Ldap, dn: &str) -> Result<(), Box<dyn StdError>> {
	ldap.delete(dn).await?.success()?;
	Ok(())
}
