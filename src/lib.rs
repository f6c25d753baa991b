//! Bridge SCIM 2.0 provisioning requests onto an LDAP directory server.
//!
//! The library accepts the resources a SCIM provisioning client submits
//! (Users and Groups per [RFC 7643]), maps them onto directory entries, and
//! carries out the corresponding LDAP operations. Reads translate the other
//! way: entries become SCIM resources, search filters become LDAP filters,
//! and result sets are windowed into SCIM list responses. Group membership
//! is stored as login handles on the group entry and reconciled under a
//! per-group lock so concurrent patches cannot lose updates.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate
//! which is used here for interfacing with LDAP is an excellent resource.
//!
//! [RFC 7643]: https://www.rfc-editor.org/rfc/rfc7643
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! A minimal example of serving a few requests might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use url::Url;
//! use scim_ldap_bridge::{
//!     config::{Config, ConnectionConfig, NamingConfig},
//!     resource::{ListQuery, User},
//!     ProvisioningAdapter,
//! };
//!
//! // Configuration can also be deserialized with serde. It's hand-constructed
//! // here for demonstration purposes.
//! let config = Config {
//!     url: Url::parse("ldap://localhost")?,
//!     connection: ConnectionConfig::default(),
//!     bind_dn: "cn=admin,dc=example,dc=org".to_owned(),
//!     bind_password: "verysecret".to_owned(),
//!     naming: NamingConfig {
//!         user_base: "ou=Users,dc=example,dc=org".to_owned(),
//!         group_base: "ou=Groups,dc=example,dc=org".to_owned(),
//!         user_object_class: "inetOrgPerson".to_owned(),
//!         group_object_class: "posixGroup".to_owned(),
//!         group_gid: 2000,
//!     },
//! };
//!
//! let adapter = ProvisioningAdapter::from_config(config);
//! let page = adapter
//!     .list_users(&ListQuery {
//!         filter: Some(r#"userName eq "jdoe""#.to_owned()),
//!         ..ListQuery::default()
//!     })
//!     .await?;
//! println!("Matched {} users", page.total_results);
//!
//! let user: User = adapter.get_user("cn=Jane Doe,ou=Users,dc=example,dc=org").await?;
//! println!("Fetched: {user:#?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Entry renames (LDAP modrdn) are not performed; updates that would
//!   change an entry's naming attribute are rejected instead.
//! * `active` is synthesized: deactivating a user deletes its entry, and
//!   every entry that exists reads back as active.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing the bind
//!   password, it probably should be

pub mod adapter;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod membership;
pub mod page;
pub mod resource;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	adapter::ProvisioningAdapter,
	config::{Config, ConnectionConfig, NamingConfig, TLSConfig},
	directory::{Directory, LdapDirectory},
	entry::SearchEntryExt,
	error::{Error, ErrorResponse},
	resource::{Group, ListQuery, ListResponse, MemberRef, PatchRequest, User},
};
