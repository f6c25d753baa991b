//! Helper methods for extracting data from search results.
use ldap3::SearchEntry;

/// An extension trait for [`SearchEntry`] that provides convenience methods
/// for extracting attribute values.
pub trait SearchEntryExt {
	/// Get the first value of an attribute. Returns `None` if the attribute
	/// is absent or its value is not valid UTF-8.
	fn attr_first(&self, attr: &str) -> Option<&str>;

	/// Get every value of a multi-valued attribute, in server order. Returns
	/// an empty slice if the attribute is absent.
	fn attr_all(&self, attr: &str) -> &[String];
}

impl SearchEntryExt for SearchEntry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		let attr = self.attrs.get(attr)?;
		attr.first().map(String::as_str)
	}

	fn attr_all(&self, attr: &str) -> &[String] {
		self.attrs.get(attr).map_or(&[], Vec::as_slice)
	}
}
