//! Translation of protocol filter expressions into directory search filters.
//!
//! The provisioning protocol front-end only ever sends a single equality
//! clause (`<attribute> eq <value>`), so that is the whole supported grammar:
//! no `and`/`or`, no other operators, no multiple clauses. Unlike the ad hoc
//! string splitting this replaces, the parser rejects every other shape with
//! an invalid-filter error instead of silently admitting fragments, and all
//! values are escaped per RFC 4515 before being interpolated into a filter.

use crate::{
	error::Error,
	mapper::{directory_attribute, ResourceKind},
};

/// A parsed and remapped equality filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityFilter {
	/// Directory attribute name (already remapped from the protocol name).
	pub attribute: String,
	/// Raw comparison value, unescaped.
	pub value: String,
}

impl EqualityFilter {
	/// Render the directory search filter, scoped to the given object class.
	#[must_use]
	pub fn to_ldap(&self, object_class: &str) -> String {
		format!(
			"(&(objectClass={})({}={}))",
			escape_filter_value(object_class),
			self.attribute,
			escape_filter_value(&self.value)
		)
	}
}

/// Parse a protocol filter expression and remap its attribute name for the
/// given resource kind.
pub fn translate(kind: ResourceKind, input: &str) -> Result<EqualityFilter, Error> {
	let mut parser = Parser::new(input);
	parser.skip_whitespace();
	let attribute = parser.take_attribute()?;
	parser.skip_whitespace();
	let op = parser.take_word();
	if !op.eq_ignore_ascii_case("eq") {
		return Err(Error::InvalidFilter(format!(
			"unsupported operator {:?}, only 'eq' is supported",
			op
		)));
	}
	parser.skip_whitespace();
	let value = parser.take_value()?;
	parser.skip_whitespace();
	if !parser.at_end() {
		return Err(Error::InvalidFilter(format!(
			"unexpected trailing input at position {}",
			parser.pos
		)));
	}

	let mapped = directory_attribute(kind, &attribute).ok_or_else(|| {
		Error::InvalidFilter(format!("unknown {} attribute: {attribute}", kind.name()))
	})?;

	Ok(EqualityFilter { attribute: mapped.to_owned(), value })
}

/// Parse a patch path of the form `members[value eq "<id>"]`, returning the
/// referenced member identifier.
pub fn parse_member_path(path: &str) -> Result<String, Error> {
	let mut parser = Parser::new(path);
	parser.skip_whitespace();
	if parser.take_attribute()? != "members" || !parser.try_consume('[') {
		return Err(Error::UnsupportedOperation(format!("unsupported patch path: {path}")));
	}
	parser.skip_whitespace();
	let attribute = parser.take_attribute()?;
	parser.skip_whitespace();
	let op = parser.take_word();
	if attribute != "value" || !op.eq_ignore_ascii_case("eq") {
		return Err(Error::UnsupportedOperation(format!("unsupported patch path: {path}")));
	}
	parser.skip_whitespace();
	let value = parser.take_value()?;
	parser.skip_whitespace();
	if !parser.try_consume(']') {
		return Err(Error::UnsupportedOperation(format!("unsupported patch path: {path}")));
	}
	parser.skip_whitespace();
	if !parser.at_end() {
		return Err(Error::UnsupportedOperation(format!("unsupported patch path: {path}")));
	}
	Ok(value)
}

/// Escape the RFC 4515 filter metacharacters in a value.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
	value
		.replace('\\', "\\5c")
		.replace('*', "\\2a")
		.replace('(', "\\28")
		.replace(')', "\\29")
		.replace('\0', "\\00")
}

/// Cursor over a filter or patch-path expression.
struct Parser<'a> {
	/// The input being parsed.
	input: &'a str,
	/// Byte offset of the cursor.
	pos: usize,
}

impl<'a> Parser<'a> {
	/// Start parsing at the beginning of `input`.
	fn new(input: &'a str) -> Self {
		Parser { input, pos: 0 }
	}

	/// Whether every byte of the input has been consumed.
	fn at_end(&self) -> bool {
		self.pos >= self.input.len()
	}

	/// The character under the cursor, or NUL at end of input.
	fn current(&self) -> char {
		self.input[self.pos..].chars().next().unwrap_or('\0')
	}

	/// Advance past any whitespace.
	fn skip_whitespace(&mut self) {
		while !self.at_end() && self.current().is_whitespace() {
			self.pos += self.current().len_utf8();
		}
	}

	/// Consume `c` if it is the next character.
	fn try_consume(&mut self, c: char) -> bool {
		if !self.at_end() && self.current() == c {
			self.pos += c.len_utf8();
			true
		} else {
			false
		}
	}

	/// Consume an attribute name (alphanumerics, `.`, `_`).
	fn take_attribute(&mut self) -> Result<String, Error> {
		let start = self.pos;
		while !self.at_end() {
			let c = self.current();
			if c.is_alphanumeric() || c == '.' || c == '_' {
				self.pos += c.len_utf8();
			} else {
				break;
			}
		}
		if self.pos == start {
			return Err(Error::InvalidFilter("expected attribute name".to_owned()));
		}
		Ok(self.input[start..self.pos].to_owned())
	}

	/// Consume a bare alphabetic word (the operator position).
	fn take_word(&mut self) -> String {
		let start = self.pos;
		while !self.at_end() && self.current().is_alphabetic() {
			self.pos += self.current().len_utf8();
		}
		self.input[start..self.pos].to_owned()
	}

	/// Consume a comparison value: a double-quoted string, or a bare token
	/// running to the next whitespace or `]`.
	fn take_value(&mut self) -> Result<String, Error> {
		if self.try_consume('"') {
			let start = self.pos;
			while !self.at_end() && self.current() != '"' {
				self.pos += self.current().len_utf8();
			}
			let value = self.input[start..self.pos].to_owned();
			if !self.try_consume('"') {
				return Err(Error::InvalidFilter("unterminated quoted value".to_owned()));
			}
			Ok(value)
		} else {
			let start = self.pos;
			while !self.at_end() && !self.current().is_whitespace() && self.current() != ']' {
				self.pos += self.current().len_utf8();
			}
			if self.pos == start {
				return Err(Error::InvalidFilter("expected comparison value".to_owned()));
			}
			Ok(self.input[start..self.pos].to_owned())
		}
	}
}
