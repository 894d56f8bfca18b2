use crate::error::InvalidArgument;
use crate::util::{is_field_vchar, is_token};
use std::collections::HashMap;

/// The request’s own copy of the headers it has handed to its transport.
///
/// The transport holds the authoritative set; this copy exists so that header reads stay
/// synchronous no matter when the transport finalizes its request head. Names are stored
/// lower-cased and compared case-insensitively.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct HeaderTable {
	entries: HashMap<String, String>,
}

impl HeaderTable {
	/// Stores a header, replacing any previous value under the same name.
	pub fn set(&mut self, name: &str, value: &str) {
		let _ = self
			.entries
			.insert(name.to_ascii_lowercase(), value.to_owned());
	}

	/// Looks up a header.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.entries
			.get(&name.to_ascii_lowercase())
			.map(String::as_str)
	}

	/// Removes a header, returning its value if it was present.
	pub fn remove(&mut self, name: &str) -> Option<String> {
		self.entries.remove(&name.to_ascii_lowercase())
	}

	/// Returns the number of headers stored.
	pub fn len(&self) -> usize {
		self.entries.len()
	}
}

/// Checks that a header name can be sent.
///
/// The name must be a token: a string of at least one character comprising only digits,
/// letters, and the characters ```!#$%&'*+-.^_`|~```.
pub(crate) fn check_name(name: &str) -> Result<(), InvalidArgument> {
	if name.is_empty() {
		Err(InvalidArgument::EmptyHeaderName)
	} else if is_token(name) {
		Ok(())
	} else {
		Err(InvalidArgument::HeaderName(name.to_owned()))
	}
}

/// Checks that a header value can be sent.
///
/// Only bytes that would break the message framing (control characters other than horizontal
/// tab, including CR and LF) are rejected.
pub(crate) fn check_value(name: &str, value: &str) -> Result<(), InvalidArgument> {
	if value.bytes().all(is_field_vchar) {
		Ok(())
	} else {
		Err(InvalidArgument::HeaderValue(name.to_owned()))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	/// Tests case-insensitive storage and lookup.
	#[test]
	fn test_case_insensitive() {
		let mut t = HeaderTable::default();
		t.set("X-Foo", "bar");
		assert_eq!(t.get("x-foo"), Some("bar"));
		assert_eq!(t.get("X-FOO"), Some("bar"));
		t.set("x-FOO", "baz");
		assert_eq!(t.len(), 1);
		assert_eq!(t.get("X-Foo"), Some("baz"));
		assert_eq!(t.remove("X-fOO").as_deref(), Some("baz"));
		assert_eq!(t.get("x-foo"), None);
		assert_eq!(t.remove("x-foo"), None);
	}

	/// Tests header name and value validation.
	#[test]
	fn test_checks() {
		assert!(check_name("Content-Type").is_ok());
		assert_eq!(check_name(""), Err(InvalidArgument::EmptyHeaderName));
		assert_eq!(
			check_name("Bad Name"),
			Err(InvalidArgument::HeaderName("Bad Name".to_owned()))
		);
		assert!(check_value("X", "a value\twith tab").is_ok());
		assert!(check_value("X", "").is_ok());
		assert_eq!(
			check_value("X", "split\r\nInjected: yes"),
			Err(InvalidArgument::HeaderValue("X".to_owned()))
		);
	}
}
