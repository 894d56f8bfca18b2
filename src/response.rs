use crate::event::{Emitter, EventStream, ListenerId, ResponseEvent};
use std::rc::Rc;

/// One response header exactly as received.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawHeader {
	/// The header name, in the case the server sent it.
	pub name: String,

	/// The header value.
	pub value: Vec<u8>,
}

impl RawHeader {
	/// Constructs a header from a name and a value.
	pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// The response status line and headers, as reported by a transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseHead {
	/// The status code.
	pub status_code: u16,

	/// The reason phrase.
	pub status_message: String,

	/// The response headers in the order received, duplicates included.
	pub raw_headers: Vec<RawHeader>,

	/// The HTTP major version number.
	pub http_version_major: u8,

	/// The HTTP minor version number.
	pub http_version_minor: u8,
}

impl Default for ResponseHead {
	fn default() -> Self {
		Self {
			status_code: 200,
			status_message: "OK".to_owned(),
			raw_headers: Vec::new(),
			http_version_major: 1,
			http_version_minor: 1,
		}
	}
}

#[derive(Debug)]
struct Inner {
	head: ResponseHead,
	events: Emitter<ResponseEvent>,
}

/// A read-only view of a response.
///
/// Exactly one `Response` is created per request, when the transport reports the response head.
/// The status line and headers are captured at that instant and never change afterwards. The
/// response body arrives as [`ResponseEvent`]s.
///
/// `Response` is a cheap handle; clones refer to the same response.
#[derive(Clone, Debug)]
pub struct Response {
	inner: Rc<Inner>,
}

impl Response {
	pub(crate) fn new(head: ResponseHead) -> Self {
		Self {
			inner: Rc::new(Inner {
				head,
				events: Emitter::new(),
			}),
		}
	}

	/// Returns the status code.
	pub fn status_code(&self) -> u16 {
		self.inner.head.status_code
	}

	/// Returns the reason phrase.
	pub fn status_message(&self) -> &str {
		&self.inner.head.status_message
	}

	/// Returns the response headers in the order received, duplicates included.
	pub fn raw_headers(&self) -> &[RawHeader] {
		&self.inner.head.raw_headers
	}

	/// Returns the value of the first header with the given name, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&[u8]> {
		self.inner
			.head
			.raw_headers
			.iter()
			.find(|h| h.name.eq_ignore_ascii_case(name))
			.map(|h| &h.value[..])
	}

	/// Returns the HTTP version as `"major.minor"`.
	pub fn http_version(&self) -> String {
		format!(
			"{}.{}",
			self.inner.head.http_version_major, self.inner.head.http_version_minor
		)
	}

	/// Returns the HTTP major version number.
	pub fn http_version_major(&self) -> u8 {
		self.inner.head.http_version_major
	}

	/// Returns the HTTP minor version number.
	pub fn http_version_minor(&self) -> u8 {
		self.inner.head.http_version_minor
	}

	/// Returns the complete status line and headers.
	pub fn head(&self) -> &ResponseHead {
		&self.inner.head
	}

	/// Returns the emitter for body events.
	pub fn events(&self) -> &Emitter<ResponseEvent> {
		&self.inner.events
	}

	/// Subscribes a listener to every body event.
	pub fn on(&self, listener: impl FnMut(&ResponseEvent) + 'static) -> ListenerId {
		self.inner.events.on(listener)
	}

	/// Subscribes a listener to the next body event.
	pub fn once(&self, listener: impl FnOnce(&ResponseEvent) + 'static) -> ListenerId {
		self.inner.events.once(listener)
	}

	/// Returns a stream of body events, ending after the exchange closes.
	pub fn stream(&self) -> EventStream<ResponseEvent> {
		self.inner.events.stream()
	}

	/// Returns whether two handles refer to the same response.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}
