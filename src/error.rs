//! Errors that originate inside `reqpipe`, its transports, or `httparse`.
//!
//! `reqpipe` reports two families of errors. Programmer errors, such as building a request for an
//! unsupported protocol or mutating headers after they have been sent, are returned synchronously
//! as an [`Error`] from the offending call. Operational errors, such as writing to a request that
//! has already finished or a transport failing mid-exchange, are delivered asynchronously through
//! the request’s `error` event and never returned from the call that observed them.
//!
//! The HTTP/1.1 reference transport decodes responses from raw bytes. When the server sends an
//! invalid or unsupported response, the failure is reported as a [`std::io::Error`] of kind
//! [`std::io::ErrorKind::InvalidData`]; if the `detailed-errors` feature is enabled, then the inner
//! error of the [`std::io::Error`] is an [`InvalidData`] instance, otherwise there is no source.

use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// A request-mutating operation which is only legal before the request has started sending.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mutation {
	/// Setting a header.
	SetHeader,

	/// Removing a header.
	RemoveHeader,

	/// Changing the chunked-encoding flag.
	ChunkedEncoding,
}

impl Display for Mutation {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::SetHeader => write!(f, "set headers"),
			Self::RemoveHeader => write!(f, "remove headers"),
			Self::ChunkedEncoding => write!(f, "set the transfer encoding"),
		}
	}
}

/// The ways in which an argument to a request operation can be invalid.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InvalidArgument {
	/// A header name was empty.
	EmptyHeaderName,

	/// A header name is not a token.
	HeaderName(String),

	/// A header value contains bytes that cannot appear in a header field.
	HeaderValue(String),

	/// The request method is not a token.
	Method(String),
}

impl Display for InvalidArgument {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::EmptyHeaderName => write!(f, "Header name is required"),
			Self::HeaderName(name) => write!(f, "Header name {name:?} is not a token"),
			Self::HeaderValue(name) => {
				write!(f, "Value of header {name:?} is not a valid field value")
			}
			Self::Method(method) => write!(f, "Request method {method:?} is not a token"),
		}
	}
}

/// The ways in which a text chunk cannot be converted to bytes in its declared encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BadChunk {
	/// A character is outside the Latin-1 range.
	NotLatin1(char),

	/// A character is outside the ASCII range.
	NotAscii(char),

	/// A hex string has an odd number of digits.
	OddHexLength,

	/// A character in a hex string is not a hex digit.
	NotHex(char),
}

impl Display for BadChunk {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::NotLatin1(c) => write!(f, "Character {c:?} cannot be encoded as Latin-1"),
			Self::NotAscii(c) => write!(f, "Character {c:?} cannot be encoded as ASCII"),
			Self::OddHexLength => write!(f, "Hex string has an odd number of digits"),
			Self::NotHex(c) => write!(f, "Character {c:?} is not a hex digit"),
		}
	}
}

impl std::error::Error for BadChunk {}

/// The error type for all request pipeline operations.
#[derive(Clone, Debug)]
pub enum Error {
	/// The request protocol is not one of the supported schemes.
	UnsupportedProtocol(String),

	/// The request path contains unescaped characters.
	///
	/// Only spaces are checked for; they are guaranteed to produce an invalid request line.
	MalformedPath(String),

	/// A bare URL string could not be parsed.
	InvalidUrl(url::ParseError),

	/// An argument to a request operation is invalid.
	InvalidArgument(InvalidArgument),

	/// A mutation was attempted after the request headers were sent.
	AlreadySent(Mutation),

	/// Chunked encoding was switched back off after it was switched on.
	ChunkedEncodingLocked,

	/// A write was attempted after the request finished.
	WriteAfterEnd,

	/// A chunk could not be converted to bytes.
	Type(BadChunk),

	/// The connector has no network session by the requested name.
	SessionUnavailable(String),

	/// A handler is already registered for a URL scheme.
	SchemeAlreadyRegistered(String),

	/// The transport failed.
	Transport(Rc<std::io::Error>),
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::UnsupportedProtocol(protocol) => {
				write!(f, "Protocol {protocol:?} not supported")
			}
			Self::MalformedPath(path) => {
				write!(f, "Request path {path:?} contains unescaped characters")
			}
			Self::InvalidUrl(inner) => write!(f, "Invalid URL: {inner}"),
			Self::InvalidArgument(inner) => inner.fmt(f),
			Self::AlreadySent(mutation) => {
				write!(f, "Can’t {mutation} after headers have been sent")
			}
			Self::ChunkedEncodingLocked => {
				write!(f, "Chunked encoding can’t be switched off once enabled")
			}
			Self::WriteAfterEnd => write!(f, "Write after end"),
			Self::Type(inner) => write!(f, "Invalid chunk: {inner}"),
			Self::SessionUnavailable(session) => {
				write!(f, "Network session {session:?} is not available")
			}
			Self::SchemeAlreadyRegistered(scheme) => {
				write!(f, "A handler for scheme {scheme:?} is already registered")
			}
			Self::Transport(inner) => write!(f, "Transport failed: {inner}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::InvalidUrl(inner) => Some(inner),
			Self::Type(inner) => Some(inner),
			Self::Transport(inner) => Some(&**inner),
			Self::UnsupportedProtocol(_)
			| Self::MalformedPath(_)
			| Self::InvalidArgument(_)
			| Self::AlreadySent(_)
			| Self::ChunkedEncodingLocked
			| Self::WriteAfterEnd
			| Self::SessionUnavailable(_)
			| Self::SchemeAlreadyRegistered(_) => None,
		}
	}
}

impl From<InvalidArgument> for Error {
	fn from(inner: InvalidArgument) -> Self {
		Self::InvalidArgument(inner)
	}
}

impl From<BadChunk> for Error {
	fn from(inner: BadChunk) -> Self {
		Self::Type(inner)
	}
}

impl From<url::ParseError> for Error {
	fn from(inner: url::ParseError) -> Self {
		Self::InvalidUrl(inner)
	}
}

impl From<std::io::Error> for Error {
	fn from(inner: std::io::Error) -> Self {
		Self::Transport(Rc::new(inner))
	}
}

/// Why a `Content-Length` value in a response head was rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum BadContentLength {
	/// The value contains bytes that are not UTF-8.
	NotUtf8(std::str::Utf8Error),

	/// The value is not a decimal length representable as a `u64`.
	NotU64(std::num::ParseIntError),
}

impl Display for BadContentLength {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::NotUtf8(e) => write!(f, "not UTF-8 ({})", e),
			Self::NotU64(e) => write!(f, "not a length ({})", e),
		}
	}
}

impl std::error::Error for BadContentLength {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(match self {
			Self::NotUtf8(e) => e,
			Self::NotU64(e) => e,
		})
	}
}

/// Why the framing of a chunked response body was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BadChunkHeader {
	/// The size line does not start with a hexadecimal digit.
	SizeNotHex,

	/// The chunk size overflows a `u64`.
	SizeNotU64,

	/// The chunk extensions contain a control character.
	ExtChar,

	/// A line break is missing after a size line, after chunk data, or after the trailer.
	Newline,
}

impl Display for BadChunkHeader {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.write_str(match self {
			Self::SizeNotHex => "chunk size is not hexadecimal",
			Self::SizeNotU64 => "chunk size overflows",
			Self::ExtChar => "control character in chunk extensions",
			Self::Newline => "missing line break in chunk framing",
		})
	}
}

impl std::error::Error for BadChunkHeader {}

/// The detail attached to an [`InvalidData`](std::io::ErrorKind::InvalidData) I/O error when the
/// HTTP/1.1 transport cannot make sense of what the server sent.
///
/// The detail is only attached with the `detailed-errors` feature.
#[derive(Clone, Debug, PartialEq)]
pub enum InvalidData {
	/// `httparse` rejected the status line or a header.
	ParseHeaders(httparse::Error),

	/// The status line and headers exceed the configured maximum.
	ResponseHeadersTooLong,

	/// The server answered `101 Switching Protocols`, which an exchange cannot follow.
	SwitchingProtocols,

	/// The head carries both `Content-Length` and `Transfer-Encoding`.
	ContentLengthAndTransferEncoding,

	/// A `204 No Content` head carries `Content-Length`.
	ContentLengthWithNoContent,

	/// The head carries `Content-Length` more than once.
	MultipleContentLengths,

	/// A `Content-Length` value is malformed.
	BadContentLength(BadContentLength),

	/// A `204 No Content` head carries `Transfer-Encoding`.
	TransferEncodingWithNoContent,

	/// The head carries `Transfer-Encoding` more than once.
	MultipleTransferEncodings,

	/// `Transfer-Encoding` names something other than `chunked`.
	NotChunked,

	/// The chunked body framing is malformed.
	BadChunkHeader(BadChunkHeader),

	/// Response bytes arrived before the request head was sent.
	UnsolicitedResponse,
}

impl Display for InvalidData {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::ParseHeaders(e) => write!(f, "Malformed response head: {}", e),
			Self::ResponseHeadersTooLong => f.write_str("Response head exceeds the size limit"),
			Self::SwitchingProtocols => f.write_str("Server switched protocols"),
			Self::ContentLengthAndTransferEncoding => {
				f.write_str("Response has both Content-Length and Transfer-Encoding")
			}
			Self::ContentLengthWithNoContent => f.write_str("204 response has Content-Length"),
			Self::MultipleContentLengths => f.write_str("Response repeats Content-Length"),
			Self::BadContentLength(e) => write!(f, "Response Content-Length is {}", e),
			Self::TransferEncodingWithNoContent => {
				f.write_str("204 response has Transfer-Encoding")
			}
			Self::MultipleTransferEncodings => f.write_str("Response repeats Transfer-Encoding"),
			Self::NotChunked => f.write_str("Response Transfer-Encoding is not chunked"),
			Self::BadChunkHeader(e) => write!(f, "Malformed response body: {}", e),
			Self::UnsolicitedResponse => f.write_str("Response received before request was sent"),
		}
	}
}

impl std::error::Error for InvalidData {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::ParseHeaders(e) => Some(e),
			Self::BadContentLength(e) => Some(e),
			Self::BadChunkHeader(e) => Some(e),
			_ => None,
		}
	}
}

impl From<httparse::Error> for InvalidData {
	fn from(e: httparse::Error) -> Self {
		Self::ParseHeaders(e)
	}
}

impl From<BadContentLength> for InvalidData {
	fn from(e: BadContentLength) -> Self {
		Self::BadContentLength(e)
	}
}

impl From<BadChunkHeader> for InvalidData {
	fn from(e: BadChunkHeader) -> Self {
		Self::BadChunkHeader(e)
	}
}

impl From<InvalidData> for std::io::Error {
	fn from(detail: InvalidData) -> Self {
		if cfg!(feature = "detailed-errors") {
			Self::new(std::io::ErrorKind::InvalidData, detail)
		} else {
			std::io::ErrorKind::InvalidData.into()
		}
	}
}

impl From<BadContentLength> for std::io::Error {
	fn from(e: BadContentLength) -> Self {
		InvalidData::from(e).into()
	}
}

impl From<BadChunkHeader> for std::io::Error {
	fn from(e: BadChunkHeader) -> Self {
		InvalidData::from(e).into()
	}
}
