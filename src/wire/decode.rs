use crate::error::{BadChunkHeader, BadContentLength, InvalidData};
use crate::response::{RawHeader, ResponseHead};
use std::io::Result;
use std::num::NonZeroU64;

/// The maximum number of response headers accepted.
const MAX_HEADERS: usize = 128;

/// Something decoded from the response byte stream.
#[derive(Debug, Eq, PartialEq)]
pub enum Output {
	/// The final (non-informational) response head.
	Head(ResponseHead),

	/// A piece of the response body.
	Data(Vec<u8>),

	/// The response body is complete.
	End,
}

/// Where the chunked body decoder is within the framing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Chunked {
	/// Expecting the first hex digit of a size line.
	SizeFirst,

	/// Inside a size line, with the size accumulated so far.
	SizeRest(u64),

	/// Skipping extensions after a size.
	Ext(u64),

	/// Expecting the LF that ends a size line.
	HeaderLF(u64),

	/// Inside chunk data, with the number of bytes still to come.
	Data(NonZeroU64),

	/// Expecting the CR after chunk data.
	DataCR,

	/// Expecting the LF after chunk data.
	DataLF,

	/// Expecting the CR after the zero-size line.
	FinalCR,

	/// Expecting the LF after the zero-size line.
	FinalLF,
}

impl Chunked {
	/// Advances the state by one framing byte.
	///
	/// Returns `None` once the terminal chunk has been fully read. Must not be called in
	/// [`Chunked::Data`].
	fn step(self, b: u8) -> std::result::Result<Option<Self>, BadChunkHeader> {
		Ok(Some(match self {
			Self::SizeFirst => match hex_value(b) {
				Some(digit) => Self::SizeRest(digit),
				None => return Err(BadChunkHeader::SizeNotHex),
			},
			Self::SizeRest(size) => match b {
				b';' => Self::Ext(size),
				b'\r' => Self::HeaderLF(size),
				_ => match hex_value(b) {
					Some(digit) => {
						let shifted = size.checked_mul(16).ok_or(BadChunkHeader::SizeNotU64)?;
						Self::SizeRest(shifted | digit)
					}
					None => return Err(BadChunkHeader::SizeNotHex),
				},
			},
			Self::Ext(size) => match b {
				b'\r' => Self::HeaderLF(size),
				b'\t' => Self::Ext(size),
				b if b.is_ascii_control() => return Err(BadChunkHeader::ExtChar),
				_ => Self::Ext(size),
			},
			Self::HeaderLF(size) if b == b'\n' => match NonZeroU64::new(size) {
				Some(n) => Self::Data(n),
				None => Self::FinalCR,
			},
			Self::DataCR if b == b'\r' => Self::DataLF,
			Self::DataLF if b == b'\n' => Self::SizeFirst,
			Self::FinalCR if b == b'\r' => Self::FinalLF,
			Self::FinalLF if b == b'\n' => return Ok(None),
			Self::Data(_) => {
				debug_assert!(false, "chunk data is not framing");
				self
			}
			Self::HeaderLF(_) | Self::DataCR | Self::DataLF | Self::FinalCR | Self::FinalLF => {
				return Err(BadChunkHeader::Newline)
			}
		}))
	}
}

/// Decodes one hex digit.
fn hex_value(b: u8) -> Option<u64> {
	(b as char).to_digit(16).map(u64::from)
}

/// How the length of the response body is determined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Body {
	/// The body has a fixed number of bytes remaining.
	Fixed(u64),

	/// The body is encoded using chunked transfer coding.
	Chunked(Chunked),

	/// The body extends until the server closes the connection.
	Eof,
}

/// The parts of a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
	/// The status line and headers are being received.
	Head,

	/// The body is being received.
	Body(Body),

	/// The whole response has been received.
	Done,
}

/// An incremental HTTP/1.1 response decoder.
///
/// Bytes are pushed in as they arrive, in pieces of any size, and decoded [`Output`]s are
/// appended to a caller-provided vector.
#[derive(Debug)]
pub struct Receiver {
	/// The response head received so far.
	head: Vec<u8>,

	/// The maximum size of a response head.
	max_head_bytes: usize,

	/// Whether the request method was `HEAD`.
	head_request: bool,

	/// The current stage.
	stage: Stage,
}

impl Receiver {
	/// Constructs a `Receiver`.
	///
	/// The `head_request` parameter indicates whether the request method was `HEAD`, in which case
	/// the response carries no body whatever its headers say.
	pub fn new(max_head_bytes: usize, head_request: bool) -> Self {
		Self {
			head: Vec::new(),
			max_head_bytes,
			head_request,
			stage: Stage::Head,
		}
	}

	/// Returns whether the response head has been received but the body has not finished.
	pub fn in_body(&self) -> bool {
		matches!(self.stage, Stage::Body(_))
	}

	/// Returns whether the whole response has been received.
	pub fn is_done(&self) -> bool {
		self.stage == Stage::Done
	}

	/// Decodes a piece of the response.
	///
	/// Bytes arriving after the response is complete are discarded.
	///
	/// # Errors
	/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData)
	/// under the following conditions:
	/// * if the response status line or headers are malformed
	/// * if the response status line and headers are larger than the configured maximum
	/// * if there are more than 128 response headers
	/// * if the server sent a status code 101 Switching Protocols
	/// * if the `Content-Length` or `Transfer-Encoding` headers are invalid, duplicated, or
	///   conflicting
	/// * if the chunked body framing is invalid
	pub fn feed(&mut self, mut data: &[u8], out: &mut Vec<Output>) -> Result<()> {
		while !data.is_empty() {
			match self.stage {
				Stage::Head => data = self.feed_head(data, out)?,
				Stage::Body(Body::Fixed(remaining)) => {
					let n = std::cmp::min(remaining, data.len() as u64) as usize;
					out.push(Output::Data(data[..n].to_vec()));
					data = &data[n..];
					self.set_body(Body::Fixed(remaining - n as u64), out);
				}
				Stage::Body(Body::Chunked(Chunked::Data(remaining))) => {
					let n = std::cmp::min(remaining.get(), data.len() as u64) as usize;
					out.push(Output::Data(data[..n].to_vec()));
					data = &data[n..];
					let state = match NonZeroU64::new(remaining.get() - n as u64) {
						Some(remaining) => Chunked::Data(remaining),
						None => Chunked::DataCR,
					};
					self.stage = Stage::Body(Body::Chunked(state));
				}
				Stage::Body(Body::Chunked(state)) => {
					self.stage = match state.step(data[0]).map_err(InvalidData::from)? {
						Some(state) => Stage::Body(Body::Chunked(state)),
						None => {
							out.push(Output::End);
							Stage::Done
						}
					};
					data = &data[1..];
				}
				Stage::Body(Body::Eof) => {
					out.push(Output::Data(data.to_vec()));
					data = &[];
				}
				Stage::Done => {
					tracing::warn!(len = data.len(), "bytes after end of response discarded");
					data = &[];
				}
			}
		}
		Ok(())
	}

	/// Handles the server closing the connection.
	///
	/// # Errors
	/// This function returns an error of kind
	/// [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof) if the response is incomplete and its
	/// end is not marked by the connection closing.
	pub fn feed_eof(&mut self, out: &mut Vec<Output>) -> Result<()> {
		match self.stage {
			Stage::Body(Body::Eof) => {
				out.push(Output::End);
				self.stage = Stage::Done;
				Ok(())
			}
			Stage::Done => Ok(()),
			Stage::Head | Stage::Body(_) => Err(std::io::ErrorKind::UnexpectedEof.into()),
		}
	}

	/// Enters a body stage, finishing the response if nothing remains.
	fn set_body(&mut self, body: Body, out: &mut Vec<Output>) {
		self.stage = if body == Body::Fixed(0) {
			out.push(Output::End);
			Stage::Done
		} else {
			Stage::Body(body)
		};
	}

	/// Accumulates response head bytes, returning the bytes that follow the head.
	fn feed_head<'a>(&mut self, data: &'a [u8], out: &mut Vec<Output>) -> Result<&'a [u8]> {
		// Copy as many bytes as fit. This might be more than the head needs, but the excess is
		// trimmed off again below.
		let used = self.head.len();
		let room = self.max_head_bytes.saturating_sub(used);
		let copied = std::cmp::min(room, data.len());
		self.head.extend_from_slice(&data[..copied]);

		let n = match headers_length(&self.head) {
			Some(n) => n,
			None if self.head.len() >= self.max_head_bytes => {
				return Err(InvalidData::ResponseHeadersTooLong.into())
			}
			None => return Ok(&data[copied..]),
		};
		self.head.truncate(n);
		let rest = &data[n - used..];

		let status_code = parse_status_code(&self.head)?;
		if status_code == 101 {
			// The server sent Switching Protocols, which is not supported.
			return Err(InvalidData::SwitchingProtocols.into());
		}
		if (100..=199).contains(&status_code) {
			// This is an informational head. Discard it and wait for the real one.
			tracing::trace!(status_code, "informational response skipped");
			self.head.clear();
			return Ok(rest);
		}

		let (head, body) = self.parse_head()?;
		self.head = Vec::new();
		out.push(Output::Head(head));
		self.set_body(body, out);
		Ok(rest)
	}

	/// Parses the complete, final response head and determines how the body is framed.
	fn parse_head(&self) -> Result<(ResponseHead, Body)> {
		let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
		let mut resp = httparse::Response::new(&mut headers);
		match resp.parse(&self.head).map_err(InvalidData::from)? {
			httparse::Status::Complete(n) if n == self.head.len() => (),
			// httparse disagrees about where the head ends. This is almost certainly due to
			// incorrect newlines.
			httparse::Status::Complete(_) | httparse::Status::Partial => {
				return Err(InvalidData::from(httparse::Error::NewLine).into())
			}
		}
		let (minor_version, status_code, reason) = match (resp.version, resp.code, resp.reason) {
			(Some(version), Some(code), Some(reason)) => (version, code, reason),
			_ => return Err(InvalidData::from(httparse::Error::Status).into()),
		};

		let content_length = get_content_length(resp.headers)?;
		let chunked = is_chunked(resp.headers)?;
		match (content_length, chunked, status_code) {
			(Some(_), true, _) => {
				return Err(InvalidData::ContentLengthAndTransferEncoding.into())
			}
			(_, true, 204) => return Err(InvalidData::TransferEncodingWithNoContent.into()),
			(Some(_), _, 204) => return Err(InvalidData::ContentLengthWithNoContent.into()),
			_ => (),
		}

		// RFC 7230 section 3.3.3, minus the CONNECT rule; exchanges never send CONNECT.
		let body = if self.head_request || status_code == 204 || status_code == 304 {
			Body::Fixed(0)
		} else if chunked {
			Body::Chunked(Chunked::SizeFirst)
		} else if let Some(n) = content_length {
			Body::Fixed(n)
		} else {
			Body::Eof
		};

		let head = ResponseHead {
			status_code,
			status_message: reason.to_owned(),
			raw_headers: resp
				.headers
				.iter()
				.map(|h| RawHeader::new(h.name, h.value))
				.collect(),
			http_version_major: 1,
			http_version_minor: minor_version,
		};
		Ok((head, body))
	}
}

/// Returns the value of the header called `name`, if present.
///
/// # Errors
/// This function returns `repeated` if the header appears more than once.
fn single_value<'h>(
	headers: &[httparse::Header<'h>],
	name: &str,
	repeated: InvalidData,
) -> Result<Option<&'h [u8]>> {
	let mut values = headers
		.iter()
		.filter(|h| h.name.eq_ignore_ascii_case(name))
		.map(|h| h.value);
	match (values.next(), values.next()) {
		(_, Some(_)) => Err(repeated.into()),
		(value, None) => Ok(value),
	}
}

/// Returns the response's declared body length.
///
/// # Errors
/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData) if
/// `Content-Length` is repeated or is not a `u64`.
fn get_content_length(headers: &[httparse::Header<'_>]) -> Result<Option<u64>> {
	match single_value(headers, "content-length", InvalidData::MultipleContentLengths)? {
		Some(value) => {
			let text = std::str::from_utf8(value).map_err(BadContentLength::NotUtf8)?;
			Ok(Some(text.parse().map_err(BadContentLength::NotU64)?))
		}
		None => Ok(None),
	}
}

/// Returns whether the response body uses chunked transfer coding.
///
/// # Errors
/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData) if
/// `Transfer-Encoding` is repeated or names any coding other than `chunked`.
fn is_chunked(headers: &[httparse::Header<'_>]) -> Result<bool> {
	match single_value(headers, "transfer-encoding", InvalidData::MultipleTransferEncodings)? {
		Some(value) if value.eq_ignore_ascii_case(b"chunked") => Ok(true),
		Some(_) => Err(InvalidData::NotChunked.into()),
		None => Ok(false),
	}
}

/// Scans the buffer and determines the length of the HTTP head.
///
/// If the whole head has been received, returns `Some(n)` where `n` is the length of the head in
/// bytes, including the final [CR]LF[CR]LF.
fn headers_length(buffer: &[u8]) -> Option<usize> {
	const ENDINGS: [&[u8]; 4] = [b"\r\n\r\n", b"\r\n\n", b"\n\r\n", b"\n\n"];
	buffer
		.iter()
		.enumerate()
		.filter(|&(_, &b)| b == b'\r' || b == b'\n')
		.find_map(|(i, _)| {
			ENDINGS
				.iter()
				.find(|ending| buffer[i..].starts_with(ending))
				.map(|ending| i + ending.len())
		})
}

/// Extracts the status code from a complete response head.
///
/// # Errors
/// This function returns an error of kind [`InvalidData`](std::io::ErrorKind::InvalidData) if the
/// status line is malformed.
fn parse_status_code(buf: &[u8]) -> Result<u16> {
	// A zero-length headers array makes httparse stop with TooManyHeaders right after the status
	// line, which is all that is needed here.
	let mut headers = [];
	let mut resp = httparse::Response::new(&mut headers);
	match resp.parse(buf) {
		Ok(httparse::Status::Complete(_)) | Err(httparse::Error::TooManyHeaders) => resp
			.code
			.ok_or_else(|| InvalidData::from(httparse::Error::Status).into()),
		Ok(httparse::Status::Partial) => Err(InvalidData::from(httparse::Error::NewLine).into()),
		Err(e) => Err(InvalidData::from(e).into()),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::ErrorKind;

	fn expect_invalid_data<T: std::fmt::Debug>(
		_expected: &InvalidData, // unused if detailed-errors is off
		x: &Result<T>,
	) {
		match x {
			Err(e) if e.kind() == ErrorKind::InvalidData => {
				#[cfg(feature = "detailed-errors")]
				{
					let source = e.get_ref().expect("Expected error source, got None");
					assert_eq!(source.downcast_ref::<InvalidData>(), Some(_expected));
				}
			}
			_ => panic!("Expected InvalidData, got {:?}", x),
		}
	}

	/// Feeds the input one byte at a time, collecting the output.
	fn feed_bytewise(rx: &mut Receiver, input: &[u8]) -> Result<Vec<Output>> {
		let mut out = Vec::new();
		for b in input {
			rx.feed(std::slice::from_ref(b), &mut out)?;
		}
		Ok(out)
	}

	/// Concatenates all the body data.
	fn body(out: &[Output]) -> Vec<u8> {
		out.iter()
			.filter_map(|o| match o {
				Output::Data(d) => Some(&d[..]),
				_ => None,
			})
			.flatten()
			.copied()
			.collect()
	}

	/// Tests decoding a fixed-length response delivered in one piece, with trailing bytes.
	#[test]
	fn test_fixed() {
		let mut rx = Receiver::new(1024, false);
		let mut out = Vec::new();
		rx.feed(
			b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-A: 1\r\nx-a: 2\r\n\r\nhelloEXTRA",
			&mut out,
		)
		.unwrap();
		match &out[0] {
			Output::Head(head) => {
				assert_eq!(head.status_code, 200);
				assert_eq!(head.status_message, "OK");
				assert_eq!(head.http_version_minor, 1);
				assert_eq!(head.raw_headers.len(), 3);
				assert_eq!(head.raw_headers[2], RawHeader::new("x-a", "2"));
			}
			other => panic!("Expected head, got {other:?}"),
		}
		assert_eq!(body(&out), b"hello");
		assert_eq!(out.last(), Some(&Output::End));
		assert!(rx.is_done());
	}

	/// Tests decoding a chunked response delivered one byte at a time.
	#[test]
	fn test_chunked_bytewise() {
		let mut rx = Receiver::new(1024, false);
		let out = feed_bytewise(
			&mut rx,
			b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n006; ext=1\r\nHello \r\n006\r\nWorld!\r\n0\r\n\r\n",
		)
		.unwrap();
		assert_eq!(body(&out), b"Hello World!");
		assert_eq!(out.last(), Some(&Output::End));
		assert!(rx.is_done());
	}

	/// Tests that informational heads are skipped.
	#[test]
	fn test_informational() {
		let mut rx = Receiver::new(1024, false);
		let mut out = Vec::new();
		rx.feed(
			b"HTTP/1.1 100 Continue\n\nHTTP/1.1 103 Early Hints\r\nLink: </a>\r\n\r\nHTTP/1.0 204 No Content\r\n\r\n",
			&mut out,
		)
		.unwrap();
		assert_eq!(out.len(), 2);
		assert!(matches!(&out[0], Output::Head(h) if h.status_code == 204 && h.http_version_minor == 0));
		assert_eq!(out[1], Output::End);
	}

	/// Tests a body delimited by the connection closing.
	#[test]
	fn test_eof_body() {
		let mut rx = Receiver::new(1024, false);
		let mut out = Vec::new();
		rx.feed(b"HTTP/1.0 200 OK\r\n\r\nsome", &mut out).unwrap();
		rx.feed(b" data", &mut out).unwrap();
		assert!(rx.in_body());
		rx.feed_eof(&mut out).unwrap();
		assert_eq!(body(&out), b"some data");
		assert_eq!(out.last(), Some(&Output::End));
	}

	/// Tests that responses to `HEAD` requests, and 304 responses, have no body.
	#[test]
	fn test_bodiless() {
		let mut rx = Receiver::new(1024, true);
		let mut out = Vec::new();
		rx.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", &mut out)
			.unwrap();
		assert_eq!(out.len(), 2);
		assert!(rx.is_done());

		let mut rx = Receiver::new(1024, false);
		let mut out = Vec::new();
		rx.feed(b"HTTP/1.1 304 Not Modified\r\n\r\n", &mut out)
			.unwrap();
		assert_eq!(out.last(), Some(&Output::End));
	}

	/// Tests that a truncated body is reported.
	#[test]
	fn test_truncated() {
		let mut rx = Receiver::new(1024, false);
		let mut out = Vec::new();
		rx.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc", &mut out)
			.unwrap();
		assert_eq!(
			rx.feed_eof(&mut out).unwrap_err().kind(),
			ErrorKind::UnexpectedEof
		);
	}

	/// Tests the rejection of invalid heads.
	#[test]
	fn test_invalid_heads() {
		let cases: &[(&[u8], InvalidData)] = &[
			(
				b"HTTP/1.1 101 Switching Protocols\r\n\r\n",
				InvalidData::SwitchingProtocols,
			),
			(
				b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nTransfer-Encoding: chunked\r\n\r\n",
				InvalidData::ContentLengthAndTransferEncoding,
			),
			(
				b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n",
				InvalidData::ContentLengthWithNoContent,
			),
			(
				b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n",
				InvalidData::MultipleContentLengths,
			),
			(
				b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n",
				InvalidData::NotChunked,
			),
		];
		for (input, expected) in cases {
			let mut rx = Receiver::new(1024, false);
			expect_invalid_data(expected, &rx.feed(input, &mut Vec::new()));
		}
	}

	/// Tests the head size limit.
	#[test]
	fn test_head_too_long() {
		let mut rx = Receiver::new(16, false);
		expect_invalid_data(
			&InvalidData::ResponseHeadersTooLong,
			&rx.feed(b"HTTP/1.1 200 OK\r\nX-Long: aaaaaaaa\r\n\r\n", &mut Vec::new()),
		);
	}

	/// Tests the rejection of bad chunk framing.
	#[test]
	fn test_bad_chunk() {
		let mut rx = Receiver::new(1024, false);
		expect_invalid_data(
			&InvalidData::BadChunkHeader(BadChunkHeader::SizeNotHex),
			&rx.feed(
				b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n",
				&mut Vec::new(),
			),
		);
		let mut rx = Receiver::new(1024, false);
		expect_invalid_data(
			&InvalidData::BadChunkHeader(BadChunkHeader::Newline),
			&rx.feed(
				b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nxy",
				&mut Vec::new(),
			),
		);
	}

	/// Tests locating the end of the head.
	#[test]
	fn test_headers_length() {
		assert_eq!(headers_length(b"A\r\n\r\nbody"), Some(5));
		assert_eq!(headers_length(b"A\n\nbody"), Some(3));
		assert_eq!(headers_length(b"A\r\nB: c\r\n"), None);
	}
}
