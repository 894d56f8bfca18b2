use std::io::Write as _;

/// The framing of a request body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
	/// The body is sent with chunked transfer coding.
	Chunked,

	/// The body has the given length, declared in a `Content-Length` header.
	Length(u64),

	/// There is no body and no framing header.
	None,
}

/// The names of headers the framing owns; user-supplied values for these are not sent.
const FRAMING_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

/// Writes a request line and request headers.
///
/// Headers are written in this order: `Host` (unless supplied in `headers`), `User-Agent` (if
/// configured and not supplied in `headers`), every entry of `headers` in order, and finally the
/// framing header.
pub fn head(
	out: &mut Vec<u8>,
	method: &str,
	target: &str,
	host: &str,
	user_agent: Option<&str>,
	headers: &[(String, String)],
	framing: Framing,
) {
	let supplied = |name: &str| headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name));

	// Writing into a Vec<u8> cannot fail.
	let _ = write!(out, "{method} {target} HTTP/1.1\r\n");
	if !supplied("host") {
		let _ = write!(out, "Host: {host}\r\n");
	}
	if let Some(user_agent) = user_agent {
		if !supplied("user-agent") {
			let _ = write!(out, "User-Agent: {user_agent}\r\n");
		}
	}
	for (name, value) in headers {
		if FRAMING_HEADERS
			.iter()
			.any(|framing| name.eq_ignore_ascii_case(framing))
		{
			tracing::warn!(header = %name, "framing header set by caller ignored");
			continue;
		}
		let _ = write!(out, "{name}: {value}\r\n");
	}
	match framing {
		Framing::Chunked => out.extend_from_slice(b"Transfer-Encoding: chunked\r\n"),
		Framing::Length(n) => {
			let _ = write!(out, "Content-Length: {n}\r\n");
		}
		Framing::None => (),
	}
	out.extend_from_slice(b"\r\n");
}

/// Writes one chunk of a chunked body.
///
/// An empty `data` would be read as the terminal chunk, so nothing is written for it.
pub fn chunk(out: &mut Vec<u8>, data: &[u8]) {
	if !data.is_empty() {
		let _ = write!(out, "{:X}\r\n", data.len());
		out.extend_from_slice(data);
		out.extend_from_slice(b"\r\n");
	}
}

/// The terminal chunk of a chunked body, with no trailers.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

#[cfg(test)]
mod test {
	use super::*;

	/// Tests the order of generated and supplied headers.
	#[test]
	fn test_head_order() {
		let mut out = Vec::new();
		head(
			&mut out,
			"POST",
			"/submit?x=1",
			"example.com:8080",
			Some("reqpipe"),
			&[
				("Accept".to_owned(), "*/*".to_owned()),
				("X-Two".to_owned(), "2".to_owned()),
			],
			Framing::Length(5),
		);
		assert_eq!(
			std::str::from_utf8(&out).unwrap(),
			"POST /submit?x=1 HTTP/1.1\r\n\
			Host: example.com:8080\r\n\
			User-Agent: reqpipe\r\n\
			Accept: */*\r\n\
			X-Two: 2\r\n\
			Content-Length: 5\r\n\
			\r\n"
		);
	}

	/// Tests that supplied headers replace generated ones and framing headers are dropped.
	#[test]
	fn test_head_overrides() {
		let mut out = Vec::new();
		head(
			&mut out,
			"GET",
			"/",
			"example.com",
			Some("reqpipe"),
			&[
				("host".to_owned(), "other.example".to_owned()),
				("User-Agent".to_owned(), "custom".to_owned()),
				("Content-Length".to_owned(), "99".to_owned()),
			],
			Framing::Chunked,
		);
		assert_eq!(
			std::str::from_utf8(&out).unwrap(),
			"GET / HTTP/1.1\r\n\
			host: other.example\r\n\
			User-Agent: custom\r\n\
			Transfer-Encoding: chunked\r\n\
			\r\n"
		);
	}

	/// Tests chunk framing.
	#[test]
	fn test_chunk() {
		let mut out = Vec::new();
		chunk(&mut out, b"Hello World!");
		chunk(&mut out, b"");
		out.extend_from_slice(LAST_CHUNK);
		assert_eq!(out, b"C\r\nHello World!\r\n0\r\n\r\n");
	}
}
