pub mod io;

/// Checks whether a byte is a `tchar` (token character).
pub fn is_tchar(b: u8) -> bool {
	b.is_ascii_alphanumeric()
		|| matches!(
			b,
			b'!' | b'#'
				| b'$' | b'%'
				| b'&' | b'\''
				| b'*' | b'+'
				| b'-' | b'.'
				| b'^' | b'_'
				| b'`' | b'|'
				| b'~'
		)
}

/// Checks whether a string is a token.
///
/// A token is a string of at least one character comprising only digits, letters, and the
/// characters ```!#$%&'*+-.^_`|~```. Request methods and header names must be tokens.
pub fn is_token(name: &str) -> bool {
	!name.is_empty() && name.bytes().all(is_tchar)
}

/// Checks whether a byte can legally appear in an HTTP header value.
pub fn is_field_vchar(b: u8) -> bool {
	b == b'\t' || (b >= 0x20 && b != 0x7F)
}

/// Checks whether an HTTP method is one whose request body is expected to carry a declared length
/// even when empty.
pub fn expects_body(method: &str) -> bool {
	matches!(method, "POST" | "PUT" | "PATCH")
}
