use crate::error::BadChunk;

/// A piece of request body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Chunk {
	/// Text, converted to bytes using the [`Encoding`] given alongside it.
	Text(String),

	/// Bytes, sent as they are.
	Binary(Vec<u8>),
}

/// How a [`Chunk::Text`] is converted to bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
	/// UTF-8.
	Utf8,

	/// ISO-8859-1; every character must be below U+0100.
	Latin1,

	/// US-ASCII; every character must be below U+0080.
	Ascii,

	/// Pairs of hex digits, one pair per byte.
	Hex,
}

impl Default for Encoding {
	fn default() -> Self {
		Self::Utf8
	}
}

impl Chunk {
	/// Converts the chunk to bytes.
	///
	/// The `encoding` parameter is ignored for binary chunks.
	///
	/// # Errors
	/// This function returns an error if a text chunk contains a character that cannot be
	/// represented in `encoding`.
	pub fn into_bytes(self, encoding: Encoding) -> Result<Vec<u8>, BadChunk> {
		match self {
			Self::Binary(bytes) => Ok(bytes),
			Self::Text(text) => match encoding {
				Encoding::Utf8 => Ok(text.into_bytes()),
				Encoding::Latin1 => text
					.chars()
					.map(|c| {
						if (c as u32) < 0x100 {
							Ok(c as u8)
						} else {
							Err(BadChunk::NotLatin1(c))
						}
					})
					.collect(),
				Encoding::Ascii => text
					.chars()
					.map(|c| {
						if c.is_ascii() {
							Ok(c as u8)
						} else {
							Err(BadChunk::NotAscii(c))
						}
					})
					.collect(),
				Encoding::Hex => decode_hex(&text),
			},
		}
	}

	/// Returns whether the chunk holds no data.
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Text(text) => text.is_empty(),
			Self::Binary(bytes) => bytes.is_empty(),
		}
	}
}

/// Decodes a string of hex digit pairs.
fn decode_hex(text: &str) -> Result<Vec<u8>, BadChunk> {
	let digits = text
		.chars()
		.map(|c| c.to_digit(16).map(|d| d as u8).ok_or(BadChunk::NotHex(c)))
		.collect::<Result<Vec<u8>, BadChunk>>()?;
	if digits.len() % 2 != 0 {
		return Err(BadChunk::OddHexLength);
	}
	Ok(digits
		.chunks(2)
		.map(|pair| (pair[0] << 4) | pair[1])
		.collect())
}

impl From<String> for Chunk {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<&str> for Chunk {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

impl From<Vec<u8>> for Chunk {
	fn from(bytes: Vec<u8>) -> Self {
		Self::Binary(bytes)
	}
}

impl From<&[u8]> for Chunk {
	fn from(bytes: &[u8]) -> Self {
		Self::Binary(bytes.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Chunk {
	fn from(bytes: &[u8; N]) -> Self {
		Self::Binary(bytes.to_vec())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	/// Tests converting text in each encoding.
	#[test]
	fn test_encodings() {
		assert_eq!(
			Chunk::from("é").into_bytes(Encoding::Utf8),
			Ok(vec![0xC3, 0xA9])
		);
		assert_eq!(
			Chunk::from("é").into_bytes(Encoding::Latin1),
			Ok(vec![0xE9])
		);
		assert_eq!(
			Chunk::from("€").into_bytes(Encoding::Latin1),
			Err(BadChunk::NotLatin1('€'))
		);
		assert_eq!(
			Chunk::from("ok").into_bytes(Encoding::Ascii),
			Ok(b"ok".to_vec())
		);
		assert_eq!(
			Chunk::from("é").into_bytes(Encoding::Ascii),
			Err(BadChunk::NotAscii('é'))
		);
		assert_eq!(
			Chunk::from("00fF10").into_bytes(Encoding::Hex),
			Ok(vec![0x00, 0xFF, 0x10])
		);
		assert_eq!(
			Chunk::from("abc").into_bytes(Encoding::Hex),
			Err(BadChunk::OddHexLength)
		);
		assert_eq!(
			Chunk::from("zz").into_bytes(Encoding::Hex),
			Err(BadChunk::NotHex('z'))
		);
	}

	/// Tests that binary chunks ignore the encoding.
	#[test]
	fn test_binary_passthrough() {
		let bytes = vec![0xFF, 0x00, 0x80];
		assert_eq!(
			Chunk::from(bytes.clone()).into_bytes(Encoding::Ascii),
			Ok(bytes)
		);
		assert!(Chunk::from(&b""[..]).is_empty());
		assert!(!Chunk::from(b"x").is_empty());
	}
}
