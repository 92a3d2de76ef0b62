//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Swallow.
//
// Swallow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Swallow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Swallow. If not, see <http://www.gnu.org/licenses/>.

//! Content-transfer and header encoders.
//!
//! Every content encoder has an eager form (`encode_string`) and a streaming
//! form (`encode_byte_stream`) which produce identical output; the streaming
//! form writes each folded line into the target stream as soon as it is
//! complete instead of building the whole encoding in memory.

pub mod base64;
pub mod plain;
pub mod qp;
pub mod qp_header;
pub mod rfc2231;

use std::io;

use crate::charstream::CharacterStream;
use crate::stream::{InputByteStream, OutputByteStream};

pub use self::base64::Base64ContentEncoder;
pub use self::plain::PlainContentEncoder;
pub use self::qp::QpContentEncoder;
pub use self::qp_header::HeaderEncoder;
pub use self::rfc2231::Rfc2231Encoder;

/// The longest line any content encoding may produce, CRLF excluded.
pub const MAX_ENCODED_LINE: usize = 76;

pub trait ContentEncoder {
    /// The value for Content-Transfer-Encoding.
    fn name(&self) -> &'static str;

    /// Encode `input`, folding lines at `max_line_length` (0 means the
    /// encoding's default), with the first line shortened by
    /// `first_line_offset`.
    fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Vec<u8>;

    /// Encode everything remaining in `os` into `is`.
    fn encode_byte_stream(
        &self,
        os: &mut dyn OutputByteStream,
        is: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> io::Result<()>;

    /// Called when the owning entity's charset changes.
    fn charset_changed(&mut self, _charset: &str) {}

    fn clone_box(&self) -> Box<dyn ContentEncoder>;
}

impl Clone for Box<dyn ContentEncoder> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn ContentEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ContentEncoder({})", self.name())
    }
}

/// Look up a content encoder by its Content-Transfer-Encoding name.
pub fn content_encoder_for(
    name: &str,
    charset: &str,
) -> Option<Box<dyn ContentEncoder>> {
    match &*name.to_ascii_lowercase() {
        "quoted-printable" => Some(Box::new(QpContentEncoder::new(charset))),
        "base64" => Some(Box::new(Base64ContentEncoder)),
        "7bit" => Some(Box::new(PlainContentEncoder::seven_bit())),
        "8bit" => Some(Box::new(PlainContentEncoder::eight_bit())),
        "binary" => Some(Box::new(PlainContentEncoder::binary())),
        _ => None,
    }
}

/// Clamp a requested line length to what content encodings allow.
pub(crate) fn effective_max(max_line_length: usize) -> usize {
    if 0 == max_line_length || max_line_length > MAX_ENCODED_LINE {
        MAX_ENCODED_LINE
    } else {
        max_line_length
    }
}

/// Convert `text` into bytes of `charset`.
///
/// Returns the label of the charset actually produced along with the bytes.
/// This differs from `charset` when the charset is unknown, or when it is
/// one `encoding_rs` cannot encode into (such as UTF-16), in which case the
/// result is UTF-8.
pub fn transcode(charset: &str, text: &str) -> (String, Vec<u8>) {
    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(enc) if enc != encoding_rs::UTF_8 => {
            let output = enc.output_encoding();
            let (bytes, _, _) = output.encode(text);
            let label = if output == enc {
                charset.to_owned()
            } else {
                output.name().to_ascii_lowercase()
            };
            (label, bytes.into_owned())
        }
        Some(_) => (charset.to_owned(), text.as_bytes().to_vec()),
        None => ("utf-8".to_owned(), text.as_bytes().to_vec()),
    }
}

/// Supplies characters to an encoder, pulling more bytes from an underlying
/// stream only when the characters already imported run out.
pub(crate) struct CharSource<'a> {
    chars: CharacterStream,
    os: Option<&'a mut dyn OutputByteStream>,
}

impl<'a> CharSource<'a> {
    pub fn from_bytes(charset: &str, input: &[u8]) -> Self {
        let mut chars = CharacterStream::new(charset);
        chars.import_bytes(input);
        chars.finish();
        CharSource { chars, os: None }
    }

    pub fn from_stream(
        charset: &str,
        os: &'a mut dyn OutputByteStream,
    ) -> Self {
        CharSource {
            chars: CharacterStream::new(charset),
            os: Some(os),
        }
    }

    /// Read the bytes of the next `n` characters, or fewer at the end of
    /// the data.
    pub fn next(&mut self, n: usize) -> io::Result<Option<Vec<u8>>> {
        loop {
            if self.chars.remaining() >= n {
                return Ok(self.chars.read(n));
            }

            let chunk = match self.os {
                Some(ref mut os) => os.read(8192)?,
                None => return Ok(self.chars.read(n)),
            };

            self.chars.discard_read();
            match chunk {
                Some(chunk) => self.chars.import_bytes(&chunk),
                None => {
                    self.chars.finish();
                    self.os = None;
                }
            }
        }
    }
}

/// Splits already-encoded text into lines of at most `max` bytes, the first
/// line being `first_line_offset` shorter.
pub(crate) struct LineFolder {
    max: usize,
    remaining: usize,
}

impl LineFolder {
    pub fn new(first_line_offset: usize, max: usize) -> Self {
        LineFolder {
            max,
            remaining: max.saturating_sub(first_line_offset).max(1),
        }
    }

    pub fn push(
        &mut self,
        mut data: &[u8],
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        while !data.is_empty() {
            if 0 == self.remaining {
                out(b"\r\n")?;
                self.remaining = self.max;
            }

            let n = self.remaining.min(data.len());
            out(&data[..n])?;
            self.remaining -= n;
            data = &data[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::ArrayByteStream;

    #[test]
    fn char_source_pulls_stream_lazily() {
        let mut os = ArrayByteStream::new("añb".as_bytes().to_vec());
        let mut source = CharSource::from_stream("utf-8", &mut os);
        assert_eq!(Some("añ".as_bytes().to_vec()), source.next(2).unwrap());
        assert_eq!(Some(b"b".to_vec()), source.next(2).unwrap());
        assert_eq!(None, source.next(2).unwrap());
    }

    #[test]
    fn folder_respects_first_line_offset() {
        let mut out = Vec::new();
        let mut folder = LineFolder::new(2, 4);
        folder
            .push(b"abcdefghij", &mut |b| {
                out.extend_from_slice(b);
                Ok(())
            })
            .unwrap();
        assert_eq!(b"ab\r\ncdef\r\nghij".to_vec(), out);
    }

    #[test]
    fn encoders_by_name() {
        assert_eq!(
            "quoted-printable",
            content_encoder_for("Quoted-Printable", "utf-8").unwrap().name()
        );
        assert_eq!("base64", content_encoder_for("base64", "utf-8").unwrap().name());
        assert_eq!("8bit", content_encoder_for("8bit", "utf-8").unwrap().name());
        assert!(content_encoder_for("x-uuencode", "utf-8").is_none());
    }

    #[test]
    fn transcoding() {
        assert_eq!(
            ("iso-8859-1".to_owned(), b"caf\xE9".to_vec()),
            transcode("iso-8859-1", "café")
        );
        assert_eq!(
            ("utf-8".to_owned(), "café".as_bytes().to_vec()),
            transcode("utf-8", "café")
        );
        assert_eq!(
            ("utf-8".to_owned(), "café".as_bytes().to_vec()),
            transcode("utf-16le", "café")
        );
        assert_eq!(
            ("utf-8".to_owned(), b"x".to_vec()),
            transcode("x-bogus", "x")
        );
    }
}
