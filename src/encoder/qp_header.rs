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

//! RFC 2047 encodings for header fields.

use super::qp::{QpEngine, SafeMap};
use super::{transcode, CharSource};

/// The longest encoded word RFC 2047 allows.
pub const MAX_ENCODED_WORD: usize = 75;

fn q_safe_map() -> SafeMap {
    let mut map = [None; 256];
    for b in (b'a'..=b'z')
        .chain(b'A'..=b'Z')
        .chain(b'0'..=b'9')
        .chain(b"!*+-/".iter().cloned())
    {
        map[b as usize] = Some(b);
    }
    map[b' ' as usize] = Some(b'_');
    map
}

/// The encoding used inside RFC 2047 encoded words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderEncoder {
    /// The "Q" encoding, a variant of quoted-printable.
    Q,
    /// The "B" encoding, which is plain base64.
    B,
}

impl HeaderEncoder {
    pub fn name(self) -> &'static str {
        match self {
            HeaderEncoder::Q => "Q",
            HeaderEncoder::B => "B",
        }
    }

    /// Encode `input`, which is text in `charset`, into the payload of one
    /// or more encoded words separated by CRLF.
    ///
    /// Each line is at most `max_line_length` bytes, the first being
    /// `first_line_offset` shorter. Lines never split a character.
    pub fn encode_string(
        self,
        charset: &str,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Vec<u8> {
        let mut source = CharSource::from_bytes(charset, input);
        let mut encoded = Vec::with_capacity(input.len() * 2);
        let mut sink = |b: &[u8]| -> std::io::Result<()> {
            encoded.extend_from_slice(b);
            Ok(())
        };

        // Encoding from memory into memory cannot fail
        let _ = match self {
            HeaderEncoder::Q => QpEngine {
                safe: q_safe_map(),
                hard_breaks: false,
                soft_break: b"\r\n",
            }
            .encode(
                &mut source,
                None,
                first_line_offset,
                max_line_length,
                &mut sink,
            ),

            HeaderEncoder::B => b_encode(
                &mut source,
                first_line_offset,
                max_line_length,
                &mut sink,
            ),
        };

        encoded
    }

    /// Render `text` as a sequence of encoded words in `charset`, separated
    /// by folding whitespace.
    ///
    /// `first_line_offset` is how much of the current line is already used.
    pub fn encoded_words(
        self,
        charset: &str,
        language: Option<&str>,
        text: &str,
        first_line_offset: usize,
    ) -> String {
        let (charset, bytes) = transcode(charset, text);
        let declaration = match language {
            Some(lang) => format!("{}*{}", charset, lang),
            None => charset.clone(),
        };

        let wrapper_len = "=??Q??=".len() + declaration.len();
        let first_line_offset = if first_line_offset >= MAX_ENCODED_WORD {
            0
        } else {
            first_line_offset
        };
        let max = MAX_ENCODED_WORD.saturating_sub(wrapper_len).max(8);
        let encoded =
            self.encode_string(&charset, &bytes, first_line_offset, max);

        String::from_utf8_lossy(&encoded)
            .split("\r\n")
            .map(|payload| {
                format!("=?{}?{}?{}?=", declaration, self.name(), payload)
            })
            .collect::<Vec<_>>()
            .join("\r\n ")
    }
}

fn b_encode(
    source: &mut CharSource<'_>,
    first_line_offset: usize,
    max_line_length: usize,
    out: &mut dyn FnMut(&[u8]) -> std::io::Result<()>,
) -> std::io::Result<()> {
    fn encoded_len(n: usize) -> usize {
        (n + 2) / 3 * 4
    }

    let max = super::effective_max(max_line_length);
    let mut this_line_max = max.saturating_sub(first_line_offset).max(4);
    let mut group = Vec::<u8>::new();
    let mut any_emitted = false;

    while let Some(ch) = source.next(1)? {
        if !group.is_empty()
            && encoded_len(group.len() + ch.len()) > this_line_max
        {
            if any_emitted {
                out(b"\r\n")?;
            }
            out(base64::encode(&group).as_bytes())?;
            any_emitted = true;
            group.clear();
            this_line_max = max;
        }
        group.extend_from_slice(&ch);
    }

    if !group.is_empty() {
        if any_emitted {
            out(b"\r\n")?;
        }
        out(base64::encode(&group).as_bytes())?;
    }
    Ok(())
}
