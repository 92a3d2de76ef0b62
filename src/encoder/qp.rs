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

//! Quoted-printable encoding, as described by RFC 2045.

use std::io;

use super::{effective_max, CharSource, ContentEncoder};
use crate::stream::filter::{ByteArrayReplacementFilter, StreamFilter};
use crate::stream::{InputByteStream, OutputByteStream};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Maps each byte to the literal byte it may be written as, if any.
pub(crate) type SafeMap = [Option<u8>; 256];

pub(crate) fn body_safe_map() -> SafeMap {
    let mut map = [None; 256];
    for b in [0x09u8, 0x20]
        .iter()
        .cloned()
        .chain(0x21..=0x3C)
        .chain(0x3E..=0x7E)
    {
        map[b as usize] = Some(b);
    }
    map
}

/// The core of quoted-printable encoding, shared by body and header (Q)
/// encodings.
///
/// Characters are pulled from a `CharSource` one at a time so that a soft
/// line break never splits a multi-byte character. If a filter is set, each
/// character is run through it first; when the filter needs more context
/// (say, a CR that may be followed by LF) further characters are pulled until
/// it is satisfied.
#[derive(Clone)]
pub(crate) struct QpEngine {
    pub safe: SafeMap,
    /// Turn encoded CRLF back into hard line breaks, and protect whitespace
    /// before them.
    pub hard_breaks: bool,
    /// What separates two folded lines.
    pub soft_break: &'static [u8],
}

impl QpEngine {
    pub fn encode(
        &self,
        source: &mut CharSource<'_>,
        filter: Option<&ByteArrayReplacementFilter>,
        first_line_offset: usize,
        max_line_length: usize,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        let mut lines =
            QpLines::new(first_line_offset, max_line_length, self.soft_break);
        let mut encoded = Vec::with_capacity(16);

        while let Some(mut bytes) = source.next(1)? {
            if let Some(filter) = filter {
                while filter.should_buffer(&bytes) {
                    match source.next(1)? {
                        Some(more) => bytes.extend_from_slice(&more),
                        None => break,
                    }
                }
                bytes = filter.filter(&bytes);
            }

            encoded.clear();
            let size = self.encode_bytes(&bytes, &mut encoded);
            lines.push(&encoded, size, self.hard_breaks, out)?;
        }

        lines.finish(self.hard_breaks, out)
    }

    fn encode_bytes(&self, bytes: &[u8], dst: &mut Vec<u8>) -> usize {
        let start = dst.len();
        for &b in bytes {
            match self.safe[b as usize] {
                Some(lit) => dst.push(lit),
                None => escape(b, dst),
            }
        }
        dst.len() - start
    }
}

fn escape(b: u8, dst: &mut Vec<u8>) {
    dst.push(b'=');
    dst.push(HEX[(b >> 4) as usize]);
    dst.push(HEX[(b & 0xF) as usize]);
}

/// Accumulates encoded characters into lines, inserting soft breaks.
struct QpLines {
    max: usize,
    this_line_max: usize,
    line_len: usize,
    line: Vec<u8>,
    any_emitted: bool,
    soft_break: &'static [u8],
}

impl QpLines {
    fn new(
        first_line_offset: usize,
        max_line_length: usize,
        soft_break: &'static [u8],
    ) -> Self {
        let max = effective_max(max_line_length);
        QpLines {
            max,
            this_line_max: max.saturating_sub(first_line_offset),
            line_len: 0,
            line: Vec::new(),
            any_emitted: false,
            soft_break,
        }
    }

    fn push(
        &mut self,
        encoded: &[u8],
        size: usize,
        hard_breaks: bool,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        let first_break = if hard_breaks {
            find_hard_break(encoded)
        } else {
            None
        };
        // Only what precedes a hard break lengthens this line. A space or tab
        // right before the break may grow by two when it is escaped.
        let width = first_break.map_or(size, |ix| ix + 2);

        // Strictly less than the maximum, leaving room for the `=`.
        if !self.line.is_empty() && self.line_len + width >= self.this_line_max
        {
            let line = std::mem::take(&mut self.line);
            self.emit(standardize(&line, hard_breaks), out)?;
            self.this_line_max = self.max;
            self.line_len = 0;
        }

        self.line.extend_from_slice(encoded);
        match first_break.and_then(|_| rfind_hard_break(encoded)) {
            Some(ix) => {
                self.line_len = size - ix - HARD_BREAK.len();
                self.this_line_max = self.max;
            }
            None => self.line_len += size,
        }
        Ok(())
    }

    fn emit(
        &mut self,
        line: Vec<u8>,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.any_emitted {
            out(self.soft_break)?;
        }
        self.any_emitted = true;
        out(&line)
    }

    fn finish(
        mut self,
        hard_breaks: bool,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.line.is_empty() {
            return Ok(());
        }

        let line = std::mem::take(&mut self.line);
        let mut line = standardize(&line, hard_breaks);
        let last = line.last().copied();
        if let Some(ws @ b'\t') | Some(ws @ b' ') = last {
            // Trailing whitespace at the very end would be stripped in
            // transit.
            line.pop();
            let physical = line
                .iter()
                .rposition(|&b| b'\n' == b)
                .map_or(line.len(), |p| line.len() - p - 1);
            if physical + 3 > self.this_line_max && !line.is_empty() {
                self.emit(line, out)?;
                line = Vec::new();
            }
            escape(ws, &mut line);
        }

        self.emit(line, out)
    }
}

const HARD_BREAK: &[u8] = b"=0D=0A";

fn find_hard_break(encoded: &[u8]) -> Option<usize> {
    encoded.windows(HARD_BREAK.len()).position(|w| HARD_BREAK == w)
}

fn rfind_hard_break(encoded: &[u8]) -> Option<usize> {
    encoded.windows(HARD_BREAK.len()).rposition(|w| HARD_BREAK == w)
}

/// Restore hard line breaks that were escaped as `=0D=0A`.
fn standardize(line: &[u8], hard_breaks: bool) -> Vec<u8> {
    if !hard_breaks {
        return line.to_vec();
    }

    let mut out = Vec::with_capacity(line.len());
    let mut rest = line;
    while !rest.is_empty() {
        if rest.starts_with(HARD_BREAK) {
            match out.last().copied() {
                Some(ws @ b' ') | Some(ws @ b'\t') => {
                    out.pop();
                    escape(ws, &mut out);
                }
                _ => (),
            }
            out.extend_from_slice(b"\r\n");
            rest = &rest[HARD_BREAK.len()..];
        } else {
            out.push(rest[0]);
            rest = &rest[1..];
        }
    }
    out
}

/// The quoted-printable Content-Transfer-Encoding.
///
/// By default, line endings in the input are canonicalised to CRLF first,
/// which is what text bodies need. Binary content should use base64 instead,
/// or this encoder with `without_canonicalization`.
#[derive(Clone)]
pub struct QpContentEncoder {
    engine: QpEngine,
    charset: String,
    canonicalize: bool,
}

impl QpContentEncoder {
    pub fn new(charset: &str) -> Self {
        QpContentEncoder {
            engine: QpEngine {
                safe: body_safe_map(),
                hard_breaks: true,
                soft_break: b"=\r\n",
            },
            charset: charset.to_owned(),
            canonicalize: true,
        }
    }

    /// Encode bytes exactly as given, without touching line endings.
    pub fn without_canonicalization(mut self) -> Self {
        self.canonicalize = false;
        self
    }

    fn filter(&self) -> Option<ByteArrayReplacementFilter> {
        if self.canonicalize {
            Some(ByteArrayReplacementFilter::canonical_line_endings())
        } else {
            None
        }
    }
}

impl ContentEncoder for QpContentEncoder {
    fn name(&self) -> &'static str {
        "quoted-printable"
    }

    fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(input.len() * 3 / 2);
        let mut source = CharSource::from_bytes(&self.charset, input);
        // Writing into a Vec cannot fail
        let _ = self.engine.encode(
            &mut source,
            self.filter().as_ref(),
            first_line_offset,
            max_line_length,
            &mut |b| {
                encoded.extend_from_slice(b);
                Ok(())
            },
        );
        encoded
    }

    fn encode_byte_stream(
        &self,
        os: &mut dyn OutputByteStream,
        is: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> io::Result<()> {
        let mut source = CharSource::from_stream(&self.charset, os);
        self.engine.encode(
            &mut source,
            self.filter().as_ref(),
            first_line_offset,
            max_line_length,
            &mut |b| is.write(b).map(|_| ()),
        )
    }

    fn charset_changed(&mut self, charset: &str) {
        self.charset = charset.to_owned();
    }

    fn clone_box(&self) -> Box<dyn ContentEncoder> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::stream::ArrayByteStream;

    /// Reference decoder: `=XX` escapes and `=\r\n` soft breaks.
    pub fn qp_decode(s: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(s.len());
        let mut ix = 0;
        while ix < s.len() {
            if b'=' != s[ix] {
                out.push(s[ix]);
                ix += 1;
            } else if s[ix + 1..].starts_with(b"\r\n") {
                ix += 3;
            } else {
                let hex = std::str::from_utf8(&s[ix + 1..ix + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                ix += 3;
            }
        }
        out
    }

    fn raw() -> QpContentEncoder {
        QpContentEncoder::new("utf-8").without_canonicalization()
    }

    fn lines(encoded: &[u8]) -> Vec<&[u8]> {
        let mut v = Vec::new();
        let mut start = 0;
        for ix in memchr::memchr_iter(b'\n', encoded) {
            v.push(&encoded[start..ix - 1]);
            start = ix + 1;
        }
        v.push(&encoded[start..]);
        v
    }

    #[test]
    fn safe_bytes_pass_through() {
        assert_eq!(b"hello world".to_vec(), raw().encode_string(b"hello world", 0, 0));
        assert_eq!(b"a=3Db".to_vec(), raw().encode_string(b"a=b", 0, 0));
        assert_eq!(b"=00=FF".to_vec(), raw().encode_string(b"\0\xFF", 0, 0));
        assert_eq!(
            "caf=C3=A9".as_bytes().to_vec(),
            raw().encode_string("café".as_bytes(), 0, 0)
        );
    }

    #[test]
    fn trailing_whitespace_escaped() {
        assert_eq!(b"foo=20".to_vec(), raw().encode_string(b"foo ", 0, 0));
        assert_eq!(b"foo=09".to_vec(), raw().encode_string(b"foo\t", 0, 0));
        assert_eq!(
            b"foo=20\r\nbar".to_vec(),
            raw().encode_string(b"foo \r\nbar", 0, 0)
        );
    }

    #[test]
    fn line_endings_canonicalised() {
        let qp = QpContentEncoder::new("utf-8");
        assert_eq!(
            b"one\r\ntwo\r\nthree\r\nfour".to_vec(),
            qp.encode_string(b"one\ntwo\rthree\r\nfour", 0, 0)
        );
        assert_eq!(b"a\r\n".to_vec(), qp.encode_string(b"a\r", 0, 0));
    }

    #[test]
    fn soft_breaks_at_max_length() {
        let input = vec![b'a'; 200];
        let encoded = raw().encode_string(&input, 0, 0);
        let split = lines(&encoded);
        assert_eq!(3, split.len());
        assert_eq!(76, split[0].len());
        assert!(split[0].ends_with(b"="));
        assert_eq!(input, qp_decode(&encoded));

        let encoded = raw().encode_string(&input, 20, 40);
        let split = lines(&encoded);
        assert_eq!(20, split[0].len());
        assert_eq!(40, split[1].len());
    }

    #[test]
    fn short_lines_need_no_soft_breaks() {
        let qp = QpContentEncoder::new("utf-8");
        let input = "ab\r\n".repeat(40);
        let encoded = qp.encode_string(input.as_bytes(), 0, 0);
        assert_eq!(input.as_bytes(), &encoded[..]);

        // A long line after short ones still folds at the full width
        let mut input = "ab\n".repeat(30);
        input.push_str(&"c".repeat(100));
        let encoded = qp.encode_string(input.as_bytes(), 0, 0);
        let split = lines(&encoded);
        assert_eq!(32, split.len());
        assert_eq!(b"ab", split[29]);
        assert_eq!(76, split[30].len());
        assert_eq!(25, split[31].len());
    }

    #[test]
    fn multibyte_characters_not_split() {
        let input = "ü".repeat(40);
        let encoded = raw().encode_string(input.as_bytes(), 0, 0);
        for line in lines(&encoded) {
            let body = line.strip_suffix(b"=").unwrap_or(line);
            assert_eq!(0, body.len() % 6);
        }
    }

    #[test]
    fn streaming_matches_eager() {
        let mut input = Vec::new();
        for i in 0..2000u32 {
            input.extend_from_slice(format!("line {} \t", i).as_bytes());
            input.push((i % 256) as u8);
            input.extend_from_slice(b"\n");
        }

        let qp = QpContentEncoder::new("utf-8");
        let eager = qp.encode_string(&input, 5, 0);
        let mut os = ArrayByteStream::new(input);
        let mut is = ArrayByteStream::default();
        qp.encode_byte_stream(&mut os, &mut is, 5, 0).unwrap();
        assert_eq!(eager, is.into_contents());
    }

    proptest! {
        #[test]
        fn round_trip(
            input in prop::collection::vec(any::<u8>(), 0..400),
            max in 16usize..=76,
        ) {
            let encoded = raw().encode_string(&input, 0, max);
            prop_assert_eq!(&input, &qp_decode(&encoded));
        }

        #[test]
        fn lines_within_limits(
            input in prop::collection::vec(any::<u8>(), 0..400),
            max in 16usize..=76,
        ) {
            let encoded = raw().encode_string(&input, 0, max);
            for line in lines(&encoded) {
                prop_assert!(line.len() <= max);
                prop_assert!(!line.ends_with(b" "));
                prop_assert!(!line.ends_with(b"\t"));
            }
        }

        #[test]
        fn canonical_text_round_trips_to_crlf(s in "[a-z \t\r\n]{0,200}") {
            let qp = QpContentEncoder::new("utf-8");
            let encoded = qp.encode_string(s.as_bytes(), 0, 0);
            let canonical = ByteArrayReplacementFilter::canonical_line_endings()
                .filter(s.as_bytes());
            prop_assert_eq!(canonical, qp_decode(&encoded));
        }
    }
}
