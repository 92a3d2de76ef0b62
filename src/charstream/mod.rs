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

//! Treating byte sequences as sequences of characters.
//!
//! Encoders which fold lines must never split a multi-byte character across
//! two lines (or two RFC 2047 encoded words), so they read the data through a
//! `CharacterStream`, which knows where the character boundaries are for the
//! charset in use.

use std::collections::BTreeSet;
use std::io;

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::stream::OutputByteStream;

/// Determines character boundaries for one charset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacterReader {
    /// Every character is exactly this many bytes.
    FixedWidth(usize),
    /// One byte per character, with bytes above 0x7F invalid.
    UsAscii,
    Utf8,
    /// Any other variable-width charset known to `encoding_rs`; boundaries
    /// are found by feeding a decoder one byte at a time.
    Decoded(&'static Encoding),
}

impl CharacterReader {
    pub fn for_charset(charset: &str) -> Self {
        let charset = charset.trim().to_ascii_lowercase();
        match &*charset {
            "utf-8" | "utf8" => return CharacterReader::Utf8,
            "us-ascii" | "ascii" | "ansi_x3.4-1968" | "iso646-us" => {
                return CharacterReader::UsAscii
            }
            "ucs-2" | "ucs2" | "utf-16" | "utf-16le" | "utf-16be" => {
                return CharacterReader::FixedWidth(2)
            }
            "ucs-4" | "ucs4" | "utf-32" | "utf-32le" | "utf-32be" => {
                return CharacterReader::FixedWidth(4)
            }
            _ => (),
        }

        match Encoding::for_label(charset.as_bytes()) {
            Some(enc) if enc == encoding_rs::UTF_8 => CharacterReader::Utf8,
            Some(enc) if enc.is_single_byte() => CharacterReader::FixedWidth(1),
            Some(enc)
                if enc == encoding_rs::UTF_16LE
                    || enc == encoding_rs::UTF_16BE =>
            {
                CharacterReader::FixedWidth(2)
            }
            // The replacement encoding covers labels whose encodings are
            // unsafe to decode; treat them as opaque bytes.
            Some(enc) if enc == encoding_rs::REPLACEMENT => {
                CharacterReader::FixedWidth(1)
            }
            Some(enc) => CharacterReader::Decoded(enc),
            // Unknown charsets are assumed to be 8-bit
            None => CharacterReader::FixedWidth(1),
        }
    }
}

/// The position map of a `CharacterStream`.
enum CharMap {
    FixedWidth(usize),
    /// Single-byte characters; the set holds the indices of invalid ones.
    InvalidSet(BTreeSet<usize>),
    /// Byte offset at which each character ends, and whether it was invalid.
    Positions(Vec<(usize, bool)>),
}

pub struct CharacterStream {
    reader: CharacterReader,
    map: CharMap,
    data: Vec<u8>,
    /// Number of bytes of `data` accounted for by the map. Anything beyond
    /// is an incomplete character awaiting more input.
    mapped: usize,
    /// Characters already discarded from the front of `data`.
    discarded_chars: usize,
    /// Next character to read, counted from the start of `data`.
    pointer: usize,
    decoder: Option<Decoder>,
    /// Bytes of `data` already fed to `decoder`.
    fed: usize,
}

impl CharacterStream {
    pub fn new(charset: &str) -> Self {
        CharacterStream::with_reader(CharacterReader::for_charset(charset))
    }

    pub fn with_reader(reader: CharacterReader) -> Self {
        let mut this = CharacterStream {
            reader,
            map: CharMap::FixedWidth(1),
            data: Vec::new(),
            mapped: 0,
            discarded_chars: 0,
            pointer: 0,
            decoder: None,
            fed: 0,
        };
        this.flush_contents();
        this
    }

    pub fn reader(&self) -> CharacterReader {
        self.reader
    }

    /// Change the charset. Any existing content is discarded.
    pub fn set_charset(&mut self, charset: &str) {
        self.reader = CharacterReader::for_charset(charset);
        self.flush_contents();
    }

    pub fn flush_contents(&mut self) {
        self.data.clear();
        self.mapped = 0;
        self.fed = 0;
        self.pointer = 0;
        self.discarded_chars = 0;
        self.map = match self.reader {
            CharacterReader::FixedWidth(n) => CharMap::FixedWidth(n.max(1)),
            CharacterReader::UsAscii => CharMap::InvalidSet(BTreeSet::new()),
            CharacterReader::Utf8 | CharacterReader::Decoded(_) => {
                CharMap::Positions(Vec::new())
            }
        };
        self.decoder = match self.reader {
            CharacterReader::Decoded(enc) => {
                Some(enc.new_decoder_without_bom_handling())
            }
            _ => None,
        };
    }

    pub fn import_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.map_more(false);
    }

    /// Import the entire remaining content of `os`.
    pub fn import_byte_stream(
        &mut self,
        os: &mut dyn OutputByteStream,
    ) -> io::Result<()> {
        while let Some(chunk) = os.read(8192)? {
            self.import_bytes(&chunk);
        }
        self.finish();
        Ok(())
    }

    /// Declare that no more bytes will be imported, so any incomplete
    /// trailing sequence becomes invalid single-byte characters.
    pub fn finish(&mut self) {
        self.map_more(true);
    }

    /// Total number of complete characters imported since the last flush.
    pub fn char_count(&self) -> usize {
        self.discarded_chars + self.local_char_count()
    }

    /// Number of characters not yet read.
    pub fn remaining(&self) -> usize {
        self.local_char_count() - self.pointer
    }

    /// Move the read pointer to the given character index, clamped to the
    /// characters still held.
    pub fn set_pointer(&mut self, char_offset: usize) {
        let local = char_offset.saturating_sub(self.discarded_chars);
        self.pointer = local.min(self.local_char_count());
    }

    /// Whether the character at `char_offset` is invalid in this charset.
    pub fn is_invalid(&self, char_offset: usize) -> bool {
        let local = match char_offset.checked_sub(self.discarded_chars) {
            Some(l) => l,
            None => return false,
        };

        match self.map {
            CharMap::FixedWidth(_) => false,
            CharMap::InvalidSet(ref set) => set.contains(&local),
            CharMap::Positions(ref p) => p.get(local).map_or(false, |p| p.1),
        }
    }

    /// Read the bytes of up to `length` characters.
    ///
    /// Returns `None` once no complete characters remain.
    pub fn read(&mut self, length: usize) -> Option<Vec<u8>> {
        let available = self.remaining();
        if 0 == available || 0 == length {
            return None;
        }

        let n = length.min(available);
        let start = self.byte_offset(self.pointer);
        let end = self.byte_offset(self.pointer + n);
        self.pointer += n;
        Some(self.data[start..end].to_vec())
    }

    /// Drop everything before the read pointer to bound memory use while
    /// streaming.
    pub fn discard_read(&mut self) {
        if 0 == self.pointer {
            return;
        }

        let cut = self.byte_offset(self.pointer);
        let n = self.pointer;
        self.data.drain(..cut);
        self.mapped -= cut;
        self.fed = self.fed.saturating_sub(cut);
        match self.map {
            CharMap::FixedWidth(_) => (),
            CharMap::InvalidSet(ref mut set) => {
                *set = set.iter().filter(|&&i| i >= n).map(|&i| i - n).collect();
            }
            CharMap::Positions(ref mut p) => {
                p.drain(..n);
                for e in p.iter_mut() {
                    e.0 -= cut;
                }
            }
        }
        self.discarded_chars += n;
        self.pointer = 0;
    }

    fn local_char_count(&self) -> usize {
        match self.map {
            CharMap::FixedWidth(w) => (self.mapped + w - 1) / w,
            CharMap::InvalidSet(_) => self.mapped,
            CharMap::Positions(ref p) => p.len(),
        }
    }

    /// Byte offset of the start of local character `ix`.
    fn byte_offset(&self, ix: usize) -> usize {
        match self.map {
            CharMap::FixedWidth(w) => (ix * w).min(self.mapped),
            CharMap::InvalidSet(_) => ix,
            CharMap::Positions(ref p) => {
                if 0 == ix {
                    0
                } else {
                    p[ix - 1].0
                }
            }
        }
    }

    fn map_more(&mut self, finished: bool) {
        let data = &self.data;
        match self.map {
            CharMap::FixedWidth(w) => {
                // A trailing fragment only counts once we know no more bytes
                // are coming; it then reads as one short character.
                self.mapped = if finished {
                    data.len()
                } else {
                    data.len() / w * w
                };
            }

            CharMap::InvalidSet(ref mut set) => {
                for (ix, &b) in data.iter().enumerate().skip(self.mapped) {
                    if b > 0x7F {
                        set.insert(ix);
                    }
                }
                self.mapped = data.len();
            }

            CharMap::Positions(ref mut positions) => {
                let mut offset = self.mapped;
                if let Some(ref mut decoder) = self.decoder {
                    let (fed, boundary) = map_decoded(
                        decoder,
                        data,
                        self.fed.max(offset),
                        offset,
                        positions,
                    );
                    self.fed = fed;
                    offset = boundary;
                } else {
                    offset = map_utf8(data, offset, positions);
                }

                if finished {
                    while offset < data.len() {
                        offset += 1;
                        positions.push((offset, true));
                    }
                }
                self.mapped = offset;
            }
        }
    }
}

fn map_utf8(
    data: &[u8],
    mut offset: usize,
    positions: &mut Vec<(usize, bool)>,
) -> usize {
    while offset < data.len() {
        let len = match data[offset] {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 0,
        };

        if 0 == len {
            offset += 1;
            positions.push((offset, true));
            continue;
        }

        if offset + len > data.len() {
            // Wait for the rest of the sequence, unless what we have is
            // already broken.
            if data[offset + 1..].iter().all(|&b| is_continuation(b)) {
                break;
            }
        }

        let end = (offset + len).min(data.len());
        if data[offset + 1..end].iter().all(|&b| is_continuation(b))
            && end == offset + len
        {
            offset = end;
            positions.push((offset, false));
        } else {
            offset += 1;
            positions.push((offset, true));
        }
    }

    offset
}

fn is_continuation(b: u8) -> bool {
    0x80 == b & 0xC0
}

/// Feed `data[fed..]` to `decoder`, recording a boundary each time a
/// character comes out. `pending_start` is the offset after the last
/// boundary. Returns the new `(fed, pending_start)`.
fn map_decoded(
    decoder: &mut Decoder,
    data: &[u8],
    mut offset: usize,
    mut pending_start: usize,
    positions: &mut Vec<(usize, bool)>,
) -> (usize, usize) {
    let mut scratch = String::with_capacity(16);
    while offset < data.len() {
        scratch.clear();
        let (result, _) = decoder.decode_to_string_without_replacement(
            &data[offset..offset + 1],
            &mut scratch,
            false,
        );
        offset += 1;

        match result {
            DecoderResult::Malformed(..) => {
                // Everything pending since the last boundary is one invalid
                // character.
                positions.push((offset, true));
                pending_start = offset;
            }
            _ if !scratch.is_empty() => {
                positions.push((offset, false));
                pending_start = offset;
            }
            _ => (),
        }
    }

    (offset, pending_start)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::ArrayByteStream;

    fn read_all(cs: &mut CharacterStream, n: usize) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(c) = cs.read(n) {
            chunks.push(c);
        }
        chunks
    }

    #[test]
    fn readers_for_charsets() {
        assert_eq!(CharacterReader::Utf8, CharacterReader::for_charset("UTF-8"));
        assert_eq!(
            CharacterReader::UsAscii,
            CharacterReader::for_charset("us-ascii")
        );
        assert_eq!(
            CharacterReader::FixedWidth(1),
            CharacterReader::for_charset("iso-8859-1")
        );
        assert_eq!(
            CharacterReader::FixedWidth(1),
            CharacterReader::for_charset("windows-1252")
        );
        assert_eq!(
            CharacterReader::FixedWidth(2),
            CharacterReader::for_charset("utf-16le")
        );
        assert_eq!(
            CharacterReader::FixedWidth(4),
            CharacterReader::for_charset("ucs-4")
        );
        assert_eq!(
            CharacterReader::Decoded(encoding_rs::SHIFT_JIS),
            CharacterReader::for_charset("shift_jis")
        );
        assert_eq!(
            CharacterReader::FixedWidth(1),
            CharacterReader::for_charset("x-no-such-charset")
        );
    }

    #[test]
    fn utf8_never_splits_characters() {
        let mut cs = CharacterStream::new("utf-8");
        cs.import_bytes("aé€😀b".as_bytes());
        cs.finish();
        assert_eq!(5, cs.char_count());
        assert_eq!(
            vec![
                "aé".as_bytes().to_vec(),
                "€😀".as_bytes().to_vec(),
                b"b".to_vec()
            ],
            read_all(&mut cs, 2)
        );
    }

    #[test]
    fn utf8_waits_for_split_sequences() {
        let mut cs = CharacterStream::new("utf-8");
        let euro = "€".as_bytes();
        cs.import_bytes(&euro[..1]);
        assert_eq!(0, cs.char_count());
        assert_eq!(None, cs.read(1));
        cs.import_bytes(&euro[1..]);
        assert_eq!(1, cs.char_count());
        assert_eq!(Some(euro.to_vec()), cs.read(1));
    }

    #[test]
    fn utf8_invalid_bytes_are_single_characters() {
        let mut cs = CharacterStream::new("utf-8");
        cs.import_bytes(b"a\xFFb\xC3");
        cs.finish();
        assert_eq!(4, cs.char_count());
        assert!(!cs.is_invalid(0));
        assert!(cs.is_invalid(1));
        assert!(!cs.is_invalid(2));
        assert!(cs.is_invalid(3));
        assert_eq!(
            vec![b"a".to_vec(), b"\xFF".to_vec(), b"b".to_vec(), b"\xC3".to_vec()],
            read_all(&mut cs, 1)
        );

        let mut cs = CharacterStream::new("utf-8");
        cs.import_bytes(b"\xE2\x82x");
        cs.finish();
        assert_eq!(
            vec![b"\xE2".to_vec(), b"\x82".to_vec(), b"x".to_vec()],
            read_all(&mut cs, 1)
        );
    }

    #[test]
    fn us_ascii_marks_high_bytes_invalid() {
        let mut cs = CharacterStream::new("us-ascii");
        cs.import_bytes(b"ab\xE9c");
        assert_eq!(4, cs.char_count());
        assert!(cs.is_invalid(2));
        assert!(!cs.is_invalid(3));
        assert_eq!(vec![b"ab\xE9".to_vec(), b"c".to_vec()], read_all(&mut cs, 3));
    }

    #[test]
    fn fixed_width_reads_whole_units() {
        let mut cs = CharacterStream::new("utf-16le");
        cs.import_bytes(b"a\0b\0c");
        assert_eq!(2, cs.char_count());
        cs.finish();
        assert_eq!(3, cs.char_count());
        assert_eq!(
            vec![b"a\0b\0".to_vec(), b"c".to_vec()],
            read_all(&mut cs, 2)
        );
    }

    #[test]
    fn decoded_multibyte_charset() {
        let (sjis, _, _) = encoding_rs::SHIFT_JIS.encode("aゑb");
        let mut cs = CharacterStream::new("shift_jis");
        cs.import_bytes(&sjis);
        cs.finish();
        assert_eq!(3, cs.char_count());
        assert_eq!(
            vec![b"a".to_vec(), sjis[1..3].to_vec(), b"b".to_vec()],
            read_all(&mut cs, 1)
        );
    }

    #[test]
    fn pointer_and_discard() {
        let mut cs = CharacterStream::new("utf-8");
        cs.import_bytes("héllo".as_bytes());
        cs.read(2);
        cs.discard_read();
        assert_eq!(5, cs.char_count());
        assert_eq!(3, cs.remaining());
        assert_eq!(Some(b"llo".to_vec()), cs.read(10));
        cs.set_pointer(3);
        assert_eq!(Some(b"lo".to_vec()), cs.read(10));
        cs.set_pointer(0);
        assert_eq!(Some(b"llo".to_vec()), cs.read(10));
    }

    #[test]
    fn import_from_byte_stream() {
        let mut os = ArrayByteStream::new("ünïcödé".as_bytes().to_vec());
        let mut cs = CharacterStream::new("utf-8");
        cs.import_byte_stream(&mut os).unwrap();
        assert_eq!(7, cs.char_count());
        assert_eq!(Some("ün".as_bytes().to_vec()), cs.read(2));
    }
}
