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

use std::io;

use super::ContentEncoder;
use crate::stream::filter::{ByteArrayReplacementFilter, StreamFilter};
use crate::stream::{InputByteStream, OutputByteStream};

/// The identity encodings: 7bit, 8bit and binary.
///
/// 7bit and 8bit content has its line endings canonicalised, and long lines
/// are wrapped after whitespace where possible. Binary content is passed
/// through untouched.
#[derive(Clone, Copy, Debug)]
pub struct PlainContentEncoder {
    name: &'static str,
    text: bool,
}

impl PlainContentEncoder {
    pub fn seven_bit() -> Self {
        PlainContentEncoder {
            name: "7bit",
            text: true,
        }
    }

    pub fn eight_bit() -> Self {
        PlainContentEncoder {
            name: "8bit",
            text: true,
        }
    }

    pub fn binary() -> Self {
        PlainContentEncoder {
            name: "binary",
            text: false,
        }
    }
}

impl ContentEncoder for PlainContentEncoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Vec<u8> {
        if !self.text {
            return input.to_vec();
        }

        let canonical =
            ByteArrayReplacementFilter::canonical_line_endings().filter(input);
        let mut out = Vec::with_capacity(canonical.len());
        let mut wrapper = Wrapper::new(first_line_offset, max_line_length);
        let mut sink = |b: &[u8]| -> io::Result<()> {
            out.extend_from_slice(b);
            Ok(())
        };
        let _ = wrapper
            .push(&canonical, &mut sink)
            .and_then(|_| wrapper.finish(&mut sink));
        out
    }

    fn encode_byte_stream(
        &self,
        os: &mut dyn OutputByteStream,
        is: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> io::Result<()> {
        if !self.text {
            while let Some(chunk) = os.read(8192)? {
                is.write(&chunk)?;
            }
            return Ok(());
        }

        let filter = ByteArrayReplacementFilter::canonical_line_endings();
        let mut wrapper = Wrapper::new(first_line_offset, max_line_length);
        let mut sink = |b: &[u8]| is.write(b).map(|_| ());
        let mut pending = Vec::<u8>::new();

        while let Some(chunk) = os.read(8192)? {
            pending.extend_from_slice(&chunk);
            // A trailing CR might be the first half of a CRLF
            let held = if filter.should_buffer(&pending) {
                pending.pop()
            } else {
                None
            };
            wrapper.push(&filter.filter(&pending), &mut sink)?;
            pending.clear();
            pending.extend(held);
        }

        wrapper.push(&filter.filter(&pending), &mut sink)?;
        wrapper.finish(&mut sink)
    }

    fn clone_box(&self) -> Box<dyn ContentEncoder> {
        Box::new(*self)
    }
}

/// Wraps canonical text so lines stay within a maximum length, breaking only
/// after whitespace. A run without whitespace longer than the maximum is
/// left on a line of its own.
struct Wrapper {
    max: usize,
    line_len: usize,
    /// The current run of text up to and including a whitespace byte.
    word: Vec<u8>,
    cr: bool,
}

impl Wrapper {
    fn new(first_line_offset: usize, max: usize) -> Self {
        Wrapper {
            max,
            line_len: if 0 == max { 0 } else { first_line_offset },
            word: Vec::new(),
            cr: false,
        }
    }

    fn push(
        &mut self,
        data: &[u8],
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        if 0 == self.max {
            return out(data);
        }

        for &b in data {
            if self.cr {
                self.cr = false;
                if b'\n' == b {
                    self.place_word(out)?;
                    out(b"\r\n")?;
                    self.line_len = 0;
                    continue;
                }
                self.word.push(b'\r');
                self.place_word(out)?;
            }

            match b {
                b'\r' => self.cr = true,
                b' ' | b'\t' | b'\n' | 0x0B | 0x0C => {
                    self.word.push(b);
                    self.place_word(out)?;
                }
                _ => self.word.push(b),
            }
        }

        Ok(())
    }

    fn finish(
        &mut self,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.cr {
            self.cr = false;
            self.word.push(b'\r');
        }
        self.place_word(out)
    }

    fn place_word(
        &mut self,
        out: &mut dyn FnMut(&[u8]) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.word.is_empty() {
            return Ok(());
        }

        if 0 != self.line_len && self.line_len + self.word.len() > self.max {
            out(b"\r\n")?;
            self.line_len = 0;
        }

        out(&self.word)?;
        self.line_len += self.word.len();
        self.word.clear();
        Ok(())
    }
}
