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

//! Percent-encoding of header parameter values, per RFC 2231.

use super::CharSource;

const DEFAULT_MAX_LINE: usize = 75;

/// Encodes parameter values such as attachment file names.
///
/// The output is split into CRLF-separated lines, each of which becomes one
/// `name*N*=` continuation of the parameter.
#[derive(Clone, Debug)]
pub struct Rfc2231Encoder {
    charset: String,
}

impl Rfc2231Encoder {
    pub fn new(charset: &str) -> Self {
        Rfc2231Encoder {
            charset: charset.to_owned(),
        }
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn set_charset(&mut self, charset: &str) {
        self.charset = charset.to_owned();
    }

    pub fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> String {
        let max = if 0 == max_line_length {
            DEFAULT_MAX_LINE
        } else {
            max_line_length
        };

        let mut lines = vec![String::new()];
        let mut this_line_max = max.saturating_sub(first_line_offset);
        let mut source = CharSource::from_bytes(&self.charset, input);
        let mut encoded = String::new();

        // Reading from memory cannot fail
        while let Ok(Some(chars)) = source.next(4) {
            encoded.clear();
            percent_encode(&chars, &mut encoded);

            let needs_break = {
                let current = lines.last().map_or(0, String::len);
                0 != current && current + encoded.len() > this_line_max
            };
            if needs_break {
                lines.push(String::new());
                this_line_max = max;
            }

            if let Some(line) = lines.last_mut() {
                line.push_str(&encoded);
            }
        }

        lines.join("\r\n")
    }
}

fn percent_encode(bytes: &[u8], dst: &mut String) {
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.'
            | b'~' => dst.push(b as char),
            _ => {
                dst.push('%');
                dst.push_str(&format!("{:02X}", b));
            }
        }
    }
}
