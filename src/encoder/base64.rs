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

use super::{effective_max, ContentEncoder, LineFolder};
use crate::stream::{InputByteStream, OutputByteStream};

/// The base64 Content-Transfer-Encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Base64ContentEncoder;

impl ContentEncoder for Base64ContentEncoder {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Vec<u8> {
        let encoded = base64::encode(input);
        let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 38);
        let mut folder =
            LineFolder::new(first_line_offset, effective_max(max_line_length));
        let _ = folder.push(encoded.as_bytes(), &mut |b| {
            out.extend_from_slice(b);
            Ok(())
        });
        out
    }

    fn encode_byte_stream(
        &self,
        os: &mut dyn OutputByteStream,
        is: &mut dyn InputByteStream,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> io::Result<()> {
        let mut folder =
            LineFolder::new(first_line_offset, effective_max(max_line_length));
        let mut pending = Vec::<u8>::new();

        while let Some(chunk) = os.read(8190)? {
            pending.extend_from_slice(&chunk);
            // Only whole 3-byte groups can be encoded without padding
            let whole = pending.len() / 3 * 3;
            if 0 == whole {
                continue;
            }

            let encoded = base64::encode(&pending[..whole]);
            folder.push(encoded.as_bytes(), &mut |b| is.write(b).map(|_| ()))?;
            pending.drain(..whole);
        }

        if !pending.is_empty() {
            let encoded = base64::encode(&pending);
            folder.push(encoded.as_bytes(), &mut |b| is.write(b).map(|_| ()))?;
        }

        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ContentEncoder> {
        Box::new(*self)
    }
}
