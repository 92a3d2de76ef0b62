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

//! Generation of Content-ID/Message-ID values and multipart boundaries.

use std::ffi::CStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use super::grammar;

const FALLBACK_ID_RIGHT: &str = "swallow.generated";

/// Produces unique identifiers of the form `timestamp.random@host`.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    id_right: String,
}

impl Default for IdGenerator {
    fn default() -> Self {
        IdGenerator::new()
    }
}

impl IdGenerator {
    /// Use the local host name as the right-hand side of generated IDs,
    /// falling back to a fixed name if it is unavailable or unsuitable.
    pub fn new() -> Self {
        let mut buf = [0u8; 256];
        let host = nix::unistd::gethostname(&mut buf)
            .ok()
            .and_then(|h: &CStr| h.to_str().ok())
            .filter(|h| grammar::is_dot_atom_text(h))
            .unwrap_or(FALLBACK_ID_RIGHT)
            .to_owned();
        IdGenerator { id_right: host }
    }

    pub fn with_id_right(id_right: &str) -> Self {
        IdGenerator {
            id_right: id_right.to_owned(),
        }
    }

    pub fn id_right(&self) -> &str {
        &self.id_right
    }

    pub fn generate_id(&self) -> String {
        format!("{}.{}@{}", timestamp(), random_hex(16), self.id_right)
    }
}

/// A fresh multipart boundary. Always satisfies `grammar::is_boundary`.
pub fn generate_boundary() -> String {
    format!("_=_swallow_{}_{}_=_", timestamp(), random_hex(32))
}

/// `len` random lowercase hex digits.
pub fn random_hex(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0, 16)] as char)
        .collect()
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
