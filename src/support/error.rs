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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The connection failed or the server did not say what we expected.
    ///
    /// `code` is the SMTP response code, if the failure came from one.
    #[error("{message}")]
    Transport { message: String, code: Option<u16> },
    /// A value assigned to a message would produce malformed output.
    #[error("RFC compliance failure: {0}")]
    RfcCompliance(String),
    #[error("Cache failure: {0}")]
    Cache(String),
    #[error("Unsafe cache key")]
    UnsafeName,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
}

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            code: None,
        }
    }

    pub fn unexpected_code(
        expected: &[u16],
        code: Option<u16>,
        response: &str,
    ) -> Self {
        let expected = expected
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("/");
        Error::Transport {
            message: format!(
                "Expected response code {} but got code \"{}\", \
                 with message \"{}\"",
                expected,
                code.map(|c| c.to_string()).unwrap_or_default(),
                response.trim_end(),
            ),
            code,
        }
    }

    /// Rewrap low-level failures so that everything leaving the transport
    /// layer is a `Transport` error.
    pub fn into_transport(self) -> Self {
        match self {
            e @ Error::Transport { .. } => e,
            e => Error::transport(e.to_string()),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match *self {
            Error::Transport { code, .. } => code,
            _ => None,
        }
    }
}
