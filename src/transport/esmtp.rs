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

//! ESMTP extensions.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::smtp::SmtpAgent;
use crate::support::error::Error;

/// The extensions a server advertised in its EHLO response, keyed by
/// upper-case keyword, with their parameters.
pub type Capabilities = BTreeMap<String, Vec<String>>;

/// Extract the capabilities from a complete EHLO response.
///
/// The first line is the server's greeting and is skipped.
pub fn parse_capabilities(ehlo_response: &str) -> Capabilities {
    lazy_static! {
        static ref CAPABILITY: Regex =
            Regex::new(r"(?i)^[0-9]{3}[ -]([A-Z0-9-]+)((?:[ =].*)?)$")
                .unwrap();
    }

    let mut capabilities = Capabilities::new();
    for line in ehlo_response.split("\r\n").skip(1) {
        let m = match CAPABILITY.captures(line) {
            Some(m) => m,
            None => continue,
        };

        let keyword = m[1].to_ascii_uppercase();
        let value = m[2].trim_matches(|c| ' ' == c || '=' == c);
        let params = if value.is_empty() {
            Vec::new()
        } else {
            value.split(' ').map(str::to_owned).collect()
        };
        capabilities.insert(keyword, params);
    }
    capabilities
}

/// Credentials for an extension which logs in to the server.
pub trait Authenticatable {
    fn set_username(&mut self, username: &str);
    fn username(&self) -> &str;
    fn set_password(&mut self, password: &[u8]);
    /// Restrict authentication to the mechanism named `mode`, or allow any
    /// with `None`.
    fn set_auth_mode(&mut self, mode: Option<&str>);
}

/// Support for one ESMTP extension.
///
/// A handler is only consulted when the server advertised its keyword.
#[allow(unused_variables)]
pub trait EsmtpHandler {
    /// The EHLO keyword this handler supports, in upper case.
    fn keyword(&self) -> &'static str;

    /// Receive the parameters the server gave with the keyword.
    fn set_keyword_params(&mut self, params: &[String]) {}

    /// Run straight after a successful EHLO.
    fn after_eho(&mut self, agent: &mut SmtpAgent) -> Result<(), Error> {
        Ok(())
    }

    /// Extra parameters for `MAIL FROM`.
    fn mail_params(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra parameters for `RCPT TO`.
    fn rcpt_params(&self) -> Vec<String> {
        Vec::new()
    }

    /// Look at `command` before it is sent.
    ///
    /// Returning `Some(response)` means the handler dealt with the command
    /// itself; it is not sent, and no other handler sees it.
    fn on_command(
        &mut self,
        agent: &mut SmtpAgent,
        command: &str,
        codes: &[u16],
    ) -> Result<Option<String>, Error> {
        Ok(None)
    }

    /// How this handler must be ordered relative to the handler for
    /// `keyword`. `Less` means this one runs first.
    fn priority_over(&self, keyword: &str) -> Ordering {
        Ordering::Equal
    }

    /// Forget per-transaction state after `RSET`.
    fn reset_state(&mut self) {}

    fn as_authenticatable(&mut self) -> Option<&mut dyn Authenticatable> {
        None
    }
}

/// Stable-sort `handlers` into the order they must run in.
pub fn sort_handlers(handlers: &mut [Box<dyn EsmtpHandler>]) {
    handlers.sort_by(|a, b| a.priority_over(b.keyword()));
}
