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

//! The AUTH extension and its mechanisms.

use std::cmp::Ordering;
use std::fmt::Write as _;

use log::{info, warn};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use secstr::SecStr;

use super::esmtp::{Authenticatable, EsmtpHandler};
use super::smtp::SmtpAgent;
use crate::support::error::Error;

/// One SASL mechanism.
pub trait Authenticator {
    /// The mechanism name, as advertised after `AUTH` in EHLO.
    fn keyword(&self) -> &'static str;

    /// Run the exchange. Any error means the server did not accept the
    /// credentials.
    fn authenticate(
        &self,
        agent: &mut SmtpAgent,
        username: &str,
        password: &[u8],
    ) -> Result<(), Error>;
}

pub struct CramMd5Authenticator;

impl Authenticator for CramMd5Authenticator {
    fn keyword(&self) -> &'static str {
        "CRAM-MD5"
    }

    fn authenticate(
        &self,
        agent: &mut SmtpAgent,
        username: &str,
        password: &[u8],
    ) -> Result<(), Error> {
        let challenge = agent.execute_command("AUTH CRAM-MD5\r\n", &[334])?;
        let challenge = base64::decode(challenge.get(4..).unwrap_or("").trim())
            .map_err(|_| Error::transport("Invalid CRAM-MD5 challenge"))?;
        let digest = hmac_md5(password, &challenge)?;
        let reply = base64::encode(format!("{} {}", username, digest));
        agent.execute_command(&format!("{}\r\n", reply), &[235])?;
        Ok(())
    }
}

/// Hex-encoded HMAC-MD5 of `data` under `key`, as in RFC 2104.
fn hmac_md5(key: &[u8], data: &[u8]) -> Result<String, Error> {
    let key = PKey::hmac(key)?;
    let mut signer = Signer::new(MessageDigest::md5(), &key)?;
    signer.update(data)?;
    let mut hex = String::with_capacity(32);
    for b in signer.sign_to_vec()? {
        let _ = write!(hex, "{:02x}", b);
    }
    Ok(hex)
}

pub struct LoginAuthenticator;

impl Authenticator for LoginAuthenticator {
    fn keyword(&self) -> &'static str {
        "LOGIN"
    }

    fn authenticate(
        &self,
        agent: &mut SmtpAgent,
        username: &str,
        password: &[u8],
    ) -> Result<(), Error> {
        agent.execute_command("AUTH LOGIN\r\n", &[334])?;
        agent.execute_command(
            &format!("{}\r\n", base64::encode(username)),
            &[334],
        )?;
        agent.execute_command(
            &format!("{}\r\n", base64::encode(password)),
            &[235],
        )?;
        Ok(())
    }
}

pub struct PlainAuthenticator;

impl Authenticator for PlainAuthenticator {
    fn keyword(&self) -> &'static str {
        "PLAIN"
    }

    fn authenticate(
        &self,
        agent: &mut SmtpAgent,
        username: &str,
        password: &[u8],
    ) -> Result<(), Error> {
        // authzid NUL authcid NUL password
        let mut blob = Vec::with_capacity(2 * username.len() + password.len() + 2);
        blob.extend_from_slice(username.as_bytes());
        blob.push(0);
        blob.extend_from_slice(username.as_bytes());
        blob.push(0);
        blob.extend_from_slice(password);

        agent.execute_command(
            &format!("AUTH PLAIN {}\r\n", base64::encode(&blob)),
            &[235],
        )?;
        Ok(())
    }
}

/// Logs in with the first authenticator the server supports that accepts
/// the credentials.
pub struct AuthHandler {
    authenticators: Vec<Box<dyn Authenticator>>,
    username: String,
    password: SecStr,
    auth_mode: Option<String>,
    /// Mechanisms advertised by the server.
    server_mechanisms: Vec<String>,
}

impl Default for AuthHandler {
    fn default() -> Self {
        AuthHandler::new(vec![
            Box::new(CramMd5Authenticator),
            Box::new(LoginAuthenticator),
            Box::new(PlainAuthenticator),
        ])
    }
}

impl AuthHandler {
    /// A handler trying `authenticators` in the given order.
    pub fn new(authenticators: Vec<Box<dyn Authenticator>>) -> Self {
        AuthHandler {
            authenticators,
            username: String::new(),
            password: SecStr::new(Vec::new()),
            auth_mode: None,
            server_mechanisms: Vec::new(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &[u8]) -> Self {
        self.set_username(username);
        self.set_password(password);
        self
    }

    pub fn auth_mode(&self) -> Option<&str> {
        self.auth_mode.as_deref()
    }

    /// The authenticators to try: the one named by the auth mode if set,
    /// else all of them.
    fn candidates(&self) -> Result<Vec<&dyn Authenticator>, Error> {
        let mode = match self.auth_mode {
            None => {
                return Ok(self.authenticators.iter().map(|a| &**a).collect())
            }
            Some(ref mode) => mode,
        };

        self.authenticators
            .iter()
            .find(|a| a.keyword().eq_ignore_ascii_case(mode))
            .map(|a| vec![&**a])
            .ok_or_else(|| {
                Error::transport(format!("Auth mode '{}' is invalid", mode))
            })
    }
}

impl Authenticatable for AuthHandler {
    fn set_username(&mut self, username: &str) {
        self.username = username.to_owned();
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn set_password(&mut self, password: &[u8]) {
        self.password = SecStr::new(password.to_vec());
    }

    fn set_auth_mode(&mut self, mode: Option<&str>) {
        self.auth_mode = mode.map(str::to_owned);
    }
}

impl EsmtpHandler for AuthHandler {
    fn keyword(&self) -> &'static str {
        "AUTH"
    }

    fn set_keyword_params(&mut self, params: &[String]) {
        self.server_mechanisms = params.to_vec();
    }

    fn after_eho(&mut self, agent: &mut SmtpAgent) -> Result<(), Error> {
        if self.username.is_empty() {
            return Ok(());
        }

        let candidates = self.candidates()?;
        let count = candidates.len();
        for authenticator in candidates {
            if !self
                .server_mechanisms
                .iter()
                .any(|m| m.eq_ignore_ascii_case(authenticator.keyword()))
            {
                continue;
            }

            match authenticator.authenticate(
                agent,
                &self.username,
                self.password.unsecure(),
            ) {
                Ok(()) => {
                    info!(
                        "Authenticated as {} using {}",
                        self.username,
                        authenticator.keyword()
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "{} authentication failed: {}",
                        authenticator.keyword(),
                        e
                    );
                    agent.execute_command("RSET\r\n", &[250])?;
                }
            }
        }

        Err(Error::transport(format!(
            "Failed to authenticate on SMTP server with username \"{}\" \
             using {} possible authenticators",
            self.username, count
        )))
    }

    fn priority_over(&self, keyword: &str) -> Ordering {
        if "STARTTLS" == keyword {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    fn as_authenticatable(&mut self) -> Option<&mut dyn Authenticatable> {
        Some(self)
    }
}
