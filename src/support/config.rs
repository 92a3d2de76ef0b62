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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The configuration for a mailer.
///
/// This is stored in a file named `swallow.toml`, by default in the current
/// directory. Every section is optional.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MailerConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub message: MessageConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Speak SMTP to a remote host.
    Smtp,
    /// Speak SMTP to a local MTA over its standard IO.
    Sendmail,
    /// Discard everything.
    Null,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Smtp
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encryption {
    None,
    /// TLS from the first byte, as on port 465.
    Ssl,
    /// Plain connection upgraded with STARTTLS.
    Tls,
}

impl Default for Encryption {
    fn default() -> Self {
        Encryption::None
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    /// Timeout for establishing the connection. Once connected, reads block
    /// indefinitely.
    pub timeout_secs: u64,
    /// The name to give in HELO/EHLO.
    ///
    /// If unset, the system host name is used.
    pub local_domain: String,
    /// Command line of the local MTA for the `sendmail` transport. It must
    /// speak SMTP on its standard IO.
    pub sendmail_command: String,
    /// If false, invalid server certificates are accepted.
    pub verify_certificates: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            kind: TransportKind::Smtp,
            host: "localhost".to_owned(),
            port: 25,
            encryption: Encryption::None,
            timeout_secs: 30,
            local_domain: String::new(),
            sendmail_command: "/usr/sbin/sendmail -bs".to_owned(),
            verify_certificates: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// If empty, no authentication is attempted.
    pub username: String,
    pub password: String,
    /// Restrict authentication to this mechanism (e.g. `CRAM-MD5`).
    pub mode: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Memory,
    Disk,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    /// Root of the disk cache. A temporary directory is used if unset.
    pub root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            kind: CacheKind::Memory,
            root: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageConfig {
    pub charset: String,
    pub max_line_length: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        MessageConfig {
            charset: "utf-8".to_owned(),
            max_line_length: 78,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config: MailerConfig = toml::from_str("").unwrap();
        assert_eq!(TransportKind::Smtp, config.transport.kind);
        assert_eq!(25, config.transport.port);
        assert_eq!(CacheKind::Memory, config.cache.kind);
        assert_eq!("utf-8", config.message.charset);
        assert_eq!(78, config.message.max_line_length);
        assert!(config.auth.username.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config: MailerConfig = toml::from_str(
            r#"
[transport]
host = "mail.example.com"
port = 587
encryption = "tls"
local_domain = "client.example.com"

[auth]
username = "alice"
password = "hunter2"
mode = "CRAM-MD5"

[cache]
kind = "disk"
root = "/var/cache/swallow"

[message]
charset = "iso-8859-1"
"#,
        )
        .unwrap();

        assert_eq!("mail.example.com", config.transport.host);
        assert_eq!(587, config.transport.port);
        assert_eq!(Encryption::Tls, config.transport.encryption);
        assert_eq!(30, config.transport.timeout_secs);
        assert_eq!(Some("CRAM-MD5".to_owned()), config.auth.mode);
        assert_eq!(CacheKind::Disk, config.cache.kind);
        assert_eq!(
            Some(PathBuf::from("/var/cache/swallow")),
            config.cache.root
        );
        assert_eq!("iso-8859-1", config.message.charset);
        assert_eq!(78, config.message.max_line_length);
    }
}
