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

//! Delivery of messages to a mail server.

pub mod auth;
pub mod buffer;
pub mod esmtp;
pub mod null;
pub mod sendmail;
pub mod smtp;

use crate::events::SharedListener;
use crate::mime::Message;
use crate::support::config::{MailerConfig, TransportKind};
use crate::support::error::Error;

pub use self::null::NullTransport;
pub use self::sendmail::SendmailTransport;
pub use self::smtp::SmtpTransport;

/// Something which can deliver messages.
pub trait Transport {
    /// A short name identifying the kind of transport in events and logs.
    fn name(&self) -> &'static str;

    fn is_started(&self) -> bool;

    /// Connect to the server. Does nothing if already started.
    fn start(&mut self) -> Result<(), Error>;

    /// Disconnect from the server. Does nothing if not started.
    fn stop(&mut self) -> Result<(), Error>;

    /// Send `message` to all its To, Cc and Bcc recipients.
    ///
    /// Returns the number of recipients the server accepted. The address of
    /// every recipient the server refused is appended to
    /// `failed_recipients`.
    fn send(
        &mut self,
        message: &mut Message,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error>;

    /// Bind `plugin` to receive this transport's events.
    fn register_plugin(&mut self, plugin: SharedListener);
}

/// Build the transport described by `config`.
pub fn from_config(config: &MailerConfig) -> Result<Box<dyn Transport>, Error> {
    Ok(match config.transport.kind {
        TransportKind::Smtp => Box::new(SmtpTransport::from_config(config)),
        TransportKind::Sendmail => Box::new(SendmailTransport::new(
            &config.transport.sendmail_command,
        )?),
        TransportKind::Null => Box::new(NullTransport::new()),
    })
}

/// The addresses of `mailboxes`, without duplicates, in order.
fn unique_addresses<'a>(
    mailboxes: impl IntoIterator<Item = &'a crate::mime::Mailbox>,
) -> Vec<String> {
    let mut addresses = Vec::<String>::new();
    for mailbox in mailboxes {
        if !addresses.contains(&mailbox.address) {
            addresses.push(mailbox.address.clone());
        }
    }
    addresses
}
