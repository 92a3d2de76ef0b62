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

//! The entry point for sending mail.

use log::warn;

use crate::events::SharedListener;
use crate::mime::{Message, MimeFactory};
use crate::support::config::MailerConfig;
use crate::support::error::Error;
use crate::transport::{self, Transport};

/// Sends messages through a transport, starting it on first use.
pub struct Mailer {
    transport: Box<dyn Transport>,
    factory: MimeFactory,
}

impl Mailer {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Mailer {
            transport,
            factory: MimeFactory::default(),
        }
    }

    pub fn with_factory(
        transport: Box<dyn Transport>,
        factory: MimeFactory,
    ) -> Self {
        Mailer { transport, factory }
    }

    /// A mailer with the transport and message settings in `config`.
    pub fn from_config(config: &MailerConfig) -> Result<Self, Error> {
        Ok(Mailer {
            transport: transport::from_config(config)?,
            factory: MimeFactory::from_config(config)?,
        })
    }

    pub fn factory(&self) -> &MimeFactory {
        &self.factory
    }

    /// A new message built with this mailer's cache and charset.
    pub fn create_message(&self, subject: &str) -> Message {
        self.factory.message(subject)
    }

    pub fn transport(&self) -> &dyn Transport {
        &*self.transport
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut *self.transport
    }

    /// Send `message`, returning how many recipients were accepted.
    ///
    /// If the message cannot be rendered validly, nothing is sent and every
    /// To address is reported as failed.
    pub fn send(
        &mut self,
        message: &mut Message,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error> {
        if !self.transport.is_started() {
            self.transport.start()?;
        }

        match self.transport.send(message, failed_recipients) {
            Err(Error::RfcCompliance(e)) => {
                warn!("Message {} not sent: {}", message.id(), e);
                failed_recipients
                    .extend(message.to().into_iter().map(|m| m.address));
                Ok(0)
            }
            result => result,
        }
    }

    /// Send a separate copy of `message` to each To recipient, so that none
    /// sees the others. Cc and Bcc are cleared for the duration.
    pub fn batch_send(
        &mut self,
        message: &mut Message,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error> {
        let to = message.to();
        let cc = message.cc();
        let bcc = message.bcc();
        message.set_cc(Vec::new())?;
        message.set_bcc(Vec::new())?;

        let mut result = Ok(0);
        for mailbox in &to {
            let sent = message
                .set_to(vec![mailbox.clone()])
                .and_then(|()| self.send(message, failed_recipients));
            result = match (result, sent) {
                (Ok(total), Ok(sent)) => Ok(total + sent),
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            if result.is_err() {
                break;
            }
        }

        message.set_to(to)?;
        message.set_cc(cc)?;
        message.set_bcc(bcc)?;
        result
    }

    pub fn register_plugin(&mut self, plugin: SharedListener) {
        self.transport.register_plugin(plugin);
    }
}
