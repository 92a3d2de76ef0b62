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

//! Delivery through a local MTA program.

use log::{debug, info};

use super::buffer::{BufferParams, IoBuffer};
use super::smtp::SmtpTransport;
use super::Transport;
use crate::events::{SendEvent, SendResult, SharedListener};
use crate::mime::Message;
use crate::stream::InputByteStream;
use crate::support::error::Error;

/// Hands messages to a sendmail-compatible program.
///
/// If the command includes `-bs`, the program is expected to speak SMTP on
/// its standard IO and is driven like any other SMTP server. Otherwise (for
/// example with `-t`) one process is run per message, which is piped in with
/// UNIX line endings.
pub struct SendmailTransport {
    command: String,
    smtp: SmtpTransport,
}

impl SendmailTransport {
    pub fn new(command: &str) -> Result<Self, Error> {
        if command.trim().is_empty() {
            return Err(Error::transport("Empty sendmail command"));
        }

        let mut smtp = SmtpTransport::with_params(
            "sendmail",
            BufferParams::Process {
                command: command.to_owned(),
            },
        );
        smtp.set_extended(false);

        Ok(SendmailTransport {
            command: command.to_owned(),
            smtp,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.command.split_whitespace().skip(1).any(|w| w == flag)
    }

    /// Whether the program is spoken to over SMTP.
    pub fn is_smtp_mode(&self) -> bool {
        self.has_flag("-bs")
    }

    fn pipe(&mut self, message: &mut Message) -> Result<usize, Error> {
        let mut command = self.command.clone();
        if !self.has_flag("-f") {
            if let Some(reverse_path) = message.reverse_path() {
                command.push_str(" -f ");
                command.push_str(&reverse_path);
            }
        }

        let mut buffer = IoBuffer::new();
        buffer.initialize(&BufferParams::Process { command })?;
        if self.has_flag("-i") || self.has_flag("-oi") {
            buffer.set_write_translations(&[(&b"\r\n"[..], &b"\n"[..])])?;
        } else {
            buffer.set_write_translations(&[
                (&b"\r\n"[..], &b"\n"[..]),
                (&b"\n."[..], &b"\n.."[..]),
            ])?;
        }

        message.to_byte_stream(&mut buffer)?;
        buffer.set_write_translations(&[])?;
        buffer.flush_buffers()?;
        buffer.terminate();

        Ok(message.to().len() + message.cc().len() + message.bcc().len())
    }
}

impl Transport for SendmailTransport {
    fn name(&self) -> &'static str {
        "sendmail"
    }

    fn is_started(&self) -> bool {
        !self.is_smtp_mode() || self.smtp.is_started()
    }

    fn start(&mut self) -> Result<(), Error> {
        if self.is_smtp_mode() {
            self.smtp.start()
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<(), Error> {
        if self.is_smtp_mode() {
            self.smtp.stop()
        } else {
            Ok(())
        }
    }

    fn send(
        &mut self,
        message: &mut Message,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error> {
        if self.is_smtp_mode() {
            return self.smtp.send(message, failed_recipients);
        }

        let mut evt = SendEvent::new(self.name(), message);
        if self
            .smtp
            .dispatcher()
            .dispatch(&mut evt, |l, e| l.before_send_performed(e))
        {
            return Ok(0);
        }

        let count = match self.pipe(message) {
            Ok(count) => count,
            Err(e) => {
                self.smtp.dispatcher().raise(e.into_transport())?;
                0
            }
        };

        let mut evt = SendEvent::new(self.name(), message);
        evt.result = SendResult::Success;
        self.smtp
            .dispatcher()
            .dispatch(&mut evt, |l, e| l.send_performed(e));

        if let Err(e) = message.generate_id() {
            debug!("Failed to regenerate Message-ID: {}", e);
        }
        info!("Piped message to {}", self.command);
        Ok(count)
    }

    fn register_plugin(&mut self, plugin: SharedListener) {
        self.smtp.register_plugin(plugin);
    }
}
