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

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use log::{info, warn};
use secstr::SecStr;

use super::main::{ComposeOptions, SendSubcommand};
use crate::mailer::Mailer;
use crate::mime::{Mailbox, Message, MimeFactory};
use crate::support::config::{MailerConfig, TransportKind};
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::transport::{self, SmtpTransport, Transport};

pub(super) fn send(config: MailerConfig, cmd: SendSubcommand) {
    let password = if cmd.prompt_password {
        if config.auth.username.is_empty() {
            fatal!(EX_USAGE, "--prompt-password needs auth.username to be set");
        }
        match rpassword::read_password_from_tty(Some("Password: ")) {
            Ok(pw) => Some(SecStr::new(pw.into_bytes())),
            Err(e) => fatal!(EX_NOINPUT, "Failed to read password: {}", e),
        }
    } else {
        None
    };

    let mut mailer = match build_mailer(&config, password) {
        Ok(mailer) => mailer,
        Err(e) => fatal!(Sysexit::from(&e), "Bad configuration: {}", e),
    };

    let mut message = compose(mailer.factory(), &cmd.compose);
    let mut failed = Vec::new();
    let result = if cmd.batch {
        mailer.batch_send(&mut message, &mut failed)
    } else {
        mailer.send(&mut message, &mut failed)
    };
    if let Err(e) = mailer.transport_mut().stop() {
        warn!("Error closing {}: {}", mailer.transport().name(), e);
    }

    match result {
        Err(e) => fatal!(Sysexit::from(&e), "Message not sent: {}", e),
        Ok(0) => fatal!(
            EX_UNAVAILABLE,
            "Message not accepted for any recipient: {}",
            failed.join(", ")
        ),
        Ok(n) if !failed.is_empty() => fatal!(
            EX_TEMPFAIL,
            "Message accepted for {} recipient(s), refused for {}",
            n,
            failed.join(", ")
        ),
        Ok(n) => info!("Message accepted for {} recipient(s)", n),
    }
}

pub(super) fn render(config: MailerConfig, cmd: ComposeOptions) {
    let factory = match MimeFactory::from_config(&config) {
        Ok(factory) => factory,
        Err(e) => fatal!(Sysexit::from(&e), "Bad configuration: {}", e),
    };

    let mut message = compose(&factory, &cmd);
    let bytes = match message.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => fatal!(Sysexit::from(&e), "Failed to render message: {}", e),
    };

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    if let Err(e) = stdout.write_all(&bytes).and_then(|()| stdout.flush()) {
        fatal!(EX_IOERR, "Failed to write message: {}", e);
    }
}

fn build_mailer(
    config: &MailerConfig,
    password: Option<SecStr>,
) -> Result<Mailer, Error> {
    let factory = MimeFactory::from_config(config)?;
    let transport: Box<dyn Transport> = match password {
        Some(password) if TransportKind::Smtp == config.transport.kind => {
            let mut smtp = SmtpTransport::from_config(config);
            if let Some(auth) = smtp.authenticatable() {
                auth.set_password(password.unsecure());
            }
            Box::new(smtp)
        }
        Some(_) => {
            warn!("Password ignored; only the SMTP transport authenticates");
            transport::from_config(config)?
        }
        None => transport::from_config(config)?,
    };

    Ok(Mailer::with_factory(transport, factory))
}

fn compose(factory: &MimeFactory, cmd: &ComposeOptions) -> Message {
    let mut message = factory.message(&cmd.subject);

    if let Err(e) = add_addresses(&mut message, cmd) {
        fatal!(EX_DATAERR, "Bad address: {}", e);
    }

    message.set_body(read_input(&cmd.body));
    if let Some(ref html) = cmd.html {
        message.attach(factory.part(read_input(html), "text/html"));
    }

    for path in &cmd.attach {
        match factory.attachment_from_path(path) {
            Ok(att) => message.attach(att),
            Err(e) => fatal!(
                EX_NOINPUT,
                "Can't attach '{}': {}",
                path.display(),
                e
            ),
        }
    }

    message
}

fn add_addresses(
    message: &mut Message,
    cmd: &ComposeOptions,
) -> Result<(), Error> {
    message.add_from(parse_mailbox(&cmd.from))?;
    for to in &cmd.to {
        message.add_to(parse_mailbox(to))?;
    }
    for cc in &cmd.cc {
        message.add_cc(parse_mailbox(cc))?;
    }
    for bcc in &cmd.bcc {
        message.add_bcc(parse_mailbox(bcc))?;
    }
    Ok(())
}

/// Read the file at `path`, or standard input if it is `-`.
fn read_input(path: &Path) -> Vec<u8> {
    let result = if Path::new("-") == path {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data).map(|_| data)
    } else {
        fs::read(path)
    };

    match result {
        Ok(data) => data,
        Err(e) => fatal!(EX_NOINPUT, "Can't read '{}': {}", path.display(), e),
    }
}

/// Parse `address` or `Display Name <address>`.
fn parse_mailbox(s: &str) -> Mailbox {
    let s = s.trim();
    if let (true, Some(lt)) = (s.ends_with('>'), s.rfind('<')) {
        let address = s[lt + 1..s.len() - 1].trim();
        let name = s[..lt].trim().trim_matches('"').trim();
        if name.is_empty() {
            Mailbox::new(address)
        } else {
            Mailbox::with_name(address, name)
        }
    } else {
        Mailbox::new(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mailbox_forms() {
        let mb = parse_mailbox("jo@example.com");
        assert_eq!("jo@example.com", mb.address);
        assert_eq!(None, mb.name);

        let mb = parse_mailbox("Jo Bloggs <jo@example.com>");
        assert_eq!("jo@example.com", mb.address);
        assert_eq!(Some("Jo Bloggs"), mb.name.as_deref());

        let mb = parse_mailbox("\"Bloggs, Jo\" <jo@example.com> ");
        assert_eq!("jo@example.com", mb.address);
        assert_eq!(Some("Bloggs, Jo"), mb.name.as_deref());

        let mb = parse_mailbox("<jo@example.com>");
        assert_eq!("jo@example.com", mb.address);
        assert_eq!(None, mb.name);
    }
}
