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

//! SMTP and ESMTP delivery.

use std::mem;
use std::time::Duration;

use log::{debug, info, trace, warn};

use super::buffer::{BufferParams, Connection, IoBuffer};
use super::esmtp::{
    parse_capabilities, sort_handlers, Authenticatable, Capabilities,
    EsmtpHandler,
};
use super::auth::AuthHandler;
use super::{unique_addresses, Transport};
use crate::events::{
    CommandEvent, EventDispatcher, ResponseEvent, SendEvent, SendResult,
    SharedListener, TransportChangeEvent,
};
use crate::mime::{Mailbox, Message};
use crate::stream::InputByteStream;
use crate::support::config::{Encryption, MailerConfig};
use crate::support::error::Error;

/// Maximum number of lines in one response.
const MAX_RESPONSE_LINES: usize = 1000;

/// The command/response half of an SMTP client.
///
/// This is what extension handlers and authenticators use to talk to the
/// server.
pub struct SmtpAgent {
    buffer: IoBuffer,
    dispatcher: EventDispatcher,
}

impl SmtpAgent {
    fn new() -> Self {
        SmtpAgent {
            buffer: IoBuffer::new(),
            dispatcher: EventDispatcher::new(),
        }
    }

    pub fn buffer_mut(&mut self) -> &mut IoBuffer {
        &mut self.buffer
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Send `command` and read the full response, which must carry one of
    /// `codes` unless `codes` is empty.
    ///
    /// Failures go through the exception event first; if a listener
    /// suppresses them, whatever response was read is returned.
    pub fn execute_command(
        &mut self,
        command: &str,
        codes: &[u16],
    ) -> Result<String, Error> {
        trace!(">> {:?}", command);
        let sequence = match self.buffer.write(command.as_bytes()) {
            Ok(sequence) => sequence,
            Err(e) => {
                self.dispatcher.raise(Error::from(e).into_transport())?;
                0
            }
        };

        let response = self.full_response(sequence)?;
        let mut evt = CommandEvent::new(command, codes);
        self.dispatcher.dispatch(&mut evt, |l, e| l.command_sent(e));
        self.assert_response_code(&response, codes)?;
        Ok(response)
    }

    /// Read response lines up to and including the last one.
    ///
    /// Every line but the last has a `-` after the code.
    fn full_response(&mut self, sequence: u64) -> Result<String, Error> {
        let mut response = String::new();
        for _ in 0..MAX_RESPONSE_LINES {
            let line = match self.buffer.read_line(sequence) {
                Ok(line) => line,
                Err(e) => {
                    self.dispatcher.raise(e.into_transport())?;
                    return Ok(response);
                }
            };

            let last = Some(b'-') != line.as_bytes().get(3).copied();
            response.push_str(&line);
            if last {
                return Ok(response);
            }
        }

        self.dispatcher
            .raise(Error::transport("Too many response lines from server"))?;
        Ok(response)
    }

    fn assert_response_code(
        &mut self,
        response: &str,
        codes: &[u16],
    ) -> Result<(), Error> {
        let code = response.get(..3).and_then(|c| c.parse::<u16>().ok());
        let valid =
            codes.is_empty() || code.map_or(false, |c| codes.contains(&c));

        let mut evt = ResponseEvent::new(response, valid);
        self.dispatcher.dispatch(&mut evt, |l, e| l.response_received(e));

        if valid {
            Ok(())
        } else {
            self.dispatcher
                .raise(Error::unexpected_code(codes, code, response))
        }
    }
}

/// Delivers messages over SMTP, using ESMTP extensions when the server
/// supports them.
pub struct SmtpTransport {
    agent: SmtpAgent,
    name: &'static str,
    params: BufferParams,
    /// A connection to use on the next `start()` instead of opening one.
    pending: Option<Connection>,
    local_domain: String,
    /// Whether to greet with EHLO.
    extended: bool,
    /// Host and verification setting for STARTTLS, if wanted.
    starttls: Option<(String, bool)>,
    tls_active: bool,
    handlers: Vec<Box<dyn EsmtpHandler>>,
    capabilities: Capabilities,
    started: bool,
}

impl SmtpTransport {
    /// An ESMTP transport to `host` with default settings.
    pub fn new(host: &str, port: u16, encryption: Encryption) -> Self {
        let mut this = SmtpTransport::with_params(
            "smtp",
            BufferParams::Socket {
                host: host.to_owned(),
                port,
                encryption,
                timeout: Duration::from_secs(30),
                verify_certificates: true,
            },
        );
        if Encryption::Tls == encryption {
            this.starttls = Some((host.to_owned(), true));
        }
        this
    }

    /// An ESMTP transport configured by `config`, with an `AuthHandler` if a
    /// user name is given.
    pub fn from_config(config: &MailerConfig) -> Self {
        let tc = &config.transport;
        let mut this = SmtpTransport::with_params(
            "smtp",
            BufferParams::Socket {
                host: tc.host.clone(),
                port: tc.port,
                encryption: tc.encryption,
                timeout: Duration::from_secs(tc.timeout_secs),
                verify_certificates: tc.verify_certificates,
            },
        );
        if Encryption::Tls == tc.encryption {
            this.starttls = Some((tc.host.clone(), tc.verify_certificates));
        }
        if !tc.local_domain.is_empty() {
            this.local_domain = tc.local_domain.clone();
        }

        if !config.auth.username.is_empty() {
            let mut auth = AuthHandler::default().with_credentials(
                &config.auth.username,
                config.auth.password.as_bytes(),
            );
            auth.set_auth_mode(config.auth.mode.as_deref());
            this.add_extension_handler(Box::new(auth));
        }

        this
    }

    /// An ESMTP transport which speaks over `cxn` when started.
    pub fn with_connection(cxn: Connection) -> Self {
        let mut this = SmtpTransport::with_params(
            "smtp",
            BufferParams::Process {
                command: String::new(),
            },
        );
        this.pending = Some(cxn);
        this
    }

    pub(super) fn with_params(name: &'static str, params: BufferParams) -> Self {
        SmtpTransport {
            agent: SmtpAgent::new(),
            name,
            params,
            pending: None,
            local_domain: default_local_domain(),
            extended: true,
            starttls: None,
            tls_active: false,
            handlers: Vec::new(),
            capabilities: Capabilities::new(),
            started: false,
        }
    }

    pub fn local_domain(&self) -> &str {
        &self.local_domain
    }

    pub fn set_local_domain(&mut self, domain: &str) {
        self.local_domain = domain.to_owned();
    }

    /// Choose between EHLO (with extensions) and plain HELO.
    pub fn set_extended(&mut self, extended: bool) {
        self.extended = extended;
    }

    /// Replace the extension handlers.
    pub fn set_extension_handlers(
        &mut self,
        mut handlers: Vec<Box<dyn EsmtpHandler>>,
    ) {
        sort_handlers(&mut handlers);
        self.handlers = handlers;
    }

    pub fn add_extension_handler(&mut self, handler: Box<dyn EsmtpHandler>) {
        let mut handlers = mem::take(&mut self.handlers);
        handlers.push(handler);
        self.set_extension_handlers(handlers);
    }

    pub fn extension_handlers(&self) -> &[Box<dyn EsmtpHandler>] {
        &self.handlers
    }

    /// The credentials holder of the first handler which has one.
    pub fn authenticatable(&mut self) -> Option<&mut dyn Authenticatable> {
        self.handlers
            .iter_mut()
            .filter_map(|h| h.as_authenticatable())
            .next()
    }

    /// What the server advertised in its last EHLO response.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.agent.dispatcher
    }

    /// Run `command` past the extension handlers, then send it unless one
    /// of them handled it.
    pub fn execute_command(
        &mut self,
        command: &str,
        codes: &[u16],
    ) -> Result<String, Error> {
        for handler in &mut self.handlers {
            if !self.capabilities.contains_key(handler.keyword()) {
                continue;
            }

            if let Some(response) =
                handler.on_command(&mut self.agent, command, codes)?
            {
                return Ok(response);
            }
        }

        self.agent.execute_command(command, codes)
    }

    /// Abort the current mail transaction.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.execute_command("RSET\r\n", &[250])?;
        for handler in &mut self.handlers {
            handler.reset_state();
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Error> {
        match self.pending.take() {
            Some(cxn) => {
                self.agent.buffer = IoBuffer::from_connection(cxn);
                Ok(())
            }
            None => self.agent.buffer.initialize(&self.params),
        }
    }

    fn read_greeting(&mut self) -> Result<(), Error> {
        let response = self.agent.full_response(0)?;
        self.agent.assert_response_code(&response, &[220])
    }

    fn helo(&mut self) -> Result<(), Error> {
        let command = format!("HELO {}\r\n", self.local_domain);
        self.execute_command(&command, &[250])?;
        Ok(())
    }

    fn do_helo(&mut self) -> Result<(), Error> {
        self.capabilities.clear();
        if !self.extended {
            return self.helo();
        }

        let command = format!("EHLO {}\r\n", self.local_domain);
        let response = match self.execute_command(&command, &[250]) {
            Ok(response) => response,
            Err(e) => {
                debug!("EHLO refused, falling back to HELO: {}", e);
                return self.helo();
            }
        };

        if let (Some((host, verify)), false) =
            (self.starttls.clone(), self.tls_active)
        {
            self.execute_command("STARTTLS\r\n", &[220])?;
            if let Err(e) = self.agent.buffer.start_tls(&host, verify) {
                self.agent.dispatcher.raise(e.into_transport())?;
            }
            self.tls_active = true;
            return self.do_helo();
        }

        self.capabilities = parse_capabilities(&response);
        for handler in &mut self.handlers {
            if let Some(params) = self.capabilities.get(handler.keyword()) {
                handler.set_keyword_params(params);
            }
        }
        for handler in &mut self.handlers {
            if self.capabilities.contains_key(handler.keyword()) {
                handler.after_eho(&mut self.agent)?;
            }
        }

        Ok(())
    }

    fn handler_params(
        &self,
        f: impl Fn(&dyn EsmtpHandler) -> Vec<String>,
    ) -> String {
        let mut params = String::new();
        for handler in &self.handlers {
            if !self.capabilities.contains_key(handler.keyword()) {
                continue;
            }

            for param in f(&**handler) {
                params.push(' ');
                params.push_str(&param);
            }
        }
        params
    }

    fn mail_from(&mut self, address: &str) -> Result<(), Error> {
        let params = self.handler_params(|h| h.mail_params());
        let command = format!("MAIL FROM:<{}>{}\r\n", address, params);
        self.execute_command(&command, &[250])?;
        Ok(())
    }

    fn rcpt_to(&mut self, address: &str) -> Result<(), Error> {
        let params = self.handler_params(|h| h.rcpt_params());
        let command = format!("RCPT TO:<{}>{}\r\n", address, params);
        self.execute_command(&command, &[250, 251, 252])?;
        Ok(())
    }

    fn stream_message(&mut self, message: &mut Message) -> Result<(), Error> {
        self.execute_command("DATA\r\n", &[354])?;

        let mut written = self
            .agent
            .buffer
            .set_write_translations(&[(&b"\r\n."[..], &b"\r\n.."[..])])
            .map_err(Error::from);
        if written.is_ok() {
            written = message.to_byte_stream(&mut self.agent.buffer);
        }
        let restored = self.agent.buffer.set_write_translations(&[]);
        match written.and(restored.map_err(Error::from)) {
            Ok(()) => (),
            Err(e @ Error::RfcCompliance(_)) => return Err(e),
            Err(e) => self.agent.dispatcher.raise(e.into_transport())?,
        }

        self.execute_command("\r\n.\r\n", &[250])?;
        Ok(())
    }

    /// One MAIL/RCPT/DATA transaction to `recipients`.
    ///
    /// Recipients the server refuses are added to `failed`. If it refuses
    /// them all, the transaction is reset instead of sending data.
    fn mail_transaction(
        &mut self,
        message: &mut Message,
        reverse_path: &str,
        recipients: &[String],
        failed: &mut Vec<String>,
    ) -> Result<usize, Error> {
        self.mail_from(reverse_path)?;

        let mut sent = 0;
        for address in recipients {
            match self.rcpt_to(address) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Recipient <{}> refused: {}", address, e);
                    failed.push(address.clone());
                }
            }
        }

        if 0 == sent {
            self.reset()?;
        } else {
            self.stream_message(message)?;
        }

        Ok(sent)
    }

    fn send_to_and_bcc(
        &mut self,
        message: &mut Message,
        reverse_path: &str,
        to_cc: &[String],
        bcc: &[Mailbox],
        failed: &mut Vec<String>,
    ) -> Result<usize, Error> {
        let mut sent = 0;
        if !to_cc.is_empty() {
            sent +=
                self.mail_transaction(message, reverse_path, to_cc, failed)?;
        }

        for mailbox in bcc {
            message.set_bcc(vec![mailbox.clone()])?;
            sent += self.mail_transaction(
                message,
                reverse_path,
                &[mailbox.address.clone()],
                failed,
            )?;
        }

        Ok(sent)
    }
}

impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self) -> Result<(), Error> {
        if self.started {
            return Ok(());
        }

        let mut evt = TransportChangeEvent::new(self.name);
        if self
            .agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.before_transport_started(e))
        {
            return Ok(());
        }

        self.tls_active = false;
        if let Err(e) = self.connect() {
            self.agent.dispatcher.raise(e.into_transport())?;
        }
        self.read_greeting()?;
        self.do_helo()?;

        let mut evt = TransportChangeEvent::new(self.name);
        self.agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.transport_started(e));
        self.started = true;
        info!("{} transport started", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        if !self.started {
            return Ok(());
        }

        let mut evt = TransportChangeEvent::new(self.name);
        if self
            .agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.before_transport_stopped(e))
        {
            return Ok(());
        }

        if let Err(e) = self.execute_command("QUIT\r\n", &[221]) {
            debug!("Ignoring failed QUIT: {}", e);
        }
        self.agent.buffer.terminate();

        let mut evt = TransportChangeEvent::new(self.name);
        self.agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.transport_stopped(e));
        self.started = false;
        info!("{} transport stopped", self.name);
        Ok(())
    }

    fn send(
        &mut self,
        message: &mut Message,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error> {
        let mut evt = SendEvent::new(self.name, message);
        if self
            .agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.before_send_performed(e))
        {
            return Ok(0);
        }

        let reverse_path = match message.reverse_path() {
            Some(path) => path,
            None => {
                self.agent.dispatcher.raise(Error::transport(
                    "Cannot send message without a sender address",
                ))?;
                String::new()
            }
        };

        let to = message.to();
        let cc = message.cc();
        let bcc = message.bcc();
        let to_cc = unique_addresses(to.iter().chain(cc.iter()));

        // Bcc recipients get their own transactions, each seeing only
        // themselves.
        message.set_bcc(Vec::new())?;
        let mut failed = Vec::new();
        let result = self.send_to_and_bcc(
            message,
            &reverse_path,
            &to_cc,
            &bcc,
            &mut failed,
        );
        message.set_bcc(bcc.clone())?;
        failed_recipients.extend(failed.iter().cloned());
        let sent = match result {
            Ok(sent) => sent,
            Err(e) => {
                regenerate_id(message);
                return Err(e);
            }
        };

        let total = to.len() + cc.len() + bcc.len();
        let mut evt = SendEvent::new(self.name, message);
        evt.result = SendResult::classify(sent, total);
        evt.failed_recipients = failed;
        self.agent
            .dispatcher
            .dispatch(&mut evt, |l, e| l.send_performed(e));

        regenerate_id(message);

        info!("Sent message to {} of {} recipients", sent, total);
        Ok(sent)
    }

    fn register_plugin(&mut self, plugin: SharedListener) {
        self.agent.dispatcher.bind_listener(plugin);
    }
}

/// Give `message` a fresh Message-ID so that no two attempts share one.
fn regenerate_id(message: &mut Message) {
    if let Err(e) = message.generate_id() {
        warn!("Failed to regenerate Message-ID: {}", e);
    }
}

impl Drop for SmtpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!("Error stopping transport on drop: {}", e);
        }
    }
}

/// The name to greet the server with when none is configured.
fn default_local_domain() -> String {
    let mut buf = [0u8; 256];
    nix::unistd::gethostname(&mut buf)
        .ok()
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map_or_else(|| "[127.0.0.1]".to_owned(), str::to_owned)
}

#[cfg(test)]
pub(crate) mod test {
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;
    use std::thread::{self, JoinHandle};

    use super::*;
    use crate::events::{Event, EventListener, TransportExceptionEvent};

    /// Run a scripted server on one end of a socket pair.
    ///
    /// The server sends `greeting`, then for each step reads one command
    /// (or, after a 354 reply, one whole DATA block), checks it starts with
    /// the step's prefix, and sends the step's reply. It returns everything
    /// it received.
    pub fn scripted_server(
        greeting: &'static str,
        script: Vec<(&'static str, &'static str)>,
    ) -> (UnixStream, JoinHandle<Vec<String>>) {
        let (client, server) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut writer = server.try_clone().unwrap();
            let mut reader = BufReader::new(server);
            let mut transcript = Vec::new();

            writer.write_all(greeting.as_bytes()).unwrap();
            let mut in_data = false;
            for (expected, reply) in script {
                let mut received = String::new();
                loop {
                    let mut line = String::new();
                    if 0 == reader.read_line(&mut line).unwrap() {
                        return transcript;
                    }
                    received.push_str(&line);
                    if !in_data || ".\r\n" == line {
                        break;
                    }
                }

                assert!(
                    received.starts_with(expected),
                    "Expected {:?}, got {:?}",
                    expected,
                    received
                );
                transcript.push(received);
                in_data = reply.starts_with("354");
                writer.write_all(reply.as_bytes()).unwrap();
            }

            transcript
        });

        (client, handle)
    }

    fn transport(cxn: UnixStream) -> SmtpTransport {
        let mut transport =
            SmtpTransport::with_connection(Connection::Unix(cxn));
        transport.set_local_domain("client.test");
        transport
    }

    fn message(to: &[&str], cc: &[&str], bcc: &[&str]) -> Message {
        let mut message = Message::new("Test");
        message.add_from("sender@example.com").unwrap();
        for &a in to {
            message.add_to(a).unwrap();
        }
        for &a in cc {
            message.add_cc(a).unwrap();
        }
        for &a in bcc {
            message.add_bcc(a).unwrap();
        }
        message.set_body("Hello\r\n.leading dot\r\n");
        message
    }

    #[test]
    fn single_recipient() {
        crate::init_test_log();
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO client.test\r\n", "250 HELO ok\r\n"),
                ("MAIL FROM:<sender@example.com>\r\n", "250 2.1.0 ok\r\n"),
                ("RCPT TO:<a@example.com>\r\n", "250 2.1.5 ok\r\n"),
                ("DATA\r\n", "354 go ahead\r\n"),
                ("Message-ID: <", "250 queued\r\n"),
                ("QUIT\r\n", "221 bye\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.start().unwrap();
        assert!(transport.is_started());
        assert!(transport.capabilities().is_empty());

        let mut message = message(&["a@example.com"], &[], &[]);
        let id_before = message.id().to_owned();
        let mut failed = Vec::new();
        assert_eq!(1, transport.send(&mut message, &mut failed).unwrap());
        assert!(failed.is_empty());
        assert_ne!(id_before, message.id());

        transport.stop().unwrap();
        assert!(!transport.is_started());

        let transcript = server.join().unwrap();
        let data = &transcript[4];
        assert!(data.contains("\r\nTo: a@example.com\r\n"));
        assert!(data.contains("\r\n..leading dot\r\n"));
        assert!(data.ends_with("\r\n.\r\n"));
        assert!(!data.contains("Bcc:"));
    }

    #[test]
    fn partial_recipient_failure() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:<sender@example.com>", "250 ok\r\n"),
                ("RCPT TO:<a@example.com>", "250 ok\r\n"),
                ("RCPT TO:<nobody@example.com>", "550 no such user\r\n"),
                ("DATA", "354 go ahead\r\n"),
                ("", "250 queued\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        let log = Rc::new(RefCell::new(Vec::new()));
        transport.register_plugin(Rc::new(RefCell::new(Recorder {
            log: Rc::clone(&log),
            ..Recorder::default()
        })));
        transport.start().unwrap();

        let mut message =
            message(&["a@example.com"], &["nobody@example.com"], &[]);
        let mut failed = Vec::new();
        assert_eq!(1, transport.send(&mut message, &mut failed).unwrap());
        assert_eq!(vec!["nobody@example.com".to_owned()], failed);
        assert!(log.borrow().contains(&"sent Tentative 1".to_owned()));
        assert!(log.borrow().iter().any(|l| l.starts_with("!! Expected")));

        drop(transport);
        let transcript = server.join().unwrap();
        assert_eq!(6, transcript.len());
    }

    #[test]
    fn all_recipients_refused() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:", "250 ok\r\n"),
                ("RCPT TO:<a@example.com>", "550 no\r\n"),
                ("RSET", "250 ok\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.start().unwrap();
        let mut message = message(&["a@example.com"], &[], &[]);
        let mut failed = Vec::new();
        assert_eq!(0, transport.send(&mut message, &mut failed).unwrap());
        assert_eq!(vec!["a@example.com".to_owned()], failed);

        drop(transport);
        assert_eq!(4, server.join().unwrap().len());
    }

    #[test]
    fn bcc_recipients_isolated() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:", "250 ok\r\n"),
                ("RCPT TO:<a@example.com>", "250 ok\r\n"),
                ("DATA", "354 go\r\n"),
                ("", "250 queued\r\n"),
                ("MAIL FROM:", "250 ok\r\n"),
                ("RCPT TO:<b@example.com>", "250 ok\r\n"),
                ("DATA", "354 go\r\n"),
                ("", "250 queued\r\n"),
                ("MAIL FROM:", "250 ok\r\n"),
                ("RCPT TO:<c@example.com>", "250 ok\r\n"),
                ("DATA", "354 go\r\n"),
                ("", "250 queued\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.start().unwrap();
        let mut message =
            message(&["a@example.com"], &[], &["b@example.com", "c@example.com"]);
        let mut failed = Vec::new();
        assert_eq!(3, transport.send(&mut message, &mut failed).unwrap());
        assert_eq!(2, message.bcc().len());

        drop(transport);
        let transcript = server.join().unwrap();
        assert!(!transcript[4].contains("Bcc:"));
        assert!(transcript[8].contains("\r\nBcc: b@example.com\r\n"));
        assert!(!transcript[8].contains("c@example.com"));
        assert!(transcript[12].contains("\r\nBcc: c@example.com\r\n"));
        assert!(!transcript[12].contains("b@example.com"));
    }

    #[test]
    fn ehlo_falls_back_to_helo() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO client.test", "500 what?\r\n"),
                ("HELO client.test", "250 ok\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.add_extension_handler(Box::new(
            AuthHandler::default().with_credentials("tim", b"secret"),
        ));
        transport.start().unwrap();
        assert!(transport.is_started());
        assert!(transport.capabilities().is_empty());

        drop(transport);
        assert_eq!(2, server.join().unwrap().len());
    }

    #[test]
    fn bad_greeting() {
        let (cxn, _server) = scripted_server("554 go away\r\n", vec![]);
        let mut transport = transport(cxn);
        assert_matches!(
            Err(Error::Transport {
                code: Some(554),
                ..
            }),
            transport.start()
        );
        assert!(!transport.is_started());
    }

    #[test]
    fn auth_plain() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250-mx.test\r\n250-AUTH PLAIN\r\n250 8BITMIME\r\n"),
                (
                    "AUTH PLAIN dGltAHRpbQB0YW5zdGFhZnRhbnN0YWFm\r\n",
                    "235 ok\r\n",
                ),
            ],
        );

        let mut transport = transport(cxn);
        transport.add_extension_handler(Box::new(AuthHandler::default()));
        {
            let auth = transport.authenticatable().unwrap();
            auth.set_username("tim");
            auth.set_password(b"tanstaaftanstaaf");
        }
        transport.start().unwrap();
        assert_eq!(vec!["PLAIN"], transport.capabilities()["AUTH"]);

        drop(transport);
        assert_eq!(2, server.join().unwrap().len());
    }

    #[test]
    fn auth_falls_through_mechanisms() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250-mx.test\r\n250 AUTH CRAM-MD5 LOGIN\r\n"),
                (
                    "AUTH CRAM-MD5\r\n",
                    "334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n",
                ),
                (
                    "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n",
                    "535 not today\r\n",
                ),
                ("RSET\r\n", "250 ok\r\n"),
                ("AUTH LOGIN\r\n", "334 VXNlcm5hbWU6\r\n"),
                ("dGlt\r\n", "334 UGFzc3dvcmQ6\r\n"),
                ("dGFuc3RhYWZ0YW5zdGFhZg==\r\n", "235 ok\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.add_extension_handler(Box::new(
            AuthHandler::default()
                .with_credentials("tim", b"tanstaaftanstaaf"),
        ));
        transport.start().unwrap();

        drop(transport);
        assert_eq!(7, server.join().unwrap().len());
    }

    #[test]
    fn auth_exhausted_is_fatal() {
        let (cxn, _server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250-mx.test\r\n250 AUTH LOGIN\r\n"),
                ("AUTH LOGIN\r\n", "535 no\r\n"),
                ("RSET\r\n", "250 ok\r\n"),
            ],
        );

        let mut transport = transport(cxn);
        transport.add_extension_handler(Box::new(
            AuthHandler::default().with_credentials("tim", b"x"),
        ));
        let err = transport.start().unwrap_err();
        assert!(err.to_string().starts_with(
            "Failed to authenticate on SMTP server with username \"tim\""
        ));
    }

    #[derive(Default)]
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        veto_send: bool,
        suppress_errors: bool,
    }

    impl EventListener for Recorder {
        fn transport_started(&mut self, evt: &mut TransportChangeEvent) {
            self.log.borrow_mut().push(format!("started {}", evt.transport));
        }

        fn before_send_performed(&mut self, evt: &mut SendEvent<'_>) {
            if self.veto_send {
                evt.cancel_bubble(true);
            }
        }

        fn send_performed(&mut self, evt: &mut SendEvent<'_>) {
            self.log.borrow_mut().push(format!(
                "sent {:?} {}",
                evt.result,
                evt.failed_recipients.len()
            ));
        }

        fn command_sent(&mut self, evt: &mut CommandEvent) {
            self.log
                .borrow_mut()
                .push(format!(">> {}", evt.command.trim_end()));
        }

        fn exception_thrown(&mut self, evt: &mut TransportExceptionEvent) {
            self.log.borrow_mut().push(format!("!! {}", evt.error));
            if self.suppress_errors {
                evt.cancel_bubble(true);
            }
        }
    }

    #[test]
    fn events_and_vetoes() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![("EHLO", "250 ok\r\n"), ("QUIT", "221 bye\r\n")],
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut transport = transport(cxn);
        transport.register_plugin(Rc::new(RefCell::new(Recorder {
            log: Rc::clone(&log),
            veto_send: true,
            ..Recorder::default()
        })));
        transport.start().unwrap();

        let mut message = message(&["a@example.com"], &[], &[]);
        let mut failed = Vec::new();
        assert_eq!(0, transport.send(&mut message, &mut failed).unwrap());
        transport.stop().unwrap();

        assert_eq!(
            vec![">> EHLO client.test", "started smtp", ">> QUIT"],
            *log.borrow()
        );
        assert_eq!(2, server.join().unwrap().len());
    }

    #[test]
    fn suppressed_errors_let_send_continue() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:<>", "250 ok\r\n"),
                ("RCPT TO:<a@example.com>", "250 ok\r\n"),
                ("DATA", "354 go\r\n"),
                ("", "250 queued\r\n"),
            ],
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut transport = transport(cxn);
        transport.register_plugin(Rc::new(RefCell::new(Recorder {
            log: Rc::clone(&log),
            suppress_errors: true,
            ..Recorder::default()
        })));
        transport.start().unwrap();

        let mut message = Message::new("No sender");
        message.add_to("a@example.com").unwrap();
        let mut failed = Vec::new();
        assert_eq!(1, transport.send(&mut message, &mut failed).unwrap());
        assert!(log.borrow().contains(
            &"!! Cannot send message without a sender address".to_owned()
        ));

        drop(transport);
        assert_eq!(5, server.join().unwrap().len());
    }

    #[test]
    fn failed_send_still_renews_message_id() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:<sender@example.com>", "451 try later\r\n"),
            ],
        );
        let mut transport = transport(cxn);
        transport.start().unwrap();

        let mut message = message(&["a@example.com"], &[], &[]);
        let id_before = message.id().to_owned();
        let mut failed = Vec::new();
        assert_matches!(
            Err(Error::Transport {
                code: Some(451),
                ..
            }),
            transport.send(&mut message, &mut failed)
        );
        assert_ne!(id_before, message.id());

        drop(transport);
        server.join().unwrap();
    }

    #[test]
    fn no_sender_is_an_error() {
        let (cxn, _server) =
            scripted_server("220 ready\r\n", vec![("EHLO", "250 ok\r\n")]);
        let mut transport = transport(cxn);
        transport.start().unwrap();

        let mut message = Message::new("No sender");
        message.add_to("a@example.com").unwrap();
        let mut failed = Vec::new();
        assert_matches!(
            Err(Error::Transport { code: None, .. }),
            transport.send(&mut message, &mut failed)
        );
    }
}
