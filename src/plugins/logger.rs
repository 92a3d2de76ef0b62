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

use std::collections::VecDeque;
use std::fmt::{self, Write as _};

use chrono::prelude::*;

use crate::events::{
    CommandEvent, EventListener, ResponseEvent, TransportChangeEvent,
    TransportExceptionEvent,
};

/// Keeps a timestamped transcript of the conversation with the server.
///
/// Lines are marked `>>` for commands, `<<` for responses, `++` and `--`
/// for the transport starting and stopping, and `!!` for errors. Each line
/// after the first notes the time since the previous one. Lines are also
/// logged at debug level.
pub struct LoggerPlugin {
    lines: VecDeque<String>,
    limit: usize,
    last_entry: Option<DateTime<Utc>>,
}

impl Default for LoggerPlugin {
    fn default() -> Self {
        LoggerPlugin::with_limit(50)
    }
}

impl LoggerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// A logger remembering at most the last `limit` lines.
    pub fn with_limit(limit: usize) -> Self {
        LoggerPlugin {
            lines: VecDeque::new(),
            limit: limit.max(1),
            last_entry: None,
        }
    }

    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let now = Utc::now();
        let mut line = now.format("%Y-%m-%d %H:%M:%S").to_string();
        if let Some(last_entry) = self.last_entry {
            let delta =
                now.signed_duration_since(last_entry).num_milliseconds();
            let _ = write!(line, " ({:+5}ms)", delta);
        }
        let _ = write!(line, " {}", args);
        log::debug!("{}", line);

        if self.lines.len() >= self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.last_entry = Some(now);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The transcript, one entry per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.last_entry = None;
    }
}

impl EventListener for LoggerPlugin {
    fn before_transport_started(&mut self, evt: &mut TransportChangeEvent) {
        self.line(format_args!("++ Starting {}", evt.transport));
    }

    fn transport_started(&mut self, evt: &mut TransportChangeEvent) {
        self.line(format_args!("++ {} started", evt.transport));
    }

    fn before_transport_stopped(&mut self, evt: &mut TransportChangeEvent) {
        self.line(format_args!("-- Stopping {}", evt.transport));
    }

    fn transport_stopped(&mut self, evt: &mut TransportChangeEvent) {
        self.line(format_args!("-- {} stopped", evt.transport));
    }

    fn command_sent(&mut self, evt: &mut CommandEvent) {
        self.line(format_args!(">> {}", evt.command.trim_end()));
    }

    fn response_received(&mut self, evt: &mut ResponseEvent) {
        self.line(format_args!("<< {}", evt.response.trim_end()));
    }

    fn exception_thrown(&mut self, evt: &mut TransportExceptionEvent) {
        self.line(format_args!("!! {}", evt.error));
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::mime::Message;
    use crate::transport::buffer::Connection;
    use crate::transport::smtp::test::scripted_server;
    use crate::transport::{SmtpTransport, Transport};

    #[test]
    fn transcript_of_session() {
        let (cxn, server) = scripted_server(
            "220 ready\r\n",
            vec![
                ("EHLO", "250 ok\r\n"),
                ("MAIL FROM:", "250 ok\r\n"),
                ("RCPT TO:", "550 no\r\n"),
                ("RSET", "250 ok\r\n"),
                ("QUIT", "221 bye\r\n"),
            ],
        );

        let logger = Rc::new(RefCell::new(LoggerPlugin::new()));
        let mut transport = SmtpTransport::with_connection(Connection::Unix(cxn));
        transport.set_local_domain("client.test");
        transport.register_plugin(logger.clone());
        transport.start().unwrap();

        let mut message = Message::new("x");
        message.add_from("a@example.com").unwrap();
        message.add_to("b@example.com").unwrap();
        transport.send(&mut message, &mut Vec::new()).unwrap();
        transport.stop().unwrap();
        server.join().unwrap();

        let logger = logger.borrow();
        let lines = logger
            .lines()
            .map(|l| l.splitn(2, " >> ").nth(1).unwrap_or(l))
            .collect::<Vec<_>>();
        assert!(lines[0].ends_with(" ++ Starting smtp"));
        assert_eq!("EHLO client.test", lines[2]);
        assert!(lines
            .iter()
            .any(|l| l.contains("!! Expected response code 250/251/252")));
        assert!(lines.last().unwrap().ends_with(" -- smtp stopped"));
        assert!(logger.dump().contains("<< 221 bye\n"));
    }

    #[test]
    fn limit_drops_oldest() {
        let mut logger = LoggerPlugin::with_limit(2);
        logger.line(format_args!("a"));
        logger.line(format_args!("b"));
        logger.line(format_args!("c"));
        let lines = logger.lines().collect::<Vec<_>>();
        assert_eq!(2, lines.len());
        assert!(lines[0].ends_with("ms) b"));
        assert!(lines[1].ends_with("ms) c"));

        logger.clear();
        assert_eq!("", logger.dump());
    }
}
