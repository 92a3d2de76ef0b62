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

use log::debug;

use super::Transport;
use crate::events::{EventDispatcher, SendEvent, SendResult, SharedListener};
use crate::mime::Message;
use crate::support::error::Error;

/// Pretends to deliver everything.
///
/// Every recipient counts as accepted. Send events are still fired, so
/// plugins behave as with a real transport.
#[derive(Debug, Default)]
pub struct NullTransport {
    dispatcher: EventDispatcher,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for NullTransport {
    fn name(&self) -> &'static str {
        "null"
    }

    fn is_started(&self) -> bool {
        true
    }

    fn start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn send(
        &mut self,
        message: &mut Message,
        _failed_recipients: &mut Vec<String>,
    ) -> Result<usize, Error> {
        let mut evt = SendEvent::new(self.name(), message);
        if self
            .dispatcher
            .dispatch(&mut evt, |l, e| l.before_send_performed(e))
        {
            return Ok(0);
        }

        let count =
            message.to().len() + message.cc().len() + message.bcc().len();
        let mut evt = SendEvent::new(self.name(), message);
        evt.result = SendResult::Success;
        self.dispatcher
            .dispatch(&mut evt, |l, e| l.send_performed(e));

        debug!("Discarded message {} to {} recipients", message.id(), count);
        Ok(count)
    }

    fn register_plugin(&mut self, plugin: SharedListener) {
        self.dispatcher.bind_listener(plugin);
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::events::{Event, EventListener};

    struct Veto(bool);

    impl EventListener for Veto {
        fn before_send_performed(&mut self, evt: &mut SendEvent<'_>) {
            evt.cancel_bubble(self.0);
        }
    }

    #[test]
    fn counts_every_recipient() {
        let mut message = Message::new("x");
        message.add_to("a@example.com").unwrap();
        message.add_cc("b@example.com").unwrap();
        message.add_bcc("c@example.com").unwrap();

        let mut transport = NullTransport::new();
        assert!(transport.is_started());
        let mut failed = Vec::new();
        assert_eq!(3, transport.send(&mut message, &mut failed).unwrap());
        assert!(failed.is_empty());

        transport.register_plugin(Rc::new(RefCell::new(Veto(true))));
        assert_eq!(0, transport.send(&mut message, &mut failed).unwrap());
    }
}
