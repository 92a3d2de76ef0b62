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

//! Notification of transport activity to registered listeners.
//!
//! Every event kind corresponds to one or two methods of `EventListener`. A
//! listener overrides only the methods for the events it cares about; the
//! rest do nothing. Events are delivered to listeners in the order they were
//! bound, and delivery stops as soon as one listener cancels the bubble.
//!
//! The "before" events are how a listener vetoes an action: if the bubble of
//! a `before_transport_started`, `before_transport_stopped` or
//! `before_send_performed` event is cancelled, the transport does not carry
//! out the action.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::mime::Message;
use crate::support::error::Error;

pub type SharedListener = Rc<RefCell<dyn EventListener>>;

/// State common to all events.
pub trait Event {
    fn cancel_bubble(&mut self, cancel: bool);
    fn bubble_cancelled(&self) -> bool;
}

macro_rules! impl_event {
    ($($t:ident $(<$lt:lifetime>)?),*) => {$(
        impl$(<$lt>)? Event for $t$(<$lt>)? {
            fn cancel_bubble(&mut self, cancel: bool) {
                self.cancelled = cancel;
            }

            fn bubble_cancelled(&self) -> bool {
                self.cancelled
            }
        }
    )*};
}

/// A transport is starting or stopping.
#[derive(Clone, Debug)]
pub struct TransportChangeEvent {
    /// Name of the transport, e.g. `smtp`.
    pub transport: &'static str,
    cancelled: bool,
}

impl TransportChangeEvent {
    pub fn new(transport: &'static str) -> Self {
        TransportChangeEvent {
            transport,
            cancelled: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendResult {
    /// The send has not happened yet.
    Pending,
    /// Every recipient was accepted.
    Success,
    /// Some, but not all, recipients were accepted.
    Tentative,
    /// No recipient was accepted.
    Failed,
    /// The message was stored for later delivery.
    Spooled,
}

impl SendResult {
    /// Classify a send given how many recipients were accepted out of how
    /// many were tried.
    pub fn classify(accepted: usize, total: usize) -> Self {
        if 0 == accepted {
            SendResult::Failed
        } else if accepted < total {
            SendResult::Tentative
        } else {
            SendResult::Success
        }
    }
}

/// A message is about to be, or has been, sent.
///
/// Listeners of `before_send_performed` may alter the message.
pub struct SendEvent<'a> {
    pub transport: &'static str,
    pub message: &'a mut Message,
    pub result: SendResult,
    pub failed_recipients: Vec<String>,
    cancelled: bool,
}

impl<'a> SendEvent<'a> {
    pub fn new(transport: &'static str, message: &'a mut Message) -> Self {
        SendEvent {
            transport,
            message,
            result: SendResult::Pending,
            failed_recipients: Vec::new(),
            cancelled: false,
        }
    }
}

impl fmt::Debug for SendEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SendEvent")
            .field("transport", &self.transport)
            .field("message", &self.message.id())
            .field("result", &self.result)
            .field("failed_recipients", &self.failed_recipients)
            .finish()
    }
}

/// A command was written to the server.
#[derive(Clone, Debug)]
pub struct CommandEvent {
    /// The command including its line ending.
    pub command: String,
    /// The response codes the command expects.
    pub success_codes: Vec<u16>,
    cancelled: bool,
}

impl CommandEvent {
    pub fn new(command: &str, success_codes: &[u16]) -> Self {
        CommandEvent {
            command: command.to_owned(),
            success_codes: success_codes.to_vec(),
            cancelled: false,
        }
    }
}

/// A complete, possibly multi-line, response was read from the server.
#[derive(Clone, Debug)]
pub struct ResponseEvent {
    pub response: String,
    /// Whether the response code was one of those expected.
    pub valid: bool,
    cancelled: bool,
}

impl ResponseEvent {
    pub fn new(response: &str, valid: bool) -> Self {
        ResponseEvent {
            response: response.to_owned(),
            valid,
            cancelled: false,
        }
    }
}

/// A transport operation failed.
///
/// If a listener cancels the bubble, the failure is suppressed and the
/// operation carries on as if it had not happened.
#[derive(Debug)]
pub struct TransportExceptionEvent {
    pub error: Error,
    cancelled: bool,
}

impl TransportExceptionEvent {
    pub fn new(error: Error) -> Self {
        TransportExceptionEvent {
            error,
            cancelled: false,
        }
    }

    pub fn into_error(self) -> Error {
        self.error
    }
}

impl_event!(
    TransportChangeEvent,
    SendEvent<'a>,
    CommandEvent,
    ResponseEvent,
    TransportExceptionEvent
);

/// Receives events from a transport.
///
/// All methods default to doing nothing.
#[allow(unused_variables)]
pub trait EventListener {
    fn before_transport_started(&mut self, evt: &mut TransportChangeEvent) {}
    fn transport_started(&mut self, evt: &mut TransportChangeEvent) {}
    fn before_transport_stopped(&mut self, evt: &mut TransportChangeEvent) {}
    fn transport_stopped(&mut self, evt: &mut TransportChangeEvent) {}
    fn before_send_performed(&mut self, evt: &mut SendEvent<'_>) {}
    fn send_performed(&mut self, evt: &mut SendEvent<'_>) {}
    fn command_sent(&mut self, evt: &mut CommandEvent) {}
    fn response_received(&mut self, evt: &mut ResponseEvent) {}
    fn exception_thrown(&mut self, evt: &mut TransportExceptionEvent) {}
}

/// The listeners bound to one transport.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Vec<SharedListener>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventDispatcher({} listeners)", self.listeners.len())
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `listener` so that it receives subsequent events.
    ///
    /// Binding a listener which is already bound does nothing.
    pub fn bind_listener(&mut self, listener: SharedListener) {
        if !self.listeners.iter().any(|l| same_listener(l, &listener)) {
            self.listeners.push(listener);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `evt` to each listener in turn by calling `method`, stopping
    /// when the bubble is cancelled.
    ///
    /// Returns whether the bubble was cancelled.
    pub fn dispatch<E: Event>(
        &self,
        evt: &mut E,
        method: impl Fn(&mut dyn EventListener, &mut E),
    ) -> bool {
        for listener in &self.listeners {
            if evt.bubble_cancelled() {
                break;
            }

            method(&mut *listener.borrow_mut(), evt);
        }

        evt.bubble_cancelled()
    }

    /// Route `error` through `exception_thrown`.
    ///
    /// Returns `Ok(())` if a listener suppressed it.
    pub fn raise(&self, error: Error) -> Result<(), Error> {
        let mut evt = TransportExceptionEvent::new(error);
        if self.dispatch(&mut evt, |l, e| l.exception_thrown(e)) {
            log::info!("Transport error suppressed: {}", evt.error);
            Ok(())
        } else {
            Err(evt.into_error())
        }
    }
}

fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}
