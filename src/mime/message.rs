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

//! A complete message: a top-level entity with the RFC 2822 envelope headers.

use std::cmp::max;

use chrono::prelude::*;
use log::warn;

use super::entity::{MimeEntity, NestingLevel};
use super::header::{Header, HeaderModel, Mailbox};
use super::header_set::HeaderSet;
use super::MimeFactory;
use crate::stream::InputByteStream;
use crate::support::error::Error;

const HEADER_ORDER: &[&str] = &[
    "Return-Path",
    "Received",
    "DKIM-Signature",
    "DomainKey-Signature",
    "Sender",
    "Message-ID",
    "Date",
    "Subject",
    "From",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
];

const PRIORITY_NAMES: [&str; 5] = ["Highest", "High", "Normal", "Low", "Lowest"];

pub struct Message {
    entity: MimeEntity,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Message").field(&self.entity).finish()
    }
}

impl Message {
    pub(super) fn build(cx: &MimeFactory, subject: &str) -> Self {
        let mut entity = cx.part(Vec::new(), "text/plain");
        entity.set_nesting_level(NestingLevel::TOP);
        entity.set_id_field("Message-ID");

        let id = entity.id().to_owned();
        if let Err(e) = entity.set_id(&id) {
            warn!("Generated Message-ID is unusable: {}", e);
        }

        let headers = entity.headers_mut();
        headers.define_ordering(HEADER_ORDER);
        headers.set_always_displayed(&["Date", "Message-ID", "From"]);
        headers.add_text("Subject", subject);
        headers.add_date("Date", Local::now().timestamp());
        headers.add(Header::text("MIME-Version", "1.0"));
        headers.set_model("From", HeaderModel::Mailbox(Vec::new()))
            // An empty list is always valid
            .unwrap_or_else(|e| warn!("{}", e));

        Message { entity }
    }

    /// A message using a private memory cache.
    pub fn new(subject: &str) -> Self {
        MimeFactory::default().message(subject)
    }

    pub fn entity(&self) -> &MimeEntity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut MimeEntity {
        &mut self.entity
    }

    pub fn headers(&self) -> &HeaderSet {
        self.entity.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderSet {
        self.entity.headers_mut()
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.headers().get(name, 0).and_then(Header::value)
    }

    fn set_text(&mut self, name: &str, value: &str) {
        match self.headers_mut().get_mut(name, 0) {
            Some(header) => header.set_value(value),
            None => self.headers_mut().add_text(name, value),
        }
    }

    fn mailboxes(&self, name: &str) -> Vec<Mailbox> {
        self.headers()
            .get(name, 0)
            .map(|h| h.mailboxes().to_vec())
            .unwrap_or_default()
    }

    fn set_mailboxes(
        &mut self,
        name: &str,
        mailboxes: Vec<Mailbox>,
    ) -> Result<(), Error> {
        self.headers_mut()
            .set_model(name, HeaderModel::Mailbox(mailboxes))
    }

    fn add_mailbox(&mut self, name: &str, mailbox: Mailbox) -> Result<(), Error> {
        let mut mailboxes = self.mailboxes(name);
        mailboxes.push(mailbox);
        self.set_mailboxes(name, mailboxes)
    }

    pub fn subject(&self) -> Option<&str> {
        self.text("Subject")
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.set_text("Subject", subject);
    }

    /// The Date header as a UNIX timestamp.
    pub fn date(&self) -> Option<i64> {
        self.headers().get("Date", 0).and_then(Header::timestamp)
    }

    pub fn set_date(&mut self, timestamp: i64) {
        match self.headers_mut().get_mut("Date", 0) {
            Some(header) => header.set_timestamp(timestamp),
            None => self.headers_mut().add_date("Date", timestamp),
        }
    }

    pub fn id(&self) -> &str {
        self.entity.id()
    }

    pub fn set_id(&mut self, id: &str) -> Result<(), Error> {
        self.entity.set_id(id)
    }

    /// Give the message a new Message-ID.
    pub fn generate_id(&mut self) -> Result<String, Error> {
        self.entity.generate_id()
    }

    /// The bounce address.
    pub fn return_path(&self) -> Option<&str> {
        self.headers().get("Return-Path", 0).and_then(Header::address)
    }

    pub fn set_return_path(&mut self, address: Option<&str>) -> Result<(), Error> {
        self.headers_mut().set_model(
            "Return-Path",
            HeaderModel::Path(address.map(str::to_owned)),
        )
    }

    pub fn sender(&self) -> Option<Mailbox> {
        self.mailboxes("Sender").into_iter().next()
    }

    pub fn set_sender(&mut self, sender: Option<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("Sender", sender.into_iter().collect())
    }

    pub fn from(&self) -> Vec<Mailbox> {
        self.mailboxes("From")
    }

    pub fn set_from(&mut self, from: Vec<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("From", from)
    }

    pub fn add_from(&mut self, mailbox: impl Into<Mailbox>) -> Result<(), Error> {
        self.add_mailbox("From", mailbox.into())
    }

    pub fn reply_to(&self) -> Vec<Mailbox> {
        self.mailboxes("Reply-To")
    }

    pub fn set_reply_to(&mut self, reply_to: Vec<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("Reply-To", reply_to)
    }

    pub fn to(&self) -> Vec<Mailbox> {
        self.mailboxes("To")
    }

    pub fn set_to(&mut self, to: Vec<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("To", to)
    }

    pub fn add_to(&mut self, mailbox: impl Into<Mailbox>) -> Result<(), Error> {
        self.add_mailbox("To", mailbox.into())
    }

    pub fn cc(&self) -> Vec<Mailbox> {
        self.mailboxes("Cc")
    }

    pub fn set_cc(&mut self, cc: Vec<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("Cc", cc)
    }

    pub fn add_cc(&mut self, mailbox: impl Into<Mailbox>) -> Result<(), Error> {
        self.add_mailbox("Cc", mailbox.into())
    }

    pub fn bcc(&self) -> Vec<Mailbox> {
        self.mailboxes("Bcc")
    }

    pub fn set_bcc(&mut self, bcc: Vec<Mailbox>) -> Result<(), Error> {
        self.set_mailboxes("Bcc", bcc)
    }

    pub fn add_bcc(&mut self, mailbox: impl Into<Mailbox>) -> Result<(), Error> {
        self.add_mailbox("Bcc", mailbox.into())
    }

    /// The priority from 1 (highest) to 5 (lowest); 3 if unset.
    pub fn priority(&self) -> u8 {
        self.text("X-Priority")
            .and_then(|p| p.chars().next())
            .and_then(|c| c.to_digit(10))
            .filter(|&p| p >= 1 && p <= 5)
            .map_or(3, |p| p as u8)
    }

    /// Set the priority, clamped to 1 (highest) through 5 (lowest).
    pub fn set_priority(&mut self, priority: u8) {
        let priority = priority.max(1).min(5);
        let value = format!(
            "{} ({})",
            priority,
            PRIORITY_NAMES[usize::from(priority) - 1]
        );
        self.set_text("X-Priority", &value);
    }

    /// The addresses a read receipt is requested to be sent to.
    pub fn read_receipt_to(&self) -> Vec<Mailbox> {
        self.mailboxes("Disposition-Notification-To")
    }

    pub fn set_read_receipt_to(
        &mut self,
        addresses: Vec<Mailbox>,
    ) -> Result<(), Error> {
        self.set_mailboxes("Disposition-Notification-To", addresses)
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.entity.set_body(body);
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.entity.set_content_type(content_type);
    }

    pub fn set_charset(&mut self, charset: &str) {
        self.entity.set_charset(charset);
    }

    pub fn children(&self) -> &[MimeEntity] {
        self.entity.children()
    }

    pub fn attach(&mut self, entity: MimeEntity) {
        self.entity.add_child(entity);
    }

    /// Remove the attached entity with the given ID.
    pub fn detach(&mut self, id: &str) -> Option<MimeEntity> {
        self.entity.remove_child(id)
    }

    /// Attach `entity` and return a URL by which HTML in the message can
    /// refer to it.
    pub fn embed(&mut self, entity: MimeEntity) -> String {
        let cid = format!("cid:{}", entity.id());
        self.attach(entity);
        cid
    }

    /// The address used for `MAIL FROM`: the Return-Path, else the Sender,
    /// else the first From address.
    pub fn reverse_path(&self) -> Option<String> {
        self.return_path()
            .map(str::to_owned)
            .or_else(|| self.sender().map(|m| m.address))
            .or_else(|| self.from().into_iter().next().map(|m| m.address))
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = crate::stream::ArrayByteStream::default();
        self.to_byte_stream(&mut out)?;
        Ok(out.into_contents())
    }

    /// Render the message into `is`.
    ///
    /// If the message has both a body and children, the body is rendered as
    /// the first child.
    pub fn to_byte_stream(
        &mut self,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error> {
        if self.entity.children().is_empty() || !self.entity.has_body() {
            return self.entity.to_byte_stream(is);
        }

        let level = self
            .entity
            .children()
            .iter()
            .map(MimeEntity::nesting_level)
            .fold(self.entity.nesting_level(), max);
        let part = self.entity.body_as_part(level);
        self.entity.insert_child(0, part);

        let result = self.entity.to_byte_stream(is);

        let mut part = self.entity.remove_child_at(0);
        self.entity.restore_body(part.take_body());
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::memory_cache;
    use crate::mime::IdGenerator;

    fn factory() -> MimeFactory {
        MimeFactory::new(
            memory_cache(),
            IdGenerator::with_id_right("swallow.test"),
            "utf-8",
        )
    }

    fn render(m: &mut Message) -> String {
        String::from_utf8(m.to_bytes().unwrap()).unwrap()
    }

    fn header_names(rendered: &str) -> Vec<&str> {
        rendered
            .split("\r\n\r\n")
            .next()
            .unwrap()
            .split("\r\n")
            .filter(|l| !l.starts_with(' '))
            .map(|l| l.split(':').next().unwrap())
            .collect()
    }

    #[test]
    fn simple_message() {
        let mut m = factory().message("Greetings");
        m.add_from(("alice@example.com", "Alice")).unwrap();
        m.add_to("bob@example.com").unwrap();
        m.set_body("Hi Bob");

        let rendered = render(&mut m);
        assert_eq!(
            vec![
                "Message-ID",
                "Date",
                "Subject",
                "From",
                "To",
                "MIME-Version",
                "Content-Type",
                "Content-Transfer-Encoding",
            ],
            header_names(&rendered)
        );
        assert!(rendered.contains(&format!("Message-ID: <{}>\r\n", m.id())));
        assert!(rendered.contains("From: Alice <alice@example.com>\r\n"));
        assert!(rendered.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(rendered.ends_with("\r\n\r\nHi Bob"));
    }

    #[test]
    fn empty_from_is_still_displayed() {
        let mut m = factory().message("x");
        let rendered = render(&mut m);
        assert!(rendered.contains("\r\nFrom: \r\n"));
        assert!(!rendered.contains("\r\nTo:"));
    }

    #[test]
    fn addresses() {
        let mut m = factory().message("x");
        m.set_to(vec![Mailbox::new("a@x"), Mailbox::new("b@x")])
            .unwrap();
        m.add_cc("c@x").unwrap();
        m.add_bcc("d@x").unwrap();
        assert_eq!(2, m.to().len());
        assert_eq!("c@x", m.cc()[0].address);
        assert_eq!("d@x", m.bcc()[0].address);

        assert_matches!(
            Err(Error::RfcCompliance(_)),
            m.add_to("not-an-address")
        );
        assert_eq!(2, m.to().len());
    }

    #[test]
    fn reverse_path_precedence() {
        let mut m = factory().message("x");
        assert_eq!(None, m.reverse_path());
        m.add_from("from@x").unwrap();
        assert_eq!(Some("from@x".to_owned()), m.reverse_path());
        m.set_sender(Some(Mailbox::new("sender@x"))).unwrap();
        assert_eq!(Some("sender@x".to_owned()), m.reverse_path());
        m.set_return_path(Some("bounce@x")).unwrap();
        assert_eq!(Some("bounce@x".to_owned()), m.reverse_path());
        assert!(render(&mut m).starts_with("Return-Path: <bounce@x>\r\n"));
    }

    #[test]
    fn priority() {
        let mut m = factory().message("x");
        assert_eq!(3, m.priority());
        m.set_priority(1);
        assert_eq!(1, m.priority());
        assert!(render(&mut m).contains("X-Priority: 1 (Highest)\r\n"));
        m.set_priority(9);
        assert_eq!(5, m.priority());
        assert_eq!(Some("5 (Lowest)"), m.text("X-Priority"));
    }

    #[test]
    fn read_receipt() {
        let mut m = factory().message("x");
        m.set_read_receipt_to(vec![Mailbox::new("me@x")]).unwrap();
        assert_eq!("me@x", m.read_receipt_to()[0].address);
        assert!(render(&mut m).contains("Disposition-Notification-To: me@x\r\n"));
    }

    #[test]
    fn body_becomes_first_part_with_attachment() {
        let f = factory();
        let mut m = f.message("x");
        m.set_body("see attached");
        m.attach(f.attachment("data", Some("d.txt"), "text/plain"));

        let first = render(&mut m);
        assert_eq!("multipart/mixed", m.entity().content_type());
        let boundary = m.entity_mut().boundary().to_owned();
        let parts = first
            .split(&format!("\r\n--{}\r\n", boundary))
            .collect::<Vec<_>>();
        assert_eq!(3, parts.len());
        assert!(parts[1].starts_with("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(parts[1].ends_with("\r\n\r\nsee attached"));
        assert!(parts[2].contains("filename=d.txt"));

        // State is restored and the output is stable
        assert_eq!(1, m.children().len());
        assert_eq!(Some(&b"see attached"[..]), m.entity().body());
        assert_eq!(first, render(&mut m));
    }

    #[test]
    fn html_body_with_embedded_image() {
        let f = factory();
        let mut m = f.message("x");
        let cid = m.embed(f.embedded(vec![0x89, b'P'], Some("i.png"), "image/png"));
        assert!(cid.starts_with("cid:"));
        m.set_content_type("text/html");
        m.set_body(format!("<img src=\"{}\">", cid));

        let first = render(&mut m);
        assert_eq!("multipart/related", m.entity().content_type());
        assert!(first.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(first.contains(&format!("Content-ID: <{}>", &cid[4..])));
        assert_eq!(first, render(&mut m));
    }

    #[test]
    fn detach() {
        let f = factory();
        let mut m = f.message("x");
        let att = f.attachment("a", None, "text/plain");
        let id = att.id().to_owned();
        m.attach(att);
        assert_eq!("multipart/mixed", m.entity().content_type());
        assert!(m.detach(&id).is_some());
        assert!(m.detach(&id).is_none());
        assert_eq!("text/plain", m.entity().content_type());
    }

    #[test]
    fn new_ids() {
        let mut m = factory().message("x");
        let old = m.id().to_owned();
        let new = m.generate_id().unwrap();
        assert_ne!(old, new);
        assert_eq!(new, m.id());
        assert!(render(&mut m).contains(&format!("Message-ID: <{}>", new)));
    }
}
