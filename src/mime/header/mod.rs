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

//! Typed header fields.
//!
//! Every header has a name and a typed model of its field body. The model is
//! rendered to a field body on demand (and cached until something changes),
//! then tokenised and folded into the final header text.

mod fold;
mod params;

use std::cell::RefCell;
use std::fmt;

use chrono::prelude::*;

use super::grammar;
use crate::encoder::{HeaderEncoder, Rfc2231Encoder};
use crate::support::error::Error;

use self::fold::WordEncoding;
use self::params::ParamContext;

/// The default maximum length of a header line, CRLF excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 78;
/// The line length used once any encoded word is present.
const ENCODED_MAX_LINE_LENGTH: usize = 76;

/// An address with an optional display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: &str) -> Self {
        Mailbox {
            address: address.to_owned(),
            name: None,
        }
    }

    pub fn with_name(address: &str, name: &str) -> Self {
        Mailbox {
            address: address.to_owned(),
            name: Some(name.to_owned()),
        }
    }
}

impl From<&str> for Mailbox {
    fn from(address: &str) -> Self {
        Mailbox::new(address)
    }
}

impl From<(&str, &str)> for Mailbox {
    fn from((address, name): (&str, &str)) -> Self {
        Mailbox::with_name(address, name)
    }
}

/// The typed content of a header's field body.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderModel {
    /// Unstructured text, such as Subject.
    Text(String),
    /// A value followed by `; name=value` parameters, such as Content-Type.
    Parameterized {
        value: String,
        params: Vec<(String, String)>,
    },
    /// A list of mailboxes, such as To.
    Mailbox(Vec<Mailbox>),
    /// A UNIX timestamp, such as Date.
    Date(i64),
    /// A list of message IDs, without angle brackets.
    Id(Vec<String>),
    /// A single address in angle brackets, such as Return-Path.
    Path(Option<String>),
}

#[derive(Clone, Debug)]
struct RenderedBody {
    body: String,
    encoded: bool,
}

#[derive(Clone, Debug)]
pub struct Header {
    name: String,
    model: HeaderModel,
    charset: String,
    language: Option<String>,
    encoder: HeaderEncoder,
    param_encoder: Option<Rfc2231Encoder>,
    max_line_length: usize,
    cached: RefCell<Option<RenderedBody>>,
}

impl Header {
    /// Create a header with the given model, validating it first.
    pub fn new(name: &str, model: HeaderModel) -> Result<Self, Error> {
        validate(&model)?;
        Ok(Header {
            name: name.to_owned(),
            model,
            charset: "utf-8".to_owned(),
            language: None,
            encoder: HeaderEncoder::Q,
            param_encoder: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            cached: RefCell::new(None),
        })
    }

    fn unchecked(name: &str, model: HeaderModel) -> Self {
        Header {
            name: name.to_owned(),
            model,
            charset: "utf-8".to_owned(),
            language: None,
            encoder: HeaderEncoder::Q,
            param_encoder: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            cached: RefCell::new(None),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Header::unchecked(name, HeaderModel::Text(value.to_owned()))
    }

    pub fn parameterized(
        name: &str,
        value: &str,
        params: &[(&str, &str)],
    ) -> Self {
        let params = params
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Header::unchecked(
            name,
            HeaderModel::Parameterized {
                value: value.to_owned(),
                params,
            },
        )
    }

    pub fn mailbox(name: &str, mailboxes: Vec<Mailbox>) -> Result<Self, Error> {
        Header::new(name, HeaderModel::Mailbox(dedup_mailboxes(mailboxes)))
    }

    pub fn date(name: &str, timestamp: i64) -> Self {
        Header::unchecked(name, HeaderModel::Date(timestamp))
    }

    pub fn id(name: &str, ids: Vec<String>) -> Result<Self, Error> {
        Header::new(name, HeaderModel::Id(ids))
    }

    pub fn path(name: &str, address: Option<&str>) -> Result<Self, Error> {
        Header::new(name, HeaderModel::Path(address.map(str::to_owned)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &HeaderModel {
        &self.model
    }

    /// Replace the model entirely, possibly with one of a different kind.
    pub fn set_model(&mut self, model: HeaderModel) -> Result<(), Error> {
        validate(&model)?;
        self.model = match model {
            HeaderModel::Mailbox(m) => HeaderModel::Mailbox(dedup_mailboxes(m)),
            m => m,
        };
        self.invalidate();
        Ok(())
    }

    /// The value of a text or parameterized header.
    pub fn value(&self) -> Option<&str> {
        match self.model {
            HeaderModel::Text(ref v) => Some(v),
            HeaderModel::Parameterized { ref value, .. } => Some(value),
            _ => None,
        }
    }

    /// Set the value of a text or parameterized header. Has no effect on
    /// other kinds.
    pub fn set_value(&mut self, v: &str) {
        match self.model {
            HeaderModel::Text(ref mut value)
            | HeaderModel::Parameterized { ref mut value, .. } => {
                *value = v.to_owned();
            }
            _ => return,
        }
        self.invalidate();
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        match self.model {
            HeaderModel::Parameterized { ref params, .. } => params
                .iter()
                .find(|&&(ref k, _)| k.eq_ignore_ascii_case(name))
                .map(|&(_, ref v)| v.as_str()),
            _ => None,
        }
    }

    /// Set (or with `None`, remove) a parameter of a parameterized header.
    /// Has no effect on other kinds.
    pub fn set_parameter(&mut self, name: &str, value: Option<&str>) {
        let params = match self.model {
            HeaderModel::Parameterized { ref mut params, .. } => params,
            _ => return,
        };

        let existing = params
            .iter()
            .position(|&(ref k, _)| k.eq_ignore_ascii_case(name));
        match (existing, value) {
            (Some(ix), Some(v)) => params[ix].1 = v.to_owned(),
            (Some(ix), None) => {
                params.remove(ix);
            }
            (None, Some(v)) => params.push((name.to_owned(), v.to_owned())),
            (None, None) => return,
        }
        self.invalidate();
    }

    pub fn mailboxes(&self) -> &[Mailbox] {
        match self.model {
            HeaderModel::Mailbox(ref m) => m,
            _ => &[],
        }
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.mailboxes()
            .iter()
            .map(|m| m.address.as_str())
            .collect()
    }

    pub fn set_mailboxes(&mut self, mailboxes: Vec<Mailbox>) -> Result<(), Error> {
        self.set_model(HeaderModel::Mailbox(mailboxes))
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self.model {
            HeaderModel::Date(t) => Some(t),
            _ => None,
        }
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.model = HeaderModel::Date(timestamp);
        self.invalidate();
    }

    pub fn ids(&self) -> &[String] {
        match self.model {
            HeaderModel::Id(ref ids) => ids,
            _ => &[],
        }
    }

    pub fn set_ids(&mut self, ids: Vec<String>) -> Result<(), Error> {
        self.set_model(HeaderModel::Id(ids))
    }

    /// The address of a path header.
    pub fn address(&self) -> Option<&str> {
        match self.model {
            HeaderModel::Path(ref a) => a.as_deref(),
            _ => None,
        }
    }

    pub fn set_address(&mut self, address: Option<&str>) -> Result<(), Error> {
        self.set_model(HeaderModel::Path(address.map(str::to_owned)))
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn set_charset(&mut self, charset: &str) {
        if self.charset != charset {
            self.charset = charset.to_owned();
            if let Some(ref mut pe) = self.param_encoder {
                pe.set_charset(charset);
            }
            self.invalidate();
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: Option<&str>) {
        self.language = language.map(str::to_owned);
        self.invalidate();
    }

    pub fn encoder(&self) -> HeaderEncoder {
        self.encoder
    }

    pub fn set_encoder(&mut self, encoder: HeaderEncoder) {
        self.encoder = encoder;
        self.invalidate();
    }

    /// Use RFC 2231 encoding for long or non-ASCII parameter values instead
    /// of encoded words.
    pub fn set_param_encoder(&mut self, encoder: Option<Rfc2231Encoder>) {
        self.param_encoder = encoder;
        self.invalidate();
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn set_max_line_length(&mut self, max: usize) {
        self.max_line_length = max;
        self.invalidate();
    }

    fn invalidate(&self) {
        *self.cached.borrow_mut() = None;
    }

    fn word_encoding(&self) -> WordEncoding<'_> {
        WordEncoding {
            field_name: &self.name,
            charset: &self.charset,
            language: self.language.as_deref(),
            encoder: self.encoder,
        }
    }

    /// The field body as it appears after the colon, before folding.
    pub fn field_body(&self) -> String {
        self.rendered().body
    }

    fn rendered(&self) -> RenderedBody {
        if let Some(ref r) = *self.cached.borrow() {
            return r.clone();
        }

        let r = self.render_body();
        *self.cached.borrow_mut() = Some(r.clone());
        r
    }

    fn render_body(&self) -> RenderedBody {
        let enc = self.word_encoding();
        let (body, encoded) = match self.model {
            HeaderModel::Text(ref value) => fold::encode_words(value, None, &enc),

            HeaderModel::Parameterized { ref value, ref params } => {
                let (mut body, encoded) = fold::encode_words(value, None, &enc);
                for &(ref name, ref value) in params {
                    body.push_str("; ");
                    body.push_str(&self.render_parameter(name, value));
                }
                (body, encoded)
            }

            HeaderModel::Mailbox(ref mailboxes) => {
                let mut encoded = false;
                let body = mailboxes
                    .iter()
                    .enumerate()
                    .map(|(ix, m)| match m.name {
                        None => m.address.clone(),
                        Some(ref name) => {
                            let (phrase, e) = fold::phrase(name, 0 == ix, &enc);
                            encoded |= e;
                            format!("{} <{}>", phrase, m.address)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                (body, encoded)
            }

            HeaderModel::Date(timestamp) => (format_date(timestamp), false),

            HeaderModel::Id(ref ids) => (
                ids.iter()
                    .map(|id| format!("<{}>", id))
                    .collect::<Vec<_>>()
                    .join(" "),
                false,
            ),

            HeaderModel::Path(ref address) => (
                address
                    .as_ref()
                    .map(|a| format!("<{}>", a))
                    .unwrap_or_default(),
                false,
            ),
        };

        RenderedBody { body, encoded }
    }

    fn render_parameter(&self, name: &str, value: &str) -> String {
        params::render_parameter(
            name,
            value,
            &ParamContext {
                words: self.word_encoding(),
                max_line_length: self.max_line_length,
                rfc2231: self.param_encoder.as_ref(),
            },
        )
    }

    fn tokens(&self, rendered: &RenderedBody) -> Vec<String> {
        match self.model {
            HeaderModel::Parameterized { ref value, ref params } => {
                let (value, _) =
                    fold::encode_words(value, None, &self.word_encoding());
                let mut tokens = fold::tokenize(&value);
                for &(ref name, ref value) in params {
                    if let Some(last) = tokens.last_mut() {
                        last.push(';');
                    }
                    let param = format!(" {}", self.render_parameter(name, value));
                    tokens.extend(fold::split_lines(&param));
                }
                tokens
            }

            _ => fold::tokenize(&rendered.body),
        }
    }
}

impl fmt::Display for Header {
    /// The complete, folded header including the trailing CRLF.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered = self.rendered();
        let max = if rendered.encoded {
            ENCODED_MAX_LINE_LENGTH.min(self.max_line_length)
        } else {
            self.max_line_length
        };
        f.write_str(&fold::fold(&self.name, &self.tokens(&rendered), max))
    }
}

fn validate(model: &HeaderModel) -> Result<(), Error> {
    match *model {
        HeaderModel::Mailbox(ref mailboxes) => {
            for m in mailboxes {
                if !grammar::is_addr_spec(&m.address) {
                    return Err(Error::RfcCompliance(format!(
                        "Address in mailbox given [{}] does not comply \
                         with RFC 2822, 3.6.2.",
                        m.address
                    )));
                }
            }
        }

        HeaderModel::Id(ref ids) => {
            for id in ids {
                if !grammar::is_msg_id(id) {
                    return Err(Error::RfcCompliance(format!(
                        "Invalid ID given <{}>",
                        id
                    )));
                }
            }
        }

        HeaderModel::Path(Some(ref address)) => {
            if !grammar::is_addr_spec(address) {
                return Err(Error::RfcCompliance(format!(
                    "Address set in path header [{}] does not comply with \
                     addr-spec of RFC 2822.",
                    address
                )));
            }
        }

        _ => (),
    }

    Ok(())
}

/// Collapse repeated addresses into their first position, keeping the last
/// name given.
fn dedup_mailboxes(mailboxes: Vec<Mailbox>) -> Vec<Mailbox> {
    let mut out: Vec<Mailbox> = Vec::with_capacity(mailboxes.len());
    for m in mailboxes {
        match out.iter_mut().find(|e| e.address == m.address) {
            Some(existing) => existing.name = m.name,
            None => out.push(m),
        }
    }
    out
}

fn format_date(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).earliest() {
        Some(dt) => dt.to_rfc2822(),
        None => Utc.timestamp_opt(timestamp, 0)
            .earliest()
            .map(|dt| dt.to_rfc2822())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_header() {
        let h = Header::text("Subject", "Hello there");
        assert_eq!("Hello there", h.field_body());
        assert_eq!("Subject: Hello there\r\n", h.to_string());
    }

    #[test]
    fn encoded_text_header() {
        let h = Header::text("Subject", "Grüße aus Köln");
        assert_eq!(
            "Subject: =?utf-8?Q?Gr=C3=BC=C3=9Fe?= aus =?utf-8?Q?K=C3=B6ln?=\r\n",
            h.to_string()
        );

        let mut h = h;
        h.set_encoder(HeaderEncoder::B);
        h.set_value("Köln");
        assert_eq!("=?utf-8?B?S8O2bG4=?=", h.field_body());
    }

    #[test]
    fn long_subject_folds() {
        let subject = "This is a rather long subject line that cannot \
                       possibly fit on a single line of a header, so it \
                       must be folded";
        let h = Header::text("Subject", subject);
        let rendered = h.to_string();
        for line in rendered.trim_end_matches("\r\n").split("\r\n") {
            assert!(line.len() <= 78, "{:?}", line);
        }
        assert_eq!(
            format!("Subject: {}", subject),
            rendered.trim_end_matches("\r\n").replace("\r\n", "")
        );
    }

    #[test]
    fn long_encoded_subject_uses_several_words() {
        let h = Header::text("Subject", &"ü".repeat(50));
        let rendered = h.to_string();
        let lines = rendered.trim_end_matches("\r\n").split("\r\n");
        for line in lines {
            assert!(line.len() <= 76, "{:?}", line);
        }
        assert!(rendered.contains("?=\r\n =?utf-8?Q?"));
    }

    #[test]
    fn parameterized_header() {
        let mut h = Header::parameterized(
            "Content-Type",
            "text/plain",
            &[("charset", "utf-8")],
        );
        assert_eq!("text/plain; charset=utf-8", h.field_body());
        assert_eq!(Some("utf-8"), h.parameter("CHARSET"));

        h.set_parameter("format", Some("flowed"));
        h.set_parameter("charset", None);
        assert_eq!("text/plain; format=flowed", h.field_body());
        assert_eq!(
            "Content-Type: text/plain; format=flowed\r\n",
            h.to_string()
        );
    }

    #[test]
    fn disposition_with_long_filename() {
        let mut h = Header::parameterized(
            "Content-Disposition",
            "attachment",
            &[("filename", &"a".repeat(100))],
        );
        h.set_param_encoder(Some(Rfc2231Encoder::new("utf-8")));
        let rendered = h.to_string();
        assert!(rendered.starts_with(
            "Content-Disposition: attachment;\r\n filename*0*=utf-8''"
        ));
        assert!(rendered.contains(";\r\n filename*1*=aaa"));
        assert!(rendered.ends_with("aaa\r\n"));
    }

    #[test]
    fn mailbox_header() {
        let h = Header::mailbox(
            "To",
            vec![
                Mailbox::with_name("a@example.com", "Alice Example"),
                Mailbox::new("b@example.com"),
                Mailbox::with_name("c@example.com", "Carol, Jr."),
                Mailbox::with_name("d@example.com", "Dörte"),
            ],
        )
        .unwrap();
        assert_eq!(
            "Alice Example <a@example.com>, b@example.com, \
             \"Carol, Jr.\" <c@example.com>, \
             =?utf-8?Q?D=C3=B6rte?= <d@example.com>",
            h.field_body()
        );
        assert_eq!(vec!["a@example.com", "b@example.com", "c@example.com", "d@example.com"], h.addresses());
    }

    #[test]
    fn mailbox_validation() {
        assert_matches!(
            Err(Error::RfcCompliance(_)),
            Header::mailbox("To", vec![Mailbox::new("not an address")])
        );

        let mut h = Header::mailbox("To", vec![]).unwrap();
        assert_matches!(
            Err(Error::RfcCompliance(_)),
            h.set_mailboxes(vec![Mailbox::new("x@y"), Mailbox::new("@bad")])
        );
        assert!(h.mailboxes().is_empty());
    }

    #[test]
    fn duplicate_mailboxes_collapse() {
        let h = Header::mailbox(
            "To",
            vec![
                Mailbox::new("a@x"),
                Mailbox::new("b@x"),
                Mailbox::with_name("a@x", "A"),
            ],
        )
        .unwrap();
        assert_eq!("A <a@x>, b@x", h.field_body());
    }

    #[test]
    fn id_and_path_headers() {
        let h = Header::id("Message-ID", vec!["abc@example.com".to_owned()])
            .unwrap();
        assert_eq!("Message-ID: <abc@example.com>\r\n", h.to_string());
        assert!(Header::id("Message-ID", vec!["abc".to_owned()]).is_err());

        let mut h = Header::path("Return-Path", Some("bounce@example.com"))
            .unwrap();
        assert_eq!("<bounce@example.com>", h.field_body());
        assert_matches!(
            Err(Error::RfcCompliance(_)),
            h.set_address(Some("bounce"))
        );
        h.set_address(None).unwrap();
        assert_eq!("", h.field_body());
    }

    #[test]
    fn date_header() {
        let h = Header::date("Date", 1_000_000_000);
        let parsed = DateTime::parse_from_rfc2822(&h.field_body()).unwrap();
        assert_eq!(1_000_000_000, parsed.timestamp());
    }

    #[test]
    fn charset_change_invalidates() {
        let mut h = Header::text("Subject", "é");
        assert_eq!("=?utf-8?Q?=C3=A9?=", h.field_body());
        h.set_charset("iso-8859-1");
        assert_eq!("=?iso-8859-1?Q?=E9?=", h.field_body());
    }
}
