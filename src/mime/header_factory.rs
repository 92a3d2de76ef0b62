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

use super::header::{Header, HeaderModel, Mailbox};
use crate::encoder::{HeaderEncoder, Rfc2231Encoder};
use crate::support::error::Error;

/// Creates headers configured with a common charset and encoders.
#[derive(Clone, Debug)]
pub struct HeaderFactory {
    charset: String,
    encoder: HeaderEncoder,
    param_encoder: Rfc2231Encoder,
}

impl Default for HeaderFactory {
    fn default() -> Self {
        HeaderFactory::new("utf-8")
    }
}

impl HeaderFactory {
    pub fn new(charset: &str) -> Self {
        HeaderFactory {
            charset: charset.to_owned(),
            encoder: HeaderEncoder::Q,
            param_encoder: Rfc2231Encoder::new(charset),
        }
    }

    pub fn with_encoder(mut self, encoder: HeaderEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn charset_changed(&mut self, charset: &str) {
        self.charset = charset.to_owned();
        self.param_encoder.set_charset(charset);
    }

    /// Bring `header` in line with this factory's settings.
    pub fn configure(&self, header: &mut Header) {
        header.set_charset(&self.charset);
        header.set_encoder(self.encoder);
        // Content-Type parameters are left to encoded words since many
        // clients do not understand RFC 2231 there.
        if header.name().eq_ignore_ascii_case("Content-Disposition") {
            header.set_param_encoder(Some(self.param_encoder.clone()));
        }
    }

    fn configured(&self, mut header: Header) -> Header {
        self.configure(&mut header);
        header
    }

    pub fn create(
        &self,
        name: &str,
        model: HeaderModel,
    ) -> Result<Header, Error> {
        Header::new(name, model).map(|h| self.configured(h))
    }

    pub fn create_text(&self, name: &str, value: &str) -> Header {
        self.configured(Header::text(name, value))
    }

    pub fn create_parameterized(
        &self,
        name: &str,
        value: &str,
        params: &[(&str, &str)],
    ) -> Header {
        self.configured(Header::parameterized(name, value, params))
    }

    pub fn create_mailbox(
        &self,
        name: &str,
        mailboxes: Vec<Mailbox>,
    ) -> Result<Header, Error> {
        Header::mailbox(name, mailboxes).map(|h| self.configured(h))
    }

    pub fn create_date(&self, name: &str, timestamp: i64) -> Header {
        self.configured(Header::date(name, timestamp))
    }

    pub fn create_id(
        &self,
        name: &str,
        ids: Vec<String>,
    ) -> Result<Header, Error> {
        Header::id(name, ids).map(|h| self.configured(h))
    }

    pub fn create_path(
        &self,
        name: &str,
        address: Option<&str>,
    ) -> Result<Header, Error> {
        Header::path(name, address).map(|h| self.configured(h))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_disposition_gets_rfc2231() {
        let factory = HeaderFactory::new("utf-8");
        let ct = factory.create_parameterized(
            "Content-Type",
            "text/plain",
            &[("name", "für.txt")],
        );
        assert!(ct.field_body().contains("name=\"=?utf-8?Q?"));

        let cd = factory.create_parameterized(
            "Content-Disposition",
            "attachment",
            &[("filename", "für.txt")],
        );
        assert_eq!(
            "attachment; filename*=utf-8''f%C3%BCr.txt",
            cd.field_body()
        );
    }

    #[test]
    fn charset_applies_to_new_headers() {
        let mut factory = HeaderFactory::new("utf-8");
        factory.charset_changed("iso-8859-1");
        let h = factory.create_text("Subject", "é");
        assert_eq!("iso-8859-1", h.charset());
        assert_eq!("=?iso-8859-1?Q?=E9?=", h.field_body());

        let factory = factory.with_encoder(HeaderEncoder::B);
        assert_eq!(
            "=?iso-8859-1?B?6Q==?=",
            factory.create_text("Subject", "é").field_body()
        );
    }
}
