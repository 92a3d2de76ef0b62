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

//! An ordered collection of headers.

use std::fmt;

use super::header::{Header, HeaderModel, Mailbox};
use super::header_factory::HeaderFactory;
use crate::support::error::Error;

/// The headers of one MIME entity.
///
/// Headers are grouped by case-insensitive name; a name may occur several
/// times. When rendered, groups are sorted by the configured display order,
/// with names not in the order coming last in the order they were first
/// added. Headers with an empty field body are omitted unless their name is
/// configured to always be displayed.
#[derive(Clone, Debug, Default)]
pub struct HeaderSet {
    factory: HeaderFactory,
    groups: Vec<(String, Vec<Header>)>,
    order: Vec<String>,
    always_displayed: Vec<String>,
}

impl HeaderSet {
    pub fn new(factory: HeaderFactory) -> Self {
        HeaderSet {
            factory,
            groups: Vec::new(),
            order: Vec::new(),
            always_displayed: Vec::new(),
        }
    }

    pub fn factory(&self) -> &HeaderFactory {
        &self.factory
    }

    pub fn charset(&self) -> &str {
        self.factory.charset()
    }

    /// Change the charset of every header, and of headers added later.
    pub fn charset_changed(&mut self, charset: &str) {
        self.factory.charset_changed(charset);
        for header in self.groups.iter_mut().flat_map(|g| g.1.iter_mut()) {
            header.set_charset(charset);
        }
    }

    /// Set the names, in display order, of headers to be rendered first.
    pub fn define_ordering(&mut self, names: &[&str]) {
        self.order = names.iter().map(|n| n.to_ascii_lowercase()).collect();
    }

    /// Set the names of headers rendered even when their body is empty.
    pub fn set_always_displayed(&mut self, names: &[&str]) {
        self.always_displayed =
            names.iter().map(|n| n.to_ascii_lowercase()).collect();
    }

    /// Add `header` after any other headers of the same name.
    pub fn add(&mut self, mut header: Header) {
        self.factory.configure(&mut header);
        let key = header.name().to_ascii_lowercase();
        match self.groups.iter_mut().find(|g| g.0 == key) {
            Some(group) => group.1.push(header),
            None => self.groups.push((key, vec![header])),
        }
    }

    pub fn add_text(&mut self, name: &str, value: &str) {
        self.add(Header::text(name, value));
    }

    pub fn add_parameterized(
        &mut self,
        name: &str,
        value: &str,
        params: &[(&str, &str)],
    ) {
        self.add(Header::parameterized(name, value, params));
    }

    pub fn add_mailbox(
        &mut self,
        name: &str,
        mailboxes: Vec<Mailbox>,
    ) -> Result<(), Error> {
        self.add(Header::mailbox(name, mailboxes)?);
        Ok(())
    }

    pub fn add_date(&mut self, name: &str, timestamp: i64) {
        self.add(Header::date(name, timestamp));
    }

    pub fn add_id(&mut self, name: &str, ids: Vec<String>) -> Result<(), Error> {
        self.add(Header::id(name, ids)?);
        Ok(())
    }

    pub fn add_path(
        &mut self,
        name: &str,
        address: Option<&str>,
    ) -> Result<(), Error> {
        self.add(Header::path(name, address)?);
        Ok(())
    }

    fn group(&self, name: &str) -> Option<&Vec<Header>> {
        self.groups
            .iter()
            .find(|g| g.0.eq_ignore_ascii_case(name))
            .map(|g| &g.1)
    }

    fn group_mut(&mut self, name: &str) -> Option<&mut Vec<Header>> {
        self.groups
            .iter_mut()
            .find(|g| g.0.eq_ignore_ascii_case(name))
            .map(|g| &mut g.1)
    }

    pub fn has(&self, name: &str, index: usize) -> bool {
        self.get(name, index).is_some()
    }

    pub fn get(&self, name: &str, index: usize) -> Option<&Header> {
        self.group(name).and_then(|g| g.get(index))
    }

    pub fn get_mut(&mut self, name: &str, index: usize) -> Option<&mut Header> {
        self.group_mut(name).and_then(|g| g.get_mut(index))
    }

    /// All headers called `name`, in the order added.
    pub fn get_all(&self, name: &str) -> &[Header] {
        self.group(name).map_or(&[], Vec::as_slice)
    }

    /// Every header, grouped by name in the order names were first added.
    pub fn all(&self) -> impl Iterator<Item = &Header> {
        self.groups.iter().flat_map(|g| g.1.iter())
    }

    /// The distinct names present, as first added.
    pub fn list_all(&self) -> Vec<&str> {
        self.groups
            .iter()
            .filter_map(|g| g.1.first())
            .map(Header::name)
            .collect()
    }

    pub fn remove(&mut self, name: &str, index: usize) -> Option<Header> {
        let group = self.group_mut(name)?;
        if index >= group.len() {
            return None;
        }

        let removed = group.remove(index);
        if group.is_empty() {
            self.groups.retain(|g| !g.1.is_empty());
        }
        Some(removed)
    }

    pub fn remove_all(&mut self, name: &str) {
        self.groups.retain(|g| !g.0.eq_ignore_ascii_case(name));
    }

    /// Replace the model of the first header called `name`, or add a header
    /// with that model if there is none.
    pub fn set_model(
        &mut self,
        name: &str,
        model: HeaderModel,
    ) -> Result<(), Error> {
        match self.get_mut(name, 0) {
            Some(header) => header.set_model(model),
            None => {
                let header = self.factory.create(name, model)?;
                self.add(header);
                Ok(())
            }
        }
    }

    fn display_rank(&self, key: &str) -> usize {
        self.order
            .iter()
            .position(|o| o == key)
            .unwrap_or(self.order.len())
    }

    /// The headers in display order, including empty ones.
    pub fn sorted(&self) -> Vec<&Header> {
        let mut groups = self.groups.iter().collect::<Vec<_>>();
        groups.sort_by_key(|g| self.display_rank(&g.0));
        groups.into_iter().flat_map(|g| g.1.iter()).collect()
    }
}

impl fmt::Display for HeaderSet {
    /// The header block, without the blank line that ends it.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for header in self.sorted() {
            let key = header.name().to_ascii_lowercase();
            if header.field_body().is_empty()
                && !self.always_displayed.contains(&key)
            {
                continue;
            }

            write!(f, "{}", header)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set() -> HeaderSet {
        let mut hs = HeaderSet::new(HeaderFactory::default());
        hs.add_text("X-Custom", "foo");
        hs.add_text("Subject", "Hello");
        hs.add_mailbox("To", vec![Mailbox::new("a@example.com")])
            .unwrap();
        hs.add_text("x-custom", "bar");
        hs
    }

    #[test]
    fn lookup_by_name_and_index() {
        let hs = set();
        assert!(hs.has("x-CUSTOM", 0));
        assert!(hs.has("X-Custom", 1));
        assert!(!hs.has("X-Custom", 2));
        assert_eq!(Some("bar"), hs.get("X-Custom", 1).and_then(Header::value));
        assert_eq!(2, hs.get_all("x-custom").len());
        assert_eq!(vec!["X-Custom", "Subject", "To"], hs.list_all());
    }

    #[test]
    fn removal() {
        let mut hs = set();
        let removed = hs.remove("X-Custom", 0).unwrap();
        assert_eq!(Some("foo"), removed.value());
        assert_eq!(Some("bar"), hs.get("X-Custom", 0).and_then(Header::value));
        assert!(hs.remove("X-Custom", 5).is_none());
        hs.remove_all("subject");
        assert!(!hs.has("Subject", 0));
        hs.remove("X-Custom", 0);
        assert_eq!(vec!["To"], hs.list_all());
    }

    #[test]
    fn ordering() {
        let mut hs = set();
        hs.define_ordering(&["To", "Subject"]);
        assert_eq!(
            "To: a@example.com\r\n\
             Subject: Hello\r\n\
             X-Custom: foo\r\n\
             x-custom: bar\r\n",
            hs.to_string()
        );
    }

    #[test]
    fn empty_headers_hidden_unless_always_displayed() {
        let mut hs = HeaderSet::new(HeaderFactory::default());
        hs.add_text("Subject", "");
        hs.add_mailbox("To", vec![]).unwrap();
        assert_eq!("", hs.to_string());

        hs.set_always_displayed(&["subject"]);
        assert_eq!("Subject: \r\n", hs.to_string());
    }

    #[test]
    fn charset_propagates() {
        let mut hs = set();
        hs.add_text("Comments", "é");
        hs.charset_changed("iso-8859-1");
        assert_eq!(
            "=?iso-8859-1?Q?=E9?=",
            hs.get("Comments", 0).unwrap().field_body()
        );
        hs.add_text("Keywords", "é");
        assert_eq!("iso-8859-1", hs.get("Keywords", 0).unwrap().charset());
    }

    #[test]
    fn set_model_adds_or_replaces() {
        let mut hs = HeaderSet::default();
        hs.set_model("Subject", HeaderModel::Text("a".to_owned()))
            .unwrap();
        hs.set_model("Subject", HeaderModel::Text("b".to_owned()))
            .unwrap();
        assert_eq!(1, hs.get_all("Subject").len());
        assert_eq!("b", hs.get("Subject", 0).unwrap().field_body());
        assert!(hs
            .set_model("To", HeaderModel::Mailbox(vec![Mailbox::new("bad")]))
            .is_err());
        assert!(!hs.has("To", 0));
    }
}
