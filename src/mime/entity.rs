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

//! The MIME entity tree.
//!
//! An entity is a leaf with a body, or a multipart container of other
//! entities. The caller gives an entity a flat list of children, each with a
//! nesting level saying how deep in the structure it belongs; the entity
//! works out which `multipart/*` types are needed and wraps deeper children
//! in intermediate groups automatically.
//!
//! Encoded leaf bodies are stored in the key cache under the entity's own
//! namespace, so rendering the same tree repeatedly only encodes each body
//! once.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use log::error;

use super::grammar;
use super::header::{Header, HeaderModel};
use super::header_factory::HeaderFactory;
use super::header_set::HeaderSet;
use super::id_gen::{generate_boundary, random_hex, IdGenerator};
use super::MimeFactory;
use crate::cache::{CacheInputStream, SharedCache};
use crate::encoder::ContentEncoder;
use crate::stream::{
    ArrayByteStream, InputByteStream, OutputByteStream, SharedInputStream,
};
use crate::support::error::Error;

bitflags! {
    /// How deeply an entity nests within a message, outermost first.
    pub struct NestingLevel: u32 {
        /// The message itself.
        const TOP = 16;
        /// Attachments, in `multipart/mixed`.
        const MIXED = 256;
        /// Alternative renditions of the text, in `multipart/alternative`.
        const ALTERNATIVE = 4096;
        /// Inline resources of an HTML part, in `multipart/related`.
        const RELATED = 65536;
    }
}

const BODY_ITEM: &str = "body";

/// The body of a leaf entity.
pub enum Body {
    Bytes(Vec<u8>),
    /// Read from the start each time the body is encoded.
    Stream(Box<dyn OutputByteStream>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Body::Bytes(ref b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// One immediate child in the rendered structure.
#[derive(Debug)]
enum Slot {
    /// An index into `children`.
    Child(usize),
    /// A synthetic container for children nested deeper than their
    /// siblings.
    Group(Box<Group>),
}

#[derive(Debug)]
struct Group {
    level: NestingLevel,
    content_type: &'static str,
    boundary: String,
    slots: Vec<Slot>,
}

pub struct MimeEntity {
    headers: HeaderSet,
    body: Option<Body>,
    encoder: Box<dyn ContentEncoder>,
    cache: SharedCache,
    cache_key: String,
    owns_cache: bool,
    ids: IdGenerator,
    id: String,
    id_field: &'static str,
    nesting_level: NestingLevel,
    max_line_length: usize,

    // What the caller asked for, as opposed to what the headers currently
    // say while the entity has children
    user_content_type: String,
    user_charset: Option<String>,
    user_format: Option<String>,
    user_delsp: bool,

    children: Vec<MimeEntity>,
    layout: Vec<Slot>,
    boundary: Option<String>,
    // Reused in order by the groups of each layout, so that re-laying-out
    // the same children reproduces the same output
    group_boundaries: Vec<String>,
}

impl fmt::Debug for MimeEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MimeEntity")
            .field("id", &self.id)
            .field("content_type", &self.content_type())
            .field("nesting_level", &self.nesting_level)
            .field("children", &self.children)
            .finish()
    }
}

impl Drop for MimeEntity {
    fn drop(&mut self) {
        if !self.owns_cache {
            return;
        }

        if let Ok(mut cache) = self.cache.try_borrow_mut() {
            if let Err(e) = cache.clear_all(&self.cache_key) {
                error!("Failed to clear cache for entity {}: {}", self.id, e);
            }
        }
    }
}

impl MimeEntity {
    pub(super) fn build(
        cx: &MimeFactory,
        content_type: &str,
        encoder: Box<dyn ContentEncoder>,
        nesting_level: NestingLevel,
    ) -> Self {
        let mut headers = HeaderSet::new(cx.headers.clone());
        headers.define_ordering(&["Content-Type", "Content-Transfer-Encoding"]);
        headers.set_always_displayed(&["Content-Type"]);
        headers.add_parameterized("Content-Type", content_type, &[]);
        headers.add_text("Content-Transfer-Encoding", encoder.name());

        MimeEntity {
            headers,
            body: None,
            encoder,
            cache: Rc::clone(&cx.cache),
            cache_key: random_hex(32),
            owns_cache: true,
            id: cx.ids.generate_id(),
            ids: cx.ids.clone(),
            id_field: "Content-ID",
            nesting_level,
            max_line_length: cx.max_line_length,
            user_content_type: content_type.to_owned(),
            user_charset: None,
            user_format: None,
            user_delsp: false,
            children: Vec::new(),
            layout: Vec::new(),
            boundary: None,
            group_boundaries: Vec::new(),
        }
    }

    /// A plain entity, encoded in base64, using a private memory cache.
    pub fn new() -> Self {
        MimeFactory::default().entity()
    }

    /// A text part, encoded in quoted-printable, using a private memory
    /// cache.
    pub fn part(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        MimeFactory::default().part(body, content_type)
    }

    /// An attachment, using a private memory cache.
    pub fn attachment(
        data: impl Into<Vec<u8>>,
        filename: Option<&str>,
        content_type: &str,
    ) -> Self {
        MimeFactory::default().attachment(data, filename, content_type)
    }

    /// An inline file, using a private memory cache.
    pub fn embedded(
        data: impl Into<Vec<u8>>,
        filename: Option<&str>,
        content_type: &str,
    ) -> Self {
        MimeFactory::default().embedded(data, filename, content_type)
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderSet {
        &mut self.headers
    }

    pub fn nesting_level(&self) -> NestingLevel {
        self.nesting_level
    }

    pub fn set_nesting_level(&mut self, level: NestingLevel) {
        self.nesting_level = level;
    }

    /// The media type currently in effect, which is a `multipart/*` type if
    /// the entity has children.
    pub fn content_type(&self) -> &str {
        self.headers
            .get("Content-Type", 0)
            .and_then(Header::value)
            .unwrap_or(&self.user_content_type)
    }

    /// Set the media type used whenever the entity has no children.
    pub fn set_content_type(&mut self, content_type: &str) {
        self.user_content_type = content_type.to_owned();
        if self.layout.is_empty() {
            self.set_content_type_value(content_type);
        }
    }

    fn set_content_type_value(&mut self, value: &str) {
        match self.headers.get_mut("Content-Type", 0) {
            Some(header) => header.set_value(value),
            None => self.headers.add_parameterized("Content-Type", value, &[]),
        }
    }

    fn set_content_type_param(&mut self, name: &str, value: Option<&str>) {
        if let Some(header) = self.headers.get_mut("Content-Type", 0) {
            header.set_parameter(name, value);
        }
    }

    pub fn charset(&self) -> Option<&str> {
        self.user_charset.as_deref()
    }

    /// Set the charset of the body, updating the encoder and headers of this
    /// entity and all its descendants.
    pub fn set_charset(&mut self, charset: &str) {
        self.user_charset = Some(charset.to_owned());
        if self.layout.is_empty() {
            self.set_content_type_param("charset", Some(charset));
        }
        self.charset_changed(charset);
    }

    /// Propagate a charset change through the tree without changing the
    /// declared charset of the body.
    pub fn charset_changed(&mut self, charset: &str) {
        self.clear_cache();
        self.encoder.charset_changed(charset);
        self.headers.charset_changed(charset);
        for child in &mut self.children {
            child.charset_changed(charset);
        }
    }

    pub fn format(&self) -> Option<&str> {
        self.user_format.as_deref()
    }

    /// Set the `format` parameter, e.g. `flowed`.
    pub fn set_format(&mut self, format: Option<&str>) {
        self.user_format = format.map(str::to_owned);
        if self.layout.is_empty() {
            self.set_content_type_param("format", format);
        }
    }

    pub fn delsp(&self) -> bool {
        self.user_delsp
    }

    pub fn set_delsp(&mut self, delsp: bool) {
        self.user_delsp = delsp;
        if self.layout.is_empty() {
            self.set_content_type_param("delsp", Some("yes").filter(|_| delsp));
        }
    }

    pub fn encoder(&self) -> &dyn ContentEncoder {
        &*self.encoder
    }

    pub fn set_encoder(&mut self, encoder: Box<dyn ContentEncoder>) {
        self.clear_cache();
        self.encoder = encoder;
        if self.layout.is_empty() {
            self.set_transfer_encoding(Some(self.encoder.name()));
        }
    }

    fn set_transfer_encoding(&mut self, name: Option<&str>) {
        let name = match name {
            Some(name) => name,
            None => {
                self.headers.remove_all("Content-Transfer-Encoding");
                return;
            }
        };

        match self.headers.get_mut("Content-Transfer-Encoding", 0) {
            Some(header) => header.set_value(name),
            None => self.headers.add_text("Content-Transfer-Encoding", name),
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn set_max_line_length(&mut self, max: usize) {
        if max != self.max_line_length {
            self.clear_cache();
            self.max_line_length = max;
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the ID, adding a Content-ID (or Message-ID) header for it.
    pub fn set_id(&mut self, id: &str) -> Result<(), Error> {
        self.headers
            .set_model(self.id_field, HeaderModel::Id(vec![id.to_owned()]))?;
        self.id = id.to_owned();
        Ok(())
    }

    /// Replace the ID with a freshly generated one and return it.
    pub fn generate_id(&mut self) -> Result<String, Error> {
        let id = self.ids.generate_id();
        self.set_id(&id)?;
        Ok(id)
    }

    pub(super) fn set_id_field(&mut self, field: &'static str) {
        self.id_field = field;
    }

    pub fn description(&self) -> Option<&str> {
        self.headers
            .get("Content-Description", 0)
            .and_then(Header::value)
    }

    pub fn set_description(&mut self, description: &str) {
        match self.headers.get_mut("Content-Description", 0) {
            Some(header) => header.set_value(description),
            None => self.headers.add_text("Content-Description", description),
        }
    }

    pub fn disposition(&self) -> Option<&str> {
        self.headers
            .get("Content-Disposition", 0)
            .and_then(Header::value)
    }

    /// Set the disposition, typically `attachment` or `inline`.
    pub fn set_disposition(&mut self, disposition: &str) {
        match self.headers.get_mut("Content-Disposition", 0) {
            Some(header) => header.set_value(disposition),
            None => self.headers.add_parameterized(
                "Content-Disposition",
                disposition,
                &[],
            ),
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.headers
            .get("Content-Disposition", 0)
            .and_then(|h| h.parameter("filename"))
    }

    /// Set the file name in both Content-Disposition and Content-Type.
    pub fn set_filename(&mut self, filename: &str) {
        if !self.headers.has("Content-Disposition", 0) {
            self.set_disposition("attachment");
        }
        if let Some(header) = self.headers.get_mut("Content-Disposition", 0) {
            header.set_parameter("filename", Some(filename));
        }
        self.set_content_type_param("name", Some(filename));
    }

    pub fn size(&self) -> Option<u64> {
        self.headers
            .get("Content-Disposition", 0)
            .and_then(|h| h.parameter("size"))
            .and_then(|s| s.parse().ok())
    }

    pub fn set_size(&mut self, size: u64) {
        if !self.headers.has("Content-Disposition", 0) {
            self.set_disposition("attachment");
        }
        if let Some(header) = self.headers.get_mut("Content-Disposition", 0) {
            header.set_parameter("size", Some(&size.to_string()));
        }
    }

    /// The body, if it is held in memory.
    pub fn body(&self) -> Option<&[u8]> {
        match self.body {
            Some(Body::Bytes(ref b)) => Some(b),
            _ => None,
        }
    }

    pub fn has_body(&self) -> bool {
        match self.body {
            None => false,
            Some(Body::Bytes(ref b)) => !b.is_empty(),
            Some(Body::Stream(_)) => true,
        }
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.clear_cache();
        self.body = Some(Body::Bytes(body.into()));
    }

    /// Use `stream` as the body. It is read from the start every time the
    /// body needs to be encoded.
    pub fn set_body_stream(&mut self, stream: Box<dyn OutputByteStream>) {
        self.clear_cache();
        self.body = Some(Body::Stream(stream));
    }

    pub(super) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub(super) fn restore_body(&mut self, body: Option<Body>) {
        self.body = body;
    }

    /// Every child, in the order given, regardless of how they are grouped.
    pub fn children(&self) -> &[MimeEntity] {
        &self.children
    }

    /// Replace the children and recompute the multipart structure.
    pub fn set_children(&mut self, children: Vec<MimeEntity>) {
        self.children = children;
        self.relayout();
    }

    pub fn take_children(&mut self) -> Vec<MimeEntity> {
        let children = std::mem::take(&mut self.children);
        self.relayout();
        children
    }

    pub fn add_child(&mut self, child: MimeEntity) {
        self.children.push(child);
        self.relayout();
    }

    pub(super) fn insert_child(&mut self, index: usize, child: MimeEntity) {
        self.children.insert(index, child);
        self.relayout();
    }

    /// Remove and return the child with the given ID.
    pub fn remove_child(&mut self, id: &str) -> Option<MimeEntity> {
        let ix = self.children.iter().position(|c| c.id == id)?;
        let child = self.children.remove(ix);
        self.relayout();
        Some(child)
    }

    pub(super) fn remove_child_at(&mut self, index: usize) -> MimeEntity {
        let child = self.children.remove(index);
        self.relayout();
        child
    }

    /// The multipart boundary, generated on first use.
    pub fn boundary(&mut self) -> &str {
        self.boundary.get_or_insert_with(generate_boundary)
    }

    pub fn set_boundary(&mut self, boundary: &str) -> Result<(), Error> {
        if !grammar::is_boundary(boundary) {
            return Err(Error::RfcCompliance(format!(
                "Mime boundary set is not RFC 2046 compliant: {}",
                boundary
            )));
        }

        self.boundary = Some(boundary.to_owned());
        if !self.layout.is_empty() {
            self.set_content_type_param("boundary", Some(boundary));
        }
        Ok(())
    }

    fn clear_cache(&mut self) {
        if let Err(e) =
            self.cache.borrow_mut().clear_key(&self.cache_key, BODY_ITEM)
        {
            error!("Failed to clear cached body of {}: {}", self.id, e);
        }
    }

    fn relayout(&mut self) {
        let compound = self
            .children
            .iter()
            .fold(NestingLevel::empty(), |acc, c| acc | c.nesting_level);
        let mut boundaries = BoundaryPool {
            used: 0,
            boundaries: &mut self.group_boundaries,
        };
        let (layout, composite) = arrange(
            &self.children,
            (0..self.children.len()).collect(),
            compound,
            &mut boundaries,
        );
        self.layout = layout;

        let content_type = composite
            .map(str::to_owned)
            .unwrap_or_else(|| self.user_content_type.clone());
        self.set_content_type_value(&content_type);
        self.fix_headers();
    }

    /// Make the Content-Type parameters and Content-Transfer-Encoding agree
    /// with whether the entity is currently a leaf.
    fn fix_headers(&mut self) {
        if !self.layout.is_empty() {
            let boundary = self.boundary().to_owned();
            self.set_content_type_param("boundary", Some(&boundary));
            self.set_transfer_encoding(None);
            if self.user_charset.is_some() {
                self.set_content_type_param("charset", None);
                self.set_content_type_param("format", None);
                self.set_content_type_param("delsp", None);
            }
        } else {
            self.set_content_type_param("boundary", None);
            let name = self.encoder.name();
            self.set_transfer_encoding(Some(name));
            if let Some(charset) = self.user_charset.clone() {
                self.set_content_type_param("charset", Some(&charset));
                let format = self.user_format.clone();
                self.set_content_type_param("format", format.as_deref());
                let delsp = Some("yes").filter(|_| self.user_delsp);
                self.set_content_type_param("delsp", delsp);
            }
        }
    }

    /// A part carrying this entity's body, for use when the body has to
    /// sit alongside the children.
    ///
    /// The part shares this entity's cache item, so its encoding is the one
    /// this entity would produce as a leaf.
    pub(super) fn body_as_part(&mut self, level: NestingLevel) -> MimeEntity {
        let cx = MimeFactory {
            cache: Rc::clone(&self.cache),
            ids: self.ids.clone(),
            headers: self.headers.factory().clone(),
            max_line_length: self.max_line_length,
        };
        let mut part = MimeEntity::build(
            &cx,
            &self.user_content_type,
            self.encoder.clone(),
            level,
        );
        part.cache_key = self.cache_key.clone();
        part.owns_cache = false;
        part.user_charset = self.user_charset.clone();
        part.user_format = self.user_format.clone();
        part.user_delsp = self.user_delsp;
        part.fix_headers();
        part.body = self.body.take();
        part
    }

    /// Render the whole entity into memory.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = ArrayByteStream::default();
        self.to_byte_stream(&mut out)?;
        Ok(out.into_contents())
    }

    /// Render the entity progressively into `is`.
    pub fn to_byte_stream(
        &mut self,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error> {
        is.write(self.headers.to_string().as_bytes())?;

        if self.layout.is_empty() {
            return self.body_to_byte_stream(is);
        }

        is.write(b"\r\n")?;
        let boundary = self.boundary().to_owned();
        let MimeEntity {
            ref headers,
            ref layout,
            ref mut children,
            ..
        } = *self;
        write_slots(layout, &boundary, children, headers.factory(), is)
    }

    fn body_to_byte_stream(
        &mut self,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error> {
        let body = match self.body {
            Some(ref mut body) => body,
            None => return Ok(()),
        };

        let cached = self.cache.borrow().has_key(&self.cache_key, BODY_ITEM);
        if cached {
            return self
                .cache
                .borrow_mut()
                .export_to_byte_stream(&self.cache_key, BODY_ITEM, is)
                .map_err(|e| {
                    error!("Failed to read cached body of {}: {}", self.id, e);
                    e
                });
        }

        // Anything still buffered belongs to the headers and must not reach
        // the mirror
        is.commit()?;
        self.cache.borrow_mut().clear_key(&self.cache_key, BODY_ITEM)?;
        let mirror: SharedInputStream = Rc::new(RefCell::new(
            CacheInputStream::new(
                Rc::clone(&self.cache),
                &self.cache_key,
                BODY_ITEM,
            ),
        ));

        is.bind(Rc::clone(&mirror));
        let written =
            write_encoded_body(body, &*self.encoder, self.max_line_length, is);
        let unbound = is.unbind(&mirror);

        let result = written.and_then(|()| unbound.map_err(Error::from));
        if let Err(ref e) = result {
            error!("Failed to render body of {}: {}", self.id, e);
            // Don't leave a truncated encoding behind
            let _ = self
                .cache
                .borrow_mut()
                .clear_key(&self.cache_key, BODY_ITEM);
        }
        result
    }

    /// Whether the encoded body is currently cached.
    pub fn is_body_cached(&self) -> bool {
        self.cache.borrow().has_key(&self.cache_key, BODY_ITEM)
    }
}

impl Default for MimeEntity {
    fn default() -> Self {
        MimeEntity::new()
    }
}

fn write_encoded_body(
    body: &mut Body,
    encoder: &dyn ContentEncoder,
    max_line_length: usize,
    is: &mut dyn InputByteStream,
) -> Result<(), Error> {
    is.write(b"\r\n")?;
    match *body {
        Body::Bytes(ref bytes) => {
            is.write(&encoder.encode_string(bytes, 0, max_line_length))?;
        }
        Body::Stream(ref mut os) => {
            os.set_read_pointer(0)?;
            encoder.encode_byte_stream(&mut **os, is, 0, max_line_length)?;
        }
    }
    Ok(())
}

fn write_slots(
    slots: &[Slot],
    boundary: &str,
    children: &mut [MimeEntity],
    header_factory: &HeaderFactory,
    is: &mut dyn InputByteStream,
) -> Result<(), Error> {
    for slot in slots {
        is.write(format!("\r\n--{}\r\n", boundary).as_bytes())?;
        match *slot {
            Slot::Child(ix) => {
                if let Some(child) = children.get_mut(ix) {
                    child.to_byte_stream(is)?;
                }
            }

            Slot::Group(ref group) => {
                let header = header_factory.create_parameterized(
                    "Content-Type",
                    group.content_type,
                    &[("boundary", &group.boundary)],
                );
                is.write(header.to_string().as_bytes())?;
                is.write(b"\r\n")?;
                write_slots(
                    &group.slots,
                    &group.boundary,
                    children,
                    header_factory,
                    is,
                )?;
            }
        }
    }

    is.write(format!("\r\n--{}--\r\n", boundary).as_bytes())?;
    Ok(())
}

struct BoundaryPool<'a> {
    used: usize,
    boundaries: &'a mut Vec<String>,
}

impl BoundaryPool<'_> {
    fn next(&mut self) -> String {
        if self.used == self.boundaries.len() {
            self.boundaries.push(generate_boundary());
        }
        self.used += 1;
        self.boundaries[self.used - 1].clone()
    }
}

/// The level at which `child` must be placed, given the levels of all its
/// siblings.
///
/// When alternative parts sit alongside related content, the HTML
/// alternative must be grouped with the related content so that the plain
/// text alternative ends up outside it.
fn needed_level(child: &MimeEntity, compound: NestingLevel) -> NestingLevel {
    let real = child.nesting_level;
    if compound.contains(NestingLevel::ALTERNATIVE | NestingLevel::RELATED)
        && NestingLevel::ALTERNATIVE == real
    {
        match &*child.content_type().to_ascii_lowercase() {
            "text/plain" => return NestingLevel::ALTERNATIVE,
            "text/html" => return NestingLevel::RELATED,
            _ => (),
        }
    }

    real
}

fn composite_type(level: NestingLevel) -> Option<&'static str> {
    if level > NestingLevel::TOP && level <= NestingLevel::MIXED {
        Some("multipart/mixed")
    } else if level > NestingLevel::MIXED && level <= NestingLevel::ALTERNATIVE
    {
        Some("multipart/alternative")
    } else if level > NestingLevel::ALTERNATIVE
        && level <= NestingLevel::RELATED
    {
        Some("multipart/related")
    } else {
        None
    }
}

/// Arrange the children at `members` into immediate slots.
///
/// Children at the outermost level present become immediate children; the
/// rest are arranged recursively into a group placed first. Returns the
/// slots and the composite type they need.
fn arrange(
    children: &[MimeEntity],
    members: Vec<usize>,
    compound: NestingLevel,
    boundaries: &mut BoundaryPool<'_>,
) -> (Vec<Slot>, Option<&'static str>) {
    let needed = |ix: usize| needed_level(&children[ix], compound);

    let mut immediate: Vec<usize> = Vec::new();
    let mut deeper: Vec<usize> = Vec::new();
    for ix in members {
        let level = needed(ix);
        match immediate.first().copied() {
            None => immediate.push(ix),
            Some(first) => {
                let current = needed(first);
                if level == current {
                    immediate.push(ix);
                } else if level < current {
                    deeper.append(&mut immediate);
                    immediate.push(ix);
                } else {
                    deeper.push(ix);
                }
            }
        }
    }

    let lowest = match immediate.first() {
        Some(&first) => needed(first),
        None => return (Vec::new(), None),
    };

    let mut slots: Vec<Slot> = immediate.into_iter().map(Slot::Child).collect();
    if !deeper.is_empty() {
        let boundary = boundaries.next();
        let (group_slots, group_type) =
            arrange(children, deeper, compound, boundaries);
        slots.insert(
            0,
            Slot::Group(Box::new(Group {
                level: lowest,
                content_type: group_type.unwrap_or("multipart/mixed"),
                boundary,
                slots: group_slots,
            })),
        );
    }

    sort_alternatives(children, &mut slots);
    (slots, composite_type(lowest))
}

/// If any slot is an alternative, order the slots by how simple a rendition
/// they are, leaving equally-ranked slots in place.
fn sort_alternatives(children: &[MimeEntity], slots: &mut [Slot]) {
    let level = |slot: &Slot| match *slot {
        Slot::Child(ix) => children[ix].nesting_level,
        Slot::Group(ref g) => g.level,
    };

    if !slots.iter().any(|s| NestingLevel::ALTERNATIVE == level(s)) {
        return;
    }

    slots.sort_by_key(|slot| {
        let content_type = match *slot {
            Slot::Child(ix) => children[ix].content_type().to_ascii_lowercase(),
            Slot::Group(ref g) => g.content_type.to_owned(),
        };
        match &*content_type {
            "text/plain" => 1,
            "text/html" => 2,
            "multipart/related" => 3,
            _ => 4,
        }
    });
}
