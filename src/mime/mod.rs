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

//! Composition of MIME messages.

pub mod entity;
pub mod grammar;
pub mod header;
pub mod header_factory;
pub mod header_set;
pub mod id_gen;
pub mod message;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::cache::{memory_cache, DiskKeyCache, SharedCache};
use crate::encoder::{Base64ContentEncoder, QpContentEncoder};
use crate::stream::FileByteStream;
use crate::support::config::{CacheKind, MailerConfig};
use crate::support::error::Error;

pub use self::entity::{Body, MimeEntity, NestingLevel};
pub use self::header::{Header, HeaderModel, Mailbox};
pub use self::header_factory::HeaderFactory;
pub use self::header_set::HeaderSet;
pub use self::id_gen::IdGenerator;
pub use self::message::Message;

/// Creates entities sharing one cache, ID generator and header settings.
#[derive(Clone)]
pub struct MimeFactory {
    cache: SharedCache,
    ids: IdGenerator,
    headers: HeaderFactory,
    max_line_length: usize,
}

impl Default for MimeFactory {
    /// A factory with a private memory cache and UTF-8 text.
    fn default() -> Self {
        MimeFactory::new(memory_cache(), IdGenerator::new(), "utf-8")
    }
}

impl MimeFactory {
    pub fn new(cache: SharedCache, ids: IdGenerator, charset: &str) -> Self {
        MimeFactory {
            cache,
            ids,
            headers: HeaderFactory::new(charset),
            max_line_length: 78,
        }
    }

    pub fn from_config(config: &MailerConfig) -> Result<Self, Error> {
        let cache: SharedCache = match (config.cache.kind, &config.cache.root) {
            (CacheKind::Memory, _) => memory_cache(),
            (CacheKind::Disk, &Some(ref root)) => {
                Rc::new(RefCell::new(DiskKeyCache::new(root)?))
            }
            (CacheKind::Disk, &None) => {
                Rc::new(RefCell::new(DiskKeyCache::temporary()?))
            }
        };

        let mut factory =
            MimeFactory::new(cache, IdGenerator::new(), &config.message.charset);
        factory.max_line_length = config.message.max_line_length;
        Ok(factory)
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn header_factory(&self) -> &HeaderFactory {
        &self.headers
    }

    pub fn charset(&self) -> &str {
        self.headers.charset()
    }

    /// A bare entity encoded in base64.
    pub fn entity(&self) -> MimeEntity {
        MimeEntity::build(
            self,
            "text/plain",
            Box::new(Base64ContentEncoder),
            NestingLevel::MIXED,
        )
    }

    /// A text part in this factory's charset, encoded in quoted-printable.
    pub fn part(
        &self,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> MimeEntity {
        let charset = self.charset().to_owned();
        let mut part = MimeEntity::build(
            self,
            content_type,
            Box::new(QpContentEncoder::new(&charset)),
            NestingLevel::ALTERNATIVE,
        );
        part.set_charset(&charset);
        part.set_body(body);
        part
    }

    pub fn attachment(
        &self,
        data: impl Into<Vec<u8>>,
        filename: Option<&str>,
        content_type: &str,
    ) -> MimeEntity {
        let mut att = MimeEntity::build(
            self,
            content_type,
            Box::new(Base64ContentEncoder),
            NestingLevel::MIXED,
        );
        att.set_disposition("attachment");
        if let Some(filename) = filename {
            att.set_filename(filename);
        }
        att.set_body(data);
        att
    }

    /// An attachment read progressively from the file at `path`.
    pub fn attachment_from_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<MimeEntity, Error> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned);

        let mut att = self.attachment(
            Vec::new(),
            filename.as_deref(),
            guess_content_type(path),
        );
        att.set_size(size);
        att.set_body_stream(Box::new(FileByteStream::new(path)));
        Ok(att)
    }

    /// A file displayed inline, such as an image referenced from HTML by
    /// its Content-ID.
    pub fn embedded(
        &self,
        data: impl Into<Vec<u8>>,
        filename: Option<&str>,
        content_type: &str,
    ) -> MimeEntity {
        let mut file = self.attachment(data, filename, content_type);
        file.set_disposition("inline");
        file.set_nesting_level(NestingLevel::RELATED);
        let id = file.id().to_owned();
        // The generator's IDs are valid unless the caller gave it a bad
        // right-hand side, in which case a fresh ID is no better
        if file.set_id(&id).is_err() {
            log::warn!("Generated Content-ID <{}> is invalid", id);
        }
        file
    }

    pub fn embedded_from_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<MimeEntity, Error> {
        let mut file = self.attachment_from_path(path)?;
        file.set_disposition("inline");
        file.set_nesting_level(NestingLevel::RELATED);
        let id = file.id().to_owned();
        file.set_id(&id)?;
        Ok(file)
    }

    pub fn message(&self, subject: &str) -> Message {
        Message::build(self, subject)
    }
}

/// Guess the media type of a file from its extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match &*ext {
        "txt" | "text" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "text/xml",
        "ics" => "text/calendar",
        "eml" => "message/rfc822",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => {
            "application/vnd.openxmlformats-officedocument.\
             wordprocessingml.document"
        }
        "odt" => "application/vnd.oasis.opendocument.text",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn content_type_guessing() {
        assert_eq!("image/png", guess_content_type(Path::new("a/b.PNG")));
        assert_eq!("text/plain", guess_content_type(Path::new("notes.txt")));
        assert_eq!(
            "application/octet-stream",
            guess_content_type(Path::new("noext"))
        );
    }

    #[test]
    fn attachment_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        fs::write(&path, b"%PDF-1.4").unwrap();

        let factory = MimeFactory::default();
        let mut att = factory.attachment_from_path(&path).unwrap();
        assert_eq!("application/pdf", att.content_type());
        assert_eq!(Some("report.pdf"), att.filename());
        assert_eq!(Some(8), att.size());
        let rendered = String::from_utf8(att.to_bytes().unwrap()).unwrap();
        assert!(rendered.ends_with("\r\n\r\nJVBERi0xLjQ="));

        assert_matches!(
            Err(Error::Io(_)),
            factory.attachment_from_path(dir.path().join("missing"))
        );
    }

    #[test]
    fn long_foreign_filename_stays_within_line_limit() {
        let factory = MimeFactory::default();
        let filename = format!("{}ü.pdf", "very_long_file_name_".repeat(6));
        let mut att = factory.attachment(
            b"x".to_vec(),
            Some(&filename),
            "application/pdf",
        );
        let rendered = String::from_utf8(att.to_bytes().unwrap()).unwrap();
        let head = rendered.split("\r\n\r\n").next().unwrap();
        assert!(head.contains("name=\"=?utf-8?Q?very=5Flong"));
        for line in head.split("\r\n") {
            assert!(line.len() <= 78, "Line too long: {:?}", line);
        }
    }

    #[test]
    fn factory_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = MailerConfig::default();
        config.cache.kind = CacheKind::Disk;
        config.cache.root = Some(dir.path().to_owned());
        config.message.charset = "iso-8859-1".to_owned();

        let factory = MimeFactory::from_config(&config).unwrap();
        assert_eq!("iso-8859-1", factory.charset());
        let mut part = factory.part(vec![0xE9], "text/plain");
        assert!(String::from_utf8(part.to_bytes().unwrap())
            .unwrap()
            .ends_with("charset=iso-8859-1\r\n\
                        Content-Transfer-Encoding: quoted-printable\r\n\
                        \r\n=E9"));
        assert!(part.is_body_cached());
    }
}
