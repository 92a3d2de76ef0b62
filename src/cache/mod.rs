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

//! Namespaced byte caches.
//!
//! A MIME entity stores the encoded form of its body under its own unique
//! namespace, so that rendering the same message many times (as happens with
//! batch sending) only encodes each body once.
//!
//! Caches are not thread-safe. A cache shared between entities is shared
//! through `SharedCache` on a single thread.

pub mod array;
pub mod disk;

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::stream::{InputByteStream, OutputByteStream, SharedInputStream};
use crate::support::error::Error;

pub use self::array::ArrayKeyCache;
pub use self::disk::DiskKeyCache;

/// How new content relates to what an item already holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Replace the item.
    Write,
    /// Extend the item.
    Append,
}

pub trait KeyCache {
    fn set_bytes(
        &mut self,
        ns: &str,
        item: &str,
        bytes: &[u8],
        mode: Mode,
    ) -> Result<(), Error>;

    /// Copy everything remaining in `os` into the item.
    fn import_from_byte_stream(
        &mut self,
        ns: &str,
        item: &str,
        os: &mut dyn OutputByteStream,
        mode: Mode,
    ) -> Result<(), Error> {
        let mut mode = mode;
        if Mode::Write == mode {
            self.set_bytes(ns, item, b"", Mode::Write)?;
            mode = Mode::Append;
        }

        while let Some(chunk) = os.read(8192)? {
            self.set_bytes(ns, item, &chunk, mode)?;
        }
        Ok(())
    }

    /// Return the content of the item, or `None` if it does not exist.
    fn get_bytes(
        &mut self,
        ns: &str,
        item: &str,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Write the content of the item into `is`. A missing item writes
    /// nothing.
    fn export_to_byte_stream(
        &mut self,
        ns: &str,
        item: &str,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error>;

    fn has_key(&self, ns: &str, item: &str) -> bool;

    fn clear_key(&mut self, ns: &str, item: &str) -> Result<(), Error>;

    /// Remove the whole namespace.
    fn clear_all(&mut self, ns: &str) -> Result<(), Error>;
}

pub type SharedCache = Rc<RefCell<dyn KeyCache>>;

/// A fresh, unshared in-memory cache.
pub fn memory_cache() -> SharedCache {
    Rc::new(RefCell::new(ArrayKeyCache::default()))
}

/// An `InputByteStream` whose writes are appended to one cache item.
///
/// Everything written can also be passed on to a write-through stream.
/// Flushing the stream clears the item.
pub struct CacheInputStream {
    cache: SharedCache,
    ns: String,
    item: String,
    write_through: Option<SharedInputStream>,
    sequence: u64,
}

impl CacheInputStream {
    pub fn new(cache: SharedCache, ns: &str, item: &str) -> Self {
        CacheInputStream {
            cache,
            ns: ns.to_owned(),
            item: item.to_owned(),
            write_through: None,
            sequence: 0,
        }
    }

    pub fn with_write_through(mut self, stream: SharedInputStream) -> Self {
        self.write_through = Some(stream);
        self
    }
}

fn to_io(e: Error) -> io::Error {
    match e {
        Error::Io(e) => e,
        e => io::Error::new(io::ErrorKind::Other, e.to_string()),
    }
}

impl InputByteStream for CacheInputStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.cache
            .borrow_mut()
            .set_bytes(&self.ns, &self.item, bytes, Mode::Append)
            .map_err(to_io)?;
        if let Some(ref wt) = self.write_through {
            wt.borrow_mut().write(bytes)?;
        }

        self.sequence += 1;
        Ok(self.sequence)
    }

    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bind(&mut self, _other: SharedInputStream) {}

    fn unbind(&mut self, _other: &SharedInputStream) -> io::Result<()> {
        Ok(())
    }

    fn flush_buffers(&mut self) -> io::Result<()> {
        self.cache
            .borrow_mut()
            .clear_key(&self.ns, &self.item)
            .map_err(to_io)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::ArrayByteStream;

    /// Behaviour every cache implementation must share.
    pub(super) fn exercise(cache: &mut dyn KeyCache) {
        assert!(!cache.has_key("ns", "a"));
        assert_eq!(None, cache.get_bytes("ns", "a").unwrap());

        cache.set_bytes("ns", "a", b"foo", Mode::Write).unwrap();
        assert!(cache.has_key("ns", "a"));
        cache.set_bytes("ns", "a", b"bar", Mode::Append).unwrap();
        assert_eq!(Some(b"foobar".to_vec()), cache.get_bytes("ns", "a").unwrap());
        cache.set_bytes("ns", "a", b"baz", Mode::Write).unwrap();
        assert_eq!(Some(b"baz".to_vec()), cache.get_bytes("ns", "a").unwrap());

        let mut os = ArrayByteStream::new(vec![b'x'; 20000]);
        cache
            .import_from_byte_stream("ns", "b", &mut os, Mode::Write)
            .unwrap();
        let mut is = ArrayByteStream::default();
        cache.export_to_byte_stream("ns", "b", &mut is).unwrap();
        assert_eq!(vec![b'x'; 20000], is.into_contents());

        let mut is = ArrayByteStream::default();
        cache.export_to_byte_stream("ns", "missing", &mut is).unwrap();
        assert!(is.contents().is_empty());

        cache.set_bytes("other", "a", b"keep", Mode::Write).unwrap();
        cache.clear_key("ns", "a").unwrap();
        assert!(!cache.has_key("ns", "a"));
        assert!(cache.has_key("ns", "b"));
        cache.clear_key("ns", "a").unwrap();

        cache.clear_all("ns").unwrap();
        assert!(!cache.has_key("ns", "b"));
        assert_eq!(Some(b"keep".to_vec()), cache.get_bytes("other", "a").unwrap());
        cache.clear_all("ns").unwrap();
    }

    #[test]
    fn cache_input_stream_appends_and_writes_through() {
        let cache = memory_cache();
        let through: Rc<RefCell<ArrayByteStream>> = Default::default();
        let mut is = CacheInputStream::new(cache.clone(), "ns", "body")
            .with_write_through(through.clone());

        is.write(b"abc").unwrap();
        is.write(b"def").unwrap();
        assert_eq!(
            Some(b"abcdef".to_vec()),
            cache.borrow_mut().get_bytes("ns", "body").unwrap()
        );
        assert_eq!(b"abcdef", through.borrow().contents());

        is.flush_buffers().unwrap();
        assert!(!cache.borrow().has_key("ns", "body"));
    }

    #[test]
    fn cache_input_stream_as_mirror() {
        let cache = memory_cache();
        let mirror: SharedInputStream =
            Rc::new(RefCell::new(CacheInputStream::new(cache.clone(), "n", "i")));
        let mut main = ArrayByteStream::default();
        main.bind(mirror.clone());
        main.write(b"hello").unwrap();
        main.unbind(&mirror).unwrap();
        main.write(b" world").unwrap();
        assert_eq!(
            Some(b"hello".to_vec()),
            cache.borrow_mut().get_bytes("n", "i").unwrap()
        );
    }
}
