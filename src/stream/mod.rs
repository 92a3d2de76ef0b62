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

//! Progressive byte I/O.
//!
//! The naming follows the point of view of whoever *holds* the stream: an
//! `InputByteStream` is something bytes are put into (a socket, a cache
//! entry, a file), and an `OutputByteStream` is something bytes are taken out
//! of (a message body, a cached encoding).
//!
//! Input streams buffer writes so that attached filters can see enough bytes
//! to make a decision, and can mirror everything written to them into other
//! input streams bound at runtime.

pub mod filter;

use std::cell::RefCell;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use self::filter::StreamFilter;

pub type SharedInputStream = Rc<RefCell<dyn InputByteStream>>;

pub trait InputByteStream {
    /// Write `bytes` to the stream.
    ///
    /// The bytes may be held back in a buffer until attached filters can
    /// process them. Returns a sequence number which increases with every
    /// call, which callers may use to correlate writes with responses.
    fn write(&mut self, bytes: &[u8]) -> io::Result<u64>;

    /// Push any buffered bytes out immediately, whether or not filters would
    /// prefer more input.
    fn commit(&mut self) -> io::Result<()>;

    /// Mirror everything subsequently written to this stream into `other`.
    ///
    /// Binding the same stream twice has no effect.
    fn bind(&mut self, other: SharedInputStream);

    /// Stop mirroring into `other`.
    ///
    /// Bytes still held in the write buffer are written to `other` first so
    /// that it sees everything written while it was bound.
    fn unbind(&mut self, other: &SharedInputStream) -> io::Result<()>;

    /// Flush the write buffer, reset any internal state, and flush every bound
    /// stream.
    fn flush_buffers(&mut self) -> io::Result<()>;
}

pub trait OutputByteStream {
    /// Read up to `length` bytes from the current read position.
    ///
    /// Returns `None` once there is nothing left to read.
    fn read(&mut self, length: usize) -> io::Result<Option<Vec<u8>>>;

    /// Move the read position to `offset` bytes from the start.
    fn set_read_pointer(&mut self, offset: u64) -> io::Result<()>;
}

/// Whether `a` and `b` are the same bound stream.
pub fn same_stream(a: &SharedInputStream, b: &SharedInputStream) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// The backing medium of a `FilterableInputStream`.
pub trait ByteSink {
    /// Accept bytes which have been through all filters.
    fn commit_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Called by `flush_buffers` after the write buffer has been emptied.
    fn flush_sink(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Adapts any `Write` into a `ByteSink`.
pub struct WriteSink<W>(pub W);

impl<W: Write> ByteSink for WriteSink<W> {
    fn commit_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes)
    }

    fn flush_sink(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// The general implementation of `InputByteStream`: a write buffer, a chain
/// of filters, a set of mirrors, and a sink.
pub struct FilterableInputStream<S> {
    sink: S,
    write_buffer: Vec<u8>,
    filters: Vec<(String, Box<dyn StreamFilter>)>,
    mirrors: Vec<SharedInputStream>,
    sequence: u64,
}

impl<S: ByteSink> FilterableInputStream<S> {
    pub fn new(sink: S) -> Self {
        FilterableInputStream {
            sink,
            write_buffer: Vec::new(),
            filters: Vec::new(),
            mirrors: Vec::new(),
            sequence: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Add a filter under `key`, replacing any filter already there.
    pub fn add_filter(&mut self, key: &str, filter: Box<dyn StreamFilter>) {
        self.remove_filter(key);
        self.filters.push((key.to_owned(), filter));
    }

    pub fn remove_filter(&mut self, key: &str) {
        self.filters.retain(|&(ref k, _)| k != key);
    }

    pub fn has_filter(&self, key: &str) -> bool {
        self.filters.iter().any(|&(ref k, _)| k == key)
    }

    fn do_write(&mut self) -> io::Result<()> {
        let raw = std::mem::take(&mut self.write_buffer);
        let mut filtered = std::borrow::Cow::Borrowed(&raw[..]);
        for &(_, ref filter) in &self.filters {
            filtered = std::borrow::Cow::Owned(filter.filter(&filtered));
        }

        self.sink.commit_bytes(&filtered)?;
        for mirror in &self.mirrors {
            mirror.borrow_mut().write(&raw)?;
        }

        Ok(())
    }
}

impl<S: ByteSink> InputByteStream for FilterableInputStream<S> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.write_buffer.extend_from_slice(bytes);
        self.sequence += 1;

        let hold = self
            .filters
            .iter()
            .any(|&(_, ref f)| f.should_buffer(&self.write_buffer));
        if !hold {
            self.do_write()?;
        }

        Ok(self.sequence)
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.write_buffer.is_empty() {
            self.do_write()?;
        }
        Ok(())
    }

    fn bind(&mut self, other: SharedInputStream) {
        if !self.mirrors.iter().any(|m| same_stream(m, &other)) {
            self.mirrors.push(other);
        }
    }

    fn unbind(&mut self, other: &SharedInputStream) -> io::Result<()> {
        if let Some(ix) = self.mirrors.iter().position(|m| same_stream(m, other))
        {
            let mirror = self.mirrors.remove(ix);
            if !self.write_buffer.is_empty() {
                mirror.borrow_mut().write(&self.write_buffer)?;
            }
        }
        Ok(())
    }

    fn flush_buffers(&mut self) -> io::Result<()> {
        self.commit()?;
        self.sink.flush_sink()?;
        for mirror in &self.mirrors {
            mirror.borrow_mut().flush_buffers()?;
        }
        Ok(())
    }
}

/// An in-memory stream, readable and writable.
#[derive(Default)]
pub struct ArrayByteStream {
    data: Vec<u8>,
    offset: usize,
    mirrors: Vec<SharedInputStream>,
    sequence: u64,
}

impl ArrayByteStream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        ArrayByteStream {
            data: data.into(),
            ..ArrayByteStream::default()
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_contents(self) -> Vec<u8> {
        self.data
    }
}

impl InputByteStream for ArrayByteStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.data.extend_from_slice(bytes);
        for mirror in &self.mirrors {
            mirror.borrow_mut().write(bytes)?;
        }
        self.sequence += 1;
        Ok(self.sequence)
    }

    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bind(&mut self, other: SharedInputStream) {
        if !self.mirrors.iter().any(|m| same_stream(m, &other)) {
            self.mirrors.push(other);
        }
    }

    fn unbind(&mut self, other: &SharedInputStream) -> io::Result<()> {
        self.mirrors.retain(|m| !same_stream(m, other));
        Ok(())
    }

    fn flush_buffers(&mut self) -> io::Result<()> {
        self.data.clear();
        self.offset = 0;
        for mirror in &self.mirrors {
            mirror.borrow_mut().flush_buffers()?;
        }
        Ok(())
    }
}

impl OutputByteStream for ArrayByteStream {
    fn read(&mut self, length: usize) -> io::Result<Option<Vec<u8>>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }

        let end = self.data.len().min(self.offset + length);
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }

    fn set_read_pointer(&mut self, offset: u64) -> io::Result<()> {
        self.offset = (offset as usize).min(self.data.len());
        Ok(())
    }
}

/// Reads a file progressively, so that large attachments need never be held
/// in memory in their entirety.
///
/// The file is opened on the first read.
pub struct FileByteStream {
    path: PathBuf,
    file: Option<fs::File>,
    offset: u64,
}

impl FileByteStream {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileByteStream {
            path: path.as_ref().to_owned(),
            file: None,
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputByteStream for FileByteStream {
    fn read(&mut self, length: usize) -> io::Result<Option<Vec<u8>>> {
        if self.file.is_none() {
            let mut file = fs::File::open(&self.path)?;
            file.seek(SeekFrom::Start(self.offset))?;
            self.file = Some(file);
        }

        let file = match self.file {
            Some(ref mut f) => f,
            None => return Ok(None),
        };

        let mut chunk = Vec::with_capacity(length.min(65536));
        let nread =
            Read::by_ref(file).take(length as u64).read_to_end(&mut chunk)?;
        if 0 == nread {
            return Ok(None);
        }

        self.offset += nread as u64;
        Ok(Some(chunk))
    }

    fn set_read_pointer(&mut self, offset: u64) -> io::Result<()> {
        self.offset = offset;
        if let Some(ref mut file) = self.file {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(())
    }
}

/// Drain `os` into `is` in chunks of `chunk_size`.
pub fn copy_stream(
    os: &mut dyn OutputByteStream,
    is: &mut dyn InputByteStream,
    chunk_size: usize,
) -> io::Result<()> {
    while let Some(chunk) = os.read(chunk_size)? {
        is.write(&chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::filter::StringReplacementFilter;
    use super::*;

    fn shared_array() -> Rc<RefCell<ArrayByteStream>> {
        Rc::new(RefCell::new(ArrayByteStream::default()))
    }

    #[test]
    fn sequence_numbers_increase() {
        let mut is = FilterableInputStream::new(WriteSink(Vec::new()));
        let a = is.write(b"foo").unwrap();
        let b = is.write(b"bar").unwrap();
        assert!(b > a);
        assert_eq!(b"foobar", &is.sink().0[..]);
    }

    #[test]
    fn filter_holds_back_partial_matches() {
        let mut is = FilterableInputStream::new(WriteSink(Vec::new()));
        is.add_filter(
            "dots",
            Box::new(StringReplacementFilter::new(vec![(
                b"\r\n.".to_vec(),
                b"\r\n..".to_vec(),
            )])),
        );

        is.write(b"line\r").unwrap();
        assert_eq!(b"", &is.sink().0[..]);
        is.write(b"\n.dot").unwrap();
        assert_eq!(b"line\r\n..dot", &is.sink().0[..]);

        is.write(b"\r\n").unwrap();
        assert_eq!(b"line\r\n..dot", &is.sink().0[..]);
        is.commit().unwrap();
        assert_eq!(b"line\r\n..dot\r\n", &is.sink().0[..]);
    }

    #[test]
    fn mirrors_see_unfiltered_bytes() {
        let mirror = shared_array();
        let mut is = FilterableInputStream::new(WriteSink(Vec::new()));
        is.add_filter(
            "upper",
            Box::new(StringReplacementFilter::new(vec![(
                b"a".to_vec(),
                b"A".to_vec(),
            )])),
        );
        is.bind(mirror.clone());
        is.bind(mirror.clone());

        is.write(b"banana").unwrap();
        assert_eq!(b"bAnAnA", &is.sink().0[..]);
        assert_eq!(b"banana", mirror.borrow().contents());
    }

    #[test]
    fn unbind_flushes_pending_bytes_to_target() {
        let mirror = shared_array();
        let shared: SharedInputStream = mirror.clone();
        let mut is = FilterableInputStream::new(WriteSink(Vec::new()));
        is.add_filter(
            "crlf",
            Box::new(StringReplacementFilter::new(vec![(
                b"\r\n".to_vec(),
                b"\n".to_vec(),
            )])),
        );
        is.bind(shared.clone());

        is.write(b"abc\r").unwrap();
        assert_eq!(b"", mirror.borrow().contents());
        is.unbind(&shared).unwrap();
        assert_eq!(b"abc\r", mirror.borrow().contents());

        is.write(b"\n").unwrap();
        assert_eq!(b"abc\r", mirror.borrow().contents());
        assert_eq!(b"abc\n", &is.sink().0[..]);
    }

    #[test]
    fn array_stream_reads_and_seeks() {
        let mut s = ArrayByteStream::new(&b"hello world"[..]);
        assert_eq!(Some(b"hello".to_vec()), s.read(5).unwrap());
        assert_eq!(Some(b" world".to_vec()), s.read(100).unwrap());
        assert_eq!(None, s.read(1).unwrap());
        s.set_read_pointer(6).unwrap();
        assert_eq!(Some(b"wo".to_vec()), s.read(2).unwrap());

        s.flush_buffers().unwrap();
        assert_eq!(None, s.read(1).unwrap());
    }

    #[test]
    fn file_stream_reads_in_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"0123456789").unwrap();

        let mut s = FileByteStream::new(&path);
        assert_eq!(Some(b"0123".to_vec()), s.read(4).unwrap());
        assert_eq!(Some(b"456789".to_vec()), s.read(40).unwrap());
        assert_eq!(None, s.read(4).unwrap());
        s.set_read_pointer(8).unwrap();
        assert_eq!(Some(b"89".to_vec()), s.read(4).unwrap());
    }
}
