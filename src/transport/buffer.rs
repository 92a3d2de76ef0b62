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

//! The byte pipe between a transport and the mail server.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use log::{debug, trace, warn};
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};

use crate::stream::filter::StringReplacementFilter;
use crate::stream::{
    ByteSink, FilterableInputStream, InputByteStream, SharedInputStream,
};
use crate::support::config::Encryption;
use crate::support::error::Error;

/// Longest response line accepted from a server.
const MAX_LINE: usize = 4096;

/// Where the buffer gets its connection from.
#[derive(Clone, Debug)]
pub enum BufferParams {
    Socket {
        host: String,
        port: u16,
        encryption: Encryption,
        timeout: Duration,
        verify_certificates: bool,
    },
    /// Run `command` and speak to it over its standard IO.
    Process { command: String },
}

/// An open connection to the server.
pub enum Connection {
    Tcp(TcpStream),
    Ssl(SslStream<TcpStream>),
    Process {
        child: Child,
        stdin: Option<ChildStdin>,
        stdout: ChildStdout,
    },
    Unix(UnixStream),
}

impl Connection {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        match *self {
            Connection::Tcp(ref mut s) => s.read(dst),
            Connection::Ssl(ref mut s) => s.read(dst),
            Connection::Process { ref mut stdout, .. } => stdout.read(dst),
            Connection::Unix(ref mut s) => s.read(dst),
        }
    }

    fn writer(&mut self) -> io::Result<&mut dyn Write> {
        let writer: &mut dyn Write = match *self {
            Connection::Tcp(ref mut s) => s,
            Connection::Ssl(ref mut s) => s,
            Connection::Process { stdin: Some(ref mut s), .. } => s,
            Connection::Process { stdin: None, .. } => {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "process input already closed",
                ))
            }
            Connection::Unix(ref mut s) => s,
        };
        Ok(writer)
    }

    fn close(self) {
        match self {
            Connection::Tcp(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
            Connection::Ssl(mut s) => {
                let _ = s.shutdown();
                let _ = s.get_ref().shutdown(std::net::Shutdown::Both);
            }
            Connection::Process {
                mut child, stdin, ..
            } => {
                drop(stdin);
                match child.wait() {
                    Ok(status) if !status.success() => {
                        warn!("Mail process exited with {}", status);
                    }
                    Ok(_) => (),
                    Err(e) => warn!("Failed to wait for mail process: {}", e),
                }
            }
            Connection::Unix(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl ByteSink for Connection {
    fn commit_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes)
    }

    fn flush_sink(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "I/O buffer is not open")
}

/// Writes commands through a filterable stream and reads responses line by
/// line.
#[derive(Default)]
pub struct IoBuffer {
    stream: Option<FilterableInputStream<Connection>>,
    line_buffer: Vec<u8>,
}

impl IoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already open connection.
    pub fn from_connection(cxn: Connection) -> Self {
        IoBuffer {
            stream: Some(FilterableInputStream::new(cxn)),
            line_buffer: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection described by `params`, closing any connection
    /// already open.
    pub fn initialize(&mut self, params: &BufferParams) -> Result<(), Error> {
        self.terminate();

        let cxn = match *params {
            BufferParams::Socket {
                ref host,
                port,
                encryption,
                timeout,
                verify_certificates,
            } => {
                let tcp = connect_tcp(host, port, timeout)?;
                if Encryption::Ssl == encryption {
                    Connection::Ssl(ssl_connect(
                        host,
                        tcp,
                        verify_certificates,
                    )?)
                } else {
                    Connection::Tcp(tcp)
                }
            }

            BufferParams::Process { ref command } => spawn(command)?,
        };

        *self = IoBuffer::from_connection(cxn);
        Ok(())
    }

    /// Upgrade a plain TCP connection to TLS.
    pub fn start_tls(
        &mut self,
        host: &str,
        verify_certificates: bool,
    ) -> Result<(), Error> {
        let stream = self.stream.take().ok_or_else(not_open)?;
        match stream.into_sink() {
            Connection::Tcp(tcp) => {
                let ssl = ssl_connect(host, tcp, verify_certificates)?;
                debug!("TLS established with {}", host);
                *self = IoBuffer::from_connection(Connection::Ssl(ssl));
                Ok(())
            }
            other => {
                self.stream = Some(FilterableInputStream::new(other));
                Err(Error::transport(
                    "Unable to connect with TLS encryption",
                ))
            }
        }
    }

    /// Replace the substitutions applied to written bytes.
    ///
    /// Each pair maps a byte string to what is actually sent in its place.
    /// An empty slice removes all substitutions. Bytes held back by the
    /// previous substitutions are sent first.
    pub fn set_write_translations(
        &mut self,
        translations: &[(&[u8], &[u8])],
    ) -> io::Result<()> {
        let stream = self.stream()?;
        stream.commit()?;
        stream.remove_filter("translations");
        if !translations.is_empty() {
            stream.add_filter(
                "translations",
                Box::new(StringReplacementFilter::new(
                    translations
                        .iter()
                        .map(|&(k, v)| (k.to_vec(), v.to_vec()))
                        .collect(),
                )),
            );
        }
        Ok(())
    }

    /// Read one line from the server, including its line ending.
    ///
    /// `sequence` is the sequence number of the write this line answers.
    pub fn read_line(&mut self, sequence: u64) -> Result<String, Error> {
        loop {
            if let Some(ix) = memchr::memchr(b'\n', &self.line_buffer) {
                let line = self.line_buffer.drain(..=ix).collect::<Vec<_>>();
                let line = String::from_utf8_lossy(&line).into_owned();
                trace!("[{}] << {:?}", sequence, line);
                return Ok(line);
            }

            if self.line_buffer.len() >= MAX_LINE {
                return Err(Error::transport("Server response line too long"));
            }

            let stream = self.stream.as_mut().ok_or_else(not_open)?;
            let mut chunk = [0u8; 1024];
            let n = stream.sink_mut().read(&mut chunk)?;
            if 0 == n {
                return Err(Error::transport(
                    "Connection to server closed unexpectedly",
                ));
            }
            self.line_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Close the connection, if open.
    pub fn terminate(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.flush_buffers() {
                debug!("Error flushing I/O buffer on close: {}", e);
            }
            stream.into_sink().close();
        }
        self.line_buffer.clear();
    }

    fn stream(&mut self) -> io::Result<&mut FilterableInputStream<Connection>> {
        self.stream.as_mut().ok_or_else(not_open)
    }
}

impl Drop for IoBuffer {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl InputByteStream for IoBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.stream()?.write(bytes)
    }

    fn commit(&mut self) -> io::Result<()> {
        self.stream()?.commit()
    }

    fn bind(&mut self, other: SharedInputStream) {
        if let Some(ref mut stream) = self.stream {
            stream.bind(other);
        }
    }

    fn unbind(&mut self, other: &SharedInputStream) -> io::Result<()> {
        self.stream()?.unbind(other)
    }

    fn flush_buffers(&mut self) -> io::Result<()> {
        self.stream()?.flush_buffers()
    }
}

fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, Error> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs().map_err(|e| {
        Error::transport(format!(
            "Connection could not be established with host {} [{}]",
            host, e
        ))
    })? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                debug!("Connected to {} ({})", host, addr);
                return Ok(tcp);
            }
            Err(e) => {
                debug!("Failed to connect to {}: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::transport(format!(
        "Connection could not be established with host {} [{}]",
        host,
        last_error.map_or_else(
            || "no addresses found".to_owned(),
            |e| e.to_string()
        ),
    )))
}

fn ssl_connect(
    host: &str,
    tcp: TcpStream,
    verify_certificates: bool,
) -> Result<SslStream<TcpStream>, Error> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_verify(if verify_certificates {
        SslVerifyMode::PEER
    } else {
        SslVerifyMode::NONE
    });

    let connector = builder.build();
    let mut config = connector.configure()?;
    config.set_verify_hostname(verify_certificates);
    config.connect(host, tcp).map_err(|e| {
        Error::transport(format!("TLS handshake with {} failed: {}", host, e))
    })
}

fn spawn(command: &str) -> Result<Connection, Error> {
    let mut words = command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| Error::transport("Empty mail process command"))?;

    let mut child = Command::new(program)
        .args(words)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::transport(format!(
                "Failed to start process {}: {}",
                command, e
            ))
        })?;
    debug!("Started mail process {} ({})", command, child.id());

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::transport("Mail process has no stdout"))?;
    Ok(Connection::Process {
        child,
        stdin,
        stdout,
    })
}

#[cfg(test)]
mod test {
    use std::io::BufRead;

    use super::*;

    #[test]
    fn lines_and_translations() {
        let (client, server) = UnixStream::pair().unwrap();
        let mut buffer = IoBuffer::from_connection(Connection::Unix(client));

        let mut server_w = server.try_clone().unwrap();
        server_w.write_all(b"220-hello\r\n220 there\r\n").unwrap();
        assert_eq!("220-hello\r\n", buffer.read_line(0).unwrap());
        assert_eq!("220 there\r\n", buffer.read_line(0).unwrap());

        buffer
            .set_write_translations(&[(&b"\r\n."[..], &b"\r\n.."[..])])
            .unwrap();
        buffer.write(b"a\r\n.b\r").unwrap();
        buffer.write(b"\n.\r\n").unwrap();
        buffer.set_write_translations(&[]).unwrap();
        buffer.write(b".\r\n").unwrap();
        buffer.terminate();
        assert!(!buffer.is_open());

        let mut received = Vec::new();
        io::BufReader::new(server)
            .read_until(0, &mut received)
            .unwrap();
        assert_eq!(b"a\r\n..b\r\n..\r\n.\r\n".to_vec(), received);
    }

    #[test]
    fn eof_is_transport_error() {
        let (client, server) = UnixStream::pair().unwrap();
        drop(server);
        let mut buffer = IoBuffer::from_connection(Connection::Unix(client));
        assert_matches!(Err(Error::Transport { .. }), buffer.read_line(1));
    }

    #[test]
    fn process_connection() {
        let mut buffer = IoBuffer::new();
        buffer
            .initialize(&BufferParams::Process {
                command: "cat".to_owned(),
            })
            .unwrap();
        buffer.write(b"250 echo\r\n").unwrap();
        buffer.flush_buffers().unwrap();
        assert_eq!("250 echo\r\n", buffer.read_line(1).unwrap());
        buffer.terminate();
    }

    #[test]
    fn unopened_buffer() {
        let mut buffer = IoBuffer::new();
        assert!(buffer.write(b"x").is_err());
        assert!(buffer.read_line(0).is_err());
    }
}
