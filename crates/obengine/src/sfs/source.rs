//! Pluggable SFS fetch sources (spec.md §4.D). Mirrors the original's
//! `fetch_api_t` vtable (`(ctx, buffer, length) -> void`, synchronous, fatal
//! on short read) as a safe trait.

use crate::error::SfsError;
use crate::host::HostRuntime;
use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// A source of SFS bytes. `fetch` must fill `buf` completely or fail —
/// partial reads are always fatal, per spec.md §4.D.
pub trait Source {
    fn fetch(&mut self, buf: &mut [u8]) -> Result<(), SfsError>;
}

/// In-memory byte slice source.
pub struct MemSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemSource<'a> {
    pub fn new(data: &'a [u8]) -> MemSource<'a> {
        MemSource { data, pos: 0 }
    }
}

impl<'a> Source for MemSource<'a> {
    fn fetch(&mut self, buf: &mut [u8]) -> Result<(), SfsError> {
        let remaining = self.data.len() - self.pos;
        if remaining < buf.len() {
            return Err(SfsError::ShortRead {
                expected: buf.len(),
                got: remaining,
            });
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
}

/// File-descriptor (or any `Read`) source.
pub struct FdSource<R: Read> {
    reader: R,
}

impl<R: Read> FdSource<R> {
    pub fn new(reader: R) -> FdSource<R> {
        FdSource { reader }
    }
}

impl<R: Read> Source for FdSource<R> {
    fn fetch(&mut self, buf: &mut [u8]) -> Result<(), SfsError> {
        let got = fill_exact_or_count(&mut self.reader, buf)?;
        if got != buf.len() {
            return Err(SfsError::ShortRead {
                expected: buf.len(),
                got,
            });
        }
        Ok(())
    }
}

/// Fills `buf` with as many bytes as the reader yields before hitting EOF,
/// returning the count read (which may be less than `buf.len()`). Unlike
/// `Read::read_exact`, this never turns an early EOF into a generic error —
/// the caller decides what a short read means.
fn fill_exact_or_count<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// TCP socket source with a short receive timeout, polling the host
/// runtime's `interrupt_check` hook between retries — the suspension point
/// spec.md §5 documents for SFS sources that use sockets.
pub struct SocketSource {
    stream: TcpStream,
    host: Arc<dyn HostRuntime>,
    recv_timeout: Duration,
}

impl SocketSource {
    pub fn new(stream: TcpStream, host: Arc<dyn HostRuntime>) -> std::io::Result<SocketSource> {
        let recv_timeout = Duration::from_millis(200);
        stream.set_read_timeout(Some(recv_timeout))?;
        Ok(SocketSource {
            stream,
            host,
            recv_timeout,
        })
    }
}

impl Source for SocketSource {
    fn fetch(&mut self, buf: &mut [u8]) -> Result<(), SfsError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(SfsError::ShortRead {
                        expected: buf.len(),
                        got: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if self.host.interrupt_check() {
                        return Err(SfsError::Io(std::io::Error::new(
                            std::io::ErrorKind::Interrupted,
                            "interrupted by host runtime",
                        )));
                    }
                    let _ = self.recv_timeout;
                    continue;
                }
                Err(e) => return Err(SfsError::Io(e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_is_fatal() {
        let data = [1u8, 2, 3];
        let mut source = MemSource::new(&data);
        let mut buf = [0u8; 4];
        assert!(source.fetch(&mut buf).is_err());
    }

    #[test]
    fn exact_read_succeeds() {
        let data = [1u8, 2, 3, 4];
        let mut source = MemSource::new(&data);
        let mut buf = [0u8; 4];
        source.fetch(&mut buf).unwrap();
        assert_eq!(buf, data);
    }
}
