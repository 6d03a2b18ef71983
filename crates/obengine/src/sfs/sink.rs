//! Pluggable SFS store sinks (spec.md §4.D). The trait mirrors the original
//! C project's `store_api_t` vtable (`(ctx, tag, element_size, length,
//! payload?) -> void`) but as a safe Rust trait instead of a function
//! pointer plus opaque context, per spec.md §9's design note.

use crate::error::SfsError;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// A destination for SFS records. Implementations receive one call per
/// record: `payload` is `None` for composite headers whose children follow
/// recursively.
pub trait Sink {
    fn store(
        &mut self,
        tag: u8,
        element_size: u32,
        length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError>;

    /// Called once encoding completes, to flush any buffered bytes. Default
    /// no-op for sinks that write eagerly.
    fn finish(&mut self) -> Result<(), SfsError> {
        Ok(())
    }
}

fn header(tag: u8, length: u64) -> u64 {
    (length << 8) | (tag as u64)
}

/// In-memory growable-buffer sink, flattened to a single byte vector.
#[derive(Default)]
pub struct MemSink {
    buf: Vec<u8>,
}

impl MemSink {
    pub fn new() -> MemSink {
        MemSink::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Sink for MemSink {
    fn store(
        &mut self,
        tag: u8,
        _element_size: u32,
        length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError> {
        self.buf.write_u64::<LittleEndian>(header(tag, length))?;
        if let Some(payload) = payload {
            self.buf.write_all(payload)?;
        }
        Ok(())
    }
}

/// File-descriptor (or any `Write`) sink, chunked at `max_send` bytes per
/// underlying write call.
pub struct FdSink<W: Write> {
    writer: W,
    max_send: usize,
}

impl<W: Write> FdSink<W> {
    pub fn new(writer: W, max_send: usize) -> FdSink<W> {
        FdSink {
            writer,
            max_send: max_send.max(1),
        }
    }

    fn write_chunked(&mut self, mut data: &[u8]) -> Result<(), SfsError> {
        while !data.is_empty() {
            let take = data.len().min(self.max_send);
            self.writer.write_all(&data[..take])?;
            data = &data[take..];
        }
        Ok(())
    }
}

impl<W: Write> Sink for FdSink<W> {
    fn store(
        &mut self,
        tag: u8,
        _element_size: u32,
        length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError> {
        let header_bytes = header(tag, length).to_le_bytes();
        self.write_chunked(&header_bytes)?;
        if let Some(payload) = payload {
            self.write_chunked(payload)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SfsError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Per-tag counters and byte totals, used for introspection/metrics rather
/// than transport.
#[derive(Default, Debug, Clone)]
pub struct Stats {
    pub records: u64,
    pub bytes: u64,
    pub per_tag_records: [u64; 256],
    pub per_tag_bytes: [u64; 256],
}

#[derive(Default)]
pub struct StatsSink {
    pub stats: Stats,
}

impl Sink for StatsSink {
    fn store(
        &mut self,
        tag: u8,
        _element_size: u32,
        _length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError> {
        let bytes = 8 + payload.map(|p| p.len()).unwrap_or(0) as u64;
        self.stats.records += 1;
        self.stats.bytes += bytes;
        self.stats.per_tag_records[tag as usize] += 1;
        self.stats.per_tag_bytes[tag as usize] += bytes;
        Ok(())
    }
}

/// A sink whose first send error is latched; further calls become no-ops
/// that keep returning the latched error, matching spec.md §4.G's
/// "any send error is latched and suppresses further sink activity" rule for
/// the chunked HTTP sink (component G), and reusable by any sink wrapping a
/// fallible transport.
pub struct LatchingSink<S: Sink> {
    inner: S,
    failed: AtomicBool,
}

impl<S: Sink> LatchingSink<S> {
    pub fn new(inner: S) -> LatchingSink<S> {
        LatchingSink {
            inner,
            failed: AtomicBool::new(false),
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl<S: Sink> Sink for LatchingSink<S> {
    fn store(
        &mut self,
        tag: u8,
        element_size: u32,
        length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(SfsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "sink already failed",
            )));
        }
        match self.inner.store(tag, element_size, length, payload) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failed.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn finish(&mut self) -> Result<(), SfsError> {
        if self.failed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfs::tag::INTSXP;
    use std::convert::TryInto;

    #[test]
    fn header_format_for_int_length_3() {
        let mut sink = MemSink::new();
        sink.store(INTSXP, 4, 3, Some(&[0u8; 12])).unwrap();
        let bytes = sink.into_bytes();
        let hdr = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(hdr, (3u64 << 8) | (INTSXP as u64));
    }
}
