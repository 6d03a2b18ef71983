//! 4.G Chunked HTTP sink for SFS — wraps an HTTP connection as an SFS store
//! sink with a bounded internal buffer and a flush policy tuned to avoid
//! both small-write overhead and needless copying of large payloads.

use crate::error::SfsError;
use crate::http::connection::Connection;
use crate::sfs::sink::Sink;
use std::io::{Read, Write};

const MAX_BUFFER: usize = 16 * 1024 * 1024;
const LARGE_PAYLOAD: usize = 2 * 1024 * 1024;

/// Anything capable of writing one HTTP chunk; implemented for `Connection`
/// so `ChunkedSink` doesn't need to be generic over the whole connection
/// type, only this one operation.
pub trait ChunkWriter {
    fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()>;
}

impl<S: Read + Write> ChunkWriter for Connection<S> {
    fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.send_chunk(data).map_err(|e| match e {
            crate::error::HttpError::Io(io_err) => io_err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        })
    }
}

/// Buffers SFS record bytes and emits them as HTTP chunks per spec.md §4.G's
/// write policy. Errors are latched: once a write fails, every subsequent
/// `store` call returns the same error without touching the transport again.
pub struct ChunkedSink<'a> {
    writer: &'a mut dyn ChunkWriter,
    buf: Vec<u8>,
    failed: bool,
}

impl<'a> ChunkedSink<'a> {
    pub fn new(writer: &'a mut dyn ChunkWriter) -> ChunkedSink<'a> {
        ChunkedSink {
            writer,
            buf: Vec::new(),
            failed: false,
        }
    }

    fn flush_buffer(&mut self) -> Result<(), SfsError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = self.writer.write_chunk(&self.buf);
        self.buf.clear();
        result.map_err(SfsError::Io)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), SfsError> {
        if self.failed {
            return Err(already_failed());
        }

        let free_space = MAX_BUFFER.saturating_sub(self.buf.len());
        let buffer_half_full = self.buf.len() * 2 >= MAX_BUFFER;

        if data.len() > free_space && (buffer_half_full || data.len() >= LARGE_PAYLOAD) {
            let outcome = self.flush_buffer();
            if outcome.is_err() {
                self.failed = true;
                return outcome;
            }
        }

        let outcome = if self.buf.is_empty() && data.len() >= LARGE_PAYLOAD {
            self.writer.write_chunk(data).map_err(SfsError::Io)
        } else {
            self.buf.extend_from_slice(data);
            Ok(())
        };

        if outcome.is_err() {
            self.failed = true;
        }
        outcome
    }
}

fn already_failed() -> SfsError {
    SfsError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "chunked sink already failed",
    ))
}

impl<'a> Sink for ChunkedSink<'a> {
    fn store(
        &mut self,
        tag: u8,
        _element_size: u32,
        length: u64,
        payload: Option<&[u8]>,
    ) -> Result<(), SfsError> {
        if self.failed {
            return Err(already_failed());
        }
        let header = ((length << 8) | tag as u64).to_le_bytes();
        self.write_bytes(&header)?;
        if let Some(payload) = payload {
            self.write_bytes(payload)?;
        }
        Ok(())
    }

    /// Flushes any remaining buffered bytes as one final chunk, then sends
    /// the terminating zero-length chunk, per spec.md §4.G.
    fn finish(&mut self) -> Result<(), SfsError> {
        if self.failed {
            return Ok(());
        }
        self.flush_buffer()?;
        self.writer.write_chunk(&[]).map_err(SfsError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfs::tag::INTSXP;

    struct RecordingWriter {
        chunks: Vec<Vec<u8>>,
        fail_after: Option<usize>,
    }

    impl RecordingWriter {
        fn new() -> RecordingWriter {
            RecordingWriter {
                chunks: Vec::new(),
                fail_after: None,
            }
        }
    }

    impl ChunkWriter for RecordingWriter {
        fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
            if let Some(n) = self.fail_after {
                if self.chunks.len() >= n {
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
                }
            }
            self.chunks.push(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn small_writes_are_buffered_not_flushed_immediately() {
        let mut writer = RecordingWriter::new();
        let mut sink = ChunkedSink::new(&mut writer);
        sink.store(INTSXP, 4, 1, Some(&[1, 2, 3, 4])).unwrap();
        assert!(writer.chunks.is_empty());
    }

    #[test]
    fn finish_flushes_buffer_then_sends_terminator() {
        let mut writer = RecordingWriter::new();
        {
            let mut sink = ChunkedSink::new(&mut writer);
            sink.store(INTSXP, 4, 1, Some(&[1, 2, 3, 4])).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(writer.chunks.len(), 2);
        assert!(writer.chunks.last().unwrap().is_empty());
    }

    #[test]
    fn large_payload_on_empty_buffer_is_sent_directly() {
        let mut writer = RecordingWriter::new();
        let big = vec![0u8; LARGE_PAYLOAD];
        {
            let mut sink = ChunkedSink::new(&mut writer);
            sink.store(crate::sfs::tag::RAWSXP, 1, big.len() as u64, Some(&big))
                .unwrap();
        }
        // header goes to the buffer, the oversized payload bypasses it.
        assert_eq!(writer.chunks.len(), 1);
        assert_eq!(writer.chunks[0].len(), big.len());
    }

    #[test]
    fn write_error_is_latched() {
        let mut writer = RecordingWriter::new();
        writer.fail_after = Some(0);
        let mut sink = ChunkedSink::new(&mut writer);
        let big = vec![0u8; LARGE_PAYLOAD];
        assert!(sink
            .store(crate::sfs::tag::RAWSXP, 1, big.len() as u64, Some(&big))
            .is_err());
        assert!(sink.store(INTSXP, 4, 1, Some(&[0u8; 4])).is_err());
    }
}
