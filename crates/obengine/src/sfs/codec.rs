//! Recursive SFS encoder/decoder (spec.md §4.D). Traverses the `Value` tree
//! emitting/consuming one record per node; attribute prefixing and the
//! 8 KiB scratch buffer fast path for strings/symbols are handled here.

use super::sink::Sink;
use super::source::Source;
use super::tag::*;
use super::value::{Pair, Value, ValueKind};
use crate::error::SfsError;
use byteorder::{LittleEndian, ReadBytesExt};
use slog::{warn, Logger};
use std::convert::TryInto;

const SCRATCH_SIZE: usize = 8192;

/// Encodes `value` into `sink`, emitting an `ATTRSXP` prefix first if the
/// value carries attributes, per spec.md §4.D.
pub fn encode(value: &Value, sink: &mut dyn Sink) -> Result<(), SfsError> {
    encode_value(value, sink)?;
    sink.finish()
}

fn encode_value(value: &Value, sink: &mut dyn Sink) -> Result<(), SfsError> {
    if !value.attributes.is_empty() {
        sink.store(ATTRSXP, 0, value.attributes.len() as u64, None)?;
        for (name, attr_value) in &value.attributes {
            encode_value(&Value::sym(name.clone()), sink)?;
            encode_value(attr_value, sink)?;
        }
    }

    match &value.kind {
        ValueKind::Nil => sink.store(NILSXP, 0, 0, None),
        ValueKind::Sym(name) => encode_string_like(SYMSXP, name, sink),
        ValueKind::Char(s) => encode_string_like(CHARSXP, s, sink),
        ValueKind::Env => sink.store(ENVSXP, 0, 0, None),
        ValueKind::S4 => sink.store(S4SXP, 0, 0, None),
        ValueKind::Lgl(items) => encode_numeric(LGLSXP, 4, items, sink, |w, v| {
            w.extend_from_slice(&v.to_le_bytes())
        }),
        ValueKind::Int(items) => encode_numeric(INTSXP, 4, items, sink, |w, v| {
            w.extend_from_slice(&v.to_le_bytes())
        }),
        ValueKind::Real(items) => encode_numeric(REALSXP, 8, items, sink, |w, v| {
            w.extend_from_slice(&v.to_le_bytes())
        }),
        ValueKind::Cplx(items) => {
            let mut bytes = Vec::with_capacity(items.len() * 16);
            for (re, im) in items {
                bytes.extend_from_slice(&re.to_le_bytes());
                bytes.extend_from_slice(&im.to_le_bytes());
            }
            sink.store(CPLXSXP, 16, items.len() as u64, Some(&bytes))
        }
        ValueKind::Raw(bytes) => sink.store(RAWSXP, 1, bytes.len() as u64, Some(bytes)),
        ValueKind::Str(items) => {
            sink.store(STRSXP, 0, items.len() as u64, None)?;
            for item in items {
                encode_value(&Value::char(item.clone()), sink)?;
            }
            Ok(())
        }
        ValueKind::Vec(items) => {
            sink.store(VECSXP, 0, items.len() as u64, None)?;
            for item in items {
                encode_value(item, sink)?;
            }
            Ok(())
        }
        ValueKind::List(pairs) => encode_pairlist(LISTSXP, pairs, sink),
        ValueKind::Lang(pairs) => encode_pairlist(LANGSXP, pairs, sink),
        ValueKind::Clo { formals, body, env } => {
            sink.store(CLOSXP, 3, 0, None)?;
            encode_value(formals, sink)?;
            encode_value(body, sink)?;
            encode_value(env, sink)
        }
    }
}

fn encode_string_like(tag: u8, s: &str, sink: &mut dyn Sink) -> Result<(), SfsError> {
    if s.is_empty() {
        return sink.store(tag, 0, 0, None);
    }
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    sink.store(tag, 0, bytes.len() as u64, Some(&bytes))
}

fn encode_numeric<T: Copy>(
    tag: u8,
    element_size: u32,
    items: &[T],
    sink: &mut dyn Sink,
    mut push: impl FnMut(&mut Vec<u8>, T),
) -> Result<(), SfsError> {
    let mut bytes = Vec::with_capacity(items.len() * element_size as usize);
    for &item in items {
        push(&mut bytes, item);
    }
    sink.store(tag, element_size, items.len() as u64, Some(&bytes))
}

fn encode_pairlist(tag: u8, pairs: &[Pair], sink: &mut dyn Sink) -> Result<(), SfsError> {
    sink.store(tag, 0, pairs.len() as u64, None)?;
    for (name, value) in pairs {
        match name {
            Some(name) => encode_value(&Value::sym(name.clone()), sink)?,
            None => encode_value(&Value::nil(), sink)?,
        }
        encode_value(value, sink)?;
    }
    Ok(())
}

/// Decodes one value (and its attribute prefix, if present) from `source`.
/// `logger` receives a warning whenever a node degrades rather than errors
/// out (currently just `ENVSXP`, per spec.md §4.D/§7) — pass
/// `&Logger::root(Discard, o!())` where no sink is wired up.
pub fn decode(source: &mut dyn Source, logger: &Logger) -> Result<Value, SfsError> {
    let header = read_header(source)?;
    let tag = (header & 0xFF) as u8;
    let length = header >> 8;

    if tag == ATTRSXP {
        let mut attributes = Vec::with_capacity(length as usize);
        for _ in 0..length {
            let name_value = decode(source, logger)?;
            let name = match name_value.kind {
                ValueKind::Sym(name) => name,
                _ => String::new(),
            };
            let value = decode(source, logger)?;
            attributes.push((name, value));
        }
        let mut value = decode(source, logger)?;
        let is_object = attributes.iter().any(|(name, _)| name == "class");
        value.attributes = attributes;
        value.is_object = value.is_object || is_object;
        return Ok(value);
    }

    decode_body(tag, length, source, logger)
}

fn decode_body(tag: u8, length: u64, source: &mut dyn Source, logger: &Logger) -> Result<Value, SfsError> {
    match tag {
        NILSXP => Ok(Value::nil()),
        ENVSXP => {
            // Environments are never serialized; this is a warning, not a
            // fatal error, per spec.md §4.D/§7.
            warn!(logger, "decoded ENVSXP to null"; "tag" => ENVSXP);
            Ok(Value::nil())
        }
        S4SXP => Ok(Value::new(ValueKind::S4)),
        SYMSXP => Ok(Value::new(ValueKind::Sym(decode_string_bytes(
            source, length,
        )?))),
        CHARSXP => Ok(Value::new(ValueKind::Char(decode_string_bytes(
            source, length,
        )?))),
        LGLSXP => Ok(Value::new(ValueKind::Lgl(decode_i32_vec(source, length)?))),
        INTSXP => Ok(Value::new(ValueKind::Int(decode_i32_vec(source, length)?))),
        REALSXP => Ok(Value::new(ValueKind::Real(decode_f64_vec(source, length)?))),
        CPLXSXP => {
            let mut items = Vec::with_capacity(length as usize);
            for _ in 0..length {
                let mut buf = [0u8; 16];
                source.fetch(&mut buf)?;
                let re = f64::from_le_bytes(buf[0..8].try_into().unwrap());
                let im = f64::from_le_bytes(buf[8..16].try_into().unwrap());
                items.push((re, im));
            }
            Ok(Value::new(ValueKind::Cplx(items)))
        }
        RAWSXP => {
            let mut bytes = vec![0u8; length as usize];
            source.fetch(&mut bytes)?;
            Ok(Value::new(ValueKind::Raw(bytes)))
        }
        STRSXP => {
            let mut items = Vec::with_capacity(length as usize);
            for _ in 0..length {
                let value = decode(source, logger)?;
                items.push(match value.kind {
                    ValueKind::Char(s) => s,
                    _ => String::new(),
                });
            }
            Ok(Value::new(ValueKind::Str(items)))
        }
        VECSXP => {
            let mut items = Vec::with_capacity(length as usize);
            for _ in 0..length {
                items.push(decode(source, logger)?);
            }
            Ok(Value::new(ValueKind::Vec(items)))
        }
        LISTSXP | LANGSXP => {
            let mut pairs = Vec::with_capacity(length as usize);
            for _ in 0..length {
                let name_value = decode(source, logger)?;
                let name = match name_value.kind {
                    ValueKind::Sym(name) => Some(name),
                    _ => None,
                };
                let value = decode(source, logger)?;
                pairs.push((name, value));
            }
            if tag == LISTSXP {
                Ok(Value::new(ValueKind::List(pairs)))
            } else {
                Ok(Value::new(ValueKind::Lang(pairs)))
            }
        }
        CLOSXP => {
            let formals = Box::new(decode(source, logger)?);
            let body = Box::new(decode(source, logger)?);
            let env = Box::new(decode(source, logger)?);
            Ok(Value::new(ValueKind::Clo { formals, body, env }))
        }
        other => Err(SfsError::UnimplementedTag(other)),
    }
}

fn read_header(source: &mut dyn Source) -> Result<u64, SfsError> {
    let mut buf = [0u8; 8];
    source.fetch(&mut buf)?;
    Ok((&buf[..]).read_u64::<LittleEndian>()?)
}

/// Reads `length` bytes of string/symbol payload using an 8 KiB stack
/// scratch buffer, falling back to a heap allocation for larger payloads
/// (spec.md §4.D's small-string fast path). `length == 0` denotes the empty
/// string with no payload at all.
fn decode_string_bytes(source: &mut dyn Source, length: u64) -> Result<String, SfsError> {
    if length == 0 {
        return Ok(String::new());
    }
    let len = length as usize;
    let bytes = if len <= SCRATCH_SIZE {
        let mut scratch = [0u8; SCRATCH_SIZE];
        source.fetch(&mut scratch[..len])?;
        scratch[..len].to_vec()
    } else {
        let mut heap = vec![0u8; len];
        source.fetch(&mut heap)?;
        heap
    };
    // Payload includes the trailing NUL; strip it.
    let without_nul = if bytes.last() == Some(&0) {
        &bytes[..bytes.len() - 1]
    } else {
        &bytes[..]
    };
    Ok(String::from_utf8_lossy(without_nul).into_owned())
}

fn decode_i32_vec(source: &mut dyn Source, length: u64) -> Result<Vec<i32>, SfsError> {
    let mut bytes = vec![0u8; length as usize * 4];
    source.fetch(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn decode_f64_vec(source: &mut dyn Source, length: u64) -> Result<Vec<f64>, SfsError> {
    let mut bytes = vec![0u8; length as usize * 8];
    source.fetch(&mut bytes)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfs::sink::MemSink;
    use crate::sfs::source::MemSource;
    use slog::{o, Discard};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn round_trip(value: &Value) -> Value {
        let mut sink = MemSink::new();
        encode(value, &mut sink).unwrap();
        let bytes = sink.into_bytes();
        let mut source = MemSource::new(&bytes);
        decode(&mut source, &test_logger()).unwrap()
    }

    #[test]
    fn round_trips_nested_vector() {
        let value = Value::vec(vec![Value::int(vec![1, 2, 3]), Value::real(vec![1.5, 2.5])]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn round_trips_named_pairlist() {
        let value = Value::new(ValueKind::List(vec![
            (Some("a".to_string()), Value::int(vec![1])),
            (None, Value::int(vec![2])),
        ]));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn round_trips_large_raw_vector() {
        let bytes: Vec<u8> = (0..(16 * 1024 * 1024 + 37)).map(|i| (i % 256) as u8).collect();
        let value = Value::raw(bytes);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn round_trips_short_and_long_strings() {
        let long = "x".repeat(9000);
        let value = Value::str_vec(vec!["short".to_string(), long]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn round_trips_attributes_and_class_flag() {
        let value = Value::int(vec![1, 2, 3]).with_attribute("class", Value::str_vec(vec!["foo".into()]));
        let decoded = round_trip(&value);
        assert!(decoded.is_object);
        assert_eq!(decoded.attributes.len(), 1);
        assert_eq!(decoded.kind, value.kind);
    }

    #[test]
    fn header_is_length_shifted_and_tagged() {
        let mut sink = MemSink::new();
        encode_value(&Value::int(vec![1, 2, 3]), &mut sink).unwrap();
        let bytes = sink.into_bytes();
        let header = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(header, (3u64 << 8) | (INTSXP as u64));
    }

    #[test]
    fn truncated_buffer_fails_decode() {
        let mut sink = MemSink::new();
        encode(&Value::int(vec![1, 2, 3]), &mut sink).unwrap();
        let mut bytes = sink.into_bytes();
        bytes.pop();
        let mut source = MemSource::new(&bytes);
        assert!(decode(&mut source, &test_logger()).is_err());
    }

    #[test]
    fn env_decodes_to_null_with_warning_not_error() {
        let value = Value::new(ValueKind::Env);
        let decoded = round_trip(&value);
        assert_eq!(decoded, Value::nil());
    }

    #[test]
    fn env_decode_emits_a_warning() {
        use slog::Drain;
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct RecordingDrain(Arc<Mutex<Vec<String>>>);

        impl Drain for RecordingDrain {
            type Ok = ();
            type Err = std::convert::Infallible;

            fn log(
                &self,
                record: &slog::Record,
                _values: &slog::OwnedKVList,
            ) -> Result<Self::Ok, Self::Err> {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("{}", record.msg()));
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::root(RecordingDrain(Arc::clone(&log)).fuse(), o!());

        let mut sink = MemSink::new();
        encode(&Value::new(ValueKind::Env), &mut sink).unwrap();
        let bytes = sink.into_bytes();
        let mut source = MemSource::new(&bytes);
        decode(&mut source, &logger).unwrap();

        assert!(log.lock().unwrap().iter().any(|line| line.contains("ENVSXP")));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        // Tag 200 is unused in the repertoire.
        let header_bytes = (0u64 << 8 | 200u64).to_le_bytes();
        let mut source = MemSource::new(&header_bytes);
        assert!(decode(&mut source, &test_logger()).is_err());
    }
}
