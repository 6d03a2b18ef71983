//! The TCP line-oriented protocol ("osrv"), spec.md §6.1. One connection
//! processes commands in a loop until the peer disconnects, a parse error
//! occurs, or a structured `GET` ends the exchange with an SFS stream.

use obengine::sfs::{self, FdSink};
use obengine::Engine;
use slog::{debug, o, warn, Logger};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

const SEND_CHUNK_MAX: usize = 1024 * 1024;

pub fn handle_connection(stream: TcpStream, engine: Arc<Engine>, logger: Logger) {
    let peer_logger = stream
        .peer_addr()
        .map(|addr| logger.new(o!("peer" => addr.to_string())))
        .unwrap_or(logger);

    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            warn!(peer_logger, "failed to clone socket"; "error" => %err);
            return;
        }
    };
    let mut reader = BufReader::new(stream);

    loop {
        let line = match read_line(&mut reader) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(peer_logger, "line read failed, closing"; "error" => %err);
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        match dispatch(&line, &mut reader, &mut writer, &engine, &peer_logger) {
            Ok(Continue::Keep) => continue,
            Ok(Continue::Close) | Err(_) => break,
        }
    }
}

enum Continue {
    Keep,
    Close,
}

fn dispatch(
    line: &str,
    reader: &mut BufReader<TcpStream>,
    writer: &mut TcpStream,
    engine: &Engine,
    logger: &Logger,
) -> std::io::Result<Continue> {
    let (verb, rest) = split_verb(line);
    if !is_uppercase_verb(verb) {
        write_line(writer, "UNSUPP")?;
        return Ok(Continue::Keep);
    }

    match verb {
        "GET" => handle_get(rest.trim(), writer, engine, logger),
        "HAS" => {
            if engine.has(rest.trim()) {
                write_line(writer, "OK")?;
            } else {
                write_line(writer, "NF")?;
            }
            Ok(Continue::Keep)
        }
        "DEL" => {
            if engine.get(rest.trim(), true).is_some() {
                write_line(writer, "OK")?;
            } else {
                write_line(writer, "NF")?;
            }
            Ok(Continue::Keep)
        }
        "PUT" => handle_put(rest.trim(), reader, writer, engine),
        _ => {
            write_line(writer, "UNSUPP")?;
            Ok(Continue::Keep)
        }
    }
}

fn handle_get(
    key: &str,
    writer: &mut TcpStream,
    engine: &Engine,
    logger: &Logger,
) -> std::io::Result<Continue> {
    let artifact = match engine.get(key, false) {
        Some(artifact) => artifact,
        None => {
            write_line(writer, "NF")?;
            return Ok(Continue::Keep);
        }
    };

    if let Some(raw) = &artifact.raw {
        write_line(writer, &format!("OK {}", raw.len()))?;
        send_chunked(writer, raw)?;
        return Ok(Continue::Keep);
    }

    if let Some(handle) = &artifact.structured {
        write_line(writer, "OK ?")?;
        let mut sink = FdSink::new(writer.try_clone()?, SEND_CHUNK_MAX);
        if let Err(err) = sfs::encode(handle.value(), &mut sink) {
            warn!(logger, "sfs encode failed mid-stream"; "error" => %err);
        }
        // Structured GET ends the exchange; the client reads until EOF.
        return Ok(Continue::Close);
    }

    write_line(writer, "NF")?;
    Ok(Continue::Keep)
}

fn handle_put(
    key: &str,
    reader: &mut BufReader<TcpStream>,
    writer: &mut TcpStream,
    engine: &Engine,
) -> std::io::Result<Continue> {
    let length_line = match read_line(reader)? {
        Some(line) => line,
        None => return Ok(Continue::Close),
    };

    if length_line.trim() == "?" {
        write_line(writer, "UNSUPP")?;
        return Ok(Continue::Keep);
    }

    let n: i64 = match length_line.trim().parse() {
        Ok(n) if n >= 0 => n,
        _ => {
            write_line(writer, "INV")?;
            return Ok(Continue::Keep);
        }
    };

    let mut body = vec![0u8; n as usize];
    if reader.read_exact(&mut body).is_err() {
        return Ok(Continue::Close);
    }

    engine.put_raw(key, body);
    write_line(writer, "OK")?;
    Ok(Continue::Keep)
}

fn send_chunked(writer: &mut impl Write, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        let take = data.len().min(SEND_CHUNK_MAX);
        writer.write_all(&data[..take])?;
        data = &data[take..];
    }
    Ok(())
}

fn write_line(writer: &mut impl Write, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")
}

fn read_line(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Splits on the first run of whitespace; the argument is trimmed of spaces
/// and tabs by the caller, per spec.md §6.1.
fn split_verb(line: &str) -> (&str, &str) {
    match line.find(|c: char| c == ' ' || c == '\t') {
        Some(pos) => (&line[..pos], &line[pos..]),
        None => (line, ""),
    }
}

fn is_uppercase_verb(verb: &str) -> bool {
    !verb.is_empty() && verb.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_verb_and_argument() {
        assert_eq!(split_verb("GET foo"), ("GET", " foo"));
        assert_eq!(split_verb("HAS"), ("HAS", ""));
    }

    #[test]
    fn rejects_lowercase_verbs() {
        assert!(!is_uppercase_verb("get"));
        assert!(is_uppercase_verb("GET"));
    }
}
