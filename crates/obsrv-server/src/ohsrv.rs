//! The HTTP/1.x protocol ("ohsrv"), spec.md §6.2: `/data/<key>` for raw or
//! structured artifact access, `/work/<path>` to push onto the shared
//! completion/work queue.

use obengine::chunked::ChunkedSink;
use obengine::http::{Connection, Method, Request};
use obengine::sfs;
use obengine::Engine;
use slog::{debug, o, warn, Logger};
use std::net::TcpStream;
use std::sync::Arc;

pub fn handle_connection(
    stream: TcpStream,
    engine: Arc<Engine>,
    logger: Logger,
    line_buffer_cap: usize,
    max_body: i64,
) {
    let peer_logger = stream
        .peer_addr()
        .map(|addr| logger.new(o!("peer" => addr.to_string())))
        .unwrap_or(logger);

    let mut conn = Connection::new(stream, line_buffer_cap, max_body);

    loop {
        let request = match conn.read_request() {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) => {
                let (code, text) = err.status();
                debug!(peer_logger, "request parse failed"; "status" => code);
                let _ = conn.respond(code, text, Some("text/plain"), 0, None);
                break;
            }
        };

        let close_after = conn.should_close(&request);

        if let Err(err) = route(&mut conn, &request, &engine) {
            warn!(peer_logger, "connection write failed"; "error" => %err);
            break;
        }

        if close_after {
            break;
        }
    }
}

fn route(
    conn: &mut Connection<TcpStream>,
    request: &Request,
    engine: &Engine,
) -> std::io::Result<()> {
    if let Some(key) = request.uri.strip_prefix("/data/") {
        return route_data(conn, request, engine, key);
    }
    if let Some(path) = request.uri.strip_prefix("/work/") {
        return route_work(conn, request, engine, path);
    }
    respond_empty(conn, 404, "Not Found")
}

fn route_data(
    conn: &mut Connection<TcpStream>,
    request: &Request,
    engine: &Engine,
    key: &str,
) -> std::io::Result<()> {
    match request.method {
        Method::Get => {
            let artifact = match engine.get(key, false) {
                Some(artifact) => artifact,
                None => return respond_empty(conn, 404, "Not Found"),
            };
            if let Some(raw) = &artifact.raw {
                conn.respond(200, "OK", Some("application/octet-stream"), raw.len() as i64, None)
                    .map_err(to_io)?;
                conn.send(raw).map_err(to_io)
            } else if let Some(handle) = &artifact.structured {
                conn.respond(
                    200,
                    "OK",
                    Some("application/octet-stream"),
                    -1,
                    Some("Transfer-Encoding: chunked\r\n"),
                )
                .map_err(to_io)?;
                let value = handle.value().clone();
                let mut sink = ChunkedSink::new(conn);
                sfs::encode(&value, &mut sink).map_err(|err| {
                    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
                })
            } else {
                respond_empty(conn, 404, "Not Found")
            }
        }
        Method::Head => match engine.get(key, false) {
            Some(artifact) => conn
                .respond(200, "OK", None, artifact.len as i64, None)
                .map_err(to_io),
            None => respond_empty(conn, 404, "Not Found"),
        },
        Method::Delete => match engine.get(key, true) {
            Some(_) => respond_empty(conn, 200, "OK"),
            None => respond_empty(conn, 404, "Not Found"),
        },
        Method::Put => {
            engine.put_raw(key, request.body.clone());
            respond_empty(conn, 200, "OK")
        }
        _ => respond_empty(conn, 405, "Method Not Allowed"),
    }
}

fn route_work(
    conn: &mut Connection<TcpStream>,
    request: &Request,
    engine: &Engine,
    _path: &str,
) -> std::io::Result<()> {
    if !matches!(request.method, Method::Post) {
        return respond_empty(conn, 405, "Method Not Allowed");
    }
    if request.body.is_empty() {
        return respond_empty(conn, 403, "Forbidden");
    }
    engine.push_work(request.body.clone());
    respond_empty(conn, 200, "OK")
}

fn respond_empty(conn: &mut Connection<TcpStream>, code: u16, text: &str) -> std::io::Result<()> {
    conn.respond(code, text, None, 0, None).map_err(to_io)
}

fn to_io(err: obengine::HttpError) -> std::io::Error {
    match err {
        obengine::HttpError::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}
