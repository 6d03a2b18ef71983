//! End-to-end scenarios from spec.md §8's "Concrete end-to-end scenarios",
//! driven over real loopback sockets against the two protocol handlers.

use obengine::deps::decode_resolved_event;
use obengine::host::NoopHostRuntime;
use obengine::{Engine, Server};
use obsrv_server::{ohsrv, osrv};
use slog::{o, Discard, Logger};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

fn discard_logger() -> Logger {
    Logger::root(Discard, o!())
}

fn start_line_server(engine: Arc<Engine>) -> Server {
    let logger = discard_logger();
    Server::start("127.0.0.1", 0, 4, logger.clone(), move |stream| {
        osrv::handle_connection(stream, Arc::clone(&engine), logger.clone())
    })
    .unwrap()
}

fn start_http_server(engine: Arc<Engine>) -> Server {
    let logger = discard_logger();
    Server::start("127.0.0.1", 0, 4, logger.clone(), move |stream| {
        ohsrv::handle_connection(stream, Arc::clone(&engine), logger.clone(), 32 * 1024, 2_000_000_000)
    })
    .unwrap()
}

/// Reads whatever the peer sends within a short window: enough for these
/// tests' small, fixed-shape replies without hanging on a `read_exact` that
/// can never be satisfied once the server goes back to waiting for more
/// keep-alive input.
fn read_available(stream: &mut TcpStream, max: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    loop {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled >= max {
                    break;
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => panic!("unexpected read error: {}", e),
        }
    }
    buf.truncate(filled);
    buf
}

#[test]
fn scenario_1_line_protocol_put_then_get() {
    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));
    let server = start_line_server(engine);
    let addr = server.local_addr();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"PUT greeting\n5\nhello").unwrap();
    let reply = read_available(&mut client, 64);
    assert_eq!(reply, b"OK\n");

    client.write_all(b"GET greeting\n").unwrap();
    let reply = read_available(&mut client, 64);
    assert_eq!(reply, b"OK 5\nhello");
}

#[test]
fn scenario_2_http_put_then_get_raw_artifact() {
    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));
    let server = start_http_server(engine);
    let addr = server.local_addr();

    let mut client = TcpStream::connect(addr).unwrap();
    let put_request = format!(
        "PUT /data/k HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nworld"
    );
    client.write_all(put_request.as_bytes()).unwrap();
    let reply = String::from_utf8(read_available(&mut client, 200)).unwrap();
    assert!(reply.starts_with("HTTP/1.1 200"));

    let mut client2 = TcpStream::connect(addr).unwrap();
    let get_request = "GET /data/k HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    client2.write_all(get_request.as_bytes()).unwrap();
    let reply = String::from_utf8(read_available(&mut client2, 200)).unwrap();
    assert!(reply.contains("Content-Length: 5"));
    assert!(reply.ends_with("world"));
}

#[test]
fn scenario_3_eventually_present_dependency_fires_once() {
    let engine = Engine::default();
    engine.add_dep("job1", &["a".to_string(), "b".to_string()], 7);
    assert!(engine.queue().pop().is_none());

    engine.put_raw("a", b"x".to_vec());
    assert!(engine.queue().pop().is_none());

    engine.put_raw("b", b"y".to_vec());
    let event = engine.queue().pop().unwrap();
    assert_eq!(event.data[0..4], 7i32.to_le_bytes());
    assert_eq!(&event.data[4..], b"job1\0");
}

#[test]
fn scenario_4_already_present_dependency_fires_immediately() {
    let engine = Engine::default();
    engine.put_raw("x", b"present".to_vec());
    engine.add_dep("job2", &["x".to_string()], 2);

    let event = engine.queue().pop().unwrap();
    assert_eq!(decode_resolved_event(&event.data), Some((2, "job2".to_string())));
}

#[test]
fn scenario_5_post_to_work_lands_on_shared_queue() {
    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));
    let server = start_http_server(Arc::clone(&engine));
    let addr = server.local_addr();

    let body = vec![7u8; 1024];
    let mut client = TcpStream::connect(addr).unwrap();
    let mut request = format!(
        "POST /work/x HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    client.write_all(&request).unwrap();
    let reply = String::from_utf8(read_available(&mut client, 200)).unwrap();
    assert!(reply.starts_with("HTTP/1.1 200"));

    let entry = engine.queue().pop().expect("work entry should be queued");
    assert_eq!(entry.data.len(), 1024);
}

#[test]
fn scenario_6_delete_absent_then_present() {
    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));
    let server = start_http_server(Arc::clone(&engine));
    let addr = server.local_addr();

    let mut client = TcpStream::connect(addr).unwrap();
    let delete_absent = "DELETE /data/absent HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    client.write_all(delete_absent.as_bytes()).unwrap();
    let reply = String::from_utf8(read_available(&mut client, 200)).unwrap();
    assert!(reply.starts_with("HTTP/1.1 404"));

    engine.put_raw("k", b"v".to_vec());
    let mut client2 = TcpStream::connect(addr).unwrap();
    let delete_present = "DELETE /data/k HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    client2.write_all(delete_present.as_bytes()).unwrap();
    let reply = String::from_utf8(read_available(&mut client2, 200)).unwrap();
    assert!(reply.starts_with("HTTP/1.1 200"));
}

#[test]
fn http_keep_alive_serves_two_requests_on_one_connection() {
    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));
    engine.put_raw("k", b"abc".to_vec());
    let server = start_http_server(Arc::clone(&engine));
    let addr = server.local_addr();

    let mut client = TcpStream::connect(addr).unwrap();
    let req = "GET /data/k HTTP/1.1\r\nHost: x\r\n\r\n";
    client.write_all(req.as_bytes()).unwrap();
    client.write_all(req.as_bytes()).unwrap();

    let reply = String::from_utf8(read_available(&mut client, 400)).unwrap();
    assert_eq!(reply.matches("HTTP/1.1 200").count(), 2);
}
