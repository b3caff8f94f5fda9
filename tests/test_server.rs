//! Server behaviour over the scripted in-memory transport.

use std::io;

use proptest::prelude::*;
use tickhttp::clock::{Clock, ManualClock};
use tickhttp::config::ServerConfig;
use tickhttp::http::connection::{ConnectionState, MAX_REQUEST_SIZE};
use tickhttp::server::{RouteMap, Server, ServerError, TickReport};
use tickhttp::transport::memory::{MemoryNetwork, MemoryPeer};

const PORT: u16 = 8080;

fn config(timeout_ms: u64) -> ServerConfig {
    ServerConfig {
        port: PORT,
        timeout_ms,
        routes: RouteMap::from([("/".to_string(), "ok".to_string())]),
        ..Default::default()
    }
}

fn started(net: &MemoryNetwork, timeout_ms: u64) -> Server<MemoryNetwork> {
    let mut server = Server::new(net.clone(), config(timeout_ms));
    server.start().unwrap();
    server
}

fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.0 {status}\r\nContent-Type: text/plain; charset=iso-8859-1\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

fn roundtrip(server: &mut Server<MemoryNetwork>, net: &MemoryNetwork, request: &str) -> MemoryPeer {
    let peer = net.connect(PORT).unwrap();
    peer.send(request);
    server.serve(0);
    peer
}

#[test]
fn test_get_known_path_returns_200() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.send("GET / HTTP/1.0\r\n\r\n");
    let report = server.serve(0);

    assert_eq!(
        report,
        TickReport {
            accepted: 1,
            completed: 1,
            live: 0,
            ..Default::default()
        }
    );
    assert_eq!(peer.received_string(), response("200 OK", "ok"));
    assert!(peer.is_closed());
}

#[test]
fn test_missing_path_returns_404() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = roundtrip(&mut server, &net, "GET /missing HTTP/1.0\r\n\r\n");

    assert_eq!(peer.received_string(), response("404 Not Found", "404 Not Found"));
}

#[test]
fn test_post_returns_405() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = roundtrip(&mut server, &net, "POST / HTTP/1.0\r\n\r\n");

    assert_eq!(
        peer.received_string(),
        response("405 Method Not Allowed", "405 Method Not Allowed")
    );
}

#[test]
fn test_malformed_request_line_returns_400() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    for request in ["HELLO\r\n\r\n", "\r\n\r\n", "GET / HTTP/1\r\n\r\n", "GET /\r\nHost: x\r\n\r\n"] {
        let peer = roundtrip(&mut server, &net, request);
        assert_eq!(
            peer.received_string(),
            response("400 Bad Request", "400 Bad Request"),
            "request {request:?}"
        );
    }
}

#[test]
fn test_trailing_space_after_version_returns_400() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = roundtrip(&mut server, &net, "GET / HTTP/1.0 \r\n\r\n");

    assert_eq!(peer.received_string(), response("400 Bad Request", "400 Bad Request"));
}

#[test]
fn test_request_headers_are_ignored() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = roundtrip(
        &mut server,
        &net,
        "GET / HTTP/1.1\r\nHost: sensor.local\r\nUser-Agent: curl\r\nConnection: keep-alive\r\n\r\n",
    );

    assert_eq!(peer.received_string(), response("200 OK", "ok"));
    assert!(peer.is_closed());
}

#[test]
fn test_request_split_across_ticks() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.send("GET / HT");
    let report = server.serve(0);

    assert_eq!(report.live, 1);
    assert_eq!(server.connections()[0].state(), ConnectionState::Reading);
    assert!(peer.received().is_empty());

    peer.send("TP/1.0\r\n\r");
    server.serve(0);
    assert_eq!(server.connections()[0].state(), ConnectionState::Reading);

    peer.send("\n");
    let report = server.serve(0);

    assert_eq!(report.completed, 1);
    assert_eq!(peer.received_string(), response("200 OK", "ok"));
}

#[test]
fn test_many_chunks_in_one_tick() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    for b in "GET / HTTP/1.0\r\n\r\n".bytes() {
        peer.send([b]);
    }
    server.serve(0);

    assert_eq!(peer.received_string(), response("200 OK", "ok"));
}

#[test]
fn test_peer_close_before_request_drops_connection() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.send("GET / HTTP/1.0\r\n");
    peer.close();
    let report = server.serve(0);

    assert_eq!(report.dropped, 1);
    assert_eq!(report.live, 0);
    assert!(peer.received().is_empty());
    assert_eq!(peer.close_count(), 1);
}

#[test]
fn test_read_error_drops_connection() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.fail_next_recv(io::ErrorKind::ConnectionReset);
    let report = server.serve(0);

    assert_eq!(report.dropped, 1);
    assert!(peer.is_closed());
}

#[test]
fn test_partial_write_resumes_next_tick() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.set_send_budget(Some(10));
    peer.send("GET / HTTP/1.0\r\n\r\n");
    let report = server.serve(0);

    assert_eq!(report.live, 1);
    assert_eq!(server.connections()[0].state(), ConnectionState::Writing);
    assert_eq!(peer.received().len(), 10);
    assert!(!peer.is_closed());

    peer.set_send_budget(None);
    let report = server.serve(0);

    assert_eq!(report.completed, 1);
    assert_eq!(peer.received_string(), response("200 OK", "ok"));
    assert!(peer.is_closed());
}

#[test]
fn test_write_error_drops_connection() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.fail_next_send(io::ErrorKind::BrokenPipe);
    peer.send("GET / HTTP/1.0\r\n\r\n");
    let report = server.serve(0);

    assert_eq!(report.dropped, 1);
    assert!(peer.received().is_empty());
}

#[test]
fn test_incomplete_request_expires_exactly_once() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::new(1000);
    let mut server = started(&net, 5000);

    let peer = net.connect(PORT).unwrap();
    peer.send("GET / HTTP/1.0\r\n");
    server.serve(clock.now_ms());
    assert_eq!(server.connections()[0].expiry(), 6000);

    for step in [1000, 2000, 999] {
        let report = server.serve(clock.advance(step));
        assert_eq!(report.expired, 0);
        assert_eq!(report.live, 1);
        assert!(!peer.is_closed());
    }
    assert_eq!(clock.now_ms(), 4999);

    clock.set(5999);
    assert_eq!(server.serve(clock.now_ms()).live, 1);

    let report = server.serve(clock.advance(1));
    assert_eq!(report.expired, 1);
    assert_eq!(report.live, 0);
    assert_eq!(peer.close_count(), 1);

    server.serve(clock.advance(1000));
    assert_eq!(peer.close_count(), 1);
    assert!(peer.received().is_empty());
}

#[test]
fn test_expiry_cuts_off_stalled_write() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 100);

    let peer = net.connect(PORT).unwrap();
    peer.set_send_budget(Some(0));
    peer.send("GET / HTTP/1.0\r\n\r\n");
    server.serve(0);
    assert_eq!(server.connections()[0].state(), ConnectionState::Writing);

    let report = server.serve(100);

    assert_eq!(report.expired, 1);
    assert!(peer.is_closed());
    assert!(peer.received().is_empty());
}

#[test]
fn test_late_connection_gets_its_own_expiry() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 1000);

    let early = net.connect(PORT).unwrap();
    server.serve(0);
    let late = net.connect(PORT).unwrap();
    server.serve(500);

    server.serve(1000);
    assert!(early.is_closed());
    assert!(!late.is_closed());

    server.serve(1500);
    assert!(late.is_closed());
}

#[test]
fn test_zero_timeout_never_expires() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    server.serve(0);
    assert_eq!(server.connections()[0].expiry(), 0);

    let report = server.serve(u64::MAX / 2);

    assert_eq!(report.live, 1);
    assert!(!peer.is_closed());
}

#[test]
fn test_set_routes_merges() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    server.set_routes([("/a", "A")]);
    assert_eq!(server.routes().len(), 2);

    server.set_routes([("/", "new")]);
    server.set_route("/b", "B");

    assert_eq!(roundtrip(&mut server, &net, "GET / HTTP/1.0\r\n\r\n").received_string(), response("200 OK", "new"));
    assert_eq!(roundtrip(&mut server, &net, "GET /a HTTP/1.0\r\n\r\n").received_string(), response("200 OK", "A"));
    assert_eq!(roundtrip(&mut server, &net, "GET /b HTTP/1.0\r\n\r\n").received_string(), response("200 OK", "B"));
}

#[test]
fn test_overlay_routes_last_one_tick() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let overlay = RouteMap::from([
        ("/".to_string(), "live".to_string()),
        ("/tmp".to_string(), "t".to_string()),
    ]);

    let a = net.connect(PORT).unwrap();
    let b = net.connect(PORT).unwrap();
    a.send("GET /tmp HTTP/1.0\r\n\r\n");
    b.send("GET / HTTP/1.0\r\n\r\n");
    server.serve_with(&overlay, 0);

    assert_eq!(a.received_string(), response("200 OK", "t"));
    assert_eq!(b.received_string(), response("200 OK", "live"));

    let c = roundtrip(&mut server, &net, "GET /tmp HTTP/1.0\r\n\r\n");
    assert_eq!(c.received_string(), response("404 Not Found", "404 Not Found"));
    assert!(!server.routes().contains_key("/tmp"));
}

#[test]
fn test_connections_kept_in_acceptance_order() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peers: Vec<_> = (0..3).map(|_| net.connect(PORT).unwrap()).collect();
    let report = server.serve(0);

    assert_eq!(report.accepted, 3);
    let ports: Vec<u16> = server.connections().iter().map(|c| c.peer().port()).collect();
    let mut sorted = ports.clone();
    sorted.sort();
    assert_eq!(ports, sorted);

    // a later request is answered even while earlier peers stay silent
    peers[2].send("GET / HTTP/1.0\r\n\r\n");
    let report = server.serve(0);
    assert_eq!(report.completed, 1);
    assert_eq!(report.live, 2);
    assert!(peers[2].is_closed());
    assert!(!peers[0].is_closed());
}

#[test]
fn test_oversized_request_is_dropped() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.send("GET / HTTP/1.0\r\n");
    peer.send(vec![b'x'; MAX_REQUEST_SIZE]);
    let report = server.serve(0);

    assert_eq!(report.dropped, 1);
    assert!(peer.received().is_empty());
}

#[test]
fn test_custom_template_without_length() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(
        net.clone(),
        ServerConfig {
            template: "%STATUS%|%CONTENT%".to_string(),
            ..config(0)
        },
    );
    server.start().unwrap();

    let peer = roundtrip(&mut server, &net, "GET / HTTP/1.0\r\n\r\n");

    assert_eq!(peer.received_string(), "200 OK|ok");
}

#[test]
fn test_stop_closes_everything() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let live = net.connect(PORT).unwrap();
    server.serve(0);
    let queued = net.connect(PORT).unwrap();

    server.stop();

    assert!(!server.is_running());
    assert!(!net.is_listening(PORT));
    assert!(live.is_closed());
    assert!(queued.is_closed());
    assert!(server.connections().is_empty());
    assert_eq!(server.serve(0), TickReport::default());
    assert!(net.connect(PORT).is_err());
}

#[test]
fn test_serve_before_start_does_nothing() {
    let net = MemoryNetwork::new();
    let mut server = Server::new(net.clone(), config(0));

    assert_eq!(server.serve(0), TickReport::default());
    assert!(net.connect(PORT).is_err());
}

#[test]
fn test_start_errors() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));
    assert!(server.is_running());

    let mut other = Server::new(net.clone(), config(0));
    match other.start() {
        Err(ServerError::Bind { port, source }) => {
            assert_eq!(port, PORT);
            assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
        }
        res => panic!("expected bind error, got {res:?}"),
    }
    assert!(!other.is_running());

    server.stop();
    other.start().unwrap();
}

#[test]
fn test_open_connection_has_no_close_reason() {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);

    let peer = net.connect(PORT).unwrap();
    peer.set_send_budget(Some(0));
    peer.send("GET / HTTP/1.0\r\n\r\n");
    server.serve(0);

    let conn = &server.connections()[0];
    assert_eq!(conn.state(), ConnectionState::Writing);
    assert_eq!(conn.close_reason(), None);
    assert!(!conn.is_closed());
}

fn serve_in_chunks(request: &[u8], sizes: &[usize]) -> String {
    let net = MemoryNetwork::new();
    let mut server = started(&net, 0);
    let peer = net.connect(PORT).unwrap();

    let mut rest = request;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let n = (*sizes.next().unwrap()).min(rest.len());
        peer.send(&rest[..n]);
        rest = &rest[n..];
        server.serve(0);
    }
    server.serve(0);

    peer.received_string()
}

const REQUESTS: [&str; 4] = [
    "GET / HTTP/1.0\r\n\r\n",
    "GET /missing HTTP/1.1\r\nHost: a\r\nAccept: */*\r\n\r\n",
    "DELETE / HTTP/1.0\r\n\r\n",
    "NOT A REQUEST\r\nX: y\r\n\r\n",
];

proptest! {
    #[test]
    fn test_chunk_boundaries_do_not_change_response(
        idx in 0usize..REQUESTS.len(),
        sizes in prop::collection::vec(1usize..8, 1..16),
    ) {
        let request = REQUESTS[idx].as_bytes();
        let whole = serve_in_chunks(request, &[request.len()]);
        let chunked = serve_in_chunks(request, &sizes);

        prop_assert!(whole.starts_with("HTTP/1.0 "));
        prop_assert_eq!(whole, chunked);
    }
}
