//! The synchronized-send state machine (SPEC_FULL §4.1) — the core of this crate.
//!
//! Rebuilt from the teacher's `src/connection.rs`, which split `Connection` into a trait plus
//! `PlainConnection`/`TlsConnection` implementations driven by a non-blocking `mio` event loop
//! (needed there because one server fields many concurrent clients at once). This harness drives
//! exactly one outstanding request per `Connection` on a dedicated thread, so the state machine
//! below is blocking throughout: every method does exactly the I/O SPEC_FULL's state table says
//! it should, then returns. The `Plain`/`Tls` split itself, and the state names, carry over
//! directly from the teacher; the TLS side is simpler here because `rustls::StreamOwned` drives
//! the handshake through ordinary blocking reads/writes instead of the teacher's explicit
//! `read_tls`/`process_new_packets` pump (which exists there only to cope with non-blocking
//! sockets).

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};

use crate::error::RaceError;
use crate::http::{BodyFraming, Method, Request, Response, ResponseParser, Scheme};

/// States of the withhold-and-release send protocol, per SPEC_FULL §4.1's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No I/O has happened yet.
    Init,
    /// TCP (+ TLS handshake, if any) is established.
    Connected,
    /// All but the withheld tail bytes have been written and flushed.
    BodyPending,
    /// Arrived at the `READY` barrier; blocked on `RELEASE`.
    Ready,
    /// `RELEASE` opened; tail bytes written.
    Released,
    /// Response status line and headers parsed.
    ResponseHeaders,
    /// Reading the response body.
    ResponseBody,
    /// Exchange complete.
    Done,
}

/// Timing marks recorded across one exchange. SPEC_FULL §3's ordering invariant:
/// `t_connect <= t_ready <= t_release <= t_firstbyte`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing {
    /// When the TCP (+ TLS) handshake completed.
    pub t_connect: Option<Instant>,
    /// When this Connection arrived at `READY`.
    pub t_ready: Option<Instant>,
    /// When this Connection observed `RELEASE` open and wrote its tail.
    pub t_release: Option<Instant>,
    /// When the first byte of the response was read.
    pub t_firstbyte: Option<Instant>,
}

/// Where to connect, and over what scheme — produced by [`crate::pool`] per SPEC_FULL §4.2.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// `http` or `https` — determines whether a TLS handshake follows the TCP connect.
    pub scheme: Scheme,
    /// Hostname, used for the `Host` header and (for TLS) SNI — independent of `addr`, since
    /// `connect_mode` may choose an address that isn't the result of a plain lookup.
    pub host: String,
    /// The concrete address to dial, already chosen by `connect_mode` (SPEC_FULL §4.1).
    pub addr: SocketAddr,
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// Everything needed to resume a send once `RELEASE` opens: the withheld tail bytes, and whether
/// the request used `HEAD` (needed later to interpret the response's body framing).
pub struct PendingRelease {
    tail: Vec<u8>,
    head_method: bool,
}

/// Parsed status line and headers, carried from [`Connection::release_and_read_headers`] to
/// [`Connection::read_body`] across the `RECEIVED` barrier arrival.
pub struct ResponseHeaders {
    parser: ResponseParser,
    head_method: bool,
}

/// One TCP (optionally TLS) socket driving one HTTP/1.1 request/response exchange through the
/// withhold-and-release protocol.
pub struct Connection {
    stream: Stream,
    state: State,
    /// Timing marks for this exchange, read by the Driver once the position's barriers have all
    /// passed (SPEC_FULL §3's ownership note — Connections record, the Driver aggregates).
    pub timing: Timing,
}

impl Connection {
    /// Establishes the TCP socket (and, for `https`, the TLS handshake begins lazily on first
    /// I/O), per SPEC_FULL §4.1's `Init -> Connected` transition.
    ///
    /// `io_timeout` bounds every read/write made on the socket after connect — in particular the
    /// blocking header read in [`release_and_read_headers`](Self::release_and_read_headers). A
    /// stalled target (SPEC_FULL §8 scenario 6) must surface as a `TransportFailure` within this
    /// bound rather than block the worker thread forever; the Driver's barrier timeout alone
    /// can't reach in and interrupt a blocking socket read.
    pub fn connect(
        target: &ConnectTarget,
        tls_config: Option<Arc<ClientConfig>>,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, RaceError> {
        let tcp = TcpStream::connect_timeout(&target.addr, connect_timeout)?;
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(io_timeout))?;
        tcp.set_write_timeout(Some(io_timeout))?;

        let stream = match target.scheme {
            Scheme::Http => Stream::Plain(tcp),
            Scheme::Https => {
                let config = tls_config.expect(
                    "https target requires a TLS config (caller checks Scheme::is_tls first)",
                );
                let server_name = ServerName::try_from(target.host.clone())
                    .map_err(|e| RaceError::Configuration(format!("invalid SNI hostname: {e}")))?;
                let conn = ClientConnection::new(config, server_name)?;
                Stream::Tls(Box::new(StreamOwned::new(conn, tcp)))
            }
        };

        log::debug!("connection to {} ({:?}): Init -> Connected", target.addr, target.scheme);
        Ok(Self {
            stream,
            state: State::Connected,
            timing: Timing {
                t_connect: Some(Instant::now()),
                ..Default::default()
            },
        })
    }

    /// Writes everything but the withheld tail and flushes it, moving through
    /// `Connected -> BodyPending -> Ready`. Does **not** block on the barrier itself — the
    /// caller (the Worker) does that, so `t_ready` reflects the moment of arrival rather than
    /// the moment this call returns.
    pub fn begin_send(
        &mut self,
        request: &Request,
        jar_cookies: &HashMap<String, String>,
        tail_bytes: usize,
    ) -> Result<PendingRelease, RaceError> {
        debug_assert_eq!(self.state, State::Connected);

        let serialized = request.serialize(jar_cookies);
        let (head, tail) = Request::split_for_tail(&serialized, tail_bytes);

        self.stream.write_all(head)?;
        self.stream.flush()?;
        self.state = State::BodyPending;
        log::debug!("{} bytes written, {} withheld: BodyPending", head.len(), tail.len());

        self.state = State::Ready;
        self.timing.t_ready = Some(Instant::now());
        log::debug!("arrived at Ready, awaiting RELEASE");

        Ok(PendingRelease {
            tail: tail.to_vec(),
            head_method: matches!(request.method, Method::Head),
        })
    }

    /// `true` once [`begin_send`](Self::begin_send) has moved this Connection to `Ready`.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready)
    }

    /// Writes the withheld tail and flushes it — the instant P1/P2 are about — then blocks
    /// reading until the response status line and headers are complete. Moves through
    /// `Ready -> Released -> ResponseHeaders`.
    pub fn release_and_read_headers(
        &mut self,
        pending: &PendingRelease,
    ) -> Result<ResponseHeaders, RaceError> {
        debug_assert_eq!(self.state, State::Ready);

        self.timing.t_release = Some(Instant::now());
        self.stream.write_all(&pending.tail)?;
        self.stream.flush()?;
        self.state = State::Released;
        log::debug!("tail flushed: Released");

        let mut parser = ResponseParser::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.stream.read(&mut buf)?;
            if self.timing.t_firstbyte.is_none() {
                self.timing.t_firstbyte = Some(Instant::now());
            }
            if n == 0 {
                return Err(RaceError::Protocol(
                    "connection closed before response headers completed".into(),
                ));
            }
            if parser.feed(&buf[..n])? {
                break;
            }
        }

        self.state = State::ResponseHeaders;
        log::debug!("response headers parsed: ResponseHeaders");
        Ok(ResponseHeaders {
            parser,
            head_method: pending.head_method,
        })
    }

    /// Reads the rest of the response body according to its framing and returns the finished
    /// [`Response`]. Moves through `ResponseHeaders -> ResponseBody -> Done`.
    pub fn read_body(&mut self, headers: ResponseHeaders) -> Result<Response, RaceError> {
        debug_assert_eq!(self.state, State::ResponseHeaders);
        self.state = State::ResponseBody;

        let ResponseHeaders {
            parser,
            head_method,
        } = headers;

        let framing = parser
            .body_framing(head_method)
            .unwrap_or(BodyFraming::UntilClose);

        let already_buffered = parser.buffered_body().len();
        let mut extra = Vec::new();

        match framing {
            BodyFraming::None => {}
            BodyFraming::Length(total) => {
                let mut remaining = total.saturating_sub(already_buffered);
                let mut buf = [0u8; 4096];
                while remaining > 0 {
                    let to_read = remaining.min(buf.len());
                    let n = self.stream.read(&mut buf[..to_read])?;
                    if n == 0 {
                        return Err(RaceError::Protocol(
                            "connection closed before response body completed".into(),
                        ));
                    }
                    extra.extend_from_slice(&buf[..n]);
                    remaining -= n;
                }
            }
            BodyFraming::UntilClose => {
                self.stream.read_to_end(&mut extra)?;
            }
        }

        self.state = State::Done;
        log::debug!("body fully read: Done");
        Ok(parser.finish(&extra)?)
    }

    /// `true` once the exchange has completed (successfully or not).
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Current state, exposed for diagnostics and tests.
    pub fn state(&self) -> State {
        self.state
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::Url;
    use std::io::BufReader;
    use std::net::TcpListener;

    fn fixture_get(port: u16) -> Request {
        Request::new(
            Method::Get,
            Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap(),
        )
    }

    /// Spawns a one-shot loopback server that records the raw request bytes it received before
    /// replying, so a test can assert the tail never arrived ahead of release.
    fn spawn_fixture() -> (u16, std::sync::mpsc::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let mut request_bytes = Vec::new();
            loop {
                let mut line = Vec::new();
                use std::io::BufRead;
                let n = reader.read_until(b'\n', &mut line).unwrap();
                request_bytes.extend_from_slice(&line);
                if n == 0 || line == b"\r\n" {
                    break;
                }
            }
            tx.send(request_bytes).unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .unwrap();
        });

        (port, rx)
    }

    #[test]
    fn full_exchange_over_plaintext_completes() {
        let (port, rx) = spawn_fixture();
        let target = ConnectTarget {
            scheme: Scheme::Http,
            host: "127.0.0.1".to_string(),
            addr: format!("127.0.0.1:{port}").parse().unwrap(),
        };

        let mut conn =
            Connection::connect(&target, None, Duration::from_secs(2), Duration::from_secs(2))
                .unwrap();
        let pending = conn
            .begin_send(&fixture_get(port), &HashMap::new(), 1)
            .unwrap();
        assert!(conn.is_ready());

        let headers = conn.release_and_read_headers(&pending).unwrap();
        let response = conn.read_body(headers).unwrap();

        assert_eq!(200, response.status.code());
        assert_eq!(b"ok", response.body.as_slice());
        assert!(conn.is_done());

        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(received.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn timing_marks_are_monotonic() {
        let (port, _rx) = spawn_fixture();
        let target = ConnectTarget {
            scheme: Scheme::Http,
            host: "127.0.0.1".to_string(),
            addr: format!("127.0.0.1:{port}").parse().unwrap(),
        };

        let mut conn =
            Connection::connect(&target, None, Duration::from_secs(2), Duration::from_secs(2))
                .unwrap();
        let pending = conn
            .begin_send(&fixture_get(port), &HashMap::new(), 1)
            .unwrap();
        let headers = conn.release_and_read_headers(&pending).unwrap();
        let _ = conn.read_body(headers).unwrap();

        let t = conn.timing;
        assert!(t.t_connect.unwrap() <= t.t_ready.unwrap());
        assert!(t.t_ready.unwrap() <= t.t_release.unwrap());
        assert!(t.t_release.unwrap() <= t.t_firstbyte.unwrap());
    }
}
