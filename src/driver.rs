//! Three-phase orchestrator (SPEC_FULL §4.4) — the top-level entry point of this crate.
//!
//! Grounded on the teacher's `src/multilistener.rs` "own a fixed, pre-sized set of workers and
//! poll them in a loop" shape, adapted from polling `mio::Events` to waiting on [`BarrierSet`]s:
//! the Driver spawns N `std::thread`s, hands each Worker its queue, then itself loops over queue
//! positions, opening `RELEASE` once `READY` fills and waiting for `RECEIVED`, exactly as
//! SPEC_FULL §4.4 describes.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::barrier::BarrierRegistry;
use crate::config::RaceConfig;
use crate::error::RaceError;
use crate::pool::Pool;
use crate::tls;
use crate::worker::{RequestSpec, Worker, WorkItem, WorkerResult};

/// What to run, per SPEC_FULL §6's `process(work, ...)` entrypoint.
pub enum Work {
    /// A single request, broadcast identically to every worker.
    Single(RequestSpec),
    /// An ordered queue, given identically (cloned) to every worker.
    Queue(Vec<WorkItem>),
}

impl Work {
    fn into_queues(self, worker_count: usize) -> Vec<Vec<WorkItem>> {
        match self {
            Work::Single(spec) => (0..worker_count)
                .map(|_| vec![WorkItem::Request(spec.clone())])
                .collect(),
            Work::Queue(items) => (0..worker_count).map(|_| items.clone()).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct SharedState {
    lens: Vec<usize>,
    exhausted: Vec<bool>,
}

/// State shared between the Driver thread and every Worker thread: the barrier registry, each
/// worker's live queue length (which may grow as callbacks append work), and which workers have
/// permanently exhausted their queue. A Worker's queue can only ever be extended by that same
/// worker's own callback (SPEC_FULL §4.3's "Queue extension"), so once a worker observes its own
/// index has caught up to its queue length, it is exhausted for good.
///
/// Every query of whether a position still has work must go through [`Shared::wait_for_position`]
/// rather than reading `lens`/`exhausted` directly — see that method's doc for why a direct
/// snapshot races.
#[derive(Debug)]
pub struct Shared {
    pub(crate) registry: BarrierRegistry,
    state: Mutex<SharedState>,
    condvar: Condvar,
    worker_count: usize,
}

impl Shared {
    pub(crate) fn new(worker_count: usize) -> Self {
        Self {
            registry: BarrierRegistry::new(),
            state: Mutex::new(SharedState {
                lens: vec![0; worker_count],
                exhausted: vec![false; worker_count],
            }),
            condvar: Condvar::new(),
            worker_count,
        }
    }

    pub(crate) fn record_len(&self, worker_id: usize, len: usize) {
        let mut state = self.state.lock().unwrap();
        if state.lens[worker_id] != len {
            state.lens[worker_id] = len;
            self.condvar.notify_all();
        }
    }

    pub(crate) fn mark_exhausted(&self, worker_id: usize) {
        let mut state = self.state.lock().unwrap();
        if !state.exhausted[worker_id] {
            state.exhausted[worker_id] = true;
            self.condvar.notify_all();
        }
    }

    fn max_len(state: &SharedState) -> usize {
        state.lens.iter().copied().max().unwrap_or(0)
    }

    fn all_exhausted(state: &SharedState) -> bool {
        state.exhausted.iter().all(|&e| e)
    }

    /// Blocks until position `position` is known to have work (`true`) or every worker has
    /// permanently exhausted its queue at or before this position (`false`).
    ///
    /// Used both by the Driver (to decide whether to open the next position's barrier at all)
    /// and by an exhausted Worker (to decide whether to keep phantom-arriving at further
    /// positions). Crucially this *blocks* on the condvar until the answer is no longer racy,
    /// rather than taking a one-shot snapshot of `exhausted`: a worker not yet marked exhausted
    /// may already be committed to a final length no worker will ever be told about except by
    /// actually finishing — polling `exhausted` at an arbitrary moment can catch it "still live"
    /// and wrongly conclude there's more work past a position nobody will ever reach, stranding a
    /// phantom-arriving sibling at a barrier whose capacity is never met. Waiting for either the
    /// length to genuinely grow past `position` or every worker to genuinely finish gives every
    /// caller the same, stable answer no matter when it's asked.
    pub(crate) fn wait_for_position(&self, position: usize, timeout: Duration) -> bool {
        let mut state = self.state.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if Self::max_len(&state) > position {
                return true;
            }
            if Self::all_exhausted(&state) {
                return false;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.condvar.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }
}

/// Orchestrates a full race run (SPEC_FULL §4.4, §6).
pub struct Driver;

impl Driver {
    /// Runs `work` across `thread_count` workers under `config`, returning one [`WorkerResult`]
    /// per worker. Mirrors the distilled spec's `process(work, thread_count, race_args)`
    /// entrypoint.
    pub fn process(
        work: Work,
        thread_count: usize,
        config: RaceConfig,
    ) -> Result<Vec<WorkerResult>, RaceError> {
        if thread_count == 0 {
            let err = RaceError::Configuration("thread_count must be at least 1".to_string());
            log::error!("{err}");
            return Err(err);
        }

        let config = Arc::new(config);
        let pool = Arc::new(Pool::new());
        let tls_config = tls::client_config(config.verify_tls);
        let shared = Arc::new(Shared::new(thread_count));
        let queues = work.into_queues(thread_count);

        log::info!("starting race: {thread_count} workers, tail_bytes={}", config.tail_bytes);

        let handles: Vec<_> = queues
            .into_iter()
            .enumerate()
            .map(|(id, queue)| {
                let config = config.clone();
                let pool = pool.clone();
                let tls_config = tls_config.clone();
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("barrage-worker-{id}"))
                    .spawn(move || {
                        log::info!("worker {id} started");
                        let result =
                            Worker::new(id, thread_count, queue, config, pool, tls_config, shared)
                                .run();
                        log::info!("worker {id} stopped");
                        result
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self::run_position_loop(&shared, thread_count, config.barrier_timeout);

        let results = handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| {
                handle.join().unwrap_or_else(|_| WorkerResult {
                    worker_id: id,
                    positions: Vec::new(),
                })
            })
            .collect();

        Ok(results)
    }

    /// The Driver's own loop: for each position in turn, wait for `READY` to fill (or time out),
    /// open `RELEASE`, then wait for `RECEIVED`. Advances to the next position only once both
    /// phases of the current one complete (SPEC_FULL §4.4, §5's P4).
    fn run_position_loop(shared: &Shared, worker_count: usize, timeout: Duration) {
        let mut position = 0;
        loop {
            if !shared.wait_for_position(position, timeout) {
                log::info!("all workers exhausted after position {position}");
                break;
            }

            log::info!("position {position}: waiting for READY");
            let barrier = shared.registry.get_or_create(position, worker_count, timeout);
            if barrier.wait_ready_then_release().is_err() {
                log::error!("position {position}: BarrierTimeout waiting for READY, aborting race");
                barrier.abort();
                break;
            }
            log::info!("position {position}: RELEASE opened, waiting for RECEIVED");
            if barrier.wait_received().is_err() {
                log::error!("position {position}: BarrierTimeout waiting for RECEIVED, aborting race");
                barrier.abort();
                break;
            }
            log::info!("position {position}: advancing");
            position += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::ConnectMode;
    use crate::http::Method;
    use crate::worker::PositionOutcome;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Spawns a loopback fixture that replies 200 to every connection it accepts, recording each
    /// connection's arrival instant so the test can assert they clustered tightly together.
    fn spawn_race_fixture(n: usize) -> (u16, mpsc::Receiver<std::time::Instant>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for _ in 0..n {
                let (mut socket, _) = listener.accept().unwrap();
                let tx = tx.clone();
                thread::spawn(move || {
                    let mut reader = BufReader::new(socket.try_clone().unwrap());
                    loop {
                        let mut line = String::new();
                        let read = reader.read_line(&mut line).unwrap();
                        if read == 0 || line == "\r\n" {
                            break;
                        }
                    }
                    tx.send(std::time::Instant::now()).unwrap();
                    socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                        .unwrap();
                });
            }
        });

        (port, rx)
    }

    #[test]
    fn basic_race_delivers_a_response_to_every_worker() {
        let n = 3;
        let (port, rx) = spawn_race_fixture(n);
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_secs(5)).unwrap();
        let work = Work::Single(RequestSpec::get(format!("http://127.0.0.1:{port}/")));

        let results = Driver::process(work, n, config).unwrap();
        assert_eq!(n, results.len());
        for result in &results {
            assert_eq!(1, result.positions.len());
            assert!(matches!(result.positions[0], PositionOutcome::Response(_)));
        }

        let mut arrivals = Vec::new();
        for _ in 0..n {
            arrivals.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        let min = *arrivals.iter().min().unwrap();
        let max = *arrivals.iter().max().unwrap();
        assert!(max.duration_since(min) < Duration::from_millis(500));
    }

    #[test]
    fn callback_appended_work_reaches_every_worker_position() {
        let (port, _rx) = spawn_race_fixture(2);
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_secs(5)).unwrap();
        let url = format!("http://127.0.0.1:{port}/");
        let work = Work::Queue(vec![WorkItem::Callback(crate::worker::Callback::new(
            "append",
            move |handle| {
                handle.push(WorkItem::Request(RequestSpec::get(url.clone())));
            },
        ))]);

        let results = Driver::process(work, 2, config).unwrap();
        for result in &results {
            assert_eq!(2, result.positions.len());
            assert!(matches!(
                result.positions[0],
                PositionOutcome::CallbackCompleted
            ));
            assert!(matches!(result.positions[1], PositionOutcome::Response(_)));
        }
    }

    #[test]
    fn rejects_zero_thread_count() {
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_secs(1)).unwrap();
        let work = Work::Single(RequestSpec::get("http://127.0.0.1:1/"));
        assert!(Driver::process(work, 0, config).is_err());
    }

    /// A fixture answering `GET /set-cookie` with `Set-Cookie: k=1` and any other request with
    /// the incoming `Cookie` header echoed back as the body. Each request/response pair gets its
    /// own connection, since this engine opens a fresh `Connection` per queue position rather
    /// than keeping one alive across positions — accepts `connections` of them.
    fn spawn_cookie_fixture(connections: usize) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for _ in 0..connections {
                let (mut socket, _) = listener.accept().unwrap();
                thread::spawn(move || {
                    let mut reader = BufReader::new(socket.try_clone().unwrap());
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).unwrap();
                    let mut cookie_header = String::new();
                    loop {
                        let mut line = String::new();
                        reader.read_line(&mut line).unwrap();
                        if line == "\r\n" {
                            break;
                        }
                        if let Some(value) = line.strip_prefix("Cookie: ") {
                            cookie_header = value.trim_end().to_string();
                        }
                    }
                    let is_set_cookie = request_line.starts_with("GET /set-cookie");
                    let body = if is_set_cookie { String::new() } else { cookie_header };
                    let mut response =
                        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n", body.len());
                    if is_set_cookie {
                        response.push_str("Set-Cookie: k=1\r\n");
                    }
                    response.push_str("\r\n");
                    response.push_str(&body);
                    socket.write_all(response.as_bytes()).unwrap();
                });
            }
        });
        port
    }

    #[test]
    fn cookie_set_on_one_position_is_echoed_on_the_next() {
        let n = 2;
        let port = spawn_cookie_fixture(n * 2);
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_secs(5)).unwrap();
        let work = Work::Queue(vec![
            WorkItem::Request(RequestSpec::get(format!("http://127.0.0.1:{port}/set-cookie"))),
            WorkItem::Request(RequestSpec::get(format!("http://127.0.0.1:{port}/echo-cookie"))),
        ]);

        let results = Driver::process(work, n, config).unwrap();
        for result in &results {
            assert_eq!(2, result.positions.len());
            match &result.positions[1] {
                PositionOutcome::Response(r) => assert_eq!(b"k=1".as_slice(), r.body.as_slice()),
                other => panic!("expected a response, got {other:?}"),
            }
        }
    }

    /// Accepts `n` connections and never writes a response, holding each socket open instead —
    /// the target of SPEC_FULL §8 scenario 6 ("one participant's target never responds").
    fn spawn_stalling_fixture(n: usize) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let mut held = Vec::new();
            for _ in 0..n {
                let (socket, _) = listener.accept().unwrap();
                held.push(socket);
            }
            thread::sleep(Duration::from_secs(60));
        });
        port
    }

    #[test]
    fn stalled_target_times_out_instead_of_hanging_the_race() {
        let n = 2;
        let port = spawn_stalling_fixture(n);
        // A short barrier_timeout also bounds connection I/O (RaceConfig::io_timeout falls back
        // to it), so a target that never responds must surface as a timed-out position well
        // within this test's own deadline rather than blocking `Driver::process` forever.
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_millis(300)).unwrap();
        let work = Work::Single(RequestSpec::get(format!("http://127.0.0.1:{port}/")));

        let started = std::time::Instant::now();
        let results = Driver::process(work, n, config).unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "Driver::process should bound a stalled target's read, not hang"
        );

        assert_eq!(n, results.len());
        for result in &results {
            assert_eq!(1, result.positions.len());
            match &result.positions[0] {
                PositionOutcome::Failed { kind, .. } => {
                    assert_eq!(&"transport_failure", kind);
                }
                other => panic!("expected a timed-out transport failure, got {other:?}"),
            }
        }
    }

    /// Accepts `n` connections, reads the request body, and echoes it back verbatim — used to
    /// observe per-worker `do_eval` substitution (SPEC_FULL §8 scenario 2) through a real
    /// `Worker`/`Driver::process` run rather than `template::substitute` in isolation.
    fn spawn_echo_body_fixture(n: usize) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for _ in 0..n {
                let (mut socket, _) = listener.accept().unwrap();
                thread::spawn(move || {
                    let mut reader = BufReader::new(socket.try_clone().unwrap());
                    let mut content_length = 0usize;
                    loop {
                        let mut line = String::new();
                        reader.read_line(&mut line).unwrap();
                        if line == "\r\n" {
                            break;
                        }
                        if let Some(value) = line.strip_prefix("Content-Length: ") {
                            content_length = value.trim_end().parse().unwrap();
                        }
                    }
                    let mut body = vec![0u8; content_length];
                    reader.read_exact(&mut body).unwrap();
                    let response =
                        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
                    socket.write_all(response.as_bytes()).unwrap();
                    socket.write_all(&body).unwrap();
                });
            }
        });
        port
    }

    #[test]
    fn do_eval_substitutes_thread_num_through_a_real_worker() {
        let n = 2;
        let port = spawn_echo_body_fixture(n);
        let config = RaceConfig::new(ConnectMode::Random, 1, Duration::from_secs(5))
            .unwrap()
            .with_do_eval(true);
        let work = Work::Single(RequestSpec {
            method: Method::Post,
            url: format!("http://127.0.0.1:{port}/"),
            headers: Vec::new(),
            body: br#"{"t": "<<<self.thread_num>>>"}"#.to_vec(),
            cookies: HashMap::new(),
        });

        let results = Driver::process(work, n, config).unwrap();
        let mut bodies = Vec::new();
        for result in &results {
            assert_eq!(1, result.positions.len());
            match &result.positions[0] {
                PositionOutcome::Response(r) => {
                    bodies.push(String::from_utf8(r.body.clone()).unwrap());
                }
                other => panic!("expected a response, got {other:?}"),
            }
        }
        assert!(bodies.contains(&r#"{"t": "0"}"#.to_string()));
        assert!(bodies.contains(&r#"{"t": "1"}"#.to_string()));
    }
}
