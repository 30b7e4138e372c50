//! Per-lane queue driver (SPEC_FULL §4.3)
//!
//! Rebuilt from the teacher's `src/worker.rs` thread-owning-a-receiver shape (kept: one `Worker`
//! per thread, a `run` loop that drains work item-by-item) but replaced the inbound
//! `crossbeam_channel` of mio events with an owned `Vec<WorkItem>` queue, since there is no
//! listener here distributing connections — the Driver hands each Worker its queue once, at
//! spawn.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls::ClientConfig;

use crate::barrier::BarrierSet;
use crate::config::RaceConfig;
use crate::connection::{Connection, Timing};
use crate::cookie::Jar;
use crate::driver::Shared;
use crate::error::RaceError;
use crate::http::{Headers, Method, Request, Status, Url};
use crate::pool::Pool;
use crate::template;

/// One entry in a Worker's queue: a request to send, or a callback to run in its place.
#[derive(Clone)]
pub enum WorkItem {
    /// A request to send through the withhold-and-release protocol.
    Request(RequestSpec),
    /// A user callback, run with access to this Worker's session and queue.
    Callback(Callback),
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(spec) => f.debug_tuple("Request").field(&spec.url).finish(),
            Self::Callback(cb) => f.debug_tuple("Callback").field(&cb.name).finish(),
        }
    }
}

/// A request descriptor before template substitution (SPEC_FULL §3, §6).
///
/// Fields that may carry `<<<expr>>>` markers (`url`, header values, and the body, if it's
/// valid UTF-8) are kept as their textual form rather than as the fully-typed [`Url`]/[`Headers`]
/// so [`crate::template::substitute`] has something to scan before the request is built.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Request method.
    pub method: Method,
    /// Absolute URL, possibly containing `<<<expr>>>` markers.
    pub url: String,
    /// Headers in wire order, values possibly containing markers.
    pub headers: Vec<(String, String)>,
    /// Request body. Templated only when valid UTF-8.
    pub body: Vec<u8>,
    /// Cookies applied directly on this request, independent of the worker's jar.
    pub cookies: HashMap<String, String>,
}

impl RequestSpec {
    /// Builds a bodyless `GET` request descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            cookies: HashMap::new(),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a cookie.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

/// A user callback, invoked with the owning Worker's handle (SPEC_FULL §4.3, §6).
#[derive(Clone)]
pub struct Callback {
    name: &'static str,
    func: Arc<dyn Fn(&mut WorkerHandle) + Send + Sync>,
}

impl Callback {
    /// Wraps `func` as a named callback work item.
    pub fn new(name: &'static str, func: impl Fn(&mut WorkerHandle) + Send + Sync + 'static) -> Self {
        Self {
            name,
            func: Arc::new(func),
        }
    }
}

/// Snapshot of a Worker's prior responses plus a monotonic counter, exposed to
/// [`crate::template::substitute`] for `self.responses[i].status` / `.body` and `counter()`
/// lookups. Owned rather than borrowed so template evaluation doesn't need to thread the
/// Worker's lifetime through every expression.
#[derive(Debug, Default)]
pub struct WorkerContext {
    /// This worker's identity, `0..thread_count`.
    pub thread_num: usize,
    responses: Vec<(u16, String)>,
    counter: AtomicU64,
}

impl WorkerContext {
    /// Creates a context for a freshly-started worker.
    pub fn new(thread_num: usize) -> Self {
        Self {
            thread_num,
            responses: Vec::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Builds a context with no recorded responses, for use outside a running `Worker`.
    #[cfg(test)]
    pub fn for_test(thread_num: usize) -> Self {
        Self::new(thread_num)
    }

    fn record(&mut self, status: u16, body: String) {
        self.responses.push((status, body));
    }

    /// Status code of the response at position `index`, if one has been recorded.
    pub fn response_status(&self, index: usize) -> Option<u16> {
        self.responses.get(index).map(|(status, _)| *status)
    }

    /// Body text of the response at position `index`, if one has been recorded.
    pub fn response_body(&self, index: usize) -> Option<String> {
        self.responses.get(index).map(|(_, body)| body.clone())
    }

    /// Next value of this worker's monotonic counter, for the `counter()` template function.
    pub fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle a callback receives, per SPEC_FULL §6: access to `thread_num`, `responses`, `session`,
/// and the ability to append new items to this worker's own queue.
pub struct WorkerHandle<'a> {
    thread_num: usize,
    jar: &'a mut Jar,
    context: &'a WorkerContext,
    queue: &'a mut Vec<WorkItem>,
}

impl<'a> WorkerHandle<'a> {
    /// This worker's identity.
    pub fn thread_num(&self) -> usize {
        self.thread_num
    }

    /// This worker's response history so far.
    pub fn responses(&self) -> &WorkerContext {
        self.context
    }

    /// Mutable access to this worker's cookie jar.
    pub fn session(&mut self) -> &mut Jar {
        self.jar
    }

    /// Appends a new item to this worker's own queue (SPEC_FULL §4.3 "Queue extension").
    pub fn push(&mut self, item: WorkItem) {
        self.queue.push(item);
    }
}

/// Outcome of one queue position, returned to the Driver once all of that position's barriers
/// have passed (SPEC_FULL §3's ownership note).
#[derive(Debug, Clone)]
pub enum PositionOutcome {
    /// A request completed and produced a response.
    Response(RecordedResponse),
    /// A callback ran to completion.
    CallbackCompleted,
    /// The position failed; per SPEC_FULL §7 the worker continues to the next position.
    Failed {
        /// Which error kind this was.
        kind: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

impl PositionOutcome {
    fn failed(err: RaceError) -> Self {
        log::warn!("position failed: {err}");
        let kind = match &err {
            RaceError::Resolution(_) => "resolution_failure",
            RaceError::Transport(_) => "transport_failure",
            RaceError::Protocol(_) => "protocol_failure",
            RaceError::BarrierTimeout => "barrier_timeout",
            RaceError::Callback(_) => "callback_failure",
            RaceError::Configuration(_) => "configuration_failure",
        };
        Self::Failed {
            kind,
            message: err.to_string(),
        }
    }
}

/// A completed request/response exchange, recorded by the Worker and owned until the Driver
/// observes it (SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    /// Response status.
    pub status: Status,
    /// Response headers.
    pub headers: Headers,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Timing marks for the Connection that produced this response.
    pub timing: Timing,
    /// Which worker produced this response (the "Connection identity" of SPEC_FULL §3).
    pub worker_id: usize,
}

/// Everything one Worker returns once its queue is exhausted.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    /// This worker's identity.
    pub worker_id: usize,
    /// Outcome of each queue position this worker reached.
    pub positions: Vec<PositionOutcome>,
}

/// One parallel lane: a cookie jar, a queue of work items, and a thread driving them against the
/// Driver's per-position barrier sets.
pub struct Worker {
    id: usize,
    worker_count: usize,
    queue: Vec<WorkItem>,
    jar: Jar,
    context: WorkerContext,
    config: Arc<RaceConfig>,
    pool: Arc<Pool>,
    tls_config: Arc<ClientConfig>,
    shared: Arc<Shared>,
}

impl Worker {
    /// Creates a worker for lane `id`, owning `queue`.
    pub fn new(
        id: usize,
        worker_count: usize,
        queue: Vec<WorkItem>,
        config: Arc<RaceConfig>,
        pool: Arc<Pool>,
        tls_config: Arc<ClientConfig>,
        shared: Arc<Shared>,
    ) -> Self {
        let len = queue.len();
        shared.record_len(id, len);
        Self {
            id,
            worker_count,
            queue,
            jar: Jar::new(),
            context: WorkerContext::new(id),
            config,
            pool,
            tls_config,
            shared,
        }
    }

    /// Drives this worker's queue to exhaustion, cooperating with peers at the barriers the
    /// Driver allocates per position, and returns the per-position outcomes.
    pub fn run(mut self) -> WorkerResult {
        let mut positions = Vec::new();
        let mut index = 0;

        loop {
            if index >= self.queue.len() {
                self.shared.mark_exhausted(self.id);
                if !self.shared.wait_for_position(index, self.config.barrier_timeout) {
                    break;
                }
                let barrier = self.shared.registry.get_or_create(
                    index,
                    self.worker_count,
                    self.config.barrier_timeout,
                );
                let _ = barrier.arrive_ready(true);
                let _ = barrier.wait_release();
                let _ = barrier.arrive_received(true);
                index += 1;
                continue;
            }

            let item = self.queue[index].clone();
            let barrier = self.shared.registry.get_or_create(
                index,
                self.worker_count,
                self.config.barrier_timeout,
            );

            let outcome = match item {
                WorkItem::Request(spec) => self.process_request(&spec, &barrier),
                WorkItem::Callback(cb) => self.process_callback(&cb, &barrier),
            };
            positions.push(outcome);
            self.shared.record_len(self.id, self.queue.len());
            index += 1;
        }

        WorkerResult {
            worker_id: self.id,
            positions,
        }
    }

    fn process_request(&mut self, spec: &RequestSpec, barrier: &BarrierSet) -> PositionOutcome {
        let request = match self.build_request(spec) {
            Ok(r) => r,
            Err(e) => return self.abort_position(barrier, e),
        };

        let target = match self.pool.target_for(
            &request.url,
            self.config.connect_mode,
            self.id,
            self.worker_count,
        ) {
            Ok(t) => t,
            Err(e) => return self.abort_position(barrier, e),
        };

        let tls_config = request.url.scheme.is_tls().then(|| self.tls_config.clone());

        let mut connection = match Connection::connect(
            &target,
            tls_config,
            self.config.connect_timeout(),
            self.config.io_timeout(),
        ) {
            Ok(c) => c,
            Err(e) => return self.abort_position(barrier, e),
        };

        let jar_cookies = self.jar.for_request(&target.host, &request.url.path);

        let pending = match connection.begin_send(&request, &jar_cookies, self.config.tail_bytes) {
            Ok(p) => p,
            Err(e) => return self.abort_position(barrier, e),
        };

        if self.config.save_sent_cookies {
            let cookie_header = request.cookie_header(&jar_cookies);
            if !cookie_header.is_empty() {
                self.jar
                    .merge_cookie_header(&target.host, &request.url.path, &cookie_header);
            }
        }

        if barrier.arrive_ready(false).is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }
        if barrier.wait_release().is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }

        let headers = match connection.release_and_read_headers(&pending) {
            Ok(h) => h,
            Err(e) => {
                let _ = barrier.arrive_received(true);
                return PositionOutcome::failed(e);
            }
        };

        let response = match connection.read_body(headers) {
            Ok(r) => r,
            Err(e) => {
                let _ = barrier.arrive_received(true);
                return PositionOutcome::failed(e);
            }
        };

        if barrier.arrive_received(false).is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }

        self.jar.merge_set_cookie(
            &target.host,
            &request.url.path,
            response.headers.get_all("set-cookie"),
        );
        self.context.record(
            response.status.code(),
            String::from_utf8_lossy(&response.body).into_owned(),
        );

        PositionOutcome::Response(RecordedResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            timing: connection.timing,
            worker_id: self.id,
        })
    }

    fn process_callback(&mut self, cb: &Callback, barrier: &BarrierSet) -> PositionOutcome {
        if barrier.arrive_ready(false).is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }
        if barrier.wait_release().is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }
        if barrier.arrive_received(false).is_err() {
            return PositionOutcome::failed(RaceError::BarrierTimeout);
        }

        let func = cb.func.clone();
        let mut handle = WorkerHandle {
            thread_num: self.id,
            jar: &mut self.jar,
            context: &self.context,
            queue: &mut self.queue,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (func)(&mut handle))) {
            Ok(()) => PositionOutcome::CallbackCompleted,
            Err(payload) => {
                let message = panic_message(payload);
                PositionOutcome::failed(RaceError::Callback(format!("{}: {message}", cb.name)))
            }
        }
    }

    /// Reported before `READY`, per SPEC_FULL §4.1's failure-mode note: still arrive (as
    /// aborted) at every phase so peers aren't stranded.
    fn abort_position(&self, barrier: &BarrierSet, err: RaceError) -> PositionOutcome {
        let _ = barrier.arrive_ready(true);
        let _ = barrier.wait_release();
        let _ = barrier.arrive_received(true);
        PositionOutcome::failed(err)
    }

    fn build_request(&self, spec: &RequestSpec) -> Result<Request, RaceError> {
        let do_eval = self.config.do_eval;

        let url_text = self.maybe_substitute(&spec.url, do_eval)?;
        let url = Url::parse(&url_text)?;
        let mut request = Request::new(spec.method, url);

        for (name, value) in &spec.headers {
            let value = self.maybe_substitute(value, do_eval)?;
            request = request.header(name.clone(), value);
        }

        let body = self.maybe_substitute_body(&spec.body, do_eval)?;
        request = request.body(body);

        for (name, value) in &spec.cookies {
            request = request.cookie(name.clone(), value.clone());
        }

        Ok(request)
    }

    fn maybe_substitute(&self, field: &str, do_eval: bool) -> Result<String, RaceError> {
        if !do_eval {
            return Ok(field.to_string());
        }
        template::substitute(field, &self.context)
            .map_err(|e| RaceError::Protocol(format!("template substitution: {e}")))
    }

    fn maybe_substitute_body(&self, body: &[u8], do_eval: bool) -> Result<Vec<u8>, RaceError> {
        if !do_eval {
            return Ok(body.to_vec());
        }
        match std::str::from_utf8(body) {
            Ok(text) => {
                let substituted = template::substitute(text, &self.context)
                    .map_err(|e| RaceError::Protocol(format!("template substitution: {e}")))?;
                Ok(substituted.into_bytes())
            }
            // Non-UTF-8 bodies (e.g. binary uploads) aren't scanned for markers.
            Err(_) => Ok(body.to_vec()),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::ConnectMode;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    fn config(tail_bytes: usize) -> Arc<RaceConfig> {
        Arc::new(
            RaceConfig::new(ConnectMode::Random, tail_bytes, Duration::from_secs(5)).unwrap(),
        )
    }

    fn spawn_ok_fixture(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            loop {
                let mut line = String::new();
                let n = reader.read_line(&mut line).unwrap();
                if n == 0 || line == "\r\n" {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).unwrap();
        });
        port
    }

    #[test]
    fn single_worker_request_produces_a_response() {
        let port = spawn_ok_fixture("ok");
        let shared = Arc::new(Shared::new(1));
        let queue = vec![WorkItem::Request(RequestSpec::get(format!(
            "http://127.0.0.1:{port}/"
        )))];
        let worker = Worker::new(
            0,
            1,
            queue,
            config(1),
            Arc::new(Pool::new()),
            crate::tls::client_config(true),
            shared,
        );
        let result = worker.run();
        assert_eq!(1, result.positions.len());
        match &result.positions[0] {
            PositionOutcome::Response(r) => assert_eq!(200, r.status.code()),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[test]
    fn callback_can_append_to_its_own_queue() {
        let port = spawn_ok_fixture("ok");
        let shared = Arc::new(Shared::new(1));
        let url = format!("http://127.0.0.1:{port}/");
        let queue = vec![WorkItem::Callback(Callback::new("append", move |handle| {
            handle.push(WorkItem::Request(RequestSpec::get(url.clone())));
        }))];
        let worker = Worker::new(
            0,
            1,
            queue,
            config(1),
            Arc::new(Pool::new()),
            crate::tls::client_config(true),
            shared,
        );
        let result = worker.run();
        assert_eq!(2, result.positions.len());
        assert!(matches!(
            result.positions[0],
            PositionOutcome::CallbackCompleted
        ));
        assert!(matches!(result.positions[1], PositionOutcome::Response(_)));
    }

    #[test]
    fn panicking_callback_is_recorded_as_callback_failure() {
        let shared = Arc::new(Shared::new(1));
        let queue = vec![WorkItem::Callback(Callback::new("boom", |_handle| {
            panic!("deliberate");
        }))];
        let worker = Worker::new(
            0,
            1,
            queue,
            config(1),
            Arc::new(Pool::new()),
            crate::tls::client_config(true),
            shared,
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker.run()));
        let result = result.expect("Worker::run must catch the callback's panic internally");
        match &result.positions[0] {
            PositionOutcome::Failed { kind, .. } => assert_eq!(&"callback_failure", kind),
            other => panic!("expected callback_failure, got {other:?}"),
        }
    }
}
