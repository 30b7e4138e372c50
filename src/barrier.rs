//! Three-phase barrier set (SPEC_FULL §3, §4.4, §5)
//!
//! One [`BarrierSet`] exists per queue position. It holds three one-shot, capacity-`N` barriers
//! — `READY`, `RELEASE`, `RECEIVED` — that together implement the withhold-and-release
//! handshake: all Connections arrive at `READY`, the Driver alone opens `RELEASE`, all
//! Connections arrive at `RECEIVED`.
//!
//! Grounded on the teacher's `src/worker.rs::inform_listener`, which wakes a peer (there, the
//! listener, via an `mio::Waker`) once a worker reaches a point the peer is waiting on. Here
//! there's no event loop to wake, so the wake primitive is a plain `Condvar::notify_all` instead.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// The three phases of one queue position's barrier protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// All Connections have written everything but their tail bytes.
    Ready,
    /// The Driver has opened the gate; Connections may flush their tail.
    Release,
    /// All Connections have received (or failed to receive) a response.
    Received,
}

#[derive(Debug, Default)]
struct PhaseState {
    arrived: usize,
    aborted: usize,
    opened: bool,
}

/// A capacity-`N`, one-shot counting barrier for a single [`Phase`].
#[derive(Debug)]
struct Barrier {
    state: Mutex<PhaseState>,
    condvar: Condvar,
    capacity: usize,
}

impl Barrier {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PhaseState::default()),
            condvar: Condvar::new(),
            capacity,
        }
    }

    /// Registers one arrival (optionally as an aborted/failed participant) and blocks until
    /// every participant has arrived, or until `timeout` elapses.
    ///
    /// Returns `Ok(())` once all participants arrive, `Err(())` on timeout.
    fn arrive_and_wait(&self, aborted: bool, timeout: Duration) -> Result<(), ()> {
        let mut state = self.state.lock().unwrap();
        state.arrived += 1;
        if aborted {
            state.aborted += 1;
        }
        // Wake every thread already parked in this barrier's wait loop (both peers blocked here
        // in arrive_and_wait and the Driver blocked in wait_until_full) as soon as this arrival
        // might have filled capacity, rather than leaving them to sleep out their own timeout.
        self.condvar.notify_all();

        let deadline = Instant::now() + timeout;
        while state.arrived < self.capacity && !state.opened {
            let now = Instant::now();
            if now >= deadline {
                return Err(());
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
            if result.timed_out() && state.arrived < self.capacity && !state.opened {
                return Err(());
            }
        }
        Ok(())
    }

    /// Opens the barrier unconditionally (Driver-only for `RELEASE`; used for abort broadcast on
    /// `RELEASE`/`RECEIVED` too).
    fn open(&self) {
        let mut state = self.state.lock().unwrap();
        state.opened = true;
        self.condvar.notify_all();
    }

    fn all_aborted(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.arrived > 0 && state.arrived == state.aborted
    }
}

/// The full three-barrier set for one queue position, shared read-only among Workers and
/// mutated only via arrivals (by Workers/Connections) and `open_release`/`abort` (by the
/// Driver).
#[derive(Debug)]
pub struct BarrierSet {
    ready: Barrier,
    release: Barrier,
    received: Barrier,
    timeout: Duration,
}

impl BarrierSet {
    /// Allocates a fresh barrier set of capacity `n` for one queue position.
    pub fn new(n: usize, timeout: Duration) -> Self {
        Self {
            ready: Barrier::new(n),
            release: Barrier::new(n),
            received: Barrier::new(n),
            timeout,
        }
    }

    /// Called by a Connection once it has written everything but its tail bytes. Blocks until
    /// every Connection (or an aborted stand-in) has arrived, i.e. until the Driver is about to
    /// open `RELEASE`.
    pub fn arrive_ready(&self, aborted: bool) -> Result<(), ()> {
        self.ready.arrive_and_wait(aborted, self.timeout)
    }

    /// Called by a Connection after `RELEASE` has opened. Returns immediately if the gate is
    /// already open (the common case — the Driver opens it once all of `READY` has arrived).
    pub fn wait_release(&self) -> Result<(), ()> {
        self.release.arrive_and_wait(false, self.timeout)
    }

    /// Called by a Connection once it has a response (or has failed/aborted).
    pub fn arrive_received(&self, aborted: bool) -> Result<(), ()> {
        self.received.arrive_and_wait(aborted, self.timeout)
    }

    /// Driver-only: waits for `READY` to fill, then opens `RELEASE`. The Driver is not itself a
    /// participant, so it polls for completion rather than arriving.
    pub fn wait_ready_then_release(&self) -> Result<(), ()> {
        // The Driver isn't a counted participant; it waits on the same condition by locking the
        // Ready barrier's state directly through a zero-timeout style poll loop would busy-spin,
        // so instead the last Connection to arrive satisfies the wait on behalf of the Driver:
        // the Driver blocks on the same condvar via a dedicated arrival-observer wait.
        self.ready.wait_until_full(self.timeout)?;
        self.release.open();
        Ok(())
    }

    /// Driver-only: waits for `RECEIVED` to fill (or time out).
    pub fn wait_received(&self) -> Result<(), ()> {
        self.received.wait_until_full(self.timeout)
    }

    /// Driver-only: aborts the whole position, unblocking every Connection waiting on `RELEASE`
    /// or `RECEIVED` (SPEC_FULL §5 — Driver-initiated shutdown).
    pub fn abort(&self) {
        self.ready.open();
        self.release.open();
        self.received.open();
    }

    /// `true` once every participant that arrived at `READY` did so in the aborted state —
    /// meaning there's no live send left for this position.
    pub fn all_ready_aborted(&self) -> bool {
        self.ready.all_aborted()
    }
}

impl Barrier {
    /// Blocks (without counting as a participant) until `capacity` arrivals have been recorded,
    /// or until `timeout` elapses.
    fn wait_until_full(&self, timeout: Duration) -> Result<(), ()> {
        let mut state = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while state.arrived < self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(());
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
            if result.timed_out() && state.arrived < self.capacity {
                return Err(());
            }
        }
        Ok(())
    }
}

/// Lazily allocates one [`BarrierSet`] per queue position, shared between the Driver (which
/// waits on `wait_ready_then_release`/`wait_received`) and every Worker (which arrives). Whichever
/// thread reaches a position first creates its `BarrierSet`; the `Mutex` makes that race safe, so
/// no single thread needs to be "the one" that pre-allocates positions ahead of time.
#[derive(Debug, Default)]
pub struct BarrierRegistry {
    sets: Mutex<HashMap<usize, Arc<BarrierSet>>>,
}

impl BarrierRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `BarrierSet` for `position`, creating one of `capacity`/`timeout` if this is
    /// the first arrival there.
    pub fn get_or_create(&self, position: usize, capacity: usize, timeout: Duration) -> Arc<BarrierSet> {
        let mut sets = self.sets.lock().unwrap();
        sets.entry(position)
            .or_insert_with(|| Arc::new(BarrierSet::new(capacity, timeout)))
            .clone()
    }
}

#[cfg(test)]
mod test {
    use super::BarrierSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn all_arrivals_release_together() {
        let set = Arc::new(BarrierSet::new(3, Duration::from_secs(2)));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let set = set.clone();
            handles.push(std::thread::spawn(move || {
                set.arrive_ready(false).unwrap();
                set.wait_release().unwrap();
                set.arrive_received(false).unwrap();
            }));
        }
        set.wait_ready_then_release().unwrap();
        set.wait_received().unwrap();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn timeout_when_a_participant_never_arrives() {
        let set = Arc::new(BarrierSet::new(2, Duration::from_millis(50)));
        let result = set.arrive_ready(false);
        assert_eq!(Err(()), result);
    }

    #[test]
    fn aborted_arrival_still_counts_towards_capacity() {
        let set = Arc::new(BarrierSet::new(2, Duration::from_secs(2)));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let set = set.clone();
            handles.push(std::thread::spawn(move || {
                set.arrive_ready(true).unwrap();
            }));
        }
        set.wait_ready_then_release().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert!(set.all_ready_aborted());
    }

    #[test]
    fn driver_abort_unblocks_waiting_connections() {
        let set = Arc::new(BarrierSet::new(2, Duration::from_secs(5)));
        let set2 = set.clone();
        let handle = std::thread::spawn(move || {
            set2.arrive_ready(false).unwrap();
            // Driver aborts before a second participant arrives; RELEASE still opens.
            set2.wait_release().unwrap();
        });
        std::thread::sleep(Duration::from_millis(20));
        set.abort();
        handle.join().unwrap();
    }

    #[test]
    fn registry_returns_the_same_set_for_repeat_lookups() {
        use super::BarrierRegistry;
        let registry = BarrierRegistry::new();
        let a = registry.get_or_create(0, 2, Duration::from_secs(1));
        let b = registry.get_or_create(0, 2, Duration::from_secs(1));
        assert!(Arc::ptr_eq(&a, &b));
    }
}
