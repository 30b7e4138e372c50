//! Ambient logging setup (SPEC_FULL §4.6)
//!
//! A thin wrapper around `env_logger`, the `log`-facade consumer the teacher's own `rustls`
//! feature flags (`log`, `logging`) already signal. Kept separate from `bin/barrage.rs` so tests
//! that want logging (e.g. to debug a flaky fixture) can call [`init`] directly.

use std::io::Write;

/// Initializes the global logger once. Safe to call more than once — only the first call takes
/// effect, matching `env_logger::Builder::try_init`'s semantics.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}
