//! CLI front end for the `barrage` race-condition testing harness (SPEC_FULL §4.6).
//!
//! Everything interesting lives in the library crate; this binary is only argument parsing,
//! logging setup, and a human-readable summary of the [`WorkerResult`]s a run produces — the
//! ambient stack SPEC_FULL §1 calls out as an external collaborator rather than the core engine.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use barrage::dns::ConnectMode;
use barrage::http::Method;
use barrage::worker::PositionOutcome;
use barrage::{Driver, RaceConfig, RequestSpec, Work, WorkerResult};

/// Fire `--threads` nearly-simultaneous HTTP requests at a target and report how they landed.
#[derive(Parser, Debug)]
#[command(name = "barrage", version, about)]
struct Cli {
    /// Absolute target URL, e.g. http://example.test/redeem?code=ABC
    url: String,

    /// HTTP method.
    #[arg(short = 'X', long = "request", default_value = "GET")]
    method: String,

    /// Number of parallel workers racing the same request.
    #[arg(short = 'n', long = "threads", default_value_t = 20)]
    threads: usize,

    /// Request header, `Name: value`. May be repeated.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Request body.
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Number of bytes withheld from the end of each request until release.
    #[arg(long, default_value_t = 1)]
    tail_bytes: usize,

    /// IP selection policy for hosts with multiple addresses: same | different | random.
    #[arg(long = "connect-mode", default_value = "random")]
    connect_mode: String,

    /// Disable TLS certificate verification (race fixtures under your own control only).
    #[arg(long)]
    insecure: bool,

    /// Scan the URL, headers, and body for `<<<expr>>>` markers before sending.
    #[arg(long)]
    eval: bool,

    /// After sending, copy outgoing `Cookie` header entries into the worker's jar.
    #[arg(long)]
    save_sent_cookies: bool,

    /// Upper bound, in seconds, on any single barrier wait.
    #[arg(long, default_value_t = 30)]
    barrier_timeout_secs: u64,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("invalid header {raw:?}, expected \"Name: value\""))
}

fn main() -> ExitCode {
    barrage::logging::init();
    let cli = Cli::parse();

    let method: Method = match cli.method.parse() {
        Ok(m) => m,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let connect_mode: ConnectMode = match cli.connect_mode.parse() {
        Ok(m) => m,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match RaceConfig::new(
        connect_mode,
        cli.tail_bytes,
        Duration::from_secs(cli.barrier_timeout_secs),
    ) {
        Ok(config) => config
            .with_do_eval(cli.eval)
            .with_save_sent_cookies(cli.save_sent_cookies)
            .with_verify_tls(!cli.insecure),
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let spec = RequestSpec {
        method,
        url: cli.url.clone(),
        headers: cli.headers,
        body: cli.data.map(String::into_bytes).unwrap_or_default(),
        cookies: Default::default(),
    };

    log::info!(
        "racing {} with {} workers (tail_bytes={}, connect_mode={:?})",
        cli.url,
        cli.threads,
        cli.tail_bytes,
        config.connect_mode,
    );

    match Driver::process(Work::Single(spec), cli.threads, config) {
        Ok(results) => {
            report(&results);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("race aborted: {e}");
            ExitCode::FAILURE
        }
    }
}

fn report(results: &[WorkerResult]) {
    for result in results {
        for (position, outcome) in result.positions.iter().enumerate() {
            match outcome {
                PositionOutcome::Response(r) => println!(
                    "worker {:>3} position {:>3}: {} ({} bytes)",
                    result.worker_id,
                    position,
                    r.status.code(),
                    r.body.len()
                ),
                PositionOutcome::CallbackCompleted => {
                    println!("worker {:>3} position {:>3}: callback", result.worker_id, position)
                }
                PositionOutcome::Failed { kind, message } => println!(
                    "worker {:>3} position {:>3}: {kind} — {message}",
                    result.worker_id, position
                ),
            }
        }
    }
}
