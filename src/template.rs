//! `<<<expr>>>` substitution (SPEC_FULL §6, §6a)
//!
//! The distilled spec's own design notes (§9) re-architect the source's runtime `eval()` into
//! "a small, sandboxed expression evaluator supporting field references... and a bounded set of
//! functions". This module is that evaluator: a fixed delimiter scan plus a tiny grammar — no
//! arbitrary host-language evaluation is reachable from a request field.

use std::fmt;

use rand::Rng;

use crate::worker::WorkerContext;

const OPEN: &str = "<<<";
const CLOSE: &str = ">>>";

/// Failures while evaluating a template expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `<<<` with no matching `>>>`.
    UnterminatedMarker,
    /// The text between the delimiters isn't one of the recognized expression forms.
    UnknownExpression(String),
    /// `self.responses[i]` referenced an index this worker hasn't reached yet.
    ResponseIndexOutOfRange(usize),
    /// A call's arguments didn't parse (e.g. non-numeric bounds to `rand_int`).
    BadArguments(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedMarker => write!(f, "unterminated <<< marker"),
            Self::UnknownExpression(expr) => write!(f, "unrecognized expression: {expr}"),
            Self::ResponseIndexOutOfRange(i) => write!(f, "no response recorded at index {i}"),
            Self::BadArguments(msg) => write!(f, "bad arguments: {msg}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Scans `input` for `<<<expr>>>` markers and replaces each with the string form of evaluating
/// `expr` against `ctx`. Text with no markers is returned unchanged (R1: disabling `do_eval` on
/// marker-free text is identical to enabling it).
pub fn substitute(input: &str, ctx: &WorkerContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        let Some(start) = rest.find(OPEN) else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(TemplateError::UnterminatedMarker);
        };
        let expr = &after_open[..end];
        out.push_str(&evaluate(expr.trim(), ctx)?);
        rest = &after_open[end + CLOSE.len()..];
    }
}

fn evaluate(expr: &str, ctx: &WorkerContext) -> Result<String, TemplateError> {
    if expr == "self.thread_num" {
        return Ok(ctx.thread_num.to_string());
    }

    if let Some(index) = expr
        .strip_prefix("self.responses[")
        .and_then(|rest| rest.strip_suffix("].status"))
    {
        let index: usize = index
            .parse()
            .map_err(|_| TemplateError::BadArguments(index.to_string()))?;
        return ctx
            .response_status(index)
            .ok_or(TemplateError::ResponseIndexOutOfRange(index))
            .map(|status| status.to_string());
    }

    if let Some(index) = expr
        .strip_prefix("self.responses[")
        .and_then(|rest| rest.strip_suffix("].body"))
    {
        let index: usize = index
            .parse()
            .map_err(|_| TemplateError::BadArguments(index.to_string()))?;
        return ctx
            .response_body(index)
            .ok_or(TemplateError::ResponseIndexOutOfRange(index));
    }

    if let Some(args) = expr.strip_prefix("rand_int(").and_then(|r| r.strip_suffix(')')) {
        let (lo, hi) = parse_two_ints(args)?;
        return Ok(rand::thread_rng().gen_range(lo..=hi).to_string());
    }

    if let Some(args) = expr.strip_prefix("rand_str(").and_then(|r| r.strip_suffix(')')) {
        let len: usize = args
            .trim()
            .parse()
            .map_err(|_| TemplateError::BadArguments(args.to_string()))?;
        return Ok(random_string(len));
    }

    if expr == "counter()" {
        return Ok(ctx.next_counter().to_string());
    }

    if let Some(literal) = expr.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(literal.to_string());
    }

    if expr.chars().all(|c| c.is_ascii_digit()) && !expr.is_empty() {
        return Ok(expr.to_string());
    }

    Err(TemplateError::UnknownExpression(expr.to_string()))
}

fn parse_two_ints(args: &str) -> Result<(i64, i64), TemplateError> {
    let (lo, hi) = args
        .split_once(',')
        .ok_or_else(|| TemplateError::BadArguments(args.to_string()))?;
    let lo: i64 = lo
        .trim()
        .parse()
        .map_err(|_| TemplateError::BadArguments(args.to_string()))?;
    let hi: i64 = hi
        .trim()
        .parse()
        .map_err(|_| TemplateError::BadArguments(args.to_string()))?;
    Ok((lo, hi))
}

fn random_string(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
