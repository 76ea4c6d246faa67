//! Parallel NDJSON engine.
//!
//! Splits the (normalized) NDJSON buffer into one newline-aligned chunk per
//! worker, runs parse → evaluate → serialize-or-count on each chunk in
//! parallel via rayon, and concatenates the per-worker buffers in chunk
//! order. The join before the merge is the only barrier; the count-mode
//! atomic is the only write-shared state.

use anyhow::{Context, Result};
use memchr::memchr_iter;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::output::{self, OutputConfig, OutputFormat, ProjField};
use crate::parse::{self, ParseError};
use crate::query::{Filter, eval};
use crate::scan;

/// Engine configuration independent of the output format.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Requested worker count; clamped to the available cores.
    pub threads: usize,
    /// Count matches instead of emitting them.
    pub count: bool,
    /// Emit at most the first N matches, in input order.
    pub limit: Option<usize>,
}

/// What a run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum RunResult {
    Count(u64),
    /// The fully merged output, ready for a single write.
    Output(Vec<u8>),
}

/// Per-record parse failures are reported at most once per process.
static PARSE_ERROR_LOGGED: AtomicBool = AtomicBool::new(false);

fn report_parse_error(e: ParseError) {
    if !PARSE_ERROR_LOGGED.swap(true, Ordering::Relaxed) {
        eprintln!("nq: skipping malformed record ({e}); further malformed records are skipped silently");
    }
}

/// Drive the full pipeline over a normalized NDJSON buffer.
pub fn run(
    data: &[u8],
    filter: &Filter,
    run_cfg: &RunConfig,
    out_cfg: &OutputConfig,
) -> Result<RunResult> {
    let threads = effective_threads(run_cfg.threads);

    // CSV needs one column order across all workers. Without --select it
    // comes from the globally first matching record.
    let mut config = out_cfg.clone();
    if !run_cfg.count && config.format == OutputFormat::Csv && config.projection.is_none() {
        config.projection = derive_csv_projection(data, filter);
    }

    // The json merger re-splits records, so it always needs end offsets;
    // otherwise they are only tracked to apply a limit.
    let track_ends = config.format == OutputFormat::Json || run_cfg.limit.is_some();

    let chunks = split_chunks(data, threads);
    let counter = AtomicU64::new(0);

    let results: Vec<WorkerOut> = if chunks.len() <= 1 {
        chunks
            .iter()
            .map(|&c| process_chunk(c, filter, &config, run_cfg, track_ends, &counter))
            .collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("failed to build worker pool")?;
        pool.install(|| {
            chunks
                .par_iter()
                .map(|&c| process_chunk(c, filter, &config, run_cfg, track_ends, &counter))
                .collect()
        })
    };

    if run_cfg.count {
        return Ok(RunResult::Count(counter.load(Ordering::Relaxed)));
    }
    Ok(RunResult::Output(merge(
        results,
        &config,
        run_cfg.limit,
    )))
}

fn effective_threads(requested: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.clamp(1, cores)
}

/// Split the buffer into at most `parts` chunks of roughly equal size, each
/// extended forward to the next newline so chunk boundaries coincide with
/// record boundaries.
pub fn split_chunks(buf: &[u8], parts: usize) -> Vec<&[u8]> {
    if buf.is_empty() {
        return Vec::new();
    }
    let parts = parts.max(1);
    let target = buf.len().div_ceil(parts);

    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    while start < buf.len() {
        let boundary = start.saturating_add(target);
        if boundary >= buf.len() {
            chunks.push(&buf[start..]);
            break;
        }
        match scan::find_next_newline(buf, boundary) {
            Some(nl) => {
                chunks.push(&buf[start..=nl]);
                start = nl + 1;
            }
            None => {
                chunks.push(&buf[start..]);
                break;
            }
        }
    }
    chunks
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorkerOut {
    /// Serialized matches from this worker's chunk.
    buf: Vec<u8>,
    /// End offset in `buf` after each record, when tracked.
    ends: Vec<usize>,
}

/// Run one chunk to completion. The local match count flushes to the shared
/// atomic exactly once, on exit.
fn process_chunk(
    chunk: &[u8],
    filter: &Filter,
    config: &OutputConfig,
    run_cfg: &RunConfig,
    track_ends: bool,
    counter: &AtomicU64,
) -> WorkerOut {
    let mut out = WorkerOut::default();
    let mut local_count = 0u64;

    // A worker can never contribute more than the overall limit
    let cap = if run_cfg.count { None } else { run_cfg.limit };

    let mut start = 0;
    for nl in memchr_iter(b'\n', chunk) {
        process_line(
            &chunk[start..nl],
            filter,
            config,
            run_cfg.count,
            track_ends,
            &mut local_count,
            &mut out,
        );
        start = nl + 1;
        if cap.is_some_and(|l| out.ends.len() >= l) {
            break;
        }
    }
    // Final record without a trailing newline
    if start < chunk.len() && !cap.is_some_and(|l| out.ends.len() >= l) {
        process_line(
            &chunk[start..],
            filter,
            config,
            run_cfg.count,
            track_ends,
            &mut local_count,
            &mut out,
        );
    }

    if local_count > 0 {
        counter.fetch_add(local_count, Ordering::Relaxed);
    }
    out
}

fn process_line(
    line: &[u8],
    filter: &Filter,
    config: &OutputConfig,
    count_only: bool,
    track_ends: bool,
    local_count: &mut u64,
    out: &mut WorkerOut,
) {
    let end = line
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\t' | b'\r'))
        .map_or(0, |p| p + 1);
    let trimmed = &line[..end];
    if trimmed.is_empty() {
        return;
    }

    let obj = match parse::parse_object(trimmed) {
        Ok(obj) => obj,
        Err(e) => {
            // Malformed records are not matches; processing continues
            report_parse_error(e);
            return;
        }
    };

    if !eval::matches(&obj, filter) {
        return;
    }

    if count_only {
        *local_count += 1;
        return;
    }
    output::write_record(&mut out.buf, &obj, config);
    if track_ends {
        out.ends.push(out.buf.len());
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Concatenate worker buffers in chunk order into one exact-size output,
/// applying the limit and (for json) the array framing.
fn merge(results: Vec<WorkerOut>, config: &OutputConfig, limit: Option<usize>) -> Vec<u8> {
    if config.format == OutputFormat::Json {
        return merge_json(&results, config.pretty, limit);
    }

    let total: usize = results.iter().map(|r| r.buf.len()).sum();
    let mut out = Vec::with_capacity(total + 256);

    if config.format == OutputFormat::Csv {
        if let Some(fields) = config.projection.as_deref() {
            output::write_csv_header(&mut out, fields);
        }
    }

    match limit {
        None => {
            for r in &results {
                out.extend_from_slice(&r.buf);
            }
        }
        Some(l) => {
            let mut remaining = l;
            for r in &results {
                if remaining == 0 {
                    break;
                }
                if r.ends.len() <= remaining {
                    out.extend_from_slice(&r.buf);
                    remaining -= r.ends.len();
                } else {
                    out.extend_from_slice(&r.buf[..r.ends[remaining - 1]]);
                    remaining = 0;
                }
            }
        }
    }
    out
}

fn merge_json(results: &[WorkerOut], pretty: bool, limit: Option<usize>) -> Vec<u8> {
    let total: usize = results.iter().map(|r| r.buf.len()).sum();
    let mut out = Vec::with_capacity(total + 256);
    out.push(b'[');

    let mut emitted = 0usize;
    'workers: for r in results {
        let mut start = 0usize;
        for &end in &r.ends {
            if limit.is_some_and(|l| emitted >= l) {
                break 'workers;
            }
            if emitted > 0 {
                out.push(b',');
            }
            if pretty {
                out.extend_from_slice(b"\n  ");
            }
            out.extend_from_slice(&r.buf[start..end]);
            start = end;
            emitted += 1;
        }
    }

    if pretty && emitted > 0 {
        out.push(b'\n');
    }
    out.push(b']');
    out.push(b'\n');
    out
}

// ---------------------------------------------------------------------------
// CSV header pre-pass
// ---------------------------------------------------------------------------

/// Sequentially find the first matching record and lift its field order
/// into a projection, so every worker serializes the same columns.
fn derive_csv_projection(data: &[u8], filter: &Filter) -> Option<Vec<ProjField>> {
    let mut start = 0usize;
    while start < data.len() {
        let end = scan::find_next_newline(data, start).unwrap_or(data.len());
        let line = &data[start..end];
        let trimmed_end = line
            .iter()
            .rposition(|&b| !matches!(b, b' ' | b'\t' | b'\r'))
            .map_or(0, |p| p + 1);
        let trimmed = &line[..trimmed_end];
        if !trimmed.is_empty() {
            if let Ok(obj) = parse::parse_object(trimmed) {
                if eval::matches(&obj, filter) {
                    return Some(
                        obj.fields()
                            .iter()
                            .map(|(k, _)| ProjField::new(&String::from_utf8_lossy(k)))
                            .collect(),
                    );
                }
            }
        }
        start = end + 1;
    }
    None
}
