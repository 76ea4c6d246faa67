use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{self, Write};

use nq::input::Input;
use nq::output::{OutputConfig, OutputFormat, ProjField};
use nq::parallel::ndjson::{RunConfig, RunResult};

#[derive(Parser)]
#[command(
    name = "nq",
    about = "Filter NDJSON and JSON array data with MongoDB-style queries",
    version
)]
struct Cli {
    /// MongoDB-style query, e.g. '{"age":{"$gt":30}}'. Query and path may
    /// be given in either order; a .json/.ndjson suffix or `-` decides.
    query: String,

    /// Input file, or `-` for stdin
    path: String,

    /// Emit only these fields (comma-separated, dotted paths allowed)
    #[arg(long, value_name = "FIELDS")]
    select: Option<String>,

    /// Print the number of matching records instead of the records
    #[arg(long)]
    count: bool,

    /// Emit at most the first N matching records
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Worker threads, clamped to the available cores
    #[arg(long, default_value_t = 4, value_name = "N")]
    threads: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputArg::Ndjson)]
    output: OutputArg,

    /// Pretty-print the json output format (one record per line)
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputArg {
    Ndjson,
    Json,
    Csv,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> OutputFormat {
        match arg {
            OutputArg::Ndjson => OutputFormat::Ndjson,
            OutputArg::Json => OutputFormat::Json,
            OutputArg::Csv => OutputFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let (query, path) = disambiguate(&cli.query, &cli.path);

    let filter = nq::query::compile(query.as_bytes())
        .with_context(|| format!("failed to compile query: {query}"))?;

    let projection = match cli.select.as_deref() {
        Some(spec) => {
            let fields: Vec<ProjField> = spec
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ProjField::new)
                .collect();
            if fields.is_empty() {
                bail!("--select needs at least one field");
            }
            Some(fields)
        }
        None => None,
    };

    let out_cfg = OutputConfig {
        format: cli.output.into(),
        pretty: cli.pretty,
        projection,
    };
    let run_cfg = RunConfig {
        threads: cli.threads,
        count: cli.count,
        limit: cli.limit,
    };

    let input = Input::load(path)?.into_ndjson();
    let result = nq::parallel::ndjson::run(input.data(), &filter, &run_cfg, &out_cfg)?;

    // Everything the run produced goes out in one write
    let mut stdout = io::stdout().lock();
    match result {
        RunResult::Count(n) => {
            let mut itoa_buf = itoa::Buffer::new();
            let mut line = Vec::with_capacity(24);
            line.extend_from_slice(itoa_buf.format(n).as_bytes());
            line.push(b'\n');
            stdout.write_all(&line).context("failed to write output")?;
        }
        RunResult::Output(bytes) => {
            stdout.write_all(&bytes).context("failed to write output")?;
        }
    }

    Ok(())
}

/// Accept query and path in either positional order: whichever argument has
/// a data-file suffix or is `-` is the path.
fn disambiguate<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str) {
    if looks_like_path(first) && !looks_like_path(second) {
        (second, first)
    } else {
        (first, second)
    }
}

fn looks_like_path(s: &str) -> bool {
    s == "-" || s.ends_with(".json") || s.ends_with(".ndjson") || s.ends_with(".jsonl")
}
