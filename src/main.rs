use anyhow::{bail, Context, Result};
use chartcalc::data::records_from_json;
use chartcalc::{csv_reader, ChartEngine, ChartError, ChartRequest, EngineConfig, FileSource, Record};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "chartcalc")]
#[command(about = "Compute chart payloads from JSON or CSV records", long_about = None)]
struct Args {
    /// Chart request as JSON, or @path of a file holding it
    #[arg(short, long)]
    request: String,

    /// Records file; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Records format (default: from the input extension, else json)
    #[arg(short, long, value_enum)]
    format: Option<InputFormat>,

    /// Engine settings (stores and collections)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of <table>.json / <table>.csv files used as the backend
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Fetch every series from --data-dir instead of reading records
    #[arg(long, requires = "data_dir")]
    fetch: bool,

    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let request = load_request(&args.request)?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let source = args.data_dir.as_ref().map(|dir| Arc::new(FileSource::new(dir)));
    let mut engine = ChartEngine::new(Arc::new(config));
    if let Some(source) = &source {
        engine = engine.with_source(source.clone());
    }

    let outcome = match (&source, args.fetch) {
        (Some(source), true) => engine.compute_from_source(&request, &**source),
        (None, true) => bail!("--fetch needs --data-dir"),
        (_, false) => {
            let records = read_records(args.input.as_deref(), args.format)?;
            engine.compute_records(&request, records).map_err(anyhow::Error::from)
        }
    };

    match outcome {
        Ok(result) => write_json(&result, args.pretty),
        Err(err) => match err.downcast::<ChartError>() {
            Ok(chart_err) => {
                tracing::error!(error = %chart_err, "chart computation failed");
                write_json(&chart_err.into_failure(&request), args.pretty)?;
                std::process::exit(1);
            }
            Err(other) => Err(other),
        },
    }
}

fn load_request(arg: &str) -> Result<ChartRequest> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Invalid chart request JSON")
}

fn read_records(input: Option<&Path>, format: Option<InputFormat>) -> Result<Vec<Record>> {
    let format = format.unwrap_or_else(|| match input.and_then(|p| p.extension()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
        _ => InputFormat::Json,
    });

    if format == InputFormat::Csv {
        let csv_data = match input {
            Some(path) => {
                let file = fs::File::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                csv_reader::read_csv(io::BufReader::new(file))?
            }
            None => csv_reader::read_csv_from_stdin().context("Failed to read CSV from stdin")?,
        };
        return Ok(csv_data.into_records());
    }

    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read records from {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read records from stdin")?;
            text
        }
    };
    let value: serde_json::Value = serde_json::from_str(&text).context("Records are not valid JSON")?;
    records_from_json(&value)
}

fn write_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let body = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", body).context("Failed to write result to stdout")?;
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}
