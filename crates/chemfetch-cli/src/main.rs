use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chemfetch_client::{AdmetLab, IdentityEncoder, Knapsack, Molsoft, Protox, SearchType};
use chemfetch_core::config::{EngineConfig, ThrottlePolicy};
use chemfetch_core::models::{ResultTable, SummaryCounts};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "chemfetch", version, about = "Compound property retrieval from prediction services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Batched ADMET property screening
    Admetlab {
        /// SMILES strings to submit
        smiles: Vec<String>,

        /// File with one SMILES per line ('#' comments allowed)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Worker pool width
        #[arg(long, default_value_t = 4, env = "CHEMFETCH_WORKERS")]
        workers: usize,

        /// SMILES per submission (1-100)
        #[arg(long, default_value_t = 100)]
        batch_size: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Acute toxicity predictions, one compound per request
    Protox {
        smiles: Vec<String>,

        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = 4, env = "CHEMFETCH_WORKERS")]
        workers: usize,

        /// Wait out server rate limits instead of failing the job
        #[arg(long, default_value_t = false)]
        auto_resume: bool,

        /// Minutes to wait per rate-limit hit
        #[arg(long, default_value_t = 10)]
        wait_minutes: u64,

        /// Rate-limit retries per job before giving up
        #[arg(long, default_value_t = 3)]
        max_retries: u32,

        /// Abort the whole run on an unrecoverable rate limit
        #[arg(long, default_value_t = false)]
        abort_on_rate_limit: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Molecular property predictions, one compound per request
    Molsoft {
        smiles: Vec<String>,

        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = 4, env = "CHEMFETCH_WORKERS")]
        workers: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Metabolite search with per-compound detail lookup
    Knapsack {
        /// Search keyword (species, formula, C_ID, ...)
        #[arg(short, long)]
        keyword: String,

        /// Search criterion: all, name, formula, mass, cid
        #[arg(short, long, default_value = "all")]
        search_type: String,

        #[arg(long, default_value_t = 5, env = "CHEMFETCH_WORKERS")]
        workers: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, clap::Args)]
struct OutputArgs {
    /// Write the table here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chemfetch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Ctrl-C cancels in-flight jobs cooperatively (including backoff waits).
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Admetlab {
            smiles,
            input,
            workers,
            batch_size,
            output,
        } => {
            let smiles = load_smiles(smiles, input.as_deref())?;
            let config = EngineConfig::default()
                .with_max_workers(workers)
                .with_max_batch_size(batch_size);
            let source = AdmetLab::with_config(config)?;
            let results = source.run_with_cancel(&smiles, &cancel).await?;
            emit(results, &output)?;
        }
        Commands::Protox {
            smiles,
            input,
            workers,
            auto_resume,
            wait_minutes,
            max_retries,
            abort_on_rate_limit,
            output,
        } => {
            let smiles = load_smiles(smiles, input.as_deref())?;
            let throttle = ThrottlePolicy::default()
                .with_auto_resume(auto_resume)
                .with_wait(std::time::Duration::from_secs(wait_minutes * 60))
                .with_max_retries(max_retries);
            let config = EngineConfig::default()
                .with_max_workers(workers)
                .with_throttle(throttle)
                .with_abort_on_rate_limit(abort_on_rate_limit);
            let source = Protox::with_config(IdentityEncoder, config)?;
            let results = source.run_with_cancel(&smiles, &cancel).await?;
            emit(results, &output)?;
        }
        Commands::Molsoft {
            smiles,
            input,
            workers,
            output,
        } => {
            let smiles = load_smiles(smiles, input.as_deref())?;
            let config = EngineConfig::default().with_max_workers(workers);
            let source = Molsoft::with_config(IdentityEncoder, config)?;
            let results = source.run_with_cancel(&smiles, &cancel).await?;
            emit(results, &output)?;
        }
        Commands::Knapsack {
            keyword,
            search_type,
            workers,
            output,
        } => {
            let search_type: SearchType = search_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let config = EngineConfig::default().with_max_workers(workers);
            let source = Knapsack::with_config(search_type, keyword, config)?;
            let results = source.search_with_cancel(&cancel).await?;
            emit(results, &output)?;
        }
    }

    Ok(())
}

/// Merge positional SMILES with the optional input file.
fn load_smiles(mut smiles: Vec<String>, input: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        smiles.extend(parse_smiles_lines(&content));
    }
    if smiles.is_empty() {
        bail!("No SMILES given. Pass them as arguments or via --input.");
    }
    Ok(smiles)
}

/// One SMILES per line; blank lines and '#' comments are skipped.
fn parse_smiles_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

fn emit((table, counts): (ResultTable, SummaryCounts), output: &OutputArgs) -> Result<()> {
    tracing::info!(
        succeeded = counts.succeeded,
        failed = counts.failed,
        total = counts.total,
        rows = table.len(),
        "Run finished"
    );

    match &output.out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_table(&table, output.format, file)?;
            tracing::info!(path = %path.display(), "Results written");
        }
        None => {
            write_table(&table, output.format, std::io::stdout().lock())?;
        }
    }
    Ok(())
}

fn write_table<W: Write>(table: &ResultTable, format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(table, writer),
        OutputFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, table)?;
            writeln!(writer)?;
            Ok(())
        }
    }
}

fn write_csv<W: Write>(table: &ResultTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&table.columns)?;
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(render_cell).collect::<Result<_>>()?;
        csv_writer.write_record(&cells)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Scalars render bare; null renders empty; nested values (e.g. organism
/// lists) render as compact JSON.
fn render_cell(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        nested => serde_json::to_string(nested)?,
    })
}
