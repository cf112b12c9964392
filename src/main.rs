use anyhow::{bail, Result};
use chrono::Local;
use clap::Parser;
use streamdiff::infrastructure::config::{
    DestinationConfig, DuplicatesConfig, KeyConfig, OutputFormat,
};
use streamdiff::presentation::cli_summary::{
    print_duplication_summary, print_perf_summary, print_summary,
};
use streamdiff::{init_tracing, AppConfig, DiffConfig, LogLevel, OutputConfig, SourceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "streamdiff",
    about = "Streamdiff: compare two key-sorted CSV/TSV snapshots row by row."
)]
struct Cli {
    /// TOML configuration file. Command-line flags override its values.
    #[arg(short, long)]
    config: Option<String>,

    /// Old snapshot (CSV or TSV).
    #[arg(long)]
    old: Option<String>,

    /// New snapshot (CSV or TSV).
    #[arg(long)]
    new: Option<String>,

    /// Key column, in sort order. Repeat for composite keys.
    #[arg(short, long = "key")]
    keys: Vec<String>,

    /// Column to leave out of the comparison. Repeatable.
    #[arg(short = 'x', long = "exclude")]
    excluded: Vec<String>,

    /// Output format: json or csv.
    #[arg(short, long)]
    format: Option<String>,

    /// Output file, `console` or `null`. With `--format` and no file name,
    /// a timestamped file is created inside this directory.
    #[arg(short, long)]
    output: Option<String>,

    /// Also emit rows that did not change.
    #[arg(long)]
    keep_same: bool,

    /// Stop after this many changes.
    #[arg(long)]
    max_changes: Option<usize>,

    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn log_level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Error
        } else if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    fn into_config(self) -> Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => {
                let (Some(old), Some(new)) = (&self.old, &self.new) else {
                    bail!("either --config or both --old and --new are required");
                };
                AppConfig {
                    old: SourceConfig::Path(old.clone()),
                    new: SourceConfig::Path(new.clone()),
                    diff: DiffConfig {
                        keys: Vec::new(),
                        included_columns: Default::default(),
                        excluded_columns: Default::default(),
                        duplicates: DuplicatesConfig::default(),
                    },
                    output: OutputConfig::default(),
                }
            }
        };

        if let Some(old) = self.old {
            cfg.old = SourceConfig::Path(old);
        }
        if let Some(new) = self.new {
            cfg.new = SourceConfig::Path(new);
        }
        if !self.keys.is_empty() {
            cfg.diff.keys = self.keys.into_iter().map(KeyConfig::Name).collect();
        }
        if cfg.diff.keys.is_empty() {
            bail!("at least one --key is required");
        }
        cfg.diff.excluded_columns.0.extend(self.excluded);
        cfg.output.keep_same_rows |= self.keep_same;
        if self.max_changes.is_some() {
            cfg.output.max_changes = self.max_changes;
        }

        let format = self.format.as_deref().map(parse_format).transpose()?;
        cfg.output.destination = match (format, self.output) {
            (None, None) => cfg.output.destination,
            (None, Some(path)) => DestinationConfig::Named(path),
            (Some(format), None) => DestinationConfig::Options { format, path: None },
            (Some(format), Some(path)) => DestinationConfig::Options {
                format,
                path: Some(output_path(&path, format)),
            },
        };
        Ok(cfg)
    }
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "json" => Ok(OutputFormat::Json),
        "csv" => Ok(OutputFormat::Csv),
        other => bail!("Unknown format: {}", other),
    }
}

/// A directory-looking target gets a timestamped file name.
fn output_path(path: &str, format: OutputFormat) -> String {
    let is_dir = path.ends_with('/') || std::path::Path::new(path).is_dir();
    if !is_dir {
        return path.to_string();
    }
    let ext = match format {
        OutputFormat::Json => "json",
        OutputFormat::Csv => "csv",
    };
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    std::path::Path::new(path)
        .join(format!("diff_{}.{}", timestamp, ext))
        .display()
        .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = cli.log_level();
    init_tracing(level);

    let cfg = cli.into_config()?;
    let report = streamdiff::run_with_timing(&cfg).await?;

    if level != LogLevel::Error {
        print_summary(cfg.old.path(), cfg.new.path(), &report.stats);
        print_duplication_summary(&report.duplicates);
        print_perf_summary(&report.perf);
    }

    Ok(())
}
