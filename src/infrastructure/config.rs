use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::application::duplicates::{DuplicateOptions, DuplicatePolicy, DEFAULT_DUPLICATE_BUFFER_SIZE};
use crate::application::session::{DiffOptions, OutputOptions};
use crate::domain::column::{ComparerKind, KeySpec};
use crate::domain::value_objects::{ExcludedColumns, IncludedColumns, SortDirection};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub old: SourceConfig,
    pub new: SourceConfig,
    pub diff: DiffConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// A source is either a bare path (format from the extension) or a table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SourceConfig {
    Path(String),
    Options(SourceOptions),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceOptions {
    pub path: String,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// Overrides the format's delimiter.
    #[serde(default)]
    pub delimiter: Option<char>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Tsv,
}

impl SourceConfig {
    pub fn path(&self) -> &str {
        match self {
            SourceConfig::Path(p) => p,
            SourceConfig::Options(o) => &o.path,
        }
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            SourceConfig::Options(SourceOptions {
                format: Some(format),
                ..
            }) => *format,
            _ => format_from_extension(self.path()),
        }
    }

    pub fn delimiter(&self) -> u8 {
        if let SourceConfig::Options(SourceOptions {
            delimiter: Some(d), ..
        }) = self
        {
            if d.is_ascii() {
                return *d as u8;
            }
        }
        match self.format() {
            SourceFormat::Csv => b',',
            SourceFormat::Tsv => b'\t',
        }
    }
}

fn format_from_extension(path: &str) -> SourceFormat {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => SourceFormat::Tsv,
        _ => SourceFormat::Csv,
    }
}

// ─── Diff ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
pub struct DiffConfig {
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub included_columns: IncludedColumns,
    #[serde(default)]
    pub excluded_columns: ExcludedColumns,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
}

/// A key is either a bare column name or a table with comparer and order.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum KeyConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        comparer: ComparerKind,
        #[serde(default)]
        order: SortDirection,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicyConfig {
    #[default]
    Off,
    KeepFirst,
    KeepLast,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DuplicatesConfig {
    #[serde(default)]
    pub policy: DuplicatePolicyConfig,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub allow_overflow: bool,
}

fn default_buffer_size() -> usize {
    DEFAULT_DUPLICATE_BUFFER_SIZE
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            policy: DuplicatePolicyConfig::Off,
            buffer_size: DEFAULT_DUPLICATE_BUFFER_SIZE,
            allow_overflow: false,
        }
    }
}

impl From<&KeyConfig> for KeySpec {
    fn from(cfg: &KeyConfig) -> Self {
        match cfg {
            KeyConfig::Name(name) => KeySpec::new(name.as_str()),
            KeyConfig::Detailed {
                name,
                comparer,
                order,
            } => {
                let mut spec = KeySpec::new(name.as_str()).with_comparer(*comparer);
                spec.direction = *order;
                spec
            }
        }
    }
}

impl DiffConfig {
    pub fn to_options(&self) -> DiffOptions {
        let policy = match self.duplicates.policy {
            DuplicatePolicyConfig::Off => None,
            DuplicatePolicyConfig::KeepFirst => Some(DuplicatePolicy::KeepFirst),
            DuplicatePolicyConfig::KeepLast => Some(DuplicatePolicy::KeepLast),
        };
        DiffOptions {
            keys: self.keys.iter().map(KeySpec::from).collect(),
            included_columns: self.included_columns.clone(),
            excluded_columns: self.excluded_columns.clone(),
            duplicates: policy.map(|p| {
                DuplicateOptions::new(p)
                    .with_buffer_size(self.duplicates.buffer_size)
                    .with_overflow(self.duplicates.allow_overflow)
            }),
            row_comparer: None,
        }
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// `"console"`, `"null"`, a file path (format from the extension), or a
/// table naming the format explicitly.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DestinationConfig {
    Named(String),
    Options {
        format: OutputFormat,
        #[serde(default)]
        path: Option<String>,
    },
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig::Named("console".to_string())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub keep_same_rows: bool,
    #[serde(default)]
    pub max_changes: Option<usize>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl OutputConfig {
    pub fn to_options(&self) -> OutputOptions {
        OutputOptions {
            keep_same_rows: self.keep_same_rows,
            max_changes: self.max_changes,
            filter: None,
            labels: self.labels.clone(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

const ENV_PREFIX: &str = "STREAMDIFF";

impl AppConfig {
    /// Load a TOML file, overridden by `STREAMDIFF__SECTION__KEY` variables.
    pub fn load(path: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(Path::new(path)).format(config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .context("Failed to parse config TOML")?
            .try_deserialize()
            .context("Failed to parse config TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::column::CompareWith;
    use std::io::Write;

    const FULL: &str = r#"
old = "exports/users_2024.csv"

[new]
path = "exports/users_2025.txt"
format = "tsv"

[diff]
keys = ["id", { name = "score", comparer = "number", order = "DESC" }]
excluded_columns = ["updated_at"]

[diff.duplicates]
policy = "keep-last"
buffer_size = 10
allow_overflow = true

[output]
destination = { format = "json", path = "out/diff.json" }
keep_same_rows = true
max_changes = 5
"#;

    #[test]
    fn parses_full_config() {
        let cfg = AppConfig::from_toml_str(FULL).unwrap();
        assert_eq!(cfg.old, SourceConfig::Path("exports/users_2024.csv".into()));
        assert_eq!(cfg.old.delimiter(), b',');
        assert_eq!(cfg.new.format(), SourceFormat::Tsv);
        assert_eq!(cfg.new.delimiter(), b'\t');
        assert_eq!(cfg.diff.keys[0], KeyConfig::Name("id".into()));
        assert_eq!(
            cfg.output.destination,
            DestinationConfig::Options {
                format: OutputFormat::Json,
                path: Some("out/diff.json".into())
            }
        );

        let opts = cfg.diff.to_options();
        assert_eq!(opts.keys.len(), 2);
        assert_eq!(opts.keys[1].name, "score");
        assert_eq!(opts.keys[1].direction, SortDirection::Desc);
        assert!(matches!(opts.keys[1].comparer, CompareWith::Number));
        assert!(opts.excluded_columns.contains("updated_at"));
        let dup = opts.duplicates.unwrap();
        assert!(matches!(dup.policy, DuplicatePolicy::KeepLast));
        assert_eq!(dup.buffer_size, 10);
        assert!(dup.allow_overflow);

        let out = cfg.output.to_options();
        assert!(out.keep_same_rows);
        assert_eq!(out.max_changes, Some(5));
    }

    #[test]
    fn defaults_apply_for_minimal_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
old = "a.tsv"
new = "b.csv"
[diff]
keys = ["id"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.old.delimiter(), b'\t');
        assert_eq!(cfg.diff.duplicates, DuplicatesConfig::default());
        assert!(cfg.diff.to_options().duplicates.is_none());
        assert_eq!(cfg.output.destination, DestinationConfig::default());
        assert!(!cfg.output.keep_same_rows);
        assert_eq!(cfg.output.max_changes, None);
    }

    #[test]
    fn explicit_delimiter_wins() {
        let src = SourceConfig::Options(SourceOptions {
            path: "x.csv".into(),
            format: None,
            delimiter: Some(';'),
        });
        assert_eq!(src.delimiter(), b';');
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"old = \"a.csv\"\nnew = \"b.csv\"\n[diff]\nkeys = [\"id\"]\n").unwrap();
        let cfg = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.new.path(), "b.csv");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AppConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
