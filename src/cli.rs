use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reshape student-record exports and filter them by assessment, grade and demographic",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the wide student table from roster, events and grade exports
    Build(BuildArgs),
    /// Keep only the latest event per student, test, subject and school year
    Dedupe(DedupeArgs),
    /// Classify the columns of a wide table into assessments, grades and student info
    Taxonomy(TaxonomyArgs),
    /// List filter and column leaf ids derived from the taxonomy
    Leaves(LeavesArgs),
    /// List candidate values for each filter leaf
    Choices(ChoicesArgs),
    /// Filter and project a wide table
    Filter(FilterArgs),
    /// Manage the naming-convention configuration file
    Config(ConfigArgs),
}

/// Where the four source exports live.
#[derive(Debug, Args, Clone, Default)]
pub struct SourceArgs {
    /// YAML file overriding column names, subject codes and limits
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Student roster export (required unless --input is given)
    #[arg(long)]
    pub roster: Option<PathBuf>,
    /// Long-format assessment events export
    #[arg(long)]
    pub events: Option<PathBuf>,
    /// Elementary grade export
    #[arg(long = "grades-primary")]
    pub grades_primary: Option<PathBuf>,
    /// Secondary grade export
    #[arg(long = "grades-secondary")]
    pub grades_secondary: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

/// A wide table, either read directly or built from the sources.
#[derive(Debug, Args, Clone, Default)]
pub struct TableArgs {
    /// Previously built wide table; skips the build step
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    #[command(flatten)]
    pub sources: SourceArgs,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter for the output file (defaults to the output extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Print an aligned preview table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// Limit the number of rows printed with --table
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub sources: SourceArgs,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// Events export to deduplicate
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML file overriding column names and date formats
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaxonomyFormat {
    Json,
    Tree,
}

#[derive(Debug, Args)]
pub struct TaxonomyArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// Output layout
    #[arg(long, value_enum, default_value_t = TaxonomyFormat::Json)]
    pub format: TaxonomyFormat,
}

#[derive(Debug, Args)]
pub struct LeavesArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// Only list filter leaves, not column toggles
    #[arg(long = "filters-only")]
    pub filters_only: bool,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ChoicesArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// Restrict output to these leaf ids
    #[arg(long = "leaf", action = clap::ArgAction::Append)]
    pub leaves: Vec<String>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// YAML or JSON file mapping leaf ids to chosen values
    #[arg(long = "spec")]
    pub spec: Option<PathBuf>,
    /// Inline filter of the form `leaf_id=value1,value2`
    #[arg(long = "where", action = clap::ArgAction::Append)]
    pub conditions: Vec<String>,
    /// Columns or `col_` leaf ids to output, in order (comma-separated, repeatable)
    #[arg(short = 'C', long = "columns", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub columns: Vec<String>,
    /// Output every column instead of the configured defaults
    #[arg(long = "all-columns", conflicts_with = "columns")]
    pub all_columns: bool,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write the default configuration to a YAML file
    Init(ConfigInitArgs),
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Destination file
    #[arg(short = 'o', long = "output", default_value = "mtss.yml")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits `leaf_id=v1,v2` into the id and its values.
pub fn parse_condition(value: &str) -> Result<(String, Vec<String>), String> {
    let (id, values) = value
        .split_once('=')
        .ok_or_else(|| format!("Filter '{value}' must look like leaf_id=value1,value2"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("Filter '{value}' has no leaf id"));
    }
    Ok((
        id.to_string(),
        values.split(',').map(|v| v.trim().to_string()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter_accepts_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn parse_condition_splits_values() {
        assert_eq!(
            parse_condition("filter_Grade=3, 4").unwrap(),
            ("filter_Grade".to_string(), vec!["3".to_string(), "4".to_string()])
        );
        assert!(parse_condition("filter_Grade").is_err());
        assert!(parse_condition("=3").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
