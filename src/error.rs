use thiserror::Error;

/// Conditions callers may need to tell apart; everything else travels as
/// `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Roster table is unavailable; a refresh cannot proceed without it")]
    MissingRoster,
    #[error("Column '{column}' not found in {table} table")]
    MissingColumn { table: String, column: String },
}
