use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid evidence row {index}: {reason}")]
    InvalidEvidence { index: usize, reason: String },

    #[error("claim cites evidence index {index} but only {count} rows were supplied")]
    ClaimIndex { index: usize, count: usize },

    #[error("run {0} already has a terminal status")]
    RunFinished(Uuid),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn run_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "run",
            id: id.to_string(),
        }
    }
}

impl From<policyscout_core::UnknownVariant> for StoreError {
    fn from(e: policyscout_core::UnknownVariant) -> Self {
        Self::Corrupt(e.to_string())
    }
}
