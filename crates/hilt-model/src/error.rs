use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dependency cycle: {0}")]
    Cycle(String),
    #[error("module {module} reaches {shared} through more than one path")]
    SharedDependency { module: String, shared: String },
}
