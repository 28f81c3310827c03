//! Error types for cluster executors.

use std::path::PathBuf;
use std::time::Duration;

use streamlink_secrets::CodecError;
use thiserror::Error;

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("kubeconfig could not be decrypted: {0}")]
    Decryption(#[from] CodecError),

    #[error("invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// The API server answered with an error status.
    #[error("kubernetes api error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("kubernetes client error: {0}")]
    Client(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ExecutorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: 404, .. })
    }
}

impl From<kube::Error> for ExecutorError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Self::Api {
                code: resp.code,
                message: resp.message,
            },
            other => Self::Client(other.to_string()),
        }
    }
}
