/// Errors that can occur on the inbound transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Standard input could not be opened for unbuffered reads.
    #[error("failed to open standard input: {0}")]
    Stdin(std::io::Error),

    /// Waiting for readability failed.
    #[error("readiness wait failed: {0}")]
    Poll(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
