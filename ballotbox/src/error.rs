//! Error types for the simulations
//!
//! Every failure in this crate is terminal for the stage that hits it. Nothing
//! is retried; the category of an error only decides how it is reported.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Category of error, used for the prefix printed on the diagnostic stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid parameters, rejected before any stage starts
    Configuration,
    /// Memory could not be allocated
    Resource,
    /// Channels, notifications, gate or stage tasks
    Ipc,
    /// Report or configuration file I/O
    File,
}

impl ErrorCategory {
    /// User-facing prefix for fatal errors in this category
    pub fn prefix(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "Configuration error:",
            ErrorCategory::Resource => "Out of memory:",
            ErrorCategory::Ipc => "IPC error:",
            ErrorCategory::File => "File error:",
        }
    }
}

/// Errors raised by the election pipeline and the contest
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Parameters are out of range
    #[error("{message}")]
    Configuration { message: String },

    /// Configuration sources could not be merged or extracted
    #[error("Failed to load configuration: {source}")]
    ConfigLoad {
        #[source]
        source: Box<figment::Error>,
    },

    /// A gate, channel or stage could not be created
    #[error("Failed to set up {resource}: {message}")]
    ResourceSetup {
        resource: &'static str,
        message: String,
    },

    /// A record buffer could not be allocated
    #[error("Failed to allocate {what} for {requested} records")]
    ResourceExhaustion {
        what: &'static str,
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// The peer closed the channel or the pipe broke mid-message
    #[error("Channel '{channel}' closed unexpectedly: {source}")]
    ChannelClosed {
        channel: String,
        #[source]
        source: io::Error,
    },

    /// Bytes arrived that do not form a valid record
    #[error("Malformed message on channel '{channel}': {reason}")]
    MalformedMessage { channel: String, reason: String },

    /// A directed notification named a stage nobody registered
    #[error("No stage registered with id {stage}")]
    UnknownStage { stage: u32 },

    /// A stage task panicked or was cancelled
    #[error("Stage '{stage}' did not finish: {message}")]
    StageFailed { stage: String, message: String },

    /// The tally report could not be written or read
    #[error("Tally report {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
        }
    }

    /// Create a malformed message error for a channel
    pub fn malformed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedMessage {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Get the error category for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Configuration { .. } | PipelineError::ConfigLoad { .. } => {
                ErrorCategory::Configuration
            }
            PipelineError::ResourceExhaustion { .. } => ErrorCategory::Resource,
            PipelineError::ResourceSetup { .. }
            | PipelineError::ChannelClosed { .. }
            | PipelineError::MalformedMessage { .. }
            | PipelineError::UnknownStage { .. }
            | PipelineError::StageFailed { .. } => ErrorCategory::Ipc,
            PipelineError::Report { .. } => ErrorCategory::File,
        }
    }
}

impl From<figment::Error> for PipelineError {
    fn from(error: figment::Error) -> Self {
        PipelineError::ConfigLoad {
            source: Box::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = PipelineError::configuration("Voter count must be positive, got 0");
        assert_eq!(format!("{}", err), "Voter count must be positive, got 0");

        let err = PipelineError::UnknownStage { stage: 7 };
        assert_eq!(format!("{}", err), "No stage registered with id 7");
    }

    #[test]
    fn test_error_source() {
        let err = PipelineError::malformed("tally->coordinator", "party 0");
        assert!(err.source().is_none());

        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        let err = PipelineError::ChannelClosed {
            channel: "validator->tally".to_string(),
            source: io_err,
        };
        assert!(err.source().is_some());
        assert!(format!("{}", err).contains("validator->tally"));
    }

    #[test]
    fn test_categories_and_prefixes() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let report = PipelineError::Report {
            path: PathBuf::from("/tmp/report.txt"),
            source: io_err,
        };
        assert_eq!(report.category(), ErrorCategory::File);
        assert_eq!(report.category().prefix(), "File error:");

        let ipc = PipelineError::StageFailed {
            stage: "tally".to_string(),
            message: "panicked".to_string(),
        };
        assert_eq!(ipc.category().prefix(), "IPC error:");

        let config = PipelineError::configuration("bad");
        assert_eq!(config.category(), ErrorCategory::Configuration);

        let source = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        let oom = PipelineError::ResourceExhaustion {
            what: "voter batch",
            requested: usize::MAX,
            source,
        };
        assert_eq!(oom.category(), ErrorCategory::Resource);
    }
}
