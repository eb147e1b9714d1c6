//! Error types for the follower collection pipeline with context and recovery information

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the collection pipeline
///
/// Rate limiting and missing resources are handled inside the request executor
/// and never reach callers as errors.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Connection-level failures persisted past the retry budget
    #[error("Request to '{url}' failed after {attempts} attempts: {last_error}")]
    TransportExhausted {
        url: String,
        attempts: usize,
        last_error: String,
    },

    /// The provider rejected the request; retrying cannot fix it
    #[error("API request to '{url}' returned HTTP {status}: {body}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },

    /// A success response whose payload could not be decoded
    #[error("Unexpected response from '{url}': {reason}")]
    InvalidResponse {
        url: String,
        reason: String,
        body: String,
    },

    /// Reading or writing the follower store failed
    #[error("Store operation failed on '{path}' while {operation}")]
    Persistence {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// The follower store could not be encoded or decoded
    #[error("Store file '{path}' could not be processed as CSV: {reason}")]
    StoreFormat {
        path: PathBuf,
        reason: String,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        suggestion: Option<String>,
    },

    /// A fatal error annotated with the pipeline phase it aborted
    #[error("{phase} failed for {subject}")]
    Phase {
        phase: RunPhase,
        subject: String,
        #[source]
        source: Box<CollectorError>,
    },
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Append,
    Create,
    Truncate,
    Metadata,
    CreateDir,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Append => write!(f, "appending"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Truncate => write!(f, "truncating"),
            FileOperation::Metadata => write!(f, "reading metadata"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

/// Pipeline phases, used to say where a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Counting,
    Listing,
    Enrichment,
    Reporting,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Counting => write!(f, "Follower count lookup"),
            RunPhase::Listing => write!(f, "Follower listing"),
            RunPhase::Enrichment => write!(f, "Follower detail lookup"),
            RunPhase::Reporting => write!(f, "Report generation"),
        }
    }
}

impl CollectorError {
    /// Wrap this error with the phase and subject (handle or id range) it aborted
    pub fn in_phase<S: Into<String>>(self, phase: RunPhase, subject: S) -> Self {
        CollectorError::Phase {
            phase,
            subject: subject.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping phase annotations
    pub fn root(&self) -> &CollectorError {
        match self {
            CollectorError::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the run may continue past this error
    ///
    /// Only exhausted transport retries are scoped to a single chunk; every
    /// other error aborts the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CollectorError::TransportExhausted { .. } => true,
            CollectorError::Api { .. } => false,
            CollectorError::InvalidResponse { .. } => false,
            CollectorError::Persistence { .. } => false,
            CollectorError::StoreFormat { .. } => false,
            CollectorError::Configuration { .. } => false,
            CollectorError::Phase { source, .. } => source.is_recoverable(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CollectorError::TransportExhausted { .. } => "transport_exhausted",
            CollectorError::Api { .. } => "api",
            CollectorError::InvalidResponse { .. } => "invalid_response",
            CollectorError::Persistence { .. } => "persistence",
            CollectorError::StoreFormat { .. } => "store_format",
            CollectorError::Configuration { .. } => "configuration",
            CollectorError::Phase { source, .. } => source.category(),
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CollectorError::TransportExhausted { .. } => ErrorSeverity::Medium,
            CollectorError::Api { .. } => ErrorSeverity::High,
            CollectorError::InvalidResponse { .. } => ErrorSeverity::High,
            CollectorError::Persistence { .. } => ErrorSeverity::Critical,
            CollectorError::StoreFormat { .. } => ErrorSeverity::Critical,
            CollectorError::Configuration { .. } => ErrorSeverity::High,
            CollectorError::Phase { source, .. } => source.severity(),
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            CollectorError::TransportExhausted { .. } => {
                Some("Check your network connection; unresolved followers are retried on the next run")
            }
            CollectorError::Api { status: 401 | 403, .. } => {
                Some("Check that the bearer token is valid and allowed to read follower data")
            }
            CollectorError::Api { .. } => {
                Some("Check the account handle and request parameters")
            }
            CollectorError::Persistence { .. } => {
                Some("Check that the data directory exists, is writable and has free space")
            }
            CollectorError::StoreFormat { .. } => {
                Some("Move the damaged store file aside; the next run rebuilds it")
            }
            CollectorError::Configuration { suggestion, .. } => suggestion.as_deref(),
            CollectorError::Phase { source, .. } => source.suggestion(),
            CollectorError::InvalidResponse { .. } => None,
        }
    }

    /// Create a detailed error report for terminal output
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        let mut cause = self.source();
        while let Some(err) = cause {
            report.push_str(&format!("Caused by: {}\n", err));
            cause = err.source();
        }

        report
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16) -> CollectorError {
        CollectorError::Api {
            url: "https://api.example.com/1.1/followers/ids.json".to_string(),
            status,
            body: "{\"errors\":[]}".to_string(),
        }
    }

    #[test]
    fn test_only_transport_exhaustion_is_recoverable() {
        let exhausted = CollectorError::TransportExhausted {
            url: "https://api.example.com".to_string(),
            attempts: 3,
            last_error: "connection refused".to_string(),
        };
        assert!(exhausted.is_recoverable());
        assert!(!api_error(400).is_recoverable());

        let persistence = CollectorError::Persistence {
            path: PathBuf::from("followers.csv"),
            operation: FileOperation::Append,
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(!persistence.is_recoverable());
        assert_eq!(persistence.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_phase_wrapper_delegates_to_root() {
        let err = api_error(401).in_phase(RunPhase::Listing, "@rustlang");

        assert_eq!(err.category(), "api");
        assert!(!err.is_recoverable());
        assert!(matches!(err.root(), CollectorError::Api { status: 401, .. }));
        assert_eq!(err.to_string(), "Follower listing failed for @rustlang");
        assert!(err.suggestion().unwrap().contains("bearer token"));
    }

    #[test]
    fn test_detailed_report_includes_cause_chain() {
        let err = api_error(400).in_phase(RunPhase::Enrichment, "ids 1..100");
        let report = err.detailed_report();

        assert!(report.contains("Follower detail lookup failed for ids 1..100"));
        assert!(report.contains("Caused by: API request"));
        assert!(report.contains("HTTP 400"));
        assert!(report.contains("Category: api"));
    }
}
