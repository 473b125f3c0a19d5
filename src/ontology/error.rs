//! Custom error types for ontology operations
//!
//! A missing ontology file is recoverable: the pipeline falls back to
//! permissive mode. Every other variant means the file exists but cannot be
//! used.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::error::StatusCode;

/// Result type alias for ontology operations
pub type OntologyResult<T> = Result<T, OntologyError>;

/// Custom error type for ontology operations
#[derive(Debug)]
pub enum OntologyError {
    // =========================================================================
    // Loading Errors
    // =========================================================================
    /// No path was configured for the ontology
    PathNotConfigured,

    /// Ontology file does not exist
    FileNotFound { path: PathBuf },

    /// RDF/XML could not be parsed
    ParseFailed {
        path: Option<PathBuf>,
        reason: String,
    },

    /// The in-memory RDF store could not be created
    StoreInit { reason: String },

    // =========================================================================
    // Query Errors
    // =========================================================================
    /// SPARQL evaluation failed
    QueryFailed { query: String, reason: String },

    /// SPARQL returned a result form we did not ask for
    UnexpectedResult { query: String, expected: String },

    /// A string that should be an IRI is not one
    InvalidIri { value: String, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// File I/O error
    IoError {
        operation: String,
        path: Option<PathBuf>,
        source: io::Error,
    },
}

impl fmt::Display for OntologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Loading
            OntologyError::PathNotConfigured => {
                write!(f, "Configuration file is missing the path for the ontology definition")
            }
            OntologyError::FileNotFound { path } => {
                write!(f, "Could not retrieve file {}", path.display())
            }
            OntologyError::ParseFailed { path, reason } => {
                if let Some(p) = path {
                    write!(f, "Failed to parse ontology {}: {reason}", p.display())
                } else {
                    write!(f, "Failed to parse ontology: {reason}")
                }
            }
            OntologyError::StoreInit { reason } => {
                write!(f, "Failed to create RDF store: {reason}")
            }

            // Query
            OntologyError::QueryFailed { query, reason } => {
                write!(f, "SPARQL query '{query}' failed: {reason}")
            }
            OntologyError::UnexpectedResult { query, expected } => {
                write!(f, "SPARQL query '{query}' did not return {expected}")
            }
            OntologyError::InvalidIri { value, reason } => {
                write!(f, "Invalid IRI '{value}': {reason}")
            }

            // I/O
            OntologyError::IoError {
                operation,
                path,
                source,
            } => {
                if let Some(p) = path {
                    write!(f, "I/O error during {operation} on {p:?}: {source}")
                } else {
                    write!(f, "I/O error during {operation}: {source}")
                }
            }
        }
    }
}

impl std::error::Error for OntologyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OntologyError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ============================================================================
// Conversion implementations
// ============================================================================

impl From<io::Error> for OntologyError {
    fn from(err: io::Error) -> Self {
        OntologyError::IoError {
            operation: "unknown".to_string(),
            path: None,
            source: err,
        }
    }
}

// ============================================================================
// Helper constructors
// ============================================================================

impl OntologyError {
    /// Create a parse error
    pub fn parse_failed(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        OntologyError::ParseFailed {
            path,
            reason: reason.into(),
        }
    }

    /// Create a query error
    pub fn query_failed(query: impl Into<String>, reason: impl Into<String>) -> Self {
        OntologyError::QueryFailed {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected-result error
    pub fn unexpected_result(query: impl Into<String>, expected: impl Into<String>) -> Self {
        OntologyError::UnexpectedResult {
            query: query.into(),
            expected: expected.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io_error(
        operation: impl Into<String>,
        path: Option<PathBuf>,
        source: io::Error,
    ) -> Self {
        OntologyError::IoError {
            operation: operation.into(),
            path,
            source,
        }
    }

    /// Check if the pipeline can continue in permissive mode
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OntologyError::PathNotConfigured | OntologyError::FileNotFound { .. }
        )
    }

    /// Status code reported for this error
    pub fn code(&self) -> StatusCode {
        match self {
            OntologyError::PathNotConfigured => StatusCode::ONTOLOGY_PATH_MISSING,
            OntologyError::FileNotFound { .. } => StatusCode::ONTOLOGY_FILE_MISSING,
            OntologyError::ParseFailed { .. } => StatusCode::ONTOLOGY_PARSE,
            OntologyError::StoreInit { .. }
            | OntologyError::QueryFailed { .. }
            | OntologyError::UnexpectedResult { .. }
            | OntologyError::InvalidIri { .. }
            | OntologyError::IoError { .. } => StatusCode::ONTOLOGY_UNREADABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_display() {
        let err = OntologyError::FileNotFound {
            path: PathBuf::from("/tmp/missing.rdf"),
        };
        assert!(err.to_string().contains("/tmp/missing.rdf"));
        assert_eq!(err.code(), StatusCode::ONTOLOGY_FILE_MISSING);
    }

    #[test]
    fn test_parse_error() {
        let err = OntologyError::parse_failed(None, "unexpected end of document");
        assert!(err.to_string().contains("unexpected end of document"));
        assert_eq!(err.code().to_string(), "000153");
    }

    #[test]
    fn test_query_error() {
        let err = OntologyError::query_failed("ASK { }", "boom");
        assert!(err.to_string().contains("ASK { }"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let ont_err: OntologyError = io_err.into();
        assert!(matches!(ont_err, OntologyError::IoError { .. }));
        assert_eq!(ont_err.code(), StatusCode::ONTOLOGY_UNREADABLE);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(OntologyError::PathNotConfigured.is_recoverable());
        assert!(OntologyError::FileNotFound {
            path: PathBuf::from("x.rdf")
        }
        .is_recoverable());
        assert!(!OntologyError::parse_failed(None, "bad").is_recoverable());
    }
}
