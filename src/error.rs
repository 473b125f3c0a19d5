//! Unified error handling for the ontorag crate
//!
//! Every failure that can reach `main` carries a six-digit [`StatusCode`].
//! Codes are partitioned by subsystem:
//!
//! - `000001`-`000100` configuration warnings
//! - `000101`-`000200` configuration faults and ingestion failures
//! - `000201`-`000250` knowledge graph failures
//! - `000501`-`000600` SQL failures
//!
//! `000000` is success.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ontorag::error::{Error, StatusCode};
//!
//! fn report(err: &Error) {
//!     tracing::error!("{} - {}", err.code(), err);
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::graph::GraphError;
pub use crate::llm::LlmError;
pub use crate::ontology::error::OntologyError;
pub use crate::prompts::PromptError;

/// Six-digit status code reported alongside every fatal message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);

    // Ingestion [101, 200]
    pub const ONTOLOGY_UNREADABLE: Self = Self(101);
    pub const PDF_FOLDER_MISSING: Self = Self(102);
    pub const SPLITTER_INIT: Self = Self(104);
    pub const GRAPH_SPLITTER_INIT: Self = Self(106);
    pub const PDF_UNREADABLE: Self = Self(107);
    pub const ONTOLOGY_PATH_MISSING: Self = Self(151);
    pub const ONTOLOGY_FILE_MISSING: Self = Self(152);
    pub const ONTOLOGY_PARSE: Self = Self(153);

    // Knowledge graph [201, 250]
    pub const GRAPH_CONNECT: Self = Self(201);
    pub const GRAPH_QUERY: Self = Self(202);
    pub const GRAPH_SCHEMA: Self = Self(203);
    pub const GRAPH_INVALID_LABEL: Self = Self(204);

    // SQL [501, 600]
    pub const VECTOR_DROP: Self = Self(501);
    pub const VECTOR_EXTENSION: Self = Self(502);
    pub const VECTOR_CREATE: Self = Self(503);
    pub const VECTOR_INSERT: Self = Self(504);
    pub const TABLES_SCRIPT: Self = Self(505);
    pub const PROMPTS_INSERT: Self = Self(506);
    pub const EXAMPLES_INSERT: Self = Self(507);
    pub const PROMPTS_READ: Self = Self(508);
    pub const DATABASE_CONNECT: Self = Self(509);

    /// Catch-all for failures with no assigned code
    pub const UNKNOWN: Self = Self(999_999);

    /// Whether this code denotes success
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid or missing configuration
    Config,
    /// Ontology loading and schema questions
    Ontology,
    /// Graph store connectivity or query failures
    Graph,
    /// Relational database (prompt tables, vector index)
    Database,
    /// LLM endpoint failures
    Llm,
    /// Local files: PDFs, workbooks, scripts
    Io,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the ontorag crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Ontology loading and querying errors
    #[error("Ontology error: {0}")]
    Ontology(#[from] OntologyError),

    /// Graph store errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Prompt store errors
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// LLM endpoint errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// SQL failure with the code that identifies the failing step
    #[error("Database error: {message}")]
    Database {
        code: StatusCode,
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// PDF text extraction errors
    #[error("PDF error for {path}: {reason}")]
    Pdf { path: String, reason: String },

    /// Spreadsheet import errors
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with an explicit code
    #[error("{context}")]
    Other { code: StatusCode, context: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error for a given step
    pub fn database(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Database {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error wrapping the driver error
    pub fn database_with_source(
        code: StatusCode,
        message: impl Into<String>,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::Database {
            code,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a generic error with a code
    pub fn other(code: StatusCode, context: impl Into<String>) -> Self {
        Self::Other {
            code,
            context: context.into(),
        }
    }

    /// Status code reported for this error
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode(100),
            Self::Ontology(e) => e.code(),
            Self::Graph(e) => e.code(),
            Self::Prompt(_) => StatusCode::PROMPTS_READ,
            Self::Llm(_) => StatusCode::UNKNOWN,
            Self::Database { code, .. } => *code,
            Self::Pdf { .. } => StatusCode::PDF_UNREADABLE,
            Self::Workbook(_) => StatusCode::PROMPTS_INSERT,
            Self::Io(_) | Self::Json(_) => StatusCode::UNKNOWN,
            Self::Other { code, .. } => *code,
        }
    }

    /// Error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Ontology(_) => ErrorCategory::Ontology,
            Self::Graph(_) => ErrorCategory::Graph,
            Self::Prompt(_) | Self::Database { .. } => ErrorCategory::Database,
            Self::Llm(_) => ErrorCategory::Llm,
            Self::Pdf { .. } | Self::Workbook(_) | Self::Io(_) => ErrorCategory::Io,
            Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// `<code> - <message>` line used for fatal reports
    pub fn report_line(&self) -> String {
        format!("{} - {}", self.code(), self)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
