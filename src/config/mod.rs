//! Configuration management for ontorag
//!
//! Configuration lives in a single `config.yaml`, by default next to the
//! executable. Loading happens in three steps:
//!
//! 1. the raw YAML mapping is checked field by field ([`validation`]), each
//!    problem becoming a numbered issue
//! 2. the mapping is normalised (language code) and deserialised into [`Config`]
//! 3. chunk sizes for the vector and graph splitters are derived from the LLM
//!    token budget ([`ChunkSizes`])
//!
//! Graph store credentials can be overridden with `MEMGRAPH_URI`,
//! `MEMGRAPH_USERNAME` and `MEMGRAPH_PASSWORD`.

pub mod validation;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use validation::{log_file_stem, normalize_language, ConfigIssue};

/// Default file name looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // LLM token budget
    pub chunk_overlap_ratio: f64,
    pub llm_max_tokens: i64,
    pub llm_tokens_per_100_characters: i64,
    pub llm_len_prompt_engineering: i64,
    pub k_most_similar: i64,

    // Graph store
    pub memgraph_socket: String,
    #[serde(deserialize_with = "scalar_string")]
    pub memgraph_user: String,
    #[serde(deserialize_with = "scalar_string")]
    pub memgraph_password: String,

    // Documents
    pub pdf_folder_path: PathBuf,
    #[serde(default)]
    pub rdf_filepath: Option<PathBuf>,

    // LLM endpoints
    pub llm_embedding_model: String,
    pub llm_embedding_url: String,
    pub llm_embedding_vector_len: i64,
    pub llm_embedding_context_len: i64,
    pub llm_chat_model: String,
    pub llm_chat_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // Prompt database
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    #[serde(deserialize_with = "scalar_string")]
    pub db_port: String,
    pub prompts_xlsx: PathBuf,
    pub examples_xlsx: PathBuf,
    #[serde(rename = "createTables_sql")]
    pub create_tables_sql: PathBuf,
    pub language: String,

    // Knowledge graph
    #[serde(default)]
    pub kg_implied_relations: bool,

    // Logging
    #[serde(default = "default_logging_level")]
    pub logging_level: String,
    #[serde(default)]
    pub log_file: Option<String>,

    /// Derived from the token budget after validation
    #[serde(skip)]
    pub chunks: ChunkSizes,

    /// Non-fatal issues found while loading
    #[serde(skip)]
    pub warnings: Vec<ConfigIssue>,
}

/// Splitter sizes, in characters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSizes {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_size_graph: usize,
    pub chunk_overlap_graph: usize,
}

fn default_http_timeout_secs() -> u64 {
    120
}

fn default_logging_level() -> String {
    "INFO".to_string()
}

/// Accept a YAML string or number and keep it as text
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, found {other:?}"
        ))),
    }
}

impl Config {
    /// Path of `config.yaml` next to the running executable
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join(CONFIG_FILE_NAME)
    }

    /// Load, validate and derive.
    ///
    /// On failure every issue found is returned, sorted by code; the caller
    /// decides how to report them since logging is configured from this file.
    pub fn load(path: &Path) -> Result<Self, Vec<ConfigIssue>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            vec![ConfigIssue::new(
                101,
                format!("Configuration file {} could not be read: {e}", path.display()),
            )]
        })?;
        Self::from_yaml(&content)
    }

    /// Same as [`Config::load`] from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, Vec<ConfigIssue>> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| {
            vec![ConfigIssue::new(
                101,
                format!("Configuration file wasn't initialized properly: {e}"),
            )]
        })?;
        let Value::Mapping(mut map) = value else {
            return Err(vec![ConfigIssue::new(
                102,
                "Configuration was not a mapping of options",
            )]);
        };

        let issues = validation::validate(&map);
        if issues.iter().any(ConfigIssue::is_fatal) {
            return Err(issues);
        }

        normalize(&mut map);
        let mut config: Config = serde_yaml::from_value(Value::Mapping(map)).map_err(|e| {
            vec![ConfigIssue::new(
                102,
                format!("Configuration could not be read into settings: {e}"),
            )]
        })?;
        config.chunks = ChunkSizes::derive(&config);
        config.warnings = issues;
        Ok(config)
    }

    /// Bolt URI of the graph store
    pub fn memgraph_uri(&self) -> String {
        std::env::var("MEMGRAPH_URI").unwrap_or_else(|_| format!("bolt://{}", self.memgraph_socket))
    }

    pub fn memgraph_username(&self) -> String {
        std::env::var("MEMGRAPH_USERNAME").unwrap_or_else(|_| self.memgraph_user.clone())
    }

    pub fn memgraph_password(&self) -> String {
        std::env::var("MEMGRAPH_PASSWORD").unwrap_or_else(|_| self.memgraph_password.clone())
    }

    /// Log file name: `log_file` stripped of non-alphanumerics, plus `.log`
    pub fn log_file_name(&self) -> String {
        format!("{}.log", log_file_stem(self.log_file.as_deref()))
    }

    /// Tracing level for `logging_level`; CRITICAL maps to ERROR
    pub fn log_level(&self) -> tracing::Level {
        match self.logging_level.as_str() {
            "DEBUG" => tracing::Level::DEBUG,
            "WARNING" => tracing::Level::WARN,
            "ERROR" | "CRITICAL" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// HTTP timeout for the LLM endpoints
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Port as a number, for the Postgres pool
    pub fn db_port_number(&self) -> Option<u16> {
        self.db_port.trim().parse().ok()
    }
}

fn normalize(map: &mut Mapping) {
    if let Some(language) = map.get("language").and_then(Value::as_str).and_then(normalize_language) {
        map.insert(Value::from("language"), Value::from(language));
    }
    let level_ok = map
        .get("logging_level")
        .and_then(Value::as_str)
        .is_some_and(|l| validation::LOGGING_LEVELS.contains(&l));
    if !level_ok {
        map.insert(Value::from("logging_level"), Value::from(default_logging_level()));
    }
}

impl ChunkSizes {
    /// Splitter sizes derived from the token budget.
    ///
    /// Vector chunks must leave room for `k_most_similar` of them in one
    /// prompt; graph chunks get the whole budget left after the prompt. Sizes
    /// round down to a multiple of 50 and overlaps to a multiple of 10.
    pub fn derive(config: &Config) -> Self {
        let budget = config.llm_max_tokens - config.llm_len_prompt_engineering;

        let mut chunk_size = budget / config.k_most_similar.max(1);
        chunk_size = chunk_size * 100 / config.llm_tokens_per_100_characters.max(1);
        if chunk_size > config.llm_embedding_context_len {
            chunk_size = config.llm_embedding_context_len;
        }
        chunk_size -= chunk_size.rem_euclid(50);
        let mut chunk_overlap = (config.chunk_overlap_ratio * chunk_size as f64) as i64;
        chunk_overlap -= chunk_overlap.rem_euclid(10);

        let mut chunk_size_graph = budget;
        chunk_size_graph -= chunk_size_graph.rem_euclid(50);
        let mut chunk_overlap_graph = (config.chunk_overlap_ratio * chunk_size_graph as f64) as i64;
        chunk_overlap_graph -= chunk_overlap_graph.rem_euclid(10);

        let clamp = |n: i64| usize::try_from(n).unwrap_or(0);
        Self {
            chunk_size: clamp(chunk_size),
            chunk_overlap: clamp(chunk_overlap),
            chunk_size_graph: clamp(chunk_size_graph),
            chunk_overlap_graph: clamp(chunk_overlap_graph),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A complete, valid configuration with every referenced file created in `dir`
    pub(crate) fn sample_yaml(dir: &Path) -> String {
        let prompts = dir.join("prompts.xlsx");
        let examples = dir.join("examples.xlsx");
        let sql = dir.join("create_tables.sql");
        for file in [&prompts, &examples, &sql] {
            std::fs::write(file, b"").unwrap();
        }
        format!(
            r#"
chunk_overlap_ratio: 0.2
llm_max_tokens: 4096
llm_tokens_per_100_characters: 25
llm_len_prompt_engineering: 1096
k_most_similar: 3
memgraph_socket: "localhost:7687"
memgraph_user: ""
memgraph_password: ""
pdf_folder_path: "{pdfs}"
llm_embedding_model: "nomic-embed-text"
llm_embedding_url: "http://localhost:1234/v1/embeddings"
llm_embedding_vector_len: 768
llm_embedding_context_len: 2048
llm_chat_model: "llama-3"
llm_chat_url: "http://localhost:1234/v1/chat/completions"
db_name: "rag"
db_user: "rag"
db_password: "secret"
db_host: "localhost"
db_port: 5432
prompts_xlsx: "{prompts}"
examples_xlsx: "{examples}"
createTables_sql: "{sql}"
language: "English"
logging_level: "DEBUG"
log_file: "rag-run"
"#,
            pdfs = dir.display(),
            prompts = prompts.display(),
            examples = examples.display(),
            sql = sql.display(),
        )
    }

    #[test]
    fn test_load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&sample_yaml(dir.path())).unwrap();

        assert_eq!(config.language, "en");
        assert_eq!(config.db_port, "5432");
        assert_eq!(config.db_port_number(), Some(5432));
        assert_eq!(config.log_file_name(), "ragrun.log");
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert!(!config.kg_implied_relations);
        assert_eq!(config.http_timeout(), Duration::from_secs(120));
        assert!(config.rdf_filepath.is_none());
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_derived_chunk_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&sample_yaml(dir.path())).unwrap();

        // (4096 - 1096) / 3 = 1000 tokens -> 4000 chars, capped at 2048 -> 2000
        assert_eq!(config.chunks.chunk_size, 2000);
        // 0.2 * 2000 = 400
        assert_eq!(config.chunks.chunk_overlap, 400);
        // 4096 - 1096 = 3000
        assert_eq!(config.chunks.chunk_size_graph, 3000);
        assert_eq!(config.chunks.chunk_overlap_graph, 600);
    }

    #[test]
    fn test_chunk_rounding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_yaml(&sample_yaml(dir.path())).unwrap();
        config.llm_max_tokens = 4123;
        config.llm_embedding_context_len = 100_000;
        config.chunk_overlap_ratio = 0.33;

        let sizes = ChunkSizes::derive(&config);
        // (4123 - 1096) / 3 = 1009 -> 4036 chars -> 4000
        assert_eq!(sizes.chunk_size, 4000);
        assert_eq!(sizes.chunk_overlap, 1320);
        // 3027 -> 3000, 0.33 * 3000 = 990
        assert_eq!(sizes.chunk_size_graph, 3000);
        assert_eq!(sizes.chunk_overlap_graph, 990);
    }

    #[test]
    fn test_warnings_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = sample_yaml(dir.path())
            .replace("logging_level: \"DEBUG\"", "logging_level: \"LOUD\"")
            .replace("log_file: \"rag-run\"\n", "");
        let config = Config::from_yaml(&yaml).unwrap();

        let codes: Vec<u32> = config.warnings.iter().map(|w| w.code).collect();
        assert_eq!(codes, [2, 3]);
        assert_eq!(config.logging_level, "INFO");
        assert_eq!(config.log_file_name(), "newLog.log");
    }

    #[test]
    fn test_fatal_issue_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = sample_yaml(dir.path()).replace("language: \"English\"", "language: \"Deutsch\"");

        let issues = Config::from_yaml(&yaml).unwrap_err();
        assert!(issues.iter().any(|i| i.code == 157));
    }

    #[test]
    fn test_missing_file() {
        let issues = Config::load(Path::new("/no/such/config.yaml")).unwrap_err();
        assert_eq!(issues[0].code, 101);
    }

    #[test]
    fn test_not_a_mapping() {
        let issues = Config::from_yaml("- just\n- a list\n").unwrap_err();
        assert_eq!(issues[0].code, 102);
    }

    #[test]
    fn test_optional_settings() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "{}rdf_filepath: \"/data/onto.rdf\"\nkg_implied_relations: true\nhttp_timeout_secs: 30\n",
            sample_yaml(dir.path())
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.rdf_filepath.as_deref(), Some(Path::new("/data/onto.rdf")));
        assert!(config.kg_implied_relations);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }
}
