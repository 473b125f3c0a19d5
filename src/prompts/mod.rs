//! Prompt Store
//!
//! Prompts are stored as ordered template rows keyed by a logical prompt id
//! and a language. [`PromptStore::render`] concatenates the rows for one id,
//! substituting the variables each row declares. A row that declares the
//! `examples` variable pulls in the example table for the same prompt id,
//! rendered as `[<example 1>, <example 2>, ...]`.
//!
//! There is no language fallback: when an id has no rows in the configured
//! language the store logs which languages do exist and renders nothing.
//!
//! # Submodules
//!
//! - [`template`] - placeholder substitution and row concatenation
//! - [`memory`] - rows held in memory (tests, offline runs)
//! - [`postgres`] - the `Prompts` / `Examples` tables
//! - [`workbook`] - import of the tables from spreadsheets

pub mod memory;
pub mod postgres;
pub mod template;
pub mod workbook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryPromptSource;
pub use postgres::PgPromptSource;
pub use template::{PromptVariables, EXAMPLES_VARIABLE};

/// Well-known logical prompt ids
pub mod ids {
    pub const EXTRACTION_SYSTEM: i32 = 1;
    pub const EXTRACTION_USER: i32 = 2;
    pub const COREFERENCE: i32 = 3;
    pub const IMPLIED_RELATIONS: i32 = 4;
    pub const VECTOR_ANSWER: i32 = 6;
    pub const GRAPH_QUERY: i32 = 7;
    pub const GRAPH_ANSWER: i32 = 8;
    pub const COMBINED_ANSWER: i32 = 9;
}

/// Errors raised by a prompt source
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Database connection unavailable: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Workbook {path}: {reason}")]
    Workbook { path: PathBuf, reason: String },

    #[error("Workbook {path} has no column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
}

pub type PromptResult<T> = Result<T, PromptError>;

/// One row of the `Prompts` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRow {
    pub prompt_id: i32,
    pub general_prompt_id: i32,
    pub sequence_id: i32,
    pub lang: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub prompt: String,
    pub variables: String,
}

/// One row of the `Examples` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleRow {
    pub example_id: i32,
    pub general_example_id: i32,
    pub sequence_id: i32,
    pub lang: String,
    pub prompt_id: i32,
    pub example: String,
    pub variables: String,
}

/// Where template rows come from
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Rows of `general_prompt_id` in `lang`, ordered by sequence id
    async fn prompt_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<PromptRow>>;

    /// Example rows attached to any prompt row of `general_prompt_id`, in
    /// `lang`, ordered by sequence id
    async fn example_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<ExampleRow>>;

    /// Languages that have rows for `general_prompt_id`
    async fn languages(&self, general_prompt_id: i32) -> PromptResult<Vec<String>>;
}

/// Renders prompts in one language
#[derive(Clone)]
pub struct PromptStore {
    source: Arc<dyn PromptSource>,
    language: String,
}

impl PromptStore {
    /// Create a new prompt store
    pub fn new(source: Arc<dyn PromptSource>, language: impl Into<String>) -> Self {
        Self {
            source,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Render `general_prompt_id` with `variables`; empty on any failure
    pub async fn render(&self, general_prompt_id: i32, variables: &PromptVariables) -> String {
        let rows = match self.source.prompt_rows(general_prompt_id, &self.language).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed at retrieving data from database when searching for related prompts");
                return String::new();
            }
        };
        if rows.is_empty() {
            self.report_missing_language(general_prompt_id).await;
            return String::new();
        }

        let wants_examples = rows
            .iter()
            .any(|r| template::declared_variables(&r.variables).contains(&EXAMPLES_VARIABLE));

        let mut variables = variables.clone();
        if wants_examples && !variables.contains_key(EXAMPLES_VARIABLE) {
            let examples = self.render_examples(general_prompt_id, &variables).await;
            variables.insert(EXAMPLES_VARIABLE.to_string(), examples);
        }

        template::render_rows(
            rows.iter().map(|r| (r.prompt.as_str(), r.variables.as_str())),
            &variables,
        )
    }

    /// Example groups of `general_prompt_id` as `[group, group, ...]`
    async fn render_examples(&self, general_prompt_id: i32, variables: &PromptVariables) -> String {
        let rows = match self.source.example_rows(general_prompt_id, &self.language).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed at retrieving data from database when searching for related examples");
                return String::new();
            }
        };

        let mut group_ids: Vec<i32> = Vec::new();
        for row in &rows {
            if !group_ids.contains(&row.general_example_id) {
                group_ids.push(row.general_example_id);
            }
        }

        let groups: Vec<String> = group_ids
            .into_iter()
            .map(|group| {
                template::render_rows(
                    rows.iter()
                        .filter(|r| r.general_example_id == group)
                        .map(|r| (r.example.as_str(), r.variables.as_str())),
                    variables,
                )
            })
            .filter(|text| !text.is_empty())
            .collect();

        if groups.is_empty() {
            String::new()
        } else {
            format!("[{}]", groups.join(", "))
        }
    }

    async fn report_missing_language(&self, general_prompt_id: i32) {
        match self.source.languages(general_prompt_id).await {
            Err(e) => tracing::error!(
                error = %e,
                "Failed at retrieving data from database when searching for valid languages"
            ),
            Ok(langs) if langs.is_empty() => tracing::error!(
                "general_prompt_id {general_prompt_id} does not have registered prompts on any language"
            ),
            Ok(langs) => tracing::error!(
                "There aren't prompts of required operation in language {}. However, the following can be used {:?}",
                self.language,
                langs
            ),
        }
    }
}

impl std::fmt::Debug for PromptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptStore")
            .field("language", &self.language)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn prompt(general: i32, seq: i32, lang: &str, text: &str, vars: &str) -> PromptRow {
        PromptRow {
            prompt_id: general * 100 + seq,
            general_prompt_id: general,
            sequence_id: seq,
            lang: lang.to_string(),
            kind: "system".to_string(),
            description: String::new(),
            prompt: text.to_string(),
            variables: vars.to_string(),
        }
    }

    fn example(group: i32, seq: i32, prompt_id: i32, text: &str) -> ExampleRow {
        ExampleRow {
            example_id: group * 10 + seq,
            general_example_id: group,
            sequence_id: seq,
            lang: "en".to_string(),
            prompt_id,
            example: text.to_string(),
            variables: String::new(),
        }
    }

    fn store(prompts: Vec<PromptRow>, examples: Vec<ExampleRow>) -> PromptStore {
        PromptStore::new(Arc::new(MemoryPromptSource::new(prompts, examples)), "en")
    }

    #[tokio::test]
    async fn test_render_in_sequence_order() {
        let s = store(
            vec![
                prompt(1, 2, "en", "Labels: {node_labels}", "node_labels"),
                prompt(1, 1, "en", "You build knowledge graphs.", ""),
                prompt(1, 1, "fr", "Vous construisez des graphes.", ""),
            ],
            vec![],
        );
        let vars: PromptVariables = [("node_labels".to_string(), "['Person']".to_string())].into();

        let out = s.render(1, &vars).await;
        assert_eq!(out, "You build knowledge graphs.\nLabels: ['Person']\n");
    }

    #[tokio::test]
    async fn test_render_with_examples() {
        let s = store(
            vec![
                prompt(3, 1, "en", "Group the nodes.", ""),
                prompt(3, 2, "en", "Examples: {examples}", "examples"),
            ],
            vec![
                example(1, 1, 302, "{\"Person\": [[\"0A\", \"1A\"]]}"),
                example(2, 1, 302, "{\"Place\": [[\"2B\"]]}"),
                example(1, 2, 302, "second line"),
            ],
        );

        let out = s.render(3, &PromptVariables::new()).await;
        assert_eq!(
            out,
            "Group the nodes.\nExamples: [{\"Person\": [[\"0A\", \"1A\"]]}\nsecond line\n, {\"Place\": [[\"2B\"]]}\n]\n"
        );
    }

    #[tokio::test]
    async fn test_caller_examples_take_precedence() {
        let s = store(
            vec![prompt(3, 1, "en", "Examples: {examples}", "examples")],
            vec![example(1, 1, 301, "from table")],
        );
        let vars: PromptVariables = [("examples".to_string(), "[given]".to_string())].into();

        assert_eq!(s.render(3, &vars).await, "Examples: [given]\n");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_language_lists_alternatives() {
        let s = PromptStore::new(
            Arc::new(MemoryPromptSource::new(vec![prompt(6, 1, "fr", "Répondez.", "")], vec![])),
            "en",
        );

        assert_eq!(s.render(6, &PromptVariables::new()).await, "");
        assert!(logs_contain("However, the following can be used"));
        assert!(logs_contain("fr"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_prompt_id() {
        let s = store(vec![], vec![]);
        assert_eq!(s.render(42, &PromptVariables::new()).await, "");
        assert!(logs_contain("does not have registered prompts on any language"));
    }
}
