//! `Prompts` / `Examples` tables in PostgreSQL

use async_trait::async_trait;
use std::path::Path;
use tokio_postgres::Row;

use super::{ExampleRow, PromptResult, PromptRow, PromptSource};
use crate::error::{Error, Result, StatusCode};
use crate::storage::Database;

const SELECT_PROMPTS: &str = "
    SELECT prompt_id, general_prompt_id, sequence_id, lang, type, description, prompt, variables
    FROM Prompts
    WHERE general_prompt_id = $1 AND lang = $2
    ORDER BY sequence_id";

const SELECT_EXAMPLES: &str = "
    SELECT E.example_id, E.general_example_id, E.sequence_id, E.lang, E.prompt_id,
           E.example, E.variables
    FROM Examples E
    INNER JOIN Prompts P ON E.prompt_id = P.prompt_id
    WHERE P.general_prompt_id = $1 AND E.lang = $2
    ORDER BY E.sequence_id";

const SELECT_LANGUAGES: &str =
    "SELECT DISTINCT lang FROM Prompts WHERE general_prompt_id = $1 ORDER BY lang";

const INSERT_PROMPT: &str = "
    INSERT INTO Prompts (prompt_id, general_prompt_id, sequence_id, lang, type, description, prompt, variables)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_EXAMPLE: &str = "
    INSERT INTO Examples (example_id, general_example_id, sequence_id, lang, prompt_id, example, variables)
    VALUES ($1, $2, $3, $4, $5, $6, $7)";

/// Prompt rows read from PostgreSQL
#[derive(Debug, Clone)]
pub struct PgPromptSource {
    db: Database,
}

impl PgPromptSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run the table creation script
    pub async fn create_tables(&self, script: &Path) -> Result<()> {
        let sql = tokio::fs::read_to_string(script).await.map_err(|e| {
            Error::other(
                StatusCode::TABLES_SCRIPT,
                format!("Could not read {}: {e}", script.display()),
            )
        })?;

        let client = self.db.client(StatusCode::TABLES_SCRIPT).await?;
        client.batch_execute(&sql).await.map_err(|e| {
            Error::database_with_source(
                StatusCode::TABLES_SCRIPT,
                "Due to this error, the SQL tables couldn't be updated",
                e,
            )
        })?;

        tracing::debug!(script = %script.display(), "Prompt tables created");
        Ok(())
    }

    /// Insert prompt rows in one transaction
    pub async fn insert_prompts(&self, rows: &[PromptRow]) -> Result<u64> {
        let code = StatusCode::PROMPTS_INSERT;
        let fail = |e: tokio_postgres::Error| Error::database_with_source(code, "Error while inserting values in table 'Prompts'", e);

        let mut client = self.db.client(code).await?;
        let tx = client.transaction().await.map_err(fail)?;
        let stmt = tx.prepare(INSERT_PROMPT).await.map_err(fail)?;
        let mut inserted = 0;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.prompt_id,
                        &row.general_prompt_id,
                        &row.sequence_id,
                        &row.lang,
                        &row.kind,
                        &row.description,
                        &row.prompt,
                        &row.variables,
                    ],
                )
                .await
                .map_err(fail)?;
        }
        tx.commit().await.map_err(fail)?;

        tracing::info!(rows = inserted, "Prompts table updated");
        Ok(inserted)
    }

    /// Insert example rows in one transaction
    pub async fn insert_examples(&self, rows: &[ExampleRow]) -> Result<u64> {
        let code = StatusCode::EXAMPLES_INSERT;
        let fail = |e: tokio_postgres::Error| Error::database_with_source(code, "Error while inserting values in table 'Examples'", e);

        let mut client = self.db.client(code).await?;
        let tx = client.transaction().await.map_err(fail)?;
        let stmt = tx.prepare(INSERT_EXAMPLE).await.map_err(fail)?;
        let mut inserted = 0;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.example_id,
                        &row.general_example_id,
                        &row.sequence_id,
                        &row.lang,
                        &row.prompt_id,
                        &row.example,
                        &row.variables,
                    ],
                )
                .await
                .map_err(fail)?;
        }
        tx.commit().await.map_err(fail)?;

        tracing::info!(rows = inserted, "Examples table updated");
        Ok(inserted)
    }
}

fn text(row: &Row, idx: usize) -> String {
    row.get::<_, Option<String>>(idx).unwrap_or_default()
}

#[async_trait]
impl PromptSource for PgPromptSource {
    async fn prompt_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<PromptRow>> {
        let client = self.db.pool().get().await?;
        let rows = client.query(SELECT_PROMPTS, &[&general_prompt_id, &lang]).await?;

        Ok(rows
            .iter()
            .map(|r| PromptRow {
                prompt_id: r.get(0),
                general_prompt_id: r.get(1),
                sequence_id: r.get(2),
                lang: text(r, 3),
                kind: text(r, 4),
                description: text(r, 5),
                prompt: text(r, 6),
                variables: text(r, 7),
            })
            .collect())
    }

    async fn example_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<ExampleRow>> {
        let client = self.db.pool().get().await?;
        let rows = client.query(SELECT_EXAMPLES, &[&general_prompt_id, &lang]).await?;

        Ok(rows
            .iter()
            .map(|r| ExampleRow {
                example_id: r.get(0),
                general_example_id: r.get(1),
                sequence_id: r.get(2),
                lang: text(r, 3),
                prompt_id: r.get(4),
                example: text(r, 5),
                variables: text(r, 6),
            })
            .collect())
    }

    async fn languages(&self, general_prompt_id: i32) -> PromptResult<Vec<String>> {
        let client = self.db.pool().get().await?;
        let rows = client.query(SELECT_LANGUAGES, &[&general_prompt_id]).await?;
        Ok(rows.iter().map(|r| text(r, 0)).collect())
    }
}
