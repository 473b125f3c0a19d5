use anyhow::{Context, Result};

use ontorag::prompts::workbook::Sheet;
use ontorag::prompts::PgPromptSource;

use super::AppContext;

/// Recreate the prompt tables and load them from the workbooks
pub async fn update_tables(app: &AppContext) -> Result<()> {
    let config = &app.config;
    let source = PgPromptSource::new(app.db.clone());

    let report = |e: ontorag::error::Error| {
        tracing::error!("{}", e.report_line());
        anyhow::anyhow!(e)
    };

    source.create_tables(&config.create_tables_sql).await.map_err(report)?;

    let prompts = Sheet::open(&config.prompts_xlsx)
        .and_then(|sheet| sheet.prompt_rows())
        .with_context(|| format!("Failed to read {}", config.prompts_xlsx.display()))?;
    let examples = Sheet::open(&config.examples_xlsx)
        .and_then(|sheet| sheet.example_rows())
        .with_context(|| format!("Failed to read {}", config.examples_xlsx.display()))?;

    let inserted_prompts = source.insert_prompts(&prompts).await.map_err(report)?;
    let inserted_examples = source.insert_examples(&examples).await.map_err(report)?;

    tracing::info!(prompts = inserted_prompts, examples = inserted_examples, "Prompt tables updated");
    println!("Loaded {inserted_prompts} prompt row(s) and {inserted_examples} example row(s)");
    Ok(())
}
