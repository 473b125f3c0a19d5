use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;

use ontorag::chat::{ChatMode, ChatSession};
use ontorag::storage::PgVectorIndex;

use super::AppContext;

/// Interactive question loop on stdin
pub async fn chat(app: &AppContext, mode: ChatMode, use_ontology: bool) -> Result<()> {
    let k = usize::try_from(app.config.k_most_similar).context("Invalid k_most_similar")?;
    let mut session = ChatSession::new(app.llm.clone(), app.prompts.clone(), k);

    if matches!(mode, ChatMode::Vector | ChatMode::Combined) {
        session = session.with_vectors(Arc::new(PgVectorIndex::new(app.db.clone())));
    }
    if matches!(mode, ChatMode::Graph | ChatMode::Combined) {
        session = session.with_graph(app.graph.clone());
        if let Some(ontology) = app.ontology(use_ontology)? {
            session = session.with_ontology(&ontology);
        }
    }

    let answered = session
        .run(mode, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("Chat loop failed")?;
    tracing::info!(?mode, answered, "Chat finished");
    Ok(())
}
