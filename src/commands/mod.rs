pub mod build;
pub mod chat;
pub mod tables;

use anyhow::{Context, Result};
use std::sync::Arc;

use ontorag::config::Config;
use ontorag::graph::MemgraphStore;
use ontorag::llm::{LlmClient, LlmConfig};
use ontorag::ontology::{self, OntologyStore};
use ontorag::prompts::{PgPromptSource, PromptStore};
use ontorag::storage::Database;

pub use build::build_rag;
pub use chat::chat;
pub use tables::update_tables;

/// Connections shared by every command of a run
pub struct AppContext {
    pub config: Config,
    pub db: Database,
    pub graph: Arc<MemgraphStore>,
    pub llm: Arc<LlmClient>,
    pub prompts: PromptStore,
}

impl AppContext {
    /// Connect to PostgreSQL and Memgraph; either failing ends the run
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let db = Database::connect(&config).await.map_err(|e| {
            tracing::error!("{}", e.report_line());
            anyhow::anyhow!(e)
        })
        .context("Could not be possible to connect to PostgreSQL")?;

        let graph = match MemgraphStore::connect(
            &config.memgraph_uri(),
            &config.memgraph_username(),
            &config.memgraph_password(),
        )
        .await
        {
            Ok(graph) => graph,
            Err(e) => {
                tracing::error!("{} - {e}", e.code());
                db.close();
                return Err(anyhow::anyhow!(e).context("Graph couldn't be initialized"));
            }
        };

        let llm = LlmClient::new(LlmConfig::from_config(&config)).context("Failed to create HTTP client")?;
        let prompts = PromptStore::new(Arc::new(PgPromptSource::new(db.clone())), config.language.clone());

        Ok(Self {
            config,
            db,
            graph: Arc::new(graph),
            llm: Arc::new(llm),
            prompts,
        })
    }

    /// Ontology for this run when `--ontology` was given
    pub fn ontology(&self, enabled: bool) -> Result<Option<Arc<OntologyStore>>> {
        if !enabled {
            return Ok(None);
        }
        let store = ontology::load_optional(self.config.rdf_filepath.as_deref()).map_err(|e| {
            tracing::error!("{} - {e}", e.code());
            anyhow::anyhow!("{e}")
        })?;
        if let Some(store) = &store {
            tracing::info!(
                classes = store.classes().len(),
                properties = store.properties().len(),
                "Ontology loaded"
            );
        }
        Ok(store.map(Arc::new))
    }

    pub fn close(&self) {
        self.db.close();
    }
}
