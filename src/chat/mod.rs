//! Question answering over the indexes
//!
//! Three modes share one line-oriented loop:
//!
//! - vector: the `k` nearest chunks answer through prompt 6
//! - graph: prompt 7 turns the question into a read-only Cypher query whose
//!   rows answer through prompt 8
//! - combined: both contexts answer through prompt 9

pub mod cypher;

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::graph::GraphStore;
use crate::llm::{ChatMessage, LanguageModel};
use crate::ontology::OntologyStore;
use crate::prompts::{ids, PromptStore, PromptVariables};
use crate::storage::VectorIndex;

/// Answer when nothing could be produced
pub const NO_ANSWER: &str = "Sorry, I could not find an answer to that question.";

/// Which context answers the questions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Vector,
    Graph,
    Combined,
}

impl ChatMode {
    fn banner(self) -> &'static str {
        match self {
            Self::Vector => "Vector chat",
            Self::Graph => "Graph chat",
            Self::Combined => "Chat",
        }
    }
}

/// Retrieval context for one question
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphContext {
    pub query: String,
    pub rows: Vec<Value>,
}

/// Everything a chat loop needs
#[derive(Clone)]
pub struct ChatSession {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptStore,
    vectors: Option<Arc<dyn VectorIndex>>,
    graph: Option<Arc<dyn GraphStore>>,
    definitions: String,
    k_most_similar: usize,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: PromptStore, k_most_similar: usize) -> Self {
        Self {
            llm,
            prompts,
            vectors: None,
            graph: None,
            definitions: String::new(),
            k_most_similar,
        }
    }

    pub fn with_vectors(mut self, vectors: Arc<dyn VectorIndex>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Ontology definitions given to the query-writing prompt
    pub fn with_ontology(mut self, ontology: &OntologyStore) -> Self {
        self.definitions = ontology.additional_instructions();
        self
    }

    /// Text of the `k` chunks nearest to the question
    pub async fn vector_context(&self, question: &str) -> Option<String> {
        let vectors = self.vectors.as_ref()?;
        let embedding = self.llm.embed(question).await?;
        match vectors.nearest(&embedding, self.k_most_similar).await {
            Ok(chunks) => Some(
                chunks
                    .iter()
                    .map(|c| c.chunk.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            Err(e) => {
                tracing::error!("{}", e.report_line());
                None
            }
        }
    }

    /// Let the LLM write a query for the question and run it
    pub async fn graph_context(&self, question: &str) -> Option<GraphContext> {
        let graph = self.graph.as_ref()?;
        let schema = match graph.schema().await {
            Ok(schema) => schema,
            Err(e) => {
                tracing::error!("{} - {e}", e.code());
                String::new()
            }
        };

        let variables = PromptVariables::from([
            ("schema".to_string(), schema),
            ("definitions".to_string(), self.definitions.clone()),
            ("question".to_string(), question.to_string()),
        ]);
        let answer = self.ask(ids::GRAPH_QUERY, &variables, question).await?;
        let query = cypher::extract_query(&answer);
        if let Some(clause) = cypher::write_clause(&query) {
            tracing::warn!(%query, clause, "Refusing to run a query that modifies the graph");
            return None;
        }
        if query.is_empty() {
            tracing::warn!("LLM did not produce a query");
            return None;
        }

        tracing::info!(%query, "Running generated query");
        match graph.read_query(&query).await {
            Ok(rows) => Some(GraphContext { query, rows }),
            Err(e) => {
                tracing::error!("{} - {e}", e.code());
                None
            }
        }
    }

    pub async fn answer_vector(&self, question: &str) -> Option<String> {
        let context = self.vector_context(question).await?;
        let variables = PromptVariables::from([
            ("context".to_string(), context),
            ("question".to_string(), question.to_string()),
        ]);
        self.ask(ids::VECTOR_ANSWER, &variables, question).await
    }

    pub async fn answer_graph(&self, question: &str) -> Option<String> {
        let context = self.graph_context(question).await?;
        let variables = PromptVariables::from([
            ("query".to_string(), context.query),
            ("results".to_string(), Value::Array(context.rows).to_string()),
            ("question".to_string(), question.to_string()),
        ]);
        self.ask(ids::GRAPH_ANSWER, &variables, question).await
    }

    pub async fn answer_combined(&self, question: &str) -> Option<String> {
        let vector = self.vector_context(question).await.unwrap_or_default();
        let graph = self
            .graph_context(question)
            .await
            .map(|c| Value::Array(c.rows).to_string())
            .unwrap_or_default();
        if vector.is_empty() && graph.is_empty() {
            return None;
        }

        let variables = PromptVariables::from([
            ("context".to_string(), vector),
            ("results".to_string(), graph),
            ("question".to_string(), question.to_string()),
        ]);
        self.ask(ids::COMBINED_ANSWER, &variables, question).await
    }

    pub async fn answer(&self, mode: ChatMode, question: &str) -> Option<String> {
        match mode {
            ChatMode::Vector => self.answer_vector(question).await,
            ChatMode::Graph => self.answer_graph(question).await,
            ChatMode::Combined => self.answer_combined(question).await,
        }
    }

    async fn ask(&self, prompt_id: i32, variables: &PromptVariables, question: &str) -> Option<String> {
        let system = self.prompts.render(prompt_id, variables).await;
        if system.is_empty() {
            tracing::warn!(prompt_id, "Prompt is empty; skipping LLM call");
            return None;
        }
        let messages = [ChatMessage::system(system), ChatMessage::user(question)];
        self.llm.chat(&messages).await
    }

    /// Answer questions read from `input` until `exit`, `quit` or EOF
    pub async fn run<R, W>(&self, mode: ChatMode, input: R, mut output: W) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(format!("{} (type 'exit' or 'quit' to leave)\n", mode.banner()).as_bytes())
            .await?;

        let mut lines = input.lines();
        let mut answered = 0;
        loop {
            output.write_all(b"> ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
                break;
            }

            let answer = self.answer(mode, question).await;
            let text = answer.as_deref().unwrap_or(NO_ANSWER);
            output.write_all(format!("{text}\n").as_bytes()).await?;
            answered += 1;
        }
        output.flush().await?;
        Ok(answered)
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("prompts", &self.prompts)
            .field("vectors", &self.vectors.is_some())
            .field("graph", &self.graph.is_some())
            .field("k_most_similar", &self.k_most_similar)
            .finish_non_exhaustive()
    }
}
