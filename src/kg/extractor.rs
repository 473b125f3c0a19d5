//! Triple extraction from one graph chunk

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::llm::{extract_json, ChatMessage, LanguageModel};
use crate::ontology::OntologyStore;
use crate::prompts::{ids, PromptStore, PromptVariables};
use crate::utils::quoted_list;

/// One LLM-extracted triple, fields as proposed by the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub head: String,
    pub head_type: String,
    pub relation: String,
    pub tail: String,
    pub tail_type: String,
    #[serde(default)]
    pub prefix_id: String,
}

impl Triple {
    /// `progressId` of the head node
    pub fn head_progress_id(&self) -> String {
        format!("{}A", self.prefix_id)
    }

    /// `progressId` of the tail node
    pub fn tail_progress_id(&self) -> String {
        format!("{}B", self.prefix_id)
    }
}

/// Chunk-unique prefix of the `index`-th triple of chunk `chunk_seq`
pub fn prefix_id(chunk_seq: usize, index: usize) -> String {
    format!("{chunk_seq}_{index}")
}

/// Variables of the extraction prompts, derived from the ontology
pub fn prompt_variables(ontology: Option<&OntologyStore>) -> PromptVariables {
    let (classes, properties, instructions) = match ontology {
        Some(o) => (o.classes(), o.properties(), o.additional_instructions()),
        None => (Vec::new(), Vec::new(), String::new()),
    };
    let list = |items: &[String]| {
        if items.is_empty() {
            String::new()
        } else {
            quoted_list(items)
        }
    };

    PromptVariables::from([
        ("node_labels_str".to_string(), list(&classes)),
        ("node_labels".to_string(), list(&classes)),
        ("rel_types_str".to_string(), list(&properties)),
        ("rel_types".to_string(), list(&properties)),
        ("additional_instructions".to_string(), instructions),
    ])
}

/// System and user prompts shared by every chunk of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionPrompts {
    pub system: String,
    pub user: String,
}

impl ExtractionPrompts {
    /// Render prompts 1 and 2; the definitions block is appended to the
    /// system prompt when the ontology provides one
    pub async fn render(prompts: &PromptStore, ontology: Option<&OntologyStore>) -> Self {
        let variables = prompt_variables(ontology);
        let mut system = prompts.render(ids::EXTRACTION_SYSTEM, &variables).await;
        let instructions = variables
            .get("additional_instructions")
            .map(String::as_str)
            .unwrap_or_default();
        if !instructions.is_empty() {
            system.push_str(".\n");
            system.push_str(instructions);
        }
        let user = prompts.render(ids::EXTRACTION_USER, &variables).await;

        tracing::debug!(system = %system, user = %user, "Extraction prompts");
        Self { system, user }
    }

    /// Messages for one chunk
    pub fn messages(&self, chunk_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(format!("{}{}", self.user, chunk_text)),
        ]
    }
}

/// Ask the LLM for the triples of one chunk; empty when it does not answer
pub async fn extract(
    llm: &dyn LanguageModel,
    prompts: &ExtractionPrompts,
    chunk_text: &str,
    chunk_seq: usize,
) -> Vec<Triple> {
    let Some(response) = llm.chat(&prompts.messages(chunk_text)).await else {
        tracing::warn!(chunk = chunk_seq, "No LLM answer for chunk; no triples extracted");
        return Vec::new();
    };

    let triples = parse_triples(&response, chunk_seq);
    tracing::debug!(chunk = chunk_seq, count = triples.len(), "Triples extracted");
    triples
}

/// Parse an LLM answer into triples.
///
/// Accepts a JSON array of objects (or an object wrapping one), and falls
/// back to one triple per line written as `a | b | c | d | e` or
/// `(a, b, c, d, e)`. Prefix ids are assigned in answer order.
pub fn parse_triples(response: &str, chunk_seq: usize) -> Vec<Triple> {
    let mut triples = parse_json_triples(response).unwrap_or_else(|| parse_line_triples(response));
    for (index, triple) in triples.iter_mut().enumerate() {
        triple.prefix_id = prefix_id(chunk_seq, index);
    }
    triples
}

fn parse_json_triples(response: &str) -> Option<Vec<Triple>> {
    let value: Value = serde_json::from_str(&extract_json(response)).ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.values().find_map(Value::as_array)?,
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| {
                let field = |key: &str| -> String {
                    match item.get(key) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    }
                };
                item.is_object().then(|| Triple {
                    head: field("head"),
                    head_type: field("head_type"),
                    relation: field("relation"),
                    tail: field("tail"),
                    tail_type: field("tail_type"),
                    prefix_id: String::new(),
                })
            })
            .collect(),
    )
}

fn parse_line_triples(response: &str) -> Vec<Triple> {
    static BULLET_RE: OnceLock<Regex> = OnceLock::new();
    let bullet = BULLET_RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("Invalid regex pattern"));

    response
        .lines()
        .filter_map(|line| {
            let line = bullet.replace(line, "");
            let line = line.trim().trim_start_matches('(').trim_end_matches([')', ',', ';']);
            let parts: Vec<&str> = if line.contains('|') {
                line.split('|').collect()
            } else {
                line.split(',').collect()
            };
            let parts: Vec<String> = parts
                .iter()
                .map(|p| p.trim().trim_matches(['"', '\'']).trim().to_string())
                .collect();
            (parts.len() == 5 && parts.iter().all(|p| !p.is_empty())).then(|| Triple {
                head: parts[0].clone(),
                head_type: parts[1].clone(),
                relation: parts[2].clone(),
                tail: parts[3].clone(),
                tail_type: parts[4].clone(),
                prefix_id: String::new(),
            })
        })
        .collect()
}
