//! Guarding LLM-written Cypher

use regex::Regex;
use std::sync::OnceLock;

use crate::llm::json::fenced_block;

/// Cypher keywords that change the graph
pub const WRITE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "LOAD", "CALL", "FOREACH",
];

/// Pull the query out of an LLM answer: a fenced block if there is one,
/// else the text from the first `MATCH`/`OPTIONAL MATCH`/`WITH`/`RETURN`
pub fn extract_query(answer: &str) -> String {
    if let Some(block) = fenced_block(answer) {
        return block.trim().trim_end_matches(';').trim().to_string();
    }

    static START_RE: OnceLock<Regex> = OnceLock::new();
    let start = START_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(OPTIONAL\s+MATCH|MATCH|WITH|RETURN|UNWIND)\b").expect("Invalid regex pattern")
    });
    let body = start.find(answer).map_or(answer, |m| &answer[m.start()..]);
    body.trim().trim_end_matches(';').trim().to_string()
}

/// First write clause found outside string literals
pub fn write_clause(query: &str) -> Option<&'static str> {
    static LITERAL_RE: OnceLock<Regex> = OnceLock::new();
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    let literal = LITERAL_RE
        .get_or_init(|| Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`"#).expect("Invalid regex pattern"));
    let word = WORD_RE.get_or_init(|| Regex::new(r"[A-Za-z_]+").expect("Invalid regex pattern"));

    let stripped = literal.replace_all(query, " ");
    word.find_iter(&stripped).find_map(|m| {
        WRITE_CLAUSES
            .iter()
            .find(|clause| clause.eq_ignore_ascii_case(m.as_str()))
            .copied()
    })
}

/// Whether `query` only reads
pub fn is_read_only(query: &str) -> bool {
    !query.trim().is_empty() && write_clause(query).is_none()
}
