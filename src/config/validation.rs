//! Field-by-field validation of the raw `config.yaml` mapping
//!
//! Each problem becomes its own numbered [`ConfigIssue`]. Codes `1..=100` are
//! warnings (a default is used); anything above 100 is fatal.

use std::fmt;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::StatusCode;

/// Highest code that is still only a warning
pub const MAX_WARNING_CODE: u32 = 100;

/// Accepted values for `logging_level`
pub const LOGGING_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub code: u32,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.code > MAX_WARNING_CODE
    }

    pub fn status(&self) -> StatusCode {
        StatusCode(self.code)
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.status(), self.message)
    }
}

/// `en`/`fr` from whatever the user wrote, or `None` if unsupported
pub fn normalize_language(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .replace(['\'', '"'], "")
        .to_lowercase()
        .chars()
        .take(3)
        .collect();
    match cleaned.as_str() {
        "en" | "eng" => Some("en".to_string()),
        "fr" | "fra" | "fre" => Some("fr".to_string()),
        _ => None,
    }
}

/// `log_file` with every non-alphanumeric character removed, `newLog` when empty
pub fn log_file_stem(raw: Option<&str>) -> String {
    let stem: String = raw
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if stem.is_empty() {
        "newLog".to_string()
    } else {
        stem
    }
}

/// Validate every recognised option. Issues come back sorted by code.
pub fn validate(map: &Mapping) -> Vec<ConfigIssue> {
    let mut check = Checker { map, issues: Vec::new() };

    // LLM budget
    match check.require("chunk_overlap_ratio", 103) {
        Some(Value::Number(n)) if n.is_f64() && n.as_f64().is_some_and(|r| r > 0.0 && r < 1.0) => {}
        Some(_) => check.push(104, "Parameter \"chunk_overlap_ratio\" can only be a FLOAT in range ( 0, 1 ) "),
        None => {}
    }
    let max_tokens = check.positive_int("llm_max_tokens", 105, 106);
    let tokens_per_100 = match check.require("llm_tokens_per_100_characters", 107) {
        Some(v) => match v.as_i64() {
            Some(n) if (1..=100).contains(&n) => Some(n),
            _ => {
                check.push(108, "Parameter \"llm_tokens_per_100_characters\" can only be an INTEGER in range [ 1, 100 ] ");
                None
            }
        },
        None => None,
    };
    let len_prompt = check.positive_int("llm_len_prompt_engineering", 109, 110);

    if let (Some(max), Some(tpc), Some(len)) = (max_tokens, tokens_per_100, len_prompt) {
        let tokens_in_prompt = prompt_tokens(len, tpc);
        if tokens_in_prompt > max {
            check.push(
                111,
                format!("Parameter \"llm_len_prompt_engineering\" uses {tokens_in_prompt} tokens, however {max} is configured to be the maximum"),
            );
        }
    }

    let k = check.positive_int("k_most_similar", 112, 113);
    if let (Some(max), Some(tpc), Some(len), Some(k), false) = (
        max_tokens,
        tokens_per_100,
        len_prompt,
        k,
        check.has(111),
    ) {
        let tokens_per_k = (max - prompt_tokens(len, tpc)) / k;
        let chars_per_k = tokens_per_k * 100 / tpc;
        if chars_per_k < 100 {
            check.push(114, "Parameter \"k_most_similar\" has an extremely high value, which will not allow LLM interactions. ");
        } else if chars_per_k < 500 {
            check.push(5, "Parameter \"k_most_similar\" has a high value, which will negatively affect LLM interactions. ");
        }
    }

    // Graph store
    match check.require("memgraph_socket", 115) {
        Some(Value::String(s)) if s.contains(':') => {}
        Some(_) => check.push(116, "Parameter \"memgraph_socket\" MUST be a string with a \":\" character. "),
        None => {}
    }
    check.require("memgraph_user", 117);
    check.require("memgraph_password", 118);

    // Documents and LLM endpoints
    check.non_empty_string("pdf_folder_path", 119, 120);
    check.non_empty_string("llm_embedding_model", 121, 122);
    check.non_empty_string("llm_embedding_url", 123, 124);
    check.positive_int("llm_embedding_vector_len", 125, 126);
    if let Some(v) = check.require("llm_embedding_context_len", 127) {
        if v.as_i64().is_none() {
            check.push(128, "Parameter \"llm_embedding_context_len\" can only be an INTEGER");
        }
    }
    check.non_empty_string("llm_chat_model", 129, 130);
    check.non_empty_string("llm_chat_url", 131, 132);

    // Prompt database
    check.non_empty_string("db_name", 133, 134);
    check.non_empty_string("db_user", 135, 136);
    check.non_empty_string("db_password", 137, 138);
    check.non_empty_string("db_host", 139, 140);
    match check.require("db_port", 141) {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::Number(n)) if n.as_u64().is_some_and(|p| p > 0 && p <= u64::from(u16::MAX)) => {}
        Some(_) => check.push(142, "Parameter \"db_port\" MUST be a non-empty string or a port number. "),
        None => {}
    }
    check.file("prompts_xlsx", 143, 144, &[".xls", ".xlsx"]);
    check.file("examples_xlsx", 147, 148, &[".xls", ".xlsx"]);
    check.file("createTables_sql", 151, 152, &[".sql"]);

    if let Some(language) = check.non_empty_string("language", 155, 156) {
        if normalize_language(&language).is_none() {
            check.push(157, "Parameter \"language\" can ONLY be either \"en\" or \"fr\". ");
        }
    }

    // Warnings
    match map.get("logging_level") {
        None => check.push(1, "Parameter \"logging_level\" not found. Defaulting logging level to INFO"),
        Some(Value::String(level)) if LOGGING_LEVELS.contains(&level.as_str()) => {}
        Some(_) => check.push(
            2,
            "Logging level not found in list [ DEBUG, INFO, WARNING, ERROR, CRITICAL ]. Defaulting logging level to INFO",
        ),
    }
    match map.get("log_file") {
        None => check.push(3, "Parameter \"log_file\" not found. Defaulting name to \"newLog\""),
        Some(v) if !v.as_str().unwrap_or_default().chars().any(|c| c.is_ascii_alphanumeric()) => check.push(
            4,
            "Parameter \"log_file\" is empty string and/or use special characters. Defaulting name to \"newLog\"",
        ),
        Some(_) => {}
    }

    let mut issues = check.issues;
    issues.sort_by_key(|issue| issue.code);
    issues
}

/// Token estimate for `chars` characters of prompt
fn prompt_tokens(chars: i64, tokens_per_100: i64) -> i64 {
    (chars * tokens_per_100 + 99) / 100
}

struct Checker<'a> {
    map: &'a Mapping,
    issues: Vec<ConfigIssue>,
}

impl<'a> Checker<'a> {
    fn push(&mut self, code: u32, message: impl Into<String>) {
        self.issues.push(ConfigIssue::new(code, message));
    }

    fn has(&self, code: u32) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    fn require(&mut self, key: &str, missing: u32) -> Option<&'a Value> {
        let value = self.map.get(key);
        if value.is_none() {
            self.push(missing, format!("Parameter \"{key}\" not found. "));
        }
        value
    }

    fn positive_int(&mut self, key: &str, missing: u32, invalid: u32) -> Option<i64> {
        let value = self.require(key, missing)?;
        match value.as_i64() {
            Some(n) if n > 0 => Some(n),
            _ => {
                self.push(invalid, format!("Parameter \"{key}\" can only be an INTEGER greater than zero. "));
                None
            }
        }
    }

    fn non_empty_string(&mut self, key: &str, missing: u32, invalid: u32) -> Option<String> {
        let value = self.require(key, missing)?;
        match value.as_str() {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            _ => {
                self.push(invalid, format!("Parameter \"{key}\" MUST be a non-empty string. "));
                None
            }
        }
    }

    /// Missing file is `invalid + 1`, wrong extension `invalid + 2`
    fn file(&mut self, key: &str, missing: u32, invalid: u32, extensions: &[&str]) {
        let Some(path) = self.non_empty_string(key, missing, invalid) else {
            return;
        };
        if !Path::new(&path).exists() {
            self.push(invalid + 1, format!("File {path} does not exist"));
        } else if !extensions
            .iter()
            .any(|ext| path.to_lowercase().ends_with(ext))
        {
            self.push(invalid + 2, format!("File {path} is not a valid type: {extensions:?}"));
        }
    }
}
