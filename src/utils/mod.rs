//! Common utilities and helper functions
//!
//! Text normalization shared by the ontology store, the triple validator and
//! the prompt tables. Graph labels must survive being back-quoted into Cypher,
//! so everything that ends up as a label goes through [`sanitize_label`].

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Insert an underscore at every lower→upper boundary (`hasEmployer` → `has_Employer`)
pub fn camel_to_snake(text: &str) -> String {
    static CAMEL_RE: OnceLock<Regex> = OnceLock::new();

    let re = CAMEL_RE.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("Invalid regex pattern"));

    re.replace_all(text, "${1}_${2}").to_string()
}

/// Turn free text into a graph label.
///
/// `&` becomes `and`, non-ASCII is dropped, every other character outside
/// `[A-Za-z0-9_]` becomes a separator and runs of separators collapse into a
/// single underscore. Case is preserved.
pub fn sanitize_label(text: &str) -> String {
    static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

    let re = SEPARATOR_RE
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("Invalid regex pattern"));

    let ascii: String = text
        .trim()
        .replace('&', " and ")
        .chars()
        .filter(char::is_ascii)
        .collect();

    re.replace_all(&ascii, "_")
        .trim_matches('_')
        .to_string()
}

/// Key used to compare an LLM-proposed type or relation with an ontology name.
///
/// Both sides are sanitized, split on camelCase boundaries and lower-cased, so
/// `hasEmployer`, `has_employer` and `Has Employer` all compare equal.
pub fn match_key(text: &str) -> String {
    camel_to_snake(&sanitize_label(text)).to_lowercase()
}

/// Clean an entity name coming out of the LLM.
pub fn clean_name(text: &str) -> String {
    normalize_whitespace(&text.replace('&', "and"))
}

/// Whether `text` can be used as a back-quoted Cypher label or relationship type
pub fn is_safe_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Local name of an IRI: the part after the last `#`, or after the last `/`
pub fn local_name(uri: &str) -> &str {
    if let Some(idx) = uri.rfind('#') {
        return &uri[idx + 1..];
    }
    match uri.rfind('/') {
        Some(idx) => &uri[idx + 1..],
        None => uri,
    }
}

/// Bracketed list of single-quoted items: `['a', 'b']`
pub fn quoted_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}'", item.as_ref().replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Clean spreadsheet text before it is stored in the prompt tables.
///
/// Characters above U+00FF are removed, newlines become spaces and whitespace
/// runs collapse.
pub fn clean_table_text(text: &str) -> String {
    let latin1: String = text.chars().filter(|c| (*c as u32) <= 0xFF).collect();
    normalize_whitespace(&latin1.replace('\n', " "))
}

/// Name of the folder that contains `path`
pub fn parent_folder_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name without its extension
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("hasEmployer"), "has_Employer");
        assert_eq!(camel_to_snake("Person"), "Person");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label(" Person "), "Person");
        assert_eq!(sanitize_label("part of"), "part_of");
        assert_eq!(sanitize_label("R&D"), "R_and_D");
        assert_eq!(sanitize_label("Café-Owner"), "Caf_Owner");
        assert_eq!(sanitize_label("`Person`) DETACH DELETE (n"), "Person_DETACH_DELETE_n");
        assert_eq!(sanitize_label("!!!"), "");
    }

    #[test]
    fn test_match_key() {
        assert_eq!(match_key("hasEmployer"), "has_employer");
        assert_eq!(match_key("has_employer"), "has_employer");
        assert_eq!(match_key("Has Employer"), "has_employer");
        assert_ne!(match_key("Person"), match_key("Personal"));
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Smith &  Sons "), "Smith and Sons");
        assert_eq!(clean_name("O'Neil"), "O'Neil");
    }

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("has_Employer"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("a`b"));
        assert!(!is_safe_identifier("a b"));
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("http://example.org/onto#Person"), "Person");
        assert_eq!(local_name("http://schema.org/Organization"), "Organization");
        assert_eq!(local_name("Plain"), "Plain");
    }

    #[test]
    fn test_quoted_list() {
        assert_eq!(quoted_list(&["Person", "Organization"]), "['Person', 'Organization']");
        assert_eq!(quoted_list::<&str>(&[]), "[]");
    }

    #[test]
    fn test_clean_table_text() {
        assert_eq!(clean_table_text("line one\nline   two"), "line one line two");
        assert_eq!(clean_table_text("émoji 🎉 kept é"), "émoji kept é");
    }

    #[test]
    fn test_path_helpers() {
        let path = Path::new("/data/forms/W-2.pdf");
        assert_eq!(parent_folder_name(path), "forms");
        assert_eq!(file_stem(path), "W-2");
    }
}
