//! Template rows → prompt text

use std::collections::{BTreeMap, HashMap};
use strfmt::{strfmt, FmtError};

/// Variables available to a prompt
pub type PromptVariables = BTreeMap<String, String>;

/// Name of the variable that pulls in the example table
pub const EXAMPLES_VARIABLE: &str = "examples";

/// Variable names declared by a row (`"a, b"` → `["a", "b"]`)
pub fn declared_variables(variables: &str) -> Vec<&str> {
    variables
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Substitute `{name}` placeholders; `{{` and `}}` are literal braces
pub fn format_map(template: &str, variables: &HashMap<String, String>) -> Result<String, FmtError> {
    strfmt(template, variables)
}

/// Concatenate template rows, one line each.
///
/// Rows that declare a variable missing from `variables`, or whose text does
/// not format, are skipped with a warning. Only rows that declare variables
/// go through substitution.
pub fn render_rows<'a>(
    rows: impl IntoIterator<Item = (&'a str, &'a str)>,
    variables: &PromptVariables,
) -> String {
    let mut prompt = String::new();

    for (text, declared) in rows {
        let declared = declared_variables(declared);
        let mut row_variables = HashMap::new();
        let mut skip = false;
        for name in declared {
            match variables.get(name) {
                Some(value) => {
                    row_variables.insert(name.to_string(), value.clone());
                }
                None => {
                    tracing::warn!("Missing variable {name}. Skipping prompt...");
                    skip = true;
                }
            }
        }
        if skip {
            continue;
        }

        if row_variables.is_empty() {
            prompt.push_str(text);
        } else {
            match format_map(text, &row_variables) {
                Ok(formatted) => prompt.push_str(&formatted),
                Err(e) => {
                    tracing::warn!(error = %e, "Prompt row does not format. Skipping prompt...");
                    continue;
                }
            }
        }
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn vars(pairs: &[(&str, &str)]) -> PromptVariables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_declared_variables() {
        assert_eq!(declared_variables("node_labels, rel_types"), ["node_labels", "rel_types"]);
        assert!(declared_variables("").is_empty());
        assert_eq!(declared_variables(" examples ,"), ["examples"]);
    }

    #[test]
    fn test_format_map() {
        let v: HashMap<String, String> = vars(&[("name", "Alice"), ("org", "Acme")]).into_iter().collect();
        assert_eq!(format_map("{name} works at {org}.", &v).unwrap(), "Alice works at Acme.");
        assert_eq!(
            format_map("JSON: {{\"head\": \"{name}\"}}", &v).unwrap(),
            "JSON: {\"head\": \"Alice\"}"
        );
        assert!(format_map("keep {unknown}", &v).is_err());
    }

    #[test]
    fn test_format_map_multibyte() {
        let v: HashMap<String, String> = vars(&[("nom", "Électricité"), ("org", "Société")]).into_iter().collect();
        assert_eq!(format_map("é {nom} ü {org}", &v).unwrap(), "é Électricité ü Société");
        assert_eq!(format_map("{{«{nom}»}}", &v).unwrap(), "{«Électricité»}");
    }

    #[test]
    #[traced_test]
    fn test_render_rows_skips_unformattable_row() {
        let rows = [
            ("Labels: {node_labels}", "node_labels"),
            ("Broken {node_labels} {other}", "node_labels"),
        ];
        let out = render_rows(rows, &vars(&[("node_labels", "['Person']")]));

        assert_eq!(out, "Labels: ['Person']\n");
        assert!(logs_contain("does not format"));
    }

    #[test]
    fn test_render_rows_without_variables_keeps_braces() {
        let rows = [("Return {{\"a\": 1}}", "")];
        assert_eq!(render_rows(rows, &PromptVariables::new()), "Return {{\"a\": 1}}\n");
    }

    #[test]
    #[traced_test]
    fn test_render_rows_skips_missing_variables() {
        let rows = [
            ("You extract triples.", ""),
            ("Labels: {node_labels}", "node_labels"),
            ("Relations: {rel_types}", "rel_types"),
        ];
        let out = render_rows(rows, &vars(&[("node_labels", "['Person']")]));

        assert_eq!(out, "You extract triples.\nLabels: ['Person']\n");
        assert!(logs_contain("Missing variable rel_types. Skipping prompt..."));
    }
}
