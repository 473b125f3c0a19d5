//! JSON recovery from free-form LLM output

/// Extract the JSON payload from markdown code blocks or surrounding prose.
///
/// Looks for a ```` ```json ```` block, then any fenced block, then the
/// outermost `[...]` or `{...}` span, whichever opens first.
pub fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(block) = fenced_block(text) {
        return block.trim().to_string();
    }

    let object = span(text, '{', '}');
    let array = span(text, '[', ']');
    match (object, array) {
        (Some(o), Some(a)) => {
            let (start, end) = if a.0 < o.0 { a } else { o };
            text[start..=end].to_string()
        }
        (Some((start, end)), None) | (None, Some((start, end))) => text[start..=end].to_string(),
        (None, None) => text.trim().to_string(),
    }
}

/// Body of the first fenced block, without its language line
pub fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_start = &text[start + 3..];
    let content_start = after_start.find('\n').map_or(0, |i| i + 1);
    let end = after_start[content_start..].find("```")?;
    Some(&after_start[content_start..content_start + end])
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_code_block() {
        let text = "Here is the result:\n```json\n[{\"head\": \"Alice\"}]\n```\nDone.";
        assert_eq!(extract_json(text), "[{\"head\": \"Alice\"}]");
    }

    #[test]
    fn test_extract_from_generic_block() {
        let text = "```\n{\"Person\": [[\"0A\"]]}\n```";
        assert_eq!(extract_json(text), "{\"Person\": [[\"0A\"]]}");
    }

    #[test]
    fn test_extract_from_prose() {
        assert_eq!(
            extract_json("Sure! [{\"a\": 1}, {\"b\": 2}] Hope it helps."),
            "[{\"a\": 1}, {\"b\": 2}]"
        );
        assert_eq!(extract_json("Result: {\"x\": [1]} end"), "{\"x\": [1]}");
        assert_eq!(extract_json("  nothing here "), "nothing here");
    }
}
