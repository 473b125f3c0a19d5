//! In-memory prompt source

use super::{ExampleRow, PromptResult, PromptRow, PromptSource};
use async_trait::async_trait;

/// Prompt and example rows held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPromptSource {
    prompts: Vec<PromptRow>,
    examples: Vec<ExampleRow>,
}

impl MemoryPromptSource {
    pub fn new(prompts: Vec<PromptRow>, examples: Vec<ExampleRow>) -> Self {
        Self { prompts, examples }
    }
}

#[async_trait]
impl PromptSource for MemoryPromptSource {
    async fn prompt_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<PromptRow>> {
        let mut rows: Vec<PromptRow> = self
            .prompts
            .iter()
            .filter(|r| r.general_prompt_id == general_prompt_id && r.lang == lang)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.sequence_id);
        Ok(rows)
    }

    async fn example_rows(&self, general_prompt_id: i32, lang: &str) -> PromptResult<Vec<ExampleRow>> {
        let prompt_ids: Vec<i32> = self
            .prompts
            .iter()
            .filter(|p| p.general_prompt_id == general_prompt_id)
            .map(|p| p.prompt_id)
            .collect();

        let mut rows: Vec<ExampleRow> = self
            .examples
            .iter()
            .filter(|e| e.lang == lang && prompt_ids.contains(&e.prompt_id))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.sequence_id);
        Ok(rows)
    }

    async fn languages(&self, general_prompt_id: i32) -> PromptResult<Vec<String>> {
        let mut langs: Vec<String> = Vec::new();
        for row in self.prompts.iter().filter(|r| r.general_prompt_id == general_prompt_id) {
            if !langs.contains(&row.lang) {
                langs.push(row.lang.clone());
            }
        }
        Ok(langs)
    }
}
