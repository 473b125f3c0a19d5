//! Spreadsheet import of the prompt tables
//!
//! The first worksheet of each workbook is read; its header row names the
//! columns, so column order in the sheet does not matter. Text cells are
//! cleaned with [`clean_table_text`] before they reach the database.

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{ExampleRow, PromptError, PromptResult, PromptRow};
use crate::utils::clean_table_text;

/// Rows of a worksheet, addressed by header name
#[derive(Debug)]
pub struct Sheet {
    path: PathBuf,
    columns: HashMap<String, usize>,
    rows: Vec<Vec<Data>>,
}

impl Sheet {
    /// Read the first worksheet of `path`
    pub fn open(path: &Path) -> PromptResult<Self> {
        let workbook_error = |reason: String| PromptError::Workbook {
            path: path.to_path_buf(),
            reason,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| workbook_error("workbook has no worksheet".to_string()))?
            .map_err(|e| workbook_error(e.to_string()))?;

        Ok(Self::from_rows(path, range.rows().map(<[Data]>::to_vec).collect()))
    }

    /// Build from raw rows, the first one being the header
    pub fn from_rows(path: &Path, mut rows: Vec<Vec<Data>>) -> Self {
        let header = if rows.is_empty() { Vec::new() } else { rows.remove(0) };
        let columns = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| (cell.to_string().trim().to_string(), idx))
            .collect();

        // trailing blank lines are common in hand-edited sheets
        rows.retain(|row| row.iter().any(|c| !matches!(c, Data::Empty)));

        Self {
            path: path.to_path_buf(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> PromptResult<usize> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| PromptError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    fn int(&self, row: usize, name: &str) -> PromptResult<i32> {
        let col = self.column(name)?;
        let cell = self.rows[row].get(col).unwrap_or(&Data::Empty);
        cell_int(cell).ok_or_else(|| PromptError::Workbook {
            path: self.path.clone(),
            reason: format!("row {}: column '{name}' is not an integer ({cell})", row + 2),
        })
    }

    fn text(&self, row: usize, name: &str) -> PromptResult<String> {
        let col = self.column(name)?;
        let cell = self.rows[row].get(col).unwrap_or(&Data::Empty);
        Ok(clean_table_text(&cell_text(cell)))
    }

    /// Rows of the `Prompts` table
    pub fn prompt_rows(&self) -> PromptResult<Vec<PromptRow>> {
        (0..self.rows.len())
            .map(|i| {
                Ok(PromptRow {
                    prompt_id: self.int(i, "prompt_id")?,
                    general_prompt_id: self.int(i, "general_prompt_id")?,
                    sequence_id: self.int(i, "sequence_id")?,
                    lang: self.text(i, "lang")?,
                    kind: self.text(i, "type")?,
                    description: self.text(i, "description")?,
                    prompt: self.text(i, "prompt")?,
                    variables: self.text(i, "variables")?,
                })
            })
            .collect()
    }

    /// Rows of the `Examples` table
    pub fn example_rows(&self) -> PromptResult<Vec<ExampleRow>> {
        (0..self.rows.len())
            .map(|i| {
                Ok(ExampleRow {
                    example_id: self.int(i, "example_id")?,
                    general_example_id: self.int(i, "general_example_id")?,
                    sequence_id: self.int(i, "sequence_id")?,
                    lang: self.text(i, "lang")?,
                    prompt_id: self.int(i, "prompt_id")?,
                    example: self.text(i, "example")?,
                    variables: self.text(i, "variables")?,
                })
            })
            .collect()
    }
}

fn cell_int(cell: &Data) -> Option<i32> {
    match cell {
        Data::Int(i) => i32::try_from(*i).ok(),
        Data::Float(f) if f.fract() == 0.0 => Some(*f as i32),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}
