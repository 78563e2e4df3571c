// file: src/models/search_result.rs
// description: Search result model with similarity scores
// reference: Used for vector similarity search results

use crate::utils::Validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    /// Source file path within the repository
    pub path: String,

    /// File name
    pub name: String,

    /// Document title, when the file has a heading
    pub title: Option<String>,

    /// Matched document content
    pub content: String,

    /// Identity token (git blob sha) of the indexed revision
    pub sha: String,

    /// Relevance score (higher is more relevant, typically 0.0-1.0)
    pub score: f32,

    /// Raw distance metric from vector search (lower is closer)
    pub distance: Option<f32>,
}

impl SearchResult {
    /// Format as a summary string for display, content folded onto one line
    pub fn format_summary(&self, max_content_len: usize) -> String {
        format!(
            "{} (score {:.4})\n   {}\n   {}",
            self.title.as_deref().unwrap_or(&self.path),
            self.score,
            self.path,
            Validator::truncate_text(&self.content.replace('\n', " "), max_content_len)
        )
    }
}

/// Orders results best-first; ties fall back to path for deterministic output.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
}
