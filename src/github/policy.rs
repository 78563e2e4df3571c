// file: src/github/policy.rs
// description: inclusion policy deciding which remote files are tracked
// reference: replaces the local skip-pattern scanner filter

use crate::config::SyncConfig;
use crate::utils::Validator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionPolicy {
    extensions: Vec<String>,
    path_prefix: Option<String>,
}

impl InclusionPolicy {
    pub fn new(extensions: &[String], path_prefix: Option<&str>) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| Validator::normalize_extension(ext))
                .collect(),
            path_prefix: path_prefix
                .map(Validator::sanitize_file_path)
                .filter(|prefix| !prefix.is_empty()),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.extensions, config.path_prefix.as_deref())
    }

    /// Accepts every file; used when browsing a tree without filters.
    pub fn any() -> Self {
        Self {
            extensions: Vec::new(),
            path_prefix: None,
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    pub fn matches(&self, path: &str) -> bool {
        if let Some(prefix) = &self.path_prefix
            && !path.starts_with(prefix.as_str())
        {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }

        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => {
                let ext = file_name[idx..].to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        let policy = InclusionPolicy::new(&exts(&["md", ".MDX"]), None);
        assert!(policy.matches("README.md"));
        assert!(policy.matches("docs/Guide.MD"));
        assert!(policy.matches("docs/page.mdx"));
        assert!(!policy.matches("src/main.rs"));
        assert!(!policy.matches("Makefile"));
        // dotfiles have no extension
        assert!(!policy.matches(".md"));
    }

    #[test]
    fn test_prefix_filter() {
        let policy = InclusionPolicy::new(&exts(&[".md"]), Some("docs/"));
        assert!(policy.matches("docs/intro.md"));
        assert!(!policy.matches("README.md"));
        assert_eq!(policy.path_prefix(), Some("docs/"));
    }

    #[test]
    fn test_any_matches_everything() {
        let policy = InclusionPolicy::any();
        assert!(policy.matches("Cargo.toml"));
        assert!(policy.matches("a/b/c"));
    }

    #[test]
    fn test_blank_prefix_ignored() {
        let policy = InclusionPolicy::new(&exts(&[".md"]), Some("  "));
        assert_eq!(policy.path_prefix(), None);
    }
}
