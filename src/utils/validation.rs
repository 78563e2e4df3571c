// file: src/utils/validation.rs
// description: input validation for repository coordinates, paths and limits
// reference: input validation patterns

use crate::error::{DocsKbError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref OWNER_RE: Regex =
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9]){0,38}$").expect("valid owner regex");
    static ref REPO_RE: Regex = Regex::new(r"^[A-Za-z0-9._-]{1,100}$").expect("valid repo regex");
}

pub struct Validator;

impl Validator {
    /// Splits `owner/repo` and checks both halves against GitHub naming rules.
    pub fn validate_repository_name(name: &str) -> Result<(String, String)> {
        let trimmed = name.trim().trim_end_matches(".git");
        let mut parts = trimmed.split('/');

        let (owner, repo) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) => (owner, repo),
            _ => {
                return Err(DocsKbError::Validation(format!(
                    "Repository must be in 'owner/repo' form: {}",
                    name
                )));
            }
        };

        if !OWNER_RE.is_match(owner) {
            return Err(DocsKbError::Validation(format!(
                "Invalid repository owner: {}",
                owner
            )));
        }

        if !REPO_RE.is_match(repo) || repo == "." || repo == ".." {
            return Err(DocsKbError::Validation(format!(
                "Invalid repository name: {}",
                repo
            )));
        }

        Ok((owner.to_string(), repo.to_string()))
    }

    pub fn validate_branch(branch: &str) -> Result<()> {
        let invalid = branch.is_empty()
            || branch.starts_with('/')
            || branch.ends_with('/')
            || branch.ends_with(".lock")
            || branch.contains("..")
            || branch.contains("//")
            || branch
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));

        if invalid {
            return Err(DocsKbError::Validation(format!(
                "Invalid branch name: {:?}",
                branch
            )));
        }
        Ok(())
    }

    pub fn validate_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(DocsKbError::Validation("Query is empty".to_string()));
        }
        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DocsKbError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    /// Lowercases an extension and makes sure it carries its leading dot.
    pub fn normalize_extension(ext: &str) -> String {
        let ext = ext.trim().to_lowercase();
        if ext.starts_with('.') {
            ext
        } else {
            format!(".{}", ext)
        }
    }

    pub fn sanitize_file_path(path: &str) -> String {
        let mut cleaned = path.trim().replace('\\', "/");
        while cleaned.contains("//") {
            cleaned = cleaned.replace("//", "/");
        }
        cleaned.trim_start_matches('/').to_string()
    }

    pub fn truncate_text(text: &str, max_length: usize) -> String {
        if text.len() <= max_length {
            return text.to_string();
        }

        let mut end = max_length;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_repository_name() {
        assert_eq!(
            Validator::validate_repository_name("facebook/react").unwrap(),
            ("facebook".to_string(), "react".to_string())
        );
        assert_eq!(
            Validator::validate_repository_name("mindsdb/mindsdb.git").unwrap(),
            ("mindsdb".to_string(), "mindsdb".to_string())
        );
        assert!(Validator::validate_repository_name("react").is_err());
        assert!(Validator::validate_repository_name("a/b/c").is_err());
        assert!(Validator::validate_repository_name("-bad/repo").is_err());
        assert!(Validator::validate_repository_name("owner/..").is_err());
    }

    #[test]
    fn test_validate_branch() {
        assert!(Validator::validate_branch("main").is_ok());
        assert!(Validator::validate_branch("release/1.x").is_ok());
        assert!(Validator::validate_branch("").is_err());
        assert!(Validator::validate_branch("feature..x").is_err());
        assert!(Validator::validate_branch("bad branch").is_err());
        assert!(Validator::validate_branch("refs.lock").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(Validator::validate_url("https://api.github.com").is_ok());
        assert!(Validator::validate_url("http://localhost:11434").is_ok());
        assert!(Validator::validate_url("api.github.com").is_err());
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(Validator::normalize_extension("MD"), ".md");
        assert_eq!(Validator::normalize_extension(".mdx"), ".mdx");
    }

    #[test]
    fn test_sanitize_file_path() {
        assert_eq!(
            Validator::sanitize_file_path("docs\\guide\\intro.md"),
            "docs/guide/intro.md"
        );
        assert_eq!(Validator::sanitize_file_path("/docs///a.md "), "docs/a.md");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(Validator::truncate_text("short", 10), "short");
        assert_eq!(
            Validator::truncate_text("this is a very long text", 10),
            "this is a ..."
        );
        // never splits a multi-byte character
        assert_eq!(Validator::truncate_text("héllo", 2), "h...");
    }
}
