// file: src/github/client.rs
// description: GitHub REST client for tree listings and file contents
// reference: https://docs.github.com/en/rest/git/trees and https://docs.github.com/en/rest/repos/contents

use crate::config::GitHubConfig;
use crate::error::{DocsKbError, Result};
use crate::github::{ContentSource, InclusionPolicy, RemoteLister};
use crate::models::{FetchedFile, RemoteFile, RemoteListing, RepoCoordinate};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

pub struct GitHubClient {
    client: Client,
    api_url: Url,
    has_token: bool,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|e| DocsKbError::Config(format!("Invalid GitHub token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DocsKbError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let api_url = Url::parse(&config.api_url)
            .map_err(|e| DocsKbError::Config(format!("Invalid GitHub API url: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            has_token: config.token.is_some(),
        })
    }

    /// Confirms the configured token and returns the authenticated login.
    pub async fn validate_token(&self) -> Result<String> {
        if !self.has_token {
            return Err(DocsKbError::Config(
                "No GitHub token configured (set GITHUB_TOKEN or github.token)".to_string(),
            ));
        }

        let url = endpoint(&self.api_url, &["user"])?;
        let response = self.send(url).await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DocsKbError::Config("GitHub token was rejected".to_string()));
        }
        if !status.is_success() {
            return Err(classify_status(status, "authenticated user"));
        }

        let user: UserResponse = parse_body(response).await?;
        info!("GitHub token valid for user {}", user.login);
        Ok(user.login)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| DocsKbError::Transient(format!("GitHub request failed: {}", e)))
    }

    /// Distinguishes a missing repository from a missing branch after a tree 404.
    async fn not_found_error(&self, repo: &RepoCoordinate, branch: &str) -> DocsKbError {
        let url = match endpoint(&self.api_url, &["repos", &repo.owner, &repo.name]) {
            Ok(url) => url,
            Err(e) => return e,
        };

        match self.send(url).await {
            Ok(response) if response.status().is_success() => DocsKbError::BranchNotFound {
                repository: repo.full_name(),
                branch: branch.to_string(),
            },
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                DocsKbError::RepositoryNotFound(repo.full_name())
            }
            Ok(response) => classify_status(response.status(), &repo.full_name()),
            Err(e) => e,
        }
    }

    async fn get_blob(&self, repo: &RepoCoordinate, sha: &str) -> Result<String> {
        let url = endpoint(
            &self.api_url,
            &["repos", &repo.owner, &repo.name, "git", "blobs", sha],
        )?;
        let response = self.send(url).await?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), &format!("blob {}", sha)));
        }

        let blob: BlobResponse = parse_body(response).await?;
        decode_content(&blob.content, &blob.encoding)
    }
}

#[async_trait]
impl RemoteLister for GitHubClient {
    async fn list_files(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        policy: &InclusionPolicy,
    ) -> Result<RemoteListing> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "git", "trees"];
        segments.extend(branch.split('/'));
        let mut url = endpoint(&self.api_url, &segments)?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self.send(url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(self.not_found_error(repo, branch).await);
        }
        if status == StatusCode::CONFLICT {
            // an empty repository has no tree at all
            info!("Repository {} is empty", repo);
            return Ok(RemoteListing::complete(Vec::new()));
        }
        if !status.is_success() {
            return Err(classify_status(status, &format!("{}@{}", repo, branch)));
        }

        let tree: TreeResponse = parse_body(response).await?;
        if tree.truncated {
            warn!("Tree listing for {}@{} was truncated by GitHub", repo, branch);
        }

        let listing = listing_from_tree(tree, policy);
        info!(
            "Listed {} matching files in {}@{}",
            listing.files.len(),
            repo,
            branch
        );
        Ok(listing)
    }
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn get_file(
        &self,
        repo: &RepoCoordinate,
        path: &str,
        branch: &str,
    ) -> Result<FetchedFile> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str(), "contents"];
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        let mut url = endpoint(&self.api_url, &segments)?;
        url.query_pairs_mut().append_pair("ref", branch);

        let response = self.send(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, path));
        }

        let value: serde_json::Value = parse_body(response).await?;
        if value.is_array() {
            return Err(DocsKbError::NotFound(format!("{} is a directory", path)));
        }

        let entry: ContentResponse = serde_json::from_value(value)
            .map_err(|e| DocsKbError::Decode(format!("Unexpected contents response: {}", e)))?;
        if entry.kind != "file" {
            return Err(DocsKbError::NotFound(format!(
                "{} is a {}, not a file",
                path, entry.kind
            )));
        }

        let content = match (entry.content.as_deref(), entry.encoding.as_deref()) {
            (Some(content), Some(encoding)) if encoding != "none" && !content.is_empty() => {
                decode_content(content, encoding)?
            }
            _ => {
                // files above the contents API limit come back without inline content
                debug!("Falling back to blob API for {}", entry.path);
                self.get_blob(repo, &entry.sha).await?
            }
        };

        Ok(FetchedFile::new(entry.path, content, entry.sha))
    }
}

/// Builds `base/segment/...` with each segment percent-encoded.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DocsKbError::Config(format!("GitHub API url cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn classify_status(status: StatusCode, context: &str) -> DocsKbError {
    match status {
        StatusCode::NOT_FOUND => DocsKbError::NotFound(context.to_string()),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => DocsKbError::Transient(format!(
            "GitHub rate limit or access denied ({}) for {}",
            status, context
        )),
        StatusCode::UNAUTHORIZED => {
            DocsKbError::Config(format!("GitHub rejected credentials for {}", context))
        }
        s if s.is_server_error() => {
            DocsKbError::Transient(format!("GitHub returned {} for {}", s, context))
        }
        s => DocsKbError::Validation(format!("GitHub returned {} for {}", s, context)),
    }
}

fn decode_content(content: &str, encoding: &str) -> Result<String> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| DocsKbError::Decode(format!("Invalid base64 content: {}", e)))?;
            String::from_utf8(bytes)
                .map_err(|e| DocsKbError::Decode(format!("Content is not valid UTF-8: {}", e)))
        }
        "utf-8" | "utf8" => Ok(content.to_string()),
        other => Err(DocsKbError::Decode(format!(
            "Unsupported content encoding: {}",
            other
        ))),
    }
}

fn listing_from_tree(tree: TreeResponse, policy: &InclusionPolicy) -> RemoteListing {
    let mut files: Vec<RemoteFile> = tree
        .tree
        .into_iter()
        .filter(|entry| entry.kind == "blob" && policy.matches(&entry.path))
        .map(|entry| RemoteFile {
            path: entry.path,
            sha: entry.sha,
            size: entry.size.unwrap_or(0),
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    RemoteListing {
        files,
        truncated: tree.truncated,
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| DocsKbError::Transient(format!("Failed to read GitHub response: {}", e)))?;
    serde_json::from_str(&body)
        .map_err(|e| DocsKbError::Decode(format!("Failed to parse GitHub response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://api.github.com").unwrap();
        let url = endpoint(
            &base,
            &["repos", "acme", "docs", "contents", "guide", "getting started.md"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/docs/contents/guide/getting%20started.md"
        );
    }

    #[test]
    fn test_endpoint_respects_base_path() {
        let base = Url::parse("https://ghe.example.com/api/v3/").unwrap();
        let url = endpoint(&base, &["user"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/user");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "a.md").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "a.md").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "a.md").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "a.md").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "a.md").kind(),
            ErrorKind::Invalid
        );
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        // GitHub wraps base64 payloads at 60 columns
        let encoded = "IyBIZWxs\nbyBXb3Js\nZAo=\n";
        assert_eq!(decode_content(encoded, "base64").unwrap(), "# Hello World\n");
    }

    #[test]
    fn test_decode_failures() {
        let bad_base64 = decode_content("!!!", "base64").unwrap_err();
        assert_eq!(bad_base64.kind(), ErrorKind::DecodeError);

        let not_utf8 = STANDARD.encode([0xff, 0xfe, 0x00]);
        let err = decode_content(&not_utf8, "base64").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        let unknown = decode_content("abc", "rot13").unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn test_listing_filters_blobs_by_policy() {
        let tree: TreeResponse = serde_json::from_value(serde_json::json!({
            "sha": "root",
            "truncated": false,
            "tree": [
                { "path": "docs", "type": "tree", "sha": "t1" },
                { "path": "docs/b.md", "type": "blob", "sha": "s2", "size": 20 },
                { "path": "docs/a.mdx", "type": "blob", "sha": "s1", "size": 10 },
                { "path": "src/lib.rs", "type": "blob", "sha": "s3", "size": 5 },
                { "path": "vendor", "type": "commit", "sha": "s4" }
            ]
        }))
        .unwrap();

        let policy = InclusionPolicy::new(&[".md".to_string(), ".mdx".to_string()], None);
        let listing = listing_from_tree(tree, &policy);

        assert!(!listing.truncated);
        assert_eq!(
            listing.files,
            vec![
                RemoteFile {
                    path: "docs/a.mdx".to_string(),
                    sha: "s1".to_string(),
                    size: 10
                },
                RemoteFile {
                    path: "docs/b.md".to_string(),
                    sha: "s2".to_string(),
                    size: 20
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_validate_token_requires_token() {
        let mut config = Config::default_config().github;
        config.token = None;
        let client = GitHubClient::new(&config).unwrap();
        let err = client.validate_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
