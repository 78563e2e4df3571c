// file: src/parser/markdown.rs
// description: markdown parsing with pulldown-cmark for titles and embedding text
// reference: https://docs.rs/pulldown-cmark

use crate::utils::Validator;
use pulldown_cmark::{Event, MetadataBlockKind, Options, Parser, Tag, TagEnd};

pub struct MarkdownParser {
    options: Options,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMarkdown {
    pub title: Option<String>,
    pub plain_text: String,
    pub headings: Vec<Heading>,
}

#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u32,
    pub text: String,
}

impl MarkdownParser {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
        options.insert(Options::ENABLE_TABLES);
        Self { options }
    }

    /// Extracts headings and plain text; the title is the front-matter
    /// `title:` when present, else the first heading.
    pub fn parse(&self, content: &str) -> ParsedMarkdown {
        let parser = Parser::new_ext(content, self.options);

        let mut plain_text = String::new();
        let mut headings = Vec::new();
        let mut front_matter_title = None;

        let mut current_heading: Option<(u32, String)> = None;
        let mut in_metadata = false;
        let mut in_code_block = false;

        for event in parser {
            match event {
                Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                    in_metadata = true;
                }
                Event::End(TagEnd::MetadataBlock(_)) => {
                    in_metadata = false;
                }
                Event::Start(Tag::Heading { level, .. }) => {
                    current_heading = Some((level as u32, String::new()));
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some((level, text)) = current_heading.take() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            headings.push(Heading { level, text });
                        }
                    }
                    plain_text.push('\n');
                }
                Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    plain_text.push('\n');
                }
                Event::Text(text) if in_metadata => {
                    if front_matter_title.is_none() {
                        front_matter_title = title_from_front_matter(&text);
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some((_, ref mut heading_text)) = current_heading {
                        heading_text.push_str(&text);
                    }
                    plain_text.push_str(&text);
                    if !in_code_block {
                        plain_text.push(' ');
                    }
                }
                Event::SoftBreak | Event::HardBreak | Event::End(TagEnd::Paragraph) => {
                    plain_text.push('\n');
                }
                _ => {}
            }
        }

        let title = front_matter_title.or_else(|| headings.first().map(|h| h.text.clone()));

        ParsedMarkdown {
            title,
            plain_text: collapse_blank_lines(&plain_text),
            headings,
        }
    }

    pub fn extract_title(&self, content: &str) -> Option<String> {
        self.parse(content).title
    }

    /// Text handed to the embedding model: title first, then body, capped.
    pub fn embedding_text(&self, content: &str, max_chars: usize) -> String {
        let parsed = self.parse(content);
        let text = match parsed.title {
            Some(title) if !parsed.plain_text.starts_with(&title) => {
                format!("{}\n{}", title, parsed.plain_text)
            }
            _ => parsed.plain_text,
        };

        if text.chars().count() > max_chars {
            text.chars().take(max_chars).collect()
        } else {
            text
        }
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

fn title_from_front_matter(block: &str) -> Option<String> {
    block.lines().find_map(|line| {
        let value = line.trim().strip_prefix("title:")?.trim();
        let value = value.trim_matches(|c| c == '"' || c == '\'').trim();
        (!value.is_empty()).then(|| Validator::truncate_text(value, 200))
    })
}

fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_heading() {
        let parser = MarkdownParser::new();
        let parsed = parser.parse("Intro line\n\n## Getting Started\n\nSome content here.\n\n# Later");

        assert_eq!(parsed.title.as_deref(), Some("Getting Started"));
        assert_eq!(parsed.headings.len(), 2);
        assert!(parsed.plain_text.contains("Some content"));
    }

    #[test]
    fn test_front_matter_title_wins() {
        let parser = MarkdownParser::new();
        let content = "---\ntitle: \"Install Guide\"\nsidebar: 2\n---\n\n# Installation\n\nRun it.";
        let parsed = parser.parse(content);

        assert_eq!(parsed.title.as_deref(), Some("Install Guide"));
        assert!(!parsed.plain_text.contains("sidebar"));
    }

    #[test]
    fn test_no_title() {
        let parser = MarkdownParser::new();
        assert_eq!(parser.extract_title("just text"), None);
        assert_eq!(parser.extract_title(""), None);
    }

    #[test]
    fn test_code_blocks_kept_as_text() {
        let parser = MarkdownParser::new();
        let parsed = parser.parse("# Usage\n\n```sh\ncargo install docs_kb\n```\n");
        assert!(parsed.plain_text.contains("cargo install docs_kb"));
    }

    #[test]
    fn test_embedding_text_is_capped() {
        let parser = MarkdownParser::new();
        let body = "word ".repeat(100);
        let text = parser.embedding_text(&format!("# Title\n\n{}", body), 50);
        assert_eq!(text.chars().count(), 50);
        assert!(text.starts_with("Title"));
    }
}
