//! Markdown documentation split into searchable sections.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tracing::{info, warn};

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\w+").unwrap();
}

const MAX_PREVIEW_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub preview: String,
    pub score: u32,
}

#[derive(Debug, Default)]
pub struct DocsCorpus {
    sections: Vec<DocSection>,
}

fn header_title(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("## ")
        .or_else(|| line.strip_prefix("# "))?;
    let title = rest.trim();
    (!title.is_empty()).then_some(title)
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(MAX_PREVIEW_LENGTH) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

impl DocsCorpus {
    /// Loads the corpus; a missing or unreadable file yields an empty one.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let corpus = Self::from_markdown(&text);
                info!(
                    "Loaded documentation from {:?} ({} sections)",
                    path,
                    corpus.sections.len()
                );
                corpus
            }
            Err(e) => {
                warn!("Documentation file {:?} not available: {}", path, e);
                Self::default()
            }
        }
    }

    /// Splits on `#` and `##` headers outside code fences. Text before the
    /// first header is dropped.
    pub fn from_markdown(text: &str) -> Self {
        let mut sections = Vec::new();
        let mut current: Option<DocSection> = None;
        let mut in_fence = false;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            if !in_fence {
                if let Some(title) = header_title(line) {
                    if let Some(done) = current.take() {
                        sections.push(done);
                    }
                    current = Some(DocSection {
                        title: title.to_string(),
                        content: String::new(),
                    });
                    continue;
                }
            }
            if let Some(section) = current.as_mut() {
                section.content.push_str(line);
                section.content.push('\n');
            }
        }
        if let Some(done) = current {
            sections.push(done);
        }
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[DocSection] {
        &self.sections
    }

    /// Best matching sections, highest score first.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let words: Vec<&str> = WORD_RE.find_iter(&query).map(|m| m.as_str()).collect();

        let mut hits: Vec<SearchHit> = self
            .sections
            .iter()
            .filter_map(|section| {
                let content = section.content.to_lowercase();
                let title = section.title.to_lowercase();
                let mut score = 0;
                if content.contains(&query) {
                    score += 100;
                }
                for word in &words {
                    if content.contains(word) {
                        score += 10;
                    }
                    if title.contains(word) {
                        score += 20;
                    }
                }
                if words.iter().any(|w| title.contains(w)) {
                    score += 50;
                }
                (score > 0).then(|| SearchHit {
                    title: section.title.clone(),
                    preview: preview(&section.content),
                    score,
                })
            })
            .collect();
        // Stable sort keeps document order among equal scores.
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(max_results);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOC: &str = "Intro text\n\
# Getting Started\n\
Create an account on the portal.\n\
## Data API\n\
Use the data API over HTTP.\n\
```bash\n\
# not a header\n\
curl https://data.example.org\n\
```\n\
### Details\n\
More about queries.\n\
# Plugins\n\
Build plugins with pluginctl.\n";

    #[test]
    fn test_sections() {
        let corpus = DocsCorpus::from_markdown(DOC);
        let titles: Vec<&str> = corpus.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Getting Started", "Data API", "Plugins"]);
        let data = &corpus.sections()[1].content;
        assert!(data.contains("# not a header"));
        assert!(data.contains("### Details"));
    }

    #[test]
    fn test_search_scoring() {
        let corpus = DocsCorpus::from_markdown(DOC);
        let hits = corpus.search("data api", 5);
        assert_eq!(hits[0].title, "Data API");
        // phrase + 2 content words + 2 title words + title bonus
        assert_eq!(hits[0].score, 100 + 20 + 40 + 50);
        assert!(corpus.search("", 5).is_empty());
        assert!(corpus.search("zebra", 5).is_empty());
        assert_eq!(corpus.search("the", 1).len(), 1);
    }

    #[test]
    fn test_preview_clipped() {
        let long = format!("# Long\n{}\n", "x".repeat(800));
        let hits = DocsCorpus::from_markdown(&long).search("long", 1);
        assert_eq!(hits[0].preview.chars().count(), MAX_PREVIEW_LENGTH + 3);
    }

    #[test]
    fn test_load_missing_and_present() {
        assert!(DocsCorpus::load(Path::new("/nonexistent/llms.md")).is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        assert_eq!(DocsCorpus::load(file.path()).sections().len(), 3);
    }
}
