//! arXiv API client.
//!
//! Queries the public arXiv Atom API either by identifier list or by a fielded
//! keyword query, parses the returned feed and downloads paper PDFs.
//!
//! Query failures are logged and reported as an empty result list, so a flaky
//! network never aborts an interactive session.

use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// Public arXiv query endpoint.
pub const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";

/// Errors that can occur while talking to arXiv.
#[derive(Debug, Error)]
pub enum ArxivError {
    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("arXiv returned status {0}")]
    Status(u16),

    /// Malformed Atom feed
    #[error("Failed to parse arXiv feed: {0}")]
    Parse(String),

    /// Filesystem failure while saving a PDF
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Query text could not be turned into search fields
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for arXiv operations.
pub type ArxivResult<T> = Result<T, ArxivError>;

/// Metadata for one arXiv entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArxivPaper {
    /// Abstract page URL, e.g. `http://arxiv.org/abs/1706.03762v7`
    pub entry_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub published: String,
    pub updated: String,
    pub primary_category: Option<String>,
    pub categories: Vec<String>,
    pub pdf_url: Option<String>,
    pub doi: Option<String>,
    pub comment: Option<String>,
    pub journal_ref: Option<String>,
}

impl ArxivPaper {
    /// Identifier with version, e.g. `1706.03762v7`.
    pub fn short_id(&self) -> &str {
        self.entry_id
            .split_once("/abs/")
            .map_or(self.entry_id.as_str(), |(_, id)| id)
    }

    /// PDF link from the feed, or one derived from the entry id.
    pub fn pdf_link(&self) -> String {
        self.pdf_url
            .clone()
            .unwrap_or_else(|| self.entry_id.replacen("/abs/", "/pdf/", 1))
    }
}

/// Parse `"key: value, key: value"` into ordered `(key, value)` pairs.
///
/// # Errors
/// Returns `ArxivError::InvalidQuery` if a part has no `:` separator or an
/// empty key or value
pub fn parse_query_fields(input: &str) -> ArxivResult<Vec<(String, String)>> {
    input
        .split(", ")
        .map(|part| {
            let (key, value) = part.split_once(':').ok_or_else(|| {
                ArxivError::InvalidQuery(format!("expected 'key: value', got '{}'", part))
            })?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(ArxivError::InvalidQuery(format!(
                    "empty key or value in '{}'",
                    part
                )));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Join fielded terms into an arXiv `search_query` expression.
pub fn build_search_query(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Where `download_pdf` stores the PDF for `pdf_url`.
pub fn pdf_path_for(pdf_url: &str, dir: &Path) -> PathBuf {
    let stem = pdf_url.trim_end_matches('/').rsplit('/').next().unwrap_or(pdf_url);
    let file_name = if stem.ends_with(".pdf") {
        stem.to_string()
    } else {
        format!("{}.pdf", stem)
    };
    dir.join(file_name)
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    let text = collapse(&text);
    (!text.is_empty()).then_some(text)
}

/// Handle an element that carries its data in attributes (`<link/>`, `<category/>`).
fn apply_attributes(paper: &mut ArxivPaper, e: &BytesStart<'_>) {
    match e.name().as_ref() {
        b"link" => {
            if attribute(e, "title").as_deref() == Some("pdf") {
                paper.pdf_url = attribute(e, "href");
            }
        }
        b"arxiv:primary_category" => paper.primary_category = attribute(e, "term"),
        b"category" => {
            if let Some(term) = attribute(e, "term") {
                paper.categories.push(term);
            }
        }
        _ => {}
    }
}

/// Parse an arXiv Atom feed into paper metadata, in feed order.
///
/// # Errors
/// Returns `ArxivError::Parse` if the XML is malformed or the feed carries an
/// API error entry instead of results
pub fn parse_feed(xml: &str) -> ArxivResult<Vec<ArxivPaper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut papers = Vec::new();
    let mut current: Option<ArxivPaper> = None;
    let mut text = String::new();
    let mut in_author = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => current = Some(ArxivPaper::default()),
                    "author" => in_author = true,
                    _ => {
                        if let Some(paper) = current.as_mut() {
                            apply_attributes(paper, e);
                        }
                    }
                }
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(paper) = current.as_mut() {
                    apply_attributes(paper, e);
                }
            }
            Ok(Event::Text(e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|err| ArxivError::Parse(err.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let name = name.as_ref();
                if name == b"entry" {
                    if let Some(paper) = current.take() {
                        if paper.entry_id.contains("/api/errors") {
                            return Err(ArxivError::Parse(format!(
                                "arXiv rejected the query: {}",
                                paper.summary
                            )));
                        }
                        papers.push(paper);
                    }
                } else if name == b"author" {
                    in_author = false;
                } else if let Some(paper) = current.as_mut() {
                    let value = std::mem::take(&mut text);
                    match name {
                        b"id" => paper.entry_id = collapse(&value),
                        b"title" => paper.title = collapse(&value),
                        b"summary" => paper.summary = collapse(&value),
                        b"published" => paper.published = collapse(&value),
                        b"updated" => paper.updated = collapse(&value),
                        b"name" if in_author => paper.authors.push(collapse(&value)),
                        b"arxiv:doi" => paper.doi = non_empty(value),
                        b"arxiv:comment" => paper.comment = non_empty(value),
                        b"arxiv:journal_ref" => paper.journal_ref = non_empty(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ArxivError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} entries from arXiv feed", papers.len());
    Ok(papers)
}

/// Client for the arXiv query API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
}

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL.to_string())
    }
}

impl ArxivClient {
    /// Create a client for the given API endpoint.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Look up papers by arXiv identifier, newest submission first.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn query_by_id_list(&self, id_list: &[String], max_results: usize) -> Vec<ArxivPaper> {
        self.execute_query(None, id_list, max_results)
            .await
            .unwrap_or_else(|e| {
                error!("An error occurred while executing the query: {}", e);
                Vec::new()
            })
    }

    /// Search with `key:value` terms joined by `AND`, newest submission first.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn combined_query(&self, fields: &[(String, String)], max_results: usize) -> Vec<ArxivPaper> {
        let query = build_search_query(fields);
        self.execute_query(Some(&query), &[], max_results)
            .await
            .unwrap_or_else(|e| {
                error!("An error occurred while executing the query: {}", e);
                Vec::new()
            })
    }

    /// Run a raw query against the API.
    ///
    /// # Errors
    /// Returns `ArxivError` on transport, status or feed-parsing failure
    pub async fn execute_query(
        &self,
        search_query: Option<&str>,
        id_list: &[String],
        max_results: usize,
    ) -> ArxivResult<Vec<ArxivPaper>> {
        let mut params = vec![
            ("start", "0".to_string()),
            ("max_results", max_results.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        if let Some(query) = search_query {
            params.push(("search_query", query.to_string()));
        }
        if !id_list.is_empty() {
            params.push(("id_list", id_list.join(",")));
        }

        debug!("arXiv query: {:?}", params);

        let response = self.client.get(&self.api_url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArxivError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_feed(&body)
    }

    /// Download the paper's PDF into `dir`, skipping the download if the file exists.
    ///
    /// # Returns
    /// Path of the PDF on disk
    ///
    /// # Errors
    /// Returns `ArxivError` if the download or the write fails
    pub async fn download_pdf(&self, paper: &ArxivPaper, dir: &Path) -> ArxivResult<PathBuf> {
        let url = paper.pdf_link();
        let path = pdf_path_for(&url, dir);

        if path.exists() {
            info!("File {} already exists, skipping download", path.display());
            return Ok(path);
        }

        tokio::fs::create_dir_all(dir).await?;

        info!("Downloading {} to {}", url, path.display());
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArxivError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&path, &bytes).await?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query?id_list=1706.03762" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: id_list=1706.03762</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <updated>2023-08-02T00:41:18Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models are based on complex
recurrent or convolutional neural networks &amp; attention.
</summary>
    <author>
      <name>Ashish Vaswani</name>
    </author>
    <author>
      <name>Noam Shazeer</name>
    </author>
    <arxiv:comment xmlns:arxiv="http://arxiv.org/schemas/atom">15 pages, 5 figures</arxiv:comment>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1512.03385v1</id>
    <updated>2015-12-10T19:51:55Z</updated>
    <published>2015-12-10T19:51:55Z</published>
    <title>Deep Residual Learning for Image Recognition</title>
    <summary>Deeper neural networks are more difficult to train.</summary>
    <author>
      <name>Kaiming He</name>
    </author>
    <arxiv:doi xmlns:arxiv="http://arxiv.org/schemas/atom">10.1109/CVPR.2016.90</arxiv:doi>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.entry_id, "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(first.short_id(), "1706.03762v7");
        assert_eq!(first.title, "Attention Is All You Need");
        assert!(first.summary.starts_with("The dominant sequence"));
        assert!(first.summary.ends_with("networks & attention."));
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.published, "2017-06-12T17:57:34Z");
        assert_eq!(first.primary_category.as_deref(), Some("cs.CL"));
        assert_eq!(first.categories, vec!["cs.CL", "cs.LG"]);
        assert_eq!(first.pdf_url.as_deref(), Some("http://arxiv.org/pdf/1706.03762v7"));
        assert_eq!(first.comment.as_deref(), Some("15 pages, 5 figures"));
        assert_eq!(first.doi, None);
    }

    #[test]
    fn test_feed_level_fields_are_ignored() {
        let papers = parse_feed(FEED).unwrap();
        assert!(papers.iter().all(|p| !p.title.starts_with("ArXiv Query")));
    }

    #[test]
    fn test_pdf_link_falls_back_to_entry_id() {
        let papers = parse_feed(FEED).unwrap();
        let second = &papers[1];
        assert_eq!(second.pdf_url, None);
        assert_eq!(second.pdf_link(), "http://arxiv.org/pdf/1512.03385v1");
        assert_eq!(second.doi.as_deref(), Some("10.1109/CVPR.2016.90"));
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_feed() {
        let xml = "<feed><entry><title>unterminated</entry></feed>";
        assert!(matches!(parse_feed(xml), Err(ArxivError::Parse(_))));
    }

    #[test]
    fn test_parse_feed_rejects_api_error_entry() {
        let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=&amp;id_list=not-an-id</title>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_not-an-id</id>
    <title>Error</title>
    <summary>incorrect id format for not-an-id</summary>
    <link href="http://arxiv.org/api/errors#incorrect_id_format_for_not-an-id" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

        match parse_feed(feed) {
            Err(ArxivError::Parse(message)) => {
                assert!(message.contains("incorrect id format for not-an-id"))
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_fields() {
        let fields = parse_query_fields("ti: attention, au: vaswani").unwrap();
        assert_eq!(
            fields,
            vec![
                ("ti".to_string(), "attention".to_string()),
                ("au".to_string(), "vaswani".to_string()),
            ]
        );
        assert_eq!(build_search_query(&fields), "ti:attention AND au:vaswani");
    }

    #[test]
    fn test_parse_query_fields_rejects_bad_input() {
        assert!(matches!(parse_query_fields("attention"), Err(ArxivError::InvalidQuery(_))));
        assert!(matches!(parse_query_fields("ti: "), Err(ArxivError::InvalidQuery(_))));
    }

    #[test]
    fn test_pdf_path_for() {
        let dir = Path::new("download");
        assert_eq!(
            pdf_path_for("http://arxiv.org/pdf/1706.03762v7", dir),
            PathBuf::from("download/1706.03762v7.pdf")
        );
        assert_eq!(
            pdf_path_for("https://arxiv.org/pdf/1706.03762v7.pdf", dir),
            PathBuf::from("download/1706.03762v7.pdf")
        );
    }

    #[tokio::test]
    async fn test_download_skips_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let paper = ArxivPaper {
            entry_id: "http://arxiv.org/abs/2101.00001v1".to_string(),
            ..Default::default()
        };
        let existing = dir.path().join("2101.00001v1.pdf");
        std::fs::write(&existing, b"%PDF-1.4").unwrap();

        // An unroutable API URL proves no request is made.
        let client = ArxivClient::new("http://127.0.0.1:9".to_string());
        let path = client.download_pdf(&paper, dir.path()).await.unwrap();
        assert_eq!(path, existing);
    }
}
