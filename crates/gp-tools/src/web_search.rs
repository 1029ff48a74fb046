//! Web search via Exa API or DuckDuckGo

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;

use crate::error::{Result, ToolError};

/// Web search collaborator
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search and return formatted results
    async fn search(&self, query: &str, limit: usize) -> Result<String>;
}

/// Exa when `EXA_API_KEY` is set, DuckDuckGo Instant Answers otherwise
pub struct ExaDuckDuckGoSearch {
    client: Client,
    exa_api_key: Option<String>,
}

impl ExaDuckDuckGoSearch {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self::with_client(client)
    }

    /// Create with custom client (for testing)
    pub fn with_client(client: Client) -> Self {
        let exa_api_key = env::var("EXA_API_KEY").ok().filter(|k| !k.is_empty());
        Self { client, exa_api_key }
    }

    pub fn has_exa(&self) -> bool {
        self.exa_api_key.is_some()
    }
}

impl Default for ExaDuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Exa API response structure
#[derive(Debug, Deserialize)]
struct ExaResponse {
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    title: Option<String>,
    url: String,
    published_date: Option<String>,
    #[serde(default)]
    text: String,
}

/// DuckDuckGo Instant Answer API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    #[serde(default)]
    related_topics: Vec<DuckDuckGoTopic>,
    #[serde(default)]
    abstract_text: Option<String>,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(default)]
    abstract_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

impl ExaDuckDuckGoSearch {
    async fn search_exa(&self, query: &str, limit: usize) -> Result<String> {
        let api_key = self
            .exa_api_key
            .as_ref()
            .ok_or_else(|| ToolError::failed("EXA_API_KEY not configured"))?;

        let body = json!({
            "query": query,
            "numResults": limit,
            "type": "auto",
            "contents": {"text": {"maxCharacters": 1000}}
        });

        let response = self
            .client
            .post("https://api.exa.ai/search")
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("Exa API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(format!("Exa API error ({}): {}", status, body)));
        }

        let exa_response: ExaResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Failed to parse Exa response: {}", e)))?;

        let results: Vec<SearchResult> = exa_response
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_else(|| "No title".to_string()),
                url: r.url,
                snippet: r.text,
                published_date: r.published_date,
            })
            .collect();

        Ok(format_results(&results, query))
    }

    async fn search_duckduckgo(&self, query: &str, limit: usize) -> Result<String> {
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("DuckDuckGo API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(format!("DuckDuckGo API error: {}", response.status())));
        }

        let ddg_response: DuckDuckGoResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("Failed to parse DuckDuckGo response: {}", e)))?;

        let results = duckduckgo_results(ddg_response, limit);
        if results.is_empty() {
            return Ok(format!("No results found for '{}'. Try a different query.", query));
        }

        Ok(format_results(&results, query))
    }
}

#[async_trait]
impl WebSearch for ExaDuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<String> {
        let limit = limit.clamp(1, 10);
        tracing::info!(query = %query, limit = limit, exa = self.has_exa(), "Executing web search");

        if self.exa_api_key.is_some() {
            match self.search_exa(query, limit).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(error = %e, "Exa search failed, falling back to DuckDuckGo");
                }
            }
        }

        self.search_duckduckgo(query, limit).await
    }
}

/// Internal search result structure
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
    published_date: Option<String>,
}

fn duckduckgo_results(response: DuckDuckGoResponse, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = response.abstract_text.filter(|t| !t.is_empty()) {
        results.push(SearchResult {
            title: response.abstract_source.unwrap_or_else(|| "Summary".to_string()),
            url: response.abstract_url.unwrap_or_default(),
            snippet: abstract_text,
            published_date: None,
        });
    }

    for topic in response.related_topics {
        if results.len() >= limit {
            break;
        }
        if let (Some(text), Some(url)) = (topic.text, topic.first_url) {
            if !text.is_empty() {
                results.push(SearchResult {
                    title: extract_title_from_text(&text),
                    url,
                    snippet: text,
                    published_date: None,
                });
            }
        }
    }

    results
}

/// Format search results for output
fn format_results(results: &[SearchResult], query: &str) -> String {
    let mut output = format!("Search results for: \"{}\"\n\n", query);

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!("## [{}] {}\n", i + 1, result.title));
        output.push_str(&format!("URL: {}\n", result.url));
        if let Some(date) = &result.published_date {
            output.push_str(&format!("Published: {}\n", date));
        }
        output.push_str(&format!("{}\n\n", result.snippet));
    }

    output.push_str(&format!("Found {} results.\n", results.len()));
    output
}

/// DuckDuckGo topic text is usually "Title - Description"
fn extract_title_from_text(text: &str) -> String {
    text.split(" - ").next().unwrap_or("Result").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_from_text() {
        assert_eq!(extract_title_from_text("Tokio - An async runtime for Rust"), "Tokio");
        assert_eq!(extract_title_from_text("Plain"), "Plain");
    }

    #[test]
    fn test_format_results() {
        let results = vec![SearchResult {
            title: "Test Title".to_string(),
            url: "https://example.com".to_string(),
            snippet: "Test snippet".to_string(),
            published_date: Some("2024-01-01".to_string()),
        }];

        let output = format_results(&results, "test query");
        assert!(output.contains("## [1] Test Title"));
        assert!(output.contains("https://example.com"));
        assert!(output.contains("2024-01-01"));
        assert!(output.ends_with("Found 1 results.\n"));
    }

    #[test]
    fn test_duckduckgo_payload() {
        let response: DuckDuckGoResponse = serde_json::from_value(json!({
            "AbstractText": "Rust is a language.",
            "AbstractSource": "Wikipedia",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "Category", "Topics": []},
                {"Text": "Clippy - Rust linter", "FirstURL": "https://duckduckgo.com/Clippy"}
            ]
        }))
        .unwrap();

        let results = duckduckgo_results(response, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Wikipedia");
        assert_eq!(results[1].title, "Cargo");
    }

    #[test]
    fn test_exa_payload() {
        let response: ExaResponse = serde_json::from_value(json!({
            "results": [{"title": null, "url": "https://exa.ai", "publishedDate": "2025-02-01"}]
        }))
        .unwrap();
        assert_eq!(response.results[0].published_date.as_deref(), Some("2025-02-01"));
        assert!(response.results[0].text.is_empty());
    }
}
