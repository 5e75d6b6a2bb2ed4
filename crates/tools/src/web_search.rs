//! Web search via the DuckDuckGo Instant Answer API.
//!
//! Results are flattened to plain text: the abstract first, then related
//! topic snippets. No API key required.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolResult};
use serde::Deserialize;

const SEARCH_URL: &str = "https://api.duckduckgo.com/";

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns relevant result snippets as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Search request failed: {e}"),
            })?;

        let answer: InstantAnswer =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "web_search".into(),
                    reason: format!("Search response was not JSON: {e}"),
                })?;

        let text = flatten_answer(&answer);
        if text.is_empty() {
            return Ok(ToolResult::ok(format!("No results found for '{query}'")));
        }

        Ok(ToolResult::ok(text))
    }
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

/// Flatten an instant answer into newline-separated result text.
fn flatten_answer(answer: &InstantAnswer) -> String {
    let mut lines = Vec::new();

    if !answer.abstract_text.is_empty() {
        if answer.abstract_url.is_empty() {
            lines.push(answer.abstract_text.clone());
        } else {
            lines.push(format!("{} ({})", answer.abstract_text, answer.abstract_url));
        }
    }

    for topic in answer.related_topics.iter().take(5) {
        if topic.text.is_empty() {
            continue;
        }
        if topic.first_url.is_empty() {
            lines.push(topic.text.clone());
        } else {
            lines.push(format!("{} ({})", topic.text, topic.first_url));
        }
    }

    lines.join("\n")
}
