//! Stock quote lookup via the Finnhub quote endpoint.
//!
//! The provider payload is returned verbatim. A malformed symbol or a
//! provider-side error surfaces as whatever Finnhub sent back so the model
//! sees the same thing a direct API caller would.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolResult};

const QUOTE_URL: &str = "https://finnhub.io/api/v1/quote";

pub struct StockPriceTool {
    api_key: String,
    client: reqwest::Client,
}

impl StockPriceTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Fetch the latest stock quote for a given ticker symbol (e.g. 'AAPL', 'TSLA')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "The ticker symbol to look up"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let symbol = arguments["symbol"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'symbol' argument".into()))?;

        let response = self
            .client
            .get(QUOTE_URL)
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "get_stock_price".into(),
                reason: format!("Quote request failed: {e}"),
            })?;

        // Verbatim passthrough, including provider error payloads
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "get_stock_price".into(),
                    reason: format!("Quote response was not JSON: {e}"),
                })?;

        Ok(ToolResult::ok(body.to_string()).with_data(body))
    }
}
