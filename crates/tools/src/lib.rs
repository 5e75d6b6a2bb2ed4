//! Built-in tool implementations for Chatloom.
//!
//! Four tools the model can invoke during a turn: arithmetic, web search,
//! stock quotes, and calendar-event creation. The registry is closed; the
//! model calling any other name gets a not-found error.

pub mod calculator;
pub mod calendar_event;
pub mod stock_price;
pub mod web_search;

use chatloom_config::AppConfig;
use chatloom_core::tool::ToolRegistry;
use chatloom_core::Provider;
use std::sync::Arc;
use tracing::warn;

pub use calculator::CalculatorTool;
pub use calendar_event::CalendarEventTool;
pub use stock_price::StockPriceTool;
pub use web_search::WebSearchTool;

/// Create the built-in tool registry.
///
/// Tools needing external credentials register only when configured; the
/// calculator and web search are always available. The provider handle is
/// for the calendar tool's nested extraction call.
pub fn builtin_registry(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<ToolRegistry, chatloom_config::ConfigError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(WebSearchTool::new()));

    match &config.tools.finnhub_api_key {
        Some(key) => registry.register(Box::new(StockPriceTool::new(key.clone()))),
        None => warn!("No Finnhub API key configured, stock lookup disabled"),
    }

    match &config.tools.calendar_url {
        Some(url) => {
            let offset = config.tools.parse_utc_offset()?;
            registry.register(Box::new(CalendarEventTool::new(
                provider,
                config.model.clone(),
                offset,
                url.clone(),
            )));
        }
        None => warn!("No calendar service URL configured, calendar events disabled"),
    }

    Ok(registry)
}
