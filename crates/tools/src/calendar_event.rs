//! Calendar-event creation from natural language.
//!
//! A nested model call in JSON mode extracts {title, date, start, end} from
//! the free-text request; the values resolve against a fixed UTC offset to
//! absolute timestamps. A resolved start in the past advances the year by
//! one so the event always lands in the future. The event is then created
//! through an external calendar service.
//!
//! The extraction call is a synchronous private helper inside this tool,
//! not a recursive turn.

use async_trait::async_trait;
use chatloom_core::error::{ProviderError, ToolError};
use chatloom_core::message::Message;
use chatloom_core::provider::ProviderRequest;
use chatloom_core::tool::{Tool, ToolResult};
use chatloom_core::Provider;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const EXTRACTION_PROMPT: &str = "Extract the calendar event from the user's request. \
Respond with a JSON object containing exactly these keys: \
\"title\" (string), \"date\" (YYYY-MM-DD), \"start_time\" (HH:MM, 24-hour), \
\"end_time\" (HH:MM, 24-hour). If no year is given, use the current year.";

pub struct CalendarEventTool {
    provider: Arc<dyn Provider>,
    model: String,
    offset: FixedOffset,
    service_url: String,
    client: reqwest::Client,
}

impl CalendarEventTool {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        offset: FixedOffset,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            offset,
            service_url: service_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Nested structured-output call that pulls event fields from free text.
    async fn extract_event(&self, text: &str) -> Result<ExtractedEvent, ToolError> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(EXTRACTION_PROMPT), Message::user(text)],
        )
        .with_json_response();

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e: ProviderError| ToolError::ExecutionFailed {
                tool_name: "create_calendar_event".into(),
                reason: format!("Event extraction failed: {e}"),
            })?;

        serde_json::from_str(&response.message.content).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "create_calendar_event".into(),
            reason: format!("Could not parse extracted event: {e}"),
        })
    }
}

#[async_trait]
impl Tool for CalendarEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event from a natural-language description, \
         e.g. 'book a dentist appointment next Tuesday from 2pm to 3pm'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Natural-language description of the event to create"
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let description = arguments["description"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'description' argument".into()))?;

        let extracted = self.extract_event(description).await?;
        debug!(title = %extracted.title, date = %extracted.date, "Extracted event");

        let (start, end) = resolve_event_window(&extracted, self.offset, Utc::now())?;

        let response = self
            .client
            .post(&self.service_url)
            .json(&serde_json::json!({
                "title": extracted.title,
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "create_calendar_event".into(),
                reason: format!("Calendar service request failed: {e}"),
            })?;

        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let link = body["link"]
            .as_str()
            .or_else(|| body["htmlLink"].as_str())
            .unwrap_or_default();

        let payload = serde_json::json!({
            "status": if status < 300 { "created" } else { "failed" },
            "title": extracted.title,
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
            "link": link,
        });

        if status < 300 {
            Ok(ToolResult::ok(payload.to_string()).with_data(payload))
        } else {
            Ok(ToolResult::error(payload.to_string()).with_data(payload))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedEvent {
    title: String,
    date: String,
    start_time: String,
    end_time: String,
}

/// Resolve extracted fields to absolute timestamps in the configured offset.
///
/// A start earlier than `now` moves both endpoints forward by exactly one
/// year; relative dates like "March 3rd" then always land in the future.
fn resolve_event_window(
    event: &ExtractedEvent,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), ToolError> {
    let date = NaiveDate::parse_from_str(&event.date, "%Y-%m-%d").map_err(|e| bad_field(
        "date", &event.date, e,
    ))?;
    let start_time = NaiveTime::parse_from_str(&event.start_time, "%H:%M")
        .map_err(|e| bad_field("start_time", &event.start_time, e))?;
    let end_time = NaiveTime::parse_from_str(&event.end_time, "%H:%M")
        .map_err(|e| bad_field("end_time", &event.end_time, e))?;

    let localize = |d: NaiveDate, t: NaiveTime| {
        d.and_time(t)
            .and_local_timezone(offset)
            .single()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "create_calendar_event".into(),
                reason: "Timestamp does not exist in the configured offset".into(),
            })
    };

    let mut start = localize(date, start_time)?;
    let mut end = localize(date, end_time)?;

    if start < now {
        let next_year = |d: NaiveDate| {
            d.with_year(d.year() + 1)
                .ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: "create_calendar_event".into(),
                    reason: format!("Date {d} has no equivalent next year"),
                })
        };
        start = localize(next_year(date)?, start_time)?;
        end = localize(next_year(date)?, end_time)?;
    }

    Ok((start, end))
}

fn bad_field(field: &str, value: &str, err: chrono::ParseError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "create_calendar_event".into(),
        reason: format!("Invalid {field} '{value}': {err}"),
    }
}
