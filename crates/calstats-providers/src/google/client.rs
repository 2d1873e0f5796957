//! Google Calendar v3 events API client.

use calstats_core::RawCalendarEvent;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::source::{BoxFuture, EventQuery, EventSource};

use super::config::GoogleConfig;

/// Lists events of a Google calendar with a caller-supplied access token.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

/// One page of `events.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<RawCalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self {
            http_client: config.http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches every page until the query's `max_results` is reached.
    pub async fn fetch_all(
        &self,
        access_token: &str,
        query: &EventQuery,
    ) -> ProviderResult<Vec<RawCalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = query.max_results.saturating_sub(events.len());
            let page = self
                .fetch_page(access_token, query, remaining, page_token.as_deref())
                .await?;
            events.extend(page.items);

            if events.len() >= query.max_results {
                events.truncate(query.max_results);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            "fetched {} events from calendar {}",
            events.len(),
            query.calendar_id
        );
        Ok(events)
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        query: &EventQuery,
        max_results: usize,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&query.calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", query.window.start.to_rfc3339()),
                ("timeMax", query.window.end.to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", query.single_events.to_string()),
                ("orderBy", query.order_by.clone()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timeout".to_string()
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            ProviderError::network(message).with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let err = match status {
                reqwest::StatusCode::UNAUTHORIZED => {
                    ProviderError::authentication("access token expired or invalid")
                }
                reqwest::StatusCode::FORBIDDEN => {
                    ProviderError::authorization("access denied to calendar")
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    ProviderError::rate_limited(format!(
                        "rate limit exceeded{}",
                        retry_after
                            .map(|s| format!(", retry after {} seconds", s))
                            .unwrap_or_default()
                    ))
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    ProviderError::server(format!("calendar API error: {}", body.trim()))
                }
            };
            return Err(err.with_status(code));
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_source(e)
        })?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse events response: {}", e))
        })
    }
}

impl EventSource for GoogleCalendarClient {
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawCalendarEvent>>> {
        Box::pin(self.fetch_all(access_token, query))
    }
}
