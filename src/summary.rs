use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::aggregate::HourlyAggregate;

/// Anthropic Messages API endpoint.
const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// One sentence needs very little room.
const MAX_TOKENS: u32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Empty completion")]
    EmptyCompletion,
}

impl SummaryError {
    fn is_retryable(&self) -> bool {
        match self {
            SummaryError::Api { status, .. } => *status == 429 || *status >= 500,
            SummaryError::Http(e) => e.is_timeout() || e.is_connect(),
            SummaryError::EmptyCompletion => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Client for the summary generation service. Everything here is off the
/// correctness path: callers treat any error as "no summary" and merge the
/// aggregate anyway.
#[derive(Clone)]
pub struct SummaryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl SummaryClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(API_URL.to_string(), api_key, model)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            api_key,
            model,
        }
    }

    /// Generate a one-sentence description of an hourly aggregate.
    #[instrument(skip(self, aggregate), fields(location = %aggregate.location))]
    pub async fn summarize(&self, aggregate: &HourlyAggregate) -> Result<String, SummaryError> {
        let prompt = build_prompt(aggregate);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_times(2)
            .with_jitter();

        let summary = (|| async { self.request_completion(&prompt).await })
            .retry(backoff)
            .when(SummaryError::is_retryable)
            .notify(|err: &SummaryError, dur: Duration| {
                warn!("Retrying summary request in {:?}: {}", dur, err);
            })
            .await?;

        Ok(summary)
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, SummaryError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SummaryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.trim()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Err(SummaryError::EmptyCompletion);
        }
        debug!("Generated summary ({} chars)", text.len());
        Ok(text)
    }
}

fn build_prompt(aggregate: &HourlyAggregate) -> String {
    let period = if aggregate.is_day { "daytime" } else { "nighttime" };
    format!(
        "In one short sentence, describe this hour of weather for {}: \
         average temperature {:.1} F, {:.0}% chance of precipitation, \
         {:.2} inches of precipitation across the area, {}.",
        aggregate.location,
        aggregate.avg_temperature,
        aggregate.avg_precipitation_probability,
        aggregate.total_precipitation,
        period,
    )
}
