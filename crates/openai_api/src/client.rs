use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::OpenAiApiConfig;
use crate::error::{parse_error_message, OpenAiApiError};
use crate::events::{FinishReason, OpenAiStreamEvent, StreamAccumulator};
use crate::headers::build_headers;
use crate::payload::{ApiRequest, CompletionResponse, ModelList};
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::sse::SseStreamParser;
use crate::url::Endpoint;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct OpenAiClient {
    http: Client,
    config: OpenAiApiConfig,
}

/// Final result of one completion call, streamed or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCompletion {
    pub model: String,
    /// Generated text per choice, ordered by choice index.
    pub choices: Vec<String>,
    pub finish_reasons: Vec<Option<FinishReason>>,
    /// Response body as received, or a reconstruction of it for streams.
    pub raw: Value,
}

impl OpenAiClient {
    pub fn new(config: OpenAiApiConfig) -> Result<Self, OpenAiApiError> {
        if config.api_key.trim().is_empty() {
            return Err(OpenAiApiError::MissingApiKey);
        }
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(OpenAiApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OpenAiApiConfig {
        &self.config
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        endpoint.url(&self.config.base_url)
    }

    pub fn build_headers(&self, streaming: bool) -> Result<HeaderMap, OpenAiApiError> {
        let headers = build_headers(&self.config, streaming)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| OpenAiApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    OpenAiApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(&self, request: &ApiRequest) -> Result<RequestBuilder, OpenAiApiError> {
        let headers = self.build_headers(request.is_streaming())?;
        let payload = request.to_json()?;
        Ok(self
            .http
            .post(self.endpoint_url(request.endpoint()))
            .headers(headers)
            .json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        request: &ApiRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, OpenAiApiError> {
        self.execute_with_retry(|| self.build_request(request), cancellation)
            .await
    }

    async fn execute_with_retry<B>(
        &self,
        build: B,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, OpenAiApiError>
    where
        B: Fn() -> Result<RequestBuilder, OpenAiApiError>,
    {
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if is_cancelled(cancellation) {
                return Err(OpenAiApiError::Cancelled);
            }

            let response = build()?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(OpenAiApiError::from);

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        let delay = retry_delay(self.config.retry_base_delay, attempt);
                        warn!(status = status.as_u16(), attempt, ?delay, "retrying OpenAI request");
                        await_or_cancel(tokio::time::sleep(delay), cancellation).await?;
                        continue;
                    }

                    return Err(OpenAiApiError::Status(status, message));
                }
                Err(OpenAiApiError::Timeout) => return Err(OpenAiApiError::Timeout),
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < max_retries {
                        let delay = retry_delay(self.config.retry_base_delay, attempt);
                        warn!(attempt, ?delay, error = %error, "retrying OpenAI request after transport error");
                        await_or_cancel(tokio::time::sleep(delay), cancellation).await?;
                        continue;
                    }
                    return Err(OpenAiApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(OpenAiApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Run one completion, surfacing stream deltas through `on_event`.
    ///
    /// Non-streaming requests emit no events; the returned value is authoritative
    /// in both cases.
    pub async fn complete<F>(
        &self,
        request: &ApiRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<ApiCompletion, OpenAiApiError>
    where
        F: FnMut(&OpenAiStreamEvent),
    {
        debug!(model = request.model(), endpoint = request.endpoint().path(), "sending completion request");
        let response = self.send_with_retry(request, cancellation).await?;

        if !request.is_streaming() {
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .map_err(OpenAiApiError::from)?;
            return parse_completion_body(request.model(), &body);
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut accumulator = StreamAccumulator::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(OpenAiApiError::Cancelled);
            }
            let chunk = chunk.map_err(OpenAiApiError::from)?;
            for event in parser.feed(&chunk) {
                process_stream_event(&event, &mut accumulator, &mut on_event)?;
            }
            if accumulator.done {
                break;
            }
        }

        if is_cancelled(cancellation) {
            return Err(OpenAiApiError::Cancelled);
        }

        Ok(completion_from_stream(request.model(), accumulator))
    }

    pub async fn list_models(&self) -> Result<Vec<String>, OpenAiApiError> {
        let url = self.endpoint_url(Endpoint::Models);
        let response = self
            .execute_with_retry(
                || Ok(self.http.get(&url).headers(self.build_headers(false)?)),
                None,
            )
            .await?;
        let body = response.text().await?;
        let list: ModelList = serde_json::from_str(&body)
            .map_err(|error| OpenAiApiError::MalformedResponse(error.to_string()))?;
        let mut ids: Vec<String> = list.data.into_iter().map(|model| model.id).collect();
        ids.sort();
        Ok(ids)
    }
}

fn parse_completion_body(requested_model: &str, body: &str) -> Result<ApiCompletion, OpenAiApiError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|error| OpenAiApiError::MalformedResponse(error.to_string()))?;
    let response: CompletionResponse = serde_json::from_value(raw.clone())
        .map_err(|error| OpenAiApiError::MalformedResponse(error.to_string()))?;
    if response.choices.is_empty() {
        return Err(OpenAiApiError::MalformedResponse(
            "response contained no choices".to_owned(),
        ));
    }

    let mut choices = response.choices;
    choices.sort_by_key(|choice| choice.index);

    Ok(ApiCompletion {
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_owned()),
        finish_reasons: choices.iter().map(|choice| choice.finish_reason()).collect(),
        choices: choices
            .iter()
            .map(|choice| choice.content().to_owned())
            .collect(),
        raw,
    })
}

fn completion_from_stream(model: &str, accumulator: StreamAccumulator) -> ApiCompletion {
    let raw_choices: Vec<Value> = accumulator
        .choices
        .iter()
        .zip(&accumulator.finish_reasons)
        .enumerate()
        .map(|(index, (text, reason))| {
            json!({
                "index": index,
                "text": text,
                "finish_reason": reason.map(|reason| reason.as_str()),
            })
        })
        .collect();

    ApiCompletion {
        model: model.to_owned(),
        raw: json!({ "model": model, "stream": true, "choices": raw_choices }),
        choices: accumulator.choices,
        finish_reasons: accumulator.finish_reasons,
    }
}

fn process_stream_event<F>(
    event: &OpenAiStreamEvent,
    accumulator: &mut StreamAccumulator,
    on_event: &mut F,
) -> Result<(), OpenAiApiError>
where
    F: FnMut(&OpenAiStreamEvent),
{
    if let OpenAiStreamEvent::Error { code, message } = event {
        return Err(OpenAiApiError::StreamFailed {
            code: code.clone(),
            message: message
                .clone()
                .or_else(|| code.clone())
                .unwrap_or_else(|| "OpenAI stream reported an error".to_owned()),
        });
    }

    accumulator.apply(event);
    on_event(event);
    Ok(())
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, OpenAiApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(OpenAiApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(OpenAiApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
