use crate::client::session::{ApiRequest, ApiResponse, Method, Result, Session, SessionError};
use crate::config::types::ApiConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("sia-events/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed session carrying the configured static headers and proxy.
#[derive(Debug)]
pub struct HttpSession {
    base_url: String,
    client: reqwest::Client,
    max_retries: usize,
    retry_interval: Duration,
}

impl HttpSession {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(header_map(&config.headers)?);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(format!("http://{}", proxy))
                .map_err(|e| SessionError::InvalidRequest(format!("proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            max_retries: config.max_retries.max(1),
            retry_interval: config.retry_interval,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build(&self, request: &ApiRequest) -> Result<reqwest::RequestBuilder> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        builder = builder
            .query(&request.query)
            .headers(header_map(request.headers.iter().map(|(k, v)| (k, v)))?)
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder)
    }

    async fn send_once(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> std::result::Result<ApiResponse, reqwest::Error> {
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut attempts = 0;
        let mut backoff = self.retry_interval;

        loop {
            attempts += 1;
            let builder = self.build(&request)?;
            let retry_reason = match self.send_once(builder).await {
                Ok(response) if is_retryable_status(response.status) => {
                    if attempts >= self.max_retries {
                        return Ok(response);
                    }
                    format!("status {}", response.status)
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => return Err(SessionError::Timeout(request.timeout)),
                Err(e) => {
                    if attempts >= self.max_retries {
                        tracing::error!(
                            path = %request.path,
                            attempts = attempts,
                            error = %e,
                            "Max retries exceeded"
                        );
                        return Err(SessionError::Transport(e.to_string()));
                    }
                    e.to_string()
                }
            };

            tracing::warn!(
                path = %request.path,
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                reason = %retry_reason,
                "Request failed, retrying"
            );

            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }
}

/// 429 and every 5xx are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn next_backoff(current: Duration) -> Duration {
    std::cmp::min(current * 2, MAX_BACKOFF)
}

fn header_map<'a, I, K, V>(headers: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a K, &'a V)>,
    K: AsRef<str> + ?Sized + 'a,
    V: AsRef<str> + ?Sized + 'a,
{
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|e| {
            SessionError::InvalidRequest(format!("header name '{}': {}", name.as_ref(), e))
        })?;
        let value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
            SessionError::InvalidRequest(format!("header value for '{}': {}", name, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
