//! reqwest-backed implementation of [`HttpTransport`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, ClientBuilder};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tracing::instrument;

use super::{
    HttpRequest, HttpResponse, HttpTransport, MultipartPart, MultipartRequest, StreamingResponse,
    TransportError,
};

/// HTTP transport implementation using reqwest.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

/// Alias kept for callers that name the concrete type.
pub type HttpTransportImpl = ReqwestTransport;

impl ReqwestTransport {
    /// Creates a new transport rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                timeout: self.timeout,
            }
        } else if e.is_connect() {
            TransportError::Connection {
                message: e.to_string(),
            }
        } else {
            TransportError::InvalidResponse {
                message: e.to_string(),
            }
        }
    }

    fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.build_url(&request.path);
        let mut req_builder = self.client.post(&url);

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name, value);
        }
        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                message: e.to_string(),
            })?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let url = self.build_url(&request.path);
        let mut req_builder = self.client.post(&url);

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name, value);
        }
        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);

        let stream: Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>> =
            Box::pin(response.bytes_stream().map(|result| {
                result.map_err(|e| TransportError::InvalidResponse {
                    message: e.to_string(),
                })
            }));

        Ok(StreamingResponse {
            status,
            headers,
            stream,
        })
    }

    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn send_multipart(
        &self,
        request: MultipartRequest,
    ) -> Result<HttpResponse, TransportError> {
        let url = self.build_url(&request.path);

        let mut form = reqwest::multipart::Form::new();
        for part in request.parts {
            form = match part {
                MultipartPart::Text { name, value } => form.text(name, value),
                MultipartPart::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    let part = reqwest::multipart::Part::bytes(data)
                        .file_name(filename)
                        .mime_str(&content_type)
                        .map_err(|e| TransportError::InvalidResponse {
                            message: e.to_string(),
                        })?;
                    form.part(name, part)
                }
            };
        }

        let mut req_builder = self.client.post(&url).multipart(form);
        for (name, value) in &request.headers {
            req_builder = req_builder.header(name, value);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                message: e.to_string(),
            })?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_joins_slashes() {
        let transport = ReqwestTransport::new(
            "http://localhost:8080/",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            transport.build_url("/v1/chat"),
            "http://localhost:8080/v1/chat"
        );
        assert_eq!(
            transport.build_url("v1/chat"),
            "http://localhost:8080/v1/chat"
        );
    }
}
