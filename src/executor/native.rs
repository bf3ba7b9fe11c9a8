//! Native HTTP transport using reqwest.
//!
//! This is the production [`Transport`]: one pooled `reqwest::Client` built
//! from an [`ExecutionConfig`], reused for every step of a session.

use super::{ExecutionConfig, FetchMode, PreparedRequest, RawResponse, RequestError, Transport};
use async_trait::async_trait;
use log::debug;
use reqwest::redirect::Policy;
use std::collections::BTreeMap;

/// Sends replayed requests with reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client honouring the timeout, redirect and TLS settings.
    pub fn new(config: &ExecutionConfig) -> Result<Self, RequestError> {
        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects as usize)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.validate_ssl)
            .build()
            .map_err(|e| RequestError::BuildError(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        mode: FetchMode,
    ) -> Result<RawResponse, RequestError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            RequestError::BuildError(format!("Invalid method {}: {}", request.method, e))
        })?;

        let mut req_builder = self.client.request(method, &request.url);

        // Reduced-fidelity requests go out bare
        if mode == FetchMode::Full {
            for (name, value) in &request.headers {
                req_builder = req_builder.header(name.as_str(), value.as_str());
            }

            if let Some(body) = &request.body {
                req_builder = req_builder.body(body.clone());
            }
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let url = Some(response.url().to_string());

        if mode == FetchMode::Opaque {
            debug!("Reduced-fidelity request to {} went through", request.url);
            return Ok(RawResponse {
                status: status.as_u16(),
                status_text,
                headers: BTreeMap::new(),
                body: Vec::new(),
                url,
            });
        }

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .and_modify(|existing: &mut String| {
                        existing.push_str(", ");
                        existing.push_str(value_str);
                    })
                    .or_insert_with(|| value_str.to_string());
            }
        }

        let body = response.bytes().await?.to_vec();

        debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            body.len()
        );

        Ok(RawResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
            url,
        })
    }
}
