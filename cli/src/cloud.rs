//! HTTP client for a `calgrid serve` document store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use calgrid_core::remote::{Query, RemoteDatabase, RemoteError, RemoteRecord};

use crate::server::{DeleteResponse, ErrorResponse, QueryResponse, SaveRecordRequest};

pub struct HttpDatabase {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpDatabase {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "calgrid/{} (calorie calendar)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn record_url(&self, container: &str, record_type: &str, record_name: &str) -> String {
        format!(
            "{}/api/containers/{}/records/{}/{}",
            self.base_url,
            percent_encode_component(container),
            percent_encode_component(record_type),
            percent_encode_component(record_name),
        )
    }

    fn query_url(&self, container: &str) -> String {
        format!(
            "{}/api/containers/{}/query",
            self.base_url,
            percent_encode_component(container)
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let request = match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        };
        let resp = request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    resp.json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl RemoteDatabase for HttpDatabase {
    async fn save(&self, container: &str, record: RemoteRecord) -> Result<(), RemoteError> {
        let url = self.record_url(container, &record.record_type, &record.record_name);
        let body = SaveRecordRequest {
            fields: record.fields,
        };
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    async fn delete(
        &self,
        container: &str,
        record_type: &str,
        record_name: &str,
    ) -> Result<bool, RemoteError> {
        let url = self.record_url(container, record_type, record_name);
        let resp = self.send(self.client.delete(url)).await?;
        let body: DeleteResponse = parse(resp).await?;
        Ok(body.deleted)
    }

    async fn query(&self, container: &str, query: Query) -> Result<Vec<RemoteRecord>, RemoteError> {
        let resp = self
            .send(self.client.post(self.query_url(container)).json(&query))
            .await?;
        let body: QueryResponse = parse(resp).await?;
        Ok(body.records)
    }
}

/// Percent-encode one URL path segment.
///
/// Everything outside the RFC 3986 unreserved set is escaped.
fn percent_encode_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push(char::from(HEX_CHARS[(byte >> 4) as usize]));
                encoded.push(char::from(HEX_CHARS[(byte & 0x0F) as usize]));
            }
        }
    }
    encoded
}

const HEX_CHARS: [u8; 16] = *b"0123456789ABCDEF";
