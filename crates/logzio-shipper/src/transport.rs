//! HTTP delivery of one bulk body to the listener.
//!
//! The client is built once per shipper and shared across every send: pooled
//! keep-alive connections with a configurable idle timeout, optional outbound
//! proxy and extra root certificate. Request bodies are `text/plain`,
//! gzip-compressed when enabled.

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ShipError;

/// Raw outcome of one bulk POST: any HTTP-level response, including 4xx/5xx.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Shared transport for one endpoint.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    endpoint: String,
    gzip: bool,
}

impl Transport {
    pub fn new(config: &Config) -> Self {
        Transport {
            client: get_client(config),
            endpoint: config.endpoint_url.clone(),
            gzip: config.gzip,
        }
    }

    /// POSTs one bulk body.
    ///
    /// Returns `Ok` for every HTTP response regardless of status;
    /// connection-level failures (DNS, TLS, broken persistent connections)
    /// surface as `Err` and are treated as retryable by the caller.
    pub async fn send(&self, body: &str) -> Result<TransportResponse, ShipError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain");
        let request = if self.gzip {
            match compress(body.as_bytes()) {
                Ok(compressed) => request.header(CONTENT_ENCODING, "gzip").body(compressed),
                Err(err) => {
                    debug!("failed to gzip bulk body: {err}, sending uncompressed");
                    request.body(body.to_owned())
                }
            }
        } else {
            request.body(body.to_owned())
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Builds the shared HTTP client, falling back to a default client when the
/// proxy or certificate configuration cannot be applied.
fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(err) => {
            error!("unable to apply transport configuration: {err}, falling back to a default client");
            reqwest::Client::new()
        }
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Box<dyn Error + Send + Sync>> {
    let mut builder = reqwest::Client::builder()
        .pool_idle_timeout(Some(config.idle_timeout))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if let Some(proxy_uri) = &config.proxy_uri {
        builder = builder.proxy(reqwest::Proxy::all(proxy_uri.clone())?);
    }
    if let Some(cert_path) = &config.proxy_cert {
        let pem = std::fs::read(cert_path)?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
    }

    Ok(builder.build()?)
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
