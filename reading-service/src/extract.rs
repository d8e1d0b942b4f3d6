//! Boundary to whatever reads the number off a meter photo.

use std::time::Duration;

use async_trait::async_trait;
use reading_client::domain::MeterType;

pub const METER_TYPE_HEADER: &str = "x-meter-type";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    Value(f64),
    Unrecognized,
}

/// Never fails: anything that goes wrong is reported as `Unrecognized` and
/// the reading waits for a manual value.
#[async_trait]
pub trait ReadingExtractor: Send + Sync {
    async fn extract(&self, image: &[u8], meter_type: MeterType) -> Extraction;
}

/// Used when no extractor endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledExtractor;

#[async_trait]
impl ReadingExtractor for DisabledExtractor {
    async fn extract(&self, _image: &[u8], _meter_type: MeterType) -> Extraction {
        Extraction::Unrecognized
    }
}

/// Posts the raw image to an HTTP endpoint answering with plain text,
/// e.g. `1234.567` or `UNCLEAR`.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn request(&self, image: &[u8], meter_type: MeterType) -> Result<String, reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .header(METER_TYPE_HEADER, meter_type.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl ReadingExtractor for HttpExtractor {
    async fn extract(&self, image: &[u8], meter_type: MeterType) -> Extraction {
        match self.request(image, meter_type).await {
            Ok(text) => match parse_reading_text(&text) {
                Some(value) => Extraction::Value(value),
                None => {
                    tracing::info!(answer = %text.trim(), "extractor did not recognize a reading");
                    Extraction::Unrecognized
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "reading extractor request failed");
                Extraction::Unrecognized
            }
        }
    }
}

/// First `digits[.digits]` run in the answer.
pub fn parse_reading_text(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    text[start..end].trim_end_matches('.').parse().ok()
}
