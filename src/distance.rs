//! Travel distance between a customer and a provider.
//!
//! [`DistanceService`] is the seam to the external mapping provider;
//! [`GoogleDistanceMatrix`] calls the Distance Matrix API. Estimates carry
//! both the provider's display strings and raw metres/seconds, and ranking
//! uses the raw values.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::MapsConfig;
use crate::http;
use crate::models::Address;

const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelEstimate {
    /// Display form, e.g. `"2,789 mi"`.
    pub distance_text: String,
    /// Display form, e.g. `"1 day 18 hours"`.
    pub duration_text: String,
    pub distance_meters: u64,
    pub duration_seconds: u64,
}

#[async_trait]
pub trait DistanceService: Send + Sync {
    async fn estimate(&self, origin: &Address, destination: &Address) -> Result<TravelEstimate>;
}

pub struct DisabledDistance;

#[async_trait]
impl DistanceService for DisabledDistance {
    async fn estimate(&self, _origin: &Address, _destination: &Address) -> Result<TravelEstimate> {
        bail!("maps provider is disabled")
    }
}

pub struct GoogleDistanceMatrix {
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GoogleDistanceMatrix {
    pub fn new(config: &MapsConfig) -> Result<Self> {
        Ok(Self {
            api_key: http::api_key(&config.api_key_env)?,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl DistanceService for GoogleDistanceMatrix {
    async fn estimate(&self, origin: &Address, destination: &Address) -> Result<TravelEstimate> {
        let origin = origin.format();
        let destination = destination.format();
        if origin.is_empty() || destination.is_empty() {
            bail!("cannot estimate distance for an empty address");
        }

        let json = http::get_json(
            &self.client,
            DISTANCE_MATRIX_URL,
            &[
                ("origins", origin.as_str()),
                ("destinations", destination.as_str()),
                ("key", self.api_key.as_str()),
            ],
            self.max_retries,
            "Distance Matrix",
        )
        .await?;

        parse_distance_matrix(&json)
    }
}

fn parse_distance_matrix(json: &Value) -> Result<TravelEstimate> {
    let status = json.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status != "OK" {
        bail!("Distance Matrix request failed: {}", status);
    }

    let element = json
        .pointer("/rows/0/elements/0")
        .ok_or_else(|| anyhow::anyhow!("Distance Matrix response has no elements"))?;

    let element_status = element.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if element_status != "OK" {
        bail!("no route between addresses: {}", element_status);
    }

    let text = |path: &str| {
        element
            .pointer(path)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Distance Matrix response missing {}", path))
    };
    let value = |path: &str| {
        element
            .pointer(path)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Distance Matrix response missing {}", path))
    };

    Ok(TravelEstimate {
        distance_text: text("/distance/text")?,
        duration_text: text("/duration/text")?,
        distance_meters: value("/distance/value")?,
        duration_seconds: value("/duration/value")?,
    })
}

pub fn create_distance_service(config: &MapsConfig) -> Result<Box<dyn DistanceService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledDistance)),
        "google" => Ok(Box::new(GoogleDistanceMatrix::new(config)?)),
        other => bail!("Unknown maps provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ok_element() {
        let json = json!({
            "status": "OK",
            "rows": [{"elements": [{
                "status": "OK",
                "distance": {"text": "4.2 km", "value": 4200},
                "duration": {"text": "12 mins", "value": 720}
            }]}]
        });
        let est = parse_distance_matrix(&json).unwrap();
        assert_eq!(est.distance_text, "4.2 km");
        assert_eq!(est.distance_meters, 4200);
        assert_eq!(est.duration_seconds, 720);
    }

    #[test]
    fn test_parse_not_found_element() {
        let json = json!({
            "status": "OK",
            "rows": [{"elements": [{"status": "NOT_FOUND"}]}]
        });
        let err = parse_distance_matrix(&json).unwrap_err();
        assert!(err.to_string().contains("NOT_FOUND"));
    }

    #[test]
    fn test_parse_request_denied() {
        let json = json!({"status": "REQUEST_DENIED", "rows": []});
        assert!(parse_distance_matrix(&json).is_err());
    }
}
