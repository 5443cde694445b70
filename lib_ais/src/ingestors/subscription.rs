//! # Subscription Config and Handshake
//!
//! Two shapes of the same information:
//!
//! - [`SubscriptionConfig`] is what the browser posts. Keys are accepted in the
//!   dashboard's camelCase (`boundingBoxes`) and in the relay's own PascalCase
//!   (`BoundingBoxes`), since older clients forward the relay format verbatim.
//! - [`SubscriptionMessage`] is the handshake frame the relay expects right after
//!   the socket opens. Optional filters are left out of the JSON entirely when
//!   unset; the relay treats `null` differently from absent.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::{AisStreamError, Result};

/// `[[lat, lng], [lat, lng]]`: two opposite corners of a rectangle.
pub type BoundingBox = [[f64; 2]; 2];

/// Subscription parameters as posted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(rename = "boundingBoxes", alias = "BoundingBoxes", default)]
    pub bounding_boxes: Option<Vec<BoundingBox>>,

    #[serde(
        rename = "filtersShipMMSI",
        alias = "FiltersShipMMSI",
        default,
        deserialize_with = "mmsi_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub filters_ship_mmsi: Option<Vec<String>>,

    #[serde(
        rename = "filterMessageTypes",
        alias = "FilterMessageTypes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_message_types: Option<Vec<String>>,

    /// Only honoured by `updateSubscription`, to rotate the key on a live socket.
    #[serde(rename = "apiKey", alias = "APIKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SubscriptionConfig {
    /// Config with just bounding boxes.
    pub fn with_boxes(bounding_boxes: Vec<BoundingBox>) -> Self {
        Self {
            bounding_boxes: Some(bounding_boxes),
            ..Self::default()
        }
    }

    /// Checks the bounding boxes and returns them.
    pub fn validated_boxes(&self) -> Result<&[BoundingBox]> {
        let boxes = self
            .bounding_boxes
            .as_deref()
            .ok_or_else(|| AisStreamError::Validation("Bounding boxes are required".to_string()))?;

        if boxes.is_empty() {
            return Err(AisStreamError::Validation(
                "At least one bounding box is required".to_string(),
            ));
        }

        for (index, corners) in boxes.iter().enumerate() {
            for [lat, lng] in corners {
                if !lat.is_finite() || !(-90.0..=90.0).contains(lat) {
                    return Err(AisStreamError::Validation(format!(
                        "Bounding box {} has latitude {} outside [-90, 90]",
                        index, lat
                    )));
                }
                if !lng.is_finite() || !(-180.0..=180.0).contains(lng) {
                    return Err(AisStreamError::Validation(format!(
                        "Bounding box {} has longitude {} outside [-180, 180]",
                        index, lng
                    )));
                }
            }
        }

        Ok(boxes)
    }

    /// Builds the relay handshake. `api_key` wins unless this config carries its own.
    pub fn handshake(&self, api_key: &str) -> Result<SubscriptionMessage> {
        let bounding_boxes = self.validated_boxes()?.to_vec();
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(api_key)
            .to_string();

        Ok(SubscriptionMessage {
            api_key,
            bounding_boxes,
            filters_ship_mmsi: self.filters_ship_mmsi.clone(),
            filter_message_types: self.filter_message_types.clone(),
        })
    }
}

/// The handshake frame sent to the relay on open and on resubscribe.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    #[serde(rename = "APIKey")]
    pub api_key: String,

    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<BoundingBox>,

    #[serde(rename = "FiltersShipMMSI", default, skip_serializing_if = "Option::is_none")]
    pub filters_ship_mmsi: Option<Vec<String>>,

    #[serde(rename = "FilterMessageTypes", default, skip_serializing_if = "Option::is_none")]
    pub filter_message_types: Option<Vec<String>>,
}

impl SubscriptionMessage {
    /// Serializes to the text frame sent over the socket.
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AisStreamError::Internal(format!("failed to encode subscription: {}", e)))
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for SubscriptionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionMessage")
            .field("api_key", &"<redacted>")
            .field("bounding_boxes", &self.bounding_boxes)
            .field("filters_ship_mmsi", &self.filters_ship_mmsi)
            .field("filter_message_types", &self.filter_message_types)
            .finish()
    }
}

/// MMSIs arrive as strings or bare numbers; the relay wants strings.
fn mmsi_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    raw.map(|values| {
        values
            .into_iter()
            .map(|value| match value {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(serde::de::Error::custom(format!("invalid MMSI: {}", other))),
            })
            .collect()
    })
    .transpose()
}
