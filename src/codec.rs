//! Snapshot envelope and the base64 blob it travels in.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::worksheet::WorksheetKind;

pub const PAYLOAD_VERSION: &str = "1.0";

/// A worksheet snapshot: header fields plus the worksheet's own body keys,
/// flattened into one JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub worksheet_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub saved_date: String,
    #[serde(default)]
    pub opportunity_id: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    /// Wraps a collected body. A body that is not an object lands under `data`.
    pub fn new(kind: WorksheetKind, record_id: &str, body: Value) -> Self {
        let body = match body {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Envelope {
            worksheet_type: kind.payload_type().to_string(),
            version: PAYLOAD_VERSION.to_string(),
            saved_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            opportunity_id: record_id.to_string(),
            body,
        }
    }

    pub fn kind(&self) -> Option<WorksheetKind> {
        self.worksheet_type.parse().ok()
    }

    /// The body as one JSON object, the shape every `restore` reads.
    pub fn body_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    pub fn encode(&self) -> Result<String> {
        encode(&serde_json::to_value(self)?)
    }

    pub fn decode(blob: &str) -> Result<Self> {
        Ok(serde_json::from_value(decode(blob)?)?)
    }
}

/// JSON text to base64 over its UTF-8 bytes.
pub fn encode(payload: &Value) -> Result<String> {
    let text = serde_json::to_string(payload)?;
    Ok(STANDARD.encode(text.as_bytes()))
}

pub fn decode(blob: &str) -> Result<Value> {
    let bytes = STANDARD.decode(blob.trim())?;
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}
