use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::SynapseId;
use crate::error::AnnotatorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AnnotationValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnnotationValue::Text(value.into())
    }

    /// Numeric-looking cells become numbers, everything else stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return AnnotationValue::Integer(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return AnnotationValue::Float(value);
            }
        }
        AnnotationValue::Text(trimmed.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnnotationValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Integer(value) => write!(f, "{value}"),
            AnnotationValue::Float(value) => write!(f, "{value}"),
            AnnotationValue::Text(value) => write!(f, "{value}"),
            AnnotationValue::List(values) => write!(f, "{}", values.join(", ")),
        }
    }
}

pub type Annotations = BTreeMap<String, AnnotationValue>;

/// Full annotation set of one entity as read from the store, with the etag
/// needed to write it back.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSnapshot {
    pub id: SynapseId,
    pub etag: String,
    pub annotations: Annotations,
}

impl AnnotationSnapshot {
    pub fn from_json(value: &Value) -> Result<Self, AnnotatorError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AnnotatorError::SynapseHttp("annotations without id".to_string()))?
            .parse()?;
        let etag = value
            .get("etag")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut annotations = Annotations::new();
        if let Some(map) = value.get("annotations").and_then(Value::as_object) {
            for (key, entry) in map {
                if let Some(parsed) = parse_wire_value(entry) {
                    annotations.insert(key.clone(), parsed);
                }
            }
        }
        Ok(Self {
            id,
            etag,
            annotations,
        })
    }

    pub fn to_json(&self) -> Value {
        let annotations = self
            .annotations
            .iter()
            .map(|(key, value)| (key.clone(), wire_value(value)))
            .collect::<serde_json::Map<_, _>>();
        json!({
            "id": self.id.as_str(),
            "etag": self.etag,
            "annotations": annotations,
        })
    }

    /// Selected subset of this snapshot; keys missing here are simply absent.
    pub fn select(&self, keys: &BTreeSet<String>) -> Annotations {
        self.annotations
            .iter()
            .filter(|(key, _)| keys.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Overlays `update` key by key; later values win.
    pub fn merged(&self, update: &Annotations) -> Self {
        let mut annotations = self.annotations.clone();
        for (key, value) in update {
            annotations.insert(key.clone(), value.clone());
        }
        Self {
            id: self.id.clone(),
            etag: self.etag.clone(),
            annotations,
        }
    }
}

fn parse_wire_value(entry: &Value) -> Option<AnnotationValue> {
    let kind = entry.get("type").and_then(Value::as_str).unwrap_or("STRING");
    let values = entry
        .get("value")
        .and_then(Value::as_array)?
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();
    let first = values.first()?;
    let parsed = match kind {
        "LONG" | "TIMESTAMP_MS" if values.len() == 1 => first
            .parse()
            .map(AnnotationValue::Integer)
            .unwrap_or_else(|_| AnnotationValue::Text(first.clone())),
        "DOUBLE" if values.len() == 1 => first
            .parse()
            .map(AnnotationValue::Float)
            .unwrap_or_else(|_| AnnotationValue::Text(first.clone())),
        _ if values.len() == 1 => AnnotationValue::Text(first.clone()),
        _ => AnnotationValue::List(values),
    };
    Some(parsed)
}

fn wire_value(value: &AnnotationValue) -> Value {
    match value {
        AnnotationValue::Integer(number) => {
            json!({ "type": "LONG", "value": [number.to_string()] })
        }
        AnnotationValue::Float(number) => {
            json!({ "type": "DOUBLE", "value": [number.to_string()] })
        }
        AnnotationValue::Text(text) => json!({ "type": "STRING", "value": [text] }),
        AnnotationValue::List(values) => json!({ "type": "STRING", "value": values }),
    }
}
