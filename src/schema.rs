use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::error::AnnotatorError;

pub trait SchemaSource {
    /// Ordered property names a template governs.
    fn template_properties(&self, template: &str) -> Result<Vec<String>, AnnotatorError>;
}

/// JSON-LD data model with `@graph` nodes linked by `sms:requiresDependency`.
#[derive(Debug, Clone)]
pub struct JsonLdSchema {
    nodes: Vec<Value>,
    by_id: HashMap<String, usize>,
}

impl JsonLdSchema {
    pub fn load(location: &str) -> Result<Self, AnnotatorError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::from_url(location)
        } else {
            let content = fs::read_to_string(location)
                .map_err(|err| AnnotatorError::Schema(format!("read {location}: {err}")))?;
            let value = serde_json::from_str(&content)
                .map_err(|err| AnnotatorError::Schema(err.to_string()))?;
            Self::from_value(value)
        }
    }

    pub fn from_url(url: &str) -> Result<Self, AnnotatorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("nf-annotate/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AnnotatorError::Schema(err.to_string()))?;
        let response = client
            .get(url)
            .send()
            .map_err(|err| AnnotatorError::Schema(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AnnotatorError::Schema(format!(
                "{url} returned status {}",
                response.status().as_u16()
            )));
        }
        let value = response
            .json::<Value>()
            .map_err(|err| AnnotatorError::Schema(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, AnnotatorError> {
        let nodes = match value {
            Value::Object(mut map) => match map.remove("@graph") {
                Some(Value::Array(nodes)) => nodes,
                _ => return Err(AnnotatorError::Schema("missing @graph".to_string())),
            },
            _ => return Err(AnnotatorError::Schema("schema is not an object".to_string())),
        };
        let by_id = nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| node_str(node, "@id").map(|id| (id.to_string(), idx)))
            .collect();
        Ok(Self { nodes, by_id })
    }

    fn find_template(&self, template: &str) -> Option<&Value> {
        if let Some(idx) = self
            .by_id
            .get(template)
            .or_else(|| self.by_id.get(&format!("bts:{template}")))
        {
            return self.nodes.get(*idx);
        }
        self.nodes.iter().find(|node| {
            node_str(node, "rdfs:label") == Some(template)
                || node_str(node, "sms:displayName") == Some(template)
        })
    }

    fn property_name(&self, id: &str) -> String {
        self.by_id
            .get(id)
            .and_then(|idx| self.nodes.get(*idx))
            .and_then(|node| {
                node_str(node, "sms:displayName").or_else(|| node_str(node, "rdfs:label"))
            })
            .map(str::to_string)
            .unwrap_or_else(|| {
                id.split_once(':')
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| id.to_string())
            })
    }
}

impl SchemaSource for JsonLdSchema {
    fn template_properties(&self, template: &str) -> Result<Vec<String>, AnnotatorError> {
        let node = self
            .find_template(template)
            .ok_or_else(|| AnnotatorError::Schema(format!("template {template} not found")))?;
        let mut properties = Vec::new();
        let dependencies = match node.get("sms:requiresDependency") {
            Some(Value::Array(items)) => items.clone(),
            Some(item @ Value::Object(_)) => vec![item.clone()],
            _ => Vec::new(),
        };
        for dependency in &dependencies {
            if let Some(id) = node_str(dependency, "@id") {
                let name = self.property_name(id);
                if !properties.contains(&name) {
                    properties.push(name);
                }
            }
        }
        Ok(properties)
    }
}

fn node_str<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> JsonLdSchema {
        JsonLdSchema::from_value(json!({
            "@context": {},
            "@graph": [
                {
                    "@id": "bts:ProcessedAlignedReadsTemplate",
                    "rdfs:label": "ProcessedAlignedReadsTemplate",
                    "sms:requiresDependency": [
                        {"@id": "bts:Component"},
                        {"@id": "bts:Filename"},
                        {"@id": "bts:assay"},
                        {"@id": "bts:specimenID"},
                        {"@id": "bts:assay"}
                    ]
                },
                {"@id": "bts:assay", "rdfs:label": "assay", "sms:displayName": "assay"},
                {"@id": "bts:specimenID", "rdfs:label": "specimenID"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn dependencies_in_order_without_duplicates() {
        let props = schema()
            .template_properties("bts:ProcessedAlignedReadsTemplate")
            .unwrap();
        assert_eq!(props, vec!["Component", "Filename", "assay", "specimenID"]);
    }

    #[test]
    fn template_found_by_label() {
        let props = schema()
            .template_properties("ProcessedAlignedReadsTemplate")
            .unwrap();
        assert_eq!(props.len(), 4);
    }

    #[test]
    fn unknown_template() {
        assert!(schema().template_properties("bts:Nope").is_err());
    }
}
