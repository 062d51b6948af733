use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::common::error::{MergeError, Result};

/// One proxy node as produced for sing-box.
///
/// Only `tag` is interpreted; the rest of the object is carried into the
/// output document untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    body: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    pub fn tag(&self) -> Option<&str> {
        self.body.get("tag").and_then(Value::as_str)
    }

    pub fn node_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

impl TryFrom<Value> for NodeRecord {
    type Error = MergeError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(body) => Ok(Self { body }),
            other => Err(MergeError::Subscription(format!(
                "node record must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// Parse a producer response into node records.
///
/// Accepted shapes are a sing-box document (`{"outbounds": [...]}`) and a
/// bare array of outbounds. Non-object entries are dropped; entries without
/// a tag are kept so the caller can decide what to do with them.
pub fn parse_node_list(content: &str) -> Result<Vec<NodeRecord>> {
    let root: Value = serde_json::from_str(content).map_err(|e| {
        MergeError::Subscription(format!(
            "expected a sing-box JSON document or a JSON array of outbounds: {}",
            e
        ))
    })?;

    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("outbounds") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(MergeError::Subscription(format!(
                    "'outbounds' must be an array, got {}",
                    json_type_name(&other)
                )))
            }
            None => {
                return Err(MergeError::Subscription(
                    "node list object has no 'outbounds' array".into(),
                ))
            }
        },
        other => {
            return Err(MergeError::Subscription(format!(
                "unexpected node list root: {}",
                json_type_name(&other)
            )))
        }
    };

    let total = items.len();
    let nodes: Vec<NodeRecord> = items
        .into_iter()
        .filter_map(|item| NodeRecord::try_from(item).ok())
        .collect();
    if nodes.len() != total {
        tracing::warn!(
            dropped = total - nodes.len(),
            "node list contained non-object entries"
        );
    }
    Ok(nodes)
}

/// Drop records whose tag was already seen. Untagged records pass through.
pub fn dedup_nodes(mut nodes: Vec<NodeRecord>) -> Vec<NodeRecord> {
    let mut seen = HashSet::new();
    nodes.retain(|n| match n.tag() {
        Some(tag) => seen.insert(tag.to_string()),
        None => true,
    });
    nodes
}

pub(crate) fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
