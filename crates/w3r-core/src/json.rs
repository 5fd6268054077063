use serde_json::{Map, Value, json};

use crate::model::{AttributeNode, NodeKind, Scalar};

#[derive(Clone, Copy)]
pub struct JsonOpts {
    pub max_children: usize,
    pub max_depth: usize,
    pub bytes_summary: bool,
}

impl Default for JsonOpts {
    fn default() -> Self {
        Self {
            max_children: 128,
            max_depth: 16,
            bytes_summary: true,
        }
    }
}

/// Dump a variable tree as JSON. Groups become `{"$name", "$children": [...]}`
/// so repeated names and ordering survive.
pub fn tree_to_json_value(node: &AttributeNode, opts: JsonOpts) -> Value {
    write_node(node, 0, &opts)
}

fn write_node(node: &AttributeNode, depth: usize, opts: &JsonOpts) -> Value {
    let mut map = Map::new();
    map.insert("$name".to_string(), json!(node.name));
    match &node.kind {
        NodeKind::Leaf { type_name, value } => {
            map.insert("$type".to_string(), json!(type_name));
            let v = value
                .as_ref()
                .map(|v| scalar_to_json(v, opts))
                .unwrap_or(Value::Null);
            map.insert("value".to_string(), v);
        }
        NodeKind::Group { children } => {
            let max = opts.max_children.min(children.len());
            let mut arr = Vec::with_capacity(max + 1);
            for c in children.iter().take(max) {
                if depth >= opts.max_depth {
                    arr.push(Value::Null);
                } else {
                    arr.push(write_node(c, depth + 1, opts));
                }
            }
            if children.len() > max {
                arr.push(json!({"$truncated": true, "$omitted": children.len() - max}));
            }
            map.insert("$children".to_string(), Value::Array(arr));
        }
    }
    Value::Object(map)
}

fn scalar_to_json(v: &Scalar, opts: &JsonOpts) -> Value {
    match v {
        Scalar::Bool(b) => json!(*b),
        Scalar::Int(x) => json!(*x),
        Scalar::UInt(x) => json!(*x),
        Scalar::Float(x) => json!(*x),
        Scalar::Str(s) => json!(s),
        Scalar::Guid(g) => json!(g.to_string()),
        Scalar::Bytes(b) => {
            if opts.bytes_summary {
                json!({"$type": "bytes", "len": b.len()})
            } else {
                json!(v.to_string())
            }
        }
    }
}
