//! Helpers for extracting values from KDL nodes.
//!
//! Most fields may be written either as a property (`host="10.0.0.2"`) or as
//! a child node (`host "10.0.0.2"`); [`field`] checks both.

use kdl::{KdlDocument, KdlNode, KdlValue};
use serde_json::{Map, Number, Value};

/// First positional argument, if it is a string.
pub fn first_string_arg(node: &KdlNode) -> Option<String> {
    first_arg(node).and_then(|v| v.as_string()).map(|s| s.to_string())
}

/// First positional argument of any type.
pub fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// All positional arguments.
pub fn args(node: &KdlNode) -> Vec<&KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect()
}

pub fn all_string_args(node: &KdlNode) -> Vec<String> {
    args(node)
        .into_iter()
        .filter_map(|v| v.as_string())
        .map(|s| s.to_string())
        .collect()
}

pub fn prop<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().map(|n| n.value() == name).unwrap_or(false))
        .last()
        .map(|e| e.value())
}

pub fn child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()
        .and_then(|doc| doc.nodes().iter().filter(|n| n.name().value() == name).last())
}

pub fn children_named<'a>(node: &'a KdlNode, name: &'a str) -> impl Iterator<Item = &'a KdlNode> + 'a {
    node.children()
        .into_iter()
        .flat_map(|doc| doc.nodes().iter())
        .filter(move |n| n.name().value() == name)
}

/// Value of a field given as property or as first argument of a child node.
pub fn field<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    prop(node, name).or_else(|| child(node, name).and_then(first_arg))
}

/// Render a scalar as a string. Integers and booleans are accepted where a
/// string is expected, so `version 1` and `version "1"` mean the same.
pub fn scalar_string(value: &KdlValue) -> Option<String> {
    if let Some(s) = value.as_string() {
        return Some(s.to_string());
    }
    if let Some(i) = value.as_integer() {
        return Some(i.to_string());
    }
    value.as_bool().map(|b| b.to_string())
}

pub fn is_null(value: &KdlValue) -> bool {
    matches!(value, KdlValue::Null)
}

/// Describe a value's type for error messages.
pub fn type_name(value: &KdlValue) -> &'static str {
    match value {
        KdlValue::String(_) => "string",
        KdlValue::Integer(_) => "integer",
        KdlValue::Float(_) => "float",
        KdlValue::Bool(_) => "boolean",
        KdlValue::Null => "null",
    }
}

/// Child nodes as `name -> scalar string` pairs, in document order.
pub fn string_pairs(node: &KdlNode) -> Vec<(String, Option<String>)> {
    node.children()
        .map(|doc| {
            doc.nodes()
                .iter()
                .map(|n| {
                    (
                        n.name().value().to_string(),
                        first_arg(n).and_then(scalar_string),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn to_json(value: &KdlValue) -> Value {
    match value {
        KdlValue::String(s) => Value::String(s.clone()),
        KdlValue::Integer(i) => i64::try_from(*i)
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(i.to_string())),
        KdlValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        KdlValue::Bool(b) => Value::Bool(*b),
        KdlValue::Null => Value::Null,
    }
}

/// Convert a KDL document into a free-form JSON object.
///
/// A node becomes a key. Its value is an object when it has properties or
/// children, a scalar for one argument, an array for several, and `true`
/// for a bare node. Repeated keys: the last one wins.
pub fn document_to_json(doc: &KdlDocument) -> Map<String, Value> {
    let mut map = Map::new();
    for node in doc.nodes() {
        map.insert(node.name().value().to_string(), node_to_json(node));
    }
    map
}

fn node_to_json(node: &KdlNode) -> Value {
    let props: Vec<_> = node
        .entries()
        .iter()
        .filter_map(|e| e.name().map(|n| (n.value().to_string(), to_json(e.value()))))
        .collect();

    if !props.is_empty() || node.children().is_some() {
        let mut object = node.children().map(document_to_json).unwrap_or_default();
        object.extend(props);
        return Value::Object(object);
    }

    let mut values: Vec<Value> = args(node).into_iter().map(to_json).collect();
    match values.len() {
        0 => Value::Bool(true),
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}
