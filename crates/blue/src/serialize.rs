//! Serialization of syntax trees and resolved graphs.
//!
//! [`serialize`] writes a [`Node`] back out as JSON or YAML such that parsing
//! the output yields an equal tree. [`serialize_graph`] renders a
//! [`ResolvedGraph`] as a single type document whose `types` are keyed by
//! qualified name; the output parses and elaborates again.

use std::{collections::HashMap, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{
    Serialize, Serializer,
    ser::{Error as _, SerializeMap, SerializeSeq},
};
use serde_json::{Map, Value};
use thiserror::Error;

use blue_core::{Reference, TypeNode};
use blue_parser::{Node, NodeKind, is_identifier};

use crate::graph::ResolvedGraph;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for Format {
    type Err = SerializeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => Err(SerializeError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unknown format `{0}`, expected `json` or `yaml`")]
    UnknownFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serialize a syntax tree.
///
/// JSON output is pretty-printed. JSON cannot represent infinities or NaN,
/// so trees containing them serialize only as YAML.
///
/// # Examples
///
/// ```
/// use blue::serialize::{Format, serialize};
///
/// let node = blue_parser::parse_node("a: [1, two]").unwrap();
/// assert_eq!(serialize(&node, Format::Yaml).unwrap(), "a:\n- 1\n- two\n");
/// ```
pub fn serialize(node: &Node, format: Format) -> Result<String, SerializeError> {
    let tree = Tree {
        node,
        strict_floats: format == Format::Json,
    };
    match format {
        Format::Json => {
            let mut out = serde_json::to_string_pretty(&tree)?;
            out.push('\n');
            Ok(out)
        }
        Format::Yaml => Ok(serde_yaml::to_string(&tree)?),
    }
}

/// Serialize a resolved graph as a type document.
///
/// Definitions are keyed by qualified name, with `.` written as `_` so that
/// every key is an identifier; references are renamed to match.
pub fn serialize_graph(graph: &ResolvedGraph, format: Format) -> Result<String, SerializeError> {
    let value = graph_value(graph);
    match format {
        Format::Json => {
            let mut out = serde_json::to_string_pretty(&value)?;
            out.push('\n');
            Ok(out)
        }
        Format::Yaml => Ok(serde_yaml::to_string(&value)?),
    }
}

fn graph_value(graph: &ResolvedGraph) -> Value {
    let names = export_names(graph);

    let mut types = Map::new();
    for def in graph.types() {
        let renamed = def.node.try_map_references(&mut |reference: &Reference| {
            let name = names
                .get(reference.target.as_str())
                .cloned()
                .unwrap_or_else(|| reference.target.clone());
            Ok::<_, std::convert::Infallible>(TypeNode::Reference(Reference::new(name)))
        });
        let node = match renamed {
            Ok(node) => node,
            Err(never) => match never {},
        };
        let key = names
            .get(def.qualified.as_str())
            .cloned()
            .unwrap_or_else(|| def.qualified.clone());
        types.insert(key, node.to_value());
    }

    let mut out = Map::new();
    if let Some(name) = graph.root_document().name() {
        out.insert("name".to_string(), Value::String(name.to_string()));
    }
    out.insert("types".to_string(), Value::Object(types));
    Value::Object(out)
}

/// Identifier-safe, unique names for every definition.
fn export_names(graph: &ResolvedGraph) -> HashMap<&str, String> {
    let mut taken: IndexMap<String, ()> = IndexMap::new();
    let mut names = HashMap::new();
    for def in graph.types() {
        let base: String = def
            .qualified
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let base = if is_identifier(&base) { base } else { format!("_{base}") };
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains_key(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        taken.insert(name.clone(), ());
        names.insert(def.qualified.as_str(), name);
    }
    names
}

struct Tree<'a> {
    node: &'a Node,
    strict_floats: bool,
}

impl Tree<'_> {
    fn child<'c>(&self, node: &'c Node) -> Tree<'c> {
        Tree {
            node,
            strict_floats: self.strict_floats,
        }
    }
}

impl Serialize for Tree<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.node.kind() {
            NodeKind::Null => serializer.serialize_unit(),
            NodeKind::Bool(b) => serializer.serialize_bool(*b),
            NodeKind::Integer(i) => serializer.serialize_i64(*i),
            NodeKind::Float(f) => {
                if self.strict_floats && !f.is_finite() {
                    return Err(S::Error::custom(format!("{f} has no JSON representation")));
                }
                serializer.serialize_f64(*f)
            }
            NodeKind::String(s) => serializer.serialize_str(s),
            NodeKind::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            NodeKind::Mapping(mapping) => {
                let mut map = serializer.serialize_map(Some(mapping.len()))?;
                for entry in mapping.iter() {
                    map.serialize_entry(entry.key.inner(), &self.child(&entry.value))?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use blue_parser::parse_node;

    use super::*;

    #[test]
    fn test_json_output() {
        let node = parse_node("b: 1\na: [true, null, 1.5, x]\n").unwrap();
        assert_eq!(
            serialize(&node, Format::Json).unwrap(),
            "{\n  \"b\": 1,\n  \"a\": [\n    true,\n    null,\n    1.5,\n    \"x\"\n  ]\n}\n"
        );
    }

    #[test]
    fn test_yaml_quotes_ambiguous_strings() {
        let node = parse_node("a: \"true\"\nb: \"12\"\nc: \"\"\n").unwrap();
        let yaml = serialize(&node, Format::Yaml).unwrap();
        assert_eq!(parse_node(&yaml).unwrap(), node);
    }

    #[test]
    fn test_non_finite_floats() {
        let node = parse_node("a: .inf\nb: .nan\n").unwrap();
        assert!(serialize(&node, Format::Json).is_err());
        let yaml = serialize(&node, Format::Yaml).unwrap();
        assert_eq!(parse_node(&yaml).unwrap(), node);
    }

    #[test]
    fn test_multiline_strings() {
        let node = parse_node("text: |\n  line one\n  line two\n").unwrap();
        for format in [Format::Json, Format::Yaml] {
            let out = serialize(&node, format).unwrap();
            assert_eq!(parse_node(&out).unwrap(), node, "{format}: {out}");
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("YAML".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("yml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert!("toml".parse::<Format>().is_err());
    }
}
