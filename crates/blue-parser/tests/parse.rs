//! End-to-end tests for the parsing pipeline through the public API.

use blue_core::TypeNode;
use blue_parser::{ErrorCode, ImportRef, Location, NodeKind, Origin, parse, parse_bytes, parse_node};

fn memory(label: &str) -> Origin {
    Origin::Memory(label.to_string())
}

#[test]
fn test_yaml_and_json_documents_elaborate_equally() {
    let yaml = parse(
        "name: geo\n\
         types:\n\
         \x20 Point:\n\
         \x20   fields:\n\
         \x20     x: Number\n\
         \x20     y: Number\n\
         \x20 Path: [Point]\n",
        memory("geo.yaml"),
    )
    .unwrap();
    let json = parse(
        r#"{
  "name": "geo",
  "types": {
    "Point": {"fields": {"x": "Number", "y": "Number"}},
    "Path": ["Point"]
  }
}"#,
        memory("geo.json"),
    )
    .unwrap();

    assert_eq!(yaml.root(), json.root());
    assert_ne!(yaml.hash(), json.hash());
    for name in ["Point", "Path"] {
        assert_eq!(
            yaml.module().types[name].node,
            json.module().types[name].node
        );
    }
    assert_eq!(
        yaml.module().types["Path"].node,
        TypeNode::list(TypeNode::reference("Point"))
    );
}

#[test]
fn test_block_scalars_and_comments() {
    let doc = parse(
        "# shapes\n\
         description: |\n\
         \x20 Shapes used by the drawing service.\n\
         \x20 Coordinates are in pixels.\n\
         types: {} # none yet\n",
        memory("doc"),
    )
    .unwrap();
    assert_eq!(
        doc.module().description.as_deref(),
        Some("Shapes used by the drawing service.\nCoordinates are in pixels.\n")
    );
}

#[test]
fn test_syntax_error_location() {
    let err = parse("types:\n  A: Text\n  A: Integer\n", memory("dup.yaml")).unwrap_err();
    let diagnostic = &err.diagnostics()[0];
    assert_eq!(diagnostic.code(), Some(ErrorCode::E006));
    assert_eq!(diagnostic.location(), Some(Location { line: 3, column: 3 }));
    assert!(diagnostic.to_string().contains("dup.yaml:3:3"));
}

#[test]
fn test_all_errors_reported_together() {
    let err = parse(
        "types:\n  A: {fields: {x: 5}}\n  B: {union: []}\n  C: {ref: 7}\n",
        memory("bad.yaml"),
    )
    .unwrap_err();
    let codes: Vec<_> = err.diagnostics().iter().filter_map(|d| d.code()).collect();
    assert_eq!(codes, vec![ErrorCode::E102; 3]);
}

#[test]
fn test_import_forms() {
    let doc = parse(
        "imports:\n  local: ../shared/base.yaml\n  remote: https://types.example.com/v1/geo.json\n",
        memory("root"),
    )
    .unwrap();
    let imports = &doc.module().imports;
    assert_eq!(imports.len(), 2);
    assert!(matches!(imports[0].reference.inner(), ImportRef::Path(p) if p == "../shared/base.yaml"));
    assert!(matches!(imports[1].reference.inner(), ImportRef::Url(u) if u.host_str() == Some("types.example.com")));
}

#[test]
fn test_parse_node_keeps_data_documents() {
    let node = parse_node("count: 3\nratio: 0.5\nok: true\nnothing: ~\n").unwrap();
    let mapping = node.as_mapping().unwrap();
    assert!(matches!(mapping.get("count").map(|n| n.kind()), Some(NodeKind::Integer(3))));
    assert!(matches!(mapping.get("ratio").map(|n| n.kind()), Some(NodeKind::Float(r)) if *r == 0.5));
    assert_eq!(mapping.get("ok").and_then(|n| n.as_bool()), Some(true));
    assert!(mapping.get("nothing").is_some_and(|n| n.is_null()));
}

#[test]
fn test_parse_bytes_rejects_invalid_utf8() {
    let err = parse_bytes(&[b'a', b':', b' ', 0xC3, 0x28], memory("bin")).unwrap_err();
    assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E001));
}
