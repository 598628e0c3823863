//! Integration tests for the shared types: building trees, JSON exchange
//! with a host, and handler metadata checks.

use tagc_types::{
    AttributeInfo, Document, DocumentBuilder, ErrorCategory, ErrorCode, HandlerKind, HandlerType, Introspector,
    LibraryError, Lifecycle, NodeKind, Primitive, SourceFile, TagLibrary, TargetType, TemplateError, VariableInfo,
    VariableScope,
};

const SOURCE: &str = "<p>\n<x:rows count=\"3\" var=\"i\">\n  ${i}\n</x:rows>\n</p>\n";

fn page() -> Document {
    let mut b = DocumentBuilder::new(SourceFile::new("rows.tpl", SOURCE));
    b.text("<p>\n", 1);
    b.open_element("x:rows", "urn:demo", &[("count", "3"), ("var", "i")], 2);
    b.text("\n  ", 2);
    b.expression("${i}", 3);
    b.text("\n", 3);
    b.close(4).unwrap();
    b.text("\n</p>\n", 4);
    b.finish().unwrap()
}

fn library() -> TagLibrary {
    TagLibrary::new().with(
        "x:rows",
        HandlerType::classic("demo.RowsTag")
            .with_attribute(AttributeInfo::new("count", TargetType::Primitive(Primitive::Int)).required())
            .with_attribute(AttributeInfo::new("var", TargetType::String).literal_only())
            .with_variable(VariableInfo::from_attribute(
                "var",
                TargetType::Boxed(Primitive::Int),
                VariableScope::Nested,
            ))
            .with_lifecycle(Lifecycle::iteration()),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Document
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_tree_shape_and_order() {
    let doc = page();
    let top = doc.children(doc.root());
    assert_eq!(top.len(), 3);
    let rows = top[1];
    assert!(matches!(doc.kind(rows), NodeKind::Element(_)));
    assert_eq!(doc.children(rows).len(), 3);

    let descendants = doc.descendants(doc.root());
    assert_eq!(descendants.len(), doc.len() - 1);
    assert_eq!(descendants[0], top[0]);
    assert_eq!(descendants[1], rows);

    let expr = doc.children(rows)[1];
    assert_eq!(doc.parent(expr), Some(rows));
    assert_eq!(doc.enclosing_element(expr), Some(rows));
}

#[test]
fn test_error_points_at_source_line() {
    let doc = page();
    let rows = doc.children(doc.root())[1];
    let err = doc.error(rows, ErrorCode::UNKNOWN_ELEMENT, "no handler");
    assert_eq!(err.file, "rows.tpl");
    assert_eq!(err.span.start_line, 2);
    assert_eq!(err.span.end_line, 4);
    assert!(err.excerpt.contains("x:rows"));
    assert_eq!(err.category, ErrorCategory::Reference);
}

#[test]
fn test_document_json_round_trip() {
    let doc = page();
    let back = Document::from_json(&doc.to_json()).unwrap();
    assert_eq!(back.len(), doc.len());
    assert_eq!(back.to_json(), doc.to_json());
    assert_eq!(back.files()[0].name, "rows.tpl");
}

#[test]
fn test_document_json_rejects_garbage() {
    assert!(Document::from_json("{\"files\": 3}").is_err());
    assert!(Document::from_json("not json").is_err());
}

#[test]
fn test_scripting_is_found_below_a_node() {
    let mut b = DocumentBuilder::named("s.tpl");
    let el = b.open_element("x:box", "urn:demo", &[], 1);
    b.open_body(1);
    let script = b.scriptlet("i++;", 2);
    b.close(3).unwrap();
    b.close(3).unwrap();
    let doc = b.finish().unwrap();
    assert_eq!(doc.find_scripting(el), Some(script));
    assert!(doc.kind(script).is_scripting());
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_error_categories_follow_code_ranges() {
    assert_eq!(ErrorCode::MULTIPLE_BODIES.category(), ErrorCategory::Structural);
    assert_eq!(ErrorCode::MALFORMED_EXPRESSION.category(), ErrorCategory::Expression);
    assert_eq!(ErrorCode::NO_SETTER.category(), ErrorCategory::Reference);
    assert_eq!(ErrorCode::CONFLICTING_DIRECTIVE.category(), ErrorCategory::Consistency);
    assert_eq!(ErrorCode::INTERNAL.category(), ErrorCategory::Internal);
    assert_eq!(ErrorCode::NO_SETTER.to_string(), "E301");
}

#[test]
fn test_error_json_round_trip() {
    let doc = page();
    let err = doc
        .error(doc.children(doc.root())[1], ErrorCode::MISSING_REQUIRED_ATTRIBUTE, "x:rows requires 'count'")
        .with_suggestion("add count=\"...\"");
    let json = serde_json::to_string(&err).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["code"], 102);
    assert_eq!(value["category"], "structural");
    let back: TemplateError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}

// ══════════════════════════════════════════════════════════════════════════════
// Tag library
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_library_json_round_trip() {
    let library = library();
    let back = TagLibrary::from_json(&library.to_json()).unwrap();
    assert_eq!(back, library);
    let rows = back.get("x:rows").unwrap();
    assert_eq!(rows.kind, HandlerKind::Classic);
    assert!(rows.lifecycle.after_returns_again);
}

#[test]
fn test_library_json_defaults() {
    let json = r#"{ "x:hello": { "class_name": "demo.HelloTag", "attributes": [ { "name": "name" } ] } }"#;
    let library = TagLibrary::from_json(json).unwrap();
    let hello = library.get("x:hello").unwrap();
    assert_eq!(hello.lifecycle, Lifecycle::tag());
    let name = hello.attribute("name").unwrap();
    assert_eq!(name.target, TargetType::String);
    assert!(name.rtexpr);
    assert_eq!(name.setter_name(), "setName");
}

#[test]
fn test_library_check_rejects_dangling_variable() {
    let library = TagLibrary::new().with(
        "x:rows",
        HandlerType::classic("demo.RowsTag").with_variable(VariableInfo::from_attribute(
            "var",
            TargetType::Object,
            VariableScope::Nested,
        )),
    );
    let err = library.check().unwrap_err();
    assert!(matches!(err, LibraryError::InvalidHandler { ref qname, .. } if qname == "x:rows"));
}

#[test]
fn test_library_check_rejects_duplicate_attribute() {
    let library = TagLibrary::new().with(
        "x:a",
        HandlerType::simple("demo.A")
            .with_attribute(AttributeInfo::new("v", TargetType::String))
            .with_attribute(AttributeInfo::new("v", TargetType::Object)),
    );
    assert!(library.check().is_err());
}

#[test]
fn test_setter_resolution() {
    let library = library().with(
        "x:any",
        HandlerType::simple("demo.AnyTag")
            .with_attribute(AttributeInfo::new("fixed", TargetType::String).read_only())
            .with_dynamic_attributes(),
    );
    let rows = library.handler("x:rows").unwrap();
    let count = library.setter(rows, "count").unwrap();
    assert_eq!(count.method, "setCount");
    assert_eq!(count.target, TargetType::Primitive(Primitive::Int));
    assert!(library.setter(rows, "missing").is_none());

    let any = library.handler("x:any").unwrap();
    assert!(library.setter(any, "fixed").is_none());
    assert!(library.setter(any, "whatever").unwrap().is_dynamic());
}

#[test]
fn test_target_type_names() {
    assert_eq!(TargetType::parse("int").unwrap(), TargetType::Primitive(Primitive::Int));
    assert_eq!(TargetType::parse("Long").unwrap(), TargetType::Boxed(Primitive::Long));
    assert_eq!(TargetType::parse("JspFragment").unwrap(), TargetType::Fragment);
    assert_eq!(
        TargetType::parse("demo.Money").unwrap(),
        TargetType::Class("demo.Money".into())
    );
    assert!(TargetType::parse("not a type").is_err());
    assert_eq!(TargetType::MethodExpression.class_name(), "javax.el.MethodExpression");
}
