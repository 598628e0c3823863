//! End-to-end pipeline tests: directives → validation → dependencies →
//! code generation, the JSON result envelope and determinism.

use tagc_compiler::{check, compile, compile_to_result, source_digest, CompileOptions, CompileResult};
use tagc_codegen::Dependency;
use tagc_types::{
    AttributeInfo, BodyContent, Document, DocumentBuilder, HandlerType, Lifecycle, Primitive, SourceFile,
    TagLibrary, TargetType, VariableInfo, VariableScope, CORE_URI,
};

// ══════════════════════════════════════════════════════════════════════════════
// Fixtures
// ══════════════════════════════════════════════════════════════════════════════

const X: &str = "urn:demo";

fn library() -> TagLibrary {
    TagLibrary::new()
        .with(
            "x:hello",
            HandlerType::classic("demo.HelloTag")
                .with_attribute(AttributeInfo::new("name", TargetType::String))
                .with_body_content(BodyContent::Empty)
                .with_lifecycle(Lifecycle::empty_tag()),
        )
        .with(
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
        .with(
            "x:panel",
            HandlerType::simple("demo.PanelTag")
                .with_attribute(AttributeInfo::new("title", TargetType::String)),
        )
        .with(
            "c:out",
            HandlerType::classic("demo.OutTag")
                .with_attribute(AttributeInfo::new("value", TargetType::Object).required())
                .with_attribute(AttributeInfo::new("escapeXml", TargetType::Primitive(Primitive::Boolean)))
                .with_attribute(AttributeInfo::new("default", TargetType::Object))
                .with_lifecycle(Lifecycle::empty_tag()),
        )
}

/// A list page: directive, text, a loop with a nested panel, and a greeting.
fn list_page() -> Document {
    let mut b = DocumentBuilder::new(SourceFile::new(
        "list.tpl",
        "<%@ page contentType=\"text/html\" %>\n<ul>\n<x:rows count=\"${n}\" var=\"i\">\n<x:panel title=\"Row ${i}\"><x:hello name=\"${i}\"/></x:panel>\n</x:rows>\n<x:hello name=\"done\"/>\n</ul>\n",
    ));
    b.directive("page", &[("contentType", "text/html")], 1);
    b.text("\n<ul>\n", 1);
    b.open_element("x:rows", X, &[("count", "${n}"), ("var", "i")], 3);
    b.text("\n", 3);
    b.open_element("x:panel", X, &[("title", "Row ${i}")], 4);
    b.empty_element("x:hello", X, &[("name", "${i}")], 4);
    b.close(4).unwrap();
    b.text("\n", 4);
    b.close(5).unwrap();
    b.text("\n", 5);
    b.empty_element("x:hello", X, &[("name", "done")], 6);
    b.text("\n</ul>\n", 6);
    b.finish().unwrap()
}

fn options() -> CompileOptions {
    CompileOptions {
        class_name: "app.List".into(),
        ..CompileOptions::default()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// 1. End to end
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn list_page_compiles_end_to_end() {
    let unit = compile(&list_page(), &library(), &options()).unwrap();
    let src = &unit.source;

    assert_eq!(unit.class_name, "app.List");
    assert!(src.starts_with("package app;"));
    assert!(src.contains("public class List extends tagc.rt.TemplatePage"));
    assert!(src.contains("response.setContentType(\"text/html\");"));
    assert!(src.contains("_tpl_rows_0.setCount((int) _tpl_expr_0.evalLong(_tpl_env));"));
    assert!(src.contains("java.lang.Integer i = (java.lang.Integer) pageContext.findAttribute(\"i\");"));
    assert!(src.contains("private void _tpl_fragment_0(javax.servlet.jsp.JspWriter out)"));
    assert!(src.contains("_tpl_hello_2.setName(\"done\");"));
}

#[test]
fn page_directive_settings_reach_the_unit() {
    let mut b = DocumentBuilder::named("index.tpl");
    b.directive("page", &[("import", "java.util.*"), ("session", "false")], 1);
    b.directive("page", &[("info", "Demo page")], 2);
    b.text("hi", 3);
    let unit = compile(&b.finish().unwrap(), &library(), &options()).unwrap();
    assert!(unit.source.contains("import java.util.*;"));
    assert!(unit.source.contains("return \"Demo page\";"));
    assert!(!unit.source.contains("javax.servlet.http.HttpSession session"));
}

#[test]
fn dependencies_start_with_source_digest() {
    let doc = list_page();
    let unit = compile(&doc, &library(), &options()).unwrap();
    let Dependency::Path { path, digest } = &unit.dependencies[0] else {
        panic!("first dependency should be the source file");
    };
    assert_eq!(path, "list.tpl");
    assert_eq!(*digest, source_digest(&doc.files()[0].source));
    let classes: Vec<&Dependency> = unit.dependencies[1..].iter().collect();
    assert_eq!(classes.len(), 3);
    assert!(unit.source.contains(&format!("new tagc.rt.PathDependency(\"list.tpl\", \"{digest}\")")));
}

#[test]
fn check_runs_without_generating() {
    assert!(check(&list_page(), &library(), &options()).is_ok());
    let mut b = DocumentBuilder::named("index.tpl");
    b.empty_element("x:rows", X, &[], 1);
    assert!(check(&b.finish().unwrap(), &library(), &options()).is_err());
}

// ══════════════════════════════════════════════════════════════════════════════
// 2. Instance reuse across the pipeline
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn siblings_share_handler_unless_scripting_intervenes() {
    let mut b = DocumentBuilder::named("index.tpl");
    b.empty_element("x:hello", X, &[("name", "a")], 1);
    b.empty_element("x:hello", X, &[("name", "b")], 2);
    b.empty_element("x:hello", X, &[("name", "c")], 3);
    let shared = compile(&b.finish().unwrap(), &library(), &options()).unwrap();
    assert_eq!(shared.instances.len(), 1);
    assert_eq!(shared.instances[0].occurrences, 3);
    assert_eq!(shared.source.matches("new demo.HelloTag()").count(), 1);
    assert_eq!(shared.source.matches("_tpl_state.get_tpl_hello_0(").count(), 1);
    assert_eq!(shared.source.matches("_tpl_hello_0.setName(").count(), 3);

    let mut b = DocumentBuilder::named("index.tpl");
    b.empty_element("x:hello", X, &[("name", "a")], 1);
    b.scriptlet("counter++;", 2);
    b.empty_element("x:hello", X, &[("name", "b")], 3);
    let split = compile(&b.finish().unwrap(), &library(), &options()).unwrap();
    assert_eq!(split.instances.len(), 2);
    assert_eq!(split.source.matches("new demo.HelloTag()").count(), 2);
    assert_eq!(split.source.matches("_tpl_state.get_tpl_hello_1(").count(), 1);
}

#[test]
fn recycle_tags_option_disables_reuse() {
    let mut b = DocumentBuilder::named("index.tpl");
    b.empty_element("x:hello", X, &[("name", "a")], 1);
    b.empty_element("x:hello", X, &[("name", "a")], 2);
    let options = CompileOptions {
        recycle_tags: false,
        ..options()
    };
    let unit = compile(&b.finish().unwrap(), &library(), &options).unwrap();
    assert_eq!(unit.instances.len(), 2);
}

// ══════════════════════════════════════════════════════════════════════════════
// 3. Built-in fast path vs generic handler
// ══════════════════════════════════════════════════════════════════════════════

fn out_page(attrs: &[(&str, &str)]) -> Document {
    let mut b = DocumentBuilder::named("index.tpl");
    b.empty_element("c:out", CORE_URI, attrs, 1);
    b.finish().unwrap()
}

#[test]
fn out_escapes_by_default_on_both_paths() {
    let doc = out_page(&[("value", "${user.name}")]);
    let fast = compile(&doc, &library(), &options()).unwrap();
    let generic = compile(
        &doc,
        &library(),
        &CompileOptions {
            fast_builtins: false,
            ..options()
        },
    )
    .unwrap();

    // Fast path escapes unless told otherwise; the handler's own default
    // applies on the generic path because no escapeXml setter is called.
    assert!(fast
        .source
        .contains("tagc.rt.Out.print(out, _tpl_expr_0.evalObject(_tpl_env), true);"));
    assert!(generic.source.contains("_tpl_out_0.setValue(_tpl_expr_0.evalObject(_tpl_env));"));
    assert!(!generic.source.contains("setEscapeXml"));
    assert!(fast.instances.is_empty());
    assert_eq!(generic.instances.len(), 1);
}

#[test]
fn out_explicit_escape_flag_matches_on_both_paths() {
    let doc = out_page(&[("value", "${html}"), ("escapeXml", "false")]);
    let fast = compile(&doc, &library(), &options()).unwrap();
    let generic = compile(
        &doc,
        &library(),
        &CompileOptions {
            fast_builtins: false,
            ..options()
        },
    )
    .unwrap();
    assert!(fast.source.contains("tagc.rt.Out.print(out, _tpl_expr_0.evalObject(_tpl_env), false);"));
    assert!(generic.source.contains("_tpl_out_0.setEscapeXml(false);"));
}

// ══════════════════════════════════════════════════════════════════════════════
// 4. Structured result
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn success_result_serializes_to_json() {
    let result = compile_to_result(&list_page(), &library(), &options());
    assert!(result.success);
    let json = serde_json::to_string(&result).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["class_name"], "app.List");
    assert!(parsed["error"].is_null());
    assert_eq!(parsed["dependencies"][0]["kind"], "path");
    assert_eq!(parsed["dependencies"][1]["kind"], "create");
    assert!(parsed["line_map"]["entries"].is_array());
}

#[test]
fn failure_result_carries_located_error() {
    let mut b = DocumentBuilder::named("broken.tpl");
    b.text("a\n", 1);
    b.empty_element("x:missing", X, &[], 2);
    let result = compile_to_result(&b.finish().unwrap(), &library(), &options());
    assert!(!result.success);
    assert!(result.source.is_none());

    let parsed = serde_json::to_value(&result).unwrap();
    assert_eq!(parsed["error"]["file"], "broken.tpl");
    assert_eq!(parsed["error"]["code"], 300);
    assert_eq!(parsed["error"]["category"], "reference");
    assert_eq!(parsed["error"]["line"], 2);
}

#[test]
fn compile_result_json_roundtrip() {
    let result = compile_to_result(&list_page(), &library(), &options());
    let json = serde_json::to_string(&result).unwrap();
    let rt: CompileResult = serde_json::from_str(&json).unwrap();
    assert_eq!(rt, result);
}

#[test]
fn document_and_library_json_roundtrip() {
    let doc = Document::from_json(&list_page().to_json()).unwrap();
    let library = TagLibrary::from_json(&library().to_json()).unwrap();
    let direct = compile(&list_page(), &self::library(), &options()).unwrap();
    let via_json = compile(&doc, &library, &options()).unwrap();
    assert_eq!(direct.source, via_json.source);
}

#[test]
fn options_json_roundtrip() {
    let options = CompileOptions {
        fast_builtins: false,
        imports: vec!["java.util.*".into()],
        ..options()
    };
    assert_eq!(CompileOptions::from_json(&options.to_json()).unwrap(), options);
}

// ══════════════════════════════════════════════════════════════════════════════
// 5. Line map
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn line_map_points_setters_at_template_lines() {
    let unit = compile(&list_page(), &library(), &options()).unwrap();
    let line = unit
        .source
        .lines()
        .position(|l| l.contains("_tpl_hello_2.setName(\"done\");"))
        .unwrap() as u32
        + 1;
    assert_eq!(unit.line_map.lookup(line), Some(("list.tpl", 6)));
}

// ══════════════════════════════════════════════════════════════════════════════
// 6. Determinism across the full pipeline
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn full_pipeline_determinism_100_iterations() {
    let reference = compile(&list_page(), &library(), &options()).unwrap();
    for i in 0..100 {
        let unit = compile(&list_page(), &library(), &options()).unwrap();
        assert_eq!(unit, reference, "compiled unit differs at iteration {i}");
    }
}
