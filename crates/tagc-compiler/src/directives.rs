//! Page directives merged into the effective page configuration.
//!
//! A setting may appear any number of times as long as every occurrence
//! agrees; `import` accumulates instead. `taglib` and `include` were already
//! resolved when the tree was built and are accepted without effect.

use std::collections::BTreeMap;

use tagc_types::{Document, ErrorCode, NodeId, NodeKind, PageConfig, TemplateError};

use crate::options::CompileOptions;

/// Apply every `page` directive of `doc` on top of `options`.
pub fn page_config(doc: &Document, options: &CompileOptions) -> Result<PageConfig, TemplateError> {
    let mut config = options.page_config();
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut last_page = doc.root();

    for id in doc.descendants(doc.root()) {
        let NodeKind::Directive(name) = doc.kind(id) else {
            continue;
        };
        match name.as_str() {
            "page" => {
                last_page = id;
                for attr in &doc.node(id).attributes {
                    if attr.name != "import" {
                        if let Some(previous) = seen.get(&attr.name) {
                            if *previous != attr.value {
                                return Err(doc.error(
                                    id,
                                    ErrorCode::CONFLICTING_DIRECTIVE,
                                    format!(
                                        "page setting '{}' is \"{}\" here but \"{previous}\" earlier",
                                        attr.name, attr.value
                                    ),
                                ));
                            }
                            continue;
                        }
                        seen.insert(attr.name.clone(), attr.value.clone());
                    }
                    apply(doc, id, &mut config, &attr.name, &attr.value)?;
                }
            }
            "taglib" | "include" => {}
            other => {
                return Err(doc.error(
                    id,
                    ErrorCode::UNKNOWN_DIRECTIVE,
                    format!("unknown directive '{other}'"),
                ));
            }
        }
    }

    if !config.auto_flush && config.buffer == 0 {
        return Err(doc.error(
            last_page,
            ErrorCode::CONFLICTING_DIRECTIVE,
            "autoFlush=\"false\" requires a buffer",
        ));
    }
    tracing::debug!(class = %config.class_name, settings = seen.len(), "page configuration resolved");
    Ok(config)
}

fn apply(
    doc: &Document,
    id: NodeId,
    config: &mut PageConfig,
    name: &str,
    value: &str,
) -> Result<(), TemplateError> {
    let flag = || parse_bool(doc, id, name, value);
    match name {
        "contentType" => config.content_type = Some(value.to_string()),
        "buffer" => config.buffer = parse_buffer(doc, id, value)?,
        "autoFlush" => config.auto_flush = flag()?,
        "session" => config.session = flag()?,
        "errorPage" => config.error_page = Some(value.to_string()),
        "isErrorPage" => config.is_error_page = flag()?,
        "info" => config.info = Some(value.to_string()),
        "extends" => config.extends = value.to_string(),
        "import" => {
            for import in value.split(',').map(str::trim).filter(|i| !i.is_empty()) {
                if !config.imports.iter().any(|i| i == import) {
                    config.imports.push(import.to_string());
                }
            }
        }
        "isELIgnored" => config.el_ignored = flag()?,
        "deferredSyntaxAllowedAsLiteral" => config.deferred_syntax_allowed_as_literal = flag()?,
        "trimDirectiveWhitespaces" => config.trim_whitespace = flag()?,
        "language" => {
            if value != "java" {
                return Err(doc.error(
                    id,
                    ErrorCode::INVALID_ATTRIBUTE_VALUE,
                    format!("unsupported page language '{value}'"),
                ));
            }
        }
        "pageEncoding" | "isThreadSafe" => {}
        other => {
            return Err(doc.error(
                id,
                ErrorCode::UNKNOWN_DIRECTIVE,
                format!("unknown page setting '{other}'"),
            ));
        }
    }
    Ok(())
}

fn parse_bool(doc: &Document, id: NodeId, name: &str, value: &str) -> Result<bool, TemplateError> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(doc.error(
            id,
            ErrorCode::INVALID_ATTRIBUTE_VALUE,
            format!("page setting '{name}' must be true or false, not \"{value}\""),
        )),
    }
}

/// `none` or a size in kilobytes such as `8kb`.
fn parse_buffer(doc: &Document, id: NodeId, value: &str) -> Result<u32, TemplateError> {
    let value = value.trim();
    if value == "none" {
        return Ok(0);
    }
    value
        .strip_suffix("kb")
        .and_then(|n| n.trim().parse::<u32>().ok())
        .and_then(|kb| kb.checked_mul(1024))
        .ok_or_else(|| {
            doc.error(
                id,
                ErrorCode::INVALID_ATTRIBUTE_VALUE,
                format!("buffer must be \"none\" or a size like \"8kb\", not \"{value}\""),
            )
        })
}
