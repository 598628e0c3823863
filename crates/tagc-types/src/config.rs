//! Effective per-template settings seen by the code generator.

use serde::{Deserialize, Serialize};

/// Page-level settings after compile options and page directives are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Generated class name.
    pub class_name: String,
    /// Superclass of the generated class.
    pub extends: String,
    pub imports: Vec<String>,
    pub content_type: Option<String>,
    pub info: Option<String>,
    pub error_page: Option<String>,
    pub is_error_page: bool,
    pub session: bool,
    /// Output buffer size in bytes; 0 disables buffering.
    pub buffer: u32,
    pub auto_flush: bool,
    /// Reuse structurally identical handler instances.
    pub recycle_tags: bool,
    /// Treat `${}` as literal text.
    pub el_ignored: bool,
    /// Reject scriptlets, declarations and runtime expressions.
    pub scripting_invalid: bool,
    /// Accept `#{}` as literal text where no deferred value is expected.
    pub deferred_syntax_allowed_as_literal: bool,
    /// Drop whitespace-only template text.
    pub trim_whitespace: bool,
    /// Compiling a tag file or fragment-like unit: skip-page throws instead of returning.
    pub is_tag_file: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            class_name: "_tpl.index__tpl".into(),
            extends: "tagc.rt.TemplatePage".into(),
            imports: Vec::new(),
            content_type: None,
            info: None,
            error_page: None,
            is_error_page: false,
            session: true,
            buffer: 8192,
            auto_flush: true,
            recycle_tags: true,
            el_ignored: false,
            scripting_invalid: false,
            deferred_syntax_allowed_as_literal: false,
            trim_whitespace: false,
            is_tag_file: false,
        }
    }
}

impl PageConfig {
    /// Package part of the class name, if any.
    pub fn package(&self) -> Option<&str> {
        self.class_name.rsplit_once('.').map(|(pkg, _)| pkg)
    }

    /// Unqualified class name.
    pub fn simple_class_name(&self) -> &str {
        self.class_name
            .rsplit_once('.')
            .map(|(_, name)| name)
            .unwrap_or(&self.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_parts() {
        let config = PageConfig {
            class_name: "_tpl.shop.cart__tpl".into(),
            ..PageConfig::default()
        };
        assert_eq!(config.package(), Some("_tpl.shop"));
        assert_eq!(config.simple_class_name(), "cart__tpl");

        let bare = PageConfig {
            class_name: "Page".into(),
            ..PageConfig::default()
        };
        assert_eq!(bare.package(), None);
        assert_eq!(bare.simple_class_name(), "Page");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PageConfig = serde_json::from_str(r#"{"el_ignored":true}"#).unwrap();
        assert!(config.el_ignored);
        assert!(config.recycle_tags);
        assert_eq!(config.buffer, 8192);
    }
}
