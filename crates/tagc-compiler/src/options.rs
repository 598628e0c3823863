//! Compile options supplied by the host.

use serde::{Deserialize, Serialize};
use tagc_types::PageConfig;

/// Host-level defaults. Page directives override the page-visible ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Fully qualified name of the generated class.
    pub class_name: String,
    pub extends: String,
    pub imports: Vec<String>,
    pub buffer: u32,
    pub auto_flush: bool,
    pub session: bool,
    /// Share handler instances between structurally identical occurrences.
    pub recycle_tags: bool,
    /// Compile built-in control elements inline instead of through handlers.
    pub fast_builtins: bool,
    pub el_ignored: bool,
    pub scripting_invalid: bool,
    pub deferred_syntax_allowed_as_literal: bool,
    pub trim_whitespace: bool,
    pub is_tag_file: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        let page = PageConfig::default();
        Self {
            class_name: page.class_name,
            extends: page.extends,
            imports: page.imports,
            buffer: page.buffer,
            auto_flush: page.auto_flush,
            session: page.session,
            recycle_tags: page.recycle_tags,
            fast_builtins: true,
            el_ignored: page.el_ignored,
            scripting_invalid: page.scripting_invalid,
            deferred_syntax_allowed_as_literal: page.deferred_syntax_allowed_as_literal,
            trim_whitespace: page.trim_whitespace,
            is_tag_file: page.is_tag_file,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Page configuration before any directive is applied.
    pub fn page_config(&self) -> PageConfig {
        PageConfig {
            class_name: self.class_name.clone(),
            extends: self.extends.clone(),
            imports: self.imports.clone(),
            buffer: self.buffer,
            auto_flush: self.auto_flush,
            session: self.session,
            recycle_tags: self.recycle_tags,
            el_ignored: self.el_ignored,
            scripting_invalid: self.scripting_invalid,
            deferred_syntax_allowed_as_literal: self.deferred_syntax_allowed_as_literal,
            trim_whitespace: self.trim_whitespace,
            is_tag_file: self.is_tag_file,
            ..PageConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = CompileOptions::from_json(r#"{ "class_name": "app.Home", "recycle_tags": false }"#).unwrap();
        assert_eq!(options.class_name, "app.Home");
        assert!(!options.recycle_tags);
        assert!(options.fast_builtins);
        assert_eq!(options.buffer, 8192);
    }

    #[test]
    fn test_page_config_carries_flags() {
        let options = CompileOptions {
            scripting_invalid: true,
            trim_whitespace: true,
            ..CompileOptions::default()
        };
        let config = options.page_config();
        assert!(config.scripting_invalid);
        assert!(config.trim_whitespace);
        assert_eq!(config.extends, "tagc.rt.TemplatePage");
        assert_eq!(config.content_type, None);
    }
}
