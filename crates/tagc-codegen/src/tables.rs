//! Per-unit constant tables: evaluator slots and shared text constants.
//!
//! Registration is idempotent: identical text (and, for carriers, the same
//! expected type) always maps back to the slot it got the first time.

use std::collections::HashMap;

use crate::escape::java_string;
use crate::runtime::{EXPRESSION_FACTORY, INIT, METHOD_EXPRESSION, RT_EXPR, RT_PAGE, VALUE_EXPRESSION};
use crate::writer::JavaWriter;

/// What a slot holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Immediate expression evaluated in place.
    Expr,
    /// Deferred value carrier with its expected type.
    Value { expected: String },
    /// Deferred method carrier with return and parameter types.
    Method { returns: String, params: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    pub text: String,
    /// Field name in the generated class.
    pub name: String,
}

#[derive(Debug, Default)]
pub struct ConstantTables {
    slots: Vec<Slot>,
    slot_index: HashMap<(SlotKind, String), usize>,
    expr_count: usize,
    value_count: usize,
    method_count: usize,
    strings: Vec<String>,
    string_index: HashMap<String, usize>,
}

impl ConstantTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register expression text; returns the slot's field name.
    pub fn slot(&mut self, kind: SlotKind, text: &str) -> String {
        let key = (kind, text.to_string());
        if let Some(&idx) = self.slot_index.get(&key) {
            return self.slots[idx].name.clone();
        }
        let name = match &key.0 {
            SlotKind::Expr => {
                self.expr_count += 1;
                format!("_tpl_expr_{}", self.expr_count - 1)
            }
            SlotKind::Value { .. } => {
                self.value_count += 1;
                format!("_tpl_value_expr_{}", self.value_count - 1)
            }
            SlotKind::Method { .. } => {
                self.method_count += 1;
                format!("_tpl_method_expr_{}", self.method_count - 1)
            }
        };
        self.slots.push(Slot {
            kind: key.0.clone(),
            text: key.1.clone(),
            name: name.clone(),
        });
        self.slot_index.insert(key, self.slots.len() - 1);
        name
    }

    /// Intern template text; returns the `char[]` constant's name.
    pub fn string(&mut self, text: &str) -> String {
        let idx = match self.string_index.get(text) {
            Some(&idx) => idx,
            None => {
                self.strings.push(text.to_string());
                self.string_index.insert(text.to_string(), self.strings.len() - 1);
                self.strings.len() - 1
            }
        };
        format!("_tpl_string_{idx}")
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    /// Slot fields and the `_tpl_init(factory)` method that fills them.
    pub fn emit_slots(&self, out: &mut JavaWriter) {
        out.blank();
        for slot in &self.slots {
            let class = match slot.kind {
                SlotKind::Expr => RT_EXPR,
                SlotKind::Value { .. } => VALUE_EXPRESSION,
                SlotKind::Method { .. } => METHOD_EXPRESSION,
            };
            out.println(&format!("private static {class} {};", slot.name));
        }

        out.blank();
        out.println(&format!("public void {INIT}({EXPRESSION_FACTORY} factory)"));
        out.open("");
        for slot in &self.slots {
            let text = java_string(&slot.text);
            let init = match &slot.kind {
                SlotKind::Expr => format!("{RT_EXPR}.create(factory, {text})"),
                SlotKind::Value { expected } => format!(
                    "factory.createValueExpression({RT_PAGE}.parseContext(), {text}, {expected}.class)"
                ),
                SlotKind::Method { returns, params } => {
                    let params: Vec<String> = params.iter().map(|p| format!("{p}.class")).collect();
                    format!(
                        "factory.createMethodExpression({RT_PAGE}.parseContext(), {text}, {returns}.class, new java.lang.Class[] {{{}}})",
                        params.join(", ")
                    )
                }
            };
            out.println(&format!("{} = {init};", slot.name));
        }
        out.close("");
    }

    /// Shared `char[]` constants for template text.
    pub fn emit_strings(&self, out: &mut JavaWriter) {
        if self.strings.is_empty() {
            return;
        }
        out.blank();
        for (idx, text) in self.strings.iter().enumerate() {
            out.println(&format!(
                "private static final char[] _tpl_string_{idx} = {}.toCharArray();",
                java_string(text)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_deduplicated_per_kind() {
        let mut tables = ConstantTables::new();
        assert_eq!(tables.slot(SlotKind::Expr, "${a}"), "_tpl_expr_0");
        assert_eq!(tables.slot(SlotKind::Expr, "${b}"), "_tpl_expr_1");
        assert_eq!(tables.slot(SlotKind::Expr, "${a}"), "_tpl_expr_0");
        let value = SlotKind::Value {
            expected: "java.lang.Object".into(),
        };
        assert_eq!(tables.slot(value.clone(), "${a}"), "_tpl_value_expr_0");
        assert_eq!(tables.slot(value, "${a}"), "_tpl_value_expr_0");
        assert_eq!(tables.slots().len(), 3);
    }

    #[test]
    fn strings_are_interned() {
        let mut tables = ConstantTables::new();
        assert_eq!(tables.string("hello"), "_tpl_string_0");
        assert_eq!(tables.string("world"), "_tpl_string_1");
        assert_eq!(tables.string("hello"), "_tpl_string_0");
        assert_eq!(tables.strings().len(), 2);
    }

    #[test]
    fn emits_init_method() {
        let mut tables = ConstantTables::new();
        tables.slot(SlotKind::Expr, "${user.name}");
        tables.slot(
            SlotKind::Method {
                returns: "java.lang.String".into(),
                params: vec![],
            },
            "#{bean.save}",
        );
        let mut w = JavaWriter::new();
        tables.emit_slots(&mut w);
        let (text, _) = w.finish();
        assert!(text.contains("private static tagc.rt.Expr _tpl_expr_0;"));
        assert!(text.contains("_tpl_expr_0 = tagc.rt.Expr.create(factory, \"${user.name}\");"));
        assert!(text.contains("new java.lang.Class[] {}"));
    }
}
