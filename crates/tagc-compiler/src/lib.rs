//! tagc compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! Document → Page directives → Validation → Dependencies → Code generation → Java source
//! ```

mod depend;
mod directives;
mod options;
mod validate;

pub use depend::{source_dependencies, source_digest};
pub use directives::page_config;
pub use options::CompileOptions;
pub use validate::validate;

use serde::{Deserialize, Serialize};
use tagc_codegen::{generate, CodegenInput, CompiledUnit, Dependency, InstanceSummary, LineMap};
use tagc_types::{BuiltinTable, Document, Introspector, TemplateError};

/// JSON envelope for hosts that talk to the compiler over a string boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub class_name: Option<String>,
    pub source: Option<String>,
    pub error: Option<TemplateError>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub line_map: Option<LineMap>,
    #[serde(default)]
    pub instances: Vec<InstanceSummary>,
}

impl CompileResult {
    fn from_unit(unit: CompiledUnit) -> Self {
        Self {
            success: true,
            class_name: Some(unit.class_name),
            source: Some(unit.source),
            error: None,
            dependencies: unit.dependencies,
            line_map: Some(unit.line_map),
            instances: unit.instances,
        }
    }

    fn from_error(error: TemplateError) -> Self {
        Self {
            success: false,
            class_name: None,
            source: None,
            error: Some(error),
            dependencies: Vec::new(),
            line_map: None,
            instances: Vec::new(),
        }
    }
}

/// Compile one template tree into the source of its compiled unit.
///
/// Stops at the first violation; nothing is produced on failure.
pub fn compile(
    doc: &Document,
    library: &dyn Introspector,
    options: &CompileOptions,
) -> Result<CompiledUnit, TemplateError> {
    let span = tracing::info_span!("tagc.compile", file = doc.files().first().map(|f| f.name.as_str()).unwrap_or(""));
    let _guard = span.enter();

    // 1. Page directives
    let config = page_config(doc, options)?;

    // 2. Validation
    let empty = BuiltinTable::empty();
    let builtins = if options.fast_builtins {
        BuiltinTable::standard()
    } else {
        &empty
    };
    validate(doc, library, builtins, &config)?;

    // 3. Dependencies
    let dependencies = source_dependencies(doc);

    // 4. Code generation
    let unit = generate(CodegenInput {
        document: doc,
        library,
        builtins,
        config: &config,
        dependencies,
    })
    .map_err(|e| e.into_template_error())?;

    tracing::info!(
        class = %unit.class_name,
        instances = unit.instances.len(),
        fragments = unit.fragments,
        "compiled template"
    );
    Ok(unit)
}

/// [`compile`], with the outcome wrapped in a serializable [`CompileResult`].
pub fn compile_to_result(doc: &Document, library: &dyn Introspector, options: &CompileOptions) -> CompileResult {
    match compile(doc, library, options) {
        Ok(unit) => CompileResult::from_unit(unit),
        Err(error) => {
            tracing::debug!(code = %error.code, "compilation failed");
            CompileResult::from_error(error)
        }
    }
}

/// Run directives and validation only, without generating source.
pub fn check(doc: &Document, library: &dyn Introspector, options: &CompileOptions) -> Result<(), TemplateError> {
    let config = page_config(doc, options)?;
    let empty = BuiltinTable::empty();
    let builtins = if options.fast_builtins {
        BuiltinTable::standard()
    } else {
        &empty
    };
    validate(doc, library, builtins, &config)
}
