use thiserror::Error;
use tracing::{debug, info};

use crate::ast::Ast;
use crate::config::ConfigError;
use crate::diagnostics::{self, Diagnostic};
use crate::emit::{self, EmitOptions};
use crate::ir::{IRValidator, Program};
use crate::model::{BuildError, ModelBuilder, System, Validator};
use crate::parser::parse;
use crate::runtime::ExecutionContext;
use crate::validation::validate_ast;

#[cfg(test)]
pub mod test;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("emission refused: the definition has {errors} error(s)")]
    Refused { errors: usize },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("emitted program is inconsistent: {}", .0.join("; "))]
    InvalidProgram(Vec<String>),
}

// A compiled definition with every diagnostic found along the way.
#[derive(Debug)]
pub struct Compilation {
    pub ast: Ast,
    pub system: System,
    // Sorted and deduplicated.
    pub diagnostics: Vec<Diagnostic>,
}

// Compiles `source`. Validation always runs to the end so the
// diagnostics are complete. Only a misused builder fails outright.
pub fn compile<I, S>(source: &str, externals: I) -> Result<Compilation, CompileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ast = parse(source);
    validate_ast(&mut ast);
    let system = ModelBuilder::new(externals).build(&ast)?;

    let mut diagnostics = ast.errors.clone();
    diagnostics.extend(Validator::validate(&system));
    diagnostics::normalise(&mut diagnostics);

    info!(
        blocks = system.blocks.len(),
        errors = diagnostics::errors(&diagnostics).count(),
        warnings = diagnostics::warnings(&diagnostics).count(),
        "compiled definition"
    );
    Ok(Compilation {
        ast,
        system,
        diagnostics,
    })
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        diagnostics::has_errors(&self.diagnostics)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        diagnostics::errors(&self.diagnostics)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        diagnostics::warnings(&self.diagnostics)
    }

    // Emits the program. Any hard error refuses emission; warnings do not.
    pub fn emit(&self, options: &EmitOptions) -> Result<(Program, ExecutionContext), CompileError> {
        let errors = self.errors().count();
        if errors > 0 {
            return Err(CompileError::Refused { errors });
        }
        let (program, context) = emit::emit(&self.system, options);
        IRValidator::validate_program(&program, |helper| context.contains(helper))
            .map_err(CompileError::InvalidProgram)?;
        debug!(helpers = program.helpers().len(), "program checked");
        Ok((program, context))
    }
}
