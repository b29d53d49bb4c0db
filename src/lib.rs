pub mod ast;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod ir;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod runtime;
pub mod validation;

pub use compiler::{Compilation, CompileError, compile};
