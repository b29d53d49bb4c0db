use indexmap::IndexMap;

use super::*;

// Accumulates procedures for one `Program`. Nested bodies (`REPEAT`,
// per-individual loops) are collected on a stack.
pub struct IRBuilder {
    backend: Backend,
    procedures: Vec<Procedure>,
    current: Option<Procedure>,
    nested: Vec<Vec<Instruction>>,
    blocks: IndexMap<String, String>,
    globals: Vec<String>,
}

impl IRBuilder {
    pub fn new(backend: Backend) -> Self {
        IRBuilder {
            backend,
            procedures: Vec::new(),
            current: None,
            nested: Vec::new(),
            blocks: IndexMap::new(),
            globals: Vec::new(),
        }
    }

    pub fn declare_global(&mut self, name: &str) {
        if !self.globals.iter().any(|g| g == name) {
            self.globals.push(name.to_string());
        }
    }

    // Records `procedure` as the one that runs `block`.
    pub fn bind_block(&mut self, block: &str, procedure: &str) {
        self.blocks.insert(block.to_string(), procedure.to_string());
    }

    pub fn begin_procedure(&mut self, name: String, params: Vec<String>) {
        self.end_procedure();
        self.current = Some(Procedure {
            name,
            params,
            body: Vec::new(),
        });
    }

    pub fn end_procedure(&mut self) {
        if let Some(procedure) = self.current.take() {
            self.procedures.push(procedure);
        }
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        debug_assert!(
            self.current.is_some(),
            "instruction added outside a procedure: {instruction:?}"
        );
        if let Some(body) = self.nested.last_mut() {
            body.push(instruction);
        } else if let Some(procedure) = &mut self.current {
            procedure.body.push(instruction);
        }
    }

    pub fn begin_nested(&mut self) {
        self.nested.push(Vec::new());
    }

    pub fn end_nested(&mut self) -> Vec<Instruction> {
        self.nested.pop().unwrap_or_default()
    }

    pub fn finish(mut self, entry: String) -> Program {
        self.end_procedure();
        Program {
            backend: self.backend,
            procedures: self.procedures,
            entry,
            blocks: self.blocks,
            globals: self.globals,
        }
    }
}
