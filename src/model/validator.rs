use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::diagnostics::{Diagnostic, ErrorKind, Location, normalise};
use crate::model::*;

// Parameters the compiler passes itself and the user may name.
const CALL_PARAMETERS: &[&str] = &["_function"];
const OPERATOR_PARAMETERS: &[&str] = &["_function", "_source"];

// Model-level checks. Never mutates the system it reads.
pub struct Validator<'s> {
    system: &'s System,
    diagnostics: Vec<Diagnostic>,
    // Locals written by an assignment or a store, with the first write.
    written: IndexMap<VarId, (Location, ErrorKind)>,
    read: IndexSet<String>,
}

impl<'s> Validator<'s> {
    pub fn new(system: &'s System) -> Self {
        Validator {
            system,
            diagnostics: vec![],
            written: IndexMap::new(),
            read: IndexSet::new(),
        }
    }

    // Validates `system`, returning its diagnostics sorted by
    // `(line, code, message)` without duplicates.
    pub fn validate(system: &System) -> Vec<Diagnostic> {
        let mut validator = Validator::new(system);
        for statements in system.blocks.values() {
            validator.statements(statements);
        }
        for &id in &system.constants {
            if system.var(id).kind == VariableKind::Constant(None) {
                validator.report_arg(
                    ErrorKind::UninitialisedConstant,
                    &system.var(id).location,
                    &system.var(id).name,
                );
            }
        }
        validator.unused();

        let mut diagnostics = validator.diagnostics;
        normalise(&mut diagnostics);
        debug!(diagnostics = diagnostics.len(), "validated semantic model");
        diagnostics
    }

    fn report(&mut self, kind: ErrorKind, location: &Location) {
        self.diagnostics.push(Diagnostic::new(kind, location.clone()));
    }

    fn report_arg(&mut self, kind: ErrorKind, location: &Location, arg: &str) {
        self.diagnostics
            .push(Diagnostic::with_arg(kind, location.clone(), arg));
    }

    fn statements(&mut self, statements: &[Statement]) {
        for stmt in statements {
            match stmt {
                Statement::Function(f) => self.function(f),
                Statement::Expression(e) => self.expression(e),
                Statement::Store(store) => {
                    self.group_list(&store.destinations, true);
                    self.stream(&store.source);
                }
                Statement::Eval(eval) => {
                    self.group_list(&eval.sources, false);
                    for evaluator in &eval.evaluators {
                        self.expression(evaluator);
                    }
                }
                Statement::Yield(y) => self.group_list(&y.sources, false),
                Statement::Repeat(repeat) => {
                    self.expression(&repeat.count);
                    self.statements(&repeat.statements);
                }
                Statement::Pragma { .. } => {}
            }
        }
    }

    fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Variable(v) => {
                self.variable(v.id, &v.location);
                self.read.insert(self.system.var(v.id).name.clone());
            }
            Expression::Unary { right, .. } => self.expression(right),
            Expression::Binary { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Expression::Function(f) => self.function(f),
        }
    }

    fn variable(&mut self, id: VarId, location: &Location) {
        let system = self.system;
        let var = system.var(id);
        match &var.kind {
            VariableKind::External => {
                if !system.externals.contains_key(&var.name) {
                    self.report_arg(ErrorKind::UninitialisedGlobal, location, &var.name);
                }
            }
            VariableKind::Constant(_) => {}
            VariableKind::Local => {
                if !system.variables.contains_key(&var.name) {
                    self.report_arg(ErrorKind::UninitialisedVariable, location, &var.name);
                }
                if system.blocks.contains_key(&var.name) {
                    self.report_arg(ErrorKind::AmbiguousVariableBlockName, location, &var.name);
                }
            }
        }

        if var.name.starts_with('_') {
            self.report_arg(ErrorKind::InternalVariableName, location, &var.name);
        } else if !var.is_constant() && !is_identifier(&var.name) {
            self.report_arg(ErrorKind::InvalidVariable, location, &var.name);
        }
    }

    fn parameters(&mut self, parameters: &[Parameter], allowed: &[&str]) {
        let mut seen = IndexSet::new();
        for param in parameters {
            if !seen.insert(param.name.as_str()) {
                self.report_arg(ErrorKind::RepeatedParameterName, &param.location, &param.name);
            }
            if param.name.starts_with('_') && !allowed.contains(&param.name.as_str()) {
                self.report_arg(ErrorKind::InternalParameterName, &param.location, &param.name);
            }
            match &param.value {
                Some(value) => self.expression(value),
                // `name` alone reads the variable of the same name
                None => {
                    self.read.insert(param.name.clone());
                }
            }
        }
    }

    fn function(&mut self, function: &Function) {
        match function {
            Function::Call(call) => {
                self.parameters(&call.parameters, CALL_PARAMETERS);
                self.expression(&call.function);
            }
            Function::GetAttrib { source, .. } => self.expression(source),
            Function::GetIndex {
                source,
                index,
                location,
            } => {
                match index {
                    Some(index) => self.expression(index),
                    None => self.report(ErrorKind::ExpectedIndex, location),
                }
                self.expression(source);
            }
            Function::Assign {
                destination,
                source,
                location,
            } => {
                self.expression(source);
                match destination {
                    Expression::Variable(v) if self.system.var(v.id).kind == VariableKind::Local => {
                        self.variable(v.id, &v.location);
                        self.written
                            .entry(v.id)
                            .or_insert((v.location.clone(), ErrorKind::UnusedVariable));
                    }
                    _ => self.report(ErrorKind::InvalidAssignment, location),
                }
            }
        }
    }

    fn operator(&mut self, call: &Call) {
        self.parameters(&call.parameters, OPERATOR_PARAMETERS);
        match &call.function {
            Expression::Variable(v) => {
                self.variable(v.id, &v.location);
                self.read.insert(self.system.var(v.id).name.clone());
            }
            Expression::Function(f) => self.function(f),
            other => self.report(ErrorKind::InvalidFunctionCall, other.location()),
        }
    }

    fn stream(&mut self, stream: &Stream) {
        match stream {
            Stream::Merge(list) | Stream::Join(list) => self.group_list(list, false),
            Stream::Operator { source, call } => {
                self.operator(call);
                self.stream(source);
            }
        }
    }

    // `writes` marks the groups as destinations rather than reads.
    fn group_list(&mut self, list: &GroupList, writes: bool) {
        let rules = list.rules;
        let mut seen_unlimited = false;
        let mut seen = IndexSet::new();
        for item in &list.items {
            let limit = match item {
                GroupItem::Group(g) => g.limit.as_ref(),
                GroupItem::Generator(_) => None,
            };
            if rules.allow_sizes {
                if seen_unlimited {
                    let text = self.item_text(item);
                    self.report_arg(ErrorKind::InaccessibleGroup, item.location(), &text);
                }
                seen_unlimited |= limit.is_none();
                if let Some(limit) = limit {
                    self.expression(limit);
                }
            } else if let Some(limit) = limit {
                self.expression(limit);
                let text = self.item_text(item);
                self.report_arg(ErrorKind::UnexpectedGroupSize, item.location(), &text);
            }

            match item {
                GroupItem::Group(group) => {
                    let system = self.system;
                    let name = &system.var(group.id).name;
                    self.group(group);
                    if let Some(kind) = rules.repeats {
                        if !seen.insert(name.clone()) {
                            self.report_arg(kind, &group.location, name);
                        }
                    }
                    if writes {
                        self.written
                            .entry(group.id)
                            .or_insert((group.location.clone(), ErrorKind::UnusedGroup));
                    } else {
                        self.read.insert(name.clone());
                    }
                }
                GroupItem::Generator(function) => {
                    if rules.allow_functions {
                        match function {
                            Function::Call(call) => self.operator(call),
                            other => self.function(other),
                        }
                    } else {
                        self.report(ErrorKind::GeneratorAsDestination, function.location());
                    }
                }
            }
        }
    }

    fn group(&mut self, group: &GroupRef) {
        let system = self.system;
        let name = &system.var(group.id).name;
        if system.externals.contains_key(name) {
            self.report_arg(ErrorKind::AmbiguousGroupGeneratorName, &group.location, name);
        } else if !system.variables.contains_key(name) {
            self.report_arg(ErrorKind::InvalidGroup, &group.location, name);
        }
        if system.blocks.contains_key(name) {
            self.report_arg(ErrorKind::AmbiguousVariableBlockName, &group.location, name);
        }
    }

    fn item_text(&self, item: &GroupItem) -> String {
        match item {
            GroupItem::Group(g) => self.system.var(g.id).name.clone(),
            GroupItem::Generator(f) => self.system.function_text(f),
        }
    }

    // Locals written somewhere but never read anywhere.
    fn unused(&mut self) {
        let written = std::mem::take(&mut self.written);
        let system = self.system;
        for (id, (location, kind)) in written {
            let name = &system.var(id).name;
            if !self.read.contains(name) {
                self.report_arg(kind, &location, name);
            }
        }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}
