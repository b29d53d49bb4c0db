use indexmap::IndexMap;
use tracing::{debug, info, trace};

use super::*;
use crate::ast::{INIT_BLOCK_NAME, Literal, Operator};
use crate::ir::{Instruction, Procedure, Target, Value};

type Frame = IndexMap<String, Object>;

// Runs a `Program` against a host. Module-level state lives in
// `globals` and survives between blocks.
pub struct Interpreter<'p, H: Host> {
    program: &'p Program,
    context: ExecutionContext,
    host: H,
    globals: IndexMap<String, Object>,
    selector: Vec<String>,
    next: usize,
}

impl<'p, H: Host> Interpreter<'p, H> {
    pub fn new(program: &'p Program, context: ExecutionContext, host: H) -> Self {
        let globals = program
            .globals
            .iter()
            .map(|name| (name.clone(), Object::Null))
            .collect();
        let selector = program
            .blocks
            .keys()
            .filter(|name| name.as_str() != INIT_BLOCK_NAME)
            .cloned()
            .collect();
        Interpreter {
            program,
            context,
            host,
            globals,
            selector,
            next: 0,
        }
    }

    pub fn set_global(&mut self, name: &str, value: Object) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Object> {
        self.globals.get(name)
    }

    pub fn globals(&self) -> &IndexMap<String, Object> {
        &self.globals
    }

    // Blocks run by `Interpreter::step`, in order. Defaults to every
    // named block.
    pub fn set_selector(&mut self, selector: Vec<String>) {
        self.selector = selector;
        self.next = 0;
    }

    pub fn run_init(&mut self) -> Result<(), RuntimeError> {
        info!("running initialisation block");
        let entry = self.program.entry.clone();
        self.invoke(&entry, vec![])?;
        Ok(())
    }

    pub fn run_block(&mut self, name: &str) -> Result<(), RuntimeError> {
        let procedure = self
            .program
            .blocks
            .get(name)
            .ok_or_else(|| RuntimeError::MissingBlock(name.to_string()))?
            .clone();
        info!(block = name, "running block");
        self.invoke(&procedure, vec![])?;
        Ok(())
    }

    // Runs the next block chosen by the selector and returns its name.
    pub fn step(&mut self) -> Result<Option<String>, RuntimeError> {
        if self.selector.is_empty() {
            return Ok(None);
        }
        let name = self.selector[self.next % self.selector.len()].clone();
        self.next = (self.next + 1) % self.selector.len();
        self.run_block(&name)?;
        Ok(Some(name))
    }

    pub fn host(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn invoke(&mut self, name: &str, args: Vec<Object>) -> Result<Vec<Object>, RuntimeError> {
        let program = self.program;
        let procedure: &Procedure = program
            .procedure(name)
            .ok_or_else(|| RuntimeError::MissingProcedure(name.to_string()))?;
        debug!(procedure = name, args = args.len(), "invoke");

        let mut frame: Frame = procedure.params.iter().cloned().zip(args).collect();
        for param in &procedure.params {
            frame.entry(param.clone()).or_insert(Object::Null);
        }
        Ok(self.execute(&procedure.body, &mut frame)?.unwrap_or_default())
    }

    // Returns `Some` once a `Return` has run.
    fn execute(
        &mut self,
        body: &[Instruction],
        frame: &mut Frame,
    ) -> Result<Option<Vec<Object>>, RuntimeError> {
        for inst in body {
            trace!("{}", inst.to_string().trim_end());
            match inst {
                Instruction::Comment(_) | Instruction::Declare(_) => {}
                Instruction::Assign { target, value } => {
                    let value = self.evaluate(value, frame)?;
                    self.store(target, value, frame);
                }
                Instruction::Expr(value) => {
                    self.evaluate(value, frame)?;
                }
                Instruction::Repeat { count, body } => {
                    let count = self.evaluate(count, frame)?;
                    let range = self.helper(Helper::Range, vec![count])?;
                    let range = iterate(&mut self.host, range)?;
                    while range.next_item().is_some() {
                        if let Some(values) = self.execute(body, frame)? {
                            return Ok(Some(values));
                        }
                    }
                }
                Instruction::ForEach { var, items, body } => {
                    let items = self.evaluate(items, frame)?;
                    let stream = iterate(&mut self.host, items)?;
                    while let Some(item) = stream.next_item() {
                        frame.insert(var.clone(), item);
                        if let Some(values) = self.execute(body, frame)? {
                            return Ok(Some(values));
                        }
                    }
                }
                Instruction::SetEvaluator {
                    individual,
                    evaluator,
                } => {
                    let evaluator = self.evaluate(evaluator, frame)?;
                    let individual = frame
                        .get(individual)
                        .ok_or_else(|| RuntimeError::Undefined(individual.clone()))?;
                    self.host.set_evaluator(individual, &evaluator);
                }
                Instruction::Invoke {
                    procedure,
                    args,
                    results,
                } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.evaluate(arg, frame)?);
                    }
                    let returned = self.invoke(procedure, values)?;
                    for (target, value) in results.iter().zip(returned) {
                        self.store(target, value, frame);
                    }
                }
                Instruction::Return(values) => {
                    let mut returned = Vec::with_capacity(values.len());
                    for value in values {
                        returned.push(self.evaluate(value, frame)?);
                    }
                    return Ok(Some(returned));
                }
                Instruction::Pragma(text) => self.host.pragma(text),
                Instruction::Profile { event, label } => self.host.profile(*event, label),
            }
        }
        Ok(None)
    }

    fn store(&mut self, target: &Target, value: Object, frame: &mut Frame) {
        match target {
            Target::Global(name) => {
                self.globals.insert(name.clone(), value);
            }
            Target::Local(name) => {
                frame.insert(name.clone(), value);
            }
        }
    }

    fn helper(&mut self, helper: Helper, args: Vec<Object>) -> Result<Object, RuntimeError> {
        let function = self
            .context
            .get(helper)
            .ok_or(RuntimeError::MissingHelper(helper))?;
        function(&mut self.host, args)
    }

    fn evaluate(&mut self, value: &Value, frame: &Frame) -> Result<Object, RuntimeError> {
        match value {
            Value::Constant(Literal::Number(n)) => Ok(Object::Number(*n)),
            Value::Constant(Literal::Bool(b)) => Ok(Object::Bool(*b)),
            Value::Constant(Literal::Null) => Ok(Object::Null),
            Value::Str(s) => Ok(Object::Str(s.clone())),
            Value::Global(name) => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(name.clone())),
            Value::Local(name) => frame
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(name.clone())),
            Value::Call { function, args } => {
                let function = match self.evaluate(function, frame)? {
                    Object::Function(name) => name,
                    other => return Err(RuntimeError::NotCallable(other.to_string())),
                };
                // the stream being transformed is produced before the
                // operator's own parameters
                let mut values: Vec<Option<Object>> = vec![None; args.len()];
                let order = args
                    .iter()
                    .enumerate()
                    .filter(|(_, (name, _))| name == "_source")
                    .chain(args.iter().enumerate().filter(|(_, (name, _))| name != "_source"));
                for (i, (_, arg)) in order {
                    values[i] = Some(self.evaluate(arg, frame)?);
                }
                let args = args
                    .iter()
                    .zip(values)
                    .map(|((name, _), value)| (name.clone(), value.unwrap_or_default()))
                    .collect();
                self.host.call(&function, args)
            }
            Value::Helper { helper, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, frame)?);
                }
                self.helper(*helper, values)
            }
            Value::Attrib { source, attrib } => {
                let source = self.evaluate(source, frame)?;
                self.host.attribute(&source, attrib)
            }
            Value::Index { source, index } => {
                let source = self.evaluate(source, frame)?;
                let index = self.evaluate(index, frame)?;
                self.host.index(&source, &index)
            }
            Value::Unary { op, right } => {
                let right = self.evaluate(right, frame)?;
                unary(*op, right)
            }
            Value::Binary { left, op, right } => {
                let left = self.evaluate(left, frame)?;
                let right = self.evaluate(right, frame)?;
                binary(left, *op, right)
            }
        }
    }
}

fn numeric(value: &Object) -> Option<f64> {
    match value {
        Object::Number(n) => Some(*n),
        Object::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn type_error(op: Operator, operand: &Object) -> RuntimeError {
    RuntimeError::Type {
        operation: op.symbol().to_string(),
        operand: operand.type_name().to_string(),
    }
}

pub fn unary(op: Operator, right: Object) -> Result<Object, RuntimeError> {
    let n = numeric(&right).ok_or_else(|| type_error(op, &right))?;
    match op {
        Operator::Add => Ok(Object::Number(n)),
        Operator::Sub => Ok(Object::Number(-n)),
        _ => Err(type_error(op, &right)),
    }
}

// Arithmetic with floored modulo. Strings concatenate.
pub fn binary(left: Object, op: Operator, right: Object) -> Result<Object, RuntimeError> {
    if let (Object::Str(a), Object::Str(b), Operator::Add) = (&left, &right, op) {
        return Ok(Object::Str(format!("{a}{b}")));
    }
    let a = numeric(&left).ok_or_else(|| type_error(op, &left))?;
    let b = numeric(&right).ok_or_else(|| type_error(op, &right))?;
    let n = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div if b == 0.0 => return Err(RuntimeError::DivisionByZero),
        Operator::Div => a / b,
        Operator::Mod if b == 0.0 => return Err(RuntimeError::DivisionByZero),
        Operator::Mod => a - b * (a / b).floor(),
        Operator::Pow => a.powf(b),
    };
    Ok(Object::Number(n))
}
