use indexmap::IndexMap;
use thiserror::Error;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ir::{Helper, ProfileEvent, Program};

pub mod interpreter;

pub use interpreter::Interpreter;


#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("'{0}' is not defined")]
    Undefined(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("helper '{0}' is not available")]
    MissingHelper(Helper),
    #[error("procedure '{0}' is not defined")]
    MissingProcedure(String),
    #[error("block '{0}' is not defined")]
    MissingBlock(String),
    #[error("unsupported operand for {operation}: {operand}")]
    Type { operation: String, operand: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("'{0}' is not iterable")]
    NotIterable(String),
    #[error("{0}")]
    Host(String),
}

// Runtime value. Individuals are opaque to the compiler and identified
// by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Object {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Opaque(u64),
    List(Vec<Object>),
    Function(String),
    Stream(Stream),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Bool(_) => "bool",
            Object::Number(_) => "number",
            Object::Str(_) => "string",
            Object::Opaque(_) => "individual",
            Object::List(_) => "list",
            Object::Function(_) => "function",
            Object::Stream(_) => "stream",
        }
    }

    // `int(value or 0)`.
    pub fn as_count(&self) -> Result<usize, RuntimeError> {
        match self {
            Object::Null => Ok(0),
            Object::Bool(b) => Ok(usize::from(*b)),
            Object::Number(n) if n.is_finite() => Ok(n.max(0.0) as usize),
            other => Err(RuntimeError::Type {
                operation: "count".to_string(),
                operand: other.type_name().to_string(),
            }),
        }
    }

    pub fn as_list(&self) -> Option<&[Object]> {
        match self {
            Object::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => write!(f, "None"),
            Object::Bool(true) => write!(f, "True"),
            Object::Bool(false) => write!(f, "False"),
            Object::Number(n) => write!(f, "{:?}", n),
            Object::Str(s) => write!(f, "{:?}", s),
            Object::Opaque(id) => write!(f, "<individual {}>", id),
            Object::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Object::Function(name) => write!(f, "<function {}>", name),
            Object::Stream(_) => write!(f, "<stream>"),
        }
    }
}

// A lazily consumed sequence shared by every clone. Taking from one
// clone advances all of them.
#[derive(Clone)]
pub struct Stream {
    inner: Rc<RefCell<Box<dyn Iterator<Item = Object>>>>,
    // Items taken through `_islice`/`_rest` are passed to `Host::born`.
    pub born: bool,
}

impl Stream {
    pub fn new(iter: impl Iterator<Item = Object> + 'static) -> Self {
        Stream {
            inner: Rc::new(RefCell::new(Box::new(iter))),
            born: false,
        }
    }

    pub fn from_vec(items: Vec<Object>) -> Self {
        Stream::new(items.into_iter())
    }

    pub fn with_born(&self) -> Self {
        Stream {
            inner: Rc::clone(&self.inner),
            born: true,
        }
    }

    pub fn next_item(&self) -> Option<Object> {
        self.inner.borrow_mut().next()
    }

    pub fn take(&self, count: usize) -> Vec<Object> {
        let mut items = Vec::with_capacity(count.min(1024));
        while items.len() < count {
            match self.next_item() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    pub fn rest(&self) -> Vec<Object> {
        let mut items = vec![];
        while let Some(item) = self.next_item() {
            items.push(item);
        }
        items
    }
}

impl Iterator for Stream {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        self.next_item()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("born", &self.born).finish()
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) && self.born == other.born
    }
}

// Services supplied by whatever embeds the program: operators, evaluators
// and monitoring.
pub trait Host {
    fn call(&mut self, function: &str, args: Vec<(String, Object)>) -> Result<Object, RuntimeError>;

    fn on_yield(&mut self, name: &str, group: &Object);

    // `source.attrib`. Attributes of functions are functions.
    fn attribute(&mut self, source: &Object, attrib: &str) -> Result<Object, RuntimeError> {
        match source {
            Object::Function(name) => Ok(Object::Function(format!("{name}.{attrib}"))),
            other => Err(RuntimeError::Undefined(format!("{other}.{attrib}"))),
        }
    }

    fn index(&mut self, source: &Object, index: &Object) -> Result<Object, RuntimeError> {
        match (source, index) {
            (Object::List(items), Object::Number(n)) if *n >= 0.0 => items
                .get(*n as usize)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(format!("{source}[{index}]"))),
            _ => Err(RuntimeError::Type {
                operation: "index".to_string(),
                operand: source.type_name().to_string(),
            }),
        }
    }

    fn born(&mut self, individual: Object) -> Object {
        individual
    }

    // Turns an evaluator reference into an evaluator. Callables are
    // called with no arguments.
    fn evaluator(&mut self, evaluator: Object) -> Result<Object, RuntimeError> {
        match evaluator {
            Object::Function(name) => self.call(&name, vec![]),
            other => Ok(other),
        }
    }

    fn set_evaluator(&mut self, _individual: &Object, _evaluator: &Object) {}

    fn pragma(&mut self, _text: &str) {}

    fn profile(&mut self, _event: ProfileEvent, _label: &str) {}
}

pub type HelperFn = fn(&mut dyn Host, Vec<Object>) -> Result<Object, RuntimeError>;

// Maps reserved helper names to implementations. Programs never reach
// for ambient state; everything they call goes through here or the host.
#[derive(Clone)]
pub struct ExecutionContext {
    helpers: IndexMap<Helper, HelperFn>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        let mut context = ExecutionContext::empty();
        for helper in Helper::ALL {
            context.set(helper, default_helper(helper));
        }
        context
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.helpers.keys()).finish()
    }
}

impl ExecutionContext {
    pub fn empty() -> Self {
        ExecutionContext {
            helpers: IndexMap::new(),
        }
    }

    pub fn for_program(program: &Program) -> Self {
        let mut context = ExecutionContext::empty();
        for helper in program.helpers() {
            context.set(helper, default_helper(helper));
        }
        context
    }

    pub fn set(&mut self, helper: Helper, function: HelperFn) {
        self.helpers.insert(helper, function);
    }

    pub fn get(&self, helper: Helper) -> Option<HelperFn> {
        self.helpers.get(&helper).copied()
    }

    pub fn contains(&self, helper: Helper) -> bool {
        self.helpers.contains_key(&helper)
    }

    pub fn helpers(&self) -> impl Iterator<Item = Helper> + '_ {
        self.helpers.keys().copied()
    }
}

pub fn default_helper(helper: Helper) -> HelperFn {
    match helper {
        Helper::Iter | Helper::Merge => merge,
        Helper::Group => group,
        Helper::Join => join,
        Helper::Tuples => tuples,
        Helper::Range => range,
        Helper::Part => part,
        Helper::Evaluator => evaluator,
        Helper::Yield | Helper::OnYield => notify,
        Helper::Copy => copy,
        Helper::BornIter => born_iter,
        Helper::Islice => islice,
        Helper::Rest => rest,
    }
}

// Iterates `source`, calling it first if it is a host function.
pub fn iterate(host: &mut dyn Host, source: Object) -> Result<Stream, RuntimeError> {
    match source {
        Object::List(items) => Ok(Stream::from_vec(items)),
        Object::Stream(stream) => Ok(stream),
        Object::Function(name) => {
            let produced = host.call(&name, vec![])?;
            match produced {
                Object::Function(_) => Err(RuntimeError::NotIterable(name)),
                other => iterate(host, other),
            }
        }
        other => Err(RuntimeError::NotIterable(other.to_string())),
    }
}

fn merge(host: &mut dyn Host, sources: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut streams = Vec::with_capacity(sources.len());
    for source in sources {
        streams.push(iterate(host, source)?);
    }
    Ok(Object::Stream(Stream::new(streams.into_iter().flatten())))
}

fn join(_host: &mut dyn Host, sources: Vec<Object>) -> Result<Object, RuntimeError> {
    Ok(Object::List(sources))
}

fn tuples(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let sources = match args.into_iter().next() {
        Some(Object::List(sources)) => sources,
        Some(other) => vec![other],
        None => vec![],
    };
    let mut streams = Vec::with_capacity(sources.len());
    for source in sources {
        streams.push(iterate(host, source)?);
    }
    if streams.is_empty() {
        return Ok(Object::List(vec![]));
    }
    Ok(Object::Stream(Stream::new(std::iter::from_fn(move || {
        let mut row = Vec::with_capacity(streams.len());
        for stream in &streams {
            row.push(stream.next_item()?);
        }
        Some(Object::List(row))
    }))))
}

fn range(_host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let count = args.first().unwrap_or(&Object::Null).as_count()?;
    Ok(Object::Stream(Stream::new(
        (0..count).map(|i| Object::Number(i as f64)),
    )))
}

fn drain(host: &mut dyn Host, stream: &Stream, count: Option<usize>) -> Vec<Object> {
    let items = match count {
        Some(count) => stream.take(count),
        None => stream.rest(),
    };
    if stream.born {
        items.into_iter().map(|i| host.born(i)).collect()
    } else {
        items
    }
}

// The first `count` items of the source, or all of it for no count.
fn part(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut args = args.into_iter();
    let source = args.next().unwrap_or_default();
    match args.next().unwrap_or_default() {
        Object::Null => Ok(source),
        count => {
            let count = count.as_count()?;
            let stream = iterate(host, source)?;
            Ok(Object::List(drain(host, &stream, Some(count))))
        }
    }
}

fn group(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let source = args.into_iter().next().unwrap_or_default();
    let stream = iterate(host, source)?;
    let born = stream.born;
    let items = drain(host, &stream, None);
    if born {
        return Ok(Object::List(items));
    }
    Ok(Object::List(items.into_iter().map(|i| host.born(i)).collect()))
}

fn evaluator(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    match args.into_iter().next() {
        None => Ok(Object::Null),
        Some(evaluator) => host.evaluator(evaluator),
    }
}

fn notify(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Object::Str(name)) => name,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let group = args.next().unwrap_or_default();
    host.on_yield(&name, &group);
    Ok(Object::Null)
}

fn copy(_host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    Ok(args.into_iter().next().unwrap_or_default())
}

fn born_iter(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let source = args.into_iter().next().unwrap_or_default();
    Ok(Object::Stream(iterate(host, source)?.with_born()))
}

fn islice(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut args = args.into_iter();
    let stream = iterate(host, args.next().unwrap_or_default())?;
    let count = args.next().unwrap_or_default().as_count()?;
    Ok(Object::List(drain(host, &stream, Some(count))))
}

fn rest(host: &mut dyn Host, args: Vec<Object>) -> Result<Object, RuntimeError> {
    let stream = iterate(host, args.into_iter().next().unwrap_or_default())?;
    Ok(Object::List(drain(host, &stream, None)))
}
