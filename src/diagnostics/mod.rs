use ariadne::{Color, ColorGenerator, Fmt, Label, Report, ReportKind, Source};
use yansi::Paint;

use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::ops::Range;

#[cfg(test)]
pub mod test;

// Where a token, node or model entity came from. Lines and columns are
// 1-based; a zero column means "whole line".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: usize,
    pub col: usize,
    pub span: Range<usize>,
}

impl Location {
    pub fn new(line: usize, col: usize, span: Range<usize>) -> Self {
        Location { line, col, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // statement structure
    InvalidSyntax,
    UnexpectedEndOfDefinition,
    UnexpectedCommand,
    ExpectedBlockName,
    UnexpectedBlockNesting,
    UnmatchedEnd,
    UnexpectedStatement,
    ExpectedRepeatCount,

    // statement contents
    InvalidFunctionCall,
    InvalidGroup,
    ExpectedSelect,
    ExpectedInto,
    ExpectedGroup,
    ExpectedEvaluator,
    GeneratorAsDestination,
    InvalidAssignment,
    ExpectedFilter,
    InvalidNumber,
    UnmatchedBracket,
    InvalidParameterName,
    ExpectedParameterValue,
    ExpectedIndex,

    // semantics
    AmbiguousVariableBlockName,
    RepeatedDestinationGroup,
    InvalidGroupSize,
    UnexpectedGroupSize,
    RepeatedParameterName,
    InternalParameterName,
    AmbiguousGroupGeneratorName,

    // warnings
    InternalVariableName,
    UninitialisedGlobal,
    UninitialisedConstant,
    UninitialisedVariable,
    UnusedVariable,
    InaccessibleGroup,
    UnusedGroup,
    RepeatedGroup,
    InvalidVariable,
}

impl ErrorKind {
    // Stable code. Codes starting with `W` are warnings.
    pub fn code(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidSyntax => "E0001",
            UnexpectedEndOfDefinition => "E0002",
            UnexpectedCommand => "E0003",
            ExpectedBlockName => "E0004",
            UnexpectedBlockNesting => "E0005",
            UnmatchedEnd => "E0006",
            UnexpectedStatement => "E0007",
            ExpectedRepeatCount => "E0008",

            InvalidFunctionCall => "E1001",
            InvalidGroup => "E1002",
            ExpectedSelect => "E1003",
            ExpectedInto => "E1005",
            ExpectedGroup => "E1007",
            ExpectedEvaluator => "E1008",
            GeneratorAsDestination => "E1009",
            InvalidAssignment => "E1010",
            ExpectedFilter => "E1011",
            InvalidNumber => "E1012",
            UnmatchedBracket => "E1013",
            InvalidParameterName => "E1014",
            ExpectedParameterValue => "E1015",
            ExpectedIndex => "E1016",

            AmbiguousVariableBlockName => "E2001",
            RepeatedDestinationGroup => "E2002",
            InvalidGroupSize => "E2003",
            UnexpectedGroupSize => "E2004",
            RepeatedParameterName => "E2005",
            InternalParameterName => "E2006",
            AmbiguousGroupGeneratorName => "E2007",

            InternalVariableName => "W2001",
            UninitialisedGlobal => "W2002",
            UninitialisedConstant => "W2003",
            UninitialisedVariable => "W2004",
            UnusedVariable => "W2005",
            InaccessibleGroup => "W2006",
            UnusedGroup => "W2007",
            RepeatedGroup => "W2008",
            InvalidVariable => "W2009",
        }
    }

    // Message template. A `%s` is replaced by the first argument given to
    // `Diagnostic::with_arg`.
    pub fn template(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidSyntax => "Invalid syntax",
            UnexpectedEndOfDefinition => "Unexpected end of definition",
            UnexpectedCommand => "Command not permitted outside of block",
            ExpectedBlockName => "Block name expected",
            UnexpectedBlockNesting => "Blocks cannot be nested",
            UnmatchedEnd => "END without a matching BEGIN or REPEAT",
            UnexpectedStatement => "%s cannot be specified here",
            ExpectedRepeatCount => "REPEAT requires a count",

            InvalidFunctionCall => "Invalid function call",
            InvalidGroup => "Invalid group specification",
            ExpectedSelect => "Expected SELECT",
            ExpectedInto => "Expected INTO",
            ExpectedGroup => "Expected group or groups",
            ExpectedEvaluator => "Expected evaluator",
            GeneratorAsDestination => "Generator cannot be specified as a destination group",
            InvalidAssignment => "Invalid assignment destination",
            ExpectedFilter => "Expected filter",
            InvalidNumber => "'%s' is not a valid number",
            UnmatchedBracket => "Matching '%s' not found",
            InvalidParameterName => "Invalid parameter name",
            ExpectedParameterValue => "Expected parameter=value pair",
            ExpectedIndex => "Expected index",

            AmbiguousVariableBlockName => "Block name '%s' is also used as a variable",
            RepeatedDestinationGroup => "Group '%s' is selected into multiple times",
            InvalidGroupSize => "Size specifier for group '%s' is not valid",
            UnexpectedGroupSize => "Size specifier for group '%s' not permitted",
            RepeatedParameterName => "Parameter '%s' is specified multiple times",
            InternalParameterName => "Parameter name '%s' is reserved for the compiler",
            AmbiguousGroupGeneratorName => "Group '%s' is also the name of a generator",

            InternalVariableName => "Variable '%s' may be overwritten by the compiler",
            UninitialisedGlobal => "Global variable '%s' not initialised",
            UninitialisedConstant => "Constant '%s' not initialised",
            UninitialisedVariable => "Variable '%s' not initialised",
            UnusedVariable => "Variable '%s' unused",
            InaccessibleGroup => "Group '%s' specified after an unbounded group",
            UnusedGroup => "Group '%s' is never read",
            RepeatedGroup => "Group '%s' is specified multiple times",
            InvalidVariable => "'%s' is not a valid variable name",
        }
    }

    pub fn is_warning(self) -> bool {
        self.code().starts_with('W')
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, location: Location) -> Self {
        Diagnostic {
            kind,
            message: kind.template().to_string(),
            location,
        }
    }

    pub fn with_arg(kind: ErrorKind, location: Location, arg: impl fmt::Display) -> Self {
        Diagnostic {
            kind,
            message: kind.template().replacen("%s", &arg.to_string(), 1),
            location,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_warning(&self) -> bool {
        self.kind.is_warning()
    }

    pub fn line(&self) -> usize {
        self.location.line
    }

    pub fn col(&self) -> usize {
        self.location.col
    }

    pub fn report(&self, file: &str) -> Report<'static, (String, Range<usize>)> {
        let (kind, color) = if self.is_warning() {
            (ReportKind::Warning, Color::Yellow)
        } else {
            (ReportKind::Error, ColorGenerator::new().next())
        };
        let span = (file.to_string(), self.location.span.clone());
        Report::build(kind, span.clone())
            .with_code(self.code())
            .with_message(&self.message)
            .with_label(
                Label::new(span)
                    .with_message(format!("{} raised here", Fmt::fg(self.code(), color).bold()))
                    .with_color(color),
            )
            .finish()
    }
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Diagnostic {}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.location.line, self.code(), &self.message).cmp(&(
            other.location.line,
            other.code(),
            &other.message,
        ))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.col > 0 {
            write!(
                f,
                "[{}] {} (ESDL Definition, line {}, char {})",
                self.code(),
                self.message,
                self.location.line,
                self.location.col
            )
        } else {
            write!(
                f,
                "[{}] {} (ESDL Definition, line {})",
                self.code(),
                self.message,
                self.location.line
            )
        }
    }
}

// Sorts by `(line, code, message)` and drops duplicates.
pub fn normalise(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort();
    diagnostics.dedup();
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| !d.is_warning())
}

pub fn errors(diagnostics: &[Diagnostic]) -> impl Iterator<Item = &Diagnostic> {
    diagnostics.iter().filter(|d| !d.is_warning())
}

pub fn warnings(diagnostics: &[Diagnostic]) -> impl Iterator<Item = &Diagnostic> {
    diagnostics.iter().filter(|d| d.is_warning())
}

// Prints every diagnostic against `source` and returns whether any of them
// was a hard error.
pub fn print(file: &str, source: &str, diagnostics: &[Diagnostic]) -> io::Result<bool> {
    let source = Source::from(source.to_string());
    for diagnostic in diagnostics {
        diagnostic
            .report(file)
            .eprint((file.to_string(), source.clone()))?;
    }
    let errors = errors(diagnostics).count();
    let warnings = warnings(diagnostics).count();
    if errors > 0 {
        eprintln!("{}", format!("{file}: {errors} error(s), {warnings} warning(s)").red().bold());
    } else if warnings > 0 {
        eprintln!("{}", format!("{file}: {warnings} warning(s)").yellow());
    }
    Ok(errors > 0)
}
