use super::*;
use crate::ast::Ast;
use crate::diagnostics::ErrorKind;
use crate::parser::parse;
use crate::validation::validate_ast;

fn validated_ast(source: &str) -> Ast {
    let mut ast = parse(source);
    assert!(ast.errors.is_empty(), "parse errors: {:?}", ast.errors);
    validate_ast(&mut ast);
    ast
}

fn build(source: &str, externals: &[&str]) -> System {
    let ast = validated_ast(source);
    ModelBuilder::new(externals.iter().copied())
        .build(&ast)
        .unwrap()
}

fn lines(system: &System, block: &str) -> Vec<String> {
    system.blocks[block]
        .iter()
        .map(|s| system.statement_text(s))
        .collect()
}

fn kinds(system: &System) -> Vec<ErrorKind> {
    Validator::validate(system).iter().map(|d| d.kind).collect()
}

#[test]
fn test_expressions() {
    let system = build("x = a + 2 * -b\ny = a.b\nz = a[1]\nw = f(n, k=x)", &[]);
    assert_eq!(
        lines(&system, "_init"),
        vec![
            "x = (a+(2.0*(-b)))",
            "y = a.b",
            "z = a[1.0]",
            "w = f(n, k=x)",
        ]
    );
    let f = system.externals["f"];
    assert!(system.var(f).is_external());
    assert!(system.variables.contains_key("a"));
}

#[test]
fn test_names_resolve_locals_before_externals() {
    let system = build("size = 1\ny = size", &["size"]);
    assert!(!system.variables.contains_key("size"));
    let Statement::Function(Function::Assign { source, .. }) = &system.blocks["_init"][1] else {
        panic!("expected an assignment");
    };
    assert_eq!(source.variable(), Some(system.externals["size"]));

    let system = build("pop = 1\nFROM pop SELECT x", &[]);
    let Statement::Store(store) = &system.blocks["_init"][1] else {
        panic!("expected a store");
    };
    let Stream::Merge(sources) = &store.source else {
        panic!("expected a merge");
    };
    assert_eq!(sources.groups().next().map(|g| g.id), Some(system.variables["pop"]));
}

#[test]
fn test_stores() {
    let system = build(
        "FROM pop, random(n=2) SELECT 10 offspring, rest USING tournament(k=2), mutate\n\
         JOIN a, b INTO c USING cross",
        &["random", "tournament", "mutate", "cross"],
    );
    assert_eq!(
        lines(&system, "_init"),
        vec![
            "FROM pop, random(n=2.0) SELECT (10.0) offspring, rest USING tournament(k=2.0), mutate()",
            "JOIN a, b INTO c USING cross()",
        ]
    );

    let Statement::Store(store) = &system.blocks["_init"][0] else {
        panic!("expected a store");
    };
    let (bottom, calls) = store.source.unwind();
    assert!(matches!(bottom, Stream::Merge(list) if list.items.len() == 2));
    let names: Vec<_> = calls
        .iter()
        .map(|c| system.expression_text(&c.function))
        .collect();
    assert_eq!(names, vec!["tournament", "mutate"]);
    assert!(matches!(store.destinations.items[1], GroupItem::Group(GroupRef { limit: None, .. })));
}

#[test]
fn test_externals_are_generators() {
    let system = build("FROM random SELECT pop", &["random"]);
    let Statement::Store(store) = &system.blocks["_init"][0] else {
        panic!("expected a store");
    };
    let Stream::Merge(sources) = &store.source else {
        panic!("expected a merge");
    };
    assert!(matches!(sources.items[0], GroupItem::Generator(Function::Call(_))));
    assert_eq!(system.statement_text(&system.blocks["_init"][0]), "FROM random() SELECT pop");
}

#[test]
fn test_eval_and_yield() {
    let system = build(
        "EVAL pop USING fitness(n=1)\nEVALUATE pop USING other\nEVAL pop\nYIELD pop, best",
        &["fitness"],
    );
    let statements = &system.blocks["_init"];
    let Statement::Eval(first) = &statements[0] else {
        panic!("expected EVAL");
    };
    assert!(matches!(first.evaluators[0], Expression::Function(_)));
    let Statement::Eval(second) = &statements[1] else {
        panic!("expected EVAL");
    };
    assert_eq!(second.evaluators[0].variable(), Some(system.variables["other"]));
    assert_eq!(
        lines(&system, "_init"),
        vec![
            "EVAL pop USING fitness(n=1.0)",
            "EVAL pop USING other",
            "EVAL pop",
            "YIELD pop, best",
        ]
    );
}

#[test]
fn test_blocks_and_repeat() {
    let system = build(
        "x = 1\nBEGIN generation\nREPEAT x + 1\nFROM pop SELECT pop\nEND\nYIELD pop\nEND",
        &[],
    );
    let names: Vec<_> = system.block_names().collect();
    assert_eq!(names, vec!["_init", "generation"]);
    let Statement::Repeat(repeat) = &system.blocks["generation"][0] else {
        panic!("expected REPEAT");
    };
    assert_eq!(system.expression_text(&repeat.count), "(x+1.0)");
    assert_eq!(repeat.statements.len(), 1);
}

#[test]
fn test_as_esdl() {
    let system = build(
        "x = 1\nBEGIN gen\nREPEAT 2\nFROM pop SELECT 5 pop USING op\nEND\nYIELD pop\nEND gen",
        &["op"],
    );
    assert_eq!(
        system.as_esdl(),
        "x = 1.0\n\
         \n\
         BEGIN gen\n    \
             REPEAT 2.0\n        \
                 FROM pop SELECT (5.0) pop USING op()\n    \
             END REPEAT\n    \
             YIELD pop\n\
         END gen\n"
    );

    // the regenerated text builds the same system
    let again = build(&system.as_esdl(), &["op"]);
    assert_eq!(again.as_esdl(), system.as_esdl());
}

#[test]
fn test_builder_is_one_shot() {
    let ast = validated_ast("x = 1");
    let mut builder = ModelBuilder::new(Vec::<String>::new());
    assert!(builder.build(&ast).is_ok());
    assert_eq!(builder.build(&ast), Err(BuildError::AlreadyBuilt));
}

#[test]
fn test_clean_system() {
    let system = build(
        "FROM random SELECT 10 pop\nBEGIN gen\nFROM pop SELECT 10 pop USING tournament(k=2)\nYIELD pop\nEND",
        &["random", "tournament"],
    );
    assert!(kinds(&system).is_empty(), "{:?}", Validator::validate(&system));
}

#[test]
fn test_unused_bindings() {
    let system = build("x = 1\nFROM pop SELECT 5 pop, spare\nYIELD pop", &[]);
    let diagnostics = Validator::validate(&system);
    let found: Vec<_> = diagnostics.iter().map(|d| (d.kind, d.message.as_str())).collect();
    assert_eq!(
        found,
        vec![
            (ErrorKind::UnusedVariable, "Variable 'x' unused"),
            (ErrorKind::UnusedGroup, "Group 'spare' is never read"),
        ]
    );
    assert!(diagnostics.iter().all(|d| d.is_warning()));

    // implicit parameters read the variable of the same name
    let system = build("k = 2\nFROM pop SELECT pop USING op(k)\nYIELD pop", &["op"]);
    assert!(kinds(&system).is_empty());
}

#[test]
fn test_name_collisions() {
    let system = build(
        "BEGIN generation\nFROM generation SELECT pop\nYIELD pop\nEND",
        &[],
    );
    assert_eq!(kinds(&system), vec![ErrorKind::AmbiguousVariableBlockName]);

    let mut f = FluentSystem::new();
    f.external("pop");
    let (source, destination) = (f.group("pop"), f.group("pop"));
    f.from(vec![source]).select(vec![destination]);
    assert!(kinds(&f.finish()).contains(&ErrorKind::AmbiguousGroupGeneratorName));
}

#[test]
fn test_parameters() {
    let system = build("x = f(a=1, a=2, _k=3)\nYIELD x", &[]);
    assert_eq!(
        kinds(&system),
        vec![
            ErrorKind::RepeatedParameterName,
            ErrorKind::InternalParameterName,
        ]
    );

    let system = build("FROM pop SELECT pop USING op(_source=1)\nYIELD pop", &["op"]);
    assert!(kinds(&system).is_empty());
}

#[test]
fn test_invalid_assignment() {
    let system = build("size = 1", &["size"]);
    assert_eq!(kinds(&system), vec![ErrorKind::InvalidAssignment]);
    let system = build("a.b = 1", &[]);
    assert_eq!(kinds(&system), vec![ErrorKind::InvalidAssignment]);
}

#[test]
fn test_group_lists() {
    let system = build("FROM a SELECT b, 10 c\nYIELD b, c, b", &[]);
    assert_eq!(
        kinds(&system),
        vec![ErrorKind::InaccessibleGroup, ErrorKind::RepeatedGroup]
    );
}

#[test]
fn test_fluent_unresolved_names() {
    let mut f = FluentSystem::new();
    let ghost = f.var("ghost");
    f.assign("x", ghost);
    let call = f.call("missing", vec![]);
    f.expression(Expression::Function(Box::new(call)));
    let k = f.named_constant("k", None);
    f.assign("y", k);
    let system = f.finish();

    let found = kinds(&system);
    assert!(found.contains(&ErrorKind::UninitialisedVariable));
    assert!(found.contains(&ErrorKind::UninitialisedGlobal));
    assert!(found.contains(&ErrorKind::UninitialisedConstant));
}

#[test]
fn test_fluent_generators_and_repeat() {
    let mut f = FluentSystem::new();
    f.external("random");
    f.variable("pop");
    f.block("gen");
    let count = f.constant(Literal::Number(3.0));
    f.repeat(count, |f| {
        let random = f.call("random", vec![]);
        let generator = f.generator(random);
        let pop = f.group("pop");
        f.from(vec![pop]).select(vec![generator]);
    });
    f.pragma("py pass");
    let system = f.finish();

    assert_eq!(
        system.as_esdl_lines(),
        vec![
            "",
            "BEGIN gen",
            "    REPEAT 3.0",
            "        FROM pop SELECT random()",
            "    END REPEAT",
            "    `py pass",
            "END gen",
            "",
        ]
    );
    assert!(kinds(&system).contains(&ErrorKind::GeneratorAsDestination));
}

#[test]
fn test_missing_index() {
    let mut f = FluentSystem::new();
    f.variable("a");
    let a = f.var("a");
    f.expression(Expression::Function(Box::new(Function::GetIndex {
        source: a,
        index: None,
        location: Location::default(),
    })));
    assert_eq!(kinds(&f.finish()), vec![ErrorKind::ExpectedIndex]);
}

#[test]
fn test_diagnostics_are_deterministic() {
    let system = build(
        "x = f(a=1, a=2)\nFROM a SELECT b, 10 c\nBEGIN b\nYIELD c, c\nEND",
        &[],
    );
    let first = Validator::validate(&system);
    let second = Validator::validate(&system);
    assert!(!first.is_empty());
    let first_text: Vec<_> = first.iter().map(ToString::to_string).collect();
    let second_text: Vec<_> = second.iter().map(ToString::to_string).collect();
    assert_eq!(first_text, second_text);
    assert!(first.windows(2).all(|w| w[0] < w[1]));
}
