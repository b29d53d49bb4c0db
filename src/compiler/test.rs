use super::*;
use crate::diagnostics::ErrorKind;
use crate::ir::Backend;

const SYSTEM: &str = "FROM random SELECT (size) pop\n\
                      BEGIN generation\n\
                      FROM pop SELECT (size) offspring USING tournament(k=2), mutate\n\
                      FROM offspring SELECT pop\n\
                      YIELD pop\n\
                      END generation";

const EXTERNALS: [&str; 4] = ["random", "size", "tournament", "mutate"];

#[test]
fn test_compile_and_emit() {
    let compilation = compile(SYSTEM, EXTERNALS).unwrap();
    assert!(compilation.diagnostics.is_empty(), "{:?}", compilation.diagnostics);
    assert_eq!(
        compilation.system.block_names().collect::<Vec<_>>(),
        vec!["_init", "generation"]
    );

    for backend in [Backend::Direct, Backend::Embedded] {
        let options = EmitOptions {
            backend,
            ..EmitOptions::default()
        };
        let (program, context) = compilation.emit(&options).unwrap();
        assert_eq!(program.backend, backend);
        assert!(program.blocks.contains_key("generation"));
        assert!(program.helpers().iter().all(|h| context.contains(*h)));
    }
}

#[test]
fn test_hard_errors_refuse_emission() {
    let compilation = compile("x = f(a=1, a=2)\nYIELD x", Vec::<String>::new()).unwrap();
    assert!(compilation.has_errors());
    assert_eq!(
        compilation.errors().map(|d| d.kind).collect::<Vec<_>>(),
        vec![ErrorKind::RepeatedParameterName]
    );
    assert!(matches!(
        compilation.emit(&EmitOptions::default()),
        Err(CompileError::Refused { errors: 1 })
    ));
}

#[test]
fn test_warnings_do_not_block() {
    let compilation = compile("x = 1", Vec::<String>::new()).unwrap();
    assert!(!compilation.has_errors());
    assert_eq!(
        compilation.warnings().map(|d| d.kind).collect::<Vec<_>>(),
        vec![ErrorKind::UnusedVariable]
    );
    assert!(compilation.emit(&EmitOptions::default()).is_ok());
}

#[test]
fn test_errors_stay_in_their_block() {
    let source = "BEGIN broken\n\
                  FROM pop SELECT f()\n\
                  END broken\n\
                  BEGIN healthy\n\
                  FROM pop SELECT 10 pop\n\
                  YIELD pop\n\
                  END healthy";
    let compilation = compile(source, Vec::<String>::new()).unwrap();
    assert!(compilation.has_errors());
    assert!(compilation.diagnostics.iter().all(|d| d.line() == 2));
    assert_eq!(compilation.system.blocks["healthy"].len(), 2);
}

#[test]
fn test_parse_and_model_diagnostics_are_merged() {
    let compilation = compile("x = (1\nFROM a SELECT b, 10 c\nYIELD b, c", Vec::<String>::new()).unwrap();
    let kinds: Vec<_> = compilation.diagnostics.iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&ErrorKind::UnmatchedBracket));
    assert!(kinds.contains(&ErrorKind::InaccessibleGroup));
    assert!(compilation.diagnostics.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_deeply_nested_definition_is_diagnosed() {
    let source = format!("a = {}1{}\nYIELD a", "(".repeat(1000), ")".repeat(1000));
    let compilation = compile(&source, Vec::<String>::new()).unwrap();
    assert!(compilation.has_errors());
    assert_eq!(
        compilation.errors().map(|d| d.kind).collect::<Vec<_>>(),
        vec![ErrorKind::InvalidSyntax]
    );
}
