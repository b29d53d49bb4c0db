use super::*;

fn at(line: usize, col: usize) -> Location {
    Location::new(line, col, 0..1)
}

#[test]
fn test_warning_codes() {
    assert!(ErrorKind::InaccessibleGroup.is_warning());
    assert!(ErrorKind::InvalidVariable.is_warning());
    assert!(ErrorKind::UnusedGroup.is_warning());
    assert!(!ErrorKind::InvalidSyntax.is_warning());
    assert!(!ErrorKind::RepeatedDestinationGroup.is_warning());
}

#[test]
fn test_message_interpolation() {
    let d = Diagnostic::with_arg(ErrorKind::UninitialisedVariable, at(3, 1), "x");
    assert_eq!(d.message, "Variable 'x' not initialised");

    let d = Diagnostic::new(ErrorKind::InvalidSyntax, at(1, 4));
    assert_eq!(d.message, "Invalid syntax");
}

#[test]
fn test_display() {
    let d = Diagnostic::with_arg(ErrorKind::UnmatchedBracket, at(2, 7), ")");
    assert_eq!(
        d.to_string(),
        "[E1013] Matching ')' not found (ESDL Definition, line 2, char 7)"
    );

    let d = Diagnostic::new(ErrorKind::UnexpectedEndOfDefinition, at(9, 0));
    assert_eq!(
        d.to_string(),
        "[E0002] Unexpected end of definition (ESDL Definition, line 9)"
    );
}

#[test]
fn test_ordering_ignores_column() {
    let a = Diagnostic::with_arg(ErrorKind::UnusedVariable, at(4, 1), "a");
    let b = Diagnostic::with_arg(ErrorKind::UnusedVariable, at(4, 12), "a");
    assert_eq!(a, b);

    let c = Diagnostic::new(ErrorKind::InvalidSyntax, at(4, 30));
    assert!(c < a);

    let d = Diagnostic::new(ErrorKind::InvalidSyntax, at(1, 30));
    assert!(d < c);
}

#[test]
fn test_normalise_sorts_and_dedups() {
    let mut diags = vec![
        Diagnostic::with_arg(ErrorKind::UnusedGroup, at(5, 1), "g"),
        Diagnostic::new(ErrorKind::InvalidSyntax, at(2, 3)),
        Diagnostic::with_arg(ErrorKind::UnusedGroup, at(5, 9), "g"),
        Diagnostic::new(ErrorKind::ExpectedGroup, at(2, 1)),
    ];
    normalise(&mut diags);
    let codes: Vec<_> = diags.iter().map(|d| d.code()).collect();
    assert_eq!(codes, vec!["E0001", "E1007", "W2007"]);
}

#[test]
fn test_has_errors() {
    let warnings_only = vec![Diagnostic::with_arg(
        ErrorKind::InaccessibleGroup,
        at(1, 1),
        "b",
    )];
    assert!(!has_errors(&warnings_only));
    assert_eq!(super::warnings(&warnings_only).count(), 1);

    let mut mixed = warnings_only.clone();
    mixed.push(Diagnostic::new(ErrorKind::ExpectedSelect, at(1, 1)));
    assert!(has_errors(&mixed));
    assert_eq!(errors(&mixed).count(), 1);
}

#[test]
fn test_report_builds() {
    let d = Diagnostic::new(ErrorKind::InvalidSyntax, Location::new(1, 3, 2..3));
    let mut out = Vec::new();
    d.report("test.esdl")
        .write(
            ("test.esdl".to_string(), Source::from("a $ b")),
            &mut out,
        )
        .unwrap();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("E0001"));
    assert!(text.contains("Invalid syntax"));
}
