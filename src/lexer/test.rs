use super::*;

fn tags(source: &str) -> Vec<Tag> {
    tokenize(source).into_iter().map(|t| t.tag).collect()
}

fn values(source: &str) -> Vec<String> {
    tokenize(source).into_iter().map(|t| t.value).collect()
}

#[test]
fn test_statement_tokens() {
    assert_eq!(
        tags("FROM population SELECT 10 offspring USING tournament(k=2)"),
        vec![
            Tag::From,
            Tag::Name,
            Tag::Select,
            Tag::Number,
            Tag::Name,
            Tag::Using,
            Tag::Name,
            Tag::LParen,
            Tag::Name,
            Tag::Assign,
            Tag::Number,
            Tag::RParen,
            Tag::Eos,
        ]
    );
}

#[test]
fn test_case_folding() {
    assert_eq!(
        values("Evaluate Pop USING Fitness"),
        vec!["evaluate", "pop", "using", "fitness", ""]
    );
    assert_eq!(tags("EVAL x")[0], Tag::Eval);
    assert_eq!(tags("TRUE none False NULL"), vec![
        Tag::True,
        Tag::Null,
        Tag::False,
        Tag::Null,
        Tag::Eos
    ]);
}

#[test]
fn test_keywords_are_whole_words() {
    assert_eq!(tags("fromage"), vec![Tag::Name, Tag::Eos]);
    assert_eq!(tags("end_point"), vec![Tag::Name, Tag::Eos]);
    assert_eq!(tags("endless = 1")[0], Tag::Name);
}

#[test]
fn test_numbers() {
    assert_eq!(
        values("1 2.5 .5 3. 1e3 2.5E-2"),
        vec!["1", "2.5", ".5", "3.", "1e3", "2.5E-2", ""]
    );
    assert!(tags("1 2.5 .5").iter().take(3).all(|t| *t == Tag::Number));
}

#[test]
fn test_comments_dropped_or_kept() {
    let source = "x = 1 # set x\n; whole line\n// slashes";
    assert!(!tags(source).contains(&Tag::Comment));

    let all: Vec<_> = tokenize_all(source)
        .into_iter()
        .filter(|t| t.tag == Tag::Comment)
        .map(|t| t.value)
        .collect();
    assert_eq!(all, vec!["# set x", "; whole line", "// slashes"]);
}

#[test]
fn test_every_line_has_eos() {
    let tokens = tokenize("a = 1\n\nb = 2\n");
    let eos: Vec<_> = tokens
        .iter()
        .filter(|t| t.tag == Tag::Eos)
        .map(|t| (t.line, t.col))
        .collect();
    assert_eq!(eos, vec![(1, 6), (2, 1), (3, 6)]);
}

#[test]
fn test_empty_source() {
    let tokens = tokenize("");
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].tag, Tag::Eos);
}

#[test]
fn test_pragma_takes_rest_of_line() {
    let tokens = tokenize("`py print(a, b) # not a comment\nx = 1");
    assert_eq!(tokens[0].tag, Tag::Pragma);
    assert_eq!(tokens[0].value, "py print(a, b) # not a comment");
    assert_eq!(tokens[1].tag, Tag::Eos);
}

#[test]
fn test_continuation_merges_lines() {
    let merged: Vec<_> = tokenize("A = B \\\n+ C")
        .into_iter()
        .map(|t| (t.tag, t.value))
        .collect();
    let single: Vec<_> = tokenize("A = B + C")
        .into_iter()
        .map(|t| (t.tag, t.value))
        .collect();
    assert_eq!(merged, single);
}

#[test]
fn test_continuation_with_comment() {
    let tokens = tokenize("a = 1 + \\ # more below\n 2");
    assert_eq!(
        tokens.iter().map(|t| t.tag).collect::<Vec<_>>(),
        vec![Tag::Name, Tag::Assign, Tag::Number, Tag::Plus, Tag::Number, Tag::Eos]
    );
    assert_eq!(tokens[4].line, 2);
}

#[test]
fn test_continuation_not_last_is_error() {
    let tokens = tokenize("a = \\ b");
    assert_eq!(tokens[2].tag, Tag::Error);
    assert_eq!(tokens[2].value, "\\");
    assert_eq!(tokens[3].tag, Tag::Name);
}

#[test]
fn test_error_recovery() {
    let tokens = tokenize("x = 1 $@ y");
    let errors: Vec<_> = tokens.iter().filter(|t| t.tag == Tag::Error).collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].value, "$");
    assert_eq!(errors[0].col, 7);
    assert_eq!(errors[1].value, "@");
    assert_eq!(errors[1].col, 8);
    assert_eq!(tokens.last().unwrap().tag, Tag::Eos);
}

#[test]
fn test_positions_and_spans() {
    let source = "a = 1\n  b = c";
    let tokens = tokenize(source);
    let b = tokens.iter().find(|t| t.value == "b").unwrap();
    assert_eq!((b.line, b.col), (2, 3));
    assert_eq!(&source[b.span.clone()], "b");
}

#[test]
fn test_token_ordering() {
    let mut tokens = tokenize("a b\nc");
    tokens.reverse();
    tokens.sort();
    let names: Vec<_> = tokens
        .iter()
        .filter(|t| t.tag == Tag::Name)
        .map(|t| t.value.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}
