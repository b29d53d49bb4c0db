use super::*;

fn global(name: &str) -> Value {
    Value::Global(name.to_string())
}

fn sample_program() -> Program {
    let mut builder = IRBuilder::new(Backend::Direct);
    builder.declare_global("pop");
    builder.declare_global("x");
    builder.declare_global("pop");

    builder.begin_procedure("_block__init".to_string(), vec![]);
    builder.add_instruction(Instruction::Comment("x = 1.0".to_string()));
    builder.add_instruction(Instruction::Assign {
        target: Target::Global("x".to_string()),
        value: Value::number(1.0),
    });
    builder.begin_nested();
    builder.add_instruction(Instruction::Expr(Value::helper(
        Helper::Yield,
        vec![Value::Str("pop".to_string()), global("pop")],
    )));
    let body = builder.end_nested();
    builder.add_instruction(Instruction::Repeat {
        count: global("x"),
        body,
    });
    builder.begin_procedure("_block_gen".to_string(), vec![]);
    builder.bind_block("_init", "_block__init");
    builder.bind_block("gen", "_block_gen");
    builder.finish("_block__init".to_string())
}

#[test]
fn test_render_values() {
    let pow = Value::Binary {
        left: Box::new(global("a")),
        op: Operator::Pow,
        right: Box::new(Value::Unary {
            op: Operator::Sub,
            right: Box::new(Value::number(2.0)),
        }),
    };
    assert_eq!(pow.to_string(), "(a ** (-2.0))");
    assert_eq!(global("from").to_string(), "_global[\"from\"]");
    assert_eq!(Value::Local("in".to_string()).to_string(), "in_");
    assert_eq!(Value::Constant(Literal::Null).to_string(), "None");

    let call = Value::Call {
        function: Box::new(Value::Attrib {
            source: Box::new(global("ops")),
            attrib: "mutate".to_string(),
        }),
        args: vec![
            ("pass".to_string(), Value::Constant(Literal::Bool(true))),
            ("_source".to_string(), Value::Local("_gen".to_string())),
        ],
    };
    assert_eq!(call.to_string(), "ops.mutate(pass_=True, _source=_gen)");

    let index = Value::Index {
        source: Box::new(global("a")),
        index: Box::new(Value::number(1.0)),
    };
    assert_eq!(index.to_string(), "a[1.0]");
}

#[test]
fn test_render_instructions() {
    let set = Instruction::SetEvaluator {
        individual: "_indiv".to_string(),
        evaluator: Value::Local("_eval".to_string()),
    };
    assert_eq!(set.to_string(), "_indiv._eval = _eval\n_indiv.fitness = None\n");

    let invoke = Instruction::Invoke {
        procedure: "__block_gen".to_string(),
        args: vec![Value::helper(Helper::Copy, vec![global("pop")]), global("x")],
        results: vec![Target::Global("pop".to_string())],
    };
    assert_eq!(invoke.to_string(), "pop = __block_gen(_copy(pop), x)\n");

    assert_eq!(Instruction::Return(vec![]).to_string(), "return\n");
    assert_eq!(
        Instruction::Declare(vec!["pop".to_string(), "x".to_string()]).to_string(),
        "global pop, x\n"
    );
    let profile = Instruction::Profile {
        event: ProfileEvent::Start,
        label: "BLOCK gen".to_string(),
    };
    assert_eq!(profile.to_string(), "_profile.start(\"BLOCK gen\")\n");
}

#[test]
fn test_render_program() {
    let program = sample_program();
    assert_eq!(
        program.to_string(),
        "# ESDL program (direct backend)\n\
         \n\
         def _block__init():\n    \
             # x = 1.0\n    \
             x = 1.0\n    \
             for _ in _range(x):\n        \
                 _yield(\"pop\", pop)\n\
         \n\
         def _block_gen():\n    \
             pass\n\
         \n\
         # entry: _block__init\n"
    );
    assert_eq!(program.globals, vec!["pop", "x"]);
}

#[test]
fn test_program_helpers() {
    let program = sample_program();
    let helpers: Vec<_> = program.helpers().into_iter().collect();
    assert_eq!(helpers, vec![Helper::Range, Helper::Yield]);
}

#[test]
fn test_helper_names() {
    for helper in Helper::ALL {
        assert_eq!(Helper::from_name(helper.name()), Some(helper));
        assert!(helper.name().starts_with('_'));
    }
    assert_eq!(Helper::from_name("_alias"), None);
}

#[test]
fn test_validate_program() {
    let program = sample_program();
    assert!(IRValidator::validate_program(&program, |_| true).is_ok());

    let errors = IRValidator::validate_program(&program, |h| h != Helper::Yield).unwrap_err();
    assert_eq!(errors, vec!["helper '_yield' is not provided"]);

    let mut broken = program.clone();
    broken.entry = "_block_missing".to_string();
    broken.procedures[1].body.push(Instruction::Repeat {
        count: Value::number(2.0),
        body: vec![Instruction::Invoke {
            procedure: "__block_gen".to_string(),
            args: vec![],
            results: vec![],
        }],
    });
    let errors = IRValidator::validate_program(&broken, |_| true).unwrap_err();
    assert_eq!(
        errors,
        vec![
            "entry procedure '_block_missing' is not defined",
            "'_block_gen' invokes undefined procedure '__block_gen'",
        ]
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "outside a procedure")]
fn test_instruction_outside_procedure() {
    let mut builder = IRBuilder::new(Backend::Direct);
    builder.add_instruction(Instruction::Comment("stray".to_string()));
}
