use esdlc::config::SystemConfig;
use esdlc::emit::EmitOptions;
use esdlc::ir::{Backend, Program};
use esdlc::runtime::{
    ExecutionContext, Host, Interpreter, Object, RuntimeError, Stream, iterate,
};
use indexmap::IndexMap;

#[derive(Default)]
struct Recorder {
    next_id: u64,
    calls: Vec<String>,
    yields: Vec<(String, Object)>,
    evaluators: Vec<(Object, Object)>,
}

impl Recorder {
    fn fresh(&mut self, count: usize) -> Vec<Object> {
        (0..count)
            .map(|_| {
                self.next_id += 1;
                Object::Opaque(self.next_id)
            })
            .collect()
    }

    fn drain(&mut self, source: Object) -> Result<Vec<Object>, RuntimeError> {
        let mut items = vec![];
        for item in iterate(self, source)?.rest() {
            match item {
                Object::List(group) => items.extend(group),
                other => items.push(other),
            }
        }
        Ok(items)
    }
}

impl Host for Recorder {
    fn call(&mut self, function: &str, args: Vec<(String, Object)>) -> Result<Object, RuntimeError> {
        let mut source = Object::Null;
        let mut shown = vec![];
        for (name, value) in args {
            if name == "_source" {
                source = value;
            } else {
                shown.push(format!("{name}={value}"));
            }
        }
        let items = match source {
            Object::Null => vec![],
            source => self.drain(source)?,
        };
        self.calls
            .push(format!("{function}({}) <- {}", shown.join(", "), Object::List(items.clone())));

        // operators hand back one shared stream, like a generator would
        let produced = match function {
            "random" => return Ok(Object::List(self.fresh(12))),
            "tournament" => items.into_iter().rev().collect(),
            "crossover" => {
                let children = items.len() / 2;
                self.fresh(children)
            }
            "mutate" => self.fresh(items.len()),
            "fitness" | "fitness.quick" => return Ok(Object::Str(function.to_string())),
            other => return Err(RuntimeError::NotCallable(other.to_string())),
        };
        Ok(Object::Stream(Stream::from_vec(produced)))
    }

    fn on_yield(&mut self, name: &str, group: &Object) {
        self.yields.push((name.to_string(), group.clone()));
    }

    fn set_evaluator(&mut self, individual: &Object, evaluator: &Object) {
        self.evaluators.push((individual.clone(), evaluator.clone()));
    }
}

fn individuals(range: std::ops::RangeInclusive<u64>) -> Object {
    Object::List(range.map(Object::Opaque).collect())
}

fn emit(source: &str, externals: &[&str], backend: Backend, optimise: u8) -> (Program, ExecutionContext) {
    let compilation = esdlc::compile(source, externals.iter().copied()).unwrap();
    assert!(!compilation.has_errors(), "{:?}", compilation.diagnostics);
    let options = EmitOptions {
        backend,
        optimise,
        profile: false,
    };
    compilation.emit(&options).unwrap()
}

#[test]
fn test_select_and_yield_first_ten() {
    for backend in [Backend::Direct, Backend::Embedded] {
        let (program, context) = emit("FROM pop SELECT 10 pop\nYIELD pop", &["size"], backend, 0);
        let mut interpreter = Interpreter::new(&program, context, Recorder::default());
        interpreter.set_global("pop", individuals(1..=12));
        interpreter.set_global("size", Object::Number(10.0));
        interpreter.run_init().unwrap();

        let host = interpreter.into_host();
        assert_eq!(host.yields, vec![("pop".to_string(), individuals(1..=10))]);
    }
}

const EVOLUTION: &str = "\
FROM random SELECT (size) pop
BEGIN generation
    REPEAT 2
        FROM pop SELECT 4 parents, rest USING tournament(k=2)
        JOIN parents, rest INTO offspring USING crossover(rate=0.5)
        FROM offspring, rest SELECT (size) pop USING mutate(step=scale * 2)
    END REPEAT
    EVAL pop USING fitness
    YIELD pop, offspring
END generation
";

const OPERATORS: [&str; 7] = [
    "random",
    "size",
    "scale",
    "tournament",
    "crossover",
    "mutate",
    "fitness",
];

struct Run {
    calls: Vec<String>,
    yields: Vec<(String, Object)>,
    evaluators: Vec<(Object, Object)>,
    globals: IndexMap<String, Object>,
}

fn run_generations(backend: Backend, optimise: u8, generations: usize) -> Run {
    let (program, context) = emit(EVOLUTION, &OPERATORS, backend, optimise);
    let mut interpreter = Interpreter::new(&program, context, Recorder::default());
    for name in ["random", "tournament", "crossover", "mutate", "fitness"] {
        interpreter.set_global(name, Object::Function(name.to_string()));
    }
    interpreter.set_global("size", Object::Number(10.0));
    interpreter.set_global("scale", Object::Number(0.25));

    interpreter.run_init().unwrap();
    for _ in 0..generations {
        assert_eq!(interpreter.step().unwrap().as_deref(), Some("generation"));
    }
    let globals = interpreter.globals().clone();
    let host = interpreter.into_host();
    Run {
        calls: host.calls,
        yields: host.yields,
        evaluators: host.evaluators,
        globals,
    }
}

#[test]
fn test_optimised_emission_is_equivalent() {
    for backend in [Backend::Direct, Backend::Embedded] {
        let baseline = run_generations(backend, 0, 2);
        assert_eq!(baseline.calls.len(), 1 + 2 * (2 * 3 + 1));
        assert_eq!(baseline.yields.len(), 4);
        assert_eq!(baseline.evaluators.len(), 20);

        for optimise in 1..=3 {
            let run = run_generations(backend, optimise, 2);
            assert_eq!(run.calls, baseline.calls, "{backend} -O{optimise}");
            assert_eq!(run.yields, baseline.yields, "{backend} -O{optimise}");
            assert_eq!(run.evaluators, baseline.evaluators, "{backend} -O{optimise}");
            assert_eq!(run.globals, baseline.globals, "{backend} -O{optimise}");
        }
    }
}

#[test]
fn test_backends_agree() {
    let direct = run_generations(Backend::Direct, 0, 3);
    let embedded = run_generations(Backend::Embedded, 0, 3);
    assert_eq!(direct.calls, embedded.calls);
    assert_eq!(direct.yields, embedded.yields);
    assert_eq!(direct.globals["pop"], embedded.globals["pop"]);
    assert_eq!(direct.globals["offspring"], embedded.globals["offspring"]);
}

#[test]
fn test_operator_pipeline_order() {
    let run = run_generations(Backend::Direct, 0, 1);
    let names: Vec<_> = run
        .calls
        .iter()
        .map(|c| c.split('(').next().unwrap_or_default())
        .collect();
    assert_eq!(
        names,
        vec![
            "random",
            "tournament",
            "crossover",
            "mutate",
            "tournament",
            "crossover",
            "mutate",
            "fitness",
        ]
    );
    assert!(run.calls[1].starts_with("tournament(k=2.0) <- [<individual 1>"));
    assert!(run.calls[3].starts_with("mutate(step=0.5) <- "));

    // five children from the four parents and six others
    let (name, offspring) = &run.yields[1];
    assert_eq!(name, "offspring");
    assert_eq!(offspring.as_list().map(|l| l.len()), Some(5));
}

#[test]
fn test_configured_system() {
    let config = SystemConfig::from_json(
        r#"{
            "system": {
                "definition": "FROM random SELECT (size) pop\nBEGIN report\nYIELD pop\nEND report\nBEGIN shrink\nFROM pop SELECT (size / 2) pop\nEND shrink",
                "random": null,
                "Size": 8
            },
            "selector": ["Shrink", "report"]
        }"#,
    )
    .unwrap();

    let compilation = esdlc::compile(config.definition().unwrap(), config.externals()).unwrap();
    assert!(!compilation.has_errors(), "{:?}", compilation.diagnostics);
    let (program, context) = compilation.emit(&EmitOptions::default()).unwrap();

    let mut interpreter = Interpreter::new(&program, context, Recorder::default());
    for (name, value) in config.objects() {
        interpreter.set_global(&name, value);
    }
    if let Some(selector) = config.selector() {
        interpreter.set_selector(selector);
    }
    interpreter.run_init().unwrap();
    let steps: Vec<_> = (0..4).map(|_| interpreter.step().unwrap()).collect();
    assert_eq!(
        steps.into_iter().flatten().collect::<Vec<_>>(),
        vec!["shrink", "report", "shrink", "report"]
    );

    let host = interpreter.into_host();
    let sizes: Vec<_> = host
        .yields
        .iter()
        .map(|(_, g)| g.as_list().map_or(0, |l| l.len()))
        .collect();
    // the second shrink finds exactly `size / 2` left
    assert_eq!(sizes, vec![4, 4]);
}

#[test]
fn test_attribute_evaluators_agree() {
    let mut bound = vec![];
    for backend in [Backend::Direct, Backend::Embedded] {
        let (program, context) = emit(
            "EVAL pop USING fitness.quick\nYIELD pop",
            &["pop", "fitness"],
            backend,
            0,
        );
        let mut interpreter = Interpreter::new(&program, context, Recorder::default());
        interpreter.set_global("pop", individuals(1..=3));
        interpreter.set_global("fitness", Object::Function("fitness".to_string()));
        interpreter.run_init().unwrap();
        bound.push(interpreter.into_host().evaluators);
    }
    let quick = Object::Str("fitness.quick".to_string());
    assert_eq!(
        bound[0],
        (1..=3).map(|i| (Object::Opaque(i), quick.clone())).collect::<Vec<_>>()
    );
    assert_eq!(bound[0], bound[1]);
}
