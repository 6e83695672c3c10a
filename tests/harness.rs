use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use cadence::builtins::{CallFunctionCommand, ReturnFailure, ReturnRun, ReturnValue};
use cadence::chain::{ChainBuilder, ContextChain};
use cadence::exec::{ExecutionConfig, ExecutionContext, InstantiatedFunction, RunOutcome};
use cadence::source::{ExecutionSource, ResultCallback};
use cadence::trace::TraceSink;
use cadence::CommandError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, Deserialize)]
pub enum StageCase {
    Redirect,
    Fork(Vec<String>),
    Modify(Vec<String>),
    Reject(String),
    ReturnRun,
}

#[derive(Debug, Clone, Deserialize)]
pub enum CommandCase {
    Length,
    Fail(String),
    ReturnValue(i32),
    ReturnFailure,
    Function {
        name: String,
        lines: Vec<LineCase>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineCase {
    #[serde(default)]
    pub stages: Vec<StageCase>,
    pub command: CommandCase,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub outcome: RunOutcome,
    #[serde(default)]
    pub executed: Vec<String>,
    #[serde(default)]
    pub returned: Vec<(bool, i32)>,
    #[serde(default)]
    pub errors: Vec<(String, CommandError, bool)>,
    #[serde(default)]
    pub quota: Option<isize>,
}

#[derive(Debug, Deserialize)]
pub struct Case {
    #[serde(default)]
    pub config: ExecutionConfig,
    #[serde(default = "Case::default_source")]
    pub source: String,
    #[serde(default)]
    pub stages: Vec<StageCase>,
    pub command: CommandCase,
    pub expected: Observed,
}

#[derive(Debug, Default)]
struct Log {
    executed: Vec<String>,
    errors: Vec<(String, CommandError, bool)>,
}

#[derive(Clone)]
struct Source {
    name: Arc<str>,
    log: Arc<Mutex<Log>>,
    callback: ResultCallback,
}

impl Source {
    fn named(&self, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            log: self.log.clone(),
            callback: ResultCallback::EMPTY,
        }
    }
}

impl ExecutionSource for Source {
    fn callback(&self) -> ResultCallback {
        self.callback.clone()
    }

    fn with_callback(&self, callback: ResultCallback) -> Self {
        Self {
            callback,
            ..self.clone()
        }
    }

    fn handle_error(&self, error: &CommandError, forked: bool, tracer: Option<&mut dyn TraceSink>) {
        if let Some(tracer) = tracer {
            tracer.on_error(&error.to_string());
        }
        self.log
            .lock()
            .errors
            .push((self.name.to_string(), error.clone(), forked));
    }
}

fn length(source: &Source) -> Result<i32, CommandError> {
    source.log.lock().executed.push(source.name.to_string());
    i32::try_from(source.name.len()).map_err(|_| CommandError::failed("name too long"))
}

fn build_chain(input: &str, stages: &[StageCase], command: &CommandCase) -> ContextChain<Source> {
    let builder = stages
        .iter()
        .fold(ContextChain::build(input), |builder, stage| {
            add_stage(builder, stage.clone())
        });
    match command.clone() {
        CommandCase::Length => builder.execute(length),
        CommandCase::Fail(message) => builder.execute(move |source: &Source| {
            source.log.lock().executed.push(source.name.to_string());
            Err(CommandError::failed(message.clone()))
        }),
        CommandCase::ReturnValue(value) => builder.execute_custom(ReturnValue(value)),
        CommandCase::ReturnFailure => builder.execute_custom(ReturnFailure),
        CommandCase::Function { name, lines } => {
            let function = InstantiatedFunction::from_chains(
                name.as_str(),
                lines.iter().enumerate().map(|(index, line)| {
                    build_chain(&format!("{name}:{index}"), &line.stages, &line.command)
                }),
            );
            builder.execute_custom(CallFunctionCommand::new(function))
        }
    }
}

fn add_stage(builder: ChainBuilder<Source>, stage: StageCase) -> ChainBuilder<Source> {
    match stage {
        StageCase::Redirect => builder.redirect(),
        StageCase::Fork(names) => builder.fork(move |source: &Source| {
            Ok(names.iter().map(|name| source.named(name)).collect())
        }),
        StageCase::Modify(names) => builder.modify(move |source: &Source| {
            Ok(names.iter().map(|name| source.named(name)).collect())
        }),
        StageCase::Reject(rejected) => builder.modify(move |source: &Source| {
            if *source.name == *rejected {
                Err(CommandError::failed(format!("{rejected} rejected")))
            } else {
                Ok(vec![source.clone()])
            }
        }),
        StageCase::ReturnRun => builder.custom(false, ReturnRun),
    }
}

impl Case {
    fn default_source() -> String {
        String::from("root")
    }

    fn run(&self, name: &str) -> Observed {
        let returned = Arc::new(Mutex::new(Vec::new()));
        let callback = {
            let returned = returned.clone();
            ResultCallback::new(move |success, value| returned.lock().push((success, value)))
        };
        let source = Source {
            name: Arc::from(self.source.as_str()),
            log: Arc::default(),
            callback: ResultCallback::EMPTY,
        };

        let mut context = ExecutionContext::new(self.config);
        context.queue_initial_command_execution(
            build_chain(name, &self.stages, &self.command),
            source.clone(),
            callback,
        );
        let outcome = context.run_command_queue();

        let mut log = source.log.lock();
        let returned = returned.lock().clone();
        Observed {
            outcome,
            executed: std::mem::take(&mut log.executed),
            returned,
            errors: std::mem::take(&mut log.errors),
            quota: self.expected.quota.map(|_| context.command_quota()),
        }
    }
}

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn main() {
    let logs = LogCapture::default();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .try_init()
        .unwrap();
    for entry in std::fs::read_dir("tests/cases").unwrap() {
        let entry = entry.unwrap().path();
        if entry.extension().is_some_and(|ext| ext == "rsn") {
            run_test_cases(&entry);
        }
    }

    // limits.rsn exhausts its quota, which the run loop logs.
    let logs = String::from_utf8_lossy(&logs.0.lock()).into_owned();
    assert!(
        logs.contains("command execution stopped due to limit"),
        "run loop events were not logged: {logs:?}"
    );
}

fn run_test_cases(path: &Path) {
    let contents = std::fs::read_to_string(path).unwrap();

    let cases: BTreeMap<String, Case> = match rsn::parser::Config::default()
        .allow_implicit_map(true)
        .deserialize(&contents)
    {
        Ok(cases) => cases,
        Err(err) => unreachable!("error parsing {}: {err}", path.display()),
    };
    for (name, case) in cases {
        println!("Running {name}");
        let output = case.run(&name);
        assert_eq!(
            output,
            case.expected,
            "in {path} @ {name}: expected {expected:?}, got {output:?}",
            path = path.display(),
            expected = case.expected
        );
    }
}
