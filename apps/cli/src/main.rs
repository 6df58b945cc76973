use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    pocketcall_agents::dialect_for,
    pocketcall_config::load_config,
    pocketcall_harness::{HarnessFrame, HarnessRunner, ScriptedSession, SuiteReport, TestSuite},
    pocketcall_protocol::{DialectKind, ToolDescriptor},
    tracing::{Subscriber, info, warn},
    tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, prelude::*, reload},
};

/// Filter level used until the configuration has been read.
const STARTUP_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Tool-calling protocol engine for small on-device models.
///
/// Compiles tool lists into dialect prompts, parses model output back into
/// tool invocations, and runs declarative test suites against a scripted
/// inference session.
#[derive(Parser, Debug)]
#[command(name = "pocketcall", version)]
struct Cli {
    /// Path to pocketcall.toml (default: ./pocketcall.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dialect to use, overriding the configuration.
    #[arg(long, global = true)]
    dialect: Option<DialectKind>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a test suite against scripted model responses.
    Run {
        /// Suite file (`{"tests": [...]}`).
        #[arg(long)]
        suite: PathBuf,
        /// Scripted responses: `{"<test id>": ["response", ...]}`.
        #[arg(long)]
        script: PathBuf,
        /// Print every harness frame as a JSON line.
        #[arg(long)]
        frames: bool,
    },
    /// Print the tool prompt a dialect compiles for a tool list.
    Compile {
        /// JSON array of tool descriptors.
        #[arg(long)]
        tools: PathBuf,
    },
    /// Parse model output and print the outcomes as JSON.
    Parse {
        /// JSON array of tool descriptors.
        #[arg(long)]
        tools: Option<PathBuf>,
        /// Model output; read from stdin when omitted.
        #[arg(long)]
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (subscriber, filter) = build_subscriber(
        EnvFilter::try_from_default_env().ok(),
        cli.json_logs,
        std::io::stderr,
    );
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    apply_log_level(filter.as_ref(), &config.log_level);

    let kind = cli.dialect.unwrap_or(config.dialect.kind);
    match cli.command {
        Command::Run {
            suite,
            script,
            frames,
        } => {
            let suite = TestSuite::load(&suite)
                .with_context(|| format!("failed to load suite {}", suite.display()))?;
            let script = load_script(&script)?;
            let session = scripted_session(&suite, script, config.harness.stream_chunk_chars);

            let mut runner = HarnessRunner::new(dialect_for(kind), Box::new(session), &config);
            if frames {
                runner = runner.with_on_frame(Arc::new(print_frame));
            }
            let cancel = runner.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            info!(dialect = %kind, tests = suite.tests.len(), "running suite");
            let report = runner.run_suite(&suite).await;
            print_summary(&report);
            Ok(if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        },
        Command::Compile { tools } => {
            let tools = load_tools(&tools)?;
            println!("{}", dialect_for(kind).compile_schema(&tools));
            Ok(ExitCode::SUCCESS)
        },
        Command::Parse { tools, text } => {
            let tools = match tools {
                Some(path) => load_tools(&path)?,
                None => Vec::new(),
            };
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read model output from stdin")?;
                    buf
                },
            };
            let outcomes = dialect_for(kind).parse(&text, &tools, &[]);
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// The subscriber is built before the configuration is loaded so config
/// discovery is logged. `env_filter` (from `RUST_LOG`) is final; otherwise
/// the returned handle swaps in the configured level later.
fn build_subscriber<W>(
    env_filter: Option<EnvFilter>,
    json: bool,
    writer: W,
) -> (Box<dyn Subscriber + Send + Sync>, Option<FilterHandle>)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let fixed = env_filter.is_some();
    let (filter, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(STARTUP_LOG_LEVEL)));
    let registry = tracing_subscriber::registry().with(filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let subscriber: Box<dyn Subscriber + Send + Sync> = if json {
        Box::new(registry.with(fmt_layer.json()))
    } else {
        Box::new(registry.with(fmt_layer))
    };
    (subscriber, (!fixed).then_some(handle))
}

fn apply_log_level(filter: Option<&FilterHandle>, level: &str) {
    if let Some(filter) = filter
        && let Err(err) = filter.reload(EnvFilter::new(level))
    {
        warn!(error = %err, "failed to apply configured log level");
    }
}

fn load_tools(path: &Path) -> Result<Vec<ToolDescriptor>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tools {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid tool list {}", path.display()))
}

fn load_script(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid script {}", path.display()))
}

/// One response group per case, in suite order. Cases without a script get
/// none and fail with an exhausted session.
fn scripted_session(
    suite: &TestSuite,
    mut script: HashMap<String, Vec<String>>,
    chunk_chars: usize,
) -> ScriptedSession {
    suite.tests.iter().fold(ScriptedSession::new(chunk_chars), |session, case| {
        session.with_case(script.remove(&case.id).unwrap_or_default())
    })
}

fn print_frame(frame: HarnessFrame) {
    if let Ok(line) = serde_json::to_string(&frame) {
        println!("{line}");
    }
}

fn print_summary(report: &SuiteReport) {
    for result in &report.results {
        if result.passed {
            println!("PASS {} ({} ms)", result.id, result.duration_ms);
        } else {
            println!("FAIL {} ({} ms)", result.id, result.duration_ms);
            for failure in &result.failures {
                println!("     - {failure}");
            }
        }
    }
    println!("{} passed, {} failed", report.passed, report.failed);
}
