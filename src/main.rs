use std::process;

use anyhow::{Context, Result};
use caller::output::{render, render_call_error, render_result};
use caller::{Application, CallRequest};
use caller_core::exit_codes::{exit_status, EX_GENERIC, EX_OK, EX_USAGE};
use caller_core::logging::{init_logging, LogFormat, LogLevel};
use caller_core::{AppConfig, CallerError, OutputFormat};
use caller_worker::CallError;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

/// Run one function on this node and report its result.
#[derive(Parser, Debug)]
#[command(name = "caller")]
#[command(version = "1.0.0")]
#[command(about = "Run a single job locally and report its result")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error, quiet)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (json, pretty)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Output format (nested, json, txt, quiet)
    #[arg(long, global = true)]
    out: Option<OutputFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call a function
    Call(CallArgs),
    /// List jobs still running on this host
    Running,
    /// List locally cached jobs, or show one
    Jobs {
        /// Job id to show
        jid: Option<String>,
    },
    /// Show documentation of functions starting with a prefix
    Doc {
        prefix: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Function to call, e.g. test.ping
    fun: String,

    /// Positional arguments and key=value keyword arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Keep the result on this node instead of returning it to the controller
    #[arg(long)]
    local: bool,

    /// Exit with the job's retcode instead of collapsing it to 0/1
    #[arg(long)]
    retcode_passthrough: bool,

    /// Comma separated delivery sinks, in order
    #[arg(long = "return", value_delimiter = ',')]
    returners: Vec<String>,

    /// JSON metadata stored with the job
    #[arg(long)]
    metadata: Option<String>,

    /// Print the whole job result instead of the return value
    #[arg(long)]
    print_metadata: bool,

    /// Keyword arguments whose values are never parsed
    #[arg(long, value_delimiter = ',')]
    no_parse: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return EX_GENERIC;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e:#}");
        return EX_GENERIC;
    }
    debug!("Configuration loaded for node {}", config.caller.id);

    let app = match Application::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start caller: {e:#}");
            eprintln!("{e:#}");
            return match e.downcast_ref::<CallerError>() {
                Some(CallerError::ExecutorUnavailable(_)) => EX_USAGE,
                _ => EX_GENERIC,
            };
        }
    };

    let result = match cli.command {
        Commands::Call(args) => run_call(&app, args, cli.out).await,
        Commands::Running => run_running(&app, cli.out).await,
        Commands::Jobs { jid } => run_jobs(&app, jid.as_deref(), cli.out).await,
        Commands::Doc { prefix } => {
            let docs = app.docs(prefix.as_deref());
            let docs: Map<String, Value> = docs
                .into_iter()
                .map(|(name, doc)| (name, Value::String(doc)))
                .collect();
            print!("{}", render(&Value::Object(docs), cli.out.unwrap_or_default()));
            Ok(EX_OK)
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("{e:#}");
        EX_GENERIC
    })
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {path}"),
        None => "Failed to load configuration".to_string(),
    })?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(out) = cli.out {
        config.caller.output = Some(out);
    }

    if let Commands::Call(args) = &cli.command {
        if args.local {
            config.caller.local = true;
        }
        if args.retcode_passthrough {
            config.caller.retcode_passthrough = true;
        }
        if args.print_metadata {
            config.caller.print_metadata = true;
        }
        if !args.returners.is_empty() {
            config.returners.names = args.returners.clone();
        }
    }

    Ok(config)
}

async fn run_call(app: &Application, args: CallArgs, out: Option<OutputFormat>) -> Result<i32> {
    let metadata = args
        .metadata
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--metadata must be valid JSON")?;

    let request = CallRequest {
        fun: args.fun,
        tokens: args.args,
        no_parse: args.no_parse,
        metadata,
    };

    let caller_config = &app.config().caller;
    match app.call(request).await {
        Ok(outcome) => {
            let format = out.or(caller_config.output);
            print!(
                "{}",
                render_result(&outcome.result, format, caller_config.print_metadata)
            );
            if !outcome.delivery.all_succeeded() {
                info!(jid = %outcome.result.jid, "Job completed with delivery failures");
            }
            Ok(exit_status(
                outcome.result.retcode,
                caller_config.retcode_passthrough,
            ))
        }
        Err(e) => {
            report_call_error(&e, app.config().logging.level.shows_error_detail());
            Ok(e.exit_code())
        }
    }
}

fn report_call_error(err: &CallError, detail: bool) {
    debug!(
        fun = %err.fun(),
        error_kind = ?err.error_kind(),
        phase = %err.phase(),
        "Call failed"
    );
    eprint!("{}", render_call_error(err, detail));
}

async fn run_running(app: &Application, out: Option<OutputFormat>) -> Result<i32> {
    let markers = app.running().await?;
    let running: Map<String, Value> = markers
        .into_iter()
        .map(|marker| {
            let jid = marker.jid.to_string();
            serde_json::to_value(marker).map(|value| (jid, value))
        })
        .collect::<Result<_, _>>()?;
    print!("{}", render(&Value::Object(running), out.unwrap_or_default()));
    Ok(EX_OK)
}

async fn run_jobs(app: &Application, jid: Option<&str>, out: Option<OutputFormat>) -> Result<i32> {
    match jid {
        Some(jid) => match app.job(jid).await? {
            Some(result) => {
                print!("{}", render_result(&result, out, true));
                Ok(EX_OK)
            }
            None => {
                eprintln!("Job {jid} is not in the local job cache");
                Ok(EX_GENERIC)
            }
        },
        None => {
            let jids = app
                .jobs()
                .await?
                .into_iter()
                .map(|jid| Value::String(jid.to_string()))
                .collect();
            print!("{}", render(&Value::Array(jids), out.unwrap_or_default()));
            Ok(EX_OK)
        }
    }
}
