//! Headless driver for the Fabric Desk core.
//!
//! Lists patterns and models, probes the serve process, and streams
//! pattern runs to the terminal through the same [`AppContext`] a
//! graphical frontend would sit on.

mod context;
mod runner;

use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::Context as _;
use engine::api::{filter_patterns, PatternListing};
use services::AppPaths;
use tracing::info;

use crate::context::AppContext;

const USAGE: &str = "\
Usage: fabric-desk <command> [args]

Commands:
  patterns [QUERY]    list pattern names, optionally filtered
  models              list models grouped by provider
  status              probe the engine server once
  run PATTERN [-m MODEL] [--http] [TEXT]
                      run a pattern over TEXT, or stdin when omitted
";

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Patterns {
        query: Option<String>,
    },
    Models,
    Status,
    Run {
        pattern: String,
        model: Option<String>,
        http: bool,
        text: Option<String>,
    },
}

fn parse_args(args: &[String]) -> Option<Mode> {
    let mut iter = args.iter();
    match iter.next().map(String::as_str) {
        Some("patterns") => Some(Mode::Patterns {
            query: iter.next().cloned(),
        }),
        Some("models") => Some(Mode::Models),
        Some("status") => Some(Mode::Status),
        Some("run") => {
            let pattern = iter.next().cloned()?;
            let mut model = None;
            let mut http = false;
            let mut text = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "-m" => model = Some(iter.next()?.clone()),
                    "--http" => http = true,
                    _ => text = Some(arg.clone()),
                }
            }
            Some(Mode::Run {
                pattern,
                model,
                http,
                text,
            })
        }
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(mode) = parse_args(&args) else {
        eprint!("{USAGE}");
        std::process::exit(2);
    };

    let paths = AppPaths::discover()?;
    let log = services::logging::init(&paths)?;
    info!(config_dir = %paths.config_dir().display(), "fabric desk starting");

    let code = match mode {
        Mode::Patterns { query } => cmd_patterns(AppContext::init_at(paths), query.as_deref()),
        Mode::Models => cmd_models(AppContext::init_at(paths)),
        Mode::Status => cmd_status(AppContext::init_at(paths)),
        Mode::Run {
            pattern,
            model,
            http,
            text,
        } => cmd_run(AppContext::init(paths), pattern, model, http, text)?,
    };

    log.flush_all();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn cmd_patterns(ctx: AppContext, query: Option<&str>) -> i32 {
    let code = match ctx.fetch_patterns() {
        PatternListing::Patterns(names) => {
            for name in filter_patterns(&names, query.unwrap_or("")) {
                println!("{name}");
            }
            0
        }
        PatternListing::Empty => {
            println!("The server reported no patterns.");
            0
        }
        PatternListing::Unreachable => {
            eprintln!("Engine server unreachable at {}.", ctx.settings.base_url);
            1
        }
    };
    ctx.shutdown();
    code
}

fn cmd_models(ctx: AppContext) -> i32 {
    let code = match ctx.fetch_models() {
        Ok(catalog) if catalog.is_empty() => {
            println!("The engine reported no models.");
            0
        }
        Ok(catalog) => {
            let default_model = engine::models::engine_default_model();
            for provider in catalog.providers() {
                println!("{}:", provider.name);
                for model in &provider.models {
                    if default_model.as_deref() == Some(model.as_str()) {
                        println!("  {model} (default)");
                    } else {
                        println!("  {model}");
                    }
                }
            }
            0
        }
        Err(err) => {
            eprintln!("Could not list models: {err:#}");
            1
        }
    };
    ctx.shutdown();
    code
}

fn cmd_status(mut ctx: AppContext) -> i32 {
    let online = ctx.probe_now();
    if online {
        println!("Engine server online at {}.", ctx.settings.base_url);
    } else {
        println!("Engine server offline at {}.", ctx.settings.base_url);
    }
    ctx.shutdown();
    if online {
        0
    } else {
        1
    }
}

fn cmd_run(
    mut ctx: AppContext,
    pattern: String,
    model: Option<String>,
    http: bool,
    text: Option<String>,
) -> anyhow::Result<i32> {
    let input = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("could not read stdin")?;
            buffer
        }
    };

    let mut settings = ctx.settings.clone();
    settings.last_pattern = pattern;
    settings.last_model = model.unwrap_or_default();
    ctx.apply_settings(settings);
    if http {
        ctx.use_http_transport();
    }

    if !ctx.probe_now() && !ensure_engine_started(&mut ctx) {
        ctx.shutdown();
        return Ok(1);
    }

    if let Err(err) = ctx.submit(&input) {
        eprintln!("{err}");
        ctx.shutdown();
        return Ok(1);
    }

    // Mirror fragments to stdout as they arrive.
    let mut printed = 0;
    while ctx.run_active() {
        ctx.pump();
        if ctx.output.len() > printed {
            print!("{}", &ctx.output[printed..]);
            let _ = io::stdout().flush();
            printed = ctx.output.len();
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    ctx.pump();
    if ctx.output.len() > printed {
        print!("{}", &ctx.output[printed..]);
        let _ = io::stdout().flush();
    }
    if !ctx.output.is_empty() && !ctx.output.ends_with('\n') {
        println!();
    }
    eprintln!("{}", ctx.status_line);

    let code = match ctx.last_status() {
        Some(status) if status.is_success() => 0,
        _ => 1,
    };
    ctx.shutdown();
    Ok(code)
}

/// Starts the serve process and waits for its HTTP surface to come up.
fn ensure_engine_started(ctx: &mut AppContext) -> bool {
    eprintln!(
        "Engine offline; starting `{} --serve`...",
        ctx.settings.engine_command
    );
    if let Err(err) = ctx.start_engine() {
        eprintln!("Could not start the engine: {err}");
        return false;
    }
    for _ in 0..20 {
        if ctx.probe_now() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    eprintln!("Engine process started but its API never came up.");
    let tail = ctx.engine_tail();
    if !tail.is_empty() {
        eprintln!("Recent engine output:");
        for line in tail {
            eprintln!("  {line}");
        }
    }
    false
}
