use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use is_terminal::IsTerminal;
use tracing::{debug, info};

use promptrun::cli::Cli;
use promptrun::config::Config;
use promptrun::engine::{run_on_engine_thread, EngineConfig, ExecutionController, SessionState};
use promptrun::logging::{self, LogTarget};
use promptrun::printer::{run_plain, TextPrinter};
use promptrun::tui::run_tui;
use promptrun::utils::ScriptSource;

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // Load config
    let cfg = Config::load();

    // Resolve the script: file, stdin, or --eval
    let from_stdin = args.script_from_stdin();
    let source = match (&args.script, &args.eval) {
        (Some(_), _) if from_stdin => ScriptSource::from_stdin()?,
        (Some(path), None) => ScriptSource::from_path(path)?,
        (None, Some(code)) => ScriptSource::inline(code.clone()),
        _ => bail!("provide a script file or --eval"),
    };

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let plain = args.plain || from_stdin || !stdin_is_tty || !stdout_is_tty;

    // Log level: CLI overrides config
    let level = args
        .log_level
        .clone()
        .or_else(|| cfg.get("LOG_LEVEL"))
        .unwrap_or_else(|| "warn".to_string());
    let log_path = cfg.log_path();
    let target = if plain { LogTarget::Stderr } else { LogTarget::File(&log_path) };
    logging::init(&level, target)?;
    debug!(config = %cfg.config_path.display(), "configuration loaded");

    let mut engine_config = EngineConfig::from_config(&cfg);
    if let Some(ms) = args.timer_ceiling_ms {
        engine_config.timer_ceiling = Duration::from_millis(ms);
    }
    if let Some(ms) = args.grace_ms {
        engine_config.grace_delay = Duration::from_millis(ms);
    }

    info!(script = %source.label, plain, "starting");
    let tick = Duration::from_millis(cfg.tick_interval_ms());
    let inputs = args.input;

    // Scripts run on their own thread, with a stack sized for deep recursion
    let final_state = run_on_engine_thread(move || async move {
        let controller = ExecutionController::new(engine_config);
        for value in inputs {
            controller.submit_input(value);
        }
        if plain {
            let printer = TextPrinter { color: stdout_is_tty, echo_input: !stdin_is_tty };
            run_plain(&controller, source.text, &printer, !from_stdin).await
        } else {
            run_tui(&controller, source, tick).await?;
            Ok(controller.state())
        }
    })??;

    Ok(if final_state == SessionState::Failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
