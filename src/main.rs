use std::io::{self, IsTerminal, Read, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use ttt::cli::{Cli, CliAction, PromptSource, SendRequest};
use ttt::config::{Config, EnvOverrides};
use ttt::interrupt::Interrupt;
use ttt::session::Session;
use ttt::{logging, providers, repl, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let action = cli.action().context("invalid command arguments")?;
    let config = Config::load(
        cli.config.as_deref(),
        &EnvOverrides::from_env(),
        &cli.overrides(),
    )
    .context("failed to load configuration")?;

    let log_target = logging::init(&config.log_dir, &config.log_filter);
    info!(?log_target, chat = %config.chat_name, "starting ttt");

    let interrupt = Interrupt::new();
    let _signal_guard = interrupt
        .install()
        .inspect_err(|error| warn!(%error, "Ctrl-C will not cancel requests"))
        .ok();

    let backend = providers::backend_for_config(&config, &interrupt)
        .context("failed to initialize completion provider")?;
    let mut session = Session::open(config, backend)
        .context("failed to open conversation")?
        .with_interrupt(interrupt);

    let stdin = io::stdin();
    let action = match action {
        Some(action) => action,
        None if stdin.is_terminal() => CliAction::Repl,
        None => CliAction::Send(SendRequest::stdin()),
    };

    let mut stdout = io::stdout().lock();
    match action {
        CliAction::Repl => {
            writeln!(stdout, "ttt: plain text is sent to the model; /help lists commands")?;
            repl::run(&mut session, stdin.lock(), &mut stdout)?;
        }
        CliAction::Send(request) => {
            let text = match &request.source {
                PromptSource::Text(text) => text.clone(),
                PromptSource::File(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read prompt file {}", path.display()))?
                    .trim()
                    .to_string(),
                PromptSource::Stdin => {
                    let mut text = String::new();
                    stdin
                        .lock()
                        .read_to_string(&mut text)
                        .context("failed to read prompt from stdin")?;
                    text.trim_end().to_string()
                }
            };
            anyhow::ensure!(!text.trim().is_empty(), "no prompt given");
            let command = request.command(text);
            if request.echo_prompt {
                let outcome = session.execute(command, &mut |_| {})?;
                repl::write_echoed(&mut stdout, &outcome)?;
            } else {
                execute(&mut session, command, &mut stdout)?;
            }
        }
        CliAction::Run(command) => execute(&mut session, command, &mut stdout)?,
    }
    Ok(())
}

fn execute(session: &mut Session, command: Command, stdout: &mut impl Write) -> Result<()> {
    let outcome = {
        let mut on_chunk = |chunk: &str| {
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        };
        session.execute(command, &mut on_chunk)?
    };
    repl::write_output(stdout, &outcome)?;
    Ok(())
}
