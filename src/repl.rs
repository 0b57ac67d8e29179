//! Line-oriented interactive loop.

use std::io::{self, BufRead, Write};

use completion_provider::Prompt;
use tracing::{debug, warn};

use crate::commands::parse_line;
use crate::session::{CommandOutput, Session, TurnOutcome};

pub const PROMPT: &str = "> ";

/// Reads lines until `/quit` or end of input.
///
/// Parse and session errors are printed and the loop keeps going; only I/O
/// failures on `output` end it early.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session,
    mut input: R,
    output: &mut W,
) -> io::Result<()> {
    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                writeln!(output, "error: {error}")?;
                continue;
            }
        };
        debug!(?command, "repl command");

        let result = {
            let mut on_chunk = |chunk: &str| {
                let _ = output.write_all(chunk.as_bytes());
                let _ = output.flush();
            };
            session.execute(command, &mut on_chunk)
        };
        match result {
            Ok(CommandOutput::Quit) => return Ok(()),
            Ok(outcome) => write_output(output, &outcome)?,
            Err(error) => {
                warn!(%error, "command failed");
                writeln!(output, "error: {error}")?;
            }
        }
    }
}

/// Prints a command result the same way for the REPL and one-shot commands.
pub fn write_output<W: Write>(output: &mut W, outcome: &CommandOutput) -> io::Result<()> {
    match outcome {
        CommandOutput::Text(text) => writeln!(output, "{text}"),
        CommandOutput::Turn(turn) => write_turn(output, turn),
        CommandOutput::Turns(turns) => {
            for turn in turns {
                write_turn(output, turn)?;
            }
            Ok(())
        }
        CommandOutput::Quit => Ok(()),
    }
}

/// Prints each turn's prompt followed by its reply.
pub fn write_echoed<W: Write>(output: &mut W, outcome: &CommandOutput) -> io::Result<()> {
    let turns = match outcome {
        CommandOutput::Turn(turn) => std::slice::from_ref(turn),
        CommandOutput::Turns(turns) => turns.as_slice(),
        other => return write_output(output, other),
    };
    for turn in turns {
        match &turn.prompt {
            Prompt::Text(text) => write!(output, "{text}")?,
            messages => writeln!(output, "{}", messages.flatten())?,
        }
        write_turn(
            output,
            &TurnOutcome {
                streamed: false,
                ..turn.clone()
            },
        )?;
    }
    Ok(())
}

fn write_turn<W: Write>(output: &mut W, turn: &TurnOutcome) -> io::Result<()> {
    if turn.streamed {
        writeln!(output)?;
    } else {
        writeln!(output, "{}", turn.reply)?;
    }
    if turn.truncated > 0 {
        writeln!(
            output,
            "note: left out the {} oldest node(s) to fit the context window",
            turn.truncated
        )?;
    }
    if !turn.alternatives.is_empty() {
        let ids = turn
            .alternatives
            .iter()
            .map(|id| format!("[{id}]"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            output,
            "note: {} more choice(s) stored as siblings {ids}; /down shows the next one",
            turn.alternatives.len()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use completion_provider_mock::MockBackend;
    use conversation_tree::Tree;
    use prompt_assembler::BpeTokenizer;

    use super::{run, write_echoed};
    use crate::commands::Command;
    use crate::config::Config;
    use crate::session::Session;

    fn session(replies: &[&str]) -> Session {
        let mut config = Config::defaults(None);
        config.persist = false;
        Session::new(
            config,
            Tree::new(),
            Arc::new(MockBackend::scripted(replies.iter().copied())),
            Arc::new(BpeTokenizer::cl100k().expect("cl100k table")),
        )
    }

    #[test]
    fn loop_prints_replies_and_keeps_going_after_errors() {
        let mut session = session(&["hi there"]);
        let mut output = Vec::new();

        run(&mut session, "hello\n/bogus\n/quit\n".as_bytes(), &mut output).expect("loop");

        let output = String::from_utf8(output).expect("utf8");
        assert!(output.contains("hi there"));
        assert!(output.contains("error: unknown command 'bogus'; try /help"));
        assert_eq!(session.tree().len(), 2);
    }

    #[test]
    fn echoed_turns_show_the_prompt_before_the_reply() {
        let mut session = session(&["hi there"]);
        let outcome = session
            .execute(Command::Send("hello".to_string()), &mut |_| {})
            .expect("turn");
        let mut output = Vec::new();

        write_echoed(&mut output, &outcome).expect("write");

        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "In: hello\nOut: hi there\n"
        );
    }
}
