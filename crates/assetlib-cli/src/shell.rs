//! Interactive command shell.
//!
//! Each input line is `name arg...`, split with shell quoting rules so paths
//! containing spaces can be quoted. A `--blocking` word anywhere on the line
//! marks the submission as blocking. Notifications that arrived while the
//! user was typing are printed before the next prompt.

use std::io::{self, BufRead, Write};

use assetlib_protocol::{BLOCKING_KEY, KeywordArguments};
use serde_json::Value;

use crate::invoker::Invoker;

/// Prompt printed before each line is read.
pub(crate) const PROMPT: &str = "command> ";

const BLOCKING_FLAG: &str = "--blocking";

#[derive(Debug, PartialEq, Eq)]
enum ShellLine {
    Blank,
    Quit,
    Clients,
    Help,
    Submit {
        name: String,
        args: Vec<String>,
        blocking: bool,
    },
}

impl ShellLine {
    fn parse(line: &str) -> Result<Self, shell_words::ParseError> {
        let mut words = shell_words::split(line)?;
        let blocking = words.iter().any(|word| word == BLOCKING_FLAG);
        words.retain(|word| word != BLOCKING_FLAG);
        let mut remaining = words.into_iter();
        let Some(name) = remaining.next() else {
            return Ok(Self::Blank);
        };
        Ok(match name.as_str() {
            "quit" | "exit" => Self::Quit,
            "clients" => Self::Clients,
            "help" | "?" => Self::Help,
            _ => Self::Submit {
                name,
                args: remaining.collect(),
                blocking,
            },
        })
    }
}

/// Reads lines from `input` until `quit`, `exit` or end of input, submitting
/// each one through `invoker`.
///
/// Command failures are reported on `errors` and the shell keeps going.
///
/// # Errors
///
/// Returns an IO error only when reading input or writing output fails.
pub(crate) fn run_shell<R, W, E>(
    invoker: &mut Invoker,
    mut input: R,
    output: &mut W,
    errors: &mut E,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut line = String::new();
    loop {
        print_notifications(invoker, output)?;
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }

        let parsed = match ShellLine::parse(&line) {
            Ok(parsed) => parsed,
            Err(error) => {
                writeln!(errors, "could not parse line: {error}")?;
                continue;
            }
        };
        match parsed {
            ShellLine::Blank => {}
            ShellLine::Quit => return Ok(()),
            ShellLine::Help => print_help(output)?,
            ShellLine::Clients => match invoker.clients() {
                Ok(clients) => {
                    for client in clients {
                        writeln!(output, "{client}")?;
                    }
                }
                Err(error) => writeln!(errors, "{error}")?,
            },
            ShellLine::Submit {
                name,
                args,
                blocking,
            } => {
                let mut kwargs = KeywordArguments::new();
                if blocking {
                    kwargs.insert(BLOCKING_KEY.to_owned(), Value::Bool(true));
                }
                let values = args.into_iter().map(Value::String).collect();
                match invoker.submit(&name, values, kwargs) {
                    Ok(ack) => writeln!(output, "{}", ack.info.as_deref().unwrap_or("ok"))?,
                    Err(error) => writeln!(errors, "{error}")?,
                }
            }
        }
    }
}

fn print_notifications<W: Write>(invoker: &Invoker, output: &mut W) -> io::Result<()> {
    for notification in invoker.pending_notifications() {
        writeln!(output, "{notification}")?;
    }
    Ok(())
}

fn print_help<W: Write>(output: &mut W) -> io::Result<()> {
    writeln!(output, "commands: import PATH, reference PATH, time, sleep SECONDS")?;
    writeln!(output, "add {BLOCKING_FLAG} to wait until every queued command has run")?;
    writeln!(output, "clients lists registered clients; quit or exit leaves")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assetlib_config::SocketEndpoint;
    use rstest::rstest;

    use super::*;
    use crate::invoker::{InvokerSettings, InvokerState};

    #[rstest]
    #[case("\n", ShellLine::Blank)]
    #[case("   \t ", ShellLine::Blank)]
    #[case("quit", ShellLine::Quit)]
    #[case(" exit \n", ShellLine::Quit)]
    #[case("clients", ShellLine::Clients)]
    #[case("help", ShellLine::Help)]
    #[case(
        "import '/assets/hero v003/hero.obj'",
        ShellLine::Submit {
            name: "import".to_owned(),
            args: vec!["/assets/hero v003/hero.obj".to_owned()],
            blocking: false,
        }
    )]
    #[case(
        "sleep --blocking 0.5",
        ShellLine::Submit { name: "sleep".to_owned(), args: vec!["0.5".to_owned()], blocking: true }
    )]
    fn parses_shell_lines(#[case] line: &str, #[case] expected: ShellLine) {
        assert_eq!(ShellLine::parse(line).expect("parse"), expected);
    }

    #[test]
    fn unbalanced_quotes_are_reported() {
        assert!(ShellLine::parse("import 'unterminated").is_err());
    }

    fn offline_invoker() -> Invoker {
        Invoker::new(InvokerSettings {
            control: SocketEndpoint::tcp("127.0.0.1", 1),
            command: SocketEndpoint::tcp("127.0.0.1", 1),
            inbound: SocketEndpoint::tcp("127.0.0.1", 0),
            advertise: None,
            timeout: Some(Duration::from_secs(1)),
        })
    }

    #[test]
    fn end_of_input_leaves_the_shell() {
        let mut invoker = offline_invoker();
        let mut output = Vec::new();
        let mut errors = Vec::new();

        run_shell(&mut invoker, b"\n\n".as_slice(), &mut output, &mut errors).expect("shell");

        let printed = String::from_utf8(output).expect("utf8");
        assert_eq!(printed.matches(PROMPT).count(), 3);
        assert!(errors.is_empty());
    }

    #[test]
    fn failures_are_reported_and_the_shell_continues() {
        let mut invoker = offline_invoker();
        let mut output = Vec::new();
        let mut errors = Vec::new();

        run_shell(&mut invoker, b"time\nquit\ntime\n".as_slice(), &mut output, &mut errors)
            .expect("shell");

        let reported = String::from_utf8(errors).expect("utf8");
        assert_eq!(reported.lines().count(), 1);
        assert!(reported.contains("not registered"));
        assert_eq!(invoker.state(), InvokerState::Disconnected);
    }
}
