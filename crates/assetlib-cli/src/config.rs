//! Separates configuration flags from the rest of the command line.
//!
//! Configuration flags are resolved by `assetlib_config` and must lead the
//! command line. Everything from the first other token on is parsed as the
//! subcommand, so a later `--log-filter` belongs to the subcommand.

use std::ffi::{OsStr, OsString};

use assetlib_config::CONFIG_CLI_FLAGS;

#[derive(Debug, Clone, Copy)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Command line split between the configuration loader and the subcommand
/// parser. Both halves start with the binary name.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config: Vec<OsString>,
    pub(crate) command: Vec<OsString>,
}

pub(crate) fn split_config_arguments<I>(args: I) -> ArgumentSplit
where
    I: IntoIterator<Item = OsString>,
{
    let mut remaining = args.into_iter().peekable();
    let Some(binary) = remaining.next() else {
        return ArgumentSplit::default();
    };

    let mut config = vec![binary.clone()];
    while let Some(FlagAction::Include { needs_value }) =
        remaining.peek().map(|argument| classify(argument.as_os_str()))
    {
        config.extend(remaining.next());
        if needs_value {
            config.extend(remaining.next());
        }
    }

    let mut command = vec![binary];
    command.extend(remaining);
    ArgumentSplit { config, command }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case(&["assetlib"], &["assetlib"], &["assetlib"])]
    #[case(
        &["assetlib", "--log-filter", "debug", "import", "/a.obj"],
        &["assetlib", "--log-filter", "debug"],
        &["assetlib", "import", "/a.obj"]
    )]
    #[case(
        &["assetlib", "--log-format=compact", "--control-socket", "tcp://h:1", "clients"],
        &["assetlib", "--log-format=compact", "--control-socket", "tcp://h:1"],
        &["assetlib", "clients"]
    )]
    #[case(
        &["assetlib", "exec", "sleep", "--log-filter", "debug"],
        &["assetlib"],
        &["assetlib", "exec", "sleep", "--log-filter", "debug"]
    )]
    #[case(
        &["assetlib", "--help", "--log-filter", "debug"],
        &["assetlib"],
        &["assetlib", "--help", "--log-filter", "debug"]
    )]
    fn leading_config_flags_are_split_off(
        #[case] args: &[&str],
        #[case] config: &[&str],
        #[case] command: &[&str],
    ) {
        let split = split_config_arguments(os(args));
        assert_eq!(split.config, os(config));
        assert_eq!(split.command, os(command));
    }

    #[test]
    fn trailing_flag_without_value_is_kept() {
        let split = split_config_arguments(os(&["assetlib", "--log-filter"]));
        assert_eq!(split.config, os(&["assetlib", "--log-filter"]));
        assert_eq!(split.command, os(&["assetlib"]));
    }

    #[test]
    fn empty_arguments_split_to_nothing() {
        assert_eq!(split_config_arguments(Vec::new()), ArgumentSplit::default());
    }
}
