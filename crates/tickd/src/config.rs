//! Splits configuration flags off the command line and loads [`Config`].
//!
//! Configuration flags must precede the verb: `tickd --tick-interval-ms 500
//! debug`. Scanning stops at the first argument that is not a recognised
//! flag, and everything from there on is parsed as the command.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use tickd_config::Config;

use crate::runner::CliError;

/// Flags forwarded to the configuration loader.
///
/// Keep in sync with the fields of [`tickd_config::Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--service-name",
    "--service-description",
    "--log-filter",
    "--log-format",
    "--log-file",
    "--tick-interval-ms",
    "--interrogate-delay-secs",
    "--restart-delay-secs",
    "--control-timeout-secs",
];

/// Source of configuration for the CLI.
pub trait ConfigLoader {
    /// Loads configuration from the program name followed by the split-off
    /// configuration flags, layered over environment and file sources.
    fn load(&self, args: &[OsString]) -> Result<Config, CliError>;
}

/// Loader backed by `ortho_config`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, CliError> {
        Config::load_from_iter(args.iter().cloned()).map_err(CliError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
        None => (&*text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Result of splitting the raw argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the command tokens.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut remaining = args.iter();
    let Some(program) = remaining.next() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_arguments: Vec::new(),
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut command_arguments = vec![program.clone()];
    let mut pending_value = false;
    let mut scanning = true;

    for argument in remaining {
        if !scanning {
            command_arguments.push(argument.clone());
            continue;
        }
        if pending_value {
            config_arguments.push(argument.clone());
            pending_value = false;
            continue;
        }
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                pending_value = needs_value;
            }
            FlagAction::Stop => {
                scanning = false;
                command_arguments.push(argument.clone());
            }
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case("--log-filter", FlagAction::Include { needs_value: true })]
    #[case("debug", FlagAction::Stop)]
    #[case("--unknown", FlagAction::Stop)]
    fn classifies_arguments(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[rstest]
    fn splits_flags_from_the_verb() {
        let split = split_config_arguments(&os(&[
            "tickd",
            "--tick-interval-ms",
            "500",
            "--log-format=compact",
            "debug",
            "--log-filter",
            "trace",
        ]));

        assert_eq!(
            split.config_arguments,
            os(&["tickd", "--tick-interval-ms", "500", "--log-format=compact"])
        );
        assert_eq!(
            split.command_arguments,
            os(&["tickd", "debug", "--log-filter", "trace"])
        );
    }

    #[rstest]
    fn empty_arguments_split_into_nothing() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(split.command_arguments.is_empty());
    }
}
