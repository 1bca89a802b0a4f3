//! The command-line options for `git-shelf`.
//!
//! Parsing doesn't stop at the first problem: every unknown flag, stray
//! argument and missing value is collected so that they can all be reported
//! together.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::ffi::OsString;

use clap::{Arg, Command as ClapCommand, CommandFactory, Parser};
use itertools::Itertools;
use lib::core::formatting::{Glyphs, TextStyle};
use thiserror::Error;

/// Snapshot uncommitted changes onto a per-branch shelf and push it to a remote
#[derive(Debug, Default, Parser, PartialEq, Eq)]
#[clap(
    name = "git-shelf",
    disable_help_flag = true,
    disable_help_subcommand = true
)]
pub struct Opts {
    /// Push the shelf to REMOTE instead of the default remote
    #[clap(
        short = 'u',
        long = "use-remote",
        value_name = "REMOTE",
        allow_hyphen_values = true
    )]
    pub use_remote: Option<String>,
}

/// Flags which request the usage text.
const HELP_FLAGS: &[&str] = &["-h", "--help"];

/// Positional word which requests the usage text.
const HELP_SUBCOMMAND: &str = "help";

/// A problem with a single command-line argument.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("unknown option: {0}")]
    UnknownFlag(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("option {0} requires a value")]
    MissingValue(String),

    #[error("{0}")]
    Rejected(String),
}

/// The outcome of parsing the command line.
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedArgs {
    /// The arguments were valid.
    Run(Opts),

    /// The usage text was requested.
    Help,

    /// The arguments were invalid, for all of these reasons.
    Invalid(Vec<ArgError>),
}

enum Scan {
    Help,
    Done(Vec<ArgError>),
}

fn find_long<'a>(command: &'a ClapCommand, name: &str) -> Option<&'a Arg> {
    command
        .get_arguments()
        .find(|arg| arg.get_long() == Some(name))
}

fn find_short(command: &ClapCommand, short: char) -> Option<&Arg> {
    command
        .get_arguments()
        .find(|arg| arg.get_short() == Some(short))
}

fn takes_value(arg: &Arg) -> bool {
    arg.get_action().takes_values()
}

/// Walk the arguments (not including the executable name), checking each one
/// against the flags that `command` defines.
fn scan_args(command: &ClapCommand, args: &[OsString]) -> Scan {
    let mut errors = Vec::new();
    let mut only_positionals = false;
    let mut args = args.iter().map(|arg| arg.to_string_lossy().into_owned());
    while let Some(arg) = args.next() {
        if only_positionals {
            errors.push(ArgError::UnexpectedArgument(arg));
            continue;
        }
        if arg == "--" {
            only_positionals = true;
            continue;
        }
        if HELP_FLAGS.contains(&arg.as_str()) || arg == HELP_SUBCOMMAND {
            return Scan::Help;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (long, None),
            };
            match find_long(command, name) {
                None => errors.push(ArgError::UnknownFlag(format!("--{name}"))),
                Some(flag) if takes_value(flag) => {
                    if inline_value.is_none() && args.next().is_none() {
                        errors.push(ArgError::MissingValue(format!("--{name}")));
                    }
                }
                Some(_) => {
                    if inline_value.is_some() {
                        errors.push(ArgError::UnexpectedArgument(arg.clone()));
                    }
                }
            }
        } else if let Some(shorts) = arg.strip_prefix('-').filter(|shorts| !shorts.is_empty()) {
            let mut chars = shorts.chars();
            let (short, flag) = match chars
                .next()
                .and_then(|short| Some((short, find_short(command, short)?)))
            {
                Some(found) => found,
                None => {
                    errors.push(ArgError::UnknownFlag(arg.clone()));
                    continue;
                }
            };
            let attached = chars.as_str();
            if takes_value(flag) {
                if attached.is_empty() && args.next().is_none() {
                    errors.push(ArgError::MissingValue(format!("-{short}")));
                }
            } else if !attached.is_empty() {
                errors.push(ArgError::UnknownFlag(arg.clone()));
            }
        } else {
            errors.push(ArgError::UnexpectedArgument(arg));
        }
    }
    Scan::Done(errors)
}

/// Parse the full command line, including the executable name.
pub fn parse_args(args: Vec<OsString>) -> ParsedArgs {
    let command = Opts::command();
    let rest = args.get(1..).unwrap_or_default();
    match scan_args(&command, rest) {
        Scan::Help => ParsedArgs::Help,
        Scan::Done(errors) if !errors.is_empty() => ParsedArgs::Invalid(errors),
        Scan::Done(_) => match Opts::try_parse_from(&args) {
            Ok(opts) => ParsedArgs::Run(opts),
            Err(err) => {
                let message = err.to_string();
                let message = message.lines().next().unwrap_or_default();
                let message = message.strip_prefix("error: ").unwrap_or(message);
                ParsedArgs::Invalid(vec![ArgError::Rejected(message.to_owned())])
            }
        },
    }
}

/// Render the usage text.
pub fn render_usage(glyphs: &Glyphs) -> String {
    let command = Opts::command();
    let name = glyphs.render(TextStyle::Bold, "git shelf");
    let remote = glyphs.render(TextStyle::Italic, "REMOTE");

    let mut lines = vec![
        format!("usage: {name} [-u {remote} | --use-remote {remote}]"),
        format!("       {name} (-h | --help | help)"),
        String::new(),
    ];
    if let Some(about) = command.get_about() {
        lines.push(about.to_string());
        lines.push(String::new());
    }

    // (flags, value placeholder, description)
    let rows = command
        .get_arguments()
        .map(|arg| {
            let flags = [
                arg.get_short().map(|short| format!("-{short}")),
                arg.get_long().map(|long| format!("--{long}")),
            ]
            .into_iter()
            .flatten()
            .join(", ");
            let value_name = arg
                .get_value_names()
                .and_then(|value_names| value_names.first())
                .map(|value_name| value_name.to_string());
            let help = arg.get_help().map(|help| help.to_string()).unwrap_or_default();
            (flags, value_name, help)
        })
        .chain(std::iter::once((
            HELP_FLAGS.join(", "),
            None,
            "Print this message and exit".to_string(),
        )))
        .collect_vec();
    let plain_width = |(flags, value_name, _): &(String, Option<String>, String)| match value_name {
        Some(value_name) => flags.len() + 1 + value_name.len(),
        None => flags.len(),
    };
    let width = rows.iter().map(plain_width).max().unwrap_or_default() + 2;

    lines.push("options:".to_string());
    for row in &rows {
        let (flags, value_name, help) = row;
        let padding = " ".repeat(width - plain_width(row));
        let value_name = match value_name {
            Some(value_name) => format!(" {}", glyphs.render(TextStyle::Italic, value_name)),
            None => String::new(),
        };
        lines.push(format!("  {flags}{value_name}{padding}{help}"));
    }

    let mut usage = lines.join("\n");
    usage.push('\n');
    usage
}
