//! This crate sets up the process for running `git-shelf`: tracing, the
//! environment checks which make the command exit silently, argument parsing
//! and the conversion of results into an exit code.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::any::Any;
use std::ffi::OsString;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::SystemTime;

use git_shelf_opts::{parse_args, render_usage, ArgError, Opts, ParsedArgs};
use lib::core::config::env_vars::{find_path_to_git, get_git_exec_path};
use lib::core::effects::Effects;
use lib::core::formatting::{Glyphs, TextStyle};
use lib::git::GitRunInfo;
use lib::git::{Repo, RepoError};
use lib::util::{ExitCode, EyreExitOr};
use tracing::level_filters::LevelFilter;
use tracing::{info, instrument, warn};
use tracing_chrome::ChromeLayerBuilder;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Exit code used after printing the usage text.
pub const HELP_EXIT_CODE: ExitCode = ExitCode(1);

/// Exit code used when the command line is invalid.
pub const USAGE_EXIT_CODE: ExitCode = ExitCode(2);

/// Shared context for all commands.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// The `Effects` to use.
    pub effects: Effects,

    /// Information about the Git executable currently being used.
    pub git_run_info: GitRunInfo,
}

#[must_use = "This function returns a guard object to flush traces. Dropping it immediately is probably incorrect. Make sure that the returned value lives until tracing has finished."]
#[instrument]
fn install_tracing(effects: Effects) -> eyre::Result<impl Drop> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_|
                // Limit to first-party logs by default in case third-party
                // packages log spuriously.
                "shelf=warn,git_shelf=warn,git_shelf_invoke=warn".to_string()))?;
    let fmt_layer = tracing_fmt::layer().with_writer(move || effects.clone().get_error_stream());

    let (profile_layer, flush_guard): (_, Box<dyn Any>) = {
        // The `git commit` run while shelving may start the user's hooks,
        // and those may run `git shelf` again. Each nested process gets its
        // own trace file.
        const NESTING_LEVEL_KEY: &str = "RUST_LOGGING_NESTING_LEVEL";
        let nesting_level = match std::env::var(NESTING_LEVEL_KEY) {
            Ok(nesting_level) => nesting_level.parse::<usize>().unwrap_or_default(),
            Err(_) => 0,
        };
        std::env::set_var(NESTING_LEVEL_KEY, (nesting_level + 1).to_string());

        let should_include_function_args = match std::env::var("RUST_PROFILE_INCLUDE_ARGS") {
            Ok(value) if !value.is_empty() => true,
            Ok(_) | Err(_) => false,
        };

        let filename = match std::env::var("RUST_PROFILE") {
            Ok(value) if value == "1" || value == "true" => {
                let filename = format!(
                    "trace-{}.json-{}",
                    SystemTime::now()
                        .duration_since(SystemTime::UNIX_EPOCH)?
                        .as_secs(),
                    nesting_level,
                );
                Some(filename)
            }
            Ok(value) if !value.is_empty() => Some(format!("{value}-{nesting_level}")),
            Ok(_) | Err(_) => None,
        };

        match filename {
            Some(filename) => {
                let (layer, flush_guard) = ChromeLayerBuilder::new()
                    .file(filename)
                    .include_args(should_include_function_args)
                    .build();
                (Some(layer), Box::new(flush_guard))
            }
            None => {
                struct TrivialDrop;
                (None, Box::new(TrivialDrop))
            }
        }
    };

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .with(profile_layer)
        .try_init()?;

    Ok(flush_guard)
}

#[instrument]
fn install_libgit2_tracing() {
    fn git_trace(level: git2::TraceLevel, msg: &[u8]) {
        info!("[{:?}]: {}", level, String::from_utf8_lossy(msg));
    }

    if let Err(err) = git2::trace_set(git2::TraceLevel::Trace, git_trace) {
        warn!("Failed to install libgit2 tracing: {err}");
    }
}

/// Check that there is something for `git-shelf` to do: a Git executable to
/// run, and a repository around the current directory. Returns the path to
/// Git, or `None` if the command should exit without saying anything.
#[instrument]
fn check_preconditions() -> eyre::Result<Option<PathBuf>> {
    let path_to_git = match find_path_to_git() {
        Some(path_to_git) => path_to_git,
        None => {
            info!("Git executable not found; nothing to do");
            return Ok(None);
        }
    };

    match Repo::from_current_dir() {
        Ok(_repo) => Ok(Some(path_to_git)),
        Err(RepoError::NotARepository { path }) => {
            info!(?path, "Not inside a Git repository; nothing to do");
            Ok(None)
        }
        Err(RepoError::UnsafeRepository { path, .. }) => {
            info!(?path, "Repository is not owned by the current user; nothing to do");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Print every problem with the command line, followed by a hint about how to
/// get the usage text.
pub fn report_arg_errors(effects: &Effects, errors: &[ArgError]) -> eyre::Result<()> {
    let glyphs = effects.get_glyphs();
    let mut stream = effects.get_error_stream();
    for error in errors {
        writeln!(
            stream,
            "{} {error}",
            glyphs.render(TextStyle::Error, "error:")
        )?;
    }
    writeln!(
        stream,
        "Run '{}' for usage.",
        glyphs.render(TextStyle::Bold, "git shelf --help")
    )?;
    Ok(())
}

/// Wrapper function for `main` to ensure that `Drop` is called for local
/// variables, since `std::process::exit` will skip them. You probably want to
/// call `invoke_subcommand_main` instead.
#[instrument(skip(f))]
pub fn do_main_and_drop_locals(
    f: impl Fn(CommandContext, Opts) -> EyreExitOr<()>,
    args: Vec<OsString>,
) -> eyre::Result<i32> {
    let effects = Effects::new(Glyphs::detect());

    let _tracing_guard = install_tracing(effects.clone());
    install_libgit2_tracing();

    let path_to_git = match check_preconditions()? {
        Some(path_to_git) => path_to_git,
        None => return Ok(0),
    };

    let opts = match parse_args(args) {
        ParsedArgs::Run(opts) => opts,
        ParsedArgs::Help => {
            write!(
                effects.get_output_stream(),
                "{}",
                render_usage(effects.get_glyphs())
            )?;
            let ExitCode(exit_code) = HELP_EXIT_CODE;
            return Ok(exit_code.try_into()?);
        }
        ParsedArgs::Invalid(errors) => {
            report_arg_errors(&effects, &errors)?;
            let ExitCode(exit_code) = USAGE_EXIT_CODE;
            return Ok(exit_code.try_into()?);
        }
    };

    let mut git_run_info = GitRunInfo::from_current_env(path_to_git)?;
    if let Ok(git_exec_path) = get_git_exec_path() {
        git_run_info
            .env
            .entry("GIT_EXEC_PATH".into())
            .or_insert(git_exec_path.into());
    }

    let ctx = CommandContext {
        effects,
        git_run_info,
    };
    let exit_code = match f(ctx, opts)? {
        Ok(()) => 0,
        Err(ExitCode(exit_code)) => {
            let exit_code: i32 = exit_code.try_into()?;
            exit_code
        }
    };
    Ok(exit_code)
}

/// Invoke the provided command main function. This should be used in the
/// `main.rs` file for the executable. For example:
///
/// ```ignore
/// fn main() {
///     git_shelf_invoke::invoke_subcommand_main(git_shelf::commands::command_main)
/// }
/// ```
#[instrument(skip(f))]
pub fn invoke_subcommand_main(f: impl Fn(CommandContext, Opts) -> EyreExitOr<()>) {
    // Install panic handler.
    if let Err(err) = color_eyre::install() {
        eprintln!("Could not install panic handler: {err}");
    }
    let args = std::env::args_os().collect();
    let exit_code = match do_main_and_drop_locals(f, args) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            eprintln!("A fatal error occurred: {err:?}");
            1
        }
    };
    std::process::exit(exit_code);
}
