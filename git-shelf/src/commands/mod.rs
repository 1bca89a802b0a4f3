//! Sub-commands of `git-shelf`.

mod shelf;

pub use shelf::{shelf, FATAL_EXIT_CODE, UNREACHABLE_REMOTE_EXIT_CODE};

use git_shelf_invoke::CommandContext;
use git_shelf_opts::Opts;
use lib::util::EyreExitOr;

/// Run `git shelf` with the parsed command-line options.
pub fn command_main(ctx: CommandContext, opts: Opts) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;
    let Opts { use_remote } = opts;
    shelf(&effects, &git_run_info, use_remote)
}

/// Execute the main process and exit with the appropriate exit code.
pub fn main() {
    git_shelf_invoke::invoke_subcommand_main(command_main)
}
