//! Implements the `git shelf` command.

use std::fmt::Write;
use std::sync::Arc;

use lib::core::config::{
    get_default_remote_name, get_shelf_commit_message, get_shelf_state, get_user_email,
    mark_shelved,
};
use lib::core::effects::{Effects, OperationType};
use lib::core::formatting::TextStyle;
use lib::core::shelf::{find_shelf_remote, ShelfId, ShelfState};
use lib::git::{GitRunInfo, Repo};
use lib::try_exit_code;
use lib::util::{ExitCode, EyreExitOr};
use tracing::{info, instrument, warn};

/// Exit code when nothing could be shelved because the user has no identity,
/// or because the local marker and the remotes disagree.
pub const FATAL_EXIT_CODE: ExitCode = ExitCode(1);

/// Exit code when the remote passed to `--use-remote` can't be listed.
pub const UNREACHABLE_REMOTE_EXIT_CODE: ExitCode = ExitCode(2);

fn write_fatal(effects: &Effects, message: &str) -> eyre::Result<()> {
    writeln!(
        effects.get_error_stream(),
        "{} {message}",
        effects.get_glyphs().render(TextStyle::Error, "fatal:")
    )?;
    Ok(())
}

/// Check that the remote can be reached by listing its branches.
#[instrument]
fn verify_remote(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    remote_name: &str,
) -> eyre::Result<bool> {
    let (_effects, _progress) =
        effects.start_operation(OperationType::VerifyRemote(Arc::new(remote_name.to_owned())));
    let result = git_run_info.run_silent(repo, &["ls-remote", "--heads", remote_name])?;
    if !result.exit_code.is_success() {
        info!(?result, "Could not list remote");
    }
    Ok(result.exit_code.is_success())
}

/// Commit everything in the working copy and push it to the shelf for the
/// current ref.
///
/// The first shelf of a ref makes a new commit and pushes it. After that,
/// each shelf amends the commit and force-pushes it to whichever remote holds
/// the shelf, which may not be `use_remote`.
#[instrument]
pub fn shelf(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    use_remote: Option<String>,
) -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;
    let glyphs = effects.get_glyphs();

    let requested_remote = match use_remote {
        Some(remote_name) => {
            if !verify_remote(effects, git_run_info, &repo, &remote_name)? {
                writeln!(
                    effects.get_error_stream(),
                    "{} remote {} could not be reached",
                    glyphs.render(TextStyle::Error, "error:"),
                    glyphs.render(TextStyle::Bold, &remote_name),
                )?;
                return Ok(Err(UNREACHABLE_REMOTE_EXIT_CODE));
            }
            remote_name
        }
        None => get_default_remote_name(&repo)?,
    };

    let user_email = match get_user_email(&repo)? {
        Some(user_email) => user_email,
        None => {
            write_fatal(
                effects,
                "no email address is configured; set one with: git config user.email <email>",
            )?;
            return Ok(Err(FATAL_EXIT_CODE));
        }
    };

    let shelf_ref = repo.get_shelf_ref()?;
    let shelf_id = ShelfId::new(&user_email, &shelf_ref);
    let shelf_state = get_shelf_state(&repo, &shelf_ref)?;
    info!(%shelf_id, ?shelf_state, "Resolved shelf");

    let remote_name = match shelf_state {
        ShelfState::Shelved => {
            let remote_branches = repo.get_remote_branches()?;
            match find_shelf_remote(&remote_branches, &shelf_id, &requested_remote) {
                None => {
                    write_fatal(
                        effects,
                        &format!(
                            "{shelf_ref} is marked as shelved, but {shelf_id} was not found on any remote"
                        ),
                    )?;
                    return Ok(Err(FATAL_EXIT_CODE));
                }
                Some(found_remote) if found_remote != requested_remote => {
                    writeln!(
                        effects.get_output_stream(),
                        "{}",
                        glyphs.render(
                            TextStyle::Dim,
                            format!(
                                "note: {shelf_id} is on remote {found_remote}, so it will be pushed there instead of {requested_remote}"
                            )
                        )
                    )?;
                    found_remote.to_owned()
                }
                Some(found_remote) => found_remote.to_owned(),
            }
        }

        ShelfState::Unshelved => {
            {
                let (effects, _progress) = effects.start_operation(OperationType::FetchRemotes);
                if let Err(exit_code) = git_run_info.run(&effects, &["fetch", "--all"])? {
                    // The remote-tracking branches of the remotes that did
                    // fetch are still current, so carry on with those.
                    warn!(?exit_code, "Some remotes could not be fetched");
                    writeln!(
                        effects.get_output_stream(),
                        "{}",
                        glyphs.render(
                            TextStyle::Dim,
                            "note: some remotes could not be fetched; checking the remote branches already known"
                        )
                    )?;
                }
            }
            let remote_branches = repo.get_remote_branches()?;
            if let Some(found_remote) =
                find_shelf_remote(&remote_branches, &shelf_id, &requested_remote)
            {
                write_fatal(
                    effects,
                    &format!(
                        "{shelf_id} already exists on remote {found_remote}, but {shelf_ref} is not marked as shelved"
                    ),
                )?;
                return Ok(Err(FATAL_EXIT_CODE));
            }
            requested_remote
        }
    };

    try_exit_code!(git_run_info.run(effects, &["add", "--all"])?);

    let commit_message = get_shelf_commit_message(&repo)?;
    let mut commit_args = vec!["commit"];
    if shelf_state.should_amend() {
        commit_args.push("--amend");
    }
    commit_args.extend(["--no-gpg-sign", "-m", commit_message.as_str()]);
    try_exit_code!(git_run_info.run(effects, &commit_args)?);

    {
        let (effects, _progress) =
            effects.start_operation(OperationType::PushShelf(Arc::new(remote_name.clone())));
        let refspec = format!("HEAD:{}", shelf_id.to_reference_name());
        let mut push_args = vec!["push"];
        if shelf_state.should_amend() {
            push_args.push("--force");
        }
        push_args.extend([remote_name.as_str(), refspec.as_str()]);
        try_exit_code!(git_run_info.run(&effects, &push_args)?);
    }

    mark_shelved(&repo, &shelf_ref)?;
    Ok(Ok(()))
}
