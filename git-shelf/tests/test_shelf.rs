use std::path::Path;
use std::process::Output;

use assert_cmd::Command;
use lib::testing::{
    make_git, make_git_with_remote_repo, Git, GitRunOptions, GitWrapperWithRemoteRepo,
};

const SHELF_BRANCH: &str = "shelf/test@example.com/master";

/// Run the `git-shelf` binary directly (rather than through `git shelf`) in
/// the given directory, with the test environment plus the given overrides.
fn run_shelf_binary(
    git: &Git,
    dir: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> eyre::Result<Output> {
    let mut command = Command::cargo_bin("git-shelf")?;
    command
        .current_dir(dir)
        .env_clear()
        .envs(git.get_base_env(0)?)
        .envs(env.iter().copied())
        .args(args);
    Ok(command.output()?)
}

fn expect_exit_code(code: i32) -> GitRunOptions {
    GitRunOptions {
        expected_exit_code: code,
        ..Default::default()
    }
}

/// Make a repository with an `origin` remote, and the test identity
/// configured in the clone.
fn make_cloned_repo() -> eyre::Result<GitWrapperWithRemoteRepo> {
    let git_wrapper = make_git_with_remote_repo()?;
    git_wrapper.original_repo.init_repo()?;
    git_wrapper.original_repo.commit_file("test1", 1)?;
    git_wrapper
        .original_repo
        .clone_repo_into(&git_wrapper.cloned_repo, &[])?;
    Ok(git_wrapper)
}

#[test]
fn test_first_shelf() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf(&[])?;
        insta::assert_snapshot!(stdout, @r###"
        shelf: running command: <git-executable> fetch --all
        shelf: running command: <git-executable> add --all
        shelf: running command: <git-executable> commit --no-gpg-sign -m shelf
        [master 8b2c5e9] shelf
         1 file changed, 1 insertion(+)
         create mode 100644 test2.txt
        shelf: running command: <git-executable> push origin HEAD:refs/heads/shelf/test@example.com/master
        "###);
        insta::assert_snapshot!(stderr, @r###"
        To file://<temp-dir>/original
         * [new branch]      HEAD -> shelf/test@example.com/master
        "###);
    }

    {
        let (stdout, _stderr) = cloned_repo.run(&["config", "--local", "branch.master.shelf"])?;
        assert_eq!(stdout, "true\n");
    }
    {
        let branches = original_repo.list_branches()?;
        insta::assert_snapshot!(branches, @r###"
        master create test1.txt
        shelf/test@example.com/master shelf
        "###);
        let (contents, _stderr) =
            original_repo.run(&["show", &format!("{SHELF_BRANCH}:test2.txt")])?;
        assert_eq!(contents, "test2 contents\n");
    }

    Ok(())
}

#[test]
fn test_second_shelf_amends() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.write_file_txt("test2", "first version\n")?;
    cloned_repo.shelf(&[])?;
    let commits_after_first_shelf = original_repo.count_commits(SHELF_BRANCH)?;
    assert_eq!(commits_after_first_shelf, 3);

    cloned_repo.write_file_txt("test2", "second version\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf(&[])?;
        insta::assert_snapshot!(stdout, @r###"
        shelf: running command: <git-executable> add --all
        shelf: running command: <git-executable> commit --amend --no-gpg-sign -m shelf
        [master a23345c] shelf
         Date: Thu Oct 29 12:34:56 2020 +0000
         1 file changed, 1 insertion(+)
         create mode 100644 test2.txt
        shelf: running command: <git-executable> push --force origin HEAD:refs/heads/shelf/test@example.com/master
        "###);
        insta::assert_snapshot!(stderr, @r###"
        To file://<temp-dir>/original
         + 362e8ed...a23345c HEAD -> shelf/test@example.com/master (forced update)
        "###);
    }

    assert_eq!(
        original_repo.count_commits(SHELF_BRANCH)?,
        commits_after_first_shelf
    );
    let (contents, _stderr) = original_repo.run(&["show", &format!("{SHELF_BRANCH}:test2.txt")])?;
    assert_eq!(contents, "second version\n");

    Ok(())
}

#[test]
fn test_shelf_continues_when_a_remote_cannot_be_fetched() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.run(&["remote", "add", "stale", "file:///nonexistent/repo"])?;
    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf(&[])?;
        assert!(
            stdout.contains(
                "note: some remotes could not be fetched; checking the remote branches already known\n"
            ),
            "stdout: {stdout}"
        );
        assert!(
            stdout.contains(
                "shelf: running command: <git-executable> push origin HEAD:refs/heads/shelf/test@example.com/master\n"
            ),
            "stdout: {stdout}"
        );
        assert!(stderr.contains("could not fetch stale"), "stderr: {stderr}");
    }

    insta::assert_snapshot!(original_repo.list_branches()?, @r###"
    master create test1.txt
    shelf/test@example.com/master shelf
    "###);
    let (stdout, _stderr) = cloned_repo.run(&["config", "--local", "branch.master.shelf"])?;
    assert_eq!(stdout, "true\n");

    Ok(())
}

#[test]
fn test_shelf_desync_detected_despite_unreachable_remote() -> eyre::Result<()> {
    let git_wrapper = make_git_with_remote_repo()?;
    let GitWrapperWithRemoteRepo {
        temp_dir: _,
        original_repo,
        cloned_repo,
    } = &git_wrapper;

    original_repo.init_repo()?;
    original_repo.commit_file("test1", 1)?;
    original_repo.clone_repo_into(cloned_repo, &[])?;
    original_repo.run(&["branch", SHELF_BRANCH])?;
    cloned_repo.run(&["remote", "add", "stale", "file:///nonexistent/repo"])?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    let (stdout, stderr) = cloned_repo.shelf_with_options(&[], &expect_exit_code(1))?;
    assert!(
        stderr.contains(
            "fatal: shelf/test@example.com/master already exists on remote origin, but master is not marked as shelved\n"
        ),
        "stderr: {stderr}"
    );
    assert!(!stdout.contains("push"), "stdout: {stdout}");
    assert_eq!(cloned_repo.count_commits("HEAD")?, 2);

    Ok(())
}

#[test]
fn test_shelf_uses_configured_commit_message() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.run(&["config", "shelf.commitMessage", "WIP: parked"])?;
    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    cloned_repo.shelf(&[])?;

    let branches = original_repo.list_branches()?;
    insta::assert_snapshot!(branches, @r###"
    master create test1.txt
    shelf/test@example.com/master WIP: parked
    "###);

    Ok(())
}

#[test]
fn test_shelf_use_remote() -> eyre::Result<()> {
    let git_wrapper = make_cloned_repo()?;
    let GitWrapperWithRemoteRepo {
        temp_dir: _,
        original_repo,
        cloned_repo,
    } = &git_wrapper;

    let backup_repo = git_wrapper.make_sibling_repo("backup");
    backup_repo.init_bare_repo()?;
    cloned_repo.run(&["remote", "add", "backup", &backup_repo.get_url()?])?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, _stderr) = cloned_repo.shelf(&["-u", "backup"])?;
        assert!(
            stdout.contains(
                "shelf: running command: <git-executable> push backup HEAD:refs/heads/shelf/test@example.com/master\n"
            ),
            "stdout: {stdout}"
        );
    }
    insta::assert_snapshot!(backup_repo.list_branches()?, @"shelf/test@example.com/master shelf");
    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_follows_relocated_remote() -> eyre::Result<()> {
    let git_wrapper = make_cloned_repo()?;
    let GitWrapperWithRemoteRepo {
        temp_dir: _,
        original_repo,
        cloned_repo,
    } = &git_wrapper;

    let backup_repo = git_wrapper.make_sibling_repo("backup");
    backup_repo.init_bare_repo()?;
    cloned_repo.run(&["remote", "add", "backup", &backup_repo.get_url()?])?;

    cloned_repo.write_file_txt("test2", "first version\n")?;
    cloned_repo.shelf(&["--use-remote", "backup"])?;

    // Without `-u`, the default remote is `origin`, but the shelf lives on
    // `backup`.
    cloned_repo.write_file_txt("test2", "second version\n")?;
    {
        let (stdout, _stderr) = cloned_repo.shelf(&[])?;
        assert!(
            stdout.contains(
                "note: shelf/test@example.com/master is on remote backup, so it will be pushed there instead of origin\n"
            ),
            "stdout: {stdout}"
        );
        assert!(
            stdout.contains(
                "shelf: running command: <git-executable> push --force backup HEAD:refs/heads/shelf/test@example.com/master\n"
            ),
            "stdout: {stdout}"
        );
    }

    let (contents, _stderr) = backup_repo.run(&["show", &format!("{SHELF_BRANCH}:test2.txt")])?;
    assert_eq!(contents, "second version\n");
    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_marked_but_missing_on_remote() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.run(&["config", "branch.master.shelf", "true"])?;
    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf_with_options(&[], &expect_exit_code(1))?;
        insta::assert_snapshot!(stderr, @"fatal: master is marked as shelved, but shelf/test@example.com/master was not found on any remote");
        insta::assert_snapshot!(stdout, @"");
    }

    assert_eq!(cloned_repo.count_commits("HEAD")?, 2);
    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_on_remote_but_not_marked() -> eyre::Result<()> {
    let git_wrapper = make_git_with_remote_repo()?;
    let GitWrapperWithRemoteRepo {
        temp_dir: _,
        original_repo,
        cloned_repo,
    } = &git_wrapper;

    original_repo.init_repo()?;
    original_repo.commit_file("test1", 1)?;
    original_repo.clone_repo_into(cloned_repo, &[])?;
    // Someone else (or another clone) shelved `master` after this clone was
    // made.
    original_repo.run(&["branch", SHELF_BRANCH])?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf_with_options(&[], &expect_exit_code(1))?;
        assert!(
            stderr.contains(
                "fatal: shelf/test@example.com/master already exists on remote origin, but master is not marked as shelved\n"
            ),
            "stderr: {stderr}"
        );
        assert!(stdout.contains("fetch --all"), "stdout: {stdout}");
        assert!(!stdout.contains("commit"), "stdout: {stdout}");
        assert!(!stdout.contains("push"), "stdout: {stdout}");
    }

    assert_eq!(cloned_repo.count_commits("HEAD")?, 2);
    let (stdout, _stderr) = cloned_repo.run_with_options(
        &["config", "--local", "branch.master.shelf"],
        &expect_exit_code(1),
    )?;
    assert_eq!(stdout, "");

    Ok(())
}

#[test]
fn test_shelf_nothing_to_commit() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    {
        let (stdout, _stderr) = cloned_repo.shelf_with_options(&[], &expect_exit_code(1))?;
        assert!(stdout.contains("nothing to commit"), "stdout: {stdout}");
        assert!(!stdout.contains("push"), "stdout: {stdout}");
    }

    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");
    cloned_repo.run_with_options(
        &["config", "--local", "branch.master.shelf"],
        &expect_exit_code(1),
    )?;

    Ok(())
}

#[test]
fn test_shelf_push_failure_leaves_marker_unset() -> eyre::Result<()> {
    // No remotes at all, so the push to the default remote fails after the
    // commit has been made.
    let git = make_git()?;
    git.init_repo()?;
    git.write_file_txt("test1", "test1 contents\n")?;

    {
        let (stdout, stderr) = git.shelf_with_options(&[], &expect_exit_code(128))?;
        assert!(
            stdout.contains(
                "shelf: running command: <git-executable> push origin HEAD:refs/heads/shelf/test@example.com/master\n"
            ),
            "stdout: {stdout}"
        );
        assert!(stderr.contains("'origin'"), "stderr: {stderr}");
    }

    assert_eq!(git.count_commits("HEAD")?, 2);
    git.run_with_options(
        &["config", "--local", "branch.master.shelf"],
        &expect_exit_code(1),
    )?;

    Ok(())
}

#[test]
fn test_shelf_detached_head() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.detach_head()?;
    let (short_id, _stderr) = cloned_repo.run(&["rev-parse", "--short", "HEAD"])?;
    let short_id = short_id.trim();

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    cloned_repo.shelf(&[])?;

    let branches = original_repo.list_branches()?;
    assert!(
        branches.contains(&format!("shelf/test@example.com/{short_id} shelf\n")),
        "branches: {branches}"
    );
    let (stdout, _stderr) =
        cloned_repo.run(&["config", "--local", &format!("branch.{short_id}.shelf")])?;
    assert_eq!(stdout, "true\n");

    Ok(())
}

#[test]
fn test_shelf_unknown_flag() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) =
            cloned_repo.shelf_with_options(&["--bogus", "extra", "-u"], &expect_exit_code(2))?;
        insta::assert_snapshot!(stderr, @r###"
        error: unknown option: --bogus
        error: unexpected argument: extra
        error: option -u requires a value
        Run 'git shelf --help' for usage.
        "###);
        insta::assert_snapshot!(stdout, @"");
    }

    assert_eq!(cloned_repo.count_commits("HEAD")?, 2);
    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_help() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let expected_usage = "\
usage: git shelf [-u REMOTE | --use-remote REMOTE]
       git shelf (-h | --help | help)
";
    for args in [&["-h"][..], &["help"][..], &["-u", "origin", "help"][..]] {
        let (stdout, stderr) = git.shelf_with_options(args, &expect_exit_code(1))?;
        assert!(stdout.starts_with(expected_usage), "stdout: {stdout}");
        assert_eq!(stderr, "");
    }

    // `git shelf --help` would be turned into `git help shelf` by Git itself.
    let output = run_shelf_binary(&git, &git.repo_path, &["--help"], &[])?;
    assert_eq!(output.status.code(), Some(1));
    insta::assert_snapshot!(String::from_utf8(output.stdout)?, @r###"
    usage: git shelf [-u REMOTE | --use-remote REMOTE]
           git shelf (-h | --help | help)

    Snapshot uncommitted changes onto a per-branch shelf and push it to a remote

    options:
      -u, --use-remote REMOTE  Push the shelf to REMOTE instead of the default remote
      -h, --help               Print this message and exit
    "###);

    Ok(())
}

#[test]
fn test_shelf_missing_user_email() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.run(&["config", "--unset", "user.email"])?;
    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) = cloned_repo.shelf_with_options(&[], &expect_exit_code(1))?;
        insta::assert_snapshot!(stderr, @"fatal: no email address is configured; set one with: git config user.email <email>");
        insta::assert_snapshot!(stdout, @"");
    }

    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_unreachable_remote() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_cloned_repo()?;

    cloned_repo.write_file_txt("test2", "test2 contents\n")?;
    {
        let (stdout, stderr) =
            cloned_repo.shelf_with_options(&["-u", "nowhere"], &expect_exit_code(2))?;
        insta::assert_snapshot!(stderr, @"error: remote nowhere could not be reached");
        insta::assert_snapshot!(stdout, @"");
    }

    assert_eq!(cloned_repo.count_commits("HEAD")?, 2);
    insta::assert_snapshot!(original_repo.list_branches()?, @"master create test1.txt");

    Ok(())
}

#[test]
fn test_shelf_outside_repository_is_silent() -> eyre::Result<()> {
    let git = make_git()?;
    let plain_dir = git.home_path.join("plain");
    std::fs::create_dir_all(&plain_dir)?;

    let output = run_shelf_binary(&git, &plain_dir, &["--bogus"], &[])?;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8(output.stdout)?, "");
    assert_eq!(String::from_utf8(output.stderr)?, "");

    Ok(())
}

#[test]
fn test_shelf_without_git_is_silent() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.write_file_txt("test1", "test1 contents\n")?;

    let output = run_shelf_binary(&git, &git.repo_path, &[], &[("PATH", ""), ("TEST_GIT", "")])?;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8(output.stdout)?, "");
    assert_eq!(String::from_utf8(output.stderr)?, "");
    assert_eq!(git.count_commits("HEAD")?, 1);

    Ok(())
}
