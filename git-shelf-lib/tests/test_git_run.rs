use std::sync::{Arc, Mutex};

use shelf::core::effects::Effects;
use shelf::core::formatting::Glyphs;
use shelf::testing::{make_git, make_git_with_remote_repo};
use shelf::util::ExitCode;

#[test]
fn test_run_relays_output() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let stdout = Arc::new(Mutex::new(Vec::new()));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);
    let git_run_info = git.get_git_run_info()?;

    let result = git_run_info.run(&effects, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    assert_eq!(result, Ok(()));

    let stdout = String::from_utf8(stdout.lock().unwrap().clone())?;
    let stdout = git.preprocess_output(stdout)?;
    insta::assert_snapshot!(stdout, @r###"
    shelf: running command: <git-executable> rev-parse --abbrev-ref HEAD
    master
    "###);

    Ok(())
}

#[test]
fn test_run_returns_exit_code() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let stdout = Arc::new(Mutex::new(Vec::new()));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);
    let git_run_info = git.get_git_run_info()?;

    // Nothing has changed since the initial commit.
    let result = git_run_info.run(&effects, &["commit", "-m", "nothing"])?;
    assert_eq!(result, Err(ExitCode(1)));

    let stdout = String::from_utf8(stdout.lock().unwrap().clone())?;
    assert!(stdout.contains("nothing to commit"), "stdout: {stdout}");

    Ok(())
}

#[test]
fn test_run_silent_reports_failure_in_result() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let git_run_info = git.get_git_run_info()?;
    let result = git_run_info.run_silent(&git.get_repo()?, &["ls-remote", "--heads", "nowhere"])?;
    assert!(!result.exit_code.is_success());
    assert!(result.stdout.is_empty());
    let stderr = String::from_utf8(result.stderr)?;
    assert!(stderr.contains("nowhere"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_run_silent_captures_stdout() -> eyre::Result<()> {
    let git_wrapper = make_git_with_remote_repo()?;
    git_wrapper.original_repo.init_repo()?;
    git_wrapper
        .original_repo
        .run(&["branch", "shelf/test@example.com/master"])?;
    git_wrapper
        .original_repo
        .clone_repo_into(&git_wrapper.cloned_repo, &[])?;

    let cloned_repo = &git_wrapper.cloned_repo;
    let git_run_info = cloned_repo.get_git_run_info()?;
    let result = git_run_info.run_silent(
        &cloned_repo.get_repo()?,
        &["ls-remote", "--heads", "origin"],
    )?;
    assert!(result.exit_code.is_success());

    let stdout = String::from_utf8(result.stdout)?;
    let branches = stdout
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(_oid, reference_name)| reference_name)
        .collect::<Vec<_>>();
    assert_eq!(
        branches,
        vec![
            "refs/heads/master",
            "refs/heads/shelf/test@example.com/master"
        ]
    );

    Ok(())
}
