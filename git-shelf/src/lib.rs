//! Park uncommitted changes on a per-branch shelf on a Git remote.
//!
//! `git shelf` commits everything in the working copy and pushes it to the
//! branch `shelf/<user-email>/<ref>` on a remote, where `<ref>` is the branch
//! that is checked out (or the abbreviated commit hash, if `HEAD` is
//! detached). Running it again for the same ref amends that commit and
//! force-pushes it, so the shelf always holds a single snapshot which can be
//! fetched from another machine.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

pub mod commands;
