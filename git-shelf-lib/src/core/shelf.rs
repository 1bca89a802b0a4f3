//! Naming and lookup of shelf branches.
//!
//! A shelf is a branch named `shelf/<user-email>/<ref>` which holds a snapshot
//! of the working copy for the ref that was checked out when it was created.
//! Whether a ref has been shelved before is recorded locally (see
//! [`crate::core::config::get_shelf_state`]), and the shelf branch itself lives
//! on a remote.

use std::fmt::Display;

use itertools::Itertools;

use crate::git::RemoteBranch;

/// The ref that a shelf is created for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShelfRef {
    /// `HEAD` points to a branch with this (short) name.
    Branch(String),

    /// `HEAD` is detached at the commit with this abbreviated hash.
    Detached(String),
}

impl ShelfRef {
    /// The name used for this ref in shelf identifiers and config keys.
    pub fn as_str(&self) -> &str {
        match self {
            ShelfRef::Branch(name) | ShelfRef::Detached(name) => name,
        }
    }
}

impl Display for ShelfRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The name of the shelf branch for a given user and ref, like
/// `shelf/jane@example.com/main`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShelfId(String);

impl ShelfId {
    /// The prefix shared by all shelf branches.
    pub const PREFIX: &'static str = "shelf";

    /// Compute the shelf identifier for the given user and ref.
    pub fn new(user_email: &str, shelf_ref: &ShelfRef) -> Self {
        Self(format!("{}/{user_email}/{shelf_ref}", Self::PREFIX))
    }

    /// View this identifier as a branch name (without `refs/heads/`).
    pub fn as_str(&self) -> &str {
        let Self(shelf_id) = self;
        shelf_id
    }

    /// The full name of the shelf branch on the remote.
    pub fn to_reference_name(&self) -> String {
        format!("refs/heads/{}", self.as_str())
    }
}

impl Display for ShelfId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a ref has been shelved before.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShelfState {
    /// No shelf has been pushed for this ref from this repository.
    Unshelved,

    /// A shelf has been pushed for this ref. Subsequent shelves amend it.
    Shelved,
}

impl ShelfState {
    /// Whether the next shelf commit should amend the previous one.
    pub fn should_amend(self) -> bool {
        match self {
            ShelfState::Unshelved => false,
            ShelfState::Shelved => true,
        }
    }
}

/// Find the remote which hosts the given shelf, according to the known
/// remote-tracking branches.
///
/// If the shelf exists on several remotes, `preferred_remote` wins when it is
/// one of them; otherwise the remotes are considered in name order.
pub fn find_shelf_remote<'a>(
    remote_branches: &'a [RemoteBranch],
    shelf_id: &ShelfId,
    preferred_remote: &str,
) -> Option<&'a str> {
    let candidates = remote_branches
        .iter()
        .filter(|remote_branch| remote_branch.branch_name == shelf_id.as_str())
        .map(|remote_branch| remote_branch.remote_name.as_str())
        .sorted()
        .dedup()
        .collect_vec();
    candidates
        .iter()
        .find(|remote_name| **remote_name == preferred_remote)
        .or_else(|| candidates.first())
        .copied()
}
