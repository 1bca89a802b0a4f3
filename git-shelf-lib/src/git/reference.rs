use std::fmt::Display;

/// The name of a reference, like `refs/heads/master`.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct ReferenceName(String);

impl ReferenceName {
    /// View this reference name as a string. (This is a zero-cost conversion.)
    pub fn as_str(&self) -> &str {
        let Self(reference_name) = self;
        reference_name
    }
}

impl From<&str> for ReferenceName {
    fn from(s: &str) -> Self {
        ReferenceName(s.to_owned())
    }
}

impl From<String> for ReferenceName {
    fn from(s: String) -> Self {
        ReferenceName(s)
    }
}

impl AsRef<str> for ReferenceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A branch as known through a remote-tracking reference, such as
/// `refs/remotes/origin/shelf/me@example.com/main`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteBranch {
    /// The name of the remote, like `origin`.
    pub remote_name: String,

    /// The name of the branch on the remote, like `shelf/me@example.com/main`.
    pub branch_name: String,
}

impl RemoteBranch {
    /// The prefix of all remote-tracking references.
    pub const PREFIX: &'static str = "refs/remotes/";

    /// Parse a remote-tracking reference name into its remote and branch.
    ///
    /// Remote names may themselves contain slashes, so the remote is taken to
    /// be the longest of `remote_names` which prefixes the reference. Returns
    /// `None` for references which don't belong to any known remote, and for
    /// symbolic entries like `refs/remotes/origin/HEAD`.
    pub fn parse(reference_name: &ReferenceName, remote_names: &[String]) -> Option<Self> {
        let suffix = reference_name.as_str().strip_prefix(Self::PREFIX)?;
        remote_names
            .iter()
            .filter_map(|remote_name| {
                let branch_name = suffix.strip_prefix(remote_name.as_str())?;
                let branch_name = branch_name.strip_prefix('/')?;
                Some((remote_name, branch_name))
            })
            .max_by_key(|(remote_name, _)| remote_name.len())
            .filter(|(_, branch_name)| !branch_name.is_empty() && *branch_name != "HEAD")
            .map(|(remote_name, branch_name)| RemoteBranch {
                remote_name: remote_name.clone(),
                branch_name: branch_name.to_owned(),
            })
    }
}

impl Display for RemoteBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.remote_name, self.branch_name)
    }
}
