//! Tools for interfacing with the Git repository.

mod config;
mod reference;
mod repo;
mod run;

pub use config::{Config, ConfigRead, ConfigWrite, GetConfigValue};
pub use reference::{ReferenceName, RemoteBranch};
pub use repo::{Error as RepoError, Repo, GIT_CEILING_DIRECTORIES};
pub use run::{GitRunInfo, GitRunResult};
