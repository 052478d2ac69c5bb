//! Configuration and repository discovery for sift.

pub mod config;
pub mod repos;

pub use config::Config;
pub use repos::{RepoDir, discover_repositories, repo_name_for};
