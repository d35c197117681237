//! Git integration for the gitstamp system.
//!
//! This crate provides the two low-level building blocks gitstamp needs to
//! talk to a repository: locating the `.git` directory a caller should
//! operate against (including worktree and submodule layouts), and running
//! the native `git` executable without deadlocking on its output pipes.

pub mod commands;
pub mod locator;
pub mod process;
