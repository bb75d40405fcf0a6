//! Core model for haconiwa: specs, the topology planner, the session
//! registry, workspace materialization, advisory locks and configuration.
//!
//! Nothing in this crate talks to tmux. The multiplexer driver and the
//! orchestrator that drives it live in `hw-session`.

pub mod config;
pub mod lockfile;
pub mod plan;
pub mod registry;
pub mod spec;
pub mod workspace;
