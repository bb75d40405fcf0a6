//! Live session management for haconiwa.
//!
//! - [`driver`]: the [`Multiplexer`](driver::Multiplexer) contract and its
//!   tmux implementation
//! - [`orchestrator`]: `apply` / `stop` / `list` / `attach` / `run` on top of
//!   the planner, materializer and registry from `hw-core`

pub mod driver;
pub mod orchestrator;
