//! shiftree-core library.
//!
//! Event histories on a fixed tree: where rate-shift events sit, which event
//! governs each node, and reversible proposals that add, delete, and move
//! events while keeping every node's effective event consistent.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`ModelError`]; settings loading
//!   uses `anyhow::Result` with context.
//! - **Logging**: use `tracing` macros (`info!`, `debug!`, `trace!`).
//! - **Ownership**: one [`Model`] per chain. Nothing is shared between models.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod event;
pub mod event_data;
pub mod history;
pub mod init;
pub mod model;
pub mod moves;
pub mod propagate;
pub mod proposal;
pub mod rate;
pub mod registry;
pub mod rng;
pub mod tree;

pub use config::{Settings, load_settings};
pub use error::{ErrorCode, ModelError};
pub use event::{BranchEvent, EventId};
pub use history::BranchHistory;
pub use model::{Model, NodeEvents};
pub use proposal::Proposal;
pub use rate::{ConstantRate, RateModel, SpExParams, SpExPriors, SpeciationExtinction};
pub use rng::ChainRng;
pub use tree::{Node, NodeId, Tree, TreeError};
