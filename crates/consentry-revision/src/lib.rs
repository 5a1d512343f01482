//! Hash-linked revision chains.
//!
//! Every change to a policy, data agreement or consent record is captured
//! as an immutable revision whose snapshot is hashed with SHA-1. Each
//! revision stores its predecessor's hash and each predecessor points at
//! its successor, so a chain can be walked in both directions and checked
//! for tampering.
//!
//! [`RevisionChain`] is the entry point. Storage sits behind
//! [`RevisionStore`] with a Postgres implementation for production and an
//! in-memory one for tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod error;
pub mod integrity;
pub mod recreate;
pub mod storage;
pub mod view;

pub use chain::{RevisionChain, RevisionChainConfig};
pub use error::{ChainFault, Result, RevisionError};
pub use integrity::{newest_first, order_by_links, verify_chain};
pub use recreate::recreate_entity;
pub use storage::{PostgresRevisionStore, RevisionStore};
pub use view::{EntityView, RevisionView};
