//! # dockform-reconcile
//!
//! Turns container, volume and network records into engine objects and
//! keeps them converged.
//!
//! ## Pieces
//!
//! - [`builder`]: pure translation of container parameters into an engine
//!   create request
//! - [`quantity`]: memory, CPU and duration strings
//! - [`resolve`]: config map and secret references, through [`ValueSource`]
//! - [`diff`]: drift verdicts
//! - [`observe`]: inspect output to record observations and readiness
//! - [`lifecycle`]: the observe / create / update / delete driver over
//!   [`ExternalClient`]
//! - [`ContainerController`], [`VolumeController`], [`NetworkController`]:
//!   one [`ExternalClient`] per kind
//!
//! ## Flow
//!
//! ```text
//! record ──▶ lifecycle::apply ──▶ observe ──┬─ absent ──▶ create ──▶ marker set
//!                                           ├─ drifted ─▶ update
//!                                           └─ current ─▶ nothing
//! ```
//!
//! A record has been created exactly when it carries the external-name
//! marker. Engine "not found" on observe or delete is never an error.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod container;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod observe;
pub mod quantity;
pub mod resolve;
pub mod volume;

pub use builder::build_create_request;
pub use container::{ContainerController, STOP_TIMEOUT};
pub use diff::Verdict;
pub use error::{BuildError, ReconcileError, ResolveError, Result};
pub use lifecycle::{ExternalClient, ExternalObservation, Outcome, apply, observe, remove};
pub use network::NetworkController;
pub use resolve::{MapValueSource, SourceKind, ValueSource};
pub use volume::VolumeController;
