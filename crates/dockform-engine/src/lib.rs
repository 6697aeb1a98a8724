//! # dockform-engine
//!
//! The boundary between the reconciler and a container engine.
//!
//! This crate provides:
//!
//! - Docker Engine API v1.43 wire types ([`types`])
//! - Small per-kind operation traits ([`ContainerOps`], [`VolumeOps`],
//!   [`NetworkOps`], [`SystemOps`]) and the umbrella [`Engine`]
//! - An HTTP client over a Unix socket or TCP ([`HttpEngine`])
//! - An in-memory engine for tests (feature `fake`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             dockform-reconcile              │
//! │   container / volume / network controllers  │
//! └─────────────────────────────────────────────┘
//!          │ Arc<dyn ContainerOps> ...
//!          ▼
//! ┌─────────────────────────────────────────────┐
//! │              dockform-engine                │
//! │  ┌──────────────┐      ┌────────────────┐   │
//! │  │  HttpEngine  │      │   FakeEngine   │   │
//! │  └──────────────┘      └────────────────┘   │
//! └─────────────────────────────────────────────┘
//!          │ HTTP/1.1 (unix:// or tcp://)
//!          ▼
//!     container engine
//! ```
//!
//! "Not found" is the one error the reconciler treats as a signal rather
//! than a failure; every implementation reports it through
//! [`EngineError::is_not_found`].

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod http;
pub mod types;

pub use client::{
    ContainerOps, Engine, ListContainersOptions, NetworkOps, RemoveContainerOptions, SystemOps,
    VolumeOps,
};
pub use config::{EngineConfig, Endpoint};
pub use error::{EngineError, ObjectKind, Result};
#[cfg(any(test, feature = "fake"))]
pub use fake::FakeEngine;
pub use http::HttpEngine;
pub use types::*;
