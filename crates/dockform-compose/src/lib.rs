//! # dockform-compose
//!
//! Compose stacks: one record standing for a whole multi-service
//! application.
//!
//! A stack's document is parsed ([`model`]) after variable substitution
//! ([`interpolate`]), split into per-service container parameters plus
//! project networks and volumes ([`decompose`]), ordered by `depends_on`
//! ([`order`]) and adjusted by the record's own settings ([`overrides`]).
//! [`StackController`] then drives the engine through the same
//! observe / create / update / delete cycle as every other kind.
//!
//! ```text
//! ComposeStack ──▶ document ──▶ interpolate ──▶ ComposeFile
//!                                                   │
//!                                  decompose + order + overrides
//!                                                   ▼
//!                   networks, volumes ──▶ containers (dependency order)
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod decompose;
pub mod error;
pub mod interpolate;
pub mod model;
pub mod order;
pub mod overrides;
pub mod stack;

pub use decompose::{
    NetworkPlan, PROJECT_LABEL, SERVICE_LABEL, ServicePlan, StackPlan, VolumePlan,
    container_name, decompose, record_name,
};
pub use error::{ComposeError, Result};
pub use model::ComposeFile;
pub use order::creation_order;
pub use stack::StackController;
