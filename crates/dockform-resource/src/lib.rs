//! # dockform-resource
//!
//! Declarative record types for containers, volumes, networks and compose
//! stacks.
//!
//! Every record shares one envelope, [`Resource`]: metadata, the desired
//! parameters under `spec.forProvider`, and status with conditions and the
//! last observation under `status.atProvider`. JSON and YAML field names are
//! camelCase.
//!
//! Whether a record has been created is carried by a single annotation,
//! [`EXTERNAL_NAME_ANNOTATION`], holding the engine-side identity.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod condition;
pub mod container;
pub mod meta;
pub mod network;
pub mod stack;
pub mod volume;

pub use condition::{Condition, ConditionStatus, ConditionType, Reason};
pub use container::{CONTAINER_KIND, Container, ContainerObservation, ContainerParameters};
pub use meta::{
    API_GROUP, DEFAULT_NAMESPACE, EXTERNAL_NAME_ANNOTATION, ObjectMeta, Resource, ResourceSpec,
    ResourceStatus,
};
pub use network::{NETWORK_KIND, Network, NetworkObservation, NetworkParameters};
pub use stack::{COMPOSE_STACK_KIND, ComposeStack, ComposeStackObservation, ComposeStackParameters};
pub use volume::{VOLUME_KIND, Volume, VolumeObservation, VolumeParameters};
