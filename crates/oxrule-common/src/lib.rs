//! Shared building blocks for the oxrule workspace.
//!
//! Everything that more than one crate needs lives here: the rule data
//! model with its deterministic serialization, tenant identity propagation
//! across HTTP and gRPC boundaries, and the 32-bit shard key used to
//! distribute rule groups over the replica ring.

pub mod rules;
pub mod shard;
pub mod tenant;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("oxrule");
}
