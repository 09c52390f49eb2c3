//! Cluster model - hash slots and topology snapshots
//!
//! Redis-style cluster addressing:
//! - Hash slot algorithm (CRC16 mod 16384, `{tag}` aware)
//! - Node descriptors with roles, link state and served slots
//! - Immutable topology snapshots with lookups and derived views
//! - `CLUSTER NODES` reply parsing

pub mod hash_slot;
pub mod node_list;
pub mod topology;
pub mod types;

pub use hash_slot::{HashSlot, hash_slot};
pub use topology::ClusterTopology;
pub use types::{ClusterNode, LinkState, NodeFlags, NodeRole, SlotRange, SlotSpan, TOTAL_SLOTS};
