//! # Grove Binder - Seeding User Programs into the Heartwood
//!
//! Host-side build tool that prepares AethelOS user programs for embedding
//! in the kernel image.
//!
//! ## Stages
//!
//! 1. **apps** - every program in the programs directory gets its own load
//!    address (`base + index * step`) and is linked there by the toolchain
//! 2. **table** - the linked programs are spliced into the kernel's data
//!    section behind a `_num_app` table the kernel walks at boot
//! 3. **image** - the toolchain builds the bootable kernel image
//!
//! Program order is byte-wise sorted name order. It decides both the load
//! address and the table slot of every program, and is recorded in a
//! manifest between stages so the two cannot drift apart.

pub mod builder;
pub mod config;
pub mod embed;
pub mod error;
pub mod layout;
pub mod logger;
pub mod manifest;
pub mod packed;
pub mod pipeline;
pub mod placement;
pub mod program_set;
pub mod toolchain;

#[cfg(test)]
mod testutil;

// Re-export key types
pub use config::{BinderConfig, BuildMode, FailurePolicy, LayoutStrategy, Stages};
pub use embed::EmbeddingTable;
pub use error::{BinderError, Result};
pub use manifest::Manifest;
pub use packed::{PackedError, PackedImage};
pub use placement::Placement;
pub use program_set::ProgramSet;
pub use toolchain::{BuildRequest, CommandToolchain, Toolchain};
