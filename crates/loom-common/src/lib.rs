//! Shared leaf types for the Loom compiler.
//!
//! Everything here is consumed by both the IR substrate (`loom-ir`) and the
//! transfer lowering pass (`loom-lower`): device meshes, tensor layouts, and
//! the typed error value the lowering pass surfaces to its caller.

pub mod error;
pub mod layout;
pub mod mesh;

pub use error::LowerError;
pub use layout::{Layout, Sharding};
pub use mesh::{DeviceKind, Mesh, MeshDim};
