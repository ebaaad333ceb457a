//! Arena-based IR substrate for the Loom compiler.
//!
//! Holds exactly the surface the transfer lowering pass needs from a general
//! IR library: tensor types, a module graph with erase-and-replace op
//! semantics, a collision-free symbol-allocation service, an insertion-point
//! builder, and a deterministic printer for structural comparison in tests.

pub mod builder;
pub mod module;
pub mod ops;
pub mod print;
pub mod types;

pub use builder::OpBuilder;
pub use module::{
    BlockId, BlockOwner, FuncId, InsertPoint, Module, OpId, ValueDef, ValueId, Visibility,
};
pub use ops::{OpKind, CUSTOM_DEVICE_ATTR};
pub use types::{ConstData, ElemType, TensorType};
