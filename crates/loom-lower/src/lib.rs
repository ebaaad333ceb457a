//! Cross-device transfer lowering.
//!
//! Rewrites abstract `tensor_send`/`tensor_recv` ops -- cross-mesh data
//! movement annotated with source and destination layouts -- into the
//! concrete communication primitives an executor can run: point-to-point
//! host transfers, host/accelerator boundary transfers, or a
//! runtime-dispatched selection among per-device-pair subprograms.
//!
//! The pass is single-threaded graph surgery: one call lowers one matched
//! Send/Recv pair to completion, replacing (never mutating) the abstract
//! ops. Failures are typed `LowerError` values; internal invariant
//! violations are panics.

pub mod adapter;
pub mod branch;
pub mod classify;
pub mod ordinal;
pub mod program_key;
pub mod single;

pub use branch::{lower_one_to_one_recv, lower_one_to_one_send, LoweredSend};
pub use classify::{classify, is_abstract_transfer, lower_transfer, LoweredTransfer, TransferKind};
pub use ordinal::{device_ordinal, OrdinalWidth};
pub use program_key::get_or_create_program_key;
pub use single::{
    lower_fanout_recv, lower_fanout_send, lower_recv_to_accel, lower_recv_to_host,
    lower_send_to_accel, lower_send_to_host,
};
