//! The operation vocabulary the transfer lowering pass consumes and emits.
//!
//! Abstract `TensorSend`/`TensorRecv` ops describe cross-mesh data movement
//! and are replaced by the pass; everything else is either a concrete
//! transfer primitive understood by the downstream runtime or a small
//! arithmetic/structural helper the pass needs to build ordinal lookups and
//! branch dispatch.

use loom_common::{Layout, Mesh};

use crate::types::ConstData;

/// Attribute key marking a function argument with its device placement
/// (the serialized layout of the value it carries). Placement-sensitive
/// passes downstream read this to see the correct assignment.
pub const CUSTOM_DEVICE_ATTR: &str = "custom_device";

/// The kind of an operation, with its static attributes inline.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// A constant tensor. One result.
    Const { data: ConstData },
    /// 1-element slice of a rank-1 tensor at a runtime offset.
    /// Operands: input, begin, size. One result.
    Slice,
    /// Shape change without data movement. Operand: input. One result.
    Reshape,
    /// Element-type conversion. Operand: input. One result.
    Cast,

    /// Abstract cross-mesh send, erased by the lowering pass.
    /// Operand: the value to transfer. No results.
    TensorSend { key: String, target_layout: Layout },
    /// Abstract cross-mesh receive, erased by the lowering pass.
    /// No operands; one result carrying `layout`.
    TensorRecv { key: String, layout: Layout },

    /// Point-to-point host send. Operand: the value. No results.
    HostSend {
        key: String,
        send_device: String,
        recv_device: String,
        send_device_incarnation: i64,
        client_terminated: bool,
    },
    /// Point-to-point host receive. No operands; one result.
    HostRecv {
        key: String,
        send_device: String,
        recv_device: String,
        send_device_incarnation: i64,
    },

    /// Host-to-accelerator send. Operands: value, program key, device
    /// ordinal. No results.
    SendFromHost { key: String },
    /// Accelerator-to-host send; the accelerator instance knows its own
    /// identity, so no ordinal is needed. Operand: value. No results.
    SendToHost { key: String },
    /// Host-side receive from an accelerator. Operands: program key, device
    /// ordinal. One result.
    RecvAtHost { key: String },
    /// Accelerator-resident receive with an explicit result shape attribute.
    /// No operands; one result.
    RecvFromHost { key: String, shape: Vec<i64> },

    /// Placeholder for the accelerator program's launch identity, filled in
    /// by a downstream compilation step. One result: `tensor<3xstring>`.
    ProgramKey,

    /// Multi-way dispatch: evaluates the branch index operand and invokes
    /// exactly the subprogram at that index. Operands: branch index, then
    /// the forwarded arguments. `is_stateless: false` marks the transfer's
    /// observable side effects as non-reorderable.
    Case {
        branches: Vec<String>,
        is_stateless: bool,
    },

    /// A compilation cluster: a region of ops compiled for one mesh.
    Cluster { mesh: Option<Mesh> },

    /// Terminator returning a subprogram's results.
    Return,
}

impl OpKind {
    /// Short mnemonic used in printed IR and generated subprogram names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Const { .. } => "const",
            Self::Slice => "slice",
            Self::Reshape => "reshape",
            Self::Cast => "cast",
            Self::TensorSend { .. } => "tensor_send",
            Self::TensorRecv { .. } => "tensor_recv",
            Self::HostSend { .. } => "host_send",
            Self::HostRecv { .. } => "host_recv",
            Self::SendFromHost { .. } => "send_from_host",
            Self::SendToHost { .. } => "send_to_host",
            Self::RecvAtHost { .. } => "recv_at_host",
            Self::RecvFromHost { .. } => "recv_from_host",
            Self::ProgramKey => "program_key",
            Self::Case { .. } => "case",
            Self::Cluster { .. } => "cluster",
            Self::Return => "return",
        }
    }

    /// The transfer key, for op kinds that carry one.
    pub fn transfer_key(&self) -> Option<&str> {
        match self {
            Self::TensorSend { key, .. }
            | Self::TensorRecv { key, .. }
            | Self::HostSend { key, .. }
            | Self::HostRecv { key, .. }
            | Self::SendFromHost { key }
            | Self::SendToHost { key }
            | Self::RecvAtHost { key }
            | Self::RecvFromHost { key, .. } => Some(key),
            _ => None,
        }
    }
}
