//! Transfer strategy classification and dispatch.
//!
//! The choice among the single-target, fan-out, accelerator-boundary, and
//! branching lowerers is made exactly once per matched Send/Recv pair by an
//! explicit classifier over the two meshes, then dispatched from one place.

use loom_common::{Layout, LowerError, Mesh};
use loom_ir::{Module, OpId, OpKind};

use crate::branch::{lower_one_to_one_recv, lower_one_to_one_send};
use crate::single::{
    lower_fanout_recv, lower_fanout_send, lower_recv_to_accel, lower_recv_to_host,
    lower_send_to_accel, lower_send_to_host, recv_parts, send_parts,
};

/// The lowering strategy for one matched Send/Recv pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// One local device on each side, both host-resident.
    HostSingle,
    /// One host sender fanning out to several receiving devices.
    HostFanOut,
    /// The transfer crosses a host/accelerator boundary.
    AccelBoundary,
    /// Both meshes expose several local devices in 1:1 correspondence;
    /// runtime branching selects the physical pair.
    OneToOneBranching,
}

/// Pick the lowering strategy from the device-count relationship and the
/// backends of the two meshes.
pub fn classify(send_mesh: &Mesh, recv_mesh: &Mesh) -> TransferKind {
    let senders = send_mesh.local_devices().len();
    let receivers = recv_mesh.local_devices().len();
    if senders > 1 && senders == receivers {
        return TransferKind::OneToOneBranching;
    }
    if send_mesh.is_accel_mesh() || recv_mesh.is_accel_mesh() {
        return TransferKind::AccelBoundary;
    }
    if receivers > 1 {
        return TransferKind::HostFanOut;
    }
    TransferKind::HostSingle
}

/// Outcome of lowering one matched pair.
///
/// `send_erased` reports the abstract send's liveness explicitly: the
/// branching lowerer defers erasure for accelerator destinations, and
/// callers must never infer liveness from the backend type themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoweredTransfer {
    pub kind: TransferKind,
    pub send_op: OpId,
    pub recv_op: OpId,
    pub send_erased: bool,
}

/// Lower one matched Send/Recv pair to concrete transfer primitives.
///
/// `send_layout` is the layout of the value flowing into the send, computed
/// by the caller's layout propagation. The abstract recv is consumed in
/// every case; the abstract send's fate is reported in the result.
///
/// # Panics
///
/// Panics when the two ops do not carry the same transfer key -- matching
/// is the orchestrator's job, so a mismatch is a precondition violation.
pub fn lower_transfer(
    module: &mut Module,
    send_layout: &Layout,
    send: OpId,
    recv: OpId,
) -> Result<LoweredTransfer, LowerError> {
    let (send_key, target_layout, _input) = send_parts(module, send);
    let (recv_key, recv_layout, _result, _ty) = recv_parts(module, recv);
    assert_eq!(
        send_key, recv_key,
        "send/recv pair with mismatched transfer keys"
    );

    let send_mesh = send_layout.mesh().clone();
    let recv_mesh = target_layout.mesh().clone();
    let kind = classify(&send_mesh, &recv_mesh);

    match kind {
        TransferKind::HostSingle => {
            let send_op = lower_send_to_host(module, send_layout, send)?;
            let recv_op = lower_recv_to_host(module, &send_mesh, recv, None)?;
            Ok(LoweredTransfer {
                kind,
                send_op,
                recv_op,
                send_erased: true,
            })
        }
        TransferKind::HostFanOut => {
            let send_op = lower_fanout_send(module, send_layout, send)?;
            let recv_op = lower_fanout_recv(module, &send_mesh, recv)?;
            Ok(LoweredTransfer {
                kind,
                send_op,
                recv_op,
                send_erased: true,
            })
        }
        TransferKind::AccelBoundary => {
            // A lone host device always sends from device zero; the ordinal
            // is only resolved for paired special topologies.
            let from_device_zero =
                send_mesh.is_host_mesh() && send_mesh.local_devices().len() == 1;
            let send_op = lower_send_to_accel(module, send_layout, send, from_device_zero)?;
            let recv_op = lower_recv_to_accel(module, recv, None)?;
            Ok(LoweredTransfer {
                kind,
                send_op,
                recv_op,
                send_erased: true,
            })
        }
        TransferKind::OneToOneBranching => {
            let lowered = lower_one_to_one_send(module, send_layout, &recv_mesh, send)?;
            let recv_op = lower_one_to_one_recv(module, &send_mesh, &recv_layout, recv)?;
            Ok(LoweredTransfer {
                kind,
                send_op: lowered.op,
                recv_op,
                send_erased: lowered.send_erased,
            })
        }
    }
}

/// True when an op is an abstract transfer op this pass consumes.
pub fn is_abstract_transfer(module: &Module, op: OpId) -> bool {
    matches!(
        module.op(op).kind,
        OpKind::TensorSend { .. } | OpKind::TensorRecv { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::DeviceKind;

    fn host(n: usize) -> Mesh {
        let devices = (0..n).map(|i| format!("/device:CPU:{i}")).collect();
        Mesh::with_local_devices("cpu", DeviceKind::Cpu, devices)
    }

    fn tpu(n: usize) -> Mesh {
        let devices = (0..n).map(|i| format!("/device:TPU:{i}")).collect();
        Mesh::with_local_devices("tpu", DeviceKind::Tpu, devices)
    }

    #[test]
    fn single_host_pair_is_host_single() {
        assert_eq!(classify(&host(1), &host(1)), TransferKind::HostSingle);
    }

    #[test]
    fn one_sender_many_receivers_is_fan_out() {
        assert_eq!(classify(&host(1), &host(4)), TransferKind::HostFanOut);
    }

    #[test]
    fn accelerator_on_either_side_is_accel_boundary() {
        assert_eq!(classify(&host(1), &tpu(1)), TransferKind::AccelBoundary);
        assert_eq!(classify(&tpu(1), &host(1)), TransferKind::AccelBoundary);
    }

    #[test]
    fn matched_multi_device_meshes_branch() {
        assert_eq!(
            classify(&host(2), &host(2)),
            TransferKind::OneToOneBranching
        );
        assert_eq!(
            classify(&host(4), &tpu(4)),
            TransferKind::OneToOneBranching
        );
    }
}
