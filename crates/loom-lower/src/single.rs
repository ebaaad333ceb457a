//! Single-target transfer lowerers.
//!
//! These handle Send/Recv pairs whose source and destination meshes each
//! expose exactly one relevant local device (plus the CPU fan-out variant):
//! one concrete transfer primitive is emitted, with no runtime branching.
//! Every lowerer splices the concrete op in, redirects any uses of the
//! abstract op's result, and erases the abstract op.

use loom_common::{Layout, LowerError, Mesh};
use loom_ir::{Module, OpBuilder, OpId, OpKind, TensorType, ValueId};

use crate::ordinal::{device_ordinal, OrdinalWidth};
use crate::program_key::get_or_create_program_key;

// ── Abstract-op accessors ────────────────────────────────────────────

/// Key, target layout, and transferred operand of an abstract send.
///
/// # Panics
///
/// Panics when `op` is not a `TensorSend` -- the orchestrator matched the
/// pair, so anything else is a precondition violation.
pub(crate) fn send_parts(module: &Module, op: OpId) -> (String, Layout, ValueId) {
    let data = module.op(op);
    match &data.kind {
        OpKind::TensorSend { key, target_layout } => {
            (key.clone(), target_layout.clone(), data.operands[0])
        }
        other => panic!("expected tensor_send, got {}", other.name()),
    }
}

/// Key, layout, result value, and result type of an abstract receive.
///
/// # Panics
///
/// Panics when `op` is not a `TensorRecv`.
pub(crate) fn recv_parts(module: &Module, op: OpId) -> (String, Layout, ValueId, TensorType) {
    let data = module.op(op);
    match &data.kind {
        OpKind::TensorRecv { key, layout } => {
            let result = data.results[0];
            (
                key.clone(),
                layout.clone(),
                result,
                module.value_ty(result).clone(),
            )
        }
        other => panic!("expected tensor_recv, got {}", other.name()),
    }
}

fn first_local_device(mesh: &Mesh) -> String {
    mesh.local_devices()
        .first()
        .expect("transfer mesh must expose at least one local device")
        .clone()
}

// ── Host <-> host ────────────────────────────────────────────────────

/// Lower an abstract send to a point-to-point host send between the first
/// local devices of the two meshes.
pub fn lower_send_to_host(
    module: &mut Module,
    send_layout: &Layout,
    send: OpId,
) -> Result<OpId, LowerError> {
    let (key, target_layout, input) = send_parts(module, send);
    let send_device = first_local_device(send_layout.mesh());
    let recv_device = first_local_device(target_layout.mesh());

    let mut b = OpBuilder::before(module, send);
    // Server-owned transfer: not torn down by a client disconnect.
    let lowered = b.host_send(input, key, send_device, recv_device, false);
    module.erase_op(send);
    Ok(lowered)
}

/// Lower an abstract receive to the mirroring host receive, bound to the
/// same key and device pair. `output_ty` overrides the declared result type
/// when the local tensor type differs from the abstract op's type.
pub fn lower_recv_to_host(
    module: &mut Module,
    send_mesh: &Mesh,
    recv: OpId,
    output_ty: Option<TensorType>,
) -> Result<OpId, LowerError> {
    let (key, layout, result, recv_ty) = recv_parts(module, recv);
    let ty = output_ty.unwrap_or(recv_ty);
    let send_device = first_local_device(send_mesh);
    let recv_device = first_local_device(layout.mesh());

    let mut b = OpBuilder::before(module, recv);
    let lowered = b.host_recv(ty, key, send_device, recv_device);
    let new_result = b.out(lowered);
    module.replace_all_uses(result, new_result);
    module.erase_op(recv);
    Ok(lowered)
}

// ── Host <-> accelerator ─────────────────────────────────────────────

/// Lower an abstract send crossing a host/accelerator boundary.
///
/// A host-resident sender needs the cluster's compilation key and a device
/// ordinal (constant zero under the `send_from_device_zero` policy, resolved
/// at runtime otherwise). An accelerator-resident sender already knows its
/// own identity and emits a direct accelerator-to-host send.
pub fn lower_send_to_accel(
    module: &mut Module,
    send_layout: &Layout,
    send: OpId,
    send_from_device_zero: bool,
) -> Result<OpId, LowerError> {
    let (key, _target_layout, input) = send_parts(module, send);

    let lowered = if send_layout.mesh().is_host_mesh() {
        let program_key = get_or_create_program_key(module, send)?;
        let ordinal = if send_from_device_zero {
            // Only sending from host device 0 to the target accelerators.
            let mut b = OpBuilder::before(module, send);
            let zero = b.scalar_const_i32(0);
            b.out(zero)
        } else {
            // Special topologies: host device i sends to accelerator i.
            if module.parent_cluster(send).is_none() {
                return Err(LowerError::invalid_argument(
                    "send op is not inside a cluster",
                ));
            }
            let func = module.parent_func(send);
            let point = module.insert_point_before(send);
            device_ordinal(module, point, send_layout.mesh(), func, OrdinalWidth::I32)?
        };
        let mut b = OpBuilder::before(module, send);
        b.send_from_host(input, program_key, ordinal, key)
    } else {
        let mut b = OpBuilder::before(module, send);
        b.send_to_host(input, key)
    };

    module.erase_op(send);
    Ok(lowered)
}

/// Lower an abstract receive crossing a host/accelerator boundary.
///
/// A host-resident receiver resolves its ordinal over the enclosing
/// cluster's mesh and receives through the compilation key; an
/// accelerator-resident receiver emits a direct receive with an explicit
/// result shape attribute.
pub fn lower_recv_to_accel(
    module: &mut Module,
    recv: OpId,
    output_ty: Option<TensorType>,
) -> Result<OpId, LowerError> {
    let (key, layout, result, recv_ty) = recv_parts(module, recv);
    let ty = output_ty.unwrap_or(recv_ty);

    let lowered = if layout.mesh().is_host_mesh() {
        let cluster = module.parent_cluster(recv).ok_or_else(|| {
            LowerError::invalid_argument("recv op is not inside a cluster")
        })?;
        let mesh = module.cluster_mesh(cluster).cloned().ok_or_else(|| {
            LowerError::invalid_argument(
                "failed to get device ordinal as mesh for operation is not specified",
            )
        })?;
        let func = module.parent_func(recv);
        let body = module.cluster_body(cluster);
        let ordinal = device_ordinal(
            module,
            loom_ir::InsertPoint::block_start(body),
            &mesh,
            func,
            OrdinalWidth::I32,
        )?;
        let program_key = get_or_create_program_key(module, recv)?;
        let mut b = OpBuilder::before(module, recv);
        b.recv_at_host(ty, program_key, ordinal, key)
    } else {
        let mut b = OpBuilder::before(module, recv);
        b.recv_from_host(ty, key)
    };

    let new_result = module.result(lowered, 0);
    module.replace_all_uses(result, new_result);
    module.erase_op(recv);
    Ok(lowered)
}

// ── CPU fan-out ──────────────────────────────────────────────────────

/// Lower an abstract send into one host send per receiving device: the same
/// tensor value fanned out from the first local sending device.
pub fn lower_fanout_send(
    module: &mut Module,
    send_layout: &Layout,
    send: OpId,
) -> Result<OpId, LowerError> {
    let (key, target_layout, input) = send_parts(module, send);
    let send_device = first_local_device(send_layout.mesh());
    let receiving: Vec<String> = target_layout.mesh().local_devices().to_vec();
    assert!(
        !receiving.is_empty(),
        "fan-out target mesh must expose local devices"
    );

    let mut b = OpBuilder::before(module, send);
    let mut lowered = None;
    for recv_device in receiving {
        lowered = Some(b.host_send(input, key.clone(), send_device.clone(), recv_device, false));
    }
    module.erase_op(send);
    Ok(lowered.expect("at least one send was emitted"))
}

/// Lower an abstract receive into one host receive per receiving device,
/// all writing the same logical result; the last receive's result is what
/// subsequent users see.
pub fn lower_fanout_recv(
    module: &mut Module,
    send_mesh: &Mesh,
    recv: OpId,
) -> Result<OpId, LowerError> {
    let (key, layout, result, recv_ty) = recv_parts(module, recv);
    let send_device = first_local_device(send_mesh);
    let receiving: Vec<String> = layout.mesh().local_devices().to_vec();
    assert!(
        !receiving.is_empty(),
        "fan-out receive mesh must expose local devices"
    );

    let mut b = OpBuilder::before(module, recv);
    let mut lowered = None;
    for recv_device in receiving {
        lowered = Some(b.host_recv(
            recv_ty.clone(),
            key.clone(),
            send_device.clone(),
            recv_device,
        ));
    }
    let lowered = lowered.expect("at least one receive was emitted");

    let new_result = module.result(lowered, 0);
    module.replace_all_uses(result, new_result);
    module.erase_op(recv);
    Ok(lowered)
}
