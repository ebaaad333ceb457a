//! Branching multi-target lowerer.
//!
//! Used when the sending and receiving meshes expose their local devices in
//! a fixed 1:1 correspondence and the lowered code runs uniformly at every
//! device of the mesh: which physical pair to transfer along is only known
//! at run time. One private subprogram is generated per device-pair index,
//! and a multi-way `case` selects among them by the resolved device ordinal.

use std::hash::{DefaultHasher, Hash, Hasher};

use loom_common::{DeviceKind, Layout, LowerError, Mesh};
use loom_ir::{
    FuncId, Module, OpBuilder, OpId, TensorType, ValueId, Visibility, CUSTOM_DEVICE_ATTR,
};

use crate::adapter;
use crate::ordinal::{device_ordinal, OrdinalWidth};
use crate::single::{recv_parts, send_parts};

/// Outcome of a branching send lowering.
///
/// Erasure of the abstract send is deferred for accelerator destinations
/// (a later accelerator-specific rewrite still inspects the op's cluster
/// membership), so liveness is reported explicitly rather than left for
/// callers to guess from the backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoweredSend {
    pub op: OpId,
    pub send_erased: bool,
}

/// Structural hash of an op, used to derive collision-free subprogram names.
fn op_hash(module: &Module, op: OpId) -> u64 {
    let data = module.op(op);
    let mut hasher = DefaultHasher::new();
    data.kind.name().hash(&mut hasher);
    if let Some(key) = data.kind.transfer_key() {
        key.hash(&mut hasher);
    }
    for &operand in &data.operands {
        module.value_ty(operand).to_string().hash(&mut hasher);
    }
    for &result in &data.results {
        module.value_ty(result).to_string().hash(&mut hasher);
    }
    hasher.finish()
}

/// Position-wise zip of the two meshes' local device names.
///
/// Both lists must be non-empty; when their lengths differ the 1:1
/// correspondence is caller-guaranteed and the excess is ignored.
fn device_pairs(send_mesh: &Mesh, recv_mesh: &Mesh) -> Vec<(String, String)> {
    let pairs: Vec<(String, String)> = send_mesh
        .local_devices()
        .iter()
        .cloned()
        .zip(recv_mesh.local_devices().iter().cloned())
        .collect();
    assert!(
        !pairs.is_empty(),
        "branching lowering requires local devices on both meshes"
    );
    pairs
}

/// Generate one private subprogram per device pair.
///
/// Each subprogram takes the original op's operand types, runs the transfer
/// emitted by `emit` for its pair, and returns that op's results. Names are
/// derived from the op's mnemonic, a structural hash, and the pair index,
/// allocated through the module's symbol service.
fn generate_branches<F>(
    module: &mut Module,
    op: OpId,
    result_tys: &[TensorType],
    tag: &str,
    pairs: &[(String, String)],
    mut emit: F,
) -> Vec<String>
where
    F: FnMut(&mut OpBuilder, FuncId, Option<ValueId>, &(String, String)) -> OpId,
{
    let param_tys: Vec<TensorType> = {
        let data = module.op(op);
        data.operands
            .iter()
            .map(|&o| module.value_ty(o).clone())
            .collect()
    };
    let hash = op_hash(module, op);
    let mnemonic = module.op(op).kind.name();

    let mut branches = Vec::with_capacity(pairs.len());
    for (index, pair) in pairs.iter().enumerate() {
        let name = module.reserve_unique_name(&format!("{mnemonic}_{tag}_{hash:x}_{index}"));
        let func = module.insert_func(
            name.clone(),
            Visibility::Private,
            param_tys.clone(),
            result_tys.to_vec(),
        );
        let arg = if param_tys.is_empty() {
            None
        } else {
            Some(module.func_arg(func, 0))
        };
        let body = module.func(func).body;
        let mut b = OpBuilder::new(module, loom_ir::InsertPoint::block_start(body));
        let branch_op = emit(&mut b, func, arg, pair);
        let results: Vec<ValueId> = (0..result_tys.len())
            .map(|i| b.module().result(branch_op, i))
            .collect();
        b.ret(results);
        branches.push(name);
    }
    branches
}

/// Lower an abstract send over 1:1-paired meshes into a `case` dispatching
/// to one host-send subprogram per device pair.
pub fn lower_one_to_one_send(
    module: &mut Module,
    send_layout: &Layout,
    recv_mesh: &Mesh,
    send: OpId,
) -> Result<LoweredSend, LowerError> {
    let (key, _target_layout, input) = send_parts(module, send);
    let pairs = device_pairs(send_layout.mesh(), recv_mesh);
    let i32_copy = module.value_ty(input).elem.is_i32();

    let cluster = module
        .parent_cluster(send)
        .ok_or_else(|| LowerError::invalid_argument("send op is not inside a cluster"))?;
    let exec_mesh = module.cluster_mesh(cluster).cloned().ok_or_else(|| {
        LowerError::invalid_argument(
            "failed to get device ordinal as mesh for operation is not specified",
        )
    })?;
    let func = module.parent_func(send);
    let point = module.insert_point_before(send);
    let ordinal = device_ordinal(module, point, &exec_mesh, func, OrdinalWidth::I32)?;

    let placement = send_layout.to_string();
    let branches = generate_branches(
        module,
        send,
        &[],
        "send",
        &pairs,
        |b, branch_func, arg, pair| {
            let arg = arg.expect("send branch takes the transferred value");
            b.module()
                .set_arg_attr(branch_func, 0, CUSTOM_DEVICE_ATTR, placement.clone());
            let mut value = arg;
            if i32_copy {
                let widened = adapter::widen(b, value);
                value = b.out(widened);
            }
            b.host_send(value, key.clone(), pair.0.clone(), pair.1.clone(), false)
        },
    );

    let operands = module.op(send).operands.clone();
    let mut b = OpBuilder::before(module, send);
    // The transfer has observable side effects: never treat the dispatch as
    // pure or cacheable.
    let case = b.case(ordinal, operands, branches, vec![], false);

    let send_erased = recv_mesh.device_kind() == DeviceKind::Gpu;
    if send_erased {
        module.erase_op(send);
    }
    Ok(LoweredSend {
        op: case,
        send_erased,
    })
}

/// Lower an abstract receive over 1:1-paired meshes into a `case`
/// dispatching to one host-receive subprogram per device pair, narrowing
/// the combined result once after dispatch when the element type was
/// widened in transit.
pub fn lower_one_to_one_recv(
    module: &mut Module,
    send_mesh: &Mesh,
    recv_layout: &Layout,
    recv: OpId,
) -> Result<OpId, LowerError> {
    let (key, _own_layout, result, recv_ty) = recv_parts(module, recv);
    let pairs = device_pairs(send_mesh, recv_layout.mesh());

    let i32_copy = adapter::needs_widening(&recv_ty);
    let local_ty = TensorType::new(recv_layout.local_shape(&recv_ty.shape), recv_ty.elem);
    let output_ty = if i32_copy {
        adapter::widened(&local_ty)
    } else {
        local_ty.clone()
    };

    let cluster = module
        .parent_cluster(recv)
        .ok_or_else(|| LowerError::invalid_argument("recv op is not inside a cluster"))?;
    let exec_mesh = module.cluster_mesh(cluster).cloned().ok_or_else(|| {
        LowerError::invalid_argument(
            "failed to get device ordinal as mesh for operation is not specified",
        )
    })?;
    let func = module.parent_func(recv);
    let point = module.insert_point_before(recv);
    let ordinal = device_ordinal(module, point, &exec_mesh, func, OrdinalWidth::I32)?;

    let branches = generate_branches(
        module,
        recv,
        std::slice::from_ref(&output_ty),
        "receive",
        &pairs,
        |b, _branch_func, _arg, pair| {
            let recv_op = b.host_recv(
                output_ty.clone(),
                key.clone(),
                pair.0.clone(),
                pair.1.clone(),
            );
            b.module().set_layout(recv_op, recv_layout.clone());
            recv_op
        },
    );

    let operands = module.op(recv).operands.clone();
    let mut b = OpBuilder::before(module, recv);
    let case = b.case(ordinal, operands, branches, vec![output_ty], false);
    let lowered = if i32_copy {
        let case_val = b.out(case);
        adapter::narrow(&mut b, case_val)
    } else {
        case
    };

    let new_result = module.result(lowered, 0);
    module.replace_all_uses(result, new_result);
    module.erase_op(recv);
    Ok(lowered)
}
