//! Device ordinal resolution.
//!
//! The runtime device *id* is a global identifier known only at run time;
//! what the dispatch constructs need is the device's *ordinal* -- its 0-based
//! position within the mesh's local-device list. The translation is done
//! without control flow: a constant id->ordinal lookup table is indexed by
//! the runtime device id via a 1-element slice, then reshaped to a scalar.

use loom_common::{LowerError, Mesh};
use loom_ir::{ElemType, FuncId, InsertPoint, Module, OpBuilder, ValueId};

/// Result width of the resolved ordinal.
///
/// Some downstream runtime primitives expect 64-bit indices; for those the
/// 32-bit ordinal is widened with an explicit cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalWidth {
    I32,
    I64,
}

/// Compute the ordinal of the currently executing device within `mesh`.
///
/// Emits the lookup computation at `point` inside `func` and returns the
/// scalar ordinal value. Fails with *invalid argument* when the function
/// does not expose a device id.
pub fn device_ordinal(
    module: &mut Module,
    point: InsertPoint,
    mesh: &Mesh,
    func: FuncId,
    width: OrdinalWidth,
) -> Result<ValueId, LowerError> {
    // One entry per device in the entire mesh; only local ids get filled in.
    let mut device_id_to_ordinal = vec![0i32; mesh.num_devices()];
    for (ordinal, &id) in mesh.local_device_ids().iter().enumerate() {
        device_id_to_ordinal[id] = ordinal as i32;
    }

    let device_id = module.device_id(func)?;

    let mut b = OpBuilder::new(module, point);
    let table = b.const_i32(device_id_to_ordinal);
    let table_val = b.out(table);
    // The slice primitive wants a rank-1 begin index.
    let begin = b.reshape(device_id, vec![1]);
    let begin_val = b.out(begin);
    let size = b.const_i32(vec![1]);
    let size_val = b.out(size);
    let sliced = b.slice(table_val, begin_val, size_val);
    let sliced_val = b.out(sliced);
    let scalar = b.reshape(sliced_val, vec![]);
    let scalar_val = b.out(scalar);

    Ok(match width {
        OrdinalWidth::I32 => scalar_val,
        OrdinalWidth::I64 => {
            let widened = b.cast(scalar_val, ElemType::I64);
            b.out(widened)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_common::DeviceKind;
    use loom_ir::print::print_ops;
    use loom_ir::{BlockId, OpKind, TensorType, Visibility};

    fn mesh_with_local_ids(local_ids: Vec<usize>, total: usize) -> Mesh {
        let names = local_ids
            .iter()
            .map(|i| format!("/device:TPU:{i}"))
            .collect();
        Mesh::new(
            "m",
            DeviceKind::Tpu,
            vec![loom_common::MeshDim::new("x", total)],
            total,
            local_ids,
            names,
        )
    }

    fn func_with_device_id(module: &mut Module) -> (FuncId, BlockId) {
        let f = module.insert_func(
            "main",
            Visibility::Public,
            vec![TensorType::scalar(ElemType::I32)],
            vec![],
        );
        let body = module.func(f).body;
        (f, body)
    }

    #[test]
    fn lookup_table_maps_local_ids_to_ordinals() {
        let mut module = Module::new();
        let (f, body) = func_with_device_id(&mut module);
        let mesh = mesh_with_local_ids(vec![4, 5, 6, 7], 8);
        device_ordinal(
            &mut module,
            InsertPoint::block_start(body),
            &mesh,
            f,
            OrdinalWidth::I32,
        )
        .unwrap();

        let table = module
            .walk(body)
            .into_iter()
            .find_map(|op| match &module.op(op).kind {
                OpKind::Const { data: loom_ir::ConstData::I32(v) } if v.len() == 8 => {
                    Some(v.clone())
                }
                _ => None,
            })
            .expect("expected an 8-entry lookup table");
        assert_eq!(table, vec![0, 0, 0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn resolves_to_scalar_i32_by_default() {
        let mut module = Module::new();
        let (f, body) = func_with_device_id(&mut module);
        let mesh = mesh_with_local_ids(vec![0, 1], 2);
        let ordinal = device_ordinal(
            &mut module,
            InsertPoint::block_start(body),
            &mesh,
            f,
            OrdinalWidth::I32,
        )
        .unwrap();
        assert_eq!(
            module.value_ty(ordinal),
            &TensorType::scalar(ElemType::I32)
        );
    }

    #[test]
    fn widens_to_i64_on_request() {
        let mut module = Module::new();
        let (f, body) = func_with_device_id(&mut module);
        let mesh = mesh_with_local_ids(vec![0, 1], 2);
        let ordinal = device_ordinal(
            &mut module,
            InsertPoint::block_start(body),
            &mesh,
            f,
            OrdinalWidth::I64,
        )
        .unwrap();
        assert_eq!(
            module.value_ty(ordinal),
            &TensorType::scalar(ElemType::I64)
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        // Resolving twice for the same mesh and device id input must yield
        // structurally identical computations.
        let mut module = Module::new();
        let (f, body) = func_with_device_id(&mut module);
        let mesh = mesh_with_local_ids(vec![0, 1, 2, 3], 4);

        device_ordinal(
            &mut module,
            InsertPoint::block_start(body),
            &mesh,
            f,
            OrdinalWidth::I32,
        )
        .unwrap();
        let first = module.walk(body);
        let end = InsertPoint {
            block: body,
            index: first.len(),
        };
        device_ordinal(&mut module, end, &mesh, f, OrdinalWidth::I32).unwrap();
        let all = module.walk(body);
        let second = &all[first.len()..];

        assert_eq!(
            print_ops(&module, &first),
            print_ops(&module, second),
            "two resolutions of the same ordinal should print identically"
        );
    }

    #[test]
    fn missing_device_id_is_invalid_argument() {
        let mut module = Module::new();
        let f = module.insert_func("no_device_id", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mesh = mesh_with_local_ids(vec![0], 1);
        let err = device_ordinal(
            &mut module,
            InsertPoint::block_start(body),
            &mesh,
            f,
            OrdinalWidth::I32,
        )
        .unwrap_err();
        assert!(
            matches!(err, LowerError::InvalidArgument(_)),
            "expected invalid argument, got: {err:?}"
        );
    }
}
