//! Type-boundary adapter for transfer primitives.
//!
//! The host transfer primitives cannot carry 32-bit integer elements. Values
//! with i32 elements are widened to i64 immediately before the send, and the
//! receive declares the widened type as its native result type; a matching
//! narrowing cast is applied to the receive's result afterwards. This shim
//! changes representation width in transit only, never values.

use loom_ir::{ElemType, OpBuilder, OpId, TensorType, ValueId};

/// True when the element type is not natively carriable by the host
/// transfer primitives.
pub fn needs_widening(ty: &TensorType) -> bool {
    ty.elem.is_i32()
}

/// The in-transit type for a value that needs widening.
pub fn widened(ty: &TensorType) -> TensorType {
    ty.with_elem(ElemType::I64)
}

/// Cast a value to the carriable 64-bit width before a send.
pub fn widen(b: &mut OpBuilder, value: ValueId) -> OpId {
    b.cast(value, ElemType::I64)
}

/// Cast a received value back to 32 bits after the transfer.
pub fn narrow(b: &mut OpBuilder, value: ValueId) -> OpId {
    b.cast(value, ElemType::I32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{ConstData, InsertPoint, Module, OpKind, Visibility};

    #[test]
    fn only_i32_needs_widening() {
        assert!(needs_widening(&TensorType::vector(4, ElemType::I32)));
        assert!(!needs_widening(&TensorType::vector(4, ElemType::I64)));
        assert!(!needs_widening(&TensorType::vector(4, ElemType::F32)));
    }

    #[test]
    fn widened_type_keeps_shape() {
        let ty = TensorType::new(vec![2, 8], ElemType::I32);
        assert_eq!(widened(&ty), TensorType::new(vec![2, 8], ElemType::I64));
    }

    #[test]
    fn widen_then_narrow_restores_the_declared_type() {
        let mut module = Module::new();
        let f = module.insert_func(
            "f",
            Visibility::Public,
            vec![TensorType::vector(4, ElemType::I32)],
            vec![],
        );
        let body = module.func(f).body;
        let arg = module.func_arg(f, 0);
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let wide_op = widen(&mut b, arg);
        let wide = b.out(wide_op);
        let narrow_op = narrow(&mut b, wide);
        let narrow_val = b.out(narrow_op);
        assert_eq!(
            module.value_ty(wide),
            &TensorType::vector(4, ElemType::I64)
        );
        assert_eq!(module.value_ty(narrow_val), module.value_ty(arg));
    }

    #[test]
    fn round_trip_preserves_values_bit_for_bit() {
        // The adapter only changes representation width; the payload must
        // survive widen + narrow exactly, including negatives and extremes.
        let payload = ConstData::I32(vec![-7, 0, 1, i32::MIN, i32::MAX]);
        let in_transit = payload.cast(ElemType::I64);
        assert_eq!(in_transit.cast(ElemType::I32), payload);
    }

    #[test]
    fn casts_are_emitted_as_cast_ops() {
        let mut module = Module::new();
        let f = module.insert_func(
            "f",
            Visibility::Public,
            vec![TensorType::scalar(ElemType::I32)],
            vec![],
        );
        let body = module.func(f).body;
        let arg = module.func_arg(f, 0);
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        widen(&mut b, arg);
        let ops = module.walk(body);
        assert_eq!(ops.len(), 1);
        assert!(matches!(module.op(ops[0]).kind, OpKind::Cast));
    }
}
