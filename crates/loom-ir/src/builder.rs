//! Insertion-point op builder.
//!
//! Thin typed wrappers over `Module::create_op`, one per op kind the
//! lowering pass emits. The builder tracks an insertion point and advances
//! it after every emitted op, so a sequence of calls lays ops down in order.

use loom_common::Layout;

use crate::module::{InsertPoint, Module, OpId, ValueId};
use crate::ops::OpKind;
use crate::types::{ConstData, ElemType, TensorType};

/// Builds ops at a tracked insertion point.
pub struct OpBuilder<'m> {
    module: &'m mut Module,
    point: InsertPoint,
}

impl<'m> OpBuilder<'m> {
    pub fn new(module: &'m mut Module, point: InsertPoint) -> Self {
        Self { module, point }
    }

    /// Position the builder immediately before an existing op.
    pub fn before(module: &'m mut Module, op: OpId) -> Self {
        let point = module.insert_point_before(op);
        Self::new(module, point)
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    pub fn point(&self) -> InsertPoint {
        self.point
    }

    /// The first result value of an op.
    pub fn out(&self, op: OpId) -> ValueId {
        self.module.result(op, 0)
    }

    fn emit(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<TensorType>,
    ) -> OpId {
        let op = self.module.create_op(self.point, kind, operands, result_tys);
        self.point.index += 1;
        op
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// A rank-1 i32 constant.
    pub fn const_i32(&mut self, values: Vec<i32>) -> OpId {
        let len = values.len() as i64;
        self.emit(
            OpKind::Const {
                data: ConstData::I32(values),
            },
            vec![],
            vec![TensorType::vector(len, ElemType::I32)],
        )
    }

    /// A scalar i32 constant.
    pub fn scalar_const_i32(&mut self, value: i32) -> OpId {
        self.emit(
            OpKind::Const {
                data: ConstData::I32(vec![value]),
            },
            vec![],
            vec![TensorType::scalar(ElemType::I32)],
        )
    }

    /// A 1-element slice of a rank-1 input at a runtime offset.
    pub fn slice(&mut self, input: ValueId, begin: ValueId, size: ValueId) -> OpId {
        let elem = self.module.value_ty(input).elem;
        self.emit(
            OpKind::Slice,
            vec![input, begin, size],
            vec![TensorType::vector(1, elem)],
        )
    }

    /// Reshape a value to a new shape with the same element type.
    pub fn reshape(&mut self, input: ValueId, shape: Vec<i64>) -> OpId {
        let elem = self.module.value_ty(input).elem;
        self.emit(
            OpKind::Reshape,
            vec![input],
            vec![TensorType::new(shape, elem)],
        )
    }

    /// Cast a value to another element type, keeping the shape.
    pub fn cast(&mut self, input: ValueId, elem: ElemType) -> OpId {
        let ty = self.module.value_ty(input).with_elem(elem);
        self.emit(OpKind::Cast, vec![input], vec![ty])
    }

    // ── Abstract transfer ops ────────────────────────────────────────

    pub fn tensor_send(&mut self, input: ValueId, key: impl Into<String>, target_layout: Layout) -> OpId {
        self.emit(
            OpKind::TensorSend {
                key: key.into(),
                target_layout,
            },
            vec![input],
            vec![],
        )
    }

    pub fn tensor_recv(&mut self, ty: TensorType, key: impl Into<String>, layout: Layout) -> OpId {
        self.emit(
            OpKind::TensorRecv {
                key: key.into(),
                layout,
            },
            vec![],
            vec![ty],
        )
    }

    // ── Concrete transfer primitives ─────────────────────────────────

    pub fn host_send(
        &mut self,
        input: ValueId,
        key: impl Into<String>,
        send_device: impl Into<String>,
        recv_device: impl Into<String>,
        client_terminated: bool,
    ) -> OpId {
        self.emit(
            OpKind::HostSend {
                key: key.into(),
                send_device: send_device.into(),
                recv_device: recv_device.into(),
                send_device_incarnation: 0,
                client_terminated,
            },
            vec![input],
            vec![],
        )
    }

    pub fn host_recv(
        &mut self,
        ty: TensorType,
        key: impl Into<String>,
        send_device: impl Into<String>,
        recv_device: impl Into<String>,
    ) -> OpId {
        self.emit(
            OpKind::HostRecv {
                key: key.into(),
                send_device: send_device.into(),
                recv_device: recv_device.into(),
                send_device_incarnation: 0,
            },
            vec![],
            vec![ty],
        )
    }

    pub fn send_from_host(
        &mut self,
        input: ValueId,
        program_key: ValueId,
        device_ordinal: ValueId,
        key: impl Into<String>,
    ) -> OpId {
        self.emit(
            OpKind::SendFromHost { key: key.into() },
            vec![input, program_key, device_ordinal],
            vec![],
        )
    }

    pub fn send_to_host(&mut self, input: ValueId, key: impl Into<String>) -> OpId {
        self.emit(OpKind::SendToHost { key: key.into() }, vec![input], vec![])
    }

    pub fn recv_at_host(
        &mut self,
        ty: TensorType,
        program_key: ValueId,
        device_ordinal: ValueId,
        key: impl Into<String>,
    ) -> OpId {
        self.emit(
            OpKind::RecvAtHost { key: key.into() },
            vec![program_key, device_ordinal],
            vec![ty],
        )
    }

    pub fn recv_from_host(&mut self, ty: TensorType, key: impl Into<String>) -> OpId {
        let shape = ty.shape.clone();
        self.emit(
            OpKind::RecvFromHost {
                key: key.into(),
                shape,
            },
            vec![],
            vec![ty],
        )
    }

    /// The compilation-key placeholder: a 3-element string tensor.
    pub fn program_key(&mut self) -> OpId {
        self.emit(
            OpKind::ProgramKey,
            vec![],
            vec![TensorType::vector(3, ElemType::Str)],
        )
    }

    /// Multi-way dispatch over the given branch symbols.
    pub fn case(
        &mut self,
        branch_index: ValueId,
        args: Vec<ValueId>,
        branches: Vec<String>,
        result_tys: Vec<TensorType>,
        is_stateless: bool,
    ) -> OpId {
        let mut operands = vec![branch_index];
        operands.extend(args);
        self.emit(
            OpKind::Case {
                branches,
                is_stateless,
            },
            operands,
            result_tys,
        )
    }

    /// Subprogram terminator.
    pub fn ret(&mut self, values: Vec<ValueId>) -> OpId {
        self.emit(OpKind::Return, values, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Visibility;

    #[test]
    fn builder_lays_ops_down_in_order() {
        let mut module = Module::new();
        let f = module.insert_func("f", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let c0 = b.const_i32(vec![0, 1]);
        let c1 = b.scalar_const_i32(7);
        let val = b.out(c0);
        let r = b.reshape(val, vec![2, 1]);
        assert_eq!(module.walk(body), vec![c0, c1, r]);
        assert_eq!(
            module.value_ty(module.result(r, 0)),
            &TensorType::new(vec![2, 1], ElemType::I32)
        );
    }

    #[test]
    fn cast_keeps_shape() {
        let mut module = Module::new();
        let f = module.insert_func("f", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let c = b.const_i32(vec![1, 2, 3]);
        let v = b.out(c);
        let cast = b.cast(v, ElemType::I64);
        let out = b.out(cast);
        assert_eq!(
            module.value_ty(out),
            &TensorType::vector(3, ElemType::I64)
        );
    }

    #[test]
    fn program_key_is_three_element_string_tensor() {
        let mut module = Module::new();
        let f = module.insert_func("f", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let key = b.program_key();
        let out = b.out(key);
        assert_eq!(
            module.value_ty(out),
            &TensorType::vector(3, ElemType::Str)
        );
    }

    #[test]
    fn before_positions_at_existing_op() {
        let mut module = Module::new();
        let f = module.insert_func("f", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let late = b.scalar_const_i32(1);
        let mut b = OpBuilder::before(&mut module, late);
        let early = b.scalar_const_i32(0);
        assert_eq!(module.walk(body), vec![early, late]);
    }
}
