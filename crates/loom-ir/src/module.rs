//! The arena-based module graph.
//!
//! A `Module` owns flat arenas of functions, blocks, ops, and values,
//! addressed by index newtypes. Ops are never mutated in place by passes:
//! an abstract op is replaced by redirecting every use of its results to a
//! new op (`replace_all_uses`) and then retiring its identity (`erase_op`).
//! Erased slots are kept so ids stay stable; they are skipped by walks and
//! the printer.
//!
//! The module also owns the symbol-allocation service passes use to insert
//! new private subprograms without name collisions: `reserve_unique_name`
//! hands out a globally fresh symbol, `insert_func` materializes it.
//! Existing unrelated symbols are never mutated or removed.

use rustc_hash::{FxHashMap, FxHashSet};

use loom_common::{Layout, LowerError, Mesh};

use crate::ops::OpKind;
use crate::types::{ElemType, TensorType};

/// Index of a function in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) usize);

/// Index of a block in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

/// Index of an op in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub(crate) usize);

/// Index of an SSA value in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub(crate) usize);

/// Symbol visibility of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// What a block belongs to: a function body or an op's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOwner {
    Func(FuncId),
    Op(OpId),
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    OpResult(OpId, usize),
    BlockArg(BlockId, usize),
}

/// A function: a symbol with one entry block.
#[derive(Debug)]
pub struct FuncData {
    pub name: String,
    pub visibility: Visibility,
    pub params: Vec<TensorType>,
    pub results: Vec<TensorType>,
    pub body: BlockId,
    /// Per-argument string attributes (e.g. custom device placement).
    pub arg_attrs: Vec<FxHashMap<String, String>>,
}

/// A block: ordered ops plus block arguments.
#[derive(Debug)]
pub struct BlockData {
    pub args: Vec<ValueId>,
    pub ops: Vec<OpId>,
    pub owner: BlockOwner,
}

/// An op: kind, operands, results, optional region and layout attribute.
#[derive(Debug)]
pub struct OpData {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub block: BlockId,
    pub region: Option<BlockId>,
    pub layout: Option<Layout>,
    pub erased: bool,
}

/// An SSA value: its type and definition site.
#[derive(Debug)]
pub struct ValueData {
    pub ty: TensorType,
    pub def: ValueDef,
}

/// A position within a block at which new ops are inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub block: BlockId,
    pub index: usize,
}

impl InsertPoint {
    pub fn block_start(block: BlockId) -> Self {
        Self { block, index: 0 }
    }
}

/// The compilation unit: arenas plus the symbol table.
#[derive(Debug, Default)]
pub struct Module {
    funcs: Vec<FuncData>,
    blocks: Vec<BlockData>,
    ops: Vec<OpData>,
    values: Vec<ValueData>,
    symbols: FxHashMap<String, FuncId>,
    reserved_names: FxHashSet<String>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Symbol allocation service ────────────────────────────────────

    /// Reserve a globally fresh symbol name derived from `base`.
    ///
    /// The returned name is guaranteed not to collide with any existing
    /// function or any other reservation until it is consumed by
    /// `insert_func`.
    pub fn reserve_unique_name(&mut self, base: &str) -> String {
        if !self.symbols.contains_key(base) && !self.reserved_names.contains(base) {
            self.reserved_names.insert(base.to_string());
            return base.to_string();
        }
        let mut i = 1usize;
        loop {
            let candidate = format!("{base}_{i}");
            if !self.symbols.contains_key(&candidate) && !self.reserved_names.contains(&candidate) {
                self.reserved_names.insert(candidate.clone());
                return candidate;
            }
            i += 1;
        }
    }

    /// Insert a new function into the symbol table, creating its entry
    /// block with one argument per parameter.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate symbol name; callers allocate names through
    /// `reserve_unique_name` when collisions are possible.
    pub fn insert_func(
        &mut self,
        name: impl Into<String>,
        visibility: Visibility,
        params: Vec<TensorType>,
        results: Vec<TensorType>,
    ) -> FuncId {
        let name = name.into();
        assert!(
            !self.symbols.contains_key(&name),
            "duplicate function symbol `{name}`"
        );
        self.reserved_names.remove(&name);

        let func_id = FuncId(self.funcs.len());
        let body = self.new_block(BlockOwner::Func(func_id));
        for (i, ty) in params.iter().enumerate() {
            let arg = self.new_value(ty.clone(), ValueDef::BlockArg(body, i));
            self.blocks[body.0].args.push(arg);
        }
        let arg_attrs = vec![FxHashMap::default(); params.len()];
        self.funcs.push(FuncData {
            name: name.clone(),
            visibility,
            params,
            results,
            body,
            arg_attrs,
        });
        self.symbols.insert(name, func_id);
        func_id
    }

    /// Look up a function by symbol name.
    pub fn lookup_func(&self, name: &str) -> Option<FuncId> {
        self.symbols.get(name).copied()
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.funcs.len()).map(FuncId)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn func(&self, id: FuncId) -> &FuncData {
        &self.funcs[id.0]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.0]
    }

    pub fn op(&self, id: OpId) -> &OpData {
        &self.ops[id.0]
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0]
    }

    pub fn value_ty(&self, id: ValueId) -> &TensorType {
        &self.values[id.0].ty
    }

    /// The i-th result value of an op.
    pub fn result(&self, op: OpId, i: usize) -> ValueId {
        self.ops[op.0].results[i]
    }

    /// The i-th entry-block argument of a function.
    pub fn func_arg(&self, func: FuncId, i: usize) -> ValueId {
        let body = self.funcs[func.0].body;
        self.blocks[body.0].args[i]
    }

    /// Set a string attribute on a function argument.
    pub fn set_arg_attr(&mut self, func: FuncId, arg: usize, key: &str, value: String) {
        self.funcs[func.0].arg_attrs[arg].insert(key.to_string(), value);
    }

    pub fn arg_attr(&self, func: FuncId, arg: usize, key: &str) -> Option<&str> {
        self.funcs[func.0].arg_attrs[arg].get(key).map(String::as_str)
    }

    /// Attach a layout attribute to an op.
    pub fn set_layout(&mut self, op: OpId, layout: Layout) {
        self.ops[op.0].layout = Some(layout);
    }

    // ── Construction ─────────────────────────────────────────────────

    fn new_block(&mut self, owner: BlockOwner) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BlockData {
            args: vec![],
            ops: vec![],
            owner,
        });
        id
    }

    fn new_value(&mut self, ty: TensorType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(ValueData { ty, def });
        id
    }

    /// Create an op at the given insertion point. Result values are created
    /// from `result_tys` in order.
    pub fn create_op(
        &mut self,
        point: InsertPoint,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<TensorType>,
    ) -> OpId {
        let op_id = OpId(self.ops.len());
        let results = result_tys
            .into_iter()
            .enumerate()
            .map(|(i, ty)| self.new_value(ty, ValueDef::OpResult(op_id, i)))
            .collect();
        self.ops.push(OpData {
            kind,
            operands,
            results,
            block: point.block,
            region: None,
            layout: None,
            erased: false,
        });
        let block = &mut self.blocks[point.block.0];
        let index = point.index.min(block.ops.len());
        block.ops.insert(index, op_id);
        op_id
    }

    /// Create a cluster op with an empty body region.
    pub fn create_cluster(&mut self, point: InsertPoint, mesh: Option<Mesh>) -> OpId {
        let op = self.create_op(point, OpKind::Cluster { mesh }, vec![], vec![]);
        let body = self.new_block(BlockOwner::Op(op));
        self.ops[op.0].region = Some(body);
        op
    }

    /// The body block of a cluster op.
    ///
    /// # Panics
    ///
    /// Panics if the op is not a cluster.
    pub fn cluster_body(&self, cluster: OpId) -> BlockId {
        let data = self.op(cluster);
        assert!(
            matches!(data.kind, OpKind::Cluster { .. }),
            "expected a cluster op"
        );
        data.region.expect("cluster op must carry a region")
    }

    /// The mesh attribute of a cluster op, if specified.
    pub fn cluster_mesh(&self, cluster: OpId) -> Option<&Mesh> {
        match &self.op(cluster).kind {
            OpKind::Cluster { mesh } => mesh.as_ref(),
            _ => None,
        }
    }

    /// The insertion point immediately before an existing op.
    pub fn insert_point_before(&self, op: OpId) -> InsertPoint {
        let block = self.op(op).block;
        let index = self
            .block(block)
            .ops
            .iter()
            .position(|&o| o == op)
            .expect("op not found in its own block");
        InsertPoint { block, index }
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// The nearest enclosing cluster op, if any.
    pub fn parent_cluster(&self, op: OpId) -> Option<OpId> {
        let mut block = self.op(op).block;
        loop {
            match self.block(block).owner {
                BlockOwner::Op(owner) => {
                    if matches!(self.op(owner).kind, OpKind::Cluster { .. }) {
                        return Some(owner);
                    }
                    block = self.op(owner).block;
                }
                BlockOwner::Func(_) => return None,
            }
        }
    }

    /// The function an op ultimately lives in.
    pub fn parent_func(&self, op: OpId) -> FuncId {
        let mut block = self.op(op).block;
        loop {
            match self.block(block).owner {
                BlockOwner::Op(owner) => block = self.op(owner).block,
                BlockOwner::Func(func) => return func,
            }
        }
    }

    /// All live ops in a block, pre-order, descending into op regions.
    pub fn walk(&self, block: BlockId) -> Vec<OpId> {
        let mut out = Vec::new();
        self.walk_into(block, &mut out);
        out
    }

    fn walk_into(&self, block: BlockId, out: &mut Vec<OpId>) {
        for &op in &self.blocks[block.0].ops {
            if self.ops[op.0].erased {
                continue;
            }
            out.push(op);
            if let Some(region) = self.ops[op.0].region {
                self.walk_into(region, out);
            }
        }
    }

    /// The runtime "current device id" accessor: the enclosing function's
    /// leading scalar-i32 argument.
    pub fn device_id(&self, func: FuncId) -> Result<ValueId, LowerError> {
        let data = self.func(func);
        let block = self.block(data.body);
        match block.args.first() {
            Some(&arg) if *self.value_ty(arg) == TensorType::scalar(ElemType::I32) => Ok(arg),
            _ => Err(LowerError::invalid_argument(format!(
                "function `{}` does not provide a device id argument",
                data.name
            ))),
        }
    }

    // ── Erase-and-replace ────────────────────────────────────────────

    /// All live ops that use `value` as an operand.
    pub fn uses_of(&self, value: ValueId) -> Vec<OpId> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.erased && op.operands.contains(&value))
            .map(|(i, _)| OpId(i))
            .collect()
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for op in &mut self.ops {
            if op.erased {
                continue;
            }
            for operand in &mut op.operands {
                if *operand == old {
                    *operand = new;
                }
            }
        }
    }

    /// Retire an op: unlink it from its block and mark its identity dead.
    ///
    /// # Panics
    ///
    /// Panics if any of the op's results still has uses -- callers must
    /// redirect uses first. This is a pass-precondition violation, not a
    /// recoverable error.
    pub fn erase_op(&mut self, op: OpId) {
        assert!(!self.ops[op.0].erased, "op erased twice");
        let results = self.ops[op.0].results.clone();
        for result in results {
            assert!(
                self.uses_of(result).is_empty(),
                "erasing an op whose results still have uses"
            );
        }
        let block = self.ops[op.0].block;
        self.blocks[block.0].ops.retain(|&o| o != op);
        self.ops[op.0].erased = true;
    }

    /// True once an op's identity has been retired.
    pub fn is_erased(&self, op: OpId) -> bool {
        self.ops[op.0].erased
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConstData;
    use loom_common::DeviceKind;

    fn module_with_main() -> (Module, FuncId) {
        let mut module = Module::new();
        let main = module.insert_func(
            "main",
            Visibility::Public,
            vec![TensorType::scalar(ElemType::I32)],
            vec![],
        );
        (module, main)
    }

    #[test]
    fn unique_names_never_collide() {
        let (mut module, _) = module_with_main();
        let a = module.reserve_unique_name("main");
        let b = module.reserve_unique_name("main");
        assert_ne!(a, "main");
        assert_ne!(a, b);
        module.insert_func(a.clone(), Visibility::Private, vec![], vec![]);
        assert!(module.lookup_func(&a).is_some());
    }

    #[test]
    #[should_panic(expected = "duplicate function symbol")]
    fn duplicate_symbol_panics() {
        let (mut module, _) = module_with_main();
        module.insert_func("main", Visibility::Public, vec![], vec![]);
    }

    #[test]
    fn device_id_is_leading_scalar_i32_arg() {
        let (module, main) = module_with_main();
        let id = module.device_id(main).unwrap();
        assert_eq!(module.func_arg(main, 0), id);
    }

    #[test]
    fn device_id_missing_is_invalid_argument() {
        let mut module = Module::new();
        let f = module.insert_func("no_args", Visibility::Public, vec![], vec![]);
        let err = module.device_id(f).unwrap_err();
        assert!(err.to_string().contains("device id argument"), "got: {err}");
    }

    #[test]
    fn parent_cluster_and_func_navigation() {
        let (mut module, main) = module_with_main();
        let body = module.func(main).body;
        let cluster = module.create_cluster(InsertPoint::block_start(body), None);
        let inner = module.create_op(
            InsertPoint::block_start(module.cluster_body(cluster)),
            OpKind::ProgramKey,
            vec![],
            vec![TensorType::vector(3, ElemType::Str)],
        );
        assert_eq!(module.parent_cluster(inner), Some(cluster));
        assert_eq!(module.parent_func(inner), main);
        assert_eq!(module.parent_cluster(cluster), None);
    }

    #[test]
    fn walk_descends_into_cluster_regions() {
        let (mut module, main) = module_with_main();
        let body = module.func(main).body;
        let cluster = module.create_cluster(InsertPoint::block_start(body), None);
        let inner = module.create_op(
            InsertPoint::block_start(module.cluster_body(cluster)),
            OpKind::Const {
                data: ConstData::I32(vec![0]),
            },
            vec![],
            vec![TensorType::vector(1, ElemType::I32)],
        );
        assert_eq!(module.walk(body), vec![cluster, inner]);
    }

    #[test]
    fn erase_and_replace_repoints_edges() {
        let (mut module, main) = module_with_main();
        let body = module.func(main).body;
        let old = module.create_op(
            InsertPoint::block_start(body),
            OpKind::Const {
                data: ConstData::I32(vec![1]),
            },
            vec![],
            vec![TensorType::vector(1, ElemType::I32)],
        );
        let old_val = module.result(old, 0);
        let user = module.create_op(
            InsertPoint { block: body, index: 1 },
            OpKind::Reshape,
            vec![old_val],
            vec![TensorType::scalar(ElemType::I32)],
        );
        let new = module.create_op(
            InsertPoint { block: body, index: 1 },
            OpKind::Const {
                data: ConstData::I32(vec![2]),
            },
            vec![],
            vec![TensorType::vector(1, ElemType::I32)],
        );
        let new_val = module.result(new, 0);

        assert_eq!(module.uses_of(old_val), vec![user]);
        module.replace_all_uses(old_val, new_val);
        assert!(module.uses_of(old_val).is_empty());
        module.erase_op(old);
        assert!(module.is_erased(old));
        assert!(!module.walk(body).contains(&old));
        assert_eq!(module.op(user).operands, vec![new_val]);
    }

    #[test]
    #[should_panic(expected = "results still have uses")]
    fn erasing_a_used_op_panics() {
        let (mut module, main) = module_with_main();
        let body = module.func(main).body;
        let producer = module.create_op(
            InsertPoint::block_start(body),
            OpKind::Const {
                data: ConstData::I32(vec![1]),
            },
            vec![],
            vec![TensorType::vector(1, ElemType::I32)],
        );
        let val = module.result(producer, 0);
        module.create_op(
            InsertPoint { block: body, index: 1 },
            OpKind::Reshape,
            vec![val],
            vec![TensorType::scalar(ElemType::I32)],
        );
        module.erase_op(producer);
    }

    #[test]
    fn cluster_mesh_attribute_round_trips() {
        let (mut module, main) = module_with_main();
        let body = module.func(main).body;
        let mesh = Mesh::with_local_devices("m", DeviceKind::Tpu, vec!["/device:TPU:0".into()]);
        let cluster = module.create_cluster(InsertPoint::block_start(body), Some(mesh.clone()));
        assert_eq!(module.cluster_mesh(cluster), Some(&mesh));
    }
}
