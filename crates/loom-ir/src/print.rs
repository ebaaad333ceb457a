//! Deterministic text form of the IR.
//!
//! Used by tests to compare computations structurally: two op sequences that
//! lower the same way print identically, regardless of the arena ids they
//! happen to occupy. Erased ops never appear.

use rustc_hash::FxHashMap;

use crate::module::{FuncId, Module, OpId, ValueDef, ValueId, Visibility};
use crate::ops::OpKind;
use crate::types::ConstData;

/// Print every function in the module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for func in module.func_ids() {
        out.push_str(&print_func(module, func));
        out.push('\n');
    }
    out
}

/// Print one function with its body.
pub fn print_func(module: &Module, func: FuncId) -> String {
    let data = module.func(func);
    let mut printer = Printer::new(module);
    let mut out = format!("func @{}(", data.name);
    for (i, ty) in data.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("%arg{i}: {ty}"));
        let mut attrs: Vec<_> = data.arg_attrs[i].iter().collect();
        attrs.sort();
        for (key, value) in attrs {
            out.push_str(&format!(" {{{key} = \"{value}\"}}"));
        }
    }
    out.push(')');
    if !data.results.is_empty() {
        let tys: Vec<String> = data.results.iter().map(|t| t.to_string()).collect();
        out.push_str(&format!(" -> ({})", tys.join(", ")));
    }
    if data.visibility == Visibility::Private {
        out.push_str(" private");
    }
    out.push_str(" {\n");
    for &op in &module.block(data.body).ops {
        printer.print_op(op, 2, &mut out);
    }
    out.push_str("}\n");
    out
}

/// Print a flat op sequence with local value numbering.
pub fn print_ops(module: &Module, ops: &[OpId]) -> String {
    let mut printer = Printer::new(module);
    let mut out = String::new();
    for &op in ops {
        printer.print_op(op, 0, &mut out);
    }
    out
}

struct Printer<'m> {
    module: &'m Module,
    names: FxHashMap<ValueId, String>,
    next: usize,
}

impl<'m> Printer<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            names: FxHashMap::default(),
            next: 0,
        }
    }

    fn value_name(&mut self, value: ValueId) -> String {
        if let Some(name) = self.names.get(&value) {
            return name.clone();
        }
        let name = match self.module.value(value).def {
            ValueDef::BlockArg(_, i) => format!("%arg{i}"),
            ValueDef::OpResult(..) => {
                let n = format!("%{}", self.next);
                self.next += 1;
                n
            }
        };
        self.names.insert(value, name.clone());
        name
    }

    fn print_op(&mut self, op: OpId, indent: usize, out: &mut String) {
        let data = self.module.op(op);
        if data.erased {
            return;
        }
        out.push_str(&" ".repeat(indent));

        if !data.results.is_empty() {
            let names: Vec<String> = data.results.iter().map(|&r| self.value_name(r)).collect();
            out.push_str(&names.join(", "));
            out.push_str(" = ");
        }

        out.push_str(data.kind.name());

        let operands: Vec<String> = data.operands.iter().map(|&o| self.value_name(o)).collect();
        out.push_str(&format!("({})", operands.join(", ")));

        if let Some(attrs) = attr_text(&data.kind) {
            out.push_str(&format!(" {{{attrs}}}"));
        }
        if let Some(layout) = &data.layout {
            out.push_str(&format!(" {{layout = \"{layout}\"}}"));
        }

        if !data.results.is_empty() {
            let tys: Vec<String> = data
                .results
                .iter()
                .map(|&r| self.module.value_ty(r).to_string())
                .collect();
            out.push_str(&format!(" : {}", tys.join(", ")));
        }

        if let Some(region) = data.region {
            out.push_str(" {\n");
            for &inner in &self.module.block(region).ops {
                self.print_op(inner, indent + 2, out);
            }
            out.push_str(&" ".repeat(indent));
            out.push('}');
        }
        out.push('\n');
    }
}

fn const_text(data: &ConstData) -> String {
    match data {
        ConstData::I32(v) => format!("{v:?}"),
        ConstData::I64(v) => format!("{v:?}"),
    }
}

fn attr_text(kind: &OpKind) -> Option<String> {
    match kind {
        OpKind::Const { data } => Some(format!("value = {}", const_text(data))),
        OpKind::TensorSend { key, target_layout } => {
            Some(format!("key = \"{key}\", target_layout = \"{target_layout}\""))
        }
        OpKind::TensorRecv { key, layout } => {
            Some(format!("key = \"{key}\", layout = \"{layout}\""))
        }
        OpKind::HostSend {
            key,
            send_device,
            recv_device,
            send_device_incarnation,
            client_terminated,
        } => Some(format!(
            "key = \"{key}\", from = \"{send_device}\", to = \"{recv_device}\", \
             incarnation = {send_device_incarnation}, client_terminated = {client_terminated}"
        )),
        OpKind::HostRecv {
            key,
            send_device,
            recv_device,
            send_device_incarnation,
        } => Some(format!(
            "key = \"{key}\", from = \"{send_device}\", to = \"{recv_device}\", \
             incarnation = {send_device_incarnation}"
        )),
        OpKind::SendFromHost { key }
        | OpKind::SendToHost { key }
        | OpKind::RecvAtHost { key } => Some(format!("key = \"{key}\"")),
        OpKind::RecvFromHost { key, shape } => {
            Some(format!("key = \"{key}\", shape = {shape:?}"))
        }
        OpKind::Case {
            branches,
            is_stateless,
        } => {
            let refs: Vec<String> = branches.iter().map(|b| format!("@{b}")).collect();
            Some(format!(
                "branches = [{}], is_stateless = {is_stateless}",
                refs.join(", ")
            ))
        }
        OpKind::Cluster { mesh } => mesh.as_ref().map(|m| format!("mesh = \"{m}\"")),
        OpKind::Slice | OpKind::Reshape | OpKind::Cast | OpKind::ProgramKey | OpKind::Return => {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::OpBuilder;
    use crate::module::InsertPoint;
    use crate::types::{ElemType, TensorType};

    #[test]
    fn printed_ops_use_local_numbering() {
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
        let table = b.const_i32(vec![0, 1]);
        let table_val = b.out(table);
        let begin = b.reshape(arg, vec![1]);
        let begin_val = b.out(begin);
        let size = b.const_i32(vec![1]);
        let size_val = b.out(size);
        let slice = b.slice(table_val, begin_val, size_val);

        let text = print_ops(&module, &[table, begin, size, slice]);
        assert_eq!(
            text,
            "%0 = const() {value = [0, 1]} : tensor<2xi32>\n\
             %1 = reshape(%arg0) : tensor<1xi32>\n\
             %2 = const() {value = [1]} : tensor<1xi32>\n\
             %3 = slice(%0, %1, %2) : tensor<1xi32>\n"
        );
    }

    #[test]
    fn erased_ops_do_not_print() {
        let mut module = Module::new();
        let f = module.insert_func("f", Visibility::Public, vec![], vec![]);
        let body = module.func(f).body;
        let mut b = OpBuilder::new(&mut module, InsertPoint::block_start(body));
        let c = b.scalar_const_i32(3);
        module.erase_op(c);
        assert_eq!(print_func(&module, f), "func @f() {\n}\n");
    }

    #[test]
    fn func_header_shows_visibility_and_arg_attrs() {
        let mut module = Module::new();
        let f = module.insert_func(
            "helper",
            Visibility::Private,
            vec![TensorType::vector(4, ElemType::F32)],
            vec![],
        );
        module.set_arg_attr(f, 0, "custom_device", "cpu:0".to_string());
        let text = print_func(&module, f);
        assert!(
            text.starts_with("func @helper(%arg0: tensor<4xf32> {custom_device = \"cpu:0\"}) private {"),
            "got: {text}"
        );
    }
}
