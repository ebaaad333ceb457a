//! Compilation-key provider.
//!
//! Several accelerator-side transfer primitives need a handle identifying
//! the compiled program instance they talk to. At lowering time that handle
//! does not exist yet, so a placeholder op is planted in the enclosing
//! cluster and filled in by a downstream compilation step. The provider is
//! idempotent per cluster: at most one placeholder is ever created, however
//! many transfers in the cluster need it.

use loom_common::LowerError;
use loom_ir::{InsertPoint, Module, OpBuilder, OpId, OpKind, ValueId};

/// Return the cluster's compilation-key value, creating the placeholder at
/// the start of the cluster body if it does not exist yet.
///
/// Fails with *invalid argument* when `op` has no enclosing cluster.
pub fn get_or_create_program_key(module: &mut Module, op: OpId) -> Result<ValueId, LowerError> {
    let cluster = module.parent_cluster(op).ok_or_else(|| {
        LowerError::invalid_argument(format!(
            "{} op is not inside a cluster",
            module.op(op).kind.name()
        ))
    })?;
    let body = module.cluster_body(cluster);

    for inner in module.walk(body) {
        if matches!(module.op(inner).kind, OpKind::ProgramKey) {
            return Ok(module.result(inner, 0));
        }
    }

    let mut b = OpBuilder::new(module, InsertPoint::block_start(body));
    let placeholder = b.program_key();
    Ok(b.out(placeholder))
}
