//! Tensor layouts: sharding specifications binding tensor dimensions to a mesh.
//!
//! A layout is immutable and owned by the type/shape system. The lowering
//! pass reads two things from it: the owning mesh, and a stable string form
//! that is attached to lowered ops as a placement/compatibility attribute.

use std::fmt;

use serde::Serialize;

use crate::mesh::Mesh;

/// How a single tensor dimension is distributed over the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Sharding {
    /// The dimension is replicated on every device.
    Unsharded,
    /// The dimension is split across the named mesh dimension.
    Dim(String),
}

impl Sharding {
    pub fn dim(name: impl Into<String>) -> Self {
        Self::Dim(name.into())
    }
}

/// A sharding specification for one tensor, bound to a mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    mesh: Mesh,
    sharding: Vec<Sharding>,
}

impl Layout {
    pub fn new(mesh: Mesh, sharding: Vec<Sharding>) -> Self {
        Self { mesh, sharding }
    }

    /// A fully replicated layout of the given tensor rank.
    pub fn replicated(mesh: Mesh, rank: usize) -> Self {
        Self::new(mesh, vec![Sharding::Unsharded; rank])
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn sharding(&self) -> &[Sharding] {
        &self.sharding
    }

    /// Map a global tensor shape to the per-device local shape.
    ///
    /// Each dimension sharded over a mesh dimension is divided by that mesh
    /// dimension's size; replicated dimensions keep their global extent.
    /// Dimensions sharded over an unknown mesh dimension are left untouched,
    /// matching a replicated fallback.
    pub fn local_shape(&self, global: &[i64]) -> Vec<i64> {
        global
            .iter()
            .enumerate()
            .map(|(i, &extent)| match self.sharding.get(i) {
                Some(Sharding::Dim(name)) => match self.mesh.dim_size(name) {
                    Some(size) if size > 0 => extent / size as i64,
                    _ => extent,
                },
                _ => extent,
            })
            .collect()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sharding_specs:")?;
        for spec in &self.sharding {
            match spec {
                Sharding::Unsharded => write!(f, "unsharded,")?,
                Sharding::Dim(name) => write!(f, "{name},")?,
            }
        }
        write!(f, " mesh:{}", self.mesh)
    }
}
