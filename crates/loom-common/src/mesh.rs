//! Device meshes: the ordered device sets a tensor program is distributed over.
//!
//! A mesh is immutable once constructed. It records the total device count,
//! the subset of devices addressable from the current compilation unit (the
//! *local* devices, identified both by mesh-relative id and by name string),
//! and the backend the devices belong to.

use std::fmt;

use serde::Serialize;

/// The backend a mesh's devices execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    /// Plain host execution.
    Cpu,
    /// Accelerator-resident execution with a compiled program identity.
    Tpu,
    /// Discrete accelerator without a host-side program placeholder.
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Tpu => write!(f, "TPU"),
            Self::Gpu => write!(f, "GPU"),
        }
    }
}

/// A named mesh dimension, e.g. `x=2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeshDim {
    pub name: String,
    pub size: usize,
}

impl MeshDim {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self { name: name.into(), size }
    }
}

/// An ordered, fixed set of abstract devices.
///
/// Owned by the layout system; the lowering pass only reads it. The local
/// device lists are consistently ordered: `local_device_ids()[i]` is the
/// mesh-relative id of the device named `local_devices()[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mesh {
    name: String,
    device_kind: DeviceKind,
    dims: Vec<MeshDim>,
    num_devices: usize,
    local_device_ids: Vec<usize>,
    local_devices: Vec<String>,
}

impl Mesh {
    /// Create a mesh from its full description.
    ///
    /// # Panics
    ///
    /// Panics if the local id and name lists have different lengths, or if a
    /// local id is out of range -- both indicate a broken layout system, not
    /// a user error.
    pub fn new(
        name: impl Into<String>,
        device_kind: DeviceKind,
        dims: Vec<MeshDim>,
        num_devices: usize,
        local_device_ids: Vec<usize>,
        local_devices: Vec<String>,
    ) -> Self {
        assert_eq!(
            local_device_ids.len(),
            local_devices.len(),
            "local device ids and names must pair up"
        );
        assert!(
            local_device_ids.iter().all(|&id| id < num_devices),
            "local device id out of range"
        );
        Self {
            name: name.into(),
            device_kind,
            dims,
            num_devices,
            local_device_ids,
            local_devices,
        }
    }

    /// A single-dimension mesh whose devices are all local, useful as the
    /// common case for hosts and small accelerator slices.
    pub fn with_local_devices(
        name: impl Into<String>,
        device_kind: DeviceKind,
        local_devices: Vec<String>,
    ) -> Self {
        let n = local_devices.len();
        Self::new(
            name,
            device_kind,
            vec![MeshDim::new("x", n)],
            n,
            (0..n).collect(),
            local_devices,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn dims(&self) -> &[MeshDim] {
        &self.dims
    }

    /// Size of the named mesh dimension, if it exists.
    pub fn dim_size(&self, dim_name: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == dim_name).map(|d| d.size)
    }

    /// Total number of devices in the mesh, local and remote.
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Mesh-relative ids of the locally addressable devices.
    pub fn local_device_ids(&self) -> &[usize] {
        &self.local_device_ids
    }

    /// Name strings of the locally addressable devices.
    pub fn local_devices(&self) -> &[String] {
        &self.local_devices
    }

    /// True when the mesh executes on plain hosts.
    pub fn is_host_mesh(&self) -> bool {
        self.device_kind == DeviceKind::Cpu
    }

    /// True when the mesh executes on an accelerator backend.
    pub fn is_accel_mesh(&self) -> bool {
        !self.is_host_mesh()
    }
}

impl fmt::Display for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Canonical form: name|dims|total|kind|local ids|local names.
        write!(f, "{}|", self.name)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", d.name, d.size)?;
        }
        write!(f, "|{}|{}|", self.num_devices, self.device_kind)?;
        for (i, id) in self.local_device_ids.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "|")?;
        for (i, name) in self.local_devices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tpu_pair() -> Mesh {
        Mesh::with_local_devices(
            "tpu_mesh",
            DeviceKind::Tpu,
            vec!["/device:TPU:0".into(), "/device:TPU:1".into()],
        )
    }

    #[test]
    fn local_lists_pair_up() {
        let mesh = tpu_pair();
        assert_eq!(mesh.num_devices(), 2);
        assert_eq!(mesh.local_device_ids(), &[0, 1]);
        assert_eq!(mesh.local_devices()[1], "/device:TPU:1");
    }

    #[test]
    fn backend_classification() {
        assert!(tpu_pair().is_accel_mesh());
        let cpu = Mesh::with_local_devices("cpu", DeviceKind::Cpu, vec!["/device:CPU:0".into()]);
        assert!(cpu.is_host_mesh());
        assert!(!cpu.is_accel_mesh());
    }

    #[test]
    fn dim_size_lookup() {
        let mesh = Mesh::new(
            "grid",
            DeviceKind::Tpu,
            vec![MeshDim::new("x", 2), MeshDim::new("y", 4)],
            8,
            vec![0, 1],
            vec!["/device:TPU:0".into(), "/device:TPU:1".into()],
        );
        assert_eq!(mesh.dim_size("y"), Some(4));
        assert_eq!(mesh.dim_size("z"), None);
    }

    #[test]
    fn display_is_stable() {
        let mesh = tpu_pair();
        assert_eq!(
            mesh.to_string(),
            "tpu_mesh|x=2|2|TPU|0,1|/device:TPU:0,/device:TPU:1"
        );
    }

    #[test]
    #[should_panic(expected = "local device ids and names must pair up")]
    fn mismatched_local_lists_panic() {
        Mesh::new("bad", DeviceKind::Cpu, vec![], 1, vec![0], vec![]);
    }
}
