//! Tensor element and shape types.

use std::fmt;

use serde::Serialize;

/// Element type of a tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElemType {
    I32,
    I64,
    F32,
    F64,
    Bool,
    Str,
}

impl ElemType {
    /// True for the 32-bit integer element type, which the host transfer
    /// primitives cannot carry natively.
    pub fn is_i32(self) -> bool {
        self == Self::I32
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Bool => write!(f, "i1"),
            Self::Str => write!(f, "string"),
        }
    }
}

/// A ranked tensor type. A scalar is the rank-0 case (empty shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorType {
    pub shape: Vec<i64>,
    pub elem: ElemType,
}

impl TensorType {
    pub fn new(shape: Vec<i64>, elem: ElemType) -> Self {
        Self { shape, elem }
    }

    /// A rank-0 tensor.
    pub fn scalar(elem: ElemType) -> Self {
        Self::new(vec![], elem)
    }

    /// A rank-1 tensor of the given length.
    pub fn vector(len: i64, elem: ElemType) -> Self {
        Self::new(vec![len], elem)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// The same shape with a different element type.
    pub fn with_elem(&self, elem: ElemType) -> Self {
        Self::new(self.shape.clone(), elem)
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<")?;
        for dim in &self.shape {
            write!(f, "{dim}x")?;
        }
        write!(f, "{}>", self.elem)
    }
}

/// Raw constant payloads for `Const` ops.
///
/// Only the integer payloads the lowering pass actually materializes are
/// represented: ordinal lookup tables and slice begin/size vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstData {
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl ConstData {
    pub fn elem_type(&self) -> ElemType {
        match self {
            Self::I32(_) => ElemType::I32,
            Self::I64(_) => ElemType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert the payload to another integer width.
    ///
    /// Widening i32 -> i64 is exact; narrowing i64 -> i32 truncates, which is
    /// value-preserving for payloads that originated as i32.
    pub fn cast(&self, elem: ElemType) -> ConstData {
        match (self, elem) {
            (Self::I32(v), ElemType::I64) => Self::I64(v.iter().map(|&x| i64::from(x)).collect()),
            (Self::I64(v), ElemType::I32) => Self::I32(v.iter().map(|&x| x as i32).collect()),
            (Self::I32(v), ElemType::I32) => Self::I32(v.clone()),
            (Self::I64(v), ElemType::I64) => Self::I64(v.clone()),
            (data, elem) => panic!("unsupported constant cast from {:?} to {elem}", data.elem_type()),
        }
    }
}
