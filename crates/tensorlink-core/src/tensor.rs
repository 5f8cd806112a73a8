//! Tensor values exchanged with the prediction service.
//!
//! [`encode_binary`] turns a raw payload (an encoded image) into the single-element
//! string tensor a serving signature expects. [`decode_outputs`] unwraps response
//! tensors into [`Tensor`] without interpreting them.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::error::{ClientError, Result};
use crate::proto::tensorflow::{DataType, TensorProto, TensorShapeProto, tensor_shape_proto::Dim};

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// Arbitrary byte strings (also used for encoded images).
    String,
    F32,
    F64,
    I32,
    I64,
    U8,
    Bool,
    /// Any wire type this client does not unpack, by raw enum value.
    Other(i32),
}

impl DType {
    fn from_wire(raw: i32) -> Self {
        match DataType::try_from(raw) {
            Ok(DataType::DtString) => Self::String,
            Ok(DataType::DtFloat) => Self::F32,
            Ok(DataType::DtDouble) => Self::F64,
            Ok(DataType::DtInt32) => Self::I32,
            Ok(DataType::DtInt64) => Self::I64,
            Ok(DataType::DtUint8) => Self::U8,
            Ok(DataType::DtBool) => Self::Bool,
            _ => Self::Other(raw),
        }
    }

    fn to_wire(self) -> i32 {
        match self {
            Self::String => DataType::DtString as i32,
            Self::F32 => DataType::DtFloat as i32,
            Self::F64 => DataType::DtDouble as i32,
            Self::I32 => DataType::DtInt32 as i32,
            Self::I64 => DataType::DtInt64 as i32,
            Self::U8 => DataType::DtUint8 as i32,
            Self::Bool => DataType::DtBool as i32,
            Self::Other(raw) => raw,
        }
    }
}

/// Ordered dimension sizes. `-1` marks a dimension the server left unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub Vec<i64>);

impl Shape {
    pub fn from_slice(d: &[i64]) -> Self {
        Self(d.to_vec())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements, or `None` when a dimension is unknown or the count overflows.
    pub fn numel(&self) -> Option<u64> {
        self.0.iter().try_fold(1u64, |acc, &d| acc.checked_mul(u64::try_from(d).ok()?))
    }

    /// Every dimension is known.
    pub fn is_fully_defined(&self) -> bool {
        self.0.iter().all(|&d| d >= 0)
    }
}

/// Stored values of a tensor.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorValues {
    Strings(Vec<Bytes>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Holds `I32` and `U8` tensors, which share a wire field.
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
    /// Little-endian packed content, element width implied by the dtype.
    Packed(Bytes),
    Empty,
}

impl TensorValues {
    /// Number of stored values; `None` for packed content.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Strings(v) => Some(v.len()),
            Self::F32(v) => Some(v.len()),
            Self::F64(v) => Some(v.len()),
            Self::I32(v) => Some(v.len()),
            Self::I64(v) => Some(v.len()),
            Self::Bool(v) => Some(v.len()),
            Self::Packed(_) => None,
            Self::Empty => Some(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    fn matches(&self, dtype: DType) -> bool {
        matches!(
            (self, dtype),
            (Self::Packed(_) | Self::Empty, _)
                | (Self::Strings(_), DType::String)
                | (Self::F32(_), DType::F32)
                | (Self::F64(_), DType::F64)
                | (Self::I32(_), DType::I32 | DType::U8)
                | (Self::I64(_), DType::I64)
                | (Self::Bool(_), DType::Bool)
        )
    }
}

/// A typed, shaped value container.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub values: TensorValues,
}

impl Tensor {
    /// Wrap a binary payload as a string tensor of shape `[1]`.
    pub fn from_binary(bytes: impl Into<Bytes>) -> Self {
        Self {
            dtype: DType::String,
            shape: Shape::from_slice(&[1]),
            values: TensorValues::Strings(vec![bytes.into()]),
        }
    }

    /// Check that the values match the dtype and the shape's element count.
    pub fn validate(&self) -> Result<()> {
        if !self.values.matches(self.dtype) {
            return Err(ClientError::InvalidArgument(format!(
                "tensor values do not match dtype {:?}",
                self.dtype
            )));
        }
        let Some(stored) = self.values.len() else {
            return Ok(());
        };
        if !self.shape.is_fully_defined() {
            return Ok(());
        }
        match self.shape.numel() {
            None => {
                return Err(ClientError::InvalidArgument(format!(
                    "shape {:?} element count overflows",
                    self.shape.0
                )));
            }
            Some(expected) if stored as u64 != expected => {
                return Err(ClientError::InvalidArgument(format!(
                    "shape {:?} holds {} elements but {} values are stored",
                    self.shape.0, expected, stored
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    pub fn as_strings(&self) -> Option<&[Bytes]> {
        match &self.values {
            TensorValues::Strings(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.values {
            TensorValues::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_proto(&self) -> TensorProto {
        let mut proto = TensorProto {
            dtype: self.dtype.to_wire(),
            tensor_shape: Some(TensorShapeProto {
                dim: self.shape.0.iter().map(|&size| Dim { size, name: String::new() }).collect(),
                unknown_rank: false,
            }),
            ..Default::default()
        };
        match &self.values {
            TensorValues::Strings(v) => proto.string_val.clone_from(v),
            TensorValues::F32(v) => proto.float_val.clone_from(v),
            TensorValues::F64(v) => proto.double_val.clone_from(v),
            TensorValues::I32(v) => proto.int_val.clone_from(v),
            TensorValues::I64(v) => proto.int64_val.clone_from(v),
            TensorValues::Bool(v) => proto.bool_val.clone_from(v),
            TensorValues::Packed(b) => proto.tensor_content = b.clone(),
            TensorValues::Empty => {}
        }
        proto
    }

    pub fn from_proto(proto: TensorProto) -> Self {
        let dtype = DType::from_wire(proto.dtype);
        let shape = Shape(
            proto.tensor_shape.map(|s| s.dim.into_iter().map(|d| d.size).collect()).unwrap_or_default(),
        );

        let values = if !proto.tensor_content.is_empty() {
            TensorValues::Packed(proto.tensor_content)
        } else {
            match dtype {
                DType::String => TensorValues::Strings(proto.string_val),
                DType::F32 => TensorValues::F32(proto.float_val),
                DType::F64 => TensorValues::F64(proto.double_val),
                DType::I32 | DType::U8 => TensorValues::I32(proto.int_val),
                DType::I64 => TensorValues::I64(proto.int64_val),
                DType::Bool => TensorValues::Bool(proto.bool_val),
                DType::Other(_) => TensorValues::Empty,
            }
        };

        Self { dtype, shape, values }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 8;

        write!(f, "{:?}{:?}", self.dtype, self.shape.0)?;
        match &self.values {
            TensorValues::Strings(v) => {
                let shown: Vec<_> =
                    v.iter().take(PREVIEW).map(|s| String::from_utf8_lossy(s).into_owned()).collect();
                write!(f, " {:?}", shown)?;
            }
            TensorValues::F32(v) => write!(f, " {:?}", &v[..v.len().min(PREVIEW)])?,
            TensorValues::F64(v) => write!(f, " {:?}", &v[..v.len().min(PREVIEW)])?,
            TensorValues::I32(v) => write!(f, " {:?}", &v[..v.len().min(PREVIEW)])?,
            TensorValues::I64(v) => write!(f, " {:?}", &v[..v.len().min(PREVIEW)])?,
            TensorValues::Bool(v) => write!(f, " {:?}", &v[..v.len().min(PREVIEW)])?,
            TensorValues::Packed(b) => write!(f, " <{} packed bytes>", b.len())?,
            TensorValues::Empty => {}
        }
        if self.values.len().is_some_and(|n| n > PREVIEW) {
            write!(f, " ...")?;
        }
        Ok(())
    }
}

/// Encode a binary payload as the input tensor of a prediction call.
pub fn encode_binary(bytes: impl Into<Bytes>) -> Tensor {
    Tensor::from_binary(bytes)
}

/// Unwrap the output map of a prediction response.
pub fn decode_outputs(raw: HashMap<String, TensorProto>) -> HashMap<String, Tensor> {
    raw.into_iter().map(|(name, proto)| (name, Tensor::from_proto(proto))).collect()
}
