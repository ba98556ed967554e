//! Host-resident constant values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dtype::DataType;
use crate::error::{IdentityError, IdentityResult};

/// Maximum number of elements rendered by [`Literal`]'s `Display` impl.
const DISPLAY_LIMIT: usize = 8;

/// A fully-defined constant tensor held in host memory.
///
/// Literals compare and hash by value: element type, dimensions and the raw
/// little-endian bytes. Floating-point values are compared bitwise, so `0.0`
/// and `-0.0` are distinct constants.
///
/// Deserialization goes through [`Literal::new`], so a literal whose data
/// does not match its shape never exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLiteral")]
pub struct Literal {
    dtype: DataType,
    dims: Vec<i64>,
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
}

/// Unchecked wire form of a [`Literal`].
#[derive(Deserialize)]
struct RawLiteral {
    dtype: DataType,
    dims: Vec<i64>,
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
}

impl TryFrom<RawLiteral> for Literal {
    type Error = IdentityError;

    fn try_from(raw: RawLiteral) -> IdentityResult<Self> {
        Self::new(raw.dtype, raw.dims, raw.data)
    }
}

impl Literal {
    /// Create a literal from raw little-endian bytes.
    ///
    /// Fails if any dimension is negative or the data length does not match
    /// the element count.
    pub fn new(dtype: DataType, dims: Vec<i64>, data: Vec<u8>) -> IdentityResult<Self> {
        if let Some(&dim) = dims.iter().find(|d| **d < 0) {
            return Err(IdentityError::InvalidLiteralShape { dim });
        }
        let expected = element_count(&dims) * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(IdentityError::MalformedLiteral {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, dims, data })
    }

    /// Scalar `i32` constant.
    pub fn scalar_i32(value: i32) -> Self {
        Self {
            dtype: DataType::I32,
            dims: Vec::new(),
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Scalar `i64` constant.
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            dtype: DataType::I64,
            dims: Vec::new(),
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Scalar `f32` constant.
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            dtype: DataType::F32,
            dims: Vec::new(),
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// `i32` tensor of the given shape.
    pub fn from_i32s(dims: Vec<i64>, values: &[i32]) -> IdentityResult<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DataType::I32, dims, data)
    }

    /// `f32` tensor of the given shape.
    pub fn from_f32s(dims: Vec<i64>, values: &[f32]) -> IdentityResult<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DataType::F32, dims, data)
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of elements (1 for a scalar).
    pub fn element_count(&self) -> usize {
        element_count(&self.dims)
    }

    fn render_element(&self, index: usize) -> String {
        let size = self.dtype.size_in_bytes();
        let bytes = &self.data[index * size..(index + 1) * size];
        match self.dtype {
            DataType::Bool => (bytes[0] != 0).to_string(),
            DataType::I8 => (bytes[0] as i8).to_string(),
            DataType::U8 => bytes[0].to_string(),
            DataType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]).to_string(),
            DataType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]).to_string(),
            DataType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string(),
            DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string(),
            DataType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string(),
            DataType::I64 | DataType::U64 | DataType::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                match self.dtype {
                    DataType::I64 => i64::from_le_bytes(raw).to_string(),
                    DataType::U64 => u64::from_le_bytes(raw).to_string(),
                    _ => f64::from_le_bytes(raw).to_string(),
                }
            }
            // Half-precision values are shown as raw bits.
            DataType::F16 | DataType::Bf16 => format!("0x{}", hex::encode(bytes)),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.element_count();
        let shown: Vec<String> = (0..count.min(DISPLAY_LIMIT))
            .map(|i| self.render_element(i))
            .collect();
        write!(f, "{}{} {}", self.dtype, format_dims(&self.dims), shown.join(" "))?;
        if count > DISPLAY_LIMIT {
            write!(f, " ...")?;
        }
        Ok(())
    }
}

/// Product of the dimensions; a scalar has one element.
pub(crate) fn element_count(dims: &[i64]) -> usize {
    dims.iter().map(|d| (*d).max(0) as usize).product()
}

/// Render dimensions as `[2,3]`; unknown dimensions print as `?`.
pub(crate) fn format_dims(dims: &[i64]) -> String {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| if *d < 0 { "?".to_string() } else { d.to_string() })
        .collect();
    format!("[{}]", parts.join(","))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
