use std::fmt;

/// Element kinds supported by batched matrix multiplication.
///
/// Complex kinds carry a conjugation operation; for every other kind
/// conjugation is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// 32-bit signed integer
    I32,
    /// Complex number made of two f32 (real, imaginary)
    C64,
    /// Complex number made of two f64 (real, imaginary)
    C128,
}

impl DType {
    /// Every dtype, in registration order.
    pub const ALL: [DType; 6] = [
        DType::F16,
        DType::F32,
        DType::F64,
        DType::I32,
        DType::C64,
        DType::C128,
    ];

    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::C64 => 8,
            DType::C128 => 16,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Whether this dtype is a real floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::I32)
    }

    /// Whether this dtype is complex (conjugation is not the identity).
    pub fn is_complex(&self) -> bool {
        matches!(self, DType::C64 | DType::C128)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F16 => write!(f, "f16"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I32 => write!(f, "i32"),
            DType::C64 => write!(f, "complex64"),
            DType::C128 => write!(f, "complex128"),
        }
    }
}
