//! Scalar element types and their host buffers.
//!
//! Every supported dtype maps to exactly one Rust type implementing
//! [`Element`]. The associated [`Element::Kind`] tag (`RealKind` or `ComplexKind`)
//! lets kernels pick a specialization at compile time instead of branching
//! on the dtype at runtime.

use std::fmt::Debug;
use std::ops::{Add, Mul};

use half::f16;
use num_complex::Complex;
use num_traits::{One, Zero};

use crate::dtype::DType;

pub type Complex32 = Complex<f32>;
pub type Complex64 = Complex<f64>;

/// Compile-time scalar kind tag.
pub trait ScalarKind: Send + Sync + 'static {
    const IS_COMPLEX: bool;
}

/// Real-valued kinds: conjugation is the identity.
#[derive(Debug)]
pub enum RealKind {}

/// Complex-valued kinds: conjugation negates the imaginary part.
#[derive(Debug)]
pub enum ComplexKind {}

impl ScalarKind for RealKind {
    const IS_COMPLEX: bool = false;
}

impl ScalarKind for ComplexKind {
    const IS_COMPLEX: bool = true;
}

/// Typed, contiguous host storage. One variant per [`DType`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    C64(Vec<Complex32>),
    C128(Vec<Complex64>),
}

impl HostBuffer {
    /// Zero-initialized buffer of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F16 => HostBuffer::F16(vec![f16::ZERO; len]),
            DType::F32 => HostBuffer::F32(vec![0.0; len]),
            DType::F64 => HostBuffer::F64(vec![0.0; len]),
            DType::I32 => HostBuffer::I32(vec![0; len]),
            DType::C64 => HostBuffer::C64(vec![Complex32::zero(); len]),
            DType::C128 => HostBuffer::C128(vec![Complex64::zero(); len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            HostBuffer::F16(_) => DType::F16,
            HostBuffer::F32(_) => DType::F32,
            HostBuffer::F64(_) => DType::F64,
            HostBuffer::I32(_) => DType::I32,
            HostBuffer::C64(_) => DType::C64,
            HostBuffer::C128(_) => DType::C128,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostBuffer::F16(v) => v.len(),
            HostBuffer::F32(v) => v.len(),
            HostBuffer::F64(v) => v.len(),
            HostBuffer::I32(v) => v.len(),
            HostBuffer::C64(v) => v.len(),
            HostBuffer::C128(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, for host↔device copies.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HostBuffer::F16(v) => bytemuck::cast_slice(v),
            HostBuffer::F32(v) => bytemuck::cast_slice(v),
            HostBuffer::F64(v) => bytemuck::cast_slice(v),
            HostBuffer::I32(v) => bytemuck::cast_slice(v),
            HostBuffer::C64(v) => bytemuck::cast_slice(v),
            HostBuffer::C128(v) => bytemuck::cast_slice(v),
        }
    }

    /// Rebuild a typed buffer from raw bytes. Copies, so `bytes` need not be
    /// aligned for the element type.
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() % dtype.element_size() != 0 {
            return None;
        }
        Some(match dtype {
            DType::F16 => HostBuffer::F16(bytemuck::pod_collect_to_vec(bytes)),
            DType::F32 => HostBuffer::F32(bytemuck::pod_collect_to_vec(bytes)),
            DType::F64 => HostBuffer::F64(bytemuck::pod_collect_to_vec(bytes)),
            DType::I32 => HostBuffer::I32(bytemuck::pod_collect_to_vec(bytes)),
            DType::C64 => HostBuffer::C64(bytemuck::pod_collect_to_vec(bytes)),
            DType::C128 => HostBuffer::C128(bytemuck::pod_collect_to_vec(bytes)),
        })
    }
}

/// A scalar that can be stored in a tensor and multiplied in a batch.
pub trait Element:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Zero
    + One
    + Add<Output = Self>
    + Mul<Output = Self>
    + bytemuck::Pod
    + 'static
{
    const DTYPE: DType;

    /// `RealKind` or `ComplexKind`; drives kernel specialization.
    type Kind: ScalarKind;

    /// Complex conjugate. Identity for real kinds.
    fn conj(self) -> Self;

    /// `acc + a * b`. Integer kinds wrap on overflow.
    fn mul_acc(acc: Self, a: Self, b: Self) -> Self;

    fn slice(buf: &HostBuffer) -> Option<&[Self]>;

    fn slice_mut(buf: &mut HostBuffer) -> Option<&mut [Self]>;

    fn into_buffer(data: Vec<Self>) -> HostBuffer;
}

macro_rules! impl_element {
    (
        $ty:ty,
        $variant:ident,
        $kind:ty,
        conj: |$v:ident| $conj:expr,
        mul_acc: |$acc:ident, $a:ident, $b:ident| $mul_acc:expr $(,)?
    ) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;
            type Kind = $kind;

            #[inline(always)]
            fn conj(self) -> Self {
                let $v = self;
                $conj
            }

            #[inline(always)]
            fn mul_acc($acc: Self, $a: Self, $b: Self) -> Self {
                $mul_acc
            }

            fn slice(buf: &HostBuffer) -> Option<&[Self]> {
                match buf {
                    HostBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(buf: &mut HostBuffer) -> Option<&mut [Self]> {
                match buf {
                    HostBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_buffer(data: Vec<Self>) -> HostBuffer {
                HostBuffer::$variant(data)
            }
        }
    };
}

impl_element!(f16, F16, RealKind, conj: |v| v, mul_acc: |acc, a, b| acc + a * b);
impl_element!(f32, F32, RealKind, conj: |v| v, mul_acc: |acc, a, b| acc + a * b);
impl_element!(f64, F64, RealKind, conj: |v| v, mul_acc: |acc, a, b| acc + a * b);
impl_element!(
    i32,
    I32,
    RealKind,
    conj: |v| v,
    mul_acc: |acc, a, b| acc.wrapping_add(a.wrapping_mul(b)),
);
impl_element!(
    Complex32,
    C64,
    ComplexKind,
    conj: |v| Complex::conj(&v),
    mul_acc: |acc, a, b| acc + a * b,
);
impl_element!(
    Complex64,
    C128,
    ComplexKind,
    conj: |v| Complex::conj(&v),
    mul_acc: |acc, a, b| acc + a * b,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_tags() {
        assert_eq!(<f16 as Element>::DTYPE, DType::F16);
        assert_eq!(<i32 as Element>::DTYPE, DType::I32);
        assert_eq!(<Complex64 as Element>::DTYPE, DType::C128);
        assert!(!<<f32 as Element>::Kind as ScalarKind>::IS_COMPLEX);
        assert!(<<Complex32 as Element>::Kind as ScalarKind>::IS_COMPLEX);
    }

    #[test]
    fn test_conj() {
        assert_eq!(Element::conj(3.5f32), 3.5);
        let z = Complex32::new(1.0, -2.0);
        assert_eq!(Element::conj(z), Complex32::new(1.0, 2.0));
        let w = Complex64::new(-0.5, 4.0);
        assert_eq!(<Complex64 as Element>::conj(w), Complex64::new(-0.5, -4.0));
        assert_eq!(Element::conj(Element::conj(w)), w);
    }

    #[test]
    fn test_mul_acc_wraps_integers() {
        let big = 1i32 << 20;
        assert_eq!(i32::mul_acc(0, big, big), big.wrapping_mul(big));
        assert_eq!(i32::mul_acc(i32::MAX, 1, 1), i32::MIN);
        assert_eq!(f64::mul_acc(1.0, 2.0, 3.0), 7.0);
        let z = Complex32::new(0.0, 1.0);
        assert_eq!(Complex32::mul_acc(Complex32::new(1.0, 0.0), z, z), Complex32::new(0.0, 0.0));
    }

    #[test]
    fn test_buffer_access() {
        let mut buf = f64::into_buffer(vec![1.0, 2.0]);
        assert_eq!(buf.dtype(), DType::F64);
        assert_eq!(f64::slice(&buf), Some(&[1.0, 2.0][..]));
        assert!(f32::slice(&buf).is_none());
        f64::slice_mut(&mut buf).unwrap()[1] = 5.0;
        assert_eq!(f64::slice(&buf).unwrap()[1], 5.0);
    }

    #[test]
    fn test_byte_roundtrip_is_unaligned_safe() {
        let buf = HostBuffer::C64(vec![Complex32::new(1.0, 2.0), Complex32::new(-3.0, 0.5)]);
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(buf.as_bytes());
        let back = HostBuffer::from_bytes(DType::C64, &bytes[1..]).unwrap();
        assert_eq!(back, buf);
        assert!(HostBuffer::from_bytes(DType::F32, &[0u8; 3]).is_none());
    }

    #[test]
    fn test_zeros() {
        let buf = HostBuffer::zeros(DType::C128, 3);
        assert_eq!(buf.len(), 3);
        assert!(Complex64::slice(&buf).unwrap().iter().all(|v| v.is_zero()));
    }
}
