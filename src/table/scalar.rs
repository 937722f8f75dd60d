use std::fmt::Debug;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width property types that are stored inline in a table.
///
/// Implemented for `bool`, all 8 to 64 bit integers, `f32` and `f64`. Values are stored
/// little-endian and aligned to their own size.
pub trait Scalar: sealed::Sealed + Copy + PartialEq + Default + Debug {
    /// Encoded width in bytes. Also the alignment.
    const SIZE: usize;

    /// Writes the little-endian encoding into `out`, which is exactly `SIZE` bytes.
    fn write_le(self, out: &mut [u8]);

    /// Decodes a value from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const SIZE: usize = size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl sealed::Sealed for bool {}

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}
