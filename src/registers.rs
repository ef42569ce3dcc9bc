//! Typed access to memory-mapped register blocks.
//!
//! Hardware handles are generic over [`RegisterIo`] so the same state machines
//! run against a `/dev/mem` window or against a register model.

mod private {
    pub trait Sealed {}
}

/// A scalar that can be moved through a register or argument slot.
///
/// Values travel as their raw little-endian bit pattern zero-extended to 64
/// bits.
pub trait Word: Copy + private::Sealed + 'static {
    const WIDTH: usize;

    fn into_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_word_int {
    ($($t:ty => $u:ty),*) => {
        $(
            impl private::Sealed for $t {}
            impl Word for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                #[inline(always)]
                fn into_bits(self) -> u64 {
                    self as $u as u64
                }

                #[inline(always)]
                fn from_bits(bits: u64) -> Self {
                    bits as $u as $t
                }
            }
        )*
    };
}

impl_word_int!(
    u8 => u8,
    u16 => u16,
    u32 => u32,
    u64 => u64,
    i8 => u8,
    i16 => u16,
    i32 => u32,
    i64 => u64
);

impl private::Sealed for f32 {}
impl Word for f32 {
    const WIDTH: usize = 4;

    fn into_bits(self) -> u64 {
        self.to_bits() as u64
    }

    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl private::Sealed for f64 {}
impl Word for f64 {
    const WIDTH: usize = 8;

    fn into_bits(self) -> u64 {
        self.to_bits()
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

/// Volatile access to a block of device registers, addressed in bytes from
/// the start of the block.
///
/// Implementations must perform each access exactly once and in program
/// order. They do not insert barriers; callers place [`crate::dmb`] where the
/// device protocol needs ordering.
pub trait RegisterIo {
    fn read<T: Word>(&self, offset: usize) -> T;
    fn write<T: Word>(&self, offset: usize, value: T);

    /// Size of the block in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        self.read::<u32>(offset)
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        self.write::<u32>(offset, value)
    }

    #[inline]
    fn set_bits32(&self, offset: usize, mask: u32) {
        let v = self.read32(offset);
        self.write32(offset, v | mask);
    }

    #[inline]
    fn clear_bits32(&self, offset: usize, mask: u32) {
        let v = self.read32(offset);
        self.write32(offset, v & !mask);
    }

    /// Replace the bits selected by `mask` with the matching bits of `value`.
    #[inline]
    fn update_bits32(&self, offset: usize, mask: u32, value: u32) {
        let v = self.read32(offset);
        self.write32(offset, (v & !mask) | (value & mask));
    }
}

impl<R: RegisterIo + ?Sized> RegisterIo for &R {
    fn read<T: Word>(&self, offset: usize) -> T {
        (**self).read(offset)
    }

    fn write<T: Word>(&self, offset: usize, value: T) {
        (**self).write(offset, value)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
