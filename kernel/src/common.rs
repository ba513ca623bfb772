//! Native widths and small helpers shared by the kernel core.

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

pub type Char = i8;
pub type Uchar = u8;
pub type Int = i32;
pub type Uint = u32;
pub type Long = i32;
pub type Ulong = u32;
pub type Ulong64 = u64;
pub type Short = i16;
pub type Ushort = u16;

/// Storage unit for anything that has to hold a pointer.
pub type AlignType = u64;

/// Marker written into free byte-pool blocks.
pub const BYTE_BLOCK_FREE: AlignType = 0xFFFF_EEEE_FFFF_EEEE;

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Index of the lowest set bit, or `None` for zero.
#[inline(always)]
pub const fn lowest_set_bit(bits: u32) -> Option<u32> {
    if bits == 0 {
        None
    } else {
        Some(bits.trailing_zeros())
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
