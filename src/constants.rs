/// Width/height of the basic transform block.
pub const BLOCK_DIM: usize = 8;

/// Number of coefficients in one basic 8x8 block; every quantization table is
/// a multiple of this.
pub const DCT_BLOCK_SIZE: usize = BLOCK_DIM * BLOCK_DIM;

/// Number of color channels covered by a quantization table (X, Y, B).
pub const NUM_CHANNELS: usize = 3;

/// Alignment of every plane base pointer and row stride, in bytes. Covers the
/// cache line size of current CPUs, including adjacent-line prefetch pairs.
pub const CACHE_ALIGNMENT: usize = 128;

// Stores are checked against pending loads using only the low 11 address bits
// on several x86 cores, so row strides must not be a multiple of this.
pub const ALIAS_BOUNDARY: usize = 2048;

/// Largest table, in coefficients (32x32 transform).
pub const MAX_QUANT_TABLE_SIZE: usize = DCT_BLOCK_SIZE * 16;

/// Number of compiled-in quantization libraries.
pub const NUM_PREDEFINED_TABLES: usize = 1;
pub const CEIL_LOG2_NUM_PREDEFINED_TABLES: u8 = 0;

pub const LOG2_NUM_QUANT_MODES: u8 = 3;

pub const LOG2_MAX_DISTANCE_BANDS: u8 = 4;
/// Largest band count the 4-bit count field can carry.
pub const MAX_DISTANCE_BANDS: usize = 1 << LOG2_MAX_DISTANCE_BANDS;

/// Raw tables carry a 4-bit denominator shift.
pub const LOG2_MAX_RAW_DEN_SHIFT: u8 = 4;
pub const MAX_RAW_DEN_SHIFT: u8 = (1 << LOG2_MAX_RAW_DEN_SHIFT) - 1;

/// Bits used for the raw table length and each raw table entry.
pub const RAW_TABLE_COUNT_BITS: u8 = 16;
pub const RAW_TABLE_ENTRY_BITS: u8 = 16;

/// Smallest magnitude accepted for a weight or multiplier; the reciprocal is
/// the largest accepted weight.
pub const ALMOST_ZERO: f32 = 1e-8;

// Powers of two so the DC step survives repeated scaling exactly.
pub const INV_DC_QUANT: [f32; NUM_CHANNELS] = [4096.0, 512.0, 256.0];

pub const DC_QUANT: [f32; NUM_CHANNELS] = [
    1.0 / INV_DC_QUANT[0],
    1.0 / INV_DC_QUANT[1],
    1.0 / INV_DC_QUANT[2],
];
