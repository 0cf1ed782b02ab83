//! Dequantization matrices: one table per [`QuantTable`] slot, expanded from
//! its [`QuantEncoding`] into dense per-channel weights.

use std::f32::consts::SQRT_2;
use std::sync::OnceLock;

use log::{debug, trace};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ac_strategy::AcStrategy;
use crate::aligned::AlignedBuffer;
use crate::bit_io::{BitRead, BitReader, BitWrite, BitWriter};
use crate::constants::{
    ALMOST_ZERO, BLOCK_DIM, DC_QUANT, DCT_BLOCK_SIZE, INV_DC_QUANT, MAX_DISTANCE_BANDS,
    NUM_CHANNELS,
};
use crate::error::{DequantError, Result};
use crate::quant_encoding::{DctQuantWeightParams, QuantEncoding};

/// Storage slot of a quantization table. Transposed strategies share a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum QuantTable {
    Dct = 0,
    Identity = 1,
    Dct2x2 = 2,
    Dct4x4 = 3,
    Dct16x16 = 4,
    Dct32x32 = 5,
    /// Also Dct16x8.
    Dct8x16 = 6,
    /// Also Dct32x8.
    Dct8x32 = 7,
    /// Also Dct32x16.
    Dct16x32 = 8,
    /// Also Dct8x4.
    Dct4x8 = 9,
    /// All four AFV orientations.
    Afv0 = 10,
}

impl QuantTable {
    pub const NUM: usize = 11;

    pub const ALL: [QuantTable; Self::NUM] = [
        QuantTable::Dct,
        QuantTable::Identity,
        QuantTable::Dct2x2,
        QuantTable::Dct4x4,
        QuantTable::Dct16x16,
        QuantTable::Dct32x32,
        QuantTable::Dct8x16,
        QuantTable::Dct8x32,
        QuantTable::Dct16x32,
        QuantTable::Dct4x8,
        QuantTable::Afv0,
    ];

    pub const REQUIRED_SIZE_X: [usize; Self::NUM] = [1, 1, 1, 1, 2, 4, 1, 1, 2, 1, 1];
    pub const REQUIRED_SIZE_Y: [usize; Self::NUM] = [1, 1, 1, 1, 2, 4, 2, 4, 4, 1, 1];

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }

    /// Number of 8x8 blocks the table covers.
    pub fn required_size(self) -> usize {
        Self::REQUIRED_SIZE_X[self.index()] * Self::REQUIRED_SIZE_Y[self.index()]
    }

    /// Weights per channel.
    pub fn num_coefficients(self) -> usize {
        self.required_size() * DCT_BLOCK_SIZE
    }

    pub fn for_strategy(strategy: AcStrategy) -> QuantTable {
        match strategy {
            AcStrategy::Dct => QuantTable::Dct,
            AcStrategy::Identity => QuantTable::Identity,
            AcStrategy::Dct2x2 => QuantTable::Dct2x2,
            AcStrategy::Dct4x4 => QuantTable::Dct4x4,
            AcStrategy::Dct16x16 => QuantTable::Dct16x16,
            AcStrategy::Dct32x32 => QuantTable::Dct32x32,
            AcStrategy::Dct16x8 | AcStrategy::Dct8x16 => QuantTable::Dct8x16,
            AcStrategy::Dct32x8 | AcStrategy::Dct8x32 => QuantTable::Dct8x32,
            AcStrategy::Dct32x16 | AcStrategy::Dct16x32 => QuantTable::Dct16x32,
            AcStrategy::Dct4x8 | AcStrategy::Dct8x4 => QuantTable::Dct4x8,
            AcStrategy::Afv0 | AcStrategy::Afv1 | AcStrategy::Afv2 | AcStrategy::Afv3 => {
                QuantTable::Afv0
            }
        }
    }
}

const fn sum_required_size() -> usize {
    let mut sum = 0;
    let mut i = 0;
    while i < QuantTable::NUM {
        sum += QuantTable::REQUIRED_SIZE_X[i] * QuantTable::REQUIRED_SIZE_Y[i];
        i += 1;
    }
    sum
}

/// Floats in the forward tables; the inverse tables follow at this offset.
pub const TOTAL_TABLE_SIZE: usize = sum_required_size() * DCT_BLOCK_SIZE * NUM_CHANNELS;

const NUM_OFFSETS: usize = AcStrategy::NUM_VALID_STRATEGIES * NUM_CHANNELS;

/// Start of each slot's channel 0 table, in slot order.
fn slot_offsets() -> [usize; QuantTable::NUM] {
    let mut offsets = [0; QuantTable::NUM];
    let mut pos = 0;
    for (offset, slot) in offsets.iter_mut().zip(QuantTable::ALL) {
        *offset = pos;
        pos += slot.num_coefficients() * NUM_CHANNELS;
    }
    offsets
}

fn strategy_offsets() -> [usize; NUM_OFFSETS] {
    let slots = slot_offsets();
    let mut offsets = [0; NUM_OFFSETS];
    for strategy in AcStrategy::ALL {
        let slot = QuantTable::for_strategy(strategy);
        for c in 0..NUM_CHANNELS {
            offsets[u8::from(strategy) as usize * NUM_CHANNELS + c] =
                slots[slot.index()] + c * slot.num_coefficients();
        }
    }
    offsets
}

#[allow(clippy::excessive_precision)]
fn library_tables() -> [QuantEncoding; QuantTable::NUM] {
    let dct4x4_params = DctQuantWeightParams::from_array(&[
        [2200.0, 0.0, 0.0, 0.0],
        [392.0, 0.0, 0.0, 0.0],
        [112.0, -0.25, -0.25, -0.5],
    ]);
    let dct4x8_params = DctQuantWeightParams::from_array(&[
        [
            2198.050556016380522,
            -0.96269623020744692,
            -0.76194253026666783,
            -0.6551140670773547,
        ],
        [
            764.3655248643528689,
            -0.92630200888366945,
            -0.9675229603596517,
            -0.27845290869168118,
        ],
        [
            527.107573587542228,
            -1.4594385811273854,
            -1.450082094097871593,
            -1.5843722511996204,
        ],
    ]);

    [
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [3150.0, 0.0, -0.4, -0.4, -0.4, -2.0],
            [560.0, 0.0, -0.3, -0.3, -0.3, -0.3],
            [512.0, -2.0, -1.0, 0.0, -1.0, -2.0],
        ])),
        QuantEncoding::identity([
            [280.0, 3160.0, 3160.0],
            [60.0, 864.0, 864.0],
            [18.0, 200.0, 200.0],
        ]),
        QuantEncoding::dct2([
            [3840.0, 2560.0, 1280.0, 640.0, 480.0, 300.0],
            [960.0, 640.0, 320.0, 180.0, 140.0, 120.0],
            [640.0, 320.0, 128.0, 64.0, 32.0, 16.0],
        ]),
        QuantEncoding::dct4(dct4x4_params, [[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]),
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [
                8996.8725711814115328,
                -1.3000777393353804,
                -0.49424529824571225,
                -0.439093774457103443,
                -0.6350101832695744,
                -0.90177264050827612,
                -1.6162099239887414,
            ],
            [
                3191.48366296844234752,
                -0.67424582104194355,
                -0.80745813428471001,
                -0.44925837484843441,
                -0.35865440981033403,
                -0.31322389111877305,
                -0.37615025315725483,
            ],
            [
                1157.50408145487200256,
                -2.0531423165804414,
                -1.4,
                -0.50687130033378396,
                -0.42708730624733904,
                -1.4856834539296244,
                -4.9209142884401604,
            ],
        ])),
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [
                15718.40830982518931456,
                -1.025,
                -0.98,
                -0.9012,
                -0.4,
                -0.48819395464,
                -0.421064,
                -0.27,
            ],
            [
                7305.7636810695983104,
                -0.8041958212306401,
                -0.7633036457487539,
                -0.55660379990111464,
                -0.49785304658857626,
                -0.43699592683512467,
                -0.40180866526242109,
                -0.27321683125358037,
            ],
            [
                3803.53173721215041536,
                -3.060733579805728,
                -2.0413270132490346,
                -2.0235650159727417,
                -0.5495389509954993,
                -0.4,
                -0.4,
                -0.3,
            ],
        ])),
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [7240.7734393502, -0.7, -0.7, -0.2, -0.2, -0.2, -0.5],
            [1448.15468787004, -0.5, -0.5, -0.5, -0.2, -0.2, -0.2],
            [506.854140754517, -1.4, -0.2, -0.5, -0.5, -1.5, -3.6],
        ])),
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [
                16283.2494710648897,
                -1.7812845336559429,
                -1.6309059012653515,
                -1.0382179034313539,
                -0.85,
                -0.7,
                -0.9,
                -1.2360638576849587,
            ],
            [
                5089.15750884921511936,
                -0.320049391452786891,
                -0.35362849922161446,
                -0.30340000000000003,
                -0.61,
                -0.5,
                -0.5,
                -0.6,
            ],
            [
                3397.77603275308720128,
                -0.321327362693153371,
                -0.34507619223117997,
                -0.70340000000000003,
                -0.9,
                -1.0,
                -1.0,
                -1.1754605576265209,
            ],
        ])),
        QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [
                13844.97076442300573,
                -0.97113799999999995,
                -0.658,
                -0.42026,
                -0.22712,
                -0.2206,
                -0.226,
                -0.6,
            ],
            [
                4798.964084220744293,
                -0.61125308982767057,
                -0.83770786552491361,
                -0.79014862079498627,
                -0.2692727459704829,
                -0.38272769465388551,
                -0.22924222653091453,
                -0.20719098826199578,
            ],
            [
                1807.236946760964614,
                -1.2,
                -1.2,
                -0.7,
                -0.7,
                -0.7,
                -0.4,
                -0.5,
            ],
        ])),
        QuantEncoding::dct4x8(dct4x8_params, [1.0, 1.0, 1.0]),
        QuantEncoding::afv(
            dct4x8_params,
            dct4x4_params,
            [
                // (0, 1)/(1, 0), AFV corner, AFV high frequencies.
                [3072.0, 3072.0, 256.0, 256.0, 256.0, 414.0, 0.0, 0.0, 0.0],
                [1024.0, 1024.0, 50.0, 50.0, 50.0, 58.0, 0.0, 0.0, 0.0],
                [384.0, 384.0, 12.0, 12.0, 12.0, 22.0, -0.25, -0.25, -0.25],
            ],
        ),
    ]
}

/// Compiled-in tables, one per slot, for predefined table 0.
pub fn library() -> &'static [QuantEncoding; QuantTable::NUM] {
    static LIBRARY: OnceLock<[QuantEncoding; QuantTable::NUM]> = OnceLock::new();
    LIBRARY.get_or_init(library_tables)
}

fn mult(v: f32) -> f32 {
    if v > 0.0 { 1.0 + v } else { 1.0 / (1.0 - v) }
}

/// Geometric interpolation between `array[floor(pos)]` and the next entry.
fn interpolate_vec(scaled_pos: f32, array: &[f32]) -> f32 {
    let idx = scaled_pos.floor();
    let frac = scaled_pos - idx;
    let idx = idx as usize;
    let a = array[idx];
    let b = array[idx + 1];
    a * (b / a).powf(frac)
}

/// Like [`interpolate_vec`] with `pos` given on a `0..max` scale.
fn interpolate(pos: f32, max: f32, array: &[f32]) -> f32 {
    let scaled_pos = pos * (array.len() - 1) as f32 / max;
    interpolate_vec(scaled_pos, array)
}

fn distance_bands(params: &DctQuantWeightParams, c: usize) -> Result<[f32; MAX_DISTANCE_BANDS]> {
    let values = params.distance_bands(c);
    let mut bands = [0.0; MAX_DISTANCE_BANDS];
    bands[0] = values[0];
    if bands[0] < ALMOST_ZERO {
        return Err(DequantError::InvalidDistanceBand);
    }
    for i in 1..values.len() {
        bands[i] = bands[i - 1] * mult(values[i]);
        if bands[i] < ALMOST_ZERO {
            return Err(DequantError::InvalidDistanceBand);
        }
    }
    Ok(bands)
}

/// Synthesizes a `rows x cols` weight grid per channel into `out`
/// (channel-major). The far corner maps just below the last band.
fn get_quant_weights(
    rows: usize,
    cols: usize,
    params: &DctQuantWeightParams,
    out: &mut [f32],
) -> Result<()> {
    let num_bands = params.num_distance_bands();
    for c in 0..NUM_CHANNELS {
        let bands = distance_bands(params, c)?;
        let bands = &bands[..num_bands];
        let scale = (num_bands - 1) as f32 / (SQRT_2 + 1e-6);
        let rcpcol = scale / (cols - 1) as f32;
        let rcprow = scale / (rows - 1) as f32;
        let out = &mut out[c * rows * cols..(c + 1) * rows * cols];
        for y in 0..rows {
            let dy = y as f32 * rcprow;
            let dy2 = dy * dy;
            for x in 0..cols {
                let dx = x as f32 * rcpcol;
                let scaled_distance = (dx * dx + dy2).sqrt();
                out[y * cols + x] = if num_bands == 1 {
                    bands[0]
                } else {
                    interpolate_vec(scaled_distance, bands)
                };
            }
        }
    }
    Ok(())
}

// Distances of the AFV-specific coefficients on the 4x4 even grid; the 2x2
// corner is set explicitly.
const AFV_FREQS: [f32; 16] = [
    0.0,
    0.0,
    0.8517778890324296,
    5.37778436506804,
    0.0,
    0.0,
    4.734747904497923,
    5.449245381693219,
    1.6598270267479331,
    4.0,
    7.275749096817861,
    10.423227632456525,
    2.662932286148962,
    7.630657783650829,
    8.962388608184032,
    12.97166202570235,
];

// DC of block-specific transforms; never used for dequantization.
const DC_FILLER: f32 = 0xBAD as f32;

/// Expands `encoding` for `slot` into `weights`, `3 * slot.num_coefficients()`
/// values in channel-major order.
fn compute_quant_table(encoding: &QuantEncoding, slot: QuantTable, weights: &mut [f32]) -> Result<()> {
    let rows = BLOCK_DIM * QuantTable::REQUIRED_SIZE_X[slot.index()];
    let cols = BLOCK_DIM * QuantTable::REQUIRED_SIZE_Y[slot.index()];
    let num = rows * cols;
    debug_assert_eq!(weights.len(), NUM_CHANNELS * num);

    let single_block = slot.required_size() == 1;
    match encoding {
        QuantEncoding::Library { predefined } => {
            if *predefined != 0 {
                return Err(DequantError::InvalidPredefinedTable);
            }
            return compute_quant_table(&library()[slot.index()], slot, weights);
        }
        QuantEncoding::Identity { xyb_weights } => {
            if !single_block {
                return Err(DequantError::InvalidQuantEncoding);
            }
            for (c, w) in xyb_weights.iter().enumerate() {
                let block = &mut weights[c * num..(c + 1) * num];
                block.fill(w[0]);
                block[1] = w[1];
                block[BLOCK_DIM] = w[1];
                block[BLOCK_DIM + 1] = w[2];
            }
        }
        QuantEncoding::Dct2 { xyb_weights } => {
            if !single_block {
                return Err(DequantError::InvalidQuantEncoding);
            }
            for (c, w) in xyb_weights.iter().enumerate() {
                let block = &mut weights[c * num..(c + 1) * num];
                block[0] = DC_FILLER;
                block[1] = w[0];
                block[BLOCK_DIM] = w[0];
                block[BLOCK_DIM + 1] = w[1];
                for y in 0..2 {
                    for x in 0..2 {
                        block[y * BLOCK_DIM + x + 2] = w[2];
                        block[(y + 2) * BLOCK_DIM + x] = w[2];
                        block[(y + 2) * BLOCK_DIM + x + 2] = w[3];
                    }
                }
                for y in 0..4 {
                    for x in 0..4 {
                        block[y * BLOCK_DIM + x + 4] = w[4];
                        block[(y + 4) * BLOCK_DIM + x] = w[4];
                        block[(y + 4) * BLOCK_DIM + x + 4] = w[5];
                    }
                }
            }
        }
        QuantEncoding::Dct4 { params, xyb_mul } => {
            if !single_block {
                return Err(DequantError::InvalidQuantEncoding);
            }
            let mut weights4x4 = [0.0; NUM_CHANNELS * 16];
            get_quant_weights(4, 4, params, &mut weights4x4)?;
            for (c, mul) in xyb_mul.iter().enumerate() {
                let block = &mut weights[c * num..(c + 1) * num];
                for y in 0..BLOCK_DIM {
                    for x in 0..BLOCK_DIM {
                        block[y * BLOCK_DIM + x] = weights4x4[c * 16 + (y / 2) * 4 + x / 2];
                    }
                }
                block[1] /= mul[0];
                block[BLOCK_DIM] /= mul[0];
                block[BLOCK_DIM + 1] /= mul[1];
            }
        }
        QuantEncoding::Dct4x8 { params, xyb_mul } => {
            if !single_block {
                return Err(DequantError::InvalidQuantEncoding);
            }
            let mut weights4x8 = [0.0; NUM_CHANNELS * 32];
            get_quant_weights(4, 8, params, &mut weights4x8)?;
            for (c, mul) in xyb_mul.iter().enumerate() {
                let block = &mut weights[c * num..(c + 1) * num];
                for y in 0..BLOCK_DIM {
                    for x in 0..BLOCK_DIM {
                        block[y * BLOCK_DIM + x] = weights4x8[c * 32 + (y / 2) * 8 + x];
                    }
                }
                block[BLOCK_DIM] /= mul;
            }
        }
        QuantEncoding::Dct { params } => {
            get_quant_weights(rows, cols, params, weights)?;
        }
        QuantEncoding::Raw {
            qtable,
            qtable_den_shift,
        } => {
            if qtable.len() != NUM_CHANNELS * num {
                return Err(DequantError::InvalidRawQuantTable);
            }
            let den = (1u32 << qtable_den_shift) as f32 * (1.0 / (8.0 * 255.0));
            for (weight, &q) in weights.iter_mut().zip(qtable) {
                if q <= 0 {
                    return Err(DequantError::InvalidRawQuantTable);
                }
                *weight = 1.0 / (den * q as f32);
            }
        }
        QuantEncoding::Afv {
            params4x8,
            params4x4,
            weights: afv_weights,
        } => {
            if !single_block {
                return Err(DequantError::InvalidQuantEncoding);
            }
            let mut weights4x8 = [0.0; NUM_CHANNELS * 32];
            get_quant_weights(4, 8, params4x8, &mut weights4x8)?;
            let mut weights4x4 = [0.0; NUM_CHANNELS * 16];
            get_quant_weights(4, 4, params4x4, &mut weights4x4)?;

            const LO: f32 = 0.8517778890324296;
            const HI: f32 = 12.97166202570235 - LO + 1e-6;
            for (c, w) in afv_weights.iter().enumerate() {
                let mut bands = [0.0; 4];
                bands[0] = w[5];
                if bands[0] < ALMOST_ZERO {
                    return Err(DequantError::InvalidDistanceBand);
                }
                for i in 1..4 {
                    bands[i] = bands[i - 1] * mult(w[i + 5]);
                    if bands[i] < ALMOST_ZERO {
                        return Err(DequantError::InvalidDistanceBand);
                    }
                }

                let block = &mut weights[c * num..(c + 1) * num];
                // Even rows and columns: the AFV part.
                block[0] = 1.0;
                block[BLOCK_DIM] = w[0];
                block[1] = w[1];
                block[2 * BLOCK_DIM] = w[2];
                block[2] = w[3];
                block[2 * BLOCK_DIM + 2] = w[4];
                for y in 0..4 {
                    for x in 0..4 {
                        if x < 2 && y < 2 {
                            continue;
                        }
                        block[2 * y * BLOCK_DIM + 2 * x] =
                            interpolate(AFV_FREQS[y * 4 + x] - LO, HI, &bands);
                    }
                }

                // Odd rows: the 4x8 DCT.
                for y in 0..BLOCK_DIM / 2 {
                    for x in 0..BLOCK_DIM {
                        if x == 0 && y == 0 {
                            continue;
                        }
                        block[(2 * y + 1) * BLOCK_DIM + x] = weights4x8[c * 32 + y * 8 + x];
                    }
                }
                // Even rows, odd columns: the 4x4 DCT.
                for y in 0..BLOCK_DIM / 2 {
                    for x in 0..BLOCK_DIM / 2 {
                        if x == 0 && y == 0 {
                            continue;
                        }
                        block[2 * y * BLOCK_DIM + 2 * x + 1] = weights4x4[c * 16 + y * 4 + x];
                    }
                }
            }
        }
    }
    Ok(())
}

/// Builds forward and inverse tables for all slots. Nothing is committed on
/// failure.
fn compute_tables(encodings: &[QuantEncoding]) -> Result<AlignedBuffer<f32>> {
    debug_assert_eq!(encodings.len(), QuantTable::NUM);
    let mut table = AlignedBuffer::<f32>::zeroed(2 * TOTAL_TABLE_SIZE);
    let (forward, inverse) = table.as_mut_slice().split_at_mut(TOTAL_TABLE_SIZE);
    let offsets = slot_offsets();

    for ((slot, encoding), offset) in QuantTable::ALL.into_iter().zip(encodings).zip(offsets) {
        let len = NUM_CHANNELS * slot.num_coefficients();
        let weights = &mut forward[offset..offset + len];
        compute_quant_table(encoding, slot, weights)?;
        trace!("slot {:?}: {:?} expanded to {} weights", slot, encoding.mode(), len);

        for (weight, inv) in weights.iter_mut().zip(&mut inverse[offset..offset + len]) {
            if !(ALMOST_ZERO..=1.0 / ALMOST_ZERO).contains(weight) {
                return Err(DequantError::InvalidQuantTableWeight);
            }
            *weight = 1.0 / *weight;
            *inv = 1.0 / *weight;
        }
    }
    Ok(table)
}

fn write_encodings<W: BitWrite>(encodings: &[QuantEncoding], writer: &mut W) {
    let all_default = encodings.iter().all(QuantEncoding::is_default);
    writer.write_bool(all_default);
    if !all_default {
        for encoding in encodings {
            encoding.encode(writer);
        }
    }
}

fn write_dc<W: BitWrite>(inv_dc_quant: &[f32; NUM_CHANNELS], writer: &mut W) {
    let all_default = *inv_dc_quant == INV_DC_QUANT;
    writer.write_bool(all_default);
    if !all_default {
        for &inv in inv_dc_quant {
            writer.write_f32(inv);
        }
    }
}

fn same_bits(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// The dequantization tables of all 18 strategies and the DC quantizers.
///
/// Forward tables (`1 / weight`, multiplied into decoded coefficients) and
/// inverse tables (`weight`, used when quantizing) live in one aligned buffer.
#[derive(Debug, Clone)]
pub struct DequantMatrices {
    table: AlignedBuffer<f32>,
    table_offsets: [usize; NUM_OFFSETS],
    dc_quant: [f32; NUM_CHANNELS],
    inv_dc_quant: [f32; NUM_CHANNELS],
    encodings: Vec<QuantEncoding>,
}

impl DequantMatrices {
    /// All slots set to predefined table 0.
    pub fn new() -> Self {
        let encodings = vec![QuantEncoding::library(0); QuantTable::NUM];
        let table = match compute_tables(&encodings) {
            Ok(table) => table,
            Err(err) => panic!("default quantization tables are invalid: {err}"),
        };
        Self {
            table,
            table_offsets: strategy_offsets(),
            dc_quant: DC_QUANT,
            inv_dc_quant: INV_DC_QUANT,
            encodings,
        }
    }

    /// Recomputes the tables from the current encodings.
    pub fn compute(&mut self) -> Result<()> {
        self.table = compute_tables(&self.encodings)?;
        Ok(())
    }

    fn offset(&self, strategy: AcStrategy, c: usize) -> usize {
        assert!(c < NUM_CHANNELS, "channel {c} out of range");
        self.table_offsets[u8::from(strategy) as usize * NUM_CHANNELS + c]
    }

    /// Dequantization multipliers for `strategy` and channel `c`;
    /// `num_coefficients` of the strategy's slot, 128-byte aligned.
    pub fn matrix(&self, strategy: AcStrategy, c: usize) -> &[f32] {
        let offset = self.offset(strategy, c);
        let len = QuantTable::for_strategy(strategy).num_coefficients();
        &self.table.as_slice()[offset..offset + len]
    }

    /// Quantization weights for `strategy` and channel `c`.
    pub fn inv_matrix(&self, strategy: AcStrategy, c: usize) -> &[f32] {
        let offset = TOTAL_TABLE_SIZE + self.offset(strategy, c);
        let len = QuantTable::for_strategy(strategy).num_coefficients();
        &self.table.as_slice()[offset..offset + len]
    }

    pub fn slot_matrix(&self, slot: QuantTable, c: usize) -> &[f32] {
        assert!(c < NUM_CHANNELS, "channel {c} out of range");
        let offset = slot_offsets()[slot.index()] + c * slot.num_coefficients();
        &self.table.as_slice()[offset..offset + slot.num_coefficients()]
    }

    pub fn slot_inv_matrix(&self, slot: QuantTable, c: usize) -> &[f32] {
        assert!(c < NUM_CHANNELS, "channel {c} out of range");
        let offset = TOTAL_TABLE_SIZE + slot_offsets()[slot.index()] + c * slot.num_coefficients();
        &self.table.as_slice()[offset..offset + slot.num_coefficients()]
    }

    /// Offset of the table for `strategy` and channel `c` from the start of
    /// the forward (or inverse) tables.
    pub fn matrix_offset(&self, strategy: AcStrategy, c: usize) -> usize {
        self.offset(strategy, c)
    }

    pub fn dc_quant(&self, c: usize) -> f32 {
        self.dc_quant[c]
    }

    pub fn inv_dc_quant(&self, c: usize) -> f32 {
        self.inv_dc_quant[c]
    }

    /// Floats in the forward tables.
    pub fn size(&self) -> usize {
        TOTAL_TABLE_SIZE
    }

    pub fn encodings(&self) -> &[QuantEncoding] {
        &self.encodings
    }

    /// Writes the AC tables section.
    pub fn encode<W: BitWrite>(&self, writer: &mut W) {
        write_encodings(&self.encodings, writer);
    }

    /// Writes the DC quantizer section.
    pub fn encode_dc<W: BitWrite>(&self, writer: &mut W) {
        write_dc(&self.inv_dc_quant, writer);
    }

    /// Reads the AC tables section and recomputes. `self` is left untouched
    /// on error.
    pub fn decode<R: BitRead>(&mut self, reader: &mut R) -> Result<()> {
        let all_default = reader.read_bool()?;
        let encodings = if all_default {
            vec![QuantEncoding::library(0); QuantTable::NUM]
        } else {
            let mut encodings = Vec::with_capacity(QuantTable::NUM);
            for slot in QuantTable::ALL {
                encodings.push(QuantEncoding::decode(reader, slot.required_size())?);
            }
            encodings
        };

        let table = compute_tables(&encodings)?;
        debug!(
            "decoded quantization tables (all default: {})",
            all_default
        );
        self.table = table;
        self.encodings = encodings;
        Ok(())
    }

    /// Reads the DC quantizer section. `self` is left untouched on error.
    pub fn decode_dc<R: BitRead>(&mut self, reader: &mut R) -> Result<()> {
        if reader.read_bool()? {
            self.inv_dc_quant = INV_DC_QUANT;
            self.dc_quant = DC_QUANT;
            return Ok(());
        }
        let mut inv_dc_quant = [0.0; NUM_CHANNELS];
        for inv in inv_dc_quant.iter_mut() {
            *inv = reader.read_f32()?;
            if !inv.is_finite() || *inv < ALMOST_ZERO {
                return Err(DequantError::InvalidDcQuant);
            }
        }
        debug!("decoded DC quantizers {:?}", inv_dc_quant);
        self.inv_dc_quant = inv_dc_quant;
        self.dc_quant = inv_dc_quant.map(|inv| 1.0 / inv);
        Ok(())
    }

    /// Installs `encodings` (one per slot) so that the tables equal what a
    /// decoder reading [`DequantMatrices::encode`] would compute.
    ///
    /// # Panics
    ///
    /// If `encodings` has the wrong length, cannot be computed, or does not
    /// survive a serialization round trip.
    pub fn set_custom(&mut self, encodings: &[QuantEncoding]) {
        assert_eq!(
            encodings.len(),
            QuantTable::NUM,
            "one encoding per quantization table"
        );
        let expected = match compute_tables(encodings) {
            Ok(table) => table,
            Err(err) => panic!("custom quantization tables are invalid: {err}"),
        };

        let mut writer = BitWriter::new();
        write_encodings(encodings, &mut writer);
        let buffer = writer.finish();
        let mut reader = BitReader::new(&buffer);
        if let Err(err) = self.decode(&mut reader).and_then(|()| reader.close()) {
            panic!("custom quantization tables did not round-trip: {err}");
        }
        assert!(
            same_bits(self.table.as_slice(), expected.as_slice()),
            "custom quantization tables changed in serialization"
        );
    }

    /// Sets the DC quantizers; larger values mean finer quantization.
    ///
    /// # Panics
    ///
    /// If a value is not a valid quantizer.
    pub fn set_custom_dc(&mut self, inv_dc_quant: &[f32; NUM_CHANNELS]) {
        let mut writer = BitWriter::new();
        write_dc(inv_dc_quant, &mut writer);
        let buffer = writer.finish();
        let mut reader = BitReader::new(&buffer);
        if let Err(err) = self.decode_dc(&mut reader).and_then(|()| reader.close()) {
            panic!("custom DC quantizers did not round-trip: {err}");
        }
        assert!(
            same_bits(&self.inv_dc_quant, inv_dc_quant),
            "custom DC quantizers changed in serialization"
        );
    }
}

impl Default for DequantMatrices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CACHE_ALIGNMENT, MAX_QUANT_TABLE_SIZE};

    fn assert_almost_eq(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "{actual} != {expected} (tolerance {tolerance})"
        );
    }

    #[test]
    fn test_total_size() {
        assert_eq!(sum_required_size(), 40);
        assert_eq!(TOTAL_TABLE_SIZE, 7680);
        let largest = QuantTable::ALL.iter().map(|t| t.num_coefficients()).max();
        assert_eq!(largest, Some(MAX_QUANT_TABLE_SIZE));
        let matrices = DequantMatrices::new();
        assert_eq!(matrices.size(), 7680);
    }

    #[test]
    fn test_strategy_offsets() {
        let expected: [usize; NUM_OFFSETS] = [
            0, 64, 128, 192, 256, 320, 384, 448, 512, 576, 640, 704, 768, 1024, 1280, 1536, 2560,
            3584, 4608, 4736, 4864, 4608, 4736, 4864, 4992, 5248, 5504, 4992, 5248, 5504, 5760,
            6272, 6784, 5760, 6272, 6784, 7296, 7360, 7424, 7296, 7360, 7424, 7488, 7552, 7616,
            7488, 7552, 7616, 7488, 7552, 7616, 7488, 7552, 7616,
        ];
        let matrices = DequantMatrices::new();
        for strategy in AcStrategy::ALL {
            for c in 0..NUM_CHANNELS {
                assert_eq!(
                    matrices.matrix_offset(strategy, c),
                    expected[u8::from(strategy) as usize * 3 + c],
                    "{strategy:?} channel {c}"
                );
            }
        }
    }

    #[test]
    fn test_default_tables_match_reference() {
        // Every sixth entry of the first four slots, per channel.
        let expected: [f32; 132] = [
            0.000317, 0.000629, 0.000457, 0.000367, 0.000378, 0.000709, 0.000593, 0.000566,
            0.000629, 0.001192, 0.000943, 0.001786, 0.003042, 0.002372, 0.001998, 0.002044,
            0.003341, 0.002907, 0.002804, 0.003042, 0.004229, 0.003998, 0.001953, 0.011969,
            0.011719, 0.007886, 0.008374, 0.015337, 0.011719, 0.011719, 0.011969, 0.032080,
            0.025368, 0.003571, 0.003571, 0.003571, 0.003571, 0.003571, 0.003571, 0.003571,
            0.003571, 0.003571, 0.003571, 0.003571, 0.016667, 0.016667, 0.016667, 0.016667,
            0.016667, 0.016667, 0.016667, 0.016667, 0.016667, 0.016667, 0.016667, 0.055556,
            0.055556, 0.055556, 0.055556, 0.055556, 0.055556, 0.055556, 0.055556, 0.055556,
            0.055556, 0.055556, 0.000335, 0.002083, 0.002083, 0.001563, 0.000781, 0.002083,
            0.003333, 0.002083, 0.002083, 0.003333, 0.003333, 0.000335, 0.007143, 0.007143,
            0.005556, 0.003125, 0.007143, 0.008333, 0.007143, 0.007143, 0.008333, 0.008333,
            0.000335, 0.031250, 0.031250, 0.015625, 0.007812, 0.031250, 0.062500, 0.031250,
            0.031250, 0.062500, 0.062500, 0.000455, 0.000455, 0.000455, 0.000455, 0.000455,
            0.000455, 0.000455, 0.000455, 0.000455, 0.000455, 0.000455, 0.002551, 0.002551,
            0.002551, 0.002551, 0.002551, 0.002551, 0.002551, 0.002551, 0.002551, 0.002551,
            0.002551, 0.008929, 0.014654, 0.012241, 0.011161, 0.010455, 0.015352, 0.013951,
            0.012706, 0.014654, 0.020926, 0.017433,
        ];
        let matrices = DequantMatrices::new();
        let strategies = [
            AcStrategy::Dct,
            AcStrategy::Identity,
            AcStrategy::Dct2x2,
            AcStrategy::Dct4x4,
        ];
        let mut expected = expected.iter();
        for strategy in strategies {
            for c in 0..NUM_CHANNELS {
                let matrix = matrices.matrix(strategy, c);
                for j in (0..matrix.len()).step_by(matrix.len() / 10) {
                    let &value = expected.next().unwrap();
                    assert_almost_eq(matrix[j], value, 1e-5);
                }
            }
        }
        assert!(expected.next().is_none());
    }

    #[test]
    fn test_identity_special_positions() {
        let matrices = DequantMatrices::new();
        let id = matrices.matrix(AcStrategy::Identity, 0);
        assert_almost_eq(id[0], 1.0 / 280.0, 1e-7);
        assert_almost_eq(id[1], 1.0 / 3160.0, 1e-8);
        assert_almost_eq(id[8], 1.0 / 3160.0, 1e-8);
        assert_almost_eq(id[9], 1.0 / 3160.0, 1e-8);
        assert_almost_eq(id[63], 1.0 / 280.0, 1e-7);
    }

    #[test]
    fn test_tables_positive_and_reciprocal() {
        let matrices = DequantMatrices::new();
        for strategy in AcStrategy::ALL {
            for c in 0..NUM_CHANNELS {
                let matrix = matrices.matrix(strategy, c);
                let inv = matrices.inv_matrix(strategy, c);
                assert_eq!(matrix.len(), strategy.num_coefficients());
                assert_eq!(matrix.as_ptr() as usize % CACHE_ALIGNMENT, 0);
                assert_eq!(inv.as_ptr() as usize % CACHE_ALIGNMENT, 0);
                for (&m, &i) in matrix.iter().zip(inv) {
                    assert!(m > 0.0 && m.is_finite());
                    assert!((m * i - 1.0).abs() < 1e-5, "{strategy:?}: {m} * {i}");
                }
            }
        }
    }

    #[test]
    fn test_transposed_strategies_share_tables() {
        let matrices = DequantMatrices::new();
        let pairs = [
            (AcStrategy::Dct16x8, AcStrategy::Dct8x16),
            (AcStrategy::Dct32x8, AcStrategy::Dct8x32),
            (AcStrategy::Dct32x16, AcStrategy::Dct16x32),
            (AcStrategy::Dct4x8, AcStrategy::Dct8x4),
            (AcStrategy::Afv0, AcStrategy::Afv3),
        ];
        for (a, b) in pairs {
            assert_eq!(matrices.matrix(a, 1).as_ptr(), matrices.matrix(b, 1).as_ptr());
        }
        assert_eq!(
            matrices.slot_matrix(QuantTable::Dct8x32, 2),
            matrices.matrix(AcStrategy::Dct32x8, 2)
        );
    }

    #[test]
    fn test_dc_defaults() {
        let matrices = DequantMatrices::default();
        for c in 0..NUM_CHANNELS {
            assert_eq!(matrices.inv_dc_quant(c), INV_DC_QUANT[c]);
            assert_eq!(matrices.dc_quant(c) * matrices.inv_dc_quant(c), 1.0);
        }
    }

    #[test]
    fn test_default_section_is_one_bit() {
        let matrices = DequantMatrices::new();
        let mut writer = BitWriter::new();
        matrices.encode(&mut writer);
        matrices.encode_dc(&mut writer);
        assert_eq!(writer.bits_written(), 2);
    }

    #[test]
    fn test_invalid_weight_is_not_committed() {
        let mut matrices = DequantMatrices::new();
        let before = matrices.matrix(AcStrategy::Dct, 0).to_vec();
        let mut encodings = matrices.encodings().to_vec();
        encodings[0] = QuantEncoding::dct(DctQuantWeightParams::from_array(&[[1e9], [1.0], [1.0]]));
        assert_eq!(compute_tables(&encodings).unwrap_err(), DequantError::InvalidQuantTableWeight);

        let mut writer = BitWriter::new();
        write_encodings(&encodings, &mut writer);
        let buffer = writer.finish();
        let mut reader = BitReader::new(&buffer);
        assert_eq!(
            matrices.decode(&mut reader),
            Err(DequantError::InvalidQuantTableWeight)
        );
        assert_eq!(matrices.matrix(AcStrategy::Dct, 0), &before[..]);
        assert!(matrices.encodings().iter().all(QuantEncoding::is_default));
    }

    #[test]
    fn test_compute_reproduces_installed_tables() {
        let mut matrices = DequantMatrices::new();
        let mut encodings = matrices.encodings().to_vec();
        encodings[0] = QuantEncoding::dct(DctQuantWeightParams::from_array(&[
            [3000.0, -0.4, -0.2],
            [1000.0, -0.5, -0.1],
            [500.0, -0.3, -0.3],
        ]));
        matrices.set_custom(&encodings);
        let dct = matrices.matrix(AcStrategy::Dct, 2).to_vec();
        let wide = matrices.inv_matrix(AcStrategy::Dct16x16, 0).to_vec();

        matrices.compute().unwrap();
        assert!(same_bits(matrices.matrix(AcStrategy::Dct, 2), &dct));
        assert!(same_bits(matrices.inv_matrix(AcStrategy::Dct16x16, 0), &wide));
        assert_eq!(matrices.encodings(), &encodings[..]);
    }

    #[test]
    fn test_band_interpolation() {
        let bands = [1.0, 4.0, 16.0];
        assert_almost_eq(interpolate_vec(0.0, &bands), 1.0, 1e-6);
        assert_almost_eq(interpolate_vec(0.5, &bands), 2.0, 1e-6);
        assert_almost_eq(interpolate_vec(1.5, &bands), 8.0, 1e-5);
        assert_almost_eq(interpolate(1.0, 2.0, &bands), 4.0, 1e-5);
        assert_eq!(mult(0.5), 1.5);
        assert_eq!(mult(-1.0), 0.5);
    }

    #[test]
    fn test_matrices_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DequantMatrices>();
    }
}
