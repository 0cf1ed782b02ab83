//! How the dequantization weights of one quantization table are described,
//! and the bitstream form of that description.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bit_io::{BitRead, BitWrite};
use crate::constants::{
    ALMOST_ZERO, CEIL_LOG2_NUM_PREDEFINED_TABLES, DCT_BLOCK_SIZE, LOG2_MAX_DISTANCE_BANDS,
    LOG2_MAX_RAW_DEN_SHIFT, LOG2_NUM_QUANT_MODES, MAX_DISTANCE_BANDS, MAX_RAW_DEN_SHIFT,
    NUM_CHANNELS, NUM_PREDEFINED_TABLES, RAW_TABLE_COUNT_BITS, RAW_TABLE_ENTRY_BITS,
};
use crate::error::{DequantError, Result};

/// Wire tag of a [`QuantEncoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum QuantMode {
    Library = 0,
    Identity = 1,
    Dct2 = 2,
    Dct4 = 3,
    Dct4x8 = 4,
    Afv = 5,
    Dct = 6,
    Raw = 7,
}

/// Radial weight curve: per channel, up to [`MAX_DISTANCE_BANDS`] control
/// points spread between the DC coefficient and the highest frequency. The
/// first value is the weight at DC; each following value `v` scales the
/// previous band by `1 + v` (`v > 0`) or `1 / (1 - v)` (`v <= 0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DctQuantWeightParams {
    num_distance_bands: usize,
    distance_bands: [[f32; MAX_DISTANCE_BANDS]; NUM_CHANNELS],
}

impl DctQuantWeightParams {
    pub fn from_array<const N: usize>(values: &[[f32; N]; NUM_CHANNELS]) -> Self {
        assert!(
            (1..=MAX_DISTANCE_BANDS).contains(&N),
            "{N} distance bands, expected 1..={MAX_DISTANCE_BANDS}"
        );
        let mut distance_bands = [[0.0; MAX_DISTANCE_BANDS]; NUM_CHANNELS];
        for (bands, values) in distance_bands.iter_mut().zip(values) {
            bands[..N].copy_from_slice(values);
        }
        Self {
            num_distance_bands: N,
            distance_bands,
        }
    }

    pub fn num_distance_bands(&self) -> usize {
        self.num_distance_bands
    }

    /// Control points of channel `c`.
    pub fn distance_bands(&self, c: usize) -> &[f32] {
        &self.distance_bands[c][..self.num_distance_bands]
    }

    fn encode<W: BitWrite>(&self, writer: &mut W) {
        writer.write_bits(
            (self.num_distance_bands - 1) as u32,
            LOG2_MAX_DISTANCE_BANDS,
        );
        for c in 0..NUM_CHANNELS {
            for &band in self.distance_bands(c) {
                writer.write_f32(band);
            }
        }
    }

    fn decode<R: BitRead>(reader: &mut R) -> Result<Self> {
        let num_distance_bands = reader.read_bits(LOG2_MAX_DISTANCE_BANDS)? as usize + 1;
        let mut distance_bands = [[0.0; MAX_DISTANCE_BANDS]; NUM_CHANNELS];
        for bands in distance_bands.iter_mut() {
            for band in bands[..num_distance_bands].iter_mut() {
                *band = read_finite_f32(reader)?;
            }
            if bands[0] < ALMOST_ZERO {
                return Err(DequantError::QuantFactorTooSmall);
            }
        }
        Ok(Self {
            num_distance_bands,
            distance_bands,
        })
    }
}

/// Description of the dequantization weights of one quantization table.
///
/// Everything except [`QuantEncoding::Raw`] is fixed size; `Raw` owns its
/// explicit table, and cloning copies it.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantEncoding {
    /// Compiled-in table number `predefined`.
    Library { predefined: u8 },
    /// Identity transform: per channel, the weight of every coefficient, of
    /// (0, 1)/(1, 0), and of (1, 1).
    Identity { xyb_weights: [[f32; 3]; NUM_CHANNELS] },
    /// 2x2 DCT: weights of the six frequency groups from lowest to highest.
    Dct2 { xyb_weights: [[f32; 6]; NUM_CHANNELS] },
    /// 4x4 DCT: band curve plus divisors for (0, 1)/(1, 0) and (1, 1).
    Dct4 {
        params: DctQuantWeightParams,
        xyb_mul: [[f32; 2]; NUM_CHANNELS],
    },
    /// 4x8 DCT: band curve plus a divisor for coefficient (1, 0).
    Dct4x8 {
        params: DctQuantWeightParams,
        xyb_mul: [f32; NUM_CHANNELS],
    },
    /// AFV: curves for the 4x8 and 4x4 parts. Per channel, `weights[0..2]`
    /// are (0, 1)/(1, 0), `weights[2..5]` the AFV corner (0, 2), (2, 0), (2, 2)
    /// and `weights[5..9]` a 4-band curve for the remaining AFV coefficients.
    Afv {
        params4x8: DctQuantWeightParams,
        params4x4: DctQuantWeightParams,
        weights: [[f32; 9]; NUM_CHANNELS],
    },
    /// Any DCT size, fully described by the band curve.
    Dct { params: DctQuantWeightParams },
    /// Explicit table, like a JPEG DQT, for all three channels in order. The
    /// step of each entry is `entry * 2^qtable_den_shift / (8 * 255)`.
    Raw {
        qtable: Vec<i32>,
        qtable_den_shift: u8,
    },
}

impl QuantEncoding {
    pub fn library(predefined: u8) -> Self {
        assert!(
            (predefined as usize) < NUM_PREDEFINED_TABLES,
            "predefined table {predefined} does not exist"
        );
        QuantEncoding::Library { predefined }
    }

    pub fn identity(xyb_weights: [[f32; 3]; NUM_CHANNELS]) -> Self {
        QuantEncoding::Identity { xyb_weights }
    }

    pub fn dct2(xyb_weights: [[f32; 6]; NUM_CHANNELS]) -> Self {
        QuantEncoding::Dct2 { xyb_weights }
    }

    pub fn dct4(params: DctQuantWeightParams, xyb_mul: [[f32; 2]; NUM_CHANNELS]) -> Self {
        QuantEncoding::Dct4 { params, xyb_mul }
    }

    pub fn dct4x8(params: DctQuantWeightParams, xyb_mul: [f32; NUM_CHANNELS]) -> Self {
        QuantEncoding::Dct4x8 { params, xyb_mul }
    }

    pub fn dct(params: DctQuantWeightParams) -> Self {
        QuantEncoding::Dct { params }
    }

    pub fn afv(
        params4x8: DctQuantWeightParams,
        params4x4: DctQuantWeightParams,
        weights: [[f32; 9]; NUM_CHANNELS],
    ) -> Self {
        QuantEncoding::Afv {
            params4x8,
            params4x4,
            weights,
        }
    }

    /// Copies `qtable`. Entries must fit the 16-bit wire form.
    pub fn raw(qtable: &[i32], qtable_den_shift: u8) -> Self {
        assert!(
            qtable_den_shift <= MAX_RAW_DEN_SHIFT,
            "raw table shift {qtable_den_shift} exceeds {MAX_RAW_DEN_SHIFT}"
        );
        assert!(
            qtable.iter().all(|&q| (1..=u16::MAX as i32).contains(&q)),
            "raw table entries must be in 1..=65535"
        );
        QuantEncoding::Raw {
            qtable: qtable.to_vec(),
            qtable_den_shift,
        }
    }

    pub fn mode(&self) -> QuantMode {
        match self {
            QuantEncoding::Library { .. } => QuantMode::Library,
            QuantEncoding::Identity { .. } => QuantMode::Identity,
            QuantEncoding::Dct2 { .. } => QuantMode::Dct2,
            QuantEncoding::Dct4 { .. } => QuantMode::Dct4,
            QuantEncoding::Dct4x8 { .. } => QuantMode::Dct4x8,
            QuantEncoding::Afv { .. } => QuantMode::Afv,
            QuantEncoding::Dct { .. } => QuantMode::Dct,
            QuantEncoding::Raw { .. } => QuantMode::Raw,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, QuantEncoding::Library { predefined: 0 })
    }

    pub fn encode<W: BitWrite>(&self, writer: &mut W) {
        writer.write_bits(u8::from(self.mode()) as u32, LOG2_NUM_QUANT_MODES);
        match self {
            QuantEncoding::Library { predefined } => {
                writer.write_bits(*predefined as u32, CEIL_LOG2_NUM_PREDEFINED_TABLES);
            }
            QuantEncoding::Identity { xyb_weights } => write_weights(writer, xyb_weights),
            QuantEncoding::Dct2 { xyb_weights } => write_weights(writer, xyb_weights),
            QuantEncoding::Dct4 { params, xyb_mul } => {
                write_weights(writer, xyb_mul);
                params.encode(writer);
            }
            QuantEncoding::Dct4x8 { params, xyb_mul } => {
                for &mul in xyb_mul {
                    writer.write_f32(mul);
                }
                params.encode(writer);
            }
            QuantEncoding::Afv {
                params4x8,
                params4x4,
                weights,
            } => {
                write_weights(writer, weights);
                params4x8.encode(writer);
                params4x4.encode(writer);
            }
            QuantEncoding::Dct { params } => params.encode(writer),
            QuantEncoding::Raw {
                qtable,
                qtable_den_shift,
            } => {
                writer.write_bits(*qtable_den_shift as u32, LOG2_MAX_RAW_DEN_SHIFT);
                writer.write_bits(qtable.len() as u32, RAW_TABLE_COUNT_BITS);
                for &q in qtable {
                    writer.write_bits(q as u32, RAW_TABLE_ENTRY_BITS);
                }
            }
        }
    }

    /// Reads the encoding of a table covering `required_size` 8x8 blocks.
    /// Every field is validated: the stream is untrusted.
    pub fn decode<R: BitRead>(reader: &mut R, required_size: usize) -> Result<Self> {
        let bits = reader.read_bits(LOG2_NUM_QUANT_MODES)? as u8;
        let mode = QuantMode::try_from(bits).map_err(|_| DequantError::InvalidQuantMode)?;

        let single_block_only = matches!(
            mode,
            QuantMode::Identity
                | QuantMode::Dct2
                | QuantMode::Dct4
                | QuantMode::Dct4x8
                | QuantMode::Afv
        );
        if single_block_only && required_size != 1 {
            return Err(DequantError::InvalidQuantEncoding);
        }

        let encoding = match mode {
            QuantMode::Library => {
                let predefined = reader.read_bits(CEIL_LOG2_NUM_PREDEFINED_TABLES)? as usize;
                if predefined >= NUM_PREDEFINED_TABLES {
                    return Err(DequantError::InvalidPredefinedTable);
                }
                QuantEncoding::Library {
                    predefined: predefined as u8,
                }
            }
            QuantMode::Identity => QuantEncoding::Identity {
                xyb_weights: read_weights(reader, true)?,
            },
            QuantMode::Dct2 => QuantEncoding::Dct2 {
                xyb_weights: read_weights(reader, true)?,
            },
            QuantMode::Dct4 => {
                let xyb_mul = read_weights(reader, true)?;
                let params = DctQuantWeightParams::decode(reader)?;
                QuantEncoding::Dct4 { params, xyb_mul }
            }
            QuantMode::Dct4x8 => {
                let mut xyb_mul = [0.0; NUM_CHANNELS];
                for mul in xyb_mul.iter_mut() {
                    *mul = read_nonzero_f32(reader)?;
                }
                let params = DctQuantWeightParams::decode(reader)?;
                QuantEncoding::Dct4x8 { params, xyb_mul }
            }
            QuantMode::Afv => {
                // Band multipliers may legitimately be zero or negative.
                let weights = read_weights(reader, false)?;
                let params4x8 = DctQuantWeightParams::decode(reader)?;
                let params4x4 = DctQuantWeightParams::decode(reader)?;
                QuantEncoding::Afv {
                    params4x8,
                    params4x4,
                    weights,
                }
            }
            QuantMode::Dct => QuantEncoding::Dct {
                params: DctQuantWeightParams::decode(reader)?,
            },
            QuantMode::Raw => {
                let qtable_den_shift = reader.read_bits(LOG2_MAX_RAW_DEN_SHIFT)? as u8;
                let count = reader.read_bits(RAW_TABLE_COUNT_BITS)? as usize;
                if count != NUM_CHANNELS * required_size * DCT_BLOCK_SIZE {
                    return Err(DequantError::InvalidRawQuantTable);
                }
                let mut qtable = Vec::with_capacity(count);
                for _ in 0..count {
                    let q = reader.read_bits(RAW_TABLE_ENTRY_BITS)? as i32;
                    if q <= 0 {
                        return Err(DequantError::InvalidRawQuantTable);
                    }
                    qtable.push(q);
                }
                QuantEncoding::Raw {
                    qtable,
                    qtable_den_shift,
                }
            }
        };
        Ok(encoding)
    }
}

fn write_weights<W: BitWrite, const N: usize>(writer: &mut W, weights: &[[f32; N]; NUM_CHANNELS]) {
    for row in weights {
        for &w in row {
            writer.write_f32(w);
        }
    }
}

fn read_weights<R: BitRead, const N: usize>(
    reader: &mut R,
    nonzero: bool,
) -> Result<[[f32; N]; NUM_CHANNELS]> {
    let mut weights = [[0.0; N]; NUM_CHANNELS];
    for row in weights.iter_mut() {
        for w in row.iter_mut() {
            *w = if nonzero {
                read_nonzero_f32(reader)?
            } else {
                read_finite_f32(reader)?
            };
        }
    }
    Ok(weights)
}

fn read_finite_f32<R: BitRead>(reader: &mut R) -> Result<f32> {
    let value = reader.read_f32()?;
    if !value.is_finite() {
        return Err(DequantError::NonFiniteParameter);
    }
    Ok(value)
}

fn read_nonzero_f32<R: BitRead>(reader: &mut R) -> Result<f32> {
    let value = read_finite_f32(reader)?;
    if value.abs() < ALMOST_ZERO {
        return Err(DequantError::QuantFactorTooSmall);
    }
    Ok(value)
}
