//! Block-transform strategies a kernel can ask dequantization tables for.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Transform applied to one group of 8x8 blocks. Names are `DCT{rows}X{cols}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AcStrategy {
    Dct = 0,
    Identity = 1,
    Dct2x2 = 2,
    Dct4x4 = 3,
    Dct16x16 = 4,
    Dct32x32 = 5,
    Dct16x8 = 6,
    Dct8x16 = 7,
    Dct32x8 = 8,
    Dct8x32 = 9,
    Dct32x16 = 10,
    Dct16x32 = 11,
    Dct4x8 = 12,
    Dct8x4 = 13,
    Afv0 = 14,
    Afv1 = 15,
    Afv2 = 16,
    Afv3 = 17,
}

impl AcStrategy {
    pub const NUM_VALID_STRATEGIES: usize = 18;

    pub const ALL: [AcStrategy; Self::NUM_VALID_STRATEGIES] = [
        AcStrategy::Dct,
        AcStrategy::Identity,
        AcStrategy::Dct2x2,
        AcStrategy::Dct4x4,
        AcStrategy::Dct16x16,
        AcStrategy::Dct32x32,
        AcStrategy::Dct16x8,
        AcStrategy::Dct8x16,
        AcStrategy::Dct32x8,
        AcStrategy::Dct8x32,
        AcStrategy::Dct32x16,
        AcStrategy::Dct16x32,
        AcStrategy::Dct4x8,
        AcStrategy::Dct8x4,
        AcStrategy::Afv0,
        AcStrategy::Afv1,
        AcStrategy::Afv2,
        AcStrategy::Afv3,
    ];

    /// Number of 8x8 blocks covered horizontally.
    pub fn covered_blocks_x(self) -> usize {
        match self {
            AcStrategy::Dct16x16 | AcStrategy::Dct8x16 | AcStrategy::Dct32x16 => 2,
            AcStrategy::Dct32x32 | AcStrategy::Dct8x32 | AcStrategy::Dct16x32 => 4,
            _ => 1,
        }
    }

    /// Number of 8x8 blocks covered vertically.
    pub fn covered_blocks_y(self) -> usize {
        match self {
            AcStrategy::Dct16x16 | AcStrategy::Dct16x8 | AcStrategy::Dct16x32 => 2,
            AcStrategy::Dct32x32 | AcStrategy::Dct32x8 | AcStrategy::Dct32x16 => 4,
            _ => 1,
        }
    }

    /// Number of coefficients the transform produces.
    pub fn num_coefficients(self) -> usize {
        self.covered_blocks_x() * self.covered_blocks_y() * crate::constants::DCT_BLOCK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_ids_roundtrip() {
        for (i, strategy) in AcStrategy::ALL.iter().enumerate() {
            assert_eq!(u8::from(*strategy) as usize, i);
            assert_eq!(AcStrategy::try_from(i as u8).unwrap(), *strategy);
        }
        assert!(AcStrategy::try_from(18u8).is_err());
    }

    #[test]
    fn test_transposed_pairs_cover_same_area() {
        let pairs = [
            (AcStrategy::Dct16x8, AcStrategy::Dct8x16),
            (AcStrategy::Dct32x8, AcStrategy::Dct8x32),
            (AcStrategy::Dct32x16, AcStrategy::Dct16x32),
            (AcStrategy::Dct4x8, AcStrategy::Dct8x4),
        ];
        for (a, b) in pairs {
            assert_eq!(a.covered_blocks_x(), b.covered_blocks_y());
            assert_eq!(a.covered_blocks_y(), b.covered_blocks_x());
            assert_eq!(a.num_coefficients(), b.num_coefficients());
        }
        assert_eq!(AcStrategy::Dct32x32.num_coefficients(), 1024);
    }
}
