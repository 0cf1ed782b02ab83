//! Dequantization matrices and cache-aligned image planes for a block-transform
//! image codec.
//!
//! [`DequantMatrices`] turns compact [`QuantEncoding`] descriptions into dense
//! per-strategy tables that transform kernels multiply coefficients with, and
//! reads/writes those descriptions through the [`BitRead`]/[`BitWrite`] traits.
//! [`Plane`] and [`Image3`] are the padded, aligned buffers the rest of the
//! pipeline works on.

pub mod ac_strategy;
pub mod aligned;
pub mod bit_io;
pub mod constants;
pub mod error;
pub mod image;
pub mod image_ops;
pub mod quant_encoding;
pub mod quant_weights;

pub use ac_strategy::AcStrategy;
pub use aligned::{bytes_per_row, vector_size};
pub use bit_io::{BitRead, BitReader, BitWrite, BitWriter};
pub use error::DequantError;
pub use image::{
    Image3, Image3B, Image3D, Image3F, Image3I, Image3S, ImageB, ImageD, ImageF, ImageI, ImageS,
    ImageU, Plane, Rect,
};
pub use quant_encoding::{DctQuantWeightParams, QuantEncoding, QuantMode};
pub use quant_weights::{DequantMatrices, QuantTable};
