use thiserror::Error;

/// Recoverable failures. Anything raised here comes from untrusted input
/// (a corrupted or adversarial bitstream) or from caller-supplied buffers;
/// broken invariants inside the crate panic instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequantError {
    #[error("Need more data")]
    NeedMoreData = 1,
    #[error("Invalid data")]
    InvalidData = 2,
    #[error("Invalid quantization mode")]
    InvalidQuantMode = 3,
    #[error("Quantization mode not allowed for this table size")]
    InvalidQuantEncoding = 4,
    #[error("Invalid predefined quantization table")]
    InvalidPredefinedTable = 5,
    #[error("Quantization factor too small")]
    QuantFactorTooSmall = 6,
    #[error("Invalid distance band")]
    InvalidDistanceBand = 7,
    #[error("Non-finite quantization parameter")]
    NonFiniteParameter = 8,
    #[error("Invalid raw quantization table")]
    InvalidRawQuantTable = 9,
    #[error("Quantization table weight out of range")]
    InvalidQuantTableWeight = 10,
    #[error("Invalid DC quantization factor")]
    InvalidDcQuant = 11,

    // Logic errors
    #[error("Invalid argument size")]
    InvalidArgumentSize = 101,
    #[error("Invalid argument stride")]
    InvalidArgumentStride = 102,
}

pub type Result<T> = std::result::Result<T, DequantError>;
