use thiserror::Error;

use crate::time::Rational;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChartError {
    #[error("Invalid time point: {0}")]
    InvalidTimePoint(String),

    #[error("Invalid time signature: {upper}/{lower}")]
    InvalidTimeSignature { upper: u32, lower: u32 },

    #[error("Duration cannot be negative (got {0})")]
    NegativeDuration(Rational),

    #[error("Laser position out of range (got {0})")]
    LaserOutOfRange(Rational),

    #[error("KSH file version too old (got {0})")]
    UnsupportedVersion(String),

    #[error("Missing bar line separator: {0}")]
    MissingSeparator(String),

    #[error("Malformed VOX document: {0}")]
    MalformedVox(String),

    #[error("Invalid effect parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown effect type: {0}")]
    UnknownEffectType(String),
}
