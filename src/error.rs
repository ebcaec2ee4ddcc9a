//! Error kinds surfaced by the engine.
//!
//! The three enums are deliberately disjoint: [`DecodeError`] is only ever
//! produced from untrusted bytes, while [`SchemaError`] and [`ViewError`]
//! indicate that local code violated a contract. Callers can therefore
//! score peers on `DecodeError` without conflating it with local bugs.

use thiserror::Error;

use crate::gindex::GeneralizedIndex;

/// Invalid parameters passed to a schema constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unsupported scalar bit width {bits}, expected one of 8, 16, 32, 64, 128, 256")]
    UnsupportedBitWidth { bits: u16 },

    #[error("{kind} length must be positive")]
    ZeroLength { kind: &'static str },

    #[error("container must declare at least one field")]
    EmptyContainer,

    #[error("duplicate container field name `{name}`")]
    DuplicateField { name: String },

    #[error("union must declare at least one variant")]
    EmptyUnion,

    #[error("union declares {count} variants, at most {max} are allowed")]
    TooManyVariants { count: usize, max: usize },

    #[error("union `None` variant is only allowed at selector 0, found at {selector}")]
    MisplacedNoneVariant { selector: usize },

    #[error("union with a single variant cannot use the `None` variant")]
    NoneOnlyUnion,

    #[error("capacity needs a tree of depth {depth}, at most {max} is supported")]
    CapacityTooLarge { depth: u32, max: u32 },

    #[error("serialized size does not fit in memory")]
    SizeOverflow,
}

/// Malformed input encountered while decoding bytes.
///
/// Every variant here is attributable to the producer of the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input of {len} bytes is shorter than the required {expected}")]
    TruncatedInput { len: usize, expected: usize },

    #[error("offset {offset} is invalid: {reason}")]
    InvalidOffset { offset: usize, reason: &'static str },

    #[error("{remaining} unread bytes remain after decoding")]
    TrailingBytes { remaining: usize },

    #[error("decoded length {len} exceeds the maximum of {max}")]
    LengthExceedsMax { len: u64, max: u64 },

    #[error("bitlist encoding is missing its sentinel bit")]
    InvalidBitlistEncoding,

    #[error("union selector {selector} is out of range for {variants} variants")]
    UnionSelectorOutOfRange { selector: u32, variants: usize },

    #[error("byte {byte:#04x} is not a valid boolean")]
    InvalidBoolean { byte: u8 },

    #[error("bits beyond the declared bitvector length {length} are set")]
    NonZeroPadding { length: u64 },
}

/// Contract violations while building, reading or updating a view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("index {index} is out of bounds (bound {bound})")]
    IndexOutOfBounds { index: u64, bound: u64 },

    #[error("generalized index {gindex} reaches below the tree")]
    GindexOutOfBounds { gindex: GeneralizedIndex },

    #[error("length {len} exceeds the maximum of {max}")]
    LengthExceedsMax { len: u64, max: u64 },

    #[error("union selector {selector} is out of range for {variants} variants")]
    UnionSelectorOutOfRange { selector: u32, variants: usize },

    #[error("value does not match schema: expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("container has no field named `{name}`")]
    UnknownField { name: String },

    #[error("{kind} has no child elements")]
    NotComposite { kind: &'static str },

    #[error("child view schema does not match the declared field schema")]
    SchemaMismatch,
}
