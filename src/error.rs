//! Error type shared by the generator, the IR arena and the optimizer pipeline.
//!
//! Pattern non-matches are never errors: optimizers report them as
//! `Ok(false)`. Everything in here is fatal for the method being processed.

use thiserror::Error;

use crate::types::StackCategory;

/// Builds a [`DecompileError::Inconsistent`] from a format string.
macro_rules! invariant {
    ($msg:expr) => {
        $crate::error::DecompileError::Inconsistent($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::DecompileError::Inconsistent(format!($fmt, $($arg)*))
    };
}

pub(crate) use invariant;

/// Fatal failures while building or rewriting the IR of one method.
#[derive(Debug, Error)]
pub enum DecompileError {
    /// An instruction popped more values than the simulated stack holds.
    #[error("operand stack underflow at instruction {position}")]
    StackUnderflow { position: usize },

    /// A value of one stack category was found where another was required.
    #[error("stack category mismatch at instruction {position}: expected {expected:?}, found {found:?}")]
    CategoryMismatch {
        position: usize,
        expected: StackCategory,
        found: StackCategory,
    },

    /// A load or `ret` referenced a local slot that holds no value.
    #[error("local slot {slot} is unresolved at instruction {position}")]
    UnresolvedLocal { slot: u16, position: usize },

    /// The tracked state disagrees with a declared frame.
    #[error("frame at instruction {position} disagrees with tracked state: {message}")]
    FrameMismatch { position: usize, message: String },

    /// Straight-line code resumed after goto/return/athrow without a frame.
    #[error("instruction {position} follows an unconditional transfer but has no frame")]
    MissingFrame { position: usize },

    /// A branch target was referenced but never defined.
    #[error("label {0} is referenced but never visited")]
    UndefinedLabel(u32),

    /// A label was placed on a second statement.
    #[error("label L{0} is already attached to a statement")]
    LabelAlreadyPlaced(u32),

    /// A label with live incoming jumps was about to be discarded.
    #[error("label L{0} still has incoming jumps and cannot be dropped")]
    LabelInUse(u32),

    /// Two identifiers of different categories were unified.
    #[error("cannot merge identifiers v{left} ({left_category:?}) and v{right} ({right_category:?})")]
    MergeCategory {
        left: u32,
        right: u32,
        left_category: StackCategory,
        right_category: StackCategory,
    },

    /// An optimizer matched its outer shape but met an interior node it does
    /// not know how to rewrite.
    #[error("{optimizer}: unexpected {found}")]
    UnexpectedShape {
        optimizer: &'static str,
        found: String,
    },

    /// A visitor callback received an opcode from another category.
    #[error("opcode {opcode:#04x} is not a valid {category} instruction")]
    InvalidOpcode { opcode: u8, category: &'static str },

    /// A field, method or type descriptor could not be parsed.
    #[error("malformed descriptor `{0}`")]
    Descriptor(String),

    /// The fixed-point driver exceeded its configured pass cap.
    #[error("optimizer did not reach a fixed point within {0} passes")]
    PassLimit(usize),

    /// The consistency checker found a broken IR invariant.
    #[error("IR consistency violation: {0}")]
    Inconsistent(String),

    /// A symbolic operand could not be resolved by the constant pool.
    #[cfg(feature = "bytecode")]
    #[error("constant pool entry #{index} is not a {expected}")]
    ConstantPool { index: u16, expected: &'static str },

    /// A branch, handler or frame offset points outside the code array.
    #[cfg(feature = "bytecode")]
    #[error("offset {target} referenced at {address} lies outside the code array")]
    CodeOffset { address: u32, target: i64 },

    /// The raw code array could not be decoded.
    #[cfg(feature = "bytecode")]
    #[error("failed to decode bytecode: {0}")]
    Decode(#[from] binrw::Error),
}

pub type Result<T, E = DecompileError> = std::result::Result<T, E>;
