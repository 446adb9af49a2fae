use std::fmt::Display;
use std::io;

use crate::process::store::ParameterSetKind;
use crate::structs::nal::NalUnitType;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Coarse classification of every failure the library reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or inconsistent syntax, including reads past the end of the payload.
    BrokenData,
    /// Reference to a parameter set id that has not been parsed.
    BrokenLink,
    /// Internal failure or unsupported configuration.
    Error,
    /// No start code was found.
    NoNal,
    /// A start code was found but the unit could not be confirmed complete.
    NoNalEnd,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BrokenData => write!(f, "broken data"),
            ErrorKind::BrokenLink => write!(f, "broken link"),
            ErrorKind::Error => write!(f, "error"),
            ErrorKind::NoNal => write!(f, "no NAL unit"),
            ErrorKind::NoNalEnd => write!(f, "incomplete NAL unit"),
        }
    }
}

/// Classifies an error returned by any parse entry point.
///
/// Walks the whole cause chain, so context added by callers does not hide
/// the original error.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ParseError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<ExtractError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return match e.kind() {
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => ErrorKind::BrokenData,
                _ => ErrorKind::Error,
            };
        }
        if cause.is::<SyntaxError>()
            || cause.is::<VpsError>()
            || cause.is::<SpsError>()
            || cause.is::<PpsError>()
            || cause.is::<RpsError>()
            || cause.is::<ScalingListError>()
            || cause.is::<SliceError>()
            || cause.is::<SeiError>()
        {
            return ErrorKind::BrokenData;
        }
    }

    ErrorKind::Error
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No start code found")]
    NoNal,

    #[error("NAL unit is not terminated within the buffer")]
    NoNalEnd,

    #[error("forbidden_zero_bit is set in the NAL unit header at offset {offset}")]
    ForbiddenZeroBit { offset: usize, resume: usize },

    #[error("NAL unit at offset {offset} is too short: {size} bytes")]
    TooShort {
        offset: usize,
        size: usize,
        resume: usize,
    },

    #[error("Unsupported NAL length field size: {0} (expected 1, 2 or 4)")]
    InvalidLengthSize(u8),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::NoNal => ErrorKind::NoNal,
            ExtractError::NoNalEnd => ErrorKind::NoNalEnd,
            ExtractError::ForbiddenZeroBit { .. } | ExtractError::TooShort { .. } => {
                ErrorKind::BrokenData
            }
            ExtractError::InvalidLengthSize(_) => ErrorKind::Error,
        }
    }

    /// Buffer offset from which scanning can continue after a corrupt unit.
    pub fn resume_offset(&self) -> Option<usize> {
        match self {
            ExtractError::ForbiddenZeroBit { resume, .. } | ExtractError::TooShort { resume, .. } => {
                Some(*resume)
            }
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{kind} {id} has not been parsed")]
    MissingParameterSet { kind: ParameterSetKind, id: u32 },

    #[error("{kind} id out of range: {id} > {max}")]
    IdOutOfRange {
        kind: ParameterSetKind,
        id: u32,
        max: u32,
    },

    #[error("No SPS is active")]
    NoActiveSps,

    #[error("Expected {expected} NAL unit, found {found}")]
    UnexpectedNalType {
        expected: &'static str,
        found: NalUnitType,
    },

    #[error("NAL unit [{offset}, {end}) lies outside a buffer of {len} bytes")]
    OutOfBuffer { offset: usize, end: usize, len: usize },

    #[error("NAL unit has not been validated by the scanner")]
    InvalidNal,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MissingParameterSet { .. } | ParseError::NoActiveSps => {
                ErrorKind::BrokenLink
            }
            ParseError::IdOutOfRange { .. } => ErrorKind::BrokenData,
            ParseError::UnexpectedNalType { .. }
            | ParseError::OutOfBuffer { .. }
            | ParseError::InvalidNal => ErrorKind::Error,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum VpsError {
    #[error("vps_reserved_0xffff_16bits must be 0xFFFF. Read {0:#06X}")]
    Reserved16Bits(u16),

    #[error("vps_base_layer_internal_flag and vps_base_layer_available_flag must be set for single-layer streams")]
    BaseLayerFlags,
}

#[derive(thiserror::Error, Debug)]
pub enum SpsError {
    #[error("CtbLog2SizeY must be between 4 and 6. Read {0}")]
    InvalidCtbSize(u32),

    #[error("Picture dimensions must be non-zero: {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("pic_{axis}_in_luma_samples = {value} is not a multiple of MinCbSizeY = {min_cb_size}")]
    UnalignedDimension {
        axis: &'static str,
        value: u32,
        min_cb_size: u32,
    },

    #[error("Conformance window ({offsets}) exceeds the {width}x{height} picture")]
    InvalidConformanceWindow {
        offsets: String,
        width: u32,
        height: u32,
    },

    #[error("sps_max_num_reorder_pics[{index}] = {reorder} exceeds sps_max_dec_pic_buffering_minus1 = {dpb}")]
    ReorderExceedsDpb { index: usize, reorder: u32, dpb: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum PpsError {
    #[error("Explicit tile {axis} sum to {sum}, which leaves no CTBs of {total} for the last one")]
    InvalidTileLayout {
        axis: &'static str,
        sum: u32,
        total: u32,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RpsError {
    #[error("Short-term RPS {idx} predicts from missing set {ref_idx}")]
    MissingReference { idx: usize, ref_idx: usize },

    #[error("Short-term RPS {idx} holds {count} pictures, at most 16 are allowed")]
    TooManyPictures { idx: usize, count: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ScalingListError {
    #[error("Scaling list coefficient {coef} of sizeId {size_id} matrixId {matrix_id} is zero")]
    ZeroCoefficient {
        size_id: usize,
        matrix_id: usize,
        coef: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SliceError {
    #[error("Invalid slice_type: {0}")]
    InvalidSliceType(u32),

    #[error("slice_segment_address {address} exceeds PicSizeInCtbsY = {size}")]
    AddressOutOfRange { address: u32, size: u32 },

    #[error("Slice references short-term RPS {idx} but the SPS holds {count}")]
    MissingShortTermRps { idx: usize, count: usize },

    #[error("Slice references long-term picture {idx} but the SPS holds {count}")]
    MissingLongTermPicture { idx: usize, count: usize },

    #[error("Too many long-term pictures: {0} > 32")]
    TooManyLongTermPictures(u32),

    #[error("alignment_bit_equal_to_one is zero")]
    AlignmentBit,

    #[error("alignment_bit_equal_to_zero is non-zero")]
    AlignmentZeroBits,
}

#[derive(thiserror::Error, Debug)]
pub enum SeiError {
    #[error("SEI payload type {payload_type} claims {size} bytes, only {available} remain")]
    PayloadOverflow {
        payload_type: u32,
        size: usize,
        available: usize,
    },

    #[error("SEI message header ends prematurely")]
    TruncatedHeader,
}

#[test]
fn classify_errors() {
    use anyhow::anyhow;

    let missing = anyhow!(ParseError::MissingParameterSet {
        kind: ParameterSetKind::Pps,
        id: 3
    });
    assert_eq!(error_kind(&missing), ErrorKind::BrokenLink);

    let eof = anyhow::Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"))
        .context("reading sps");
    assert_eq!(error_kind(&eof), ErrorKind::BrokenData);

    let range = anyhow!(SyntaxError::OutOfRange {
        field: "chroma_format_idc",
        value: 7,
        min: 0,
        max: 3
    });
    assert_eq!(error_kind(&range), ErrorKind::BrokenData);

    assert_eq!(error_kind(&anyhow!("something else")), ErrorKind::Error);
    assert_eq!(ExtractError::InvalidLengthSize(3).kind(), ErrorKind::Error);
}
