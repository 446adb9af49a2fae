//! Syntax structures of the HEVC bitstream.
//!
//! Each structure decodes itself from a [`BsIoSliceReader`](crate::utils::bitstream_io::BsIoSliceReader)
//! positioned at the start of its syntax, following the clause of ITU-T H.265
//! named in the module docs.

/// Upper bound of `sps_max_sub_layers_minus1 + 1`, including the reserved value.
pub const MAX_SUB_LAYERS: usize = 8;

pub mod hrd;
pub mod nal;
pub mod pps;
pub mod profile_tier_level;
pub mod scaling_list;
pub mod sei;
pub mod short_term_rps;
pub mod slice;
pub mod sps;
pub mod vps;
pub mod vui;
