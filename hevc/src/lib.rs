#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Parser for HEVC (ITU-T H.265) elementary streams. It stops at validated
//! syntax structures and byte offsets; no picture data is decoded.
//!
//! ### Bitstream Organization
//!
//! **External Structure**: NAL units delimited by start codes (Annex B) or
//! by big-endian length fields.
//! **Internal Structure**: a two byte NAL header followed by an RBSP with
//! emulation-prevention bytes inserted after every `00 00` run.
//!
//! ### Parameter Sets
//!
//! Slices reference a PPS, which references an SPS, which references a VPS.
//! The [`Parser`](process::parse::Parser) keeps every parsed set in a
//! [`ParameterSetStore`](process::store::ParameterSetStore) and resolves these
//! links by id.
//!
//! ## Quick Start
//!
//! 1. Extract NAL units using [`process::extract::Extractor`] or
//!    [`process::extract::annex_b_units`]
//! 2. Parse them using [`process::parse::Parser`]
//!
//! ```rust,no_run
//! use hevc::process::extract::{Extractor, Framing};
//! use hevc::process::parse::{ParsedNal, Parser};
//!
//! let mut extractor = Extractor::new(Framing::AnnexB);
//! let mut parser = Parser::default();
//!
//! extractor.push_bytes(&std::fs::read("stream.hevc")?);
//! extractor.finish();
//!
//! for nal in extractor {
//!     match nal {
//!         Ok(nal) => match parser.parse_nal(&nal.data, &nal.unit)? {
//!             ParsedNal::Sps(id) => {
//!                 if let Some(sps) = parser.store().sps(id) {
//!                     println!("{}x{}", sps.crop_rect_width, sps.crop_rect_height);
//!                 }
//!             }
//!             ParsedNal::Slice(slice) => println!("{} slice", slice.slice_type),
//!             _ => {}
//!         },
//!         Err(extract_error) => {
//!             // extraction resynchronises on the next start code
//!             eprintln!("NAL extraction error: {}", extract_error);
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// NAL unit extraction and parsing.
///
/// 1. **Extraction** ([`process::extract`]): finds NAL unit boundaries.
///
/// 2. **Parsing** ([`process::parse`]): decodes units into structures and
///    maintains the parameter set store ([`process::store`]).
pub mod process;

/// Syntax structures of the HEVC bitstream.
///
/// - **NAL header** ([`structs::nal`])
/// - **Parameter sets** ([`structs::vps`], [`structs::sps`], [`structs::pps`])
/// - **Nested syntax** ([`structs::profile_tier_level`], [`structs::hrd`],
///   [`structs::vui`], [`structs::scaling_list`], [`structs::short_term_rps`])
/// - **Slice segment header** ([`structs::slice`])
/// - **SEI messages** ([`structs::sei`])
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **RBSP** ([`utils::rbsp`]): Emulation-prevention removal
/// - **Scan orders** ([`utils::scan_order`]): Coefficient reordering
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
