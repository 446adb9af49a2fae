//! Utility functions and supporting infrastructure.
//!
//! Provides bit-level reading, RBSP extraction, coefficient scan orders and
//! the error types shared by all parsers.

pub mod bitstream_io;
pub mod errors;
pub mod rbsp;
pub mod scan_order;
