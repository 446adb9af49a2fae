//! scaling_list_data() syntax (7.3.4).
//!
//! Coefficients are kept in the up-right diagonal order in which they are
//! coded. Use the `*_raster` accessors or [`crate::utils::scan_order`] to
//! obtain other orders.

use anyhow::{Result, anyhow};
use log::Level::Warn;
use log::trace;

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ScalingListError;
use crate::utils::scan_order::{raster_from_upright_diagonal_4x4, raster_from_upright_diagonal_8x8};

/// Table 7-6, intra matrices (matrixId 0..=2) of 8x8 and larger.
pub const DEFAULT_INTRA_8X8: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 16, 17, 16, 17, 18, 17, 18, 18, 17, 18, 21, 19, 20,
    21, 20, 19, 21, 24, 22, 22, 24, 24, 22, 22, 24, 25, 25, 27, 30, 27, 25, 25, 29, 31, 35, 35, 31,
    29, 36, 41, 44, 41, 36, 47, 54, 54, 47, 65, 70, 65, 88, 88, 115,
];

/// Table 7-6, inter matrices (matrixId 3..=5) of 8x8 and larger.
pub const DEFAULT_INTER_8X8: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 17, 17, 17, 17, 18, 18, 18, 18, 18, 18, 20, 20, 20,
    20, 20, 20, 20, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 28, 28, 28, 28, 28,
    28, 33, 33, 33, 33, 33, 41, 41, 41, 41, 54, 54, 54, 71, 71, 91,
];

const DEFAULT_DC: i16 = 16;

#[cfg(feature = "serde")]
fn serialize_lists<S: serde::Serializer>(
    lists: &[[u8; 64]; 6],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;

    let mut seq = serializer.serialize_seq(Some(lists.len()))?;
    for list in lists {
        seq.serialize_element(list.as_slice())?;
    }
    seq.end()
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScalingList {
    /// `scaling_list_dc_coef_minus8 + 8` for sizeId 2, per matrixId.
    pub dc_coef_16x16: [i16; 6],
    /// `scaling_list_dc_coef_minus8 + 8` for sizeId 3, per matrixId.
    pub dc_coef_32x32: [i16; 6],
    pub scaling_lists_4x4: [[u8; 16]; 6],
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_lists"))]
    pub scaling_lists_8x8: [[u8; 64]; 6],
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_lists"))]
    pub scaling_lists_16x16: [[u8; 64]; 6],
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_lists"))]
    pub scaling_lists_32x32: [[u8; 64]; 6],
}

impl Default for ScalingList {
    /// Flat 4x4 lists and the Table 7-6 matrices for larger sizes.
    fn default() -> Self {
        let larger = std::array::from_fn(|matrix_id| default_8x8(matrix_id));

        Self {
            dc_coef_16x16: [DEFAULT_DC; 6],
            dc_coef_32x32: [DEFAULT_DC; 6],
            scaling_lists_4x4: [[16; 16]; 6],
            scaling_lists_8x8: larger,
            scaling_lists_16x16: larger,
            scaling_lists_32x32: larger,
        }
    }
}

fn default_8x8(matrix_id: usize) -> [u8; 64] {
    if matrix_id < 3 {
        DEFAULT_INTRA_8X8
    } else {
        DEFAULT_INTER_8X8
    }
}

impl ScalingList {
    pub fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut sl = Self::default();

        for size_id in 0..4 {
            let step = if size_id == 3 { 3 } else { 1 };

            for matrix_id in (0..6).step_by(step) {
                let scaling_list_pred_mode_flag = reader.get()?;

                if !scaling_list_pred_mode_flag {
                    let delta = reader.get_ue_max(
                        "scaling_list_pred_matrix_id_delta",
                        (matrix_id / step) as u32,
                    )? as usize;

                    if delta == 0 {
                        sl.set_default(size_id, matrix_id);
                    } else {
                        sl.copy(size_id, matrix_id - delta * step, matrix_id);
                    }
                    continue;
                }

                let coef_num = 64.min(1 << (4 + (size_id << 1)));
                let mut next_coef = 8i32;

                if size_id > 1 {
                    let dc_coef_minus8 =
                        reader.get_se_range("scaling_list_dc_coef_minus8", -7, 247)?;
                    next_coef = dc_coef_minus8 + 8;
                    sl.set_dc(size_id, matrix_id, next_coef as i16);
                }

                for i in 0..coef_num {
                    let delta = reader.get_se_range("scaling_list_delta_coef", -128, 127)?;
                    next_coef = (next_coef + delta + 256) % 256;

                    if next_coef == 0 {
                        log_or_err!(
                            state,
                            Warn,
                            anyhow!(ScalingListError::ZeroCoefficient {
                                size_id,
                                matrix_id,
                                coef: i
                            })
                        );
                    }

                    sl.list_mut(size_id, matrix_id)[i] = next_coef as u8;
                }
            }
        }

        // 4:4:4 chroma 32x32 matrices are derived from the 16x16 ones.
        for matrix_id in [1, 2, 4, 5] {
            sl.scaling_lists_32x32[matrix_id] = sl.scaling_lists_16x16[matrix_id];
            sl.dc_coef_32x32[matrix_id] = sl.dc_coef_16x16[matrix_id];
        }

        trace!("scaling_list_data: {:?}", sl.dc_coef_16x16);

        Ok(sl)
    }

    fn list_mut(&mut self, size_id: usize, matrix_id: usize) -> &mut [u8] {
        match size_id {
            0 => &mut self.scaling_lists_4x4[matrix_id][..],
            1 => &mut self.scaling_lists_8x8[matrix_id][..],
            2 => &mut self.scaling_lists_16x16[matrix_id][..],
            _ => &mut self.scaling_lists_32x32[matrix_id][..],
        }
    }

    fn set_dc(&mut self, size_id: usize, matrix_id: usize, value: i16) {
        match size_id {
            2 => self.dc_coef_16x16[matrix_id] = value,
            3 => self.dc_coef_32x32[matrix_id] = value,
            _ => {}
        }
    }

    fn set_default(&mut self, size_id: usize, matrix_id: usize) {
        match size_id {
            0 => self.scaling_lists_4x4[matrix_id] = [16; 16],
            1 => self.scaling_lists_8x8[matrix_id] = default_8x8(matrix_id),
            2 => self.scaling_lists_16x16[matrix_id] = default_8x8(matrix_id),
            _ => self.scaling_lists_32x32[matrix_id] = default_8x8(matrix_id),
        }
        self.set_dc(size_id, matrix_id, DEFAULT_DC);
    }

    /// Prediction from a reference matrix also copies its DC value.
    fn copy(&mut self, size_id: usize, from: usize, to: usize) {
        match size_id {
            0 => self.scaling_lists_4x4[to] = self.scaling_lists_4x4[from],
            1 => self.scaling_lists_8x8[to] = self.scaling_lists_8x8[from],
            2 => {
                self.scaling_lists_16x16[to] = self.scaling_lists_16x16[from];
                self.dc_coef_16x16[to] = self.dc_coef_16x16[from];
            }
            _ => {
                self.scaling_lists_32x32[to] = self.scaling_lists_32x32[from];
                self.dc_coef_32x32[to] = self.dc_coef_32x32[from];
            }
        }
    }

    pub fn list_4x4_raster(&self, matrix_id: usize) -> Option<[u8; 16]> {
        self.scaling_lists_4x4
            .get(matrix_id)
            .map(raster_from_upright_diagonal_4x4)
    }

    pub fn list_8x8_raster(&self, matrix_id: usize) -> Option<[u8; 64]> {
        self.scaling_lists_8x8
            .get(matrix_id)
            .map(raster_from_upright_diagonal_8x8)
    }

    pub fn list_16x16_raster(&self, matrix_id: usize) -> Option<[u8; 64]> {
        self.scaling_lists_16x16
            .get(matrix_id)
            .map(raster_from_upright_diagonal_8x8)
    }

    pub fn list_32x32_raster(&self, matrix_id: usize) -> Option<[u8; 64]> {
        self.scaling_lists_32x32
            .get(matrix_id)
            .map(raster_from_upright_diagonal_8x8)
    }
}
