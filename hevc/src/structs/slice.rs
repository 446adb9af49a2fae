//! slice_segment_header() syntax (7.3.6).
//!
//! Parsing stops at `byte_alignment()`; the header size and the number of
//! emulation-prevention bytes inside the header locate the first
//! slice_segment_data() byte in the original buffer.

use std::fmt::Display;

use anyhow::{Result, anyhow, bail, ensure};
use log::Level::Warn;
use log::trace;

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::structs::nal::NalUnit;
use crate::structs::pps::Pps;
use crate::structs::short_term_rps::ShortTermRefPicSet;
use crate::structs::sps::Sps;
use crate::utils::bitstream_io::{BsIoSliceReader, ceil_log2};
use crate::utils::errors::{SliceError, SyntaxError};
use crate::utils::rbsp::Rbsp;

pub const MAX_LONG_TERM_PICS: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SliceType {
    B,
    P,
    #[default]
    I,
}

impl TryFrom<u32> for SliceType {
    type Error = SliceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SliceType::B),
            1 => Ok(SliceType::P),
            2 => Ok(SliceType::I),
            _ => Err(SliceError::InvalidSliceType(value)),
        }
    }
}

impl Display for SliceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceType::B => write!(f, "B"),
            SliceType::P => write!(f, "P"),
            SliceType::I => write!(f, "I"),
        }
    }
}

impl SliceType {
    pub fn is_intra(self) -> bool {
        self == SliceType::I
    }

    pub fn is_b(self) -> bool {
        self == SliceType::B
    }
}

/// One long-term reference entry, with the SPS candidates resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LongTermPic {
    pub lt_idx_sps: u8,
    /// PocLsbLt
    pub poc_lsb_lt: u32,
    /// UsedByCurrPicLt
    pub used_by_curr_pic_lt_flag: bool,
    pub delta_poc_msb_present_flag: bool,
    pub delta_poc_msb_cycle_lt: u32,
}

/// ref_pic_lists_modification() (7.3.6.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RefPicListModification {
    pub ref_pic_list_modification_flag_l0: bool,
    pub list_entry_l0: Vec<u8>,
    pub ref_pic_list_modification_flag_l1: bool,
    pub list_entry_l1: Vec<u8>,
}

impl RefPicListModification {
    fn read(reader: &mut BsIoSliceReader, header: &SliceHeader) -> Result<Self> {
        let mut rplm = Self {
            ref_pic_list_modification_flag_l0: reader.get()?,
            ..Default::default()
        };
        if rplm.ref_pic_list_modification_flag_l0 {
            rplm.list_entry_l0 = read_list_entries(
                reader,
                header.num_ref_idx_l0_active_minus1,
                header.num_pic_total_curr,
            )?;
        }

        if header.slice_type.is_b() {
            rplm.ref_pic_list_modification_flag_l1 = reader.get()?;
            if rplm.ref_pic_list_modification_flag_l1 {
                rplm.list_entry_l1 = read_list_entries(
                    reader,
                    header.num_ref_idx_l1_active_minus1,
                    header.num_pic_total_curr,
                )?;
            }
        }

        Ok(rplm)
    }
}

fn read_list_entries(
    reader: &mut BsIoSliceReader,
    num_ref_idx_active_minus1: u8,
    num_pic_total_curr: u32,
) -> Result<Vec<u8>> {
    let bits = ceil_log2(num_pic_total_curr);
    let max = num_pic_total_curr - 1;

    (0..=num_ref_idx_active_minus1)
        .map(|_| {
            let entry = reader.get_bits(bits)?;
            ensure!(
                entry <= max,
                SyntaxError::OutOfRange {
                    field: "list_entry",
                    value: entry as i64,
                    min: 0,
                    max: max as i64,
                }
            );
            Ok(entry as u8)
        })
        .collect()
}

/// Weights and offsets of one reference picture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PredWeight {
    pub luma_weight_flag: bool,
    pub chroma_weight_flag: bool,
    pub delta_luma_weight: i16,
    pub luma_offset: i32,
    pub delta_chroma_weight: [i16; 2],
    pub delta_chroma_offset: [i32; 2],
}

/// pred_weight_table() (7.3.6.3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u8,
    pub delta_chroma_log2_weight_denom: i8,
    pub l0: Vec<PredWeight>,
    pub l1: Vec<PredWeight>,
}

impl PredWeightTable {
    fn read(reader: &mut BsIoSliceReader, sps: &Sps, header: &SliceHeader) -> Result<Self> {
        let mut table = Self {
            luma_log2_weight_denom: reader.get_ue_max("luma_log2_weight_denom", 7)? as u8,
            ..Default::default()
        };

        let has_chroma = sps.chroma_array_type != 0;
        if has_chroma {
            let denom = table.luma_log2_weight_denom as i32;
            table.delta_chroma_log2_weight_denom =
                reader.get_se_range("delta_chroma_log2_weight_denom", -denom, 7 - denom)? as i8;
        }

        let high_precision = sps.range_extension.high_precision_offsets_enabled_flag;
        let half_range = |bit_depth: u32| -> i32 {
            if high_precision {
                1 << (bit_depth - 1)
            } else {
                1 << 7
            }
        };
        let ranges = WeightRanges {
            luma_offset: half_range(sps.bit_depth_luma()),
            chroma_offset: 4 * half_range(sps.bit_depth_chroma()),
        };

        table.l0 = Self::read_list(reader, header.num_ref_idx_l0_active_minus1, has_chroma, &ranges)?;
        if header.slice_type.is_b() {
            table.l1 =
                Self::read_list(reader, header.num_ref_idx_l1_active_minus1, has_chroma, &ranges)?;
        }

        Ok(table)
    }

    fn read_list(
        reader: &mut BsIoSliceReader,
        num_ref_idx_active_minus1: u8,
        has_chroma: bool,
        ranges: &WeightRanges,
    ) -> Result<Vec<PredWeight>> {
        let count = num_ref_idx_active_minus1 as usize + 1;
        let mut weights = vec![PredWeight::default(); count];

        for weight in weights.iter_mut() {
            weight.luma_weight_flag = reader.get()?;
        }
        if has_chroma {
            for weight in weights.iter_mut() {
                weight.chroma_weight_flag = reader.get()?;
            }
        }

        for weight in weights.iter_mut() {
            if weight.luma_weight_flag {
                weight.delta_luma_weight = reader.get_se_range("delta_luma_weight", -128, 127)? as i16;
                weight.luma_offset =
                    reader.get_se_range("luma_offset", -ranges.luma_offset, ranges.luma_offset - 1)?;
            }
            if weight.chroma_weight_flag {
                for j in 0..2 {
                    weight.delta_chroma_weight[j] =
                        reader.get_se_range("delta_chroma_weight", -128, 127)? as i16;
                    weight.delta_chroma_offset[j] = reader.get_se_range(
                        "delta_chroma_offset",
                        -ranges.chroma_offset,
                        ranges.chroma_offset - 1,
                    )?;
                }
            }
        }

        Ok(weights)
    }

    /// ChromaLog2WeightDenom
    pub fn chroma_log2_weight_denom(&self) -> u8 {
        (self.luma_log2_weight_denom as i8 + self.delta_chroma_log2_weight_denom) as u8
    }
}

struct WeightRanges {
    luma_offset: i32,
    chroma_offset: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SliceHeader {
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub slice_pic_parameter_set_id: u8,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,

    pub slice_reserved_flag: Vec<bool>,
    pub slice_type: SliceType,
    pub pic_output_flag: bool,
    pub colour_plane_id: u8,
    pub slice_pic_order_cnt_lsb: u32,

    pub short_term_ref_pic_set_sps_flag: bool,
    /// Set coded in the header when `short_term_ref_pic_set_sps_flag` is 0.
    pub short_term_ref_pic_set: Option<ShortTermRefPicSet>,
    pub short_term_ref_pic_set_idx: u8,

    pub num_long_term_sps: u8,
    pub num_long_term_pics: u8,
    pub long_term_pics: Vec<LongTermPic>,

    pub slice_temporal_mvp_enabled_flag: bool,
    pub slice_sao_luma_flag: bool,
    pub slice_sao_chroma_flag: bool,

    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u8,
    pub num_ref_idx_l1_active_minus1: u8,
    pub ref_pic_lists_modification: Option<RefPicListModification>,
    pub mvd_l1_zero_flag: bool,
    pub cabac_init_flag: bool,
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u8,
    pub pred_weight_table: Option<PredWeightTable>,
    pub five_minus_max_num_merge_cand: u8,

    pub slice_qp_delta: i8,
    pub slice_cb_qp_offset: i8,
    pub slice_cr_qp_offset: i8,
    pub cu_chroma_qp_offset_enabled_flag: bool,

    pub deblocking_filter_override_flag: bool,
    pub slice_deblocking_filter_disabled_flag: bool,
    pub slice_beta_offset_div2: i8,
    pub slice_tc_offset_div2: i8,
    pub slice_loop_filter_across_slices_enabled_flag: bool,

    pub num_entry_point_offsets: u32,
    pub offset_len_minus1: u8,
    pub entry_point_offset_minus1: Vec<u32>,
    pub slice_segment_header_extension_length: u16,

    // Derived
    /// NumPicTotalCurr
    pub num_pic_total_curr: u32,
    /// Bits taken by the set coded in the header.
    pub short_term_ref_pic_set_size: u32,
    /// Bits of RBSP up to and including `byte_alignment()`.
    pub header_size: u32,
    /// Emulation-prevention bytes removed before the first slice data byte.
    pub n_emulation_prevention_bytes: u32,
}

impl SliceHeader {
    pub fn read(state: &ParserState, nalu: &NalUnit, rbsp: &Rbsp) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(rbsp.as_ref());
        let nal_type = nalu.nal_type;

        let mut header = Self {
            first_slice_segment_in_pic_flag: reader.get()?,
            pic_output_flag: true,
            collocated_from_l0_flag: true,
            ..Default::default()
        };

        if nal_type.is_irap() {
            header.no_output_of_prior_pics_flag = reader.get()?;
        }

        let pps = state.store.resolve_pps(reader.get_ue()?)?;
        let sps = state.store.resolve_sps(pps.pps_seq_parameter_set_id as u32)?;
        state.store.resolve_vps(sps.sps_video_parameter_set_id as u32)?;
        header.slice_pic_parameter_set_id = pps.id();

        if !header.first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                header.dependent_slice_segment_flag = reader.get()?;
            }

            header.slice_segment_address = reader.get_bits(ceil_log2(sps.pic_size_in_ctbs_y))?;
            ensure!(
                header.slice_segment_address < sps.pic_size_in_ctbs_y,
                SliceError::AddressOutOfRange {
                    address: header.slice_segment_address,
                    size: sps.pic_size_in_ctbs_y,
                }
            );
        }

        if !header.dependent_slice_segment_flag {
            header.read_independent(nalu, sps, pps, reader)?;
        }

        if pps.tiles_enabled_flag || pps.entropy_coding_sync_enabled_flag {
            header.read_entry_points(sps, pps, reader)?;
        }

        if pps.slice_segment_header_extension_present_flag {
            header.slice_segment_header_extension_length =
                reader.get_ue_max("slice_segment_header_extension_length", 256)? as u16;
            reader.skip_n(header.slice_segment_header_extension_length as u32 * 8)?;
        }

        header.read_byte_alignment(state, reader)?;

        header.header_size = reader.position()? as u32;
        header.n_emulation_prevention_bytes =
            rbsp.emulation_prevention_bytes_before(header.header_size as usize / 8) as u32;

        trace!(
            "{} slice: PPS {}, address {}, dependent {}, header {} bits, {} EPB",
            header.slice_type,
            header.slice_pic_parameter_set_id,
            header.slice_segment_address,
            header.dependent_slice_segment_flag,
            header.header_size,
            header.n_emulation_prevention_bytes
        );

        Ok(header)
    }

    fn read_independent(
        &mut self,
        nalu: &NalUnit,
        sps: &Sps,
        pps: &Pps,
        reader: &mut BsIoSliceReader,
    ) -> Result<()> {
        for _ in 0..pps.num_extra_slice_header_bits {
            self.slice_reserved_flag.push(reader.get()?);
        }

        self.slice_type = SliceType::try_from(reader.get_ue()?)?;

        if pps.output_flag_present_flag {
            self.pic_output_flag = reader.get()?;
        }
        if sps.separate_colour_plane_flag {
            self.colour_plane_id = reader.get_n(2)?;
        }

        if !nalu.nal_type.is_idr() {
            self.read_reference_pictures(sps, reader)?;
        }

        if sps.sample_adaptive_offset_enabled_flag {
            self.slice_sao_luma_flag = reader.get()?;
            if sps.chroma_array_type != 0 {
                self.slice_sao_chroma_flag = reader.get()?;
            }
        }

        self.num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
        self.num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
        if !self.slice_type.is_intra() {
            self.read_inter(sps, pps, reader)?;
        }

        let qp_bd_offset_y = 6 * sps.bit_depth_luma_minus8 as i32;
        let init_qp = 26 + pps.init_qp_minus26 as i32;
        self.slice_qp_delta =
            reader.get_se_range("slice_qp_delta", -qp_bd_offset_y - init_qp, 51 - init_qp)? as i8;

        if pps.pps_slice_chroma_qp_offsets_present_flag {
            self.slice_cb_qp_offset = reader.get_se_range("slice_cb_qp_offset", -12, 12)? as i8;
            self.slice_cr_qp_offset = reader.get_se_range("slice_cr_qp_offset", -12, 12)? as i8;
        }

        if pps.range_extension.chroma_qp_offset_list_enabled_flag {
            self.cu_chroma_qp_offset_enabled_flag = reader.get()?;
        }

        if pps.deblocking_filter_override_enabled_flag {
            self.deblocking_filter_override_flag = reader.get()?;
        }
        if self.deblocking_filter_override_flag {
            self.slice_deblocking_filter_disabled_flag = reader.get()?;
            if !self.slice_deblocking_filter_disabled_flag {
                self.slice_beta_offset_div2 =
                    reader.get_se_range("slice_beta_offset_div2", -6, 6)? as i8;
                self.slice_tc_offset_div2 = reader.get_se_range("slice_tc_offset_div2", -6, 6)? as i8;
            }
        } else {
            self.slice_deblocking_filter_disabled_flag = pps.pps_deblocking_filter_disabled_flag;
            self.slice_beta_offset_div2 = pps.pps_beta_offset_div2;
            self.slice_tc_offset_div2 = pps.pps_tc_offset_div2;
        }

        self.slice_loop_filter_across_slices_enabled_flag =
            pps.pps_loop_filter_across_slices_enabled_flag;
        if pps.pps_loop_filter_across_slices_enabled_flag
            && (self.slice_sao_luma_flag
                || self.slice_sao_chroma_flag
                || !self.slice_deblocking_filter_disabled_flag)
        {
            self.slice_loop_filter_across_slices_enabled_flag = reader.get()?;
        }

        Ok(())
    }

    fn read_reference_pictures(&mut self, sps: &Sps, reader: &mut BsIoSliceReader) -> Result<()> {
        let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4;
        self.slice_pic_order_cnt_lsb = reader.get_n(lsb_bits)?;

        let num_sets = sps.num_short_term_ref_pic_sets as usize;
        self.short_term_ref_pic_set_sps_flag = reader.get()?;
        if !self.short_term_ref_pic_set_sps_flag {
            let start = reader.position()?;
            let rps =
                ShortTermRefPicSet::read(reader, num_sets, &sps.short_term_ref_pic_sets, num_sets)?;
            self.short_term_ref_pic_set_size = (reader.position()? - start) as u32;
            self.short_term_ref_pic_set = Some(rps);
        } else {
            if num_sets > 1 {
                self.short_term_ref_pic_set_idx =
                    reader.get_bits(ceil_log2(num_sets as u32))? as u8;
            }
            let idx = self.short_term_ref_pic_set_idx as usize;
            ensure!(
                idx < num_sets,
                SliceError::MissingShortTermRps {
                    idx,
                    count: num_sets
                }
            );
        }

        if sps.long_term_ref_pics_present_flag {
            self.read_long_term_pictures(sps, lsb_bits, reader)?;
        }

        if sps.sps_temporal_mvp_enabled_flag {
            self.slice_temporal_mvp_enabled_flag = reader.get()?;
        }

        let st_used = self
            .short_term_ref_pic_set(sps)
            .map(ShortTermRefPicSet::num_used_by_curr_pic)
            .unwrap_or(0);
        let lt_used = self
            .long_term_pics
            .iter()
            .filter(|pic| pic.used_by_curr_pic_lt_flag)
            .count();
        self.num_pic_total_curr = (st_used + lt_used) as u32;

        Ok(())
    }

    fn read_long_term_pictures(
        &mut self,
        sps: &Sps,
        lsb_bits: u32,
        reader: &mut BsIoSliceReader,
    ) -> Result<()> {
        let num_candidates = sps.num_long_term_ref_pics_sps as u32;
        if num_candidates > 0 {
            self.num_long_term_sps = reader.get_ue_max("num_long_term_sps", num_candidates)? as u8;
        }
        let num_long_term_pics = reader.get_ue()?;

        let total = self.num_long_term_sps as u32 + num_long_term_pics;
        if total > MAX_LONG_TERM_PICS {
            bail!(SliceError::TooManyLongTermPictures(total));
        }
        self.num_long_term_pics = num_long_term_pics as u8;

        for i in 0..total {
            let mut pic = LongTermPic::default();

            if i < self.num_long_term_sps as u32 {
                if num_candidates > 1 {
                    pic.lt_idx_sps = reader.get_bits(ceil_log2(num_candidates))? as u8;
                }
                let idx = pic.lt_idx_sps as usize;
                let (Some(&poc_lsb), Some(&used)) = (
                    sps.lt_ref_pic_poc_lsb_sps.get(idx),
                    sps.used_by_curr_pic_lt_sps_flag.get(idx),
                ) else {
                    bail!(SliceError::MissingLongTermPicture {
                        idx,
                        count: num_candidates as usize,
                    });
                };
                pic.poc_lsb_lt = poc_lsb;
                pic.used_by_curr_pic_lt_flag = used;
            } else {
                pic.poc_lsb_lt = reader.get_n(lsb_bits)?;
                pic.used_by_curr_pic_lt_flag = reader.get()?;
            }

            pic.delta_poc_msb_present_flag = reader.get()?;
            if pic.delta_poc_msb_present_flag {
                pic.delta_poc_msb_cycle_lt = reader.get_ue()?;
            }

            self.long_term_pics.push(pic);
        }

        Ok(())
    }

    fn read_inter(&mut self, sps: &Sps, pps: &Pps, reader: &mut BsIoSliceReader) -> Result<()> {
        self.num_ref_idx_active_override_flag = reader.get()?;
        if self.num_ref_idx_active_override_flag {
            self.num_ref_idx_l0_active_minus1 =
                reader.get_ue_max("num_ref_idx_l0_active_minus1", 14)? as u8;
            if self.slice_type.is_b() {
                self.num_ref_idx_l1_active_minus1 =
                    reader.get_ue_max("num_ref_idx_l1_active_minus1", 14)? as u8;
            }
        }

        if pps.lists_modification_present_flag && self.num_pic_total_curr > 1 {
            self.ref_pic_lists_modification = Some(RefPicListModification::read(reader, self)?);
        }

        if self.slice_type.is_b() {
            self.mvd_l1_zero_flag = reader.get()?;
        }
        if pps.cabac_init_present_flag {
            self.cabac_init_flag = reader.get()?;
        }

        if self.slice_temporal_mvp_enabled_flag {
            if self.slice_type.is_b() {
                self.collocated_from_l0_flag = reader.get()?;
            }

            let max = if self.collocated_from_l0_flag {
                self.num_ref_idx_l0_active_minus1
            } else {
                self.num_ref_idx_l1_active_minus1
            };
            if max > 0 {
                self.collocated_ref_idx = reader.get_ue_max("collocated_ref_idx", max as u32)? as u8;
            }
        }

        if (pps.weighted_pred_flag && self.slice_type == SliceType::P)
            || (pps.weighted_bipred_flag && self.slice_type.is_b())
        {
            self.pred_weight_table = Some(PredWeightTable::read(reader, sps, self)?);
        }

        self.five_minus_max_num_merge_cand =
            reader.get_ue_max("five_minus_max_num_merge_cand", 4)? as u8;

        Ok(())
    }

    fn read_entry_points(&mut self, sps: &Sps, pps: &Pps, reader: &mut BsIoSliceReader) -> Result<()> {
        let tile_columns = pps.column_widths.len() as u32;
        let tile_rows = pps.row_heights.len() as u32;
        let max_offsets = match (pps.tiles_enabled_flag, pps.entropy_coding_sync_enabled_flag) {
            (false, true) => sps.pic_height_in_ctbs_y - 1,
            (true, false) => tile_columns * tile_rows - 1,
            _ => tile_columns * sps.pic_height_in_ctbs_y - 1,
        };

        self.num_entry_point_offsets = reader.get_ue_max("num_entry_point_offsets", max_offsets)?;
        if self.num_entry_point_offsets > 0 {
            self.offset_len_minus1 = reader.get_ue_max("offset_len_minus1", 31)? as u8;
            let bits = self.offset_len_minus1 as u32 + 1;

            self.entry_point_offset_minus1 = (0..self.num_entry_point_offsets)
                .map(|_| reader.get_n::<u32>(bits))
                .collect::<std::io::Result<_>>()?;
        }

        Ok(())
    }

    fn read_byte_alignment(&self, state: &ParserState, reader: &mut BsIoSliceReader) -> Result<()> {
        if !reader.get()? {
            log_or_err!(state, Warn, anyhow!(SliceError::AlignmentBit));
        }

        while !reader.byte_aligned() {
            if reader.get()? {
                log_or_err!(state, Warn, anyhow!(SliceError::AlignmentZeroBits));
            }
        }

        Ok(())
    }

    /// The short-term RPS in force: the set coded in the header or the
    /// selected SPS set. `None` for IDR pictures.
    pub fn short_term_ref_pic_set<'a>(&'a self, sps: &'a Sps) -> Option<&'a ShortTermRefPicSet> {
        if self.short_term_ref_pic_set_sps_flag {
            sps.short_term_ref_pic_sets
                .get(self.short_term_ref_pic_set_idx as usize)
        } else {
            self.short_term_ref_pic_set.as_ref()
        }
    }

    /// Offset of the first slice_segment_data() byte in the buffer `nalu`
    /// was scanned from.
    pub fn slice_data_offset(&self, nalu: &NalUnit) -> usize {
        nalu.offset
            + nalu.header_bytes
            + self.header_size as usize / 8
            + self.n_emulation_prevention_bytes as usize
    }

    /// SliceQpY
    pub fn slice_qp_y(&self, pps: &Pps) -> i32 {
        26 + pps.init_qp_minus26 as i32 + self.slice_qp_delta as i32
    }

    /// MaxNumMergeCand
    pub fn max_num_merge_cand(&self) -> u8 {
        5 - self.five_minus_max_num_merge_cand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::nal::NalHeader;
    use crate::structs::pps::tests::{PpsOptions, pps_rbsp, store_with_sps};
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;
    use crate::utils::errors::{ErrorKind, error_kind};
    use crate::utils::rbsp::escape;

    const IDR_W_RADL: [u8; 2] = [19 << 1, 0x01];
    const TRAIL_R: [u8; 2] = [1 << 1, 0x01];

    fn state(opts: &PpsOptions) -> ParserState {
        let mut store = store_with_sps();
        let bytes = pps_rbsp(0, 0, opts);
        let state = ParserState {
            store,
            ..Default::default()
        };
        let pps = Pps::read(&state, &mut BsIoSliceReader::from_slice(&bytes)).unwrap();
        store = state.store;
        store.insert_pps(pps);

        ParserState {
            store,
            ..Default::default()
        }
    }

    fn align(w: &mut BitstreamIoWriter) {
        w.put(true);
        while !w.is_byte_aligned() {
            w.put(false);
        }
    }

    /// Wraps `rbsp` in a start code and NAL header and parses it.
    fn parse(
        state: &ParserState,
        header: [u8; 2],
        rbsp: &[u8],
    ) -> anyhow::Result<(SliceHeader, NalUnit, Vec<u8>)> {
        let mut buf = vec![0, 0, 1, header[0], header[1]];
        buf.extend(escape(rbsp));

        let nalu = NalUnit::new(NalHeader::from_bytes(header), 0, 3, buf.len() - 3);
        let rbsp = Rbsp::extract(&buf[5..]);
        let slice = SliceHeader::read(state, &nalu, &rbsp)?;

        Ok((slice, nalu, buf))
    }

    #[test]
    fn idr_intra_slice() -> anyhow::Result<()> {
        let state = state(&PpsOptions::default());

        let mut w = BitstreamIoWriter::new();
        w.put(true).put(false).put_ue(0);
        w.put_ue(2);
        w.put(true).put(false);
        w.put_se(-3);
        w.put_se(1).put_se(-1);
        w.put(false);
        align(&mut w);
        w.put_bytes(&[0xAB, 0xCD]);

        let (slice, nalu, buf) = parse(&state, IDR_W_RADL, &w.into_bytes())?;
        assert!(slice.first_slice_segment_in_pic_flag);
        assert_eq!(slice.slice_type, SliceType::I);
        assert!(slice.pic_output_flag);
        assert!(slice.short_term_ref_pic_set(state.store.sps(0).unwrap()).is_none());
        assert_eq!(slice.num_pic_total_curr, 0);
        assert!(slice.slice_sao_luma_flag);
        assert!(!slice.slice_sao_chroma_flag);
        assert_eq!(slice.slice_qp_delta, -3);
        assert_eq!((slice.slice_cb_qp_offset, slice.slice_cr_qp_offset), (1, -1));
        // deblocking inherited from the PPS
        assert_eq!((slice.slice_beta_offset_div2, slice.slice_tc_offset_div2), (2, -1));
        assert!(!slice.slice_loop_filter_across_slices_enabled_flag);
        assert_eq!(slice.header_size, 24);
        assert_eq!(slice.n_emulation_prevention_bytes, 0);
        assert_eq!(buf[slice.slice_data_offset(&nalu)], 0xAB);

        Ok(())
    }

    #[test]
    fn p_slice_with_list_modification() -> anyhow::Result<()> {
        let state = state(&PpsOptions {
            lists_modification: true,
            cabac_init: true,
            ..Default::default()
        });

        let mut w = BitstreamIoWriter::new();
        w.put(true).put_ue(0);
        w.put_ue(1);
        w.put_n(8, 5);
        w.put(true).put_n(1, 1);
        w.put(true); // slice_temporal_mvp_enabled_flag
        w.put(false).put(false);
        w.put(true).put_ue(1);
        w.put(true).put_n(2, 2).put_n(2, 0);
        w.put(true); // cabac_init_flag
        w.put_ue(1); // collocated_ref_idx
        w.put_ue(2);
        w.put_se(0).put_se(0).put_se(0);
        w.put(true);
        align(&mut w);
        w.put_bytes(&[0xAB]);

        let (slice, nalu, buf) = parse(&state, TRAIL_R, &w.into_bytes())?;
        let sps = state.store.sps(0).unwrap();
        assert_eq!(slice.slice_type, SliceType::P);
        assert_eq!(slice.slice_pic_order_cnt_lsb, 5);
        assert!(slice.short_term_ref_pic_set_sps_flag);
        assert_eq!(slice.short_term_ref_pic_set_idx, 1);
        assert_eq!(
            slice.short_term_ref_pic_set(sps).map(|rps| rps.delta_poc_s0()),
            Some(&[-1, -2][..])
        );
        assert_eq!(slice.num_pic_total_curr, 3);
        assert_eq!(slice.num_ref_idx_l0_active_minus1, 1);

        let rplm = slice.ref_pic_lists_modification.as_ref().unwrap();
        assert!(rplm.ref_pic_list_modification_flag_l0);
        assert_eq!(rplm.list_entry_l0, [2, 0]);
        assert!(rplm.list_entry_l1.is_empty());

        assert!(slice.cabac_init_flag);
        assert!(slice.collocated_from_l0_flag);
        assert_eq!(slice.collocated_ref_idx, 1);
        assert_eq!(slice.max_num_merge_cand(), 3);
        assert!(slice.slice_loop_filter_across_slices_enabled_flag);
        assert_eq!(buf[slice.slice_data_offset(&nalu)], 0xAB);

        Ok(())
    }

    #[test]
    fn b_slice_with_inline_rps_and_weights() -> anyhow::Result<()> {
        let state = state(&PpsOptions {
            output_flag: true,
            extra_bits: 1,
            weighted_bipred: true,
            ..Default::default()
        });

        let mut w = BitstreamIoWriter::new();
        w.put(false).put_ue(0);
        w.put_n(9, 30);
        w.put(true); // slice_reserved_flag
        w.put_ue(0);
        w.put(false); // pic_output_flag
        w.put_n(8, 9);
        // inline set predicted from SPS set 0 (S0 = [-1]) with deltaRps = -1
        w.put(false);
        w.put(true).put_ue(1).put(true).put_ue(0).put(true).put(true);
        w.put(false);
        w.put(true).put(true);
        w.put(true).put_ue(1).put_ue(0);
        w.put(true); // mvd_l1_zero_flag
        // pred_weight_table
        w.put_ue(6).put_se(-1);
        w.put(true).put(false);
        w.put(false).put(true);
        w.put_se(3).put_se(-10);
        w.put_se(2).put_se(5).put_se(-2).put_se(0);
        w.put(false).put(false);
        w.put_ue(0);
        w.put_se(1).put_se(0).put_se(0);
        w.put(true);
        align(&mut w);
        w.put_bytes(&[0xAB]);

        let (slice, nalu, buf) = parse(&state, TRAIL_R, &w.into_bytes())?;
        let sps = state.store.sps(0).unwrap();
        assert!(!slice.first_slice_segment_in_pic_flag);
        assert_eq!(slice.slice_segment_address, 30);
        assert_eq!(slice.slice_reserved_flag, [true]);
        assert_eq!(slice.slice_type, SliceType::B);
        assert!(!slice.pic_output_flag);

        let rps = slice.short_term_ref_pic_set(sps).unwrap();
        assert_eq!(rps.delta_poc_s0(), [-1, -2]);
        assert!(slice.short_term_ref_pic_set_size > 0);
        assert_eq!(slice.num_pic_total_curr, 2);
        assert!(slice.ref_pic_lists_modification.is_none());

        assert_eq!(slice.num_ref_idx_l0_active_minus1, 1);
        assert_eq!(slice.num_ref_idx_l1_active_minus1, 0);
        assert!(slice.mvd_l1_zero_flag);

        let pwt = slice.pred_weight_table.as_ref().unwrap();
        assert_eq!(pwt.luma_log2_weight_denom, 6);
        assert_eq!(pwt.chroma_log2_weight_denom(), 5);
        assert_eq!(pwt.l0.len(), 2);
        assert_eq!((pwt.l0[0].delta_luma_weight, pwt.l0[0].luma_offset), (3, -10));
        assert!(!pwt.l0[0].chroma_weight_flag);
        assert_eq!(pwt.l0[1].delta_chroma_weight, [2, -2]);
        assert_eq!(pwt.l0[1].delta_chroma_offset, [5, 0]);
        assert_eq!(pwt.l1.len(), 1);
        assert_eq!(pwt.l1[0], PredWeight::default());

        assert_eq!(slice.max_num_merge_cand(), 5);
        assert_eq!(slice.slice_qp_delta, 1);
        assert_eq!(buf[slice.slice_data_offset(&nalu)], 0xAB);

        Ok(())
    }

    #[test]
    fn dependent_segment_with_entry_points() -> anyhow::Result<()> {
        let state = state(&PpsOptions {
            dependent_slices: true,
            wavefront: true,
            ..Default::default()
        });

        let mut w = BitstreamIoWriter::new();
        w.put(false).put_ue(0);
        w.put(true).put_n(9, 60);
        w.put_ue(2).put_ue(15).put_n(16, 1000).put_n(16, 2000);
        align(&mut w);
        w.put_bytes(&[0xAB]);

        let (slice, nalu, buf) = parse(&state, TRAIL_R, &w.into_bytes())?;
        assert!(slice.dependent_slice_segment_flag);
        assert_eq!(slice.slice_segment_address, 60);
        assert_eq!(slice.num_entry_point_offsets, 2);
        assert_eq!(slice.entry_point_offset_minus1, [1000, 2000]);
        assert_eq!(buf[slice.slice_data_offset(&nalu)], 0xAB);

        Ok(())
    }

    #[test]
    fn emulation_prevention_inside_header() -> anyhow::Result<()> {
        let state = state(&PpsOptions {
            header_extension: true,
            ..Default::default()
        });

        let mut w = BitstreamIoWriter::new();
        w.put(true).put(false).put_ue(0);
        w.put_ue(2);
        w.put(true).put(false);
        w.put_se(-3);
        w.put_se(1).put_se(-1);
        w.put(false);
        w.put_ue(4).put_n(32, 0);
        align(&mut w);
        w.put_bytes(&[0xAB, 0xCD]);

        let (slice, nalu, buf) = parse(&state, IDR_W_RADL, &w.into_bytes())?;
        assert_eq!(slice.slice_segment_header_extension_length, 4);
        assert_eq!(slice.header_size, 64);
        assert_eq!(slice.n_emulation_prevention_bytes, 1);
        assert_eq!(buf[slice.slice_data_offset(&nalu)], 0xAB);
        assert_eq!(slice.slice_data_offset(&nalu), 3 + 2 + 8 + 1);

        Ok(())
    }

    #[test]
    fn address_out_of_range() {
        let state = state(&PpsOptions::default());

        let mut w = BitstreamIoWriter::new();
        w.put(false).put_ue(0).put_n(9, 510);
        align(&mut w);

        let err = parse(&state, TRAIL_R, &w.into_bytes()).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenData);
    }

    #[test]
    fn unknown_pps() {
        let state = state(&PpsOptions::default());

        let mut w = BitstreamIoWriter::new();
        w.put(true).put_ue(7);
        align(&mut w);

        let err = parse(&state, TRAIL_R, &w.into_bytes()).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
    }
}
