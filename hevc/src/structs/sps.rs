//! seq_parameter_set_rbsp() syntax (7.3.2.2) and the sequence level
//! variables derived from it.

use anyhow::{Result, anyhow, bail, ensure};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::structs::MAX_SUB_LAYERS;
use crate::structs::hrd::Hrd;
use crate::structs::profile_tier_level::ProfileTierLevel;
use crate::structs::scaling_list::ScalingList;
use crate::structs::short_term_rps::ShortTermRefPicSet;
use crate::structs::vps::SubLayerOrderingInfo;
use crate::structs::vui::Vui;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{SpsError, SyntaxError};

pub const MAX_SPS_COUNT: usize = 16;
pub const MAX_SHORT_TERM_REF_PIC_SETS: usize = 64;
pub const MAX_LONG_TERM_REF_PICS_SPS: usize = 32;
/// Largest picture dimension allowed by any level (Annex A, level 6.2).
pub const MAX_PIC_DIMENSION: u32 = 16888;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PcmParams {
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u8,
    pub pcm_loop_filter_disabled_flag: bool,
}

/// sps_range_extension() (7.3.2.2.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}

impl SpsRangeExtension {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            transform_skip_rotation_enabled_flag: reader.get()?,
            transform_skip_context_enabled_flag: reader.get()?,
            implicit_rdpcm_enabled_flag: reader.get()?,
            explicit_rdpcm_enabled_flag: reader.get()?,
            extended_precision_processing_flag: reader.get()?,
            intra_smoothing_disabled_flag: reader.get()?,
            high_precision_offsets_enabled_flag: reader.get()?,
            persistent_rice_adaptation_enabled_flag: reader.get()?,
            cabac_bypass_alignment_enabled_flag: reader.get()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sps {
    pub sps_video_parameter_set_id: u8,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_temporal_id_nesting_flag: bool,
    pub ptl: ProfileTierLevel,
    pub sps_seq_parameter_set_id: u8,

    pub chroma_format_idc: u8,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,

    pub conformance_window_flag: bool,
    pub conf_win_left_offset: u32,
    pub conf_win_right_offset: u32,
    pub conf_win_top_offset: u32,
    pub conf_win_bottom_offset: u32,

    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,

    pub sps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering_info: Vec<SubLayerOrderingInfo>,

    pub log2_min_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_luma_coding_block_size: u8,
    pub log2_min_luma_transform_block_size_minus2: u8,
    pub log2_diff_max_min_luma_transform_block_size: u8,
    pub max_transform_hierarchy_depth_inter: u8,
    pub max_transform_hierarchy_depth_intra: u8,

    pub scaling_list_enabled_flag: bool,
    pub sps_scaling_list_data_present_flag: bool,
    /// Set when `scaling_list_enabled_flag` is, with the default lists when
    /// no data is coded.
    pub scaling_list: Option<ScalingList>,

    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,

    pub pcm_enabled_flag: bool,
    pub pcm: Option<PcmParams>,

    pub num_short_term_ref_pic_sets: u8,
    pub short_term_ref_pic_sets: Vec<ShortTermRefPicSet>,

    pub long_term_ref_pics_present_flag: bool,
    pub num_long_term_ref_pics_sps: u8,
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps_flag: Vec<bool>,

    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,

    pub vui_parameters_present_flag: bool,
    pub vui: Option<Vui>,

    pub sps_extension_present_flag: bool,
    pub sps_range_extension_flag: bool,
    pub sps_multilayer_extension_flag: bool,
    pub sps_3d_extension_flag: bool,
    pub sps_scc_extension_flag: bool,
    pub sps_extension_4bits: u8,
    pub range_extension: SpsRangeExtension,

    // Derived
    pub chroma_array_type: u8,
    pub sub_width_c: u32,
    pub sub_height_c: u32,
    /// Coded luma size.
    pub width: u32,
    pub height: u32,
    pub crop_rect_x: u32,
    pub crop_rect_y: u32,
    pub crop_rect_width: u32,
    pub crop_rect_height: u32,
    /// Frame rate from the VUI timing info, else from the VPS, else 0/1.
    pub fps_num: u32,
    pub fps_den: u32,
    pub min_cb_log2_size_y: u32,
    pub ctb_log2_size_y: u32,
    pub ctb_size_y: u32,
    pub pic_width_in_ctbs_y: u32,
    pub pic_height_in_ctbs_y: u32,
    pub pic_size_in_ctbs_y: u32,
}

impl Sps {
    pub fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut sps = Self {
            sps_video_parameter_set_id: reader.get_n(4)?,
            sps_max_sub_layers_minus1: reader.get_n(3)?,
            sps_temporal_id_nesting_flag: reader.get()?,
            ..Default::default()
        };

        ensure!(
            (sps.sps_max_sub_layers_minus1 as usize) < MAX_SUB_LAYERS - 1,
            SyntaxError::OutOfRange {
                field: "sps_max_sub_layers_minus1",
                value: sps.sps_max_sub_layers_minus1 as i64,
                min: 0,
                max: MAX_SUB_LAYERS as i64 - 2,
            }
        );

        let vps = state.store.resolve_vps(sps.sps_video_parameter_set_id as u32)?;

        sps.ptl = ProfileTierLevel::read(reader, true, sps.sps_max_sub_layers_minus1)?;
        sps.sps_seq_parameter_set_id =
            reader.get_ue_max("sps_seq_parameter_set_id", MAX_SPS_COUNT as u32 - 1)? as u8;

        sps.chroma_format_idc = reader.get_ue_max("chroma_format_idc", 3)? as u8;
        if sps.chroma_format_idc == 3 {
            sps.separate_colour_plane_flag = reader.get()?;
        }

        sps.pic_width_in_luma_samples =
            reader.get_ue_max("pic_width_in_luma_samples", MAX_PIC_DIMENSION)?;
        sps.pic_height_in_luma_samples =
            reader.get_ue_max("pic_height_in_luma_samples", MAX_PIC_DIMENSION)?;
        ensure!(
            sps.pic_width_in_luma_samples != 0 && sps.pic_height_in_luma_samples != 0,
            SpsError::ZeroDimensions {
                width: sps.pic_width_in_luma_samples,
                height: sps.pic_height_in_luma_samples,
            }
        );

        sps.conformance_window_flag = reader.get()?;
        if sps.conformance_window_flag {
            sps.conf_win_left_offset = reader.get_ue()?;
            sps.conf_win_right_offset = reader.get_ue()?;
            sps.conf_win_top_offset = reader.get_ue()?;
            sps.conf_win_bottom_offset = reader.get_ue()?;
        }

        sps.bit_depth_luma_minus8 = reader.get_ue_max("bit_depth_luma_minus8", 8)? as u8;
        sps.bit_depth_chroma_minus8 = reader.get_ue_max("bit_depth_chroma_minus8", 8)? as u8;
        sps.log2_max_pic_order_cnt_lsb_minus4 =
            reader.get_ue_max("log2_max_pic_order_cnt_lsb_minus4", 12)? as u8;

        sps.sps_sub_layer_ordering_info_present_flag = reader.get()?;
        sps.sub_layer_ordering_info = SubLayerOrderingInfo::read_all(
            reader,
            sps.sps_max_sub_layers_minus1,
            sps.sps_sub_layer_ordering_info_present_flag,
        )?;
        for (index, info) in sps.sub_layer_ordering_info.iter().enumerate() {
            if info.max_num_reorder_pics > info.max_dec_pic_buffering_minus1 {
                log_or_err!(
                    state,
                    Warn,
                    anyhow!(SpsError::ReorderExceedsDpb {
                        index,
                        reorder: info.max_num_reorder_pics,
                        dpb: info.max_dec_pic_buffering_minus1,
                    })
                );
            }
        }

        sps.log2_min_luma_coding_block_size_minus3 =
            reader.get_ue_max("log2_min_luma_coding_block_size_minus3", 3)? as u8;
        sps.log2_diff_max_min_luma_coding_block_size =
            reader.get_ue_max("log2_diff_max_min_luma_coding_block_size", 3)? as u8;
        sps.log2_min_luma_transform_block_size_minus2 =
            reader.get_ue_max("log2_min_luma_transform_block_size_minus2", 3)? as u8;
        sps.log2_diff_max_min_luma_transform_block_size =
            reader.get_ue_max("log2_diff_max_min_luma_transform_block_size", 3)? as u8;
        sps.max_transform_hierarchy_depth_inter =
            reader.get_ue_max("max_transform_hierarchy_depth_inter", 4)? as u8;
        sps.max_transform_hierarchy_depth_intra =
            reader.get_ue_max("max_transform_hierarchy_depth_intra", 4)? as u8;

        sps.derive_geometry(state)?;

        sps.scaling_list_enabled_flag = reader.get()?;
        if sps.scaling_list_enabled_flag {
            sps.sps_scaling_list_data_present_flag = reader.get()?;
            sps.scaling_list = Some(if sps.sps_scaling_list_data_present_flag {
                ScalingList::read(state, reader)?
            } else {
                ScalingList::default()
            });
        }

        sps.amp_enabled_flag = reader.get()?;
        sps.sample_adaptive_offset_enabled_flag = reader.get()?;

        sps.pcm_enabled_flag = reader.get()?;
        if sps.pcm_enabled_flag {
            sps.pcm = Some(PcmParams {
                pcm_sample_bit_depth_luma_minus1: reader.get_n(4)?,
                pcm_sample_bit_depth_chroma_minus1: reader.get_n(4)?,
                log2_min_pcm_luma_coding_block_size_minus3: reader
                    .get_ue_max("log2_min_pcm_luma_coding_block_size_minus3", 2)?
                    as u8,
                log2_diff_max_min_pcm_luma_coding_block_size: reader
                    .get_ue_max("log2_diff_max_min_pcm_luma_coding_block_size", 2)?
                    as u8,
                pcm_loop_filter_disabled_flag: reader.get()?,
            });
        }

        sps.num_short_term_ref_pic_sets = reader.get_ue_max(
            "num_short_term_ref_pic_sets",
            MAX_SHORT_TERM_REF_PIC_SETS as u32,
        )? as u8;
        let num_sets = sps.num_short_term_ref_pic_sets as usize;
        sps.short_term_ref_pic_sets = Vec::with_capacity(num_sets);
        for idx in 0..num_sets {
            let rps = ShortTermRefPicSet::read(reader, idx, &sps.short_term_ref_pic_sets, num_sets)?;
            sps.short_term_ref_pic_sets.push(rps);
        }

        sps.long_term_ref_pics_present_flag = reader.get()?;
        if sps.long_term_ref_pics_present_flag {
            sps.num_long_term_ref_pics_sps = reader.get_ue_max(
                "num_long_term_ref_pics_sps",
                MAX_LONG_TERM_REF_PICS_SPS as u32,
            )? as u8;

            let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4;
            for _ in 0..sps.num_long_term_ref_pics_sps {
                sps.lt_ref_pic_poc_lsb_sps.push(reader.get_n(lsb_bits)?);
                sps.used_by_curr_pic_lt_sps_flag.push(reader.get()?);
            }
        }

        sps.sps_temporal_mvp_enabled_flag = reader.get()?;
        sps.strong_intra_smoothing_enabled_flag = reader.get()?;

        sps.vui_parameters_present_flag = reader.get()?;
        if !state.parse_vui_params {
            sps.derive_frame_rate(vps.frame_rate());
            trace!("SPS {}: VUI parsing disabled", sps.sps_seq_parameter_set_id);
            return Ok(sps);
        }

        if sps.vui_parameters_present_flag {
            sps.vui = Some(Vui::read(reader, sps.sps_max_sub_layers_minus1)?);
        }

        sps.sps_extension_present_flag = reader.get()?;
        if sps.sps_extension_present_flag {
            sps.sps_range_extension_flag = reader.get()?;
            sps.sps_multilayer_extension_flag = reader.get()?;
            sps.sps_3d_extension_flag = reader.get()?;
            sps.sps_scc_extension_flag = reader.get()?;
            sps.sps_extension_4bits = reader.get_n(4)?;
        }

        if sps.sps_range_extension_flag {
            sps.range_extension = SpsRangeExtension::read(reader)?;
        }

        if sps.sps_multilayer_extension_flag
            || sps.sps_3d_extension_flag
            || sps.sps_scc_extension_flag
            || sps.sps_extension_4bits != 0
        {
            debug!(
                "SPS {}: ignoring multilayer/3D/SCC extension data",
                sps.sps_seq_parameter_set_id
            );
        }

        sps.derive_frame_rate(vps.frame_rate());

        trace!(
            "SPS {}: {}x{} chroma {} CTB {} {}x{} CTBs, {} short-term RPS",
            sps.sps_seq_parameter_set_id,
            sps.width,
            sps.height,
            sps.chroma_format_idc,
            sps.ctb_size_y,
            sps.pic_width_in_ctbs_y,
            sps.pic_height_in_ctbs_y,
            sps.num_short_term_ref_pic_sets
        );

        Ok(sps)
    }

    fn derive_geometry(&mut self, state: &ParserState) -> Result<()> {
        self.chroma_array_type = if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        };
        (self.sub_width_c, self.sub_height_c) = match self.chroma_array_type {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };

        self.min_cb_log2_size_y = self.log2_min_luma_coding_block_size_minus3 as u32 + 3;
        self.ctb_log2_size_y =
            self.min_cb_log2_size_y + self.log2_diff_max_min_luma_coding_block_size as u32;
        if self.ctb_log2_size_y > 6 {
            bail!(SpsError::InvalidCtbSize(self.ctb_log2_size_y));
        } else if self.ctb_log2_size_y < 4 {
            log_or_err!(
                state,
                Warn,
                anyhow!(SpsError::InvalidCtbSize(self.ctb_log2_size_y))
            );
        }
        self.ctb_size_y = 1 << self.ctb_log2_size_y;

        let min_cb_size = 1 << self.min_cb_log2_size_y;
        for (axis, value) in [
            ("width", self.pic_width_in_luma_samples),
            ("height", self.pic_height_in_luma_samples),
        ] {
            if value % min_cb_size != 0 {
                log_or_err!(
                    state,
                    Warn,
                    anyhow!(SpsError::UnalignedDimension {
                        axis,
                        value,
                        min_cb_size,
                    })
                );
            }
        }

        self.width = self.pic_width_in_luma_samples;
        self.height = self.pic_height_in_luma_samples;
        self.pic_width_in_ctbs_y = self.width.div_ceil(self.ctb_size_y);
        self.pic_height_in_ctbs_y = self.height.div_ceil(self.ctb_size_y);
        self.pic_size_in_ctbs_y = self.pic_width_in_ctbs_y * self.pic_height_in_ctbs_y;

        let crop_x = self.sub_width_c as u64
            * (self.conf_win_left_offset as u64 + self.conf_win_right_offset as u64);
        let crop_y = self.sub_height_c as u64
            * (self.conf_win_top_offset as u64 + self.conf_win_bottom_offset as u64);
        if crop_x >= self.width as u64 || crop_y >= self.height as u64 {
            bail!(SpsError::InvalidConformanceWindow {
                offsets: format!(
                    "{}, {}, {}, {}",
                    self.conf_win_left_offset,
                    self.conf_win_right_offset,
                    self.conf_win_top_offset,
                    self.conf_win_bottom_offset
                ),
                width: self.width,
                height: self.height,
            });
        }

        self.crop_rect_x = self.sub_width_c * self.conf_win_left_offset;
        self.crop_rect_y = self.sub_height_c * self.conf_win_top_offset;
        self.crop_rect_width = self.width - crop_x as u32;
        self.crop_rect_height = self.height - crop_y as u32;

        Ok(())
    }

    fn derive_frame_rate(&mut self, vps_frame_rate: Option<(u32, u32)>) {
        let vui_frame_rate = self
            .vui
            .as_ref()
            .filter(|vui| vui.timing_info_present_flag && vui.num_units_in_tick != 0)
            .map(|vui| (vui.time_scale, vui.num_units_in_tick));

        (self.fps_num, self.fps_den) = vui_frame_rate.or(vps_frame_rate).unwrap_or((0, 1));
    }

    pub fn id(&self) -> u8 {
        self.sps_seq_parameter_set_id
    }

    pub fn bit_depth_luma(&self) -> u32 {
        self.bit_depth_luma_minus8 as u32 + 8
    }

    pub fn bit_depth_chroma(&self) -> u32 {
        self.bit_depth_chroma_minus8 as u32 + 8
    }

    /// MaxPicOrderCntLsb
    pub fn max_pic_order_cnt_lsb(&self) -> u32 {
        1 << (self.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4)
    }

    pub fn hrd(&self) -> Option<&Hrd> {
        self.vui.as_ref()?.hrd.as_ref()
    }
}
