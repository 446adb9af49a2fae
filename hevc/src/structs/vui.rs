//! VUI parameters (E.2.1).

use anyhow::Result;
use log::trace;

use crate::structs::hrd::Hrd;
use crate::utils::bitstream_io::BsIoSliceReader;

pub const EXTENDED_SAR: u8 = 255;

/// Sample aspect ratios for `aspect_ratio_idc` 1..=16 (Table E.1).
const ASPECT_RATIOS: [(u16, u16); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vui {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,
    /// Sample aspect ratio, 0/0 when unspecified.
    pub par_n: u16,
    pub par_d: u16,

    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,

    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coeffs: u8,

    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u8,
    pub chroma_sample_loc_type_bottom_field: u8,

    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,

    pub default_display_window_flag: bool,
    pub def_disp_win_left_offset: u32,
    pub def_disp_win_right_offset: u32,
    pub def_disp_win_top_offset: u32,
    pub def_disp_win_bottom_offset: u32,

    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub poc_proportional_to_timing_flag: bool,
    pub num_ticks_poc_diff_one_minus1: u32,
    pub hrd_parameters_present_flag: bool,
    pub hrd: Option<Hrd>,

    pub bitstream_restriction_flag: bool,
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u16,
    pub max_bytes_per_pic_denom: u8,
    pub max_bits_per_min_cu_denom: u8,
    pub log2_max_mv_length_horizontal: u8,
    pub log2_max_mv_length_vertical: u8,
}

impl Default for Vui {
    fn default() -> Self {
        Self {
            aspect_ratio_info_present_flag: false,
            aspect_ratio_idc: 0,
            sar_width: 0,
            sar_height: 0,
            par_n: 0,
            par_d: 0,
            overscan_info_present_flag: false,
            overscan_appropriate_flag: false,
            video_signal_type_present_flag: false,
            video_format: 5,
            video_full_range_flag: false,
            colour_description_present_flag: false,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coeffs: 2,
            chroma_loc_info_present_flag: false,
            chroma_sample_loc_type_top_field: 0,
            chroma_sample_loc_type_bottom_field: 0,
            neutral_chroma_indication_flag: false,
            field_seq_flag: false,
            frame_field_info_present_flag: false,
            default_display_window_flag: false,
            def_disp_win_left_offset: 0,
            def_disp_win_right_offset: 0,
            def_disp_win_top_offset: 0,
            def_disp_win_bottom_offset: 0,
            timing_info_present_flag: false,
            num_units_in_tick: 0,
            time_scale: 0,
            poc_proportional_to_timing_flag: false,
            num_ticks_poc_diff_one_minus1: 0,
            hrd_parameters_present_flag: false,
            hrd: None,
            bitstream_restriction_flag: false,
            tiles_fixed_structure_flag: false,
            motion_vectors_over_pic_boundaries_flag: true,
            restricted_ref_pic_lists_flag: false,
            min_spatial_segmentation_idc: 0,
            max_bytes_per_pic_denom: 2,
            max_bits_per_min_cu_denom: 1,
            log2_max_mv_length_horizontal: 15,
            log2_max_mv_length_vertical: 15,
        }
    }
}

impl Vui {
    pub fn read(reader: &mut BsIoSliceReader, sps_max_sub_layers_minus1: u8) -> Result<Self> {
        let mut vui = Self {
            aspect_ratio_info_present_flag: reader.get()?,
            ..Default::default()
        };

        if vui.aspect_ratio_info_present_flag {
            vui.aspect_ratio_idc = reader.get_n(8)?;
            match vui.aspect_ratio_idc {
                EXTENDED_SAR => {
                    vui.sar_width = reader.get_n(16)?;
                    vui.sar_height = reader.get_n(16)?;
                    vui.par_n = vui.sar_width;
                    vui.par_d = vui.sar_height;
                }
                idc @ 1..=16 => {
                    (vui.par_n, vui.par_d) = ASPECT_RATIOS[idc as usize - 1];
                }
                _ => {}
            }
        }

        vui.overscan_info_present_flag = reader.get()?;
        if vui.overscan_info_present_flag {
            vui.overscan_appropriate_flag = reader.get()?;
        }

        vui.video_signal_type_present_flag = reader.get()?;
        if vui.video_signal_type_present_flag {
            vui.video_format = reader.get_n(3)?;
            vui.video_full_range_flag = reader.get()?;
            vui.colour_description_present_flag = reader.get()?;
            if vui.colour_description_present_flag {
                vui.colour_primaries = reader.get_n(8)?;
                vui.transfer_characteristics = reader.get_n(8)?;
                vui.matrix_coeffs = reader.get_n(8)?;
            }
        }

        vui.chroma_loc_info_present_flag = reader.get()?;
        if vui.chroma_loc_info_present_flag {
            vui.chroma_sample_loc_type_top_field =
                reader.get_ue_max("chroma_sample_loc_type_top_field", 5)? as u8;
            vui.chroma_sample_loc_type_bottom_field =
                reader.get_ue_max("chroma_sample_loc_type_bottom_field", 5)? as u8;
        }

        vui.neutral_chroma_indication_flag = reader.get()?;
        vui.field_seq_flag = reader.get()?;
        vui.frame_field_info_present_flag = reader.get()?;

        vui.default_display_window_flag = reader.get()?;
        if vui.default_display_window_flag {
            vui.def_disp_win_left_offset = reader.get_ue()?;
            vui.def_disp_win_right_offset = reader.get_ue()?;
            vui.def_disp_win_top_offset = reader.get_ue()?;
            vui.def_disp_win_bottom_offset = reader.get_ue()?;
        }

        vui.timing_info_present_flag = reader.get()?;
        if vui.timing_info_present_flag {
            vui.num_units_in_tick = reader.get_n(32)?;
            vui.time_scale = reader.get_n(32)?;
            vui.poc_proportional_to_timing_flag = reader.get()?;
            if vui.poc_proportional_to_timing_flag {
                vui.num_ticks_poc_diff_one_minus1 = reader.get_ue()?;
            }

            vui.hrd_parameters_present_flag = reader.get()?;
            if vui.hrd_parameters_present_flag {
                vui.hrd = Some(Hrd::read(reader, true, sps_max_sub_layers_minus1)?);
            }
        }

        vui.bitstream_restriction_flag = reader.get()?;
        if vui.bitstream_restriction_flag {
            vui.tiles_fixed_structure_flag = reader.get()?;
            vui.motion_vectors_over_pic_boundaries_flag = reader.get()?;
            vui.restricted_ref_pic_lists_flag = reader.get()?;
            vui.min_spatial_segmentation_idc =
                reader.get_ue_max("min_spatial_segmentation_idc", 4095)? as u16;
            vui.max_bytes_per_pic_denom = reader.get_ue_max("max_bytes_per_pic_denom", 16)? as u8;
            vui.max_bits_per_min_cu_denom =
                reader.get_ue_max("max_bits_per_min_cu_denom", 16)? as u8;
            vui.log2_max_mv_length_horizontal =
                reader.get_ue_max("log2_max_mv_length_horizontal", 15)? as u8;
            vui.log2_max_mv_length_vertical =
                reader.get_ue_max("log2_max_mv_length_vertical", 15)? as u8;
        }

        trace!(
            "VUI: sar {}:{}, timing {}/{}, hrd {}",
            vui.par_n,
            vui.par_d,
            vui.time_scale,
            vui.num_units_in_tick,
            vui.hrd.is_some()
        );

        Ok(vui)
    }
}
