//! pic_parameter_set_rbsp() syntax (7.3.2.3).

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::process::parse::ParserState;
use crate::structs::scaling_list::ScalingList;
use crate::structs::sps::Sps;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::PpsError;

pub const MAX_PPS_COUNT: usize = 64;

/// pps_range_extension() (7.3.2.3.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PpsRangeExtension {
    pub log2_max_transform_skip_block_size_minus2: u8,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list_enabled_flag: bool,
    pub diff_cu_chroma_qp_offset_depth: u8,
    pub chroma_qp_offset_list_len_minus1: u8,
    pub cb_qp_offset_list: Vec<i8>,
    pub cr_qp_offset_list: Vec<i8>,
    pub log2_sao_offset_scale_luma: u8,
    pub log2_sao_offset_scale_chroma: u8,
}

impl PpsRangeExtension {
    fn read(reader: &mut BsIoSliceReader, pps: &Pps, sps: &Sps) -> Result<Self> {
        let mut ext = Self::default();

        if pps.transform_skip_enabled_flag {
            ext.log2_max_transform_skip_block_size_minus2 =
                reader.get_ue_max("log2_max_transform_skip_block_size_minus2", 3)? as u8;
        }
        ext.cross_component_prediction_enabled_flag = reader.get()?;
        ext.chroma_qp_offset_list_enabled_flag = reader.get()?;
        if ext.chroma_qp_offset_list_enabled_flag {
            ext.diff_cu_chroma_qp_offset_depth = reader.get_ue_max(
                "diff_cu_chroma_qp_offset_depth",
                sps.log2_diff_max_min_luma_coding_block_size as u32,
            )? as u8;
            ext.chroma_qp_offset_list_len_minus1 =
                reader.get_ue_max("chroma_qp_offset_list_len_minus1", 5)? as u8;

            for _ in 0..=ext.chroma_qp_offset_list_len_minus1 {
                ext.cb_qp_offset_list
                    .push(reader.get_se_range("cb_qp_offset_list", -12, 12)? as i8);
                ext.cr_qp_offset_list
                    .push(reader.get_se_range("cr_qp_offset_list", -12, 12)? as i8);
            }
        }

        let max_scale = |bit_depth: u32| bit_depth.saturating_sub(10);
        ext.log2_sao_offset_scale_luma =
            reader.get_ue_max("log2_sao_offset_scale_luma", max_scale(sps.bit_depth_luma()))? as u8;
        ext.log2_sao_offset_scale_chroma = reader.get_ue_max(
            "log2_sao_offset_scale_chroma",
            max_scale(sps.bit_depth_chroma()),
        )? as u8;

        Ok(ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Pps {
    pub pps_pic_parameter_set_id: u8,
    pub pps_seq_parameter_set_id: u8,

    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub init_qp_minus26: i8,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u8,
    pub pps_cb_qp_offset: i8,
    pub pps_cr_qp_offset: i8,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,

    pub tiles_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    pub num_tile_columns_minus1: u8,
    pub num_tile_rows_minus1: u8,
    pub uniform_spacing_flag: bool,
    /// Tile column widths in CTBs, coded or derived.
    pub column_widths: Vec<u32>,
    /// Tile row heights in CTBs, coded or derived.
    pub row_heights: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,

    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking_filter_control_present_flag: bool,
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: i8,
    pub pps_tc_offset_div2: i8,

    pub pps_scaling_list_data_present_flag: bool,
    /// Coded list, else the SPS list when scaling lists are enabled.
    pub scaling_list: Option<ScalingList>,

    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u8,
    pub slice_segment_header_extension_present_flag: bool,

    pub pps_extension_present_flag: bool,
    pub pps_range_extension_flag: bool,
    pub pps_multilayer_extension_flag: bool,
    pub pps_3d_extension_flag: bool,
    pub pps_scc_extension_flag: bool,
    pub pps_extension_4bits: u8,
    pub range_extension: PpsRangeExtension,

    // Derived from the referenced SPS
    pub pic_width_in_ctbs_y: u32,
    pub pic_height_in_ctbs_y: u32,
}

impl Pps {
    pub fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut pps = Pps {
            pps_pic_parameter_set_id: reader
                .get_ue_max("pps_pic_parameter_set_id", MAX_PPS_COUNT as u32 - 1)?
                as u8,
            ..Default::default()
        };

        let sps = state.store.resolve_sps(reader.get_ue()?)?;
        pps.pps_seq_parameter_set_id = sps.id();
        pps.pic_width_in_ctbs_y = sps.pic_width_in_ctbs_y;
        pps.pic_height_in_ctbs_y = sps.pic_height_in_ctbs_y;

        pps.dependent_slice_segments_enabled_flag = reader.get()?;
        pps.output_flag_present_flag = reader.get()?;
        pps.num_extra_slice_header_bits = reader.get_n(3)?;
        pps.sign_data_hiding_enabled_flag = reader.get()?;
        pps.cabac_init_present_flag = reader.get()?;
        pps.num_ref_idx_l0_default_active_minus1 =
            reader.get_ue_max("num_ref_idx_l0_default_active_minus1", 14)? as u8;
        pps.num_ref_idx_l1_default_active_minus1 =
            reader.get_ue_max("num_ref_idx_l1_default_active_minus1", 14)? as u8;

        let qp_bd_offset_y = 6 * sps.bit_depth_luma_minus8 as i32;
        pps.init_qp_minus26 = reader.get_se_range("init_qp_minus26", -(26 + qp_bd_offset_y), 25)? as i8;

        pps.constrained_intra_pred_flag = reader.get()?;
        pps.transform_skip_enabled_flag = reader.get()?;
        pps.cu_qp_delta_enabled_flag = reader.get()?;
        if pps.cu_qp_delta_enabled_flag {
            pps.diff_cu_qp_delta_depth = reader.get_ue_max(
                "diff_cu_qp_delta_depth",
                sps.log2_diff_max_min_luma_coding_block_size as u32,
            )? as u8;
        }

        pps.pps_cb_qp_offset = reader.get_se_range("pps_cb_qp_offset", -12, 12)? as i8;
        pps.pps_cr_qp_offset = reader.get_se_range("pps_cr_qp_offset", -12, 12)? as i8;
        pps.pps_slice_chroma_qp_offsets_present_flag = reader.get()?;
        pps.weighted_pred_flag = reader.get()?;
        pps.weighted_bipred_flag = reader.get()?;
        pps.transquant_bypass_enabled_flag = reader.get()?;
        pps.tiles_enabled_flag = reader.get()?;
        pps.entropy_coding_sync_enabled_flag = reader.get()?;

        pps.loop_filter_across_tiles_enabled_flag = true;
        if pps.tiles_enabled_flag {
            pps.read_tiles(reader)?;
        } else {
            pps.column_widths = vec![pps.pic_width_in_ctbs_y];
            pps.row_heights = vec![pps.pic_height_in_ctbs_y];
        }

        pps.pps_loop_filter_across_slices_enabled_flag = reader.get()?;
        pps.deblocking_filter_control_present_flag = reader.get()?;
        if pps.deblocking_filter_control_present_flag {
            pps.deblocking_filter_override_enabled_flag = reader.get()?;
            pps.pps_deblocking_filter_disabled_flag = reader.get()?;
            if !pps.pps_deblocking_filter_disabled_flag {
                pps.pps_beta_offset_div2 = reader.get_se_range("pps_beta_offset_div2", -6, 6)? as i8;
                pps.pps_tc_offset_div2 = reader.get_se_range("pps_tc_offset_div2", -6, 6)? as i8;
            }
        }

        pps.pps_scaling_list_data_present_flag = reader.get()?;
        pps.scaling_list = if pps.pps_scaling_list_data_present_flag {
            Some(ScalingList::read(state, reader)?)
        } else {
            sps.scaling_list.clone()
        };

        pps.lists_modification_present_flag = reader.get()?;
        pps.log2_parallel_merge_level_minus2 = reader.get_ue_max(
            "log2_parallel_merge_level_minus2",
            sps.ctb_log2_size_y.saturating_sub(2),
        )? as u8;
        pps.slice_segment_header_extension_present_flag = reader.get()?;

        pps.pps_extension_present_flag = reader.get()?;
        if pps.pps_extension_present_flag {
            pps.pps_range_extension_flag = reader.get()?;
            pps.pps_multilayer_extension_flag = reader.get()?;
            pps.pps_3d_extension_flag = reader.get()?;
            pps.pps_scc_extension_flag = reader.get()?;
            pps.pps_extension_4bits = reader.get_n(4)?;
        }

        if pps.pps_range_extension_flag {
            pps.range_extension = PpsRangeExtension::read(reader, &pps, sps)?;
        }

        if pps.pps_multilayer_extension_flag
            || pps.pps_3d_extension_flag
            || pps.pps_scc_extension_flag
            || pps.pps_extension_4bits != 0
        {
            debug!(
                "PPS {}: ignoring multilayer/3D/SCC extension data",
                pps.pps_pic_parameter_set_id
            );
        }

        trace!(
            "PPS {}: SPS {}, tiles {}x{}, wpp {}",
            pps.pps_pic_parameter_set_id,
            pps.pps_seq_parameter_set_id,
            pps.column_widths.len(),
            pps.row_heights.len(),
            pps.entropy_coding_sync_enabled_flag
        );

        Ok(pps)
    }

    fn read_tiles(&mut self, reader: &mut BsIoSliceReader) -> Result<()> {
        self.num_tile_columns_minus1 = reader.get_ue_max(
            "num_tile_columns_minus1",
            self.pic_width_in_ctbs_y.saturating_sub(1).min(19),
        )? as u8;
        self.num_tile_rows_minus1 = reader.get_ue_max(
            "num_tile_rows_minus1",
            self.pic_height_in_ctbs_y.saturating_sub(1).min(21),
        )? as u8;

        self.uniform_spacing_flag = reader.get()?;
        if self.uniform_spacing_flag {
            self.column_widths =
                uniform_spacing(self.num_tile_columns_minus1 as u32 + 1, self.pic_width_in_ctbs_y);
            self.row_heights =
                uniform_spacing(self.num_tile_rows_minus1 as u32 + 1, self.pic_height_in_ctbs_y);
        } else {
            self.column_widths = explicit_spacing(
                reader,
                "columns",
                self.num_tile_columns_minus1,
                self.pic_width_in_ctbs_y,
            )?;
            self.row_heights = explicit_spacing(
                reader,
                "rows",
                self.num_tile_rows_minus1,
                self.pic_height_in_ctbs_y,
            )?;
        }

        self.loop_filter_across_tiles_enabled_flag = reader.get()?;

        Ok(())
    }

    pub fn id(&self) -> u8 {
        self.pps_pic_parameter_set_id
    }

    pub fn num_tiles(&self) -> usize {
        self.column_widths.len() * self.row_heights.len()
    }
}

/// Equations 6-3 and 6-4.
fn uniform_spacing(count: u32, total: u32) -> Vec<u32> {
    (0..count)
        .map(|i| ((i + 1) * total) / count - (i * total) / count)
        .collect()
}

fn explicit_spacing(
    reader: &mut BsIoSliceReader,
    axis: &'static str,
    count_minus1: u8,
    total: u32,
) -> Result<Vec<u32>> {
    let mut sizes = Vec::with_capacity(count_minus1 as usize + 1);
    let mut sum = 0u32;

    for _ in 0..count_minus1 {
        let size = reader.get_ue_max("tile size minus1", total.saturating_sub(1))? + 1;
        sum += size;
        sizes.push(size);
    }

    if sum >= total {
        bail!(PpsError::InvalidTileLayout { axis, sum, total });
    }
    sizes.push(total - sum);

    Ok(sizes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::process::store::ParameterSetStore;
    use crate::structs::sps::tests::{SpsOptions, sps_rbsp};
    use crate::structs::vps::Vps;
    use crate::structs::vps::tests::vps_rbsp;
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;
    use crate::utils::errors::{ErrorKind, error_kind};

    #[derive(Default)]
    pub(crate) struct PpsOptions {
        pub dependent_slices: bool,
        pub output_flag: bool,
        pub extra_bits: u32,
        pub cabac_init: bool,
        pub weighted_pred: bool,
        pub weighted_bipred: bool,
        /// Explicit column widths minus1 and row heights minus1.
        pub tiles: Option<(Vec<u32>, Vec<u32>)>,
        pub wavefront: bool,
        pub lists_modification: bool,
        pub deblocking_override: bool,
        pub header_extension: bool,
    }

    pub(crate) fn pps_rbsp(id: u32, sps_id: u32, opts: &PpsOptions) -> Vec<u8> {
        let mut w = BitstreamIoWriter::new();
        w.put_ue(id).put_ue(sps_id);
        w.put(opts.dependent_slices).put(opts.output_flag).put_n(3, opts.extra_bits);
        w.put(false).put(opts.cabac_init);
        w.put_ue(2).put_ue(0);
        w.put_se(0);
        w.put(false).put(false);
        w.put(true).put_ue(1);
        w.put_se(-2).put_se(3);
        w.put(true);
        w.put(opts.weighted_pred).put(opts.weighted_bipred);
        w.put(false);
        w.put(opts.tiles.is_some()).put(opts.wavefront);
        if let Some((columns, rows)) = &opts.tiles {
            w.put_ue(columns.len() as u32).put_ue(rows.len() as u32);
            w.put(false);
            for &c in columns {
                w.put_ue(c);
            }
            for &r in rows {
                w.put_ue(r);
            }
            w.put(false);
        }
        w.put(true);
        w.put(true).put(opts.deblocking_override).put(false).put_se(2).put_se(-1);
        w.put(false);
        w.put(opts.lists_modification);
        w.put_ue(0);
        w.put(opts.header_extension);
        w.put(false);
        w.finish_rbsp()
    }

    pub(crate) fn store_with_sps() -> ParameterSetStore {
        let mut store = ParameterSetStore::default();
        let vps = vps_rbsp(0);
        store.insert_vps(
            Vps::read(&ParserState::default(), &mut BsIoSliceReader::from_slice(&vps)).unwrap(),
        );

        let sps = sps_rbsp(0, 0, &SpsOptions::default());
        let state = ParserState {
            store,
            ..Default::default()
        };
        let sps = Sps::read(&state, &mut BsIoSliceReader::from_slice(&sps)).unwrap();
        let mut store = state.store;
        store.insert_sps(sps);

        store
    }

    fn read(opts: &PpsOptions) -> anyhow::Result<Pps> {
        let state = ParserState {
            store: store_with_sps(),
            ..Default::default()
        };
        let bytes = pps_rbsp(1, 0, opts);
        Pps::read(&state, &mut BsIoSliceReader::from_slice(&bytes))
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let pps = read(&PpsOptions::default())?;

        assert_eq!(pps.id(), 1);
        assert_eq!(pps.num_ref_idx_l0_default_active_minus1, 2);
        assert_eq!(pps.diff_cu_qp_delta_depth, 1);
        assert_eq!((pps.pps_cb_qp_offset, pps.pps_cr_qp_offset), (-2, 3));
        assert_eq!((pps.pps_beta_offset_div2, pps.pps_tc_offset_div2), (2, -1));
        assert_eq!(pps.column_widths, [30]);
        assert_eq!(pps.row_heights, [17]);
        assert_eq!(pps.num_tiles(), 1);
        assert!(pps.loop_filter_across_tiles_enabled_flag);
        assert!(pps.scaling_list.is_none());

        Ok(())
    }

    #[test]
    fn explicit_tiles() -> anyhow::Result<()> {
        let pps = read(&PpsOptions {
            tiles: Some((vec![9, 9], vec![7])),
            ..Default::default()
        })?;

        assert_eq!(pps.column_widths, [10, 10, 10]);
        assert_eq!(pps.row_heights, [8, 9]);
        assert_eq!(pps.num_tiles(), 6);
        assert!(!pps.loop_filter_across_tiles_enabled_flag);

        Ok(())
    }

    #[test]
    fn tile_layout_overflow() {
        let err = read(&PpsOptions {
            tiles: Some((vec![29], vec![])),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenData);
    }

    #[test]
    fn uniform_tiles() {
        assert_eq!(uniform_spacing(4, 30), [7, 8, 7, 8]);
        assert_eq!(uniform_spacing(3, 17), [5, 6, 6]);
        assert_eq!(uniform_spacing(1, 17), [17]);
    }

    #[test]
    fn missing_sps() {
        let state = ParserState {
            store: store_with_sps(),
            ..Default::default()
        };
        let bytes = pps_rbsp(0, 4, &PpsOptions::default());
        let err = Pps::read(&state, &mut BsIoSliceReader::from_slice(&bytes)).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
    }
}
