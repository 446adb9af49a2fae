//! video_parameter_set_rbsp() syntax (7.3.2.1).

use anyhow::{Result, anyhow, ensure};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::parse::ParserState;
use crate::structs::MAX_SUB_LAYERS;
use crate::structs::hrd::Hrd;
use crate::structs::profile_tier_level::ProfileTierLevel;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{SyntaxError, VpsError};

pub const MAX_VPS_COUNT: usize = 16;

/// DPB sizing of one temporal sub-layer, shared by VPS and SPS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubLayerOrderingInfo {
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
}

impl SubLayerOrderingInfo {
    /// Reads the ordering loop of a VPS or SPS. Without
    /// `sub_layer_ordering_info_present_flag` only the highest sub-layer is
    /// coded and the lower ones take its values.
    pub(crate) fn read_all(
        reader: &mut BsIoSliceReader,
        max_sub_layers_minus1: u8,
        present_flag: bool,
    ) -> Result<Vec<Self>> {
        let count = max_sub_layers_minus1 as usize + 1;
        let first = if present_flag { 0 } else { count - 1 };

        let mut infos = vec![Self::default(); count];
        for info in infos.iter_mut().skip(first) {
            info.max_dec_pic_buffering_minus1 =
                reader.get_ue_max("max_dec_pic_buffering_minus1", 15)?;
            info.max_num_reorder_pics = reader.get_ue_max("max_num_reorder_pics", 15)?;
            info.max_latency_increase_plus1 = reader.get_ue_max(
                "max_latency_increase_plus1",
                u32::MAX - 1,
            )?;
        }

        if !present_flag {
            let highest = infos[count - 1];
            infos[..count - 1].fill(highest);
        }

        Ok(infos)
    }
}

/// One hrd_parameters() entry of the VPS timing section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VpsHrd {
    pub hrd_layer_set_idx: u32,
    pub cprms_present_flag: bool,
    pub hrd: Hrd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vps {
    pub vps_video_parameter_set_id: u8,
    pub vps_base_layer_internal_flag: bool,
    pub vps_base_layer_available_flag: bool,
    pub vps_max_layers_minus1: u8,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,

    pub ptl: ProfileTierLevel,

    pub vps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering_info: Vec<SubLayerOrderingInfo>,

    pub vps_max_layer_id: u8,
    pub vps_num_layer_sets_minus1: u16,

    pub vps_timing_info_present_flag: bool,
    pub vps_num_units_in_tick: u32,
    pub vps_time_scale: u32,
    pub vps_poc_proportional_to_timing_flag: bool,
    pub vps_num_ticks_poc_diff_one_minus1: u32,
    pub hrd_entries: Vec<VpsHrd>,

    pub vps_extension_flag: bool,
}

impl Vps {
    pub fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut vps = Self {
            vps_video_parameter_set_id: reader.get_n(4)?,
            vps_base_layer_internal_flag: reader.get()?,
            vps_base_layer_available_flag: reader.get()?,
            vps_max_layers_minus1: reader.get_n(6)?,
            vps_max_sub_layers_minus1: reader.get_n(3)?,
            vps_temporal_id_nesting_flag: reader.get()?,
            ..Default::default()
        };

        if !vps.vps_base_layer_internal_flag || !vps.vps_base_layer_available_flag {
            debug!(
                "VPS {}: {}",
                vps.vps_video_parameter_set_id,
                VpsError::BaseLayerFlags
            );
        }

        ensure!(
            (vps.vps_max_sub_layers_minus1 as usize) < MAX_SUB_LAYERS - 1,
            SyntaxError::OutOfRange {
                field: "vps_max_sub_layers_minus1",
                value: vps.vps_max_sub_layers_minus1 as i64,
                min: 0,
                max: MAX_SUB_LAYERS as i64 - 2,
            }
        );

        let reserved: u16 = reader.get_n(16)?;
        if reserved != 0xFFFF {
            log_or_err!(state, Warn, anyhow!(VpsError::Reserved16Bits(reserved)));
        }

        vps.ptl = ProfileTierLevel::read(reader, true, vps.vps_max_sub_layers_minus1)?;

        vps.vps_sub_layer_ordering_info_present_flag = reader.get()?;
        vps.sub_layer_ordering_info = SubLayerOrderingInfo::read_all(
            reader,
            vps.vps_max_sub_layers_minus1,
            vps.vps_sub_layer_ordering_info_present_flag,
        )?;

        vps.vps_max_layer_id = reader.get_n(6)?;
        vps.vps_num_layer_sets_minus1 =
            reader.get_ue_max("vps_num_layer_sets_minus1", 1023)? as u16;

        // layer_id_included_flag[i][j]
        let included_bits = vps.vps_num_layer_sets_minus1 as u32 * (vps.vps_max_layer_id as u32 + 1);
        reader.skip_n(included_bits)?;

        vps.vps_timing_info_present_flag = reader.get()?;
        if vps.vps_timing_info_present_flag {
            vps.vps_num_units_in_tick = reader.get_n(32)?;
            vps.vps_time_scale = reader.get_n(32)?;
            vps.vps_poc_proportional_to_timing_flag = reader.get()?;
            if vps.vps_poc_proportional_to_timing_flag {
                vps.vps_num_ticks_poc_diff_one_minus1 =
                    reader.get_ue_max("vps_num_ticks_poc_diff_one_minus1", u32::MAX - 1)?;
            }

            let vps_num_hrd_parameters = reader.get_ue_max(
                "vps_num_hrd_parameters",
                vps.vps_num_layer_sets_minus1 as u32 + 1,
            )?;
            for i in 0..vps_num_hrd_parameters {
                let hrd_layer_set_idx = reader.get_ue_max(
                    "hrd_layer_set_idx",
                    vps.vps_num_layer_sets_minus1 as u32,
                )?;
                let cprms_present_flag = if i > 0 { reader.get()? } else { true };
                let hrd = Hrd::read(reader, cprms_present_flag, vps.vps_max_sub_layers_minus1)?;

                vps.hrd_entries.push(VpsHrd {
                    hrd_layer_set_idx,
                    cprms_present_flag,
                    hrd,
                });
            }
        }

        vps.vps_extension_flag = reader.get()?;
        if vps.vps_extension_flag {
            debug!(
                "VPS {}: ignoring vps_extension_data",
                vps.vps_video_parameter_set_id
            );
        }

        trace!(
            "VPS {}: {} sub-layers, {} layer sets, {} HRD entries",
            vps.vps_video_parameter_set_id,
            vps.vps_max_sub_layers_minus1 + 1,
            vps.vps_num_layer_sets_minus1 + 1,
            vps.hrd_entries.len()
        );

        Ok(vps)
    }

    pub fn id(&self) -> u8 {
        self.vps_video_parameter_set_id
    }

    /// Frame rate from the VPS timing info as (numerator, denominator).
    pub fn frame_rate(&self) -> Option<(u32, u32)> {
        (self.vps_timing_info_present_flag && self.vps_num_units_in_tick != 0)
            .then_some((self.vps_time_scale, self.vps_num_units_in_tick))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::structs::hrd::tests::put_nal_hrd;
    use crate::structs::profile_tier_level::tests::put_general_ptl;
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;

    /// Single-layer VPS with one sub-layer, Main profile level 4.1 and
    /// 25 fps timing.
    pub(crate) fn vps_rbsp(id: u32) -> Vec<u8> {
        let mut w = BitstreamIoWriter::new();
        w.put_n(4, id).put(true).put(true).put_n(6, 0).put_n(3, 0).put(true);
        w.put_n(16, 0xFFFF);
        put_general_ptl(&mut w, 1, 123);
        w.put(true);
        w.put_ue(4).put_ue(2).put_ue(0);
        w.put_n(6, 0).put_ue(0);
        w.put(true).put_n(32, 1).put_n(32, 25).put(false);
        w.put_ue(0);
        w.put(false);
        w.finish_rbsp()
    }

    #[test]
    fn single_layer() -> anyhow::Result<()> {
        let bytes = vps_rbsp(3);
        let vps = Vps::read(&ParserState::default(), &mut BsIoSliceReader::from_slice(&bytes))?;

        assert_eq!(vps.id(), 3);
        assert_eq!(vps.vps_max_sub_layers_minus1, 0);
        assert_eq!(vps.ptl.level(), "4.1");
        assert_eq!(vps.sub_layer_ordering_info.len(), 1);
        assert_eq!(vps.sub_layer_ordering_info[0].max_dec_pic_buffering_minus1, 4);
        assert_eq!(vps.sub_layer_ordering_info[0].max_num_reorder_pics, 2);
        assert_eq!(vps.frame_rate(), Some((25, 1)));
        assert!(vps.hrd_entries.is_empty());

        Ok(())
    }

    #[test]
    fn hrd_entries_and_inferred_ordering() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        w.put_n(4, 0).put(true).put(true).put_n(6, 0).put_n(3, 1).put(false);
        w.put_n(16, 0xFFFF);
        put_general_ptl(&mut w, 1, 93);
        w.put(false).put(false).put_n(14, 0);
        // ordering info only for the highest sub-layer
        w.put(false);
        w.put_ue(3).put_ue(1).put_ue(0);
        // two layer sets over layer ids 0..=1
        w.put_n(6, 1).put_ue(1);
        w.put(true).put(false);
        w.put(true).put_n(32, 1001).put_n(32, 60000).put(false);
        w.put_ue(1);
        w.put_ue(1);
        put_nal_hrd(&mut w, 1);
        w.put(false);
        let bytes = w.finish_rbsp();

        let vps = Vps::read(&ParserState::default(), &mut BsIoSliceReader::from_slice(&bytes))?;
        assert_eq!(vps.sub_layer_ordering_info.len(), 2);
        assert_eq!(vps.sub_layer_ordering_info[0], vps.sub_layer_ordering_info[1]);
        assert_eq!(vps.sub_layer_ordering_info[0].max_dec_pic_buffering_minus1, 3);
        assert_eq!(vps.vps_num_layer_sets_minus1, 1);
        assert_eq!(vps.hrd_entries.len(), 1);
        assert_eq!(vps.hrd_entries[0].hrd_layer_set_idx, 1);
        assert!(vps.hrd_entries[0].cprms_present_flag);
        assert_eq!(vps.hrd_entries[0].hrd.sub_layers.len(), 2);
        assert_eq!(vps.frame_rate(), Some((60000, 1001)));

        Ok(())
    }

    #[test]
    fn reserved_bits() {
        let mut bytes = vps_rbsp(0);
        bytes[2] = 0x00;

        let lenient = ParserState::default();
        assert!(Vps::read(&lenient, &mut BsIoSliceReader::from_slice(&bytes)).is_ok());

        let strict = ParserState {
            fail_level: Warn,
            ..Default::default()
        };
        assert!(Vps::read(&strict, &mut BsIoSliceReader::from_slice(&bytes)).is_err());
    }
}
