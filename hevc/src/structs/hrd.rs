//! Hypothetical reference decoder parameters (E.2.2, E.2.3).
//!
//! Carried by the VPS and by the SPS VUI. The delay lengths decoded here
//! set the field widths of buffering period and picture timing SEI.

use anyhow::Result;
use log::trace;

use crate::utils::bitstream_io::BsIoSliceReader;

/// Per-CPB entry of sub_layer_hrd_parameters().
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CpbParams {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: u32,
    pub bit_rate_du_value_minus1: u32,
    pub cbr_flag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubLayerHrd {
    pub cpbs: Vec<CpbParams>,
}

impl SubLayerHrd {
    fn read(
        reader: &mut BsIoSliceReader,
        cpb_cnt: usize,
        sub_pic_hrd_params_present_flag: bool,
    ) -> Result<Self> {
        let mut cpbs = Vec::with_capacity(cpb_cnt);

        for _ in 0..cpb_cnt {
            let mut cpb = CpbParams {
                bit_rate_value_minus1: reader.get_ue()?,
                cpb_size_value_minus1: reader.get_ue()?,
                ..Default::default()
            };

            if sub_pic_hrd_params_present_flag {
                cpb.cpb_size_du_value_minus1 = reader.get_ue()?;
                cpb.bit_rate_du_value_minus1 = reader.get_ue()?;
            }
            cpb.cbr_flag = reader.get()?;

            cpbs.push(cpb);
        }

        Ok(Self { cpbs })
    }
}

/// Timing and CPB description of one temporal sub-layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HrdSubLayerInfo {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: u16,
    pub low_delay_hrd_flag: bool,
    pub cpb_cnt_minus1: u8,
    pub nal: Option<SubLayerHrd>,
    pub vcl: Option<SubLayerHrd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Hrd {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub sub_pic_hrd_params_present_flag: bool,

    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,

    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_size_du_scale: u8,

    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,

    pub sub_layers: Vec<HrdSubLayerInfo>,
}

impl Default for Hrd {
    fn default() -> Self {
        Self {
            nal_hrd_parameters_present_flag: false,
            vcl_hrd_parameters_present_flag: false,
            sub_pic_hrd_params_present_flag: false,
            tick_divisor_minus2: 0,
            du_cpb_removal_delay_increment_length_minus1: 0,
            sub_pic_cpb_params_in_pic_timing_sei_flag: false,
            dpb_output_delay_du_length_minus1: 0,
            bit_rate_scale: 0,
            cpb_size_scale: 0,
            cpb_size_du_scale: 0,
            initial_cpb_removal_delay_length_minus1: 23,
            au_cpb_removal_delay_length_minus1: 23,
            dpb_output_delay_length_minus1: 23,
            sub_layers: Vec::new(),
        }
    }
}

impl Hrd {
    pub fn read(
        reader: &mut BsIoSliceReader,
        common_inf_present_flag: bool,
        max_sub_layers_minus1: u8,
    ) -> Result<Self> {
        let mut hrd = Self::default();

        if common_inf_present_flag {
            hrd.nal_hrd_parameters_present_flag = reader.get()?;
            hrd.vcl_hrd_parameters_present_flag = reader.get()?;

            if hrd.nal_hrd_parameters_present_flag || hrd.vcl_hrd_parameters_present_flag {
                hrd.sub_pic_hrd_params_present_flag = reader.get()?;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.tick_divisor_minus2 = reader.get_n(8)?;
                    hrd.du_cpb_removal_delay_increment_length_minus1 = reader.get_n(5)?;
                    hrd.sub_pic_cpb_params_in_pic_timing_sei_flag = reader.get()?;
                    hrd.dpb_output_delay_du_length_minus1 = reader.get_n(5)?;
                }

                hrd.bit_rate_scale = reader.get_n(4)?;
                hrd.cpb_size_scale = reader.get_n(4)?;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.cpb_size_du_scale = reader.get_n(4)?;
                }

                hrd.initial_cpb_removal_delay_length_minus1 = reader.get_n(5)?;
                hrd.au_cpb_removal_delay_length_minus1 = reader.get_n(5)?;
                hrd.dpb_output_delay_length_minus1 = reader.get_n(5)?;
            }
        }

        for _ in 0..=max_sub_layers_minus1 {
            let mut info = HrdSubLayerInfo {
                fixed_pic_rate_general_flag: reader.get()?,
                ..Default::default()
            };

            info.fixed_pic_rate_within_cvs_flag = if info.fixed_pic_rate_general_flag {
                true
            } else {
                reader.get()?
            };

            if info.fixed_pic_rate_within_cvs_flag {
                info.elemental_duration_in_tc_minus1 =
                    reader.get_ue_max("elemental_duration_in_tc_minus1", 2047)? as u16;
            } else {
                info.low_delay_hrd_flag = reader.get()?;
            }

            if !info.low_delay_hrd_flag {
                info.cpb_cnt_minus1 = reader.get_ue_max("cpb_cnt_minus1", 31)? as u8;
            }

            let cpb_cnt = info.cpb_cnt_minus1 as usize + 1;
            if hrd.nal_hrd_parameters_present_flag {
                info.nal = Some(SubLayerHrd::read(
                    reader,
                    cpb_cnt,
                    hrd.sub_pic_hrd_params_present_flag,
                )?);
            }
            if hrd.vcl_hrd_parameters_present_flag {
                info.vcl = Some(SubLayerHrd::read(
                    reader,
                    cpb_cnt,
                    hrd.sub_pic_hrd_params_present_flag,
                )?);
            }

            hrd.sub_layers.push(info);
        }

        trace!(
            "HRD: nal {}, vcl {}, sub_pic {}, {} sub-layers",
            hrd.nal_hrd_parameters_present_flag,
            hrd.vcl_hrd_parameters_present_flag,
            hrd.sub_pic_hrd_params_present_flag,
            hrd.sub_layers.len()
        );

        Ok(hrd)
    }

    /// CpbDpbDelaysPresentFlag
    pub fn cpb_dpb_delays_present(&self) -> bool {
        self.nal_hrd_parameters_present_flag || self.vcl_hrd_parameters_present_flag
    }

    /// Number of CPB specifications of the lowest sub-layer.
    pub fn cpb_cnt(&self) -> usize {
        self.sub_layers
            .first()
            .map(|info| info.cpb_cnt_minus1 as usize + 1)
            .unwrap_or(1)
    }

    /// Bit rate in bits per second of CPB `cpb` in sub-layer `sub_layer`.
    pub fn bit_rate(&self, sub_layer: usize, cpb: usize) -> Option<u64> {
        let info = self.sub_layers.get(sub_layer)?;
        let params = info.nal.as_ref().or(info.vcl.as_ref())?.cpbs.get(cpb)?;
        Some((params.bit_rate_value_minus1 as u64 + 1) << (6 + self.bit_rate_scale as u32))
    }
}
