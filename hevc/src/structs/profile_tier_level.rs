//! profile_tier_level() syntax (7.3.3).

use std::fmt::Display;

use anyhow::Result;
use log::trace;

use crate::structs::MAX_SUB_LAYERS;
use crate::utils::bitstream_io::BsIoSliceReader;

/// `general_profile_idc` values (Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Profile {
    Main,
    Main10,
    MainStillPicture,
    FormatRangeExtensions,
    HighThroughput,
    MultiviewMain,
    ScalableMain,
    ThreeDMain,
    ScreenContentCoding,
    ScalableFormatRangeExtensions,
    HighThroughputScreenContentCoding,
    Unknown(u8),
}

impl From<u8> for Profile {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Main,
            2 => Self::Main10,
            3 => Self::MainStillPicture,
            4 => Self::FormatRangeExtensions,
            5 => Self::HighThroughput,
            6 => Self::MultiviewMain,
            7 => Self::ScalableMain,
            8 => Self::ThreeDMain,
            9 => Self::ScreenContentCoding,
            10 => Self::ScalableFormatRangeExtensions,
            11 => Self::HighThroughputScreenContentCoding,
            _ => Self::Unknown(value),
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "Main"),
            Self::Main10 => write!(f, "Main 10"),
            Self::MainStillPicture => write!(f, "Main Still Picture"),
            Self::FormatRangeExtensions => write!(f, "Format Range Extensions"),
            Self::HighThroughput => write!(f, "High Throughput"),
            Self::MultiviewMain => write!(f, "Multiview Main"),
            Self::ScalableMain => write!(f, "Scalable Main"),
            Self::ThreeDMain => write!(f, "3D Main"),
            Self::ScreenContentCoding => write!(f, "Screen Content Coding"),
            Self::ScalableFormatRangeExtensions => write!(f, "Scalable Format Range Extensions"),
            Self::HighThroughputScreenContentCoding => {
                write!(f, "High Throughput Screen Content Coding")
            }
            Self::Unknown(idc) => write!(f, "Unknown ({idc})"),
        }
    }
}

/// Profile part of a general or sub-layer PTL record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProfileInfo {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    /// Bit `31 - j` holds `profile_compatibility_flag[j]`.
    pub profile_compatibility_flags: u32,
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub frame_only_constraint_flag: bool,
}

impl ProfileInfo {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let info = Self {
            profile_space: reader.get_n(2)?,
            tier_flag: reader.get()?,
            profile_idc: reader.get_n(5)?,
            profile_compatibility_flags: reader.get_n(32)?,
            progressive_source_flag: reader.get()?,
            interlaced_source_flag: reader.get()?,
            non_packed_constraint_flag: reader.get()?,
            frame_only_constraint_flag: reader.get()?,
        };

        // reserved_zero_43bits + reserved_zero_bit
        reader.skip_n(44)?;

        Ok(info)
    }

    pub fn is_compatible_with(&self, profile_idc: u8) -> bool {
        profile_idc < 32 && self.profile_compatibility_flags & (1 << (31 - profile_idc)) != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubLayerPtl {
    pub profile_present_flag: bool,
    pub level_present_flag: bool,
    pub profile: ProfileInfo,
    pub level_idc: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProfileTierLevel {
    pub general: ProfileInfo,
    pub general_level_idc: u8,
    pub sub_layers: Vec<SubLayerPtl>,
}

impl ProfileTierLevel {
    pub fn read(
        reader: &mut BsIoSliceReader,
        profile_present_flag: bool,
        max_sub_layers_minus1: u8,
    ) -> Result<Self> {
        let mut ptl = Self::default();

        if profile_present_flag {
            ptl.general = ProfileInfo::read(reader)?;
        }
        ptl.general_level_idc = reader.get_n(8)?;

        let count = max_sub_layers_minus1 as usize;
        ptl.sub_layers = vec![SubLayerPtl::default(); count];
        for sub_layer in ptl.sub_layers.iter_mut() {
            sub_layer.profile_present_flag = reader.get()?;
            sub_layer.level_present_flag = reader.get()?;
        }

        // The presence flags always fill 8 slots once any sub-layer exists.
        if count > 0 {
            for _ in count..MAX_SUB_LAYERS {
                reader.skip_n(2)?;
            }
        }

        for sub_layer in ptl.sub_layers.iter_mut() {
            if sub_layer.profile_present_flag {
                sub_layer.profile = ProfileInfo::read(reader)?;
            }
            if sub_layer.level_present_flag {
                sub_layer.level_idc = reader.get_n(8)?;
            }
        }

        trace!(
            "PTL: profile_idc {}, tier {}, level_idc {}, {} sub-layers",
            ptl.general.profile_idc,
            ptl.general.tier_flag as u8,
            ptl.general_level_idc,
            count
        );

        Ok(ptl)
    }

    /// Profile signalled by `general_profile_idc`, or by the lowest
    /// compatibility flag when the idc is zero.
    pub fn profile(&self) -> Profile {
        if self.general.profile_idc != 0 {
            return Profile::from(self.general.profile_idc);
        }

        (1..32u8)
            .find(|&idc| self.general.is_compatible_with(idc))
            .map(Profile::from)
            .unwrap_or(Profile::Unknown(0))
    }

    pub fn tier(&self) -> &'static str {
        if self.general.tier_flag { "High" } else { "Main" }
    }

    /// Level as printed in Annex A, e.g. "5.1" for `general_level_idc` 153.
    pub fn level(&self) -> String {
        let idc = self.general_level_idc as u32;
        if idc % 30 == 0 {
            format!("{}", idc / 30)
        } else {
            format!("{}.{}", idc / 30, (idc % 30) / 3)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;

    pub(crate) fn put_general_ptl(w: &mut BitstreamIoWriter, profile_idc: u32, level_idc: u32) {
        w.put_n(2, 0).put(false).put_n(5, profile_idc);
        w.put_n(32, 1 << (31 - profile_idc));
        w.put(true).put(false).put(false).put(true);
        w.put_n(32, 0).put_n(12, 0);
        w.put_n(8, level_idc);
    }

    #[test]
    fn general_only() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_general_ptl(&mut w, 2, 153);
        w.put_n(8, 0xA5);
        let bytes = w.into_bytes();

        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let ptl = ProfileTierLevel::read(reader, true, 0)?;
        assert_eq!(ptl.profile(), Profile::Main10);
        assert_eq!(ptl.tier(), "Main");
        assert_eq!(ptl.level(), "5.1");
        assert!(ptl.general.progressive_source_flag);
        assert!(ptl.general.frame_only_constraint_flag);
        assert!(ptl.sub_layers.is_empty());
        // 2 + 1 + 5 + 32 + 4 + 44 + 8
        assert_eq!(reader.position()?, 96);
        assert_eq!(reader.get_n::<u8>(8)?, 0xA5);

        Ok(())
    }

    #[test]
    fn sub_layer_flags_are_padded() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_general_ptl(&mut w, 1, 93);
        // two sub-layers: level only, then nothing
        w.put(false).put(true).put(false).put(false);
        // reserved_zero_2bits for slots 2..8
        w.put_n(12, 0);
        w.put_n(8, 90);
        w.put_n(8, 0x5A);
        let bytes = w.into_bytes();

        let reader = &mut BsIoSliceReader::from_slice(&bytes);
        let ptl = ProfileTierLevel::read(reader, true, 2)?;
        assert_eq!(ptl.profile(), Profile::Main);
        assert_eq!(ptl.level(), "3.1");
        assert_eq!(ptl.sub_layers.len(), 2);
        assert!(ptl.sub_layers[0].level_present_flag);
        assert_eq!(ptl.sub_layers[0].level_idc, 90);
        assert!(!ptl.sub_layers[1].level_present_flag);
        assert_eq!(reader.get_n::<u8>(8)?, 0x5A);

        Ok(())
    }

    #[test]
    fn profile_from_compatibility() {
        let ptl = ProfileTierLevel {
            general: ProfileInfo {
                profile_compatibility_flags: 1 << (31 - 3),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ptl.profile(), Profile::MainStillPicture);
    }
}
