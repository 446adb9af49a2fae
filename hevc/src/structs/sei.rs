//! sei_rbsp() and the SEI payloads (7.3.5, D.2).
//!
//! Every payload is decoded from its own reader bounded to `payloadSize`
//! bytes, so a malformed payload cannot desynchronise the message loop.

use std::fmt::Display;

use anyhow::{Context, Result, bail, ensure};
use log::{debug, trace};

use crate::process::parse::ParserState;
use crate::structs::hrd::Hrd;
use crate::structs::nal::NalUnitType;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{SeiError, SyntaxError};
use crate::utils::rbsp::Rbsp;

pub const BUFFERING_PERIOD: u32 = 0;
pub const PIC_TIMING: u32 = 1;
pub const USER_DATA_UNREGISTERED: u32 = 5;
pub const RECOVERY_POINT: u32 = 6;

/// Initial CPB removal values of one CPB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InitialCpbRemoval {
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_offset: u32,
    pub initial_alt_cpb_removal_delay: u32,
    pub initial_alt_cpb_removal_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BufferingPeriod {
    pub bp_seq_parameter_set_id: u8,
    pub irap_cpb_params_present_flag: bool,
    pub cpb_delay_offset: u32,
    pub dpb_delay_offset: u32,
    pub concatenation_flag: bool,
    pub au_cpb_removal_delay_delta_minus1: u32,
    pub nal: Vec<InitialCpbRemoval>,
    pub vcl: Vec<InitialCpbRemoval>,
}

impl BufferingPeriod {
    fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let sps = state.store.resolve_sps(reader.get_ue()?)?;
        let default_hrd = Hrd::default();
        let hrd = sps.hrd().unwrap_or(&default_hrd);

        let mut bp = Self {
            bp_seq_parameter_set_id: sps.id(),
            ..Default::default()
        };

        if !hrd.sub_pic_hrd_params_present_flag {
            bp.irap_cpb_params_present_flag = reader.get()?;
        }
        if bp.irap_cpb_params_present_flag {
            bp.cpb_delay_offset = reader.get_n(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)?;
            bp.dpb_delay_offset = reader.get_n(hrd.dpb_output_delay_length_minus1 as u32 + 1)?;
        }

        bp.concatenation_flag = reader.get()?;
        bp.au_cpb_removal_delay_delta_minus1 =
            reader.get_n(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)?;

        let with_alt = hrd.sub_pic_hrd_params_present_flag || bp.irap_cpb_params_present_flag;
        if hrd.nal_hrd_parameters_present_flag {
            bp.nal = Self::read_cpbs(reader, hrd, with_alt)?;
        }
        if hrd.vcl_hrd_parameters_present_flag {
            bp.vcl = Self::read_cpbs(reader, hrd, with_alt)?;
        }

        Ok(bp)
    }

    fn read_cpbs(
        reader: &mut BsIoSliceReader,
        hrd: &Hrd,
        with_alt: bool,
    ) -> Result<Vec<InitialCpbRemoval>> {
        let bits = hrd.initial_cpb_removal_delay_length_minus1 as u32 + 1;
        let mut cpbs = Vec::with_capacity(hrd.cpb_cnt());

        for _ in 0..hrd.cpb_cnt() {
            let mut cpb = InitialCpbRemoval {
                initial_cpb_removal_delay: reader.get_n(bits)?,
                initial_cpb_removal_offset: reader.get_n(bits)?,
                ..Default::default()
            };
            if with_alt {
                cpb.initial_alt_cpb_removal_delay = reader.get_n(bits)?;
                cpb.initial_alt_cpb_removal_offset = reader.get_n(bits)?;
            }
            cpbs.push(cpb);
        }

        Ok(cpbs)
    }
}

/// `pic_struct` values (Table D.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PicStruct {
    #[default]
    Frame,
    TopField,
    BottomField,
    TopBottom,
    BottomTop,
    TopBottomTop,
    BottomTopBottom,
    FrameDoubling,
    FrameTripling,
    TopPairedPreviousBottom,
    BottomPairedPreviousTop,
    TopPairedNextBottom,
    BottomPairedNextTop,
    Reserved(u8),
}

impl From<u8> for PicStruct {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Frame,
            1 => Self::TopField,
            2 => Self::BottomField,
            3 => Self::TopBottom,
            4 => Self::BottomTop,
            5 => Self::TopBottomTop,
            6 => Self::BottomTopBottom,
            7 => Self::FrameDoubling,
            8 => Self::FrameTripling,
            9 => Self::TopPairedPreviousBottom,
            10 => Self::BottomPairedPreviousTop,
            11 => Self::TopPairedNextBottom,
            12 => Self::BottomPairedNextTop,
            _ => Self::Reserved(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PicTiming {
    pub pic_struct: PicStruct,
    pub source_scan_type: u8,
    pub duplicate_flag: bool,

    pub au_cpb_removal_delay_minus1: u32,
    pub pic_dpb_output_delay: u32,
    pub pic_dpb_output_du_delay: u32,

    pub num_decoding_units_minus1: u32,
    pub du_common_cpb_removal_delay_flag: bool,
    pub du_common_cpb_removal_delay_increment_minus1: u32,
    pub num_nalus_in_du_minus1: Vec<u32>,
    pub du_cpb_removal_delay_increment_minus1: Vec<u32>,
}

impl PicTiming {
    fn read(state: &ParserState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let sps = state.store.active_sps()?;
        let mut pt = Self::default();

        let frame_field_info = sps
            .vui
            .as_ref()
            .is_some_and(|vui| vui.frame_field_info_present_flag);
        if frame_field_info {
            pt.pic_struct = PicStruct::from(reader.get_n::<u8>(4)?);
            pt.source_scan_type = reader.get_n(2)?;
            pt.duplicate_flag = reader.get()?;
        }

        let Some(hrd) = sps.hrd().filter(|hrd| hrd.cpb_dpb_delays_present()) else {
            return Ok(pt);
        };

        pt.au_cpb_removal_delay_minus1 =
            reader.get_n(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)?;
        pt.pic_dpb_output_delay = reader.get_n(hrd.dpb_output_delay_length_minus1 as u32 + 1)?;
        if hrd.sub_pic_hrd_params_present_flag {
            pt.pic_dpb_output_du_delay =
                reader.get_n(hrd.dpb_output_delay_du_length_minus1 as u32 + 1)?;
        }

        if hrd.sub_pic_hrd_params_present_flag && hrd.sub_pic_cpb_params_in_pic_timing_sei_flag {
            let increment_bits = hrd.du_cpb_removal_delay_increment_length_minus1 as u32 + 1;

            pt.num_decoding_units_minus1 = reader.get_ue_max(
                "num_decoding_units_minus1",
                sps.pic_size_in_ctbs_y.saturating_sub(1),
            )?;
            pt.du_common_cpb_removal_delay_flag = reader.get()?;
            if pt.du_common_cpb_removal_delay_flag {
                pt.du_common_cpb_removal_delay_increment_minus1 = reader.get_n(increment_bits)?;
            }

            for i in 0..=pt.num_decoding_units_minus1 {
                pt.num_nalus_in_du_minus1.push(reader.get_ue()?);
                if !pt.du_common_cpb_removal_delay_flag && i < pt.num_decoding_units_minus1 {
                    pt.du_cpb_removal_delay_increment_minus1
                        .push(reader.get_n(increment_bits)?);
                }
            }
        }

        Ok(pt)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RecoveryPoint {
    pub recovery_poc_cnt: i32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
}

impl RecoveryPoint {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            recovery_poc_cnt: reader.get_se()?,
            exact_match_flag: reader.get()?,
            broken_link_flag: reader.get()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UserDataUnregistered {
    pub uuid_iso_iec_11578: [u8; 16],
    pub data: Vec<u8>,
}

impl UserDataUnregistered {
    fn read(payload: &[u8]) -> Result<Self> {
        ensure!(
            payload.len() >= 16,
            SyntaxError::OutOfRange {
                field: "user_data_unregistered payloadSize",
                value: payload.len() as i64,
                min: 16,
                max: i64::MAX,
            }
        );

        let (uuid, data) = payload.split_at(16);
        let mut uuid_iso_iec_11578 = [0; 16];
        uuid_iso_iec_11578.copy_from_slice(uuid);

        Ok(Self {
            uuid_iso_iec_11578,
            data: data.to_vec(),
        })
    }

    /// UUID in 8-4-4-4-12 form.
    pub fn uuid(&self) -> String {
        let hex: String = self
            .uuid_iso_iec_11578
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();

        format!(
            "{}-{}-{}-{}-{}",
            &hex[..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SeiPayload {
    BufferingPeriod(BufferingPeriod),
    PicTiming(PicTiming),
    RecoveryPoint(RecoveryPoint),
    UserDataUnregistered(UserDataUnregistered),
    Unknown { payload_type: u32, data: Vec<u8> },
}

impl Display for SeiPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeiPayload::BufferingPeriod(_) => write!(f, "buffering_period"),
            SeiPayload::PicTiming(_) => write!(f, "pic_timing"),
            SeiPayload::RecoveryPoint(_) => write!(f, "recovery_point"),
            SeiPayload::UserDataUnregistered(_) => write!(f, "user_data_unregistered"),
            SeiPayload::Unknown { payload_type, .. } => write!(f, "payload type {payload_type}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
    pub payload: SeiPayload,
}

impl SeiMessage {
    /// Decodes all messages of an SEI NAL unit.
    pub fn read_all(state: &ParserState, nal_type: NalUnitType, rbsp: &Rbsp) -> Result<Vec<Self>> {
        let data = rbsp.as_ref();
        let reader = &mut BsIoSliceReader::from_slice(data);
        let mut messages = Vec::new();

        while reader.more_rbsp_data()? {
            let payload_type = read_ff_coded(reader).context(SeiError::TruncatedHeader)?;
            let payload_size = read_ff_coded(reader).context(SeiError::TruncatedHeader)?;

            let start = (reader.position()? / 8) as usize;
            let size = payload_size as usize;
            let available = data.len() - start;
            if size > available {
                bail!(SeiError::PayloadOverflow {
                    payload_type,
                    size,
                    available,
                });
            }

            let payload = &data[start..start + size];
            let message = Self {
                payload_type,
                payload_size,
                payload: Self::read_payload(state, nal_type, payload_type, payload)?,
            };
            trace!("SEI {} ({payload_size} bytes)", message.payload);

            messages.push(message);
            reader.skip_n(payload_size * 8)?;
        }

        Ok(messages)
    }

    fn read_payload(
        state: &ParserState,
        nal_type: NalUnitType,
        payload_type: u32,
        payload: &[u8],
    ) -> Result<SeiPayload> {
        let reader = &mut BsIoSliceReader::from_slice(payload);
        let prefix = nal_type == NalUnitType::PrefixSei;

        let decoded = match payload_type {
            BUFFERING_PERIOD if prefix => {
                SeiPayload::BufferingPeriod(BufferingPeriod::read(state, reader)?)
            }
            PIC_TIMING if prefix => SeiPayload::PicTiming(PicTiming::read(state, reader)?),
            RECOVERY_POINT if prefix => SeiPayload::RecoveryPoint(RecoveryPoint::read(reader)?),
            USER_DATA_UNREGISTERED => {
                SeiPayload::UserDataUnregistered(UserDataUnregistered::read(payload)?)
            }
            _ => {
                debug!("SEI: keeping payload type {payload_type} undecoded");
                SeiPayload::Unknown {
                    payload_type,
                    data: payload.to_vec(),
                }
            }
        };

        Ok(decoded)
    }
}

/// payloadType / payloadSize: 0xFF bytes add 255 each until a byte < 255.
fn read_ff_coded(reader: &mut BsIoSliceReader) -> Result<u32> {
    let mut value = 0u32;
    loop {
        let byte: u8 = reader.get_n(8)?;
        value = value.saturating_add(byte as u32);
        if byte != 0xFF {
            return Ok(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::store::ParameterSetStore;
    use crate::structs::hrd::HrdSubLayerInfo;
    use crate::structs::sps::Sps;
    use crate::structs::vui::Vui;
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;
    use crate::utils::errors::{ErrorKind, error_kind};

    /// SPS 0 with frame/field info and a NAL HRD using 24/16/20-bit delays.
    fn state_with_hrd() -> ParserState {
        let hrd = Hrd {
            nal_hrd_parameters_present_flag: true,
            au_cpb_removal_delay_length_minus1: 15,
            dpb_output_delay_length_minus1: 19,
            sub_layers: vec![HrdSubLayerInfo::default()],
            ..Default::default()
        };
        let sps = Sps {
            vui: Some(Vui {
                frame_field_info_present_flag: true,
                hrd_parameters_present_flag: true,
                hrd: Some(hrd),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut store = ParameterSetStore::default();
        store.insert_sps(sps);

        ParserState {
            store,
            ..Default::default()
        }
    }

    fn message(payload_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![payload_type, payload.len() as u8];
        bytes.extend_from_slice(payload);
        bytes
    }

    fn sei(messages: &[Vec<u8>]) -> Rbsp {
        let mut bytes = messages.concat();
        bytes.push(0x80);
        Rbsp::extract(&bytes)
    }

    #[test]
    fn buffering_period_and_pic_timing() -> anyhow::Result<()> {
        let state = state_with_hrd();

        let mut w = BitstreamIoWriter::new();
        w.put_ue(0).put(true).put_n(16, 7).put_n(20, 3);
        w.put(false).put_n(16, 0);
        w.put_n(24, 90000).put_n(24, 0).put_n(24, 1000).put_n(24, 5);
        let bp = w.into_bytes();

        let mut w = BitstreamIoWriter::new();
        w.put_n(4, 1).put_n(2, 1).put(false);
        w.put_n(16, 4).put_n(20, 2);
        let pt = w.into_bytes();

        let rbsp = sei(&[message(0, &bp), message(1, &pt)]);
        let messages = SeiMessage::read_all(&state, NalUnitType::PrefixSei, &rbsp)?;
        assert_eq!(messages.len(), 2);

        let SeiPayload::BufferingPeriod(bp) = &messages[0].payload else {
            panic!("expected a buffering period, got {}", messages[0].payload);
        };
        assert!(bp.irap_cpb_params_present_flag);
        assert_eq!((bp.cpb_delay_offset, bp.dpb_delay_offset), (7, 3));
        assert_eq!(bp.nal.len(), 1);
        assert_eq!(bp.nal[0].initial_cpb_removal_delay, 90000);
        assert_eq!(bp.nal[0].initial_alt_cpb_removal_offset, 5);
        assert!(bp.vcl.is_empty());

        let SeiPayload::PicTiming(pt) = &messages[1].payload else {
            panic!("expected picture timing, got {}", messages[1].payload);
        };
        assert_eq!(pt.pic_struct, PicStruct::TopField);
        assert_eq!(pt.source_scan_type, 1);
        assert_eq!(pt.au_cpb_removal_delay_minus1, 4);
        assert_eq!(pt.pic_dpb_output_delay, 2);

        Ok(())
    }

    #[test]
    fn extended_type_and_size() -> anyhow::Result<()> {
        let mut bytes = vec![0xFF, 0xFF, 0x05, 0xFF, 0x01];
        bytes.extend([0x11; 256]);
        bytes.push(0x80);
        let rbsp = Rbsp::extract(&bytes);

        let messages = SeiMessage::read_all(&ParserState::default(), NalUnitType::PrefixSei, &rbsp)?;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 515);
        assert_eq!(messages[0].payload_size, 256);
        assert!(matches!(
            &messages[0].payload,
            SeiPayload::Unknown { payload_type: 515, data } if data.len() == 256
        ));

        Ok(())
    }

    #[test]
    fn user_data_and_recovery_point() -> anyhow::Result<()> {
        let mut user_data: Vec<u8> = (0..16).collect();
        user_data.extend(b"x265");

        let mut w = BitstreamIoWriter::new();
        w.put_se(-2).put(true).put(false);
        let recovery = w.into_bytes();

        let rbsp = sei(&[message(5, &user_data), message(6, &recovery)]);
        let messages = SeiMessage::read_all(&ParserState::default(), NalUnitType::PrefixSei, &rbsp)?;

        let SeiPayload::UserDataUnregistered(udu) = &messages[0].payload else {
            panic!("expected user data, got {}", messages[0].payload);
        };
        assert_eq!(udu.uuid(), "00010203-0405-0607-0809-0a0b0c0d0e0f");
        assert_eq!(udu.data, b"x265");

        assert_eq!(
            messages[1].payload,
            SeiPayload::RecoveryPoint(RecoveryPoint {
                recovery_poc_cnt: -2,
                exact_match_flag: true,
                broken_link_flag: false,
            })
        );

        Ok(())
    }

    #[test]
    fn suffix_keeps_prefix_types_raw() -> anyhow::Result<()> {
        let rbsp = sei(&[message(1, &[0xAA])]);
        let messages = SeiMessage::read_all(&ParserState::default(), NalUnitType::SuffixSei, &rbsp)?;
        assert!(matches!(messages[0].payload, SeiPayload::Unknown { payload_type: 1, .. }));

        Ok(())
    }

    #[test]
    fn payload_overflow() {
        let rbsp = Rbsp::extract(&[0x01, 0x32, 0x00, 0x00, 0x80]);
        let err = SeiMessage::read_all(&state_with_hrd(), NalUnitType::PrefixSei, &rbsp)
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenData);
    }

    #[test]
    fn timing_without_sps() {
        let rbsp = sei(&[message(1, &[0x00])]);
        let err = SeiMessage::read_all(&ParserState::default(), NalUnitType::PrefixSei, &rbsp)
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
    }

    #[test]
    fn buffering_period_unknown_sps() {
        let mut w = BitstreamIoWriter::new();
        w.put_ue(3).put(false);
        let rbsp = sei(&[message(0, &w.into_bytes())]);
        let err = SeiMessage::read_all(&state_with_hrd(), NalUnitType::PrefixSei, &rbsp)
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
    }
}
