//! NAL unit header and unit types.
//!
//! Every NAL unit starts with a two byte header:
//!
//! | bits | field                   |
//! |------|-------------------------|
//! | 1    | `forbidden_zero_bit`    |
//! | 6    | `nal_unit_type`         |
//! | 6    | `nuh_layer_id`          |
//! | 3    | `nuh_temporal_id_plus1` |

use std::fmt::Display;

/// `nal_unit_type` values (Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NalUnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    CraNut,
    Vps,
    Sps,
    Pps,
    Aud,
    Eos,
    Eob,
    Fd,
    PrefixSei,
    SuffixSei,
    /// Reserved VCL (10..=15, 22..=31) or non-VCL (41..=47) type.
    Reserved(u8),
    /// 48..=63
    Unspecified(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::CraNut,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::Fd,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            48..=63 => Self::Unspecified(value),
            _ => Self::Reserved(value),
        }
    }
}

impl NalUnitType {
    pub fn raw(self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::CraNut => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::Fd => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Reserved(value) | Self::Unspecified(value) => value,
        }
    }

    /// Coded slice segment types, including the reserved VCL range.
    pub fn is_vcl(self) -> bool {
        self.raw() < 32
    }

    /// Types that carry a slice segment this parser can decode.
    pub fn is_slice(self) -> bool {
        matches!(self.raw(), 0..=9 | 16..=21)
    }

    /// Intra random access point, 16..=23.
    pub fn is_irap(self) -> bool {
        (16..=23).contains(&self.raw())
    }

    pub fn is_idr(self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    pub fn is_bla(self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }

    pub fn is_cra(self) -> bool {
        self == Self::CraNut
    }

    pub fn is_radl(self) -> bool {
        matches!(self, Self::RadlN | Self::RadlR)
    }

    pub fn is_rasl(self) -> bool {
        matches!(self, Self::RaslN | Self::RaslR)
    }

    /// Sub-layer non-reference pictures (even types up to RSV_VCL_N14).
    pub fn is_sub_layer_non_reference(self) -> bool {
        let raw = self.raw();
        raw <= 14 && raw & 1 == 0
    }

    pub fn is_sei(self) -> bool {
        matches!(self, Self::PrefixSei | Self::SuffixSei)
    }
}

impl Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TrailN => "TRAIL_N",
            Self::TrailR => "TRAIL_R",
            Self::TsaN => "TSA_N",
            Self::TsaR => "TSA_R",
            Self::StsaN => "STSA_N",
            Self::StsaR => "STSA_R",
            Self::RadlN => "RADL_N",
            Self::RadlR => "RADL_R",
            Self::RaslN => "RASL_N",
            Self::RaslR => "RASL_R",
            Self::BlaWLp => "BLA_W_LP",
            Self::BlaWRadl => "BLA_W_RADL",
            Self::BlaNLp => "BLA_N_LP",
            Self::IdrWRadl => "IDR_W_RADL",
            Self::IdrNLp => "IDR_N_LP",
            Self::CraNut => "CRA_NUT",
            Self::Vps => "VPS_NUT",
            Self::Sps => "SPS_NUT",
            Self::Pps => "PPS_NUT",
            Self::Aud => "AUD_NUT",
            Self::Eos => "EOS_NUT",
            Self::Eob => "EOB_NUT",
            Self::Fd => "FD_NUT",
            Self::PrefixSei => "PREFIX_SEI_NUT",
            Self::SuffixSei => "SUFFIX_SEI_NUT",
            Self::Reserved(value) => return write!(f, "RSV_{value}"),
            Self::Unspecified(value) => return write!(f, "UNSPEC{value}"),
        };

        write!(f, "{name}")
    }
}

/// Decoded two byte NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub forbidden_zero_bit: bool,
    pub nal_type: NalUnitType,
    pub layer_id: u8,
    pub temporal_id_plus1: u8,
}

impl NalHeader {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            forbidden_zero_bit: bytes[0] & 0x80 != 0,
            nal_type: NalUnitType::from((bytes[0] >> 1) & 0x3F),
            layer_id: ((bytes[0] & 1) << 5) | (bytes[1] >> 3),
            temporal_id_plus1: bytes[1] & 0x07,
        }
    }
}

/// Location and header of one NAL unit inside a caller-owned buffer.
///
/// `offset` points at the first header byte and `size` covers the header and
/// payload. `sc_offset` points at the start code (Annex-B) or the length
/// field (length-prefixed framing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NalUnit {
    pub nal_type: NalUnitType,
    pub layer_id: u8,
    pub temporal_id_plus1: u8,
    pub sc_offset: usize,
    pub offset: usize,
    pub size: usize,
    pub header_bytes: usize,
    pub valid: bool,
}

impl NalUnit {
    pub const HEADER_BYTES: usize = 2;

    pub(crate) fn new(header: NalHeader, sc_offset: usize, offset: usize, size: usize) -> Self {
        Self {
            nal_type: header.nal_type,
            layer_id: header.layer_id,
            temporal_id_plus1: header.temporal_id_plus1,
            sc_offset,
            offset,
            size,
            header_bytes: Self::HEADER_BYTES,
            valid: false,
        }
    }

    /// TemporalId, `nuh_temporal_id_plus1 - 1`.
    pub fn temporal_id(&self) -> u8 {
        self.temporal_id_plus1.saturating_sub(1)
    }

    /// One past the last byte of the unit.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Header and payload bytes of the unit in `data`.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.offset..self.end())
    }

    /// Payload bytes following the header.
    pub fn payload<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        self.bytes(data)?.get(self.header_bytes..)
    }
}

#[test]
fn header_fields() {
    // SPS, layer 0, tid 1
    let header = NalHeader::from_bytes([0x42, 0x01]);
    assert!(!header.forbidden_zero_bit);
    assert_eq!(header.nal_type, NalUnitType::Sps);
    assert_eq!(header.layer_id, 0);
    assert_eq!(header.temporal_id_plus1, 1);

    let header = NalHeader::from_bytes([0xA7, 0xFA]);
    assert!(header.forbidden_zero_bit);
    assert_eq!(header.nal_type, NalUnitType::IdrWRadl);
    assert_eq!(header.layer_id, 0x3F);
    assert_eq!(header.temporal_id_plus1, 2);
}

#[test]
fn type_classes() {
    for raw in 0..64u8 {
        assert_eq!(NalUnitType::from(raw).raw(), raw);
    }

    assert!(NalUnitType::from(22).is_irap());
    assert!(!NalUnitType::from(22).is_slice());
    assert!(NalUnitType::CraNut.is_irap());
    assert!(NalUnitType::TrailN.is_sub_layer_non_reference());
    assert!(!NalUnitType::TrailR.is_sub_layer_non_reference());
    assert_eq!(NalUnitType::from(45), NalUnitType::Reserved(45));
    assert_eq!(NalUnitType::from(50).to_string(), "UNSPEC50");
    assert_eq!(NalUnitType::PrefixSei.to_string(), "PREFIX_SEI_NUT");
}
