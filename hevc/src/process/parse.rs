use anyhow::Result;
use log::trace;

use crate::process::store::ParameterSetStore;
use crate::structs::nal::{NalUnit, NalUnitType};
use crate::structs::pps::Pps;
use crate::structs::sei::SeiMessage;
use crate::structs::slice::SliceHeader;
use crate::structs::sps::Sps;
use crate::structs::vps::Vps;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ParseError;
use crate::utils::rbsp::Rbsp;

/// Parses NAL units into parameter sets, slice headers and SEI messages.
///
/// Parameter sets are kept in the parser's [`ParameterSetStore`] so later
/// units can reference them by id. A unit that fails to parse leaves the
/// store untouched.
///
/// ```rust,no_run
/// use hevc::process::extract::annex_b_units;
/// use hevc::process::parse::{ParsedNal, Parser};
///
/// let data = std::fs::read("stream.hevc")?;
/// let mut parser = Parser::default();
///
/// for unit in annex_b_units(&data) {
///     if let ParsedNal::Slice(slice) = parser.parse_nal(&data, &unit?)? {
///         println!("{} slice, POC lsb {}", slice.slice_type, slice.slice_pic_order_cnt_lsb);
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    state: ParserState,
}

/// Result of [`Parser::parse_nal`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNal {
    /// Id of the VPS installed in the store.
    Vps(u8),
    Sps(u8),
    Pps(u8),
    Slice(Box<SliceHeader>),
    Sei(Vec<SeiMessage>),
    /// Unit types without a syntax parser (AUD, filler data, reserved).
    Other(NalUnitType),
}

impl Parser {
    /// Sets the failure level for tolerated conformance problems.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    /// Disables VUI decoding; SPS parsing stops after `vui_parameters_present_flag`.
    pub fn set_parse_vui_params(&mut self, parse_vui_params: bool) {
        self.state.parse_vui_params = parse_vui_params;
    }

    pub fn store(&self) -> &ParameterSetStore {
        &self.state.store
    }

    pub fn parse_vps(&mut self, data: &[u8], nalu: &NalUnit) -> Result<&Vps> {
        let rbsp = Self::rbsp(data, nalu, "VPS", |t| t == NalUnitType::Vps)?;
        let vps = Vps::read(&self.state, &mut BsIoSliceReader::from_slice(rbsp.as_ref()))?;

        Ok(self.state.store.insert_vps(vps))
    }

    pub fn parse_sps(&mut self, data: &[u8], nalu: &NalUnit) -> Result<&Sps> {
        let rbsp = Self::rbsp(data, nalu, "SPS", |t| t == NalUnitType::Sps)?;
        let sps = Sps::read(&self.state, &mut BsIoSliceReader::from_slice(rbsp.as_ref()))?;

        Ok(self.state.store.insert_sps(sps))
    }

    pub fn parse_pps(&mut self, data: &[u8], nalu: &NalUnit) -> Result<&Pps> {
        let rbsp = Self::rbsp(data, nalu, "PPS", |t| t == NalUnitType::Pps)?;
        let pps = Pps::read(&self.state, &mut BsIoSliceReader::from_slice(rbsp.as_ref()))?;

        Ok(self.state.store.insert_pps(pps))
    }

    pub fn parse_slice_header(&self, data: &[u8], nalu: &NalUnit) -> Result<SliceHeader> {
        let rbsp = Self::rbsp(data, nalu, "slice segment", NalUnitType::is_slice)?;
        SliceHeader::read(&self.state, nalu, &rbsp)
    }

    pub fn parse_sei(&self, data: &[u8], nalu: &NalUnit) -> Result<Vec<SeiMessage>> {
        let rbsp = Self::rbsp(data, nalu, "SEI", NalUnitType::is_sei)?;
        SeiMessage::read_all(&self.state, nalu.nal_type, &rbsp)
    }

    /// Dispatches a unit to the parser for its type.
    pub fn parse_nal(&mut self, data: &[u8], nalu: &NalUnit) -> Result<ParsedNal> {
        let parsed = match nalu.nal_type {
            NalUnitType::Vps => ParsedNal::Vps(self.parse_vps(data, nalu)?.id()),
            NalUnitType::Sps => ParsedNal::Sps(self.parse_sps(data, nalu)?.id()),
            NalUnitType::Pps => ParsedNal::Pps(self.parse_pps(data, nalu)?.id()),
            t if t.is_slice() => ParsedNal::Slice(Box::new(self.parse_slice_header(data, nalu)?)),
            t if t.is_sei() => ParsedNal::Sei(self.parse_sei(data, nalu)?),
            t => {
                trace!("{t}: no syntax to parse");
                ParsedNal::Other(t)
            }
        };

        Ok(parsed)
    }

    fn rbsp(
        data: &[u8],
        nalu: &NalUnit,
        expected: &'static str,
        accepts: fn(NalUnitType) -> bool,
    ) -> Result<Rbsp, ParseError> {
        if !accepts(nalu.nal_type) {
            return Err(ParseError::UnexpectedNalType {
                expected,
                found: nalu.nal_type,
            });
        }
        if !nalu.valid {
            return Err(ParseError::InvalidNal);
        }

        let payload = nalu.payload(data).ok_or(ParseError::OutOfBuffer {
            offset: nalu.offset,
            end: nalu.end(),
            len: data.len(),
        })?;

        Ok(Rbsp::extract(payload))
    }
}

/// Settings and parameter sets shared by all structure readers.
#[derive(Debug)]
pub struct ParserState {
    pub fail_level: log::Level,
    pub parse_vui_params: bool,
    pub store: ParameterSetStore,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            parse_vui_params: true,
            store: ParameterSetStore::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::extract::annex_b_units;
    use crate::structs::pps::tests::{PpsOptions, pps_rbsp};
    use crate::structs::sps::tests::{SpsOptions, sps_rbsp};
    use crate::structs::vps::tests::vps_rbsp;
    use crate::utils::errors::{ErrorKind, error_kind};
    use crate::utils::rbsp::escape;

    fn push_nal(stream: &mut Vec<u8>, nal_type: u8, rbsp: &[u8]) {
        stream.extend([0, 0, 0, 1, nal_type << 1, 0x01]);
        stream.extend(escape(rbsp));
    }

    fn parameter_sets() -> Vec<u8> {
        let mut stream = Vec::new();
        push_nal(&mut stream, 32, &vps_rbsp(0));
        push_nal(&mut stream, 33, &sps_rbsp(0, 0, &SpsOptions::default()));
        push_nal(&mut stream, 34, &pps_rbsp(0, 0, &PpsOptions::default()));
        stream
    }

    #[test]
    fn stream_of_parameter_sets() -> anyhow::Result<()> {
        let stream = parameter_sets();
        let mut parser = Parser::default();

        let parsed = annex_b_units(&stream)
            .map(|unit| parser.parse_nal(&stream, &unit?))
            .collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(parsed, [ParsedNal::Vps(0), ParsedNal::Sps(0), ParsedNal::Pps(0)]);

        let store = parser.store();
        let sps = store.active_sps()?;
        assert_eq!((sps.crop_rect_width, sps.crop_rect_height), (1920, 1072));
        assert_eq!(store.last_pps().map(Pps::id), Some(0));

        Ok(())
    }

    #[test]
    fn reparse_is_idempotent() -> anyhow::Result<()> {
        let stream = parameter_sets();
        let units: Vec<_> = annex_b_units(&stream).collect::<Result<_, _>>()?;
        let mut parser = Parser::default();

        parser.parse_vps(&stream, &units[0])?;
        let first = parser.parse_sps(&stream, &units[1])?.clone();
        let second = parser.parse_sps(&stream, &units[1])?;
        assert_eq!(&first, second);
        assert_eq!(parser.store().sps_iter().count(), 1);

        Ok(())
    }

    #[test]
    fn unknown_pps_leaves_store_unchanged() -> anyhow::Result<()> {
        let mut stream = parameter_sets();
        // TRAIL_R, first_slice_segment_in_pic_flag = 1, pps id 5
        stream.extend([0, 0, 1, 0x02, 0x01, 0x9A]);
        let units: Vec<_> = annex_b_units(&stream).collect::<Result<_, _>>()?;
        let mut parser = Parser::default();

        for unit in &units[..3] {
            parser.parse_nal(&stream, unit)?;
        }
        let before = parser.store().clone();

        let err = parser.parse_nal(&stream, &units[3]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
        assert_eq!(parser.store().pps_iter().count(), before.pps_iter().count());
        assert_eq!(parser.store().active_sps()?, before.active_sps()?);

        Ok(())
    }

    #[test]
    fn missing_vps_is_broken_link() -> anyhow::Result<()> {
        let stream = parameter_sets();
        let units: Vec<_> = annex_b_units(&stream).collect::<Result<_, _>>()?;
        let mut parser = Parser::default();

        let err = parser.parse_sps(&stream, &units[1]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::BrokenLink);
        assert!(parser.store().last_sps().is_none());

        Ok(())
    }

    #[test]
    fn unit_checks() -> anyhow::Result<()> {
        let stream = parameter_sets();
        let units: Vec<_> = annex_b_units(&stream).collect::<Result<_, _>>()?;
        let mut parser = Parser::default();

        let err = parser.parse_sps(&stream, &units[0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::UnexpectedNalType { expected: "SPS", found: NalUnitType::Vps })
        ));

        let mut invalid = units[0];
        invalid.valid = false;
        let err = parser.parse_vps(&stream, &invalid).unwrap_err();
        assert_eq!(err.downcast_ref::<ParseError>(), Some(&ParseError::InvalidNal));

        let err = parser.parse_vps(&stream[..10], &units[0]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Error);

        Ok(())
    }
}
