use std::sync::Arc;

use log::{trace, warn};

use crate::structs::nal::{NalHeader, NalUnit, NalUnitType};
use crate::utils::errors::ExtractError;

/// How NAL units are delimited in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Annex B byte stream with `00 00 01` / `00 00 00 01` start codes.
    #[default]
    AnnexB,
    /// Every unit is preceded by a big-endian length field of 1, 2 or 4 bytes.
    LengthPrefixed(u8),
}

/// Returns `(sc_offset, offset)` of the first start code at or after `from`.
///
/// `sc_offset` includes the leading zero of a four byte start code.
fn find_start_code(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    let window = buffer.get(from..)?;
    let pos = window.windows(3).position(|w| w == [0, 0, 1])? + from;

    let sc_offset = if pos > from && buffer[pos - 1] == 0 {
        pos - 1
    } else {
        pos
    };

    Some((sc_offset, pos + 3))
}

fn trim_trailing_zeros(buffer: &[u8], offset: usize, mut end: usize) -> usize {
    while end > offset && buffer[end - 1] == 0 {
        end -= 1;
    }
    end
}

fn read_header(buffer: &[u8], offset: usize) -> Result<NalHeader, ExtractError> {
    let bytes = buffer
        .get(offset..offset + NalUnit::HEADER_BYTES)
        .ok_or(ExtractError::NoNalEnd)?;
    let header = NalHeader::from_bytes([bytes[0], bytes[1]]);

    if header.forbidden_zero_bit {
        return Err(ExtractError::ForbiddenZeroBit {
            offset,
            resume: offset,
        });
    }
    if header.temporal_id_plus1 == 0 {
        warn!("NAL unit at offset {offset}: nuh_temporal_id_plus1 is zero");
    }

    Ok(header)
}

/// Start code search and header validation shared by the Annex B scanners.
fn locate(buffer: &[u8], start_offset: usize) -> Result<(NalHeader, usize, usize), ExtractError> {
    let (sc_offset, offset) = find_start_code(buffer, start_offset).ok_or(ExtractError::NoNal)?;
    let header = read_header(buffer, offset)?;

    Ok((header, sc_offset, offset))
}

fn validated(mut unit: NalUnit) -> NalUnit {
    unit.valid = true;
    trace!(
        "{} at {}: {} bytes, layer {}, tid {}",
        unit.nal_type,
        unit.offset,
        unit.size,
        unit.layer_id,
        unit.temporal_id()
    );
    unit
}

fn ends_stream(nal_type: NalUnitType) -> bool {
    matches!(nal_type, NalUnitType::Eos | NalUnitType::Eob)
}

/// Finds the next Annex B unit at or after `start_offset`.
///
/// The unit ends where the next start code begins, minus trailing zero bytes.
/// End-of-sequence and end-of-bitstream units need no terminator.
pub fn identify_next(buffer: &[u8], start_offset: usize) -> Result<NalUnit, ExtractError> {
    identify_next_from(buffer, start_offset, 0)
}

/// [`identify_next`] with the terminator search starting no earlier than
/// `search_from`, for callers that already scanned a prefix of the unit.
fn identify_next_from(
    buffer: &[u8],
    start_offset: usize,
    search_from: usize,
) -> Result<NalUnit, ExtractError> {
    let (header, sc_offset, offset) = locate(buffer, start_offset)?;

    if ends_stream(header.nal_type) {
        return Ok(validated(NalUnit::new(
            header,
            sc_offset,
            offset,
            NalUnit::HEADER_BYTES,
        )));
    }

    let search_from = search_from.max(offset + NalUnit::HEADER_BYTES);
    let (next_sc, _) = find_start_code(buffer, search_from).ok_or(ExtractError::NoNalEnd)?;
    let end = trim_trailing_zeros(buffer, offset, next_sc);
    let size = end - offset;

    if size < 3 {
        return Err(ExtractError::TooShort {
            offset,
            size,
            resume: next_sc,
        });
    }

    Ok(validated(NalUnit::new(header, sc_offset, offset, size)))
}

/// Like [`identify_next`], but the unit runs to the end of the buffer.
///
/// Used for the final unit of a complete buffer, where no terminating start
/// code exists.
pub fn identify_next_unchecked(buffer: &[u8], start_offset: usize) -> Result<NalUnit, ExtractError> {
    let (header, sc_offset, offset) = locate(buffer, start_offset)?;

    let size = if ends_stream(header.nal_type) {
        NalUnit::HEADER_BYTES
    } else {
        trim_trailing_zeros(buffer, offset + NalUnit::HEADER_BYTES, buffer.len()) - offset
    };

    Ok(validated(NalUnit::new(header, sc_offset, offset, size)))
}

/// Finds the unit whose length field starts at `offset`.
pub fn identify_next_length_prefixed(
    buffer: &[u8],
    offset: usize,
    nal_length_size: u8,
) -> Result<NalUnit, ExtractError> {
    if !matches!(nal_length_size, 1 | 2 | 4) {
        return Err(ExtractError::InvalidLengthSize(nal_length_size));
    }
    if offset >= buffer.len() {
        return Err(ExtractError::NoNal);
    }

    let body = offset + nal_length_size as usize;
    let length_field = buffer.get(offset..body).ok_or(ExtractError::NoNalEnd)?;
    let size = length_field
        .iter()
        .fold(0usize, |acc, &byte| (acc << 8) | byte as usize);

    let end = body + size;
    if end > buffer.len() {
        return Err(ExtractError::NoNalEnd);
    }
    if size < NalUnit::HEADER_BYTES {
        return Err(ExtractError::TooShort {
            offset: body,
            size,
            resume: end,
        });
    }

    let header = read_header(buffer, body).map_err(|err| match err {
        ExtractError::ForbiddenZeroBit { offset, .. } => {
            ExtractError::ForbiddenZeroBit { offset, resume: end }
        }
        other => other,
    })?;

    Ok(validated(NalUnit::new(header, offset, body, size)))
}

/// All units of a complete Annex B buffer, in order.
pub fn annex_b_units(buffer: &[u8]) -> AnnexBUnits<'_> {
    AnnexBUnits {
        buffer,
        offset: 0,
        done: false,
    }
}

/// Iterator returned by [`annex_b_units`].
///
/// Corrupt units are yielded as errors and scanning continues behind them.
#[derive(Debug, Clone)]
pub struct AnnexBUnits<'a> {
    buffer: &'a [u8],
    offset: usize,
    done: bool,
}

impl Iterator for AnnexBUnits<'_> {
    type Item = Result<NalUnit, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = match identify_next(self.buffer, self.offset) {
            Err(ExtractError::NoNalEnd) => {
                self.done = true;
                identify_next_unchecked(self.buffer, self.offset)
            }
            other => other,
        };

        match result {
            Ok(unit) => {
                self.offset = unit.end();
                Some(Ok(unit))
            }
            Err(ExtractError::NoNal) => {
                self.done = true;
                None
            }
            Err(err) => {
                match err.resume_offset() {
                    Some(resume) => self.offset = resume,
                    None => self.done = true,
                }
                Some(Err(err))
            }
        }
    }
}

/// A NAL unit yielded by the streaming [`Extractor`].
///
/// `data` holds the start code (or length field) followed by the unit;
/// `unit` is rebased onto `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nal {
    pub unit: NalUnit,
    /// Stream position of the start code or length field.
    pub stream_offset: usize,
    pub data: Arc<[u8]>,
}

impl Nal {
    /// Header and payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.unit.offset..self.unit.end()]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes()[self.unit.header_bytes..]
    }
}

impl AsRef<[u8]> for Nal {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Incremental NAL unit extraction from a byte stream.
///
/// Feed data with [`push_bytes`](Extractor::push_bytes) and drain units by
/// iterating. A unit is yielded once its terminator is buffered; iteration
/// returns `None` while more data is needed and resumes after the next push.
/// Call [`finish`](Extractor::finish) at end of stream to flush the last unit.
///
/// ```rust
/// use hevc::process::extract::{Extractor, Framing};
///
/// let mut extractor = Extractor::new(Framing::AnnexB);
/// extractor.push_bytes(&[0, 0, 0, 1, 0x40, 0x01, 0x0C, 0, 0, 1, 0x42, 0x01]);
/// assert_eq!(extractor.by_ref().filter_map(Result::ok).count(), 1);
///
/// extractor.push_bytes(&[0x01, 0x60]);
/// extractor.finish();
/// assert_eq!(extractor.by_ref().filter_map(Result::ok).count(), 1);
/// ```
#[derive(Debug)]
pub struct Extractor {
    framing: Framing,
    buffer: Vec<u8>,
    /// Read position in `buffer`; bytes before it are already consumed.
    start: usize,
    /// Offset from `start` where the pending terminator search resumes.
    scanned: usize,
    consumed: usize,
    finished: bool,
    nals_extracted: usize,
    error_count: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Framing::AnnexB)
    }
}

impl Extractor {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::with_capacity(64 * 1024),
            start: 0,
            scanned: 0,
            consumed: 0,
            finished: false,
            nals_extracted: 0,
            error_count: 0,
        }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        // compact once the consumed prefix outweighs the pending bytes
        if self.start > 0 && self.start >= self.buffer.len() - self.start {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Marks the end of the stream so the trailing unit can be emitted.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn nals_extracted(&self) -> usize {
        self.nals_extracted
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Bytes held back waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.start
    }

    fn pending(&self) -> &[u8] {
        &self.buffer[self.start..]
    }

    fn consume_front(&mut self, count: usize) {
        let count = count.min(self.buffered());
        self.start += count;
        self.consumed += count;
        self.scanned = 0;
    }

    fn emit(&mut self, unit: NalUnit) -> Nal {
        let data: Arc<[u8]> = self.pending()[unit.sc_offset..unit.end()].into();
        let nal = Nal {
            unit: NalUnit {
                sc_offset: 0,
                offset: unit.offset - unit.sc_offset,
                ..unit
            },
            stream_offset: self.consumed + unit.sc_offset,
            data,
        };

        self.consume_front(unit.end());
        self.nals_extracted += 1;
        nal
    }

    fn fail(&mut self, err: ExtractError) -> Option<Result<Nal, ExtractError>> {
        self.error_count += 1;
        match err.resume_offset() {
            Some(resume) => self.consume_front(resume),
            None => self.consume_front(self.buffered()),
        }
        Some(Err(err))
    }

    fn next_annex_b(&mut self) -> Option<Result<Nal, ExtractError>> {
        match identify_next_from(self.pending(), 0, self.scanned) {
            Ok(unit) => Some(Ok(self.emit(unit))),
            Err(ExtractError::NoNal) => {
                // a start code may straddle the next push
                let keep = if self.finished { 0 } else { 3 };
                self.consume_front(self.buffered().saturating_sub(keep));
                None
            }
            Err(ExtractError::NoNalEnd) if self.finished => {
                match identify_next_unchecked(self.pending(), 0) {
                    Ok(unit) => Some(Ok(self.emit(unit))),
                    Err(err) => self.fail(err),
                }
            }
            Err(ExtractError::NoNalEnd) => {
                // resume behind the last full window, a terminator may straddle the push
                self.scanned = self.buffered().saturating_sub(3);
                None
            }
            Err(err) => self.fail(err),
        }
    }

    fn next_length_prefixed(&mut self, nal_length_size: u8) -> Option<Result<Nal, ExtractError>> {
        match identify_next_length_prefixed(self.pending(), 0, nal_length_size) {
            Ok(unit) => Some(Ok(self.emit(unit))),
            Err(ExtractError::NoNal) => None,
            Err(ExtractError::NoNalEnd) if self.finished => self.fail(ExtractError::NoNalEnd),
            Err(ExtractError::NoNalEnd) => None,
            Err(err) => self.fail(err),
        }
    }
}

impl Iterator for Extractor {
    type Item = Result<Nal, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.framing {
            Framing::AnnexB => self.next_annex_b(),
            Framing::LengthPrefixed(size) => self.next_length_prefixed(size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ErrorKind;

    /// VPS, SPS and PPS headers with 3 and 4 byte start codes.
    const STREAM: &[u8] = &[
        0, 0, 0, 1, 0x40, 0x01, 0x0C, 0x01, //
        0, 0, 1, 0x42, 0x01, 0x01, 0x60, 0x00, //
        0, 0, 0, 1, 0x44, 0x01, 0xC1, 0x72,
    ];

    #[test]
    fn mixed_start_codes() {
        let units: Vec<_> = annex_b_units(STREAM).collect::<Result<_, _>>().unwrap();
        assert_eq!(units.len(), 3);

        assert_eq!(units[0].nal_type, NalUnitType::Vps);
        assert_eq!((units[0].sc_offset, units[0].offset, units[0].size), (0, 4, 4));

        // trailing zero of the SPS belongs to the next start code
        assert_eq!(units[1].nal_type, NalUnitType::Sps);
        assert_eq!((units[1].sc_offset, units[1].offset, units[1].size), (8, 11, 4));

        assert_eq!(units[2].nal_type, NalUnitType::Pps);
        assert_eq!((units[2].sc_offset, units[2].offset, units[2].size), (16, 20, 4));
        assert!(units.iter().all(|unit| unit.valid));
    }

    #[test]
    fn missing_start_code_and_terminator() {
        assert_eq!(identify_next(&[], 0), Err(ExtractError::NoNal));
        assert_eq!(identify_next(&[0x12, 0x00, 0x00, 0x02], 0), Err(ExtractError::NoNal));

        assert_eq!(identify_next(&[0, 0, 1, 0x40], 0), Err(ExtractError::NoNalEnd));
        assert_eq!(identify_next(&STREAM[8..], 3), Err(ExtractError::NoNalEnd));

        let last = identify_next_unchecked(STREAM, 16).unwrap();
        assert_eq!((last.offset, last.size), (20, 4));
        assert_eq!(
            identify_next_unchecked(&[0, 0, 1, 0x40], 0),
            Err(ExtractError::NoNalEnd)
        );
    }

    #[test]
    fn end_of_sequence_needs_no_terminator() {
        let unit = identify_next(&[0, 0, 1, 0x48, 0x01], 0).unwrap();
        assert_eq!(unit.nal_type, NalUnitType::Eos);
        assert_eq!(unit.size, 2);
    }

    #[test]
    fn corrupt_units() {
        let forbidden = [0, 0, 1, 0xC0, 0x01, 0xAA, 0, 0, 1, 0x42, 0x01, 0x01];
        let err = identify_next(&forbidden, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenData);

        let results: Vec<_> = annex_b_units(&forbidden).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap().nal_type, NalUnitType::Sps);

        let short = [0, 0, 1, 0x40, 0x01, 0, 0, 1, 0x42, 0x01, 0x01];
        assert!(matches!(
            identify_next(&short, 0),
            Err(ExtractError::TooShort { size: 2, resume: 5, .. })
        ));
    }

    #[test]
    fn length_prefixed() {
        let buffer = [0, 3, 0x40, 0x01, 0x0C, 0, 2, 0x4E, 0x01, 0, 9, 0x42];

        let first = identify_next_length_prefixed(&buffer, 0, 2).unwrap();
        assert_eq!((first.sc_offset, first.offset, first.size), (0, 2, 3));
        let second = identify_next_length_prefixed(&buffer, first.end(), 2).unwrap();
        assert_eq!(second.nal_type, NalUnitType::PrefixSei);
        assert_eq!(second.end(), 9);

        assert_eq!(
            identify_next_length_prefixed(&buffer, second.end(), 2),
            Err(ExtractError::NoNalEnd)
        );
        assert_eq!(
            identify_next_length_prefixed(&buffer, buffer.len(), 2),
            Err(ExtractError::NoNal)
        );
        assert_eq!(
            identify_next_length_prefixed(&buffer, 0, 3).unwrap_err().kind(),
            ErrorKind::Error
        );
        assert_eq!(
            identify_next_length_prefixed(&[1, 0x40], 0, 1).unwrap_err().kind(),
            ErrorKind::BrokenData
        );
    }

    #[test]
    fn streaming_byte_by_byte() {
        let mut stream = vec![0xAB, 0xCD, 0x00];
        stream.extend_from_slice(STREAM);

        let mut extractor = Extractor::default();
        let mut nals = Vec::new();
        for byte in &stream {
            extractor.push_bytes(&[*byte]);
            nals.extend(extractor.by_ref().map(Result::unwrap));
        }
        assert_eq!(nals.len(), 2);

        extractor.finish();
        nals.extend(extractor.by_ref().map(Result::unwrap));
        assert_eq!(nals.len(), 3);
        assert_eq!(extractor.nals_extracted(), 3);
        assert_eq!(extractor.buffered(), 0);

        let offsets: Vec<_> = nals.iter().map(|nal| nal.stream_offset).collect();
        assert_eq!(offsets, [3, 11, 19]);
        assert_eq!(nals[1].bytes(), &[0x42, 0x01, 0x01, 0x60]);
        assert_eq!(nals[2].payload(), &[0xC1, 0x72]);
    }

    #[test]
    fn streaming_resync() {
        let mut stream = vec![0, 0, 1, 0xC0, 0x01, 0xAA];
        stream.extend_from_slice(STREAM);

        let mut extractor = Extractor::new(Framing::AnnexB);
        extractor.push_bytes(&stream);
        extractor.finish();

        let results: Vec<_> = extractor.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap_err().kind(), ErrorKind::BrokenData);
        assert!(results[1..].iter().all(Result::is_ok));
        assert_eq!(extractor.error_count(), 1);
    }

    #[test]
    fn streaming_terminator_across_pushes() {
        let mut extractor = Extractor::default();
        extractor.push_bytes(&[0, 0, 1, 0x40, 0x01, 0x0C, 0x01, 0x00]);
        assert!(extractor.next().is_none());
        assert_eq!(extractor.scanned, 5);

        extractor.push_bytes(&[0x00]);
        assert!(extractor.next().is_none());
        assert_eq!(extractor.scanned, 6);

        extractor.push_bytes(&[0x01, 0x42, 0x01]);
        let nal = extractor.next().unwrap().unwrap();
        assert_eq!(nal.unit.nal_type, NalUnitType::Vps);
        assert_eq!(nal.bytes(), &[0x40, 0x01, 0x0C, 0x01]);
        assert!(extractor.next().is_none());
    }

    #[test]
    fn streaming_large_unit_in_chunks() {
        let mut stream = vec![0, 0, 1, 0x02, 0x01];
        stream.resize(1 << 20, 0x55);
        stream.extend_from_slice(&[0, 0, 1, 0x02, 0x01, 0x80]);

        let mut extractor = Extractor::default();
        let mut nals = Vec::new();
        for chunk in stream.chunks(4096) {
            extractor.push_bytes(chunk);
            nals.extend(extractor.by_ref().map(Result::unwrap));
            if nals.is_empty() {
                // only the bytes of the latest push are searched again
                assert_eq!(extractor.scanned, extractor.buffered() - 3);
            }
        }
        extractor.finish();
        nals.extend(extractor.by_ref().map(Result::unwrap));

        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].unit.size, (1 << 20) - 3);
        assert_eq!(nals[1].stream_offset, 1 << 20);
    }

    #[test]
    fn streaming_compacts_consumed_bytes() {
        let mut extractor = Extractor::default();
        for _ in 0..1000 {
            extractor.push_bytes(&[0, 0, 1, 0x02, 0x01, 0xAA]);
            for nal in extractor.by_ref() {
                nal.unwrap();
            }
        }
        assert_eq!(extractor.nals_extracted(), 999);
        assert!(extractor.buffer.len() < 32);
    }

    #[test]
    fn streaming_length_prefixed() {
        let mut extractor = Extractor::new(Framing::LengthPrefixed(4));
        extractor.push_bytes(&[0, 0, 0, 3, 0x40, 0x01]);
        assert!(extractor.next().is_none());

        extractor.push_bytes(&[0x0C, 0, 0, 0, 2]);
        let nal = extractor.next().unwrap().unwrap();
        assert_eq!(nal.unit.nal_type, NalUnitType::Vps);
        assert_eq!(nal.data.len(), 7);
        assert!(extractor.next().is_none());

        extractor.finish();
        assert_eq!(extractor.next(), Some(Err(ExtractError::NoNalEnd)));
        assert!(extractor.next().is_none());
    }
}
