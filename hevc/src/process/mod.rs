/// NAL unit extraction from Annex B and length-prefixed streams.
///
/// Provides the one-shot scanners ([`identify_next`](extract::identify_next),
/// [`annex_b_units`](extract::annex_b_units)) and the streaming
/// [`Extractor`](extract::Extractor).
pub mod extract;

/// NAL unit parsing into parameter sets, slice headers and SEI messages.
///
/// Provides the [`Parser`](parse::Parser), which owns the parameter set store.
pub mod parse;

/// Id-indexed tables of VPS, SPS and PPS.
pub mod store;
