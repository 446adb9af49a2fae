use std::fmt::Display;

use crate::structs::pps::{MAX_PPS_COUNT, Pps};
use crate::structs::sps::{MAX_SPS_COUNT, Sps};
use crate::structs::vps::{MAX_VPS_COUNT, Vps};
use crate::utils::errors::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ParameterSetKind {
    Vps,
    Sps,
    Pps,
}

impl Display for ParameterSetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterSetKind::Vps => write!(f, "VPS"),
            ParameterSetKind::Sps => write!(f, "SPS"),
            ParameterSetKind::Pps => write!(f, "PPS"),
        }
    }
}

/// Parameter sets seen so far, indexed by id.
///
/// Inserting a set replaces the previous one with the same id and makes it
/// the "last parsed" set of its kind.
#[derive(Debug, Clone)]
pub struct ParameterSetStore {
    vps: [Option<Box<Vps>>; MAX_VPS_COUNT],
    sps: [Option<Box<Sps>>; MAX_SPS_COUNT],
    pps: [Option<Box<Pps>>; MAX_PPS_COUNT],

    last_vps: Option<u8>,
    last_sps: Option<u8>,
    last_pps: Option<u8>,
}

impl Default for ParameterSetStore {
    fn default() -> Self {
        Self {
            vps: std::array::from_fn(|_| None),
            sps: std::array::from_fn(|_| None),
            pps: std::array::from_fn(|_| None),
            last_vps: None,
            last_sps: None,
            last_pps: None,
        }
    }
}

fn resolve<T>(
    table: &[Option<Box<T>>],
    kind: ParameterSetKind,
    id: u32,
) -> Result<&T, ParseError> {
    let slot = table.get(id as usize).ok_or(ParseError::IdOutOfRange {
        kind,
        id,
        max: table.len() as u32 - 1,
    })?;

    slot.as_deref()
        .ok_or(ParseError::MissingParameterSet { kind, id })
}

fn insert<T>(table: &mut [Option<Box<T>>], id: u8, set: T) -> &T {
    &**table[id as usize].insert(Box::new(set))
}

impl ParameterSetStore {
    pub fn vps(&self, id: u8) -> Option<&Vps> {
        self.vps.get(id as usize)?.as_deref()
    }

    pub fn sps(&self, id: u8) -> Option<&Sps> {
        self.sps.get(id as usize)?.as_deref()
    }

    pub fn pps(&self, id: u8) -> Option<&Pps> {
        self.pps.get(id as usize)?.as_deref()
    }

    /// Looks up a VPS by a coded id, failing with `BrokenData` for ids
    /// beyond the table and `BrokenLink` for ids never parsed.
    pub fn resolve_vps(&self, id: u32) -> Result<&Vps, ParseError> {
        resolve(&self.vps, ParameterSetKind::Vps, id)
    }

    pub fn resolve_sps(&self, id: u32) -> Result<&Sps, ParseError> {
        resolve(&self.sps, ParameterSetKind::Sps, id)
    }

    pub fn resolve_pps(&self, id: u32) -> Result<&Pps, ParseError> {
        resolve(&self.pps, ParameterSetKind::Pps, id)
    }

    pub fn insert_vps(&mut self, vps: Vps) -> &Vps {
        let id = vps.id();
        self.last_vps = Some(id);
        insert(&mut self.vps, id, vps)
    }

    pub fn insert_sps(&mut self, sps: Sps) -> &Sps {
        let id = sps.id();
        self.last_sps = Some(id);
        insert(&mut self.sps, id, sps)
    }

    pub fn insert_pps(&mut self, pps: Pps) -> &Pps {
        let id = pps.id();
        self.last_pps = Some(id);
        insert(&mut self.pps, id, pps)
    }

    pub fn last_vps(&self) -> Option<&Vps> {
        self.vps(self.last_vps?)
    }

    pub fn last_sps(&self) -> Option<&Sps> {
        self.sps(self.last_sps?)
    }

    pub fn last_pps(&self) -> Option<&Pps> {
        self.pps(self.last_pps?)
    }

    /// The SPS that picture timing SEI messages are decoded against: the
    /// most recently parsed one.
    pub fn active_sps(&self) -> Result<&Sps, ParseError> {
        self.last_sps().ok_or(ParseError::NoActiveSps)
    }

    pub fn vps_iter(&self) -> impl Iterator<Item = &Vps> {
        self.vps.iter().filter_map(|slot| slot.as_deref())
    }

    pub fn sps_iter(&self) -> impl Iterator<Item = &Sps> {
        self.sps.iter().filter_map(|slot| slot.as_deref())
    }

    pub fn pps_iter(&self) -> impl Iterator<Item = &Pps> {
        self.pps.iter().filter_map(|slot| slot.as_deref())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::{ErrorKind, error_kind};

    fn sps(id: u8, width: u32) -> Sps {
        Sps {
            sps_seq_parameter_set_id: id,
            width,
            ..Default::default()
        }
    }

    #[test]
    fn insert_replaces_and_tracks_last() {
        let mut store = ParameterSetStore::default();
        assert_eq!(store.active_sps(), Err(ParseError::NoActiveSps));

        store.insert_sps(sps(3, 1280));
        store.insert_sps(sps(1, 720));
        assert_eq!(store.active_sps().map(Sps::id), Ok(1));

        let replaced = store.insert_sps(sps(3, 1920));
        assert_eq!(replaced.width, 1920);
        assert_eq!(store.sps(3).map(|sps| sps.width), Some(1920));
        assert_eq!(store.last_sps().map(Sps::id), Some(3));
        assert_eq!(store.sps_iter().count(), 2);

        store.clear();
        assert!(store.sps(3).is_none());
        assert!(store.last_sps().is_none());
    }

    #[test]
    fn resolve_errors() {
        let store = ParameterSetStore::default();

        let missing = anyhow::Error::from(store.resolve_pps(5).unwrap_err());
        assert_eq!(error_kind(&missing), ErrorKind::BrokenLink);

        let out_of_range = store.resolve_pps(64).unwrap_err();
        assert_eq!(
            out_of_range,
            ParseError::IdOutOfRange {
                kind: ParameterSetKind::Pps,
                id: 64,
                max: 63
            }
        );
        assert_eq!(out_of_range.kind(), ErrorKind::BrokenData);
        assert!(store.resolve_vps(16).is_err());
    }
}
