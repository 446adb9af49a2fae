//! st_ref_pic_set() syntax (7.3.7) and the derivation of 7.4.8.
//!
//! A set is either coded explicitly as POC deltas or predicted from an
//! earlier set (`inter_ref_pic_set_prediction_flag`). Both forms are resolved
//! to the same DeltaPocS0/S1 arrays at parse time; the derived values are
//! exposed read-only.

use anyhow::{Result, bail, ensure};
use log::trace;

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::RpsError;

/// Upper bound on pictures in one set (MaxDpbSize).
pub const MAX_DELTA_POCS: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShortTermRefPicSet {
    pub inter_ref_pic_set_prediction_flag: bool,
    pub delta_idx_minus1: u8,
    pub delta_rps_sign: bool,
    pub abs_delta_rps_minus1: u16,
    /// Prediction flags, one per picture of the reference set plus one.
    pub used_by_curr_pic_flag: Vec<bool>,
    pub use_delta_flag: Vec<bool>,

    delta_poc_s0: Vec<i32>,
    delta_poc_s1: Vec<i32>,
    used_by_curr_pic_s0: Vec<bool>,
    used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRefPicSet {
    /// Reads set `idx`. `sets` holds the sets already decoded for the SPS;
    /// `idx == sets.len() == num_short_term_ref_pic_sets` reads the set coded
    /// in a slice header.
    pub fn read(
        reader: &mut BsIoSliceReader,
        idx: usize,
        sets: &[ShortTermRefPicSet],
        num_short_term_ref_pic_sets: usize,
    ) -> Result<Self> {
        let mut rps = Self::default();

        if idx != 0 {
            rps.inter_ref_pic_set_prediction_flag = reader.get()?;
        }

        if rps.inter_ref_pic_set_prediction_flag {
            if idx == num_short_term_ref_pic_sets {
                rps.delta_idx_minus1 = reader.get_ue_max("delta_idx_minus1", idx as u32 - 1)? as u8;
            }

            let ref_idx = idx - (rps.delta_idx_minus1 as usize + 1);
            let Some(ref_rps) = sets.get(ref_idx) else {
                bail!(RpsError::MissingReference { idx, ref_idx });
            };

            rps.delta_rps_sign = reader.get()?;
            rps.abs_delta_rps_minus1 = reader.get_ue_max("abs_delta_rps_minus1", 0x7FFF)? as u16;

            for _ in 0..=ref_rps.num_delta_pocs() {
                let used = reader.get()?;
                let use_delta = if used { true } else { reader.get()? };
                rps.used_by_curr_pic_flag.push(used);
                rps.use_delta_flag.push(use_delta);
            }

            rps.predict_from(ref_rps);
        } else {
            let num_negative_pics =
                reader.get_ue_max("num_negative_pics", MAX_DELTA_POCS as u32)? as usize;
            let num_positive_pics = reader.get_ue_max(
                "num_positive_pics",
                (MAX_DELTA_POCS - num_negative_pics) as u32,
            )? as usize;

            let mut poc = 0i32;
            for _ in 0..num_negative_pics {
                let delta_poc_s0_minus1 = reader.get_ue_max("delta_poc_s0_minus1", 0x7FFF)? as i32;
                poc -= delta_poc_s0_minus1 + 1;
                rps.delta_poc_s0.push(poc);
                rps.used_by_curr_pic_s0.push(reader.get()?);
            }

            poc = 0;
            for _ in 0..num_positive_pics {
                let delta_poc_s1_minus1 = reader.get_ue_max("delta_poc_s1_minus1", 0x7FFF)? as i32;
                poc += delta_poc_s1_minus1 + 1;
                rps.delta_poc_s1.push(poc);
                rps.used_by_curr_pic_s1.push(reader.get()?);
            }
        }

        ensure!(
            rps.num_delta_pocs() <= MAX_DELTA_POCS,
            RpsError::TooManyPictures {
                idx,
                count: rps.num_delta_pocs()
            }
        );

        trace!(
            "st_ref_pic_set({idx}): S0 {:?}, S1 {:?}",
            rps.delta_poc_s0, rps.delta_poc_s1
        );

        Ok(rps)
    }

    /// Equations 7-61 and 7-62.
    fn predict_from(&mut self, ref_rps: &ShortTermRefPicSet) {
        let delta_rps =
            (1 - 2 * self.delta_rps_sign as i32) * (self.abs_delta_rps_minus1 as i32 + 1);
        let num_negative = ref_rps.num_negative_pics();
        let num_delta = ref_rps.num_delta_pocs();

        for (j, &d_poc) in ref_rps.delta_poc_s1.iter().enumerate().rev() {
            let d_poc = d_poc + delta_rps;
            if d_poc < 0 && self.use_delta_flag[num_negative + j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0
                    .push(self.used_by_curr_pic_flag[num_negative + j]);
            }
        }
        if delta_rps < 0 && self.use_delta_flag[num_delta] {
            self.delta_poc_s0.push(delta_rps);
            self.used_by_curr_pic_s0
                .push(self.used_by_curr_pic_flag[num_delta]);
        }
        for (j, &d_poc) in ref_rps.delta_poc_s0.iter().enumerate() {
            let d_poc = d_poc + delta_rps;
            if d_poc < 0 && self.use_delta_flag[j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0.push(self.used_by_curr_pic_flag[j]);
            }
        }

        for (j, &d_poc) in ref_rps.delta_poc_s0.iter().enumerate().rev() {
            let d_poc = d_poc + delta_rps;
            if d_poc > 0 && self.use_delta_flag[j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1.push(self.used_by_curr_pic_flag[j]);
            }
        }
        if delta_rps > 0 && self.use_delta_flag[num_delta] {
            self.delta_poc_s1.push(delta_rps);
            self.used_by_curr_pic_s1
                .push(self.used_by_curr_pic_flag[num_delta]);
        }
        for (j, &d_poc) in ref_rps.delta_poc_s1.iter().enumerate() {
            let d_poc = d_poc + delta_rps;
            if d_poc > 0 && self.use_delta_flag[num_negative + j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1
                    .push(self.used_by_curr_pic_flag[num_negative + j]);
            }
        }
    }

    /// NumNegativePics
    pub fn num_negative_pics(&self) -> usize {
        self.delta_poc_s0.len()
    }

    /// NumPositivePics
    pub fn num_positive_pics(&self) -> usize {
        self.delta_poc_s1.len()
    }

    /// NumDeltaPocs
    pub fn num_delta_pocs(&self) -> usize {
        self.delta_poc_s0.len() + self.delta_poc_s1.len()
    }

    /// DeltaPocS0, decreasing.
    pub fn delta_poc_s0(&self) -> &[i32] {
        &self.delta_poc_s0
    }

    /// DeltaPocS1, increasing.
    pub fn delta_poc_s1(&self) -> &[i32] {
        &self.delta_poc_s1
    }

    pub fn used_by_curr_pic_s0(&self) -> &[bool] {
        &self.used_by_curr_pic_s0
    }

    pub fn used_by_curr_pic_s1(&self) -> &[bool] {
        &self.used_by_curr_pic_s1
    }

    /// Pictures of the set used for reference by the current picture.
    pub fn num_used_by_curr_pic(&self) -> usize {
        self.used_by_curr_pic_s0
            .iter()
            .chain(&self.used_by_curr_pic_s1)
            .filter(|&&used| used)
            .count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::bitstream_io::writer::BitstreamIoWriter;

    /// Writes an explicit set from (delta_poc_minus1, used) pairs.
    pub(crate) fn put_explicit(w: &mut BitstreamIoWriter, s0: &[(u32, bool)], s1: &[(u32, bool)]) {
        w.put_ue(s0.len() as u32).put_ue(s1.len() as u32);
        for &(delta, used) in s0.iter().chain(s1) {
            w.put_ue(delta).put(used);
        }
    }

    fn read_all(bytes: &[u8], count: usize) -> anyhow::Result<Vec<ShortTermRefPicSet>> {
        let reader = &mut BsIoSliceReader::from_slice(bytes);
        let mut sets = Vec::new();
        for idx in 0..count {
            let rps = ShortTermRefPicSet::read(reader, idx, &sets, count)?;
            sets.push(rps);
        }
        Ok(sets)
    }

    #[test]
    fn explicit_set() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_explicit(&mut w, &[(0, true), (1, false)], &[(1, true)]);
        let sets = read_all(&w.into_bytes(), 1)?;

        let rps = &sets[0];
        assert_eq!(rps.delta_poc_s0(), [-1, -3]);
        assert_eq!(rps.delta_poc_s1(), [2]);
        assert_eq!(rps.used_by_curr_pic_s0(), [true, false]);
        assert_eq!(rps.num_delta_pocs(), 3);
        assert_eq!(rps.num_used_by_curr_pic(), 2);

        Ok(())
    }

    #[test]
    fn predicted_from_previous_set() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_explicit(&mut w, &[(0, true), (1, true)], &[(1, true)]);
        w.put(false);
        put_explicit(&mut w, &[(0, true), (0, true), (1, true)], &[(0, true)]);
        // predicts from set 1 with deltaRps = -1
        w.put(true);
        w.put(true).put_ue(0);
        for _ in 0..5 {
            w.put(true);
        }
        let sets = read_all(&w.into_bytes(), 3)?;

        assert_eq!(sets[1].delta_poc_s0(), [-1, -2, -4]);
        assert_eq!(sets[1].delta_poc_s1(), [1]);

        // S1 = [1] shifted by -1 drops out, deltaRps itself joins S0
        assert_eq!(sets[2].delta_poc_s0(), [-1, -2, -3, -5]);
        assert!(sets[2].delta_poc_s1().is_empty());
        assert_eq!(sets[2].delta_idx_minus1, 0);

        Ok(())
    }

    #[test]
    fn slice_header_prediction_reproduces_explicit_set() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_explicit(&mut w, &[(0, true), (1, true)], &[(1, true)]);
        let base = read_all(&w.into_bytes(), 1)?;

        // inline set (idx == num_short_term_ref_pic_sets == 1)
        let mut w = BitstreamIoWriter::new();
        w.put(true); // inter_ref_pic_set_prediction_flag
        w.put_ue(0); // delta_idx_minus1
        w.put(true).put_ue(0); // deltaRps = -1
        for _ in 0..4 {
            w.put(true);
        }
        let bytes = w.into_bytes();
        let predicted =
            ShortTermRefPicSet::read(&mut BsIoSliceReader::from_slice(&bytes), 1, &base, 1)?;

        let mut w = BitstreamIoWriter::new();
        put_explicit(&mut w, &[(0, true), (0, true), (1, true)], &[(0, true)]);
        let explicit = read_all(&w.into_bytes(), 1)?;

        assert_eq!(predicted.delta_poc_s0(), explicit[0].delta_poc_s0());
        assert_eq!(predicted.delta_poc_s1(), explicit[0].delta_poc_s1());
        assert_eq!(
            predicted.used_by_curr_pic_s0(),
            explicit[0].used_by_curr_pic_s0()
        );
        assert_eq!(predicted.num_negative_pics(), 3);
        assert_eq!(predicted.num_positive_pics(), 1);

        Ok(())
    }

    #[test]
    fn dropped_pictures() -> anyhow::Result<()> {
        let mut w = BitstreamIoWriter::new();
        put_explicit(&mut w, &[(0, true), (1, true)], &[(1, true)]);
        let base = read_all(&w.into_bytes(), 1)?;

        // deltaRps = +1; drop the picture at -3 via use_delta_flag = 0
        let mut w = BitstreamIoWriter::new();
        w.put(true).put_ue(0);
        w.put(false).put_ue(0);
        w.put(true); // j = 0: -1 + 1 = 0, never stored
        w.put(false).put(false); // j = 1: -3 dropped
        w.put(false).put(true); // j = 2: 2 + 1 = 3, kept but unused
        w.put(true); // deltaRps itself
        let bytes = w.into_bytes();

        let rps = ShortTermRefPicSet::read(&mut BsIoSliceReader::from_slice(&bytes), 1, &base, 1)?;
        assert!(rps.delta_poc_s0().is_empty());
        assert_eq!(rps.delta_poc_s1(), [1, 3]);
        assert_eq!(rps.used_by_curr_pic_s1(), [true, false]);

        Ok(())
    }

    #[test]
    fn too_many_pictures() {
        let mut w = BitstreamIoWriter::new();
        w.put_ue(17);
        let bytes = w.into_bytes();
        assert!(ShortTermRefPicSet::read(&mut BsIoSliceReader::from_slice(&bytes), 0, &[], 1).is_err());
    }
}
