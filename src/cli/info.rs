use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::MultiProgress;

use super::command::{Cli, InputArgs};
use super::stream::{WalkStats, walk_stream};
use crate::timestamp::time_str;
use hevc::process::parse::ParsedNal;
use hevc::process::store::ParameterSetStore;
use hevc::structs::nal::NalUnitType;
use hevc::structs::pps::Pps;
use hevc::structs::slice::SliceType;
use hevc::structs::sps::Sps;
use hevc::structs::vps::Vps;

pub fn cmd_info(args: &InputArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing HEVC stream: {}", args.input.display());

    let mut summary = StreamSummary::default();
    let (parser, stats) = walk_stream(args, cli, multi, |nal, parsed, _| {
        summary.record(nal.unit.nal_type, parsed.as_ref());
        Ok(())
    })?;

    let store = parser.store();
    if store.last_sps().is_none() {
        println!("No sequence parameter set found in the stream.");
        println!("This doesn't appear to be a valid HEVC stream.");
    } else {
        println!();
        println!("HEVC Stream Information");
        println!("=======================");
        println!();

        display_parameter_sets(store);
    }

    summary.display(store.last_sps(), &stats);

    Ok(())
}

#[derive(Debug, Default)]
struct StreamSummary {
    nal_types: BTreeMap<NalUnitType, usize>,
    /// B, P, I
    slice_types: [usize; 3],
    pictures: usize,
}

impl StreamSummary {
    fn record(&mut self, nal_type: NalUnitType, parsed: Option<&ParsedNal>) {
        *self.nal_types.entry(nal_type).or_default() += 1;

        if let Some(ParsedNal::Slice(slice)) = parsed {
            if slice.first_slice_segment_in_pic_flag {
                self.pictures += 1;
            }
            if !slice.dependent_slice_segment_flag {
                let index = match slice.slice_type {
                    SliceType::B => 0,
                    SliceType::P => 1,
                    SliceType::I => 2,
                };
                self.slice_types[index] += 1;
            }
        }
    }

    fn duration_secs(&self, sps: Option<&Sps>) -> Option<f64> {
        let sps = sps?;
        (sps.fps_num != 0)
            .then(|| self.pictures as f64 * sps.fps_den as f64 / sps.fps_num as f64)
    }

    fn display(&self, sps: Option<&Sps>, stats: &WalkStats) {
        println!("NAL Unit Types");
        for (nal_type, count) in &self.nal_types {
            println!("  {:<26}{count}", nal_type.to_string());
        }
        println!();

        println!("Analysis Summary");
        println!("  NAL units                 {}", stats.nals);
        println!("  Pictures                  {}", self.pictures);
        println!(
            "  Slices (I/P/B)            {}/{}/{}",
            self.slice_types[2], self.slice_types[1], self.slice_types[0]
        );

        // Format file size
        let size_mb = stats.total_bytes as f64 / 1_000_000.0;
        println!(
            "  Size                      {size_mb:.2} MB ({} bytes)",
            stats.total_bytes
        );

        if let Some(duration_secs) = self.duration_secs(sps) {
            println!("  Duration                  {}", time_str(duration_secs));

            // Calculate average bit rate
            if duration_secs > 0.0 {
                let avg_kbps = (stats.total_bytes as f64 * 8.0) / (duration_secs * 1000.0);
                println!("  Average bit rate          {avg_kbps:.1} kbps");
            }
        }

        println!("  Errors                    {}", stats.errors());
        println!();
    }
}

fn display_parameter_sets(store: &ParameterSetStore) {
    if let Some(vps) = store.last_vps() {
        display_vps(vps);
    }
    if let Some(sps) = store.last_sps() {
        display_sps(sps);
    }
    if let Some(pps) = store.last_pps() {
        display_pps(pps);
    }
}

fn display_vps(vps: &Vps) {
    println!("Video Parameter Set {}", vps.id());
    println!("  Sub-layers                {}", vps.vps_max_sub_layers_minus1 + 1);
    println!("  Layer sets                {}", vps.vps_num_layer_sets_minus1 + 1);
    println!("  HRD entries               {}", vps.hrd_entries.len());
    println!();
}

fn chroma_format(sps: &Sps) -> &'static str {
    match (sps.chroma_format_idc, sps.separate_colour_plane_flag) {
        (0, _) => "4:0:0",
        (1, _) => "4:2:0",
        (2, _) => "4:2:2",
        (_, false) => "4:4:4",
        (_, true) => "4:4:4 (separate planes)",
    }
}

fn display_sps(sps: &Sps) {
    println!("Sequence Parameter Set {}", sps.id());
    println!(
        "  Profile                   {}@L{}@{}",
        sps.ptl.profile(),
        sps.ptl.level(),
        sps.ptl.tier()
    );
    println!("  Coded size                {}x{}", sps.width, sps.height);
    println!(
        "  Display size              {}x{}",
        sps.crop_rect_width, sps.crop_rect_height
    );
    if sps.crop_rect_width != sps.width || sps.crop_rect_height != sps.height {
        println!(
            "  Crop offset               {},{}",
            sps.crop_rect_x, sps.crop_rect_y
        );
    }
    println!("  Chroma format             {}", chroma_format(sps));
    println!(
        "  Bit depth                 {} (luma) / {} (chroma)",
        sps.bit_depth_luma(),
        sps.bit_depth_chroma()
    );
    println!(
        "  CTB size                  {0}x{0} ({1}x{2} CTBs)",
        sps.ctb_size_y, sps.pic_width_in_ctbs_y, sps.pic_height_in_ctbs_y
    );

    if sps.fps_num != 0 {
        println!(
            "  Frame rate                {:.3} fps ({}/{})",
            sps.fps_num as f64 / sps.fps_den as f64,
            sps.fps_num,
            sps.fps_den
        );
    } else {
        println!("  Frame rate                unknown");
    }

    if let Some(vui) = sps.vui.as_ref().filter(|vui| vui.colour_description_present_flag) {
        println!(
            "  Colour description        primaries {}, transfer {}, matrix {}{}",
            vui.colour_primaries,
            vui.transfer_characteristics,
            vui.matrix_coeffs,
            if vui.video_full_range_flag {
                ", full range"
            } else {
                ""
            }
        );
    }
    println!();
}

fn display_pps(pps: &Pps) {
    println!("Picture Parameter Set {}", pps.id());
    println!("  Tiles                     {}", pps.num_tiles());
    println!(
        "  Wavefront                 {}",
        pps.entropy_coding_sync_enabled_flag
    );
    println!(
        "  Weighted prediction       {} (P) / {} (B)",
        pps.weighted_pred_flag, pps.weighted_bipred_flag
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_sps_frame_rate() {
        let summary = StreamSummary {
            pictures: 120,
            ..Default::default()
        };
        let sps = Sps {
            fps_num: 24000,
            fps_den: 1001,
            ..Default::default()
        };

        let duration = summary.duration_secs(Some(&sps)).unwrap();
        assert!((duration - 5.005).abs() < 1e-9);

        let unknown = Sps {
            fps_num: 0,
            fps_den: 1,
            ..Default::default()
        };
        assert!(summary.duration_secs(Some(&unknown)).is_none());
        assert!(summary.duration_secs(None).is_none());
    }
}
