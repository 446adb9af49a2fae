use anyhow::Result;
use indicatif::MultiProgress;

use super::command::{Cli, InputArgs};
use super::stream::walk_stream;
use hevc::process::extract::Nal;
use hevc::process::parse::ParsedNal;

pub fn cmd_nals(args: &InputArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Listing NAL units: {}", args.input.display());

    println!(
        "{:>8} {:>12} {:>8}  {:<12} {:>5} {:>3}  slice",
        "index", "offset", "size", "type", "layer", "tid"
    );

    let mut index = 0;
    let (_, stats) = walk_stream(args, cli, multi, |nal, parsed, _| {
        println!("{}", nal_line(index, nal, parsed.as_ref()));
        index += 1;
        Ok(())
    })?;

    log::info!(
        "{} NAL units, {} extraction errors, {} parse errors",
        stats.nals,
        stats.extract_errors,
        stats.parse_errors
    );

    Ok(())
}

fn nal_line(index: usize, nal: &Nal, parsed: Option<&ParsedNal>) -> String {
    let unit = &nal.unit;
    let mut line = format!(
        "{index:>8} {:>12} {:>8}  {:<12} {:>5} {:>3}",
        nal.stream_offset,
        unit.size,
        unit.nal_type.to_string(),
        unit.layer_id,
        unit.temporal_id()
    );

    if let Some(ParsedNal::Slice(slice)) = parsed {
        line.push_str(&format!(
            "  {} pps={} poc_lsb={} header={} bits",
            slice.slice_type,
            slice.slice_pic_parameter_set_id,
            slice.slice_pic_order_cnt_lsb,
            slice.header_size
        ));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use hevc::process::extract::{Extractor, Framing};

    #[test]
    fn line_for_non_slice_unit() {
        let mut extractor = Extractor::new(Framing::AnnexB);
        extractor.push_bytes(&[0xFF, 0, 0, 1, 0x46, 0x01, 0x10]);
        extractor.finish();
        let nal = extractor.next().unwrap().unwrap();

        let line = nal_line(7, &nal, Some(&ParsedNal::Other(nal.unit.nal_type)));
        assert_eq!(
            line,
            format!(
                "{:>8} {:>12} {:>8}  {:<12} {:>5} {:>3}",
                7, 1, 3, "AUD_NUT", 0, 0
            )
        );
    }
}
