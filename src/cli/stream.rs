use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{Cli, InputArgs};
use crate::input::InputReader;
use hevc::process::extract::{Extractor, Nal};
use hevc::process::parse::{ParsedNal, Parser};
use hevc::utils::errors::error_kind;

/// Counters collected while walking a stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    pub nals: usize,
    pub extract_errors: usize,
    pub parse_errors: usize,
    pub total_bytes: usize,
}

impl WalkStats {
    pub fn errors(&self) -> usize {
        self.extract_errors + self.parse_errors
    }
}

/// Feeds the input through the extractor and parser, calling `on_nal` for
/// every extracted unit with its parse result (`None` when parsing failed).
///
/// Errors are logged and counted; with `--strict` the first one aborts.
pub fn walk_stream<F>(
    args: &InputArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
    mut on_nal: F,
) -> Result<(Parser, WalkStats)>
where
    F: FnMut(&Nal, Option<ParsedNal>, &Parser) -> Result<()>,
{
    let mut input_reader = InputReader::new(&args.input)?;
    let mut extractor = Extractor::new(args.framing());
    let mut parser = Parser::default();

    // Configure fail level based on strict mode
    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    parser.set_fail_level(fail_level);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Reading NAL units...");
            Some(pb)
        }
        None => None,
    };

    let mut stats = WalkStats::default();
    let mut drain = |extractor: &mut Extractor, stats: &mut WalkStats| -> Result<()> {
        for nal_result in extractor.by_ref() {
            let nal = match nal_result {
                Ok(nal) => nal,
                Err(e) => {
                    stats.extract_errors += 1;
                    if cli.strict {
                        return Err(anyhow!(e));
                    }
                    log::warn!("NAL extraction error ({}): {e}", e.kind());
                    continue;
                }
            };

            let parsed = match parser.parse_nal(&nal.data, &nal.unit) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    stats.parse_errors += 1;
                    if cli.strict {
                        return Err(e.context(format!(
                            "{} at offset {}",
                            nal.unit.nal_type, nal.stream_offset
                        )));
                    }
                    log::warn!(
                        "Parse error ({}) in {} at offset {}: {e:#}",
                        error_kind(&e),
                        nal.unit.nal_type,
                        nal.stream_offset
                    );
                    None
                }
            };

            on_nal(&nal, parsed, &parser)?;
            stats.nals += 1;

            if stats.nals.is_multiple_of(1000) {
                if let Some(ref pb) = pb {
                    pb.set_message(format!("Reading NAL units...      {}", stats.nals));
                    pb.tick();
                }
            }
        }

        Ok(())
    };

    input_reader.process_chunks(64 * 1024, |chunk| {
        stats.total_bytes += chunk.len();
        extractor.push_bytes(chunk);
        drain(&mut extractor, &mut stats)?;

        Ok(true)
    })?;

    extractor.finish();
    drain(&mut extractor, &mut stats)?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    Ok((parser, stats))
}
