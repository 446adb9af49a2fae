use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use serde::Serialize;

use super::command::{Cli, DumpArgs};
use super::stream::walk_stream;
use hevc::process::extract::Nal;
use hevc::process::parse::{ParsedNal, Parser};
use hevc::structs::nal::NalUnitType;
use hevc::structs::pps::Pps;
use hevc::structs::sei::SeiMessage;
use hevc::structs::slice::SliceHeader;
use hevc::structs::sps::Sps;
use hevc::structs::vps::Vps;

pub fn cmd_dump(args: &DumpArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Dumping HEVC stream: {}", args.input.input.display());

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut index = 0;
    let (_, stats) = walk_stream(&args.input, cli, multi, |nal, parsed, parser| {
        if let Some(parsed) = parsed {
            if let Some(document) = Document::new(index, nal, &parsed, parser) {
                write_document(&mut writer, &document)?;
            }
        }
        index += 1;
        Ok(())
    })?;

    writer.flush()?;

    if let Some(path) = &args.output {
        log::info!("Wrote {} NAL units to {}", stats.nals, path.display());
    }

    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Record<'a> {
    Vps(&'a Vps),
    Sps(&'a Sps),
    Pps(&'a Pps),
    Slice(&'a SliceHeader),
    Sei(&'a [SeiMessage]),
}

/// One YAML document per parsed NAL unit.
#[derive(Debug, Serialize)]
struct Document<'a> {
    index: usize,
    offset: usize,
    nal_type: NalUnitType,
    record: Record<'a>,
}

impl<'a> Document<'a> {
    fn new(index: usize, nal: &Nal, parsed: &'a ParsedNal, parser: &'a Parser) -> Option<Self> {
        let store = parser.store();
        let record = match parsed {
            ParsedNal::Vps(id) => Record::Vps(store.vps(*id)?),
            ParsedNal::Sps(id) => Record::Sps(store.sps(*id)?),
            ParsedNal::Pps(id) => Record::Pps(store.pps(*id)?),
            ParsedNal::Slice(slice) => Record::Slice(slice),
            ParsedNal::Sei(messages) => Record::Sei(messages),
            ParsedNal::Other(_) => return None,
        };

        Some(Self {
            index,
            offset: nal.stream_offset,
            nal_type: nal.unit.nal_type,
            record,
        })
    }
}

fn write_document<W: Write + ?Sized>(writer: &mut W, document: &Document) -> Result<()> {
    writeln!(writer, "---")?;
    writer.write_all(serde_yaml_ng::to_string(document)?.as_bytes())?;
    Ok(())
}
