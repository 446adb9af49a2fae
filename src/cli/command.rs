use std::path::PathBuf;

use clap::builder::TypedValueParser;
use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use hevc::process::extract::Framing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nhevc ",
    env!("HEVC_VERSION"),
    "\nbuilt ",
    env!("BUILD_TIMESTAMP"),
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting HEVC/H.265 elementary streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print stream information
    Info(InputArgs),

    /// List every NAL unit of the stream.
    Nals(InputArgs),

    /// Write parsed parameter sets, slice headers and SEI messages as YAML.
    Dump(DumpArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input HEVC elementary stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// How NAL units are delimited.
    #[arg(long, value_enum, default_value_t = FramingArg::AnnexB)]
    pub framing: FramingArg,

    /// Size in bytes of the length field for length-prefixed input.
    #[arg(
        long,
        value_name = "BYTES",
        default_value_t = 4,
        value_parser = clap::builder::PossibleValuesParser::new(["1", "2", "4"])
            .map(|s| s.parse::<u8>().unwrap_or(4)),
    )]
    pub nal_length_size: u8,
}

impl InputArgs {
    pub fn framing(&self) -> Framing {
        match self.framing {
            FramingArg::AnnexB => Framing::AnnexB,
            FramingArg::LengthPrefixed => Framing::LengthPrefixed(self.nal_length_size),
        }
    }
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output file for the YAML documents (stdout when omitted).
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum FramingArg {
    /// Start code delimited byte stream (Annex B).
    AnnexB,
    /// Big-endian length field before every NAL unit.
    LengthPrefixed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_length_prefixed_input() {
        let cli = Cli::try_parse_from([
            "hevcd",
            "--strict",
            "nals",
            "stream.h265",
            "--framing",
            "length-prefixed",
            "--nal-length-size",
            "2",
        ])
        .unwrap();

        assert!(cli.strict);
        let Commands::Nals(args) = cli.command else {
            panic!("expected the nals command");
        };
        assert_eq!(args.framing(), Framing::LengthPrefixed(2));
    }

    #[test]
    fn reject_unsupported_length_size() {
        let result = Cli::try_parse_from(["hevcd", "info", "-", "--nal-length-size", "3"]);
        assert!(result.is_err());
    }
}
