// ksh2vox: convert K-Shoot MANIA charts to VOX

mod convert;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use sdvx_model::ConvertConfig;

use convert::{convert, default_output_path, verify};

#[derive(Parser, Debug)]
#[command(name = "ksh2vox", about = "Convert KSH charts to VOX")]
struct Args {
    /// KSH chart to convert.
    input: PathBuf,

    /// Output VOX path (defaults to the input with a .vox extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to converter config JSON file (defaults to ksh2vox.json).
    #[arg(long, env = "KSH2VOX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the written format version.
    #[arg(long, env = "KSH2VOX_FORMAT_VERSION")]
    format_version: Option<u32>,

    /// Leave the conversion time out of the header.
    #[arg(long)]
    no_timestamp: bool,

    /// Skip script blocks.
    #[arg(long)]
    no_scripts: bool,

    /// Exit with an error when the chart produced any warning.
    #[arg(long, env = "KSH2VOX_STRICT")]
    strict: bool,

    /// Read the written file back and compare note counts.
    #[arg(long)]
    check: bool,
}

impl Args {
    fn apply(&self, config: &mut ConvertConfig) {
        if let Some(version) = self.format_version {
            config.format_version = version;
        }
        if self.no_timestamp {
            config.include_timestamp = false;
        }
        if self.no_scripts {
            config.write_scripts = false;
        }
        if self.strict {
            config.strict = true;
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => ConvertConfig::load_from(path)?,
        None => ConvertConfig::load()?,
    };
    args.apply(&mut config);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    info!("{} -> {}", args.input.display(), output.display());

    let report = convert(&args.input, &output, &config)?;

    let warnings = report.diagnostics.warnings();
    if !warnings.is_empty() {
        warn!("{} warnings:", warnings.len());
        for warning in warnings {
            warn!("  {warning}");
        }
    }

    if args.check {
        verify(&report)?;
    }

    if config.strict && !warnings.is_empty() {
        error!("Strict mode: refusing a chart with warnings");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "ksh2vox",
            "chart.ksh",
            "--format-version",
            "10",
            "--no-scripts",
            "--strict",
        ]);
        let mut config = ConvertConfig::default();
        args.apply(&mut config);
        assert_eq!(config.format_version, 10);
        assert!(!config.write_scripts);
        assert!(config.include_timestamp);
        assert!(config.strict);
    }

    #[test]
    fn test_output_flag() {
        let args = Args::parse_from(["ksh2vox", "in.ksh", "-o", "out.vox"]);
        assert_eq!(args.output, Some(PathBuf::from("out.vox")));
        assert_eq!(args.config, None);

        let args = Args::parse_from(["ksh2vox", "in.ksh", "--config", "custom.json"]);
        assert_eq!(args.config, Some(PathBuf::from("custom.json")));
    }
}
