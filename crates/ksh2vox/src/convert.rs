use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::info;
use sdvx_model::{ConvertConfig, Diagnostics, KshDecoder, NoteCounts, VoxDecoder, VoxEncoder};

/// Outcome of converting one chart.
#[derive(Debug)]
pub struct ConvertReport {
    pub output: PathBuf,
    pub diagnostics: Diagnostics,
    pub counts: NoteCounts,
}

/// `chart.ksh` becomes `chart.vox` next to it.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("vox")
}

pub fn convert(input: &Path, output: &Path, config: &ConvertConfig) -> Result<ConvertReport> {
    let mut diagnostics = Diagnostics::new();
    let song = KshDecoder::decode(input, &mut diagnostics)?;
    let chart = &song.chart_info;

    let counts = chart.note_counts();
    let radar = chart.radar();
    info!("Converted {} (level {})", song.song_info.title, chart.level);
    info!(
        "Notes: chip {} long {} vol {} (max chain {}, max EX score {})",
        counts.chip,
        counts.long,
        counts.vol,
        chart.max_chain(),
        chart.max_ex_score()
    );
    info!("Radar: {radar:?}");

    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    VoxEncoder::new(config).encode(chart, &mut writer)?;
    writer.flush()?;
    info!("Wrote {}", output.display());

    Ok(ConvertReport {
        output: output.to_path_buf(),
        diagnostics,
        counts,
    })
}

/// Read a written VOX file back and compare its note counts with the source.
pub fn verify(report: &ConvertReport) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    let chart = VoxDecoder::decode(&report.output, &mut diagnostics)?;
    if !diagnostics.is_empty() {
        bail!(
            "{} warnings while reading back {}",
            diagnostics.len(),
            report.output.display()
        );
    }
    let counts = chart.note_counts();
    if counts != report.counts {
        bail!(
            "note counts changed after round trip: {:?} -> {:?}",
            report.counts,
            counts
        );
    }
    info!("Round trip check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CHART: &str = "title=Test\nartist=Someone\nt=120\nver=167\n--\n\
        1000|00|--\n0100|00|--\n0010|00|--\n0001|00|--\n--\n\
        2000|00|0-\n2000|00|:-\n2000|00|:-\n0000|00|o-\n--\n";

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("songs/chart.ksh")),
            PathBuf::from("songs/chart.vox")
        );
    }

    #[test]
    fn test_convert_and_verify() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("chart.ksh");
        fs::write(&input, CHART).unwrap();
        let output = default_output_path(&input);

        let config = ConvertConfig::default();
        let report = convert(&input, &output, &config).unwrap();
        assert_eq!(report.counts.chip, 4);

        let vox = fs::read_to_string(&output).unwrap();
        assert!(vox.contains("#FORMAT VERSION\n12\n"));
        verify(&report).unwrap();
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("missing.ksh");
        let output = dir.path().join("missing.vox");
        assert!(convert(&input, &output, &ConvertConfig::default()).is_err());
    }
}
