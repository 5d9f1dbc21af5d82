// Reading VOX documents back into the chart model

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;

use crate::chart::ChartInfo;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::effect::{Effect, EffectEntry};
use crate::enums::{EasingType, FilterIndex, Lane, SegmentFlag, SpinType, TiltType};
use crate::error::ChartError;
use crate::filter::{AutoTabEntry, AutoTabSetting, Filter};
use crate::ksh_decode::detect_encoding_and_decode;
use crate::note::{AutoTabInfo, BtInfo, FxInfo, SpControllerInfo, VolInfo};
use crate::time::{Rational, TICKS_PER_BAR, TimePoint, TimeSignature};

/// Largest denominator tried when recovering an exact laser position.
const MAX_POSITION_DENOMINATOR: i64 = 256;
const POSITION_SCALE: i64 = 1_000_000;
// Bounds that keep time arithmetic away from overflow on hostile input
const MAX_MEASURE: u32 = 100_000;
const MAX_TICKS: i64 = 192 * 10_000;
const MAX_TIMESIG_TERM: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    FormatVersion,
    BeatInfo,
    BpmInfo,
    TiltModeInfo,
    EndPosition,
    TabEffect,
    FxButtonEffect,
    TabParamAssign,
    Track(Lane),
    AutoTab,
    Original(usize),
    SpController,
    ScriptedTrack(Lane),
    Ignored,
}

impl Section {
    fn from_header(name: &str) -> Option<Section> {
        let section = match name {
            "FORMAT VERSION" => Section::FormatVersion,
            "BEAT INFO" => Section::BeatInfo,
            "BPM INFO" => Section::BpmInfo,
            "TILT MODE INFO" => Section::TiltModeInfo,
            "END POSITION" => Section::EndPosition,
            "TAB EFFECT INFO" => Section::TabEffect,
            "FXBUTTON EFFECT INFO" => Section::FxButtonEffect,
            "TAB PARAM ASSIGN INFO" => Section::TabParamAssign,
            "TRACK AUTO TAB" => Section::AutoTab,
            "TRACK ORIGINAL L" => Section::Original(0),
            "TRACK ORIGINAL R" => Section::Original(1),
            "SPCONTROLER" | "SPCONTROLLER" => Section::SpController,
            "LYRIC INFO" | "REVERB EFFECT PARAM" | "SCRIPT_DEFINE" => Section::Ignored,
            _ => {
                if let Some(n) = name.strip_prefix("SCRIPTED_TRACK") {
                    return Lane::from_track_number(n.parse().ok()?).map(Section::ScriptedTrack);
                }
                let n = name.strip_prefix("TRACK")?;
                return Lane::from_track_number(n.parse().ok()?).map(Section::Track);
            }
        };
        Some(section)
    }
}

/// VOX chart decoder.
///
/// Reads everything the encoder writes. Which laser points were generated by
/// curve interpolation is recovered from the `ORIGINAL` tracks.
pub struct VoxDecoder;

impl VoxDecoder {
    pub fn decode(path: &Path, diag: &mut Diagnostics) -> Result<ChartInfo> {
        let raw_bytes = std::fs::read(path)?;
        let content = detect_encoding_and_decode(&raw_bytes);
        Self::decode_str(&content, diag)
    }

    pub fn decode_str(content: &str, diag: &mut Diagnostics) -> Result<ChartInfo> {
        let mut parser = VoxParser::new(diag);
        for (index, raw) in content.lines().enumerate() {
            parser.feed(index + 1, raw);
        }
        let chart = parser.finish()?;
        log::info!(
            "Decoded VOX: {} buttons, end measure {}",
            chart.note_data.button_count(),
            chart.end_measure
        );
        Ok(chart)
    }
}

struct VoxParser<'a> {
    diag: &'a mut Diagnostics,
    chart: ChartInfo,
    section: Section,
    format_version: Option<u32>,
    /// Lines of the section being read, flushed at `#END`
    pending: Vec<(usize, String)>,
    original_times: [BTreeSet<TimePoint>; 2],
    seen_original: [bool; 2],
    last_stop: bool,
}

impl<'a> VoxParser<'a> {
    fn new(diag: &'a mut Diagnostics) -> Self {
        let mut chart = ChartInfo::new();
        chart.bpms.clear();
        chart.tilt_type.clear();
        chart.spcontroller_data.zoom_top.clear();
        chart.spcontroller_data.zoom_bottom.clear();
        Self {
            diag,
            chart,
            section: Section::None,
            format_version: None,
            pending: Vec::new(),
            original_times: [BTreeSet::new(), BTreeSet::new()],
            seen_original: [false; 2],
            last_stop: false,
        }
    }

    fn feed(&mut self, line_no: usize, raw: &str) {
        let line = match raw.find("//") {
            Some(i) => &raw[..i],
            None => raw,
        };
        let line = line.trim_end();
        if line.trim().is_empty() {
            return;
        }

        if let Some(name) = line.strip_prefix('#') {
            let name = name.trim();
            if name == "END" {
                self.flush();
                self.section = Section::None;
                return;
            }
            if self.section != Section::None {
                self.flush();
            }
            self.section = match Section::from_header(name) {
                Some(section) => section,
                None => {
                    self.diag.warn_line(
                        WarningKind::UnrecognizedLine,
                        line_no,
                        format!("unknown section #{name}"),
                    );
                    Section::Ignored
                }
            };
            return;
        }

        match self.section {
            Section::Ignored => {}
            Section::None => self.diag.warn_line(
                WarningKind::UnrecognizedLine,
                line_no,
                format!("line outside any section: {}", line.trim()),
            ),
            _ => self.pending.push((line_no, line.trim().to_string())),
        }
    }

    fn flush(&mut self) {
        let lines = std::mem::take(&mut self.pending);
        let result = match self.section {
            Section::TabEffect => self.read_filters(&lines),
            Section::FxButtonEffect => self.read_effects(&lines),
            Section::TabParamAssign => self.read_autotab_params(&lines),
            Section::Track(lane) if lane.is_vol() => self.read_vol_track(lane, &lines),
            Section::Original(index) => {
                self.seen_original[index] = true;
                self.read_original(index, &lines)
            }
            _ => {
                for (line_no, line) in &lines {
                    if let Err(e) = self.read_line(line) {
                        self.diag.warn_line(WarningKind::MalformedValue, *line_no, e.to_string());
                    }
                }
                Ok(())
            }
        };
        if let Err(e) = result {
            let line_no = lines.first().map_or(0, |(n, _)| *n);
            self.diag.warn_line(WarningKind::MalformedValue, line_no, e.to_string());
        }
        if let Section::ScriptedTrack(lane) = self.section {
            self.close_scripts(lane);
        }
        // Timing tables may have changed
        self.chart.invalidate_caches();
    }

    fn finish(mut self) -> Result<ChartInfo> {
        if self.section != Section::None {
            self.flush();
        }
        let Some(version) = self.format_version else {
            return Err(ChartError::MalformedVox("missing #FORMAT VERSION".to_string()).into());
        };
        log::debug!("VOX format version {version}");
        if self.chart.bpms.is_empty() {
            self.chart.bpms.insert(TimePoint::default(), 120.0);
        }
        for zoom in [
            &mut self.chart.spcontroller_data.zoom_top,
            &mut self.chart.spcontroller_data.zoom_bottom,
        ] {
            zoom.entry(TimePoint::default())
                .or_insert(SpControllerInfo::new(0.0, 0.0, SegmentFlag::START));
        }
        if self.chart.tilt_type.is_empty() {
            self.chart.tilt_type.insert(TimePoint::default(), TiltType::Normal);
        }

        for (index, times) in self.original_times.iter().enumerate() {
            if !self.seen_original[index] {
                continue;
            }
            for (time, point) in self.chart.note_data.vol[index].iter_mut() {
                point.interpolated = !times.contains(time);
            }
        }

        self.chart.invalidate_caches();
        Ok(self.chart)
    }

    /// Sections that are read one line at a time.
    fn read_line(&mut self, line: &str) -> Result<(), ChartError> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        match self.section {
            Section::FormatVersion => {
                self.format_version = Some(parse_int(fields[0])?);
            }
            Section::BeatInfo => {
                let time = self.parse_time(fields[0])?;
                let (upper, lower): (u32, u32) = (field(&fields, 1)?, field(&fields, 2)?);
                if upper > MAX_TIMESIG_TERM || lower > MAX_TIMESIG_TERM {
                    return Err(ChartError::InvalidTimeSignature { upper, lower });
                }
                let timesig = TimeSignature::new(upper, lower)?;
                self.chart.timesigs.insert(time, timesig);
            }
            Section::BpmInfo => {
                let time = self.parse_time(fields[0])?;
                let bpm: f64 = field(&fields, 1)?;
                let stopped = fields.get(2).is_some_and(|f| f.ends_with('-'));
                let previous = self.chart.bpms.values().next_back().copied();
                if previous != Some(bpm) {
                    self.chart.bpms.insert(time, bpm);
                }
                if stopped != self.last_stop {
                    self.chart.stops.insert(time, stopped);
                    self.last_stop = stopped;
                }
            }
            Section::TiltModeInfo => {
                let time = self.parse_time(fields[0])?;
                let value: u8 = field(&fields, 1)?;
                let tilt = TiltType::from_value(value)
                    .ok_or_else(|| ChartError::MalformedVox(format!("unknown tilt mode {value}")))?;
                self.chart.tilt_type.insert(time, tilt);
            }
            Section::EndPosition => {
                self.chart.end_measure = self.parse_time(fields[0])?.measure();
            }
            Section::Track(lane) => self.read_button(lane, &fields)?,
            Section::AutoTab => {
                let time = self.parse_time(fields[0])?;
                let ticks = ticks_field(&fields, 1)?;
                let which: u32 = field(&fields, 2)?;
                let which = which
                    .checked_sub(2)
                    .ok_or_else(|| ChartError::MalformedVox(format!("auto tab index {which}")))?;
                self.chart.autotab_infos.insert(
                    time,
                    AutoTabInfo {
                        which,
                        duration: Rational::new(ticks, TICKS_PER_BAR),
                    },
                );
            }
            Section::SpController => self.read_spcontroller(&fields)?,
            Section::ScriptedTrack(lane) => {
                let mut words = line.split_whitespace();
                let time = self.parse_time(words.next().unwrap_or_default())?;
                let ids = words
                    .map(parse_int::<u32>)
                    .collect::<Result<Vec<u32>, ChartError>>()?;
                let segments = self.chart.script_ids.entry(lane).or_default();
                if segments.values().next_back() != Some(&ids) {
                    segments.insert(time, ids);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_button(&mut self, lane: Lane, fields: &[&str]) -> Result<(), ChartError> {
        let time = self.parse_time(fields[0])?;
        let ticks = ticks_field(fields, 1)?;
        let duration = Rational::new(ticks, TICKS_PER_BAR);
        let notes = &mut self.chart.note_data;
        match lane {
            Lane::FxL | Lane::FxR => {
                let special: u32 = field(fields, 2)?;
                // Holds carry the effect slot offset by two
                let special = if ticks == 0 { special } else { special.saturating_sub(2) };
                notes.fx[usize::from(lane == Lane::FxR)]
                    .insert(time, FxInfo::new(duration, special)?);
            }
            _ => {
                let index = lane.track_number() as usize - 3;
                notes.bt[index].insert(time, BtInfo::new(duration)?);
            }
        }
        Ok(())
    }

    fn read_vol_track(&mut self, lane: Lane, lines: &[(usize, String)]) -> Result<(), ChartError> {
        let index = usize::from(lane == Lane::VolR);
        for (line_no, time, point) in self.read_vol_points(lines) {
            match point {
                Ok(point) => {
                    self.chart.note_data.vol[index].insert(time, point);
                }
                Err(e) => self.diag.warn_line(WarningKind::MalformedValue, line_no, e.to_string()),
            }
        }
        Ok(())
    }

    fn read_original(&mut self, index: usize, lines: &[(usize, String)]) -> Result<(), ChartError> {
        let times: Vec<TimePoint> = self
            .read_vol_points(lines)
            .into_iter()
            .map(|(_, time, _)| time)
            .collect();
        self.original_times[index].extend(times);
        Ok(())
    }

    /// Group laser lines into points; two lines at one time form a slam.
    fn read_vol_points(
        &mut self,
        lines: &[(usize, String)],
    ) -> Vec<(usize, TimePoint, Result<VolInfo, ChartError>)> {
        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            match self.parse_vol_row(&fields) {
                Ok(row) => rows.push((*line_no, row)),
                Err(e) => self.diag.warn_line(WarningKind::MalformedValue, *line_no, e.to_string()),
            }
        }

        let mut points = Vec::new();
        let mut i = 0;
        while i < rows.len() {
            let (line_no, first) = &rows[i];
            let second = rows.get(i + 1).filter(|(_, next)| next.time == first.time);
            let point = match second {
                Some((_, second)) => {
                    i += 2;
                    let mut flag = SegmentFlag::MIDDLE;
                    if first.flag == 1 {
                        flag |= SegmentFlag::START;
                    }
                    if second.flag == 2 {
                        flag |= SegmentFlag::END;
                    }
                    first.to_point(second.position, flag)
                }
                None => {
                    i += 1;
                    SegmentFlag::from_bits(first.flag)
                        .ok_or_else(|| {
                            ChartError::MalformedVox(format!("segment flag {}", first.flag))
                        })
                        .and_then(|flag| first.to_point(first.position, flag))
                }
            };
            points.push((*line_no, first.time, point));
        }
        points
    }

    fn parse_vol_row(&self, fields: &[&str]) -> Result<VolRow, ChartError> {
        let spin: u8 = field(fields, 3)?;
        let filter: u8 = field(fields, 4)?;
        let ease: u8 = field(fields, 7)?;
        Ok(VolRow {
            time: self.parse_time(fields[0])?,
            position: position_from_f64(field(fields, 1)?),
            flag: field(fields, 2)?,
            spin: SpinType::from_value(spin)
                .ok_or_else(|| ChartError::MalformedVox(format!("spin type {spin}")))?,
            filter: FilterIndex::from_value(filter)
                .ok_or_else(|| ChartError::MalformedVox(format!("filter index {filter}")))?,
            wide: field::<u8>(fields, 5)? == 2,
            ease: EasingType::from_value(ease)
                .ok_or_else(|| ChartError::MalformedVox(format!("easing type {ease}")))?,
            spin_duration: field(fields, 8)?,
        })
    }

    fn read_filters(&mut self, lines: &[(usize, String)]) -> Result<(), ChartError> {
        self.chart.filter_list = lines
            .iter()
            .map(|(_, line)| Filter::from_vox_fields(&line.split(',').collect::<Vec<_>>()))
            .collect::<Result<Vec<Filter>, ChartError>>()?;
        Ok(())
    }

    fn read_effects(&mut self, lines: &[(usize, String)]) -> Result<(), ChartError> {
        let effects = lines
            .iter()
            .map(|(_, line)| Effect::from_vox_fields(&line.split(',').collect::<Vec<_>>()))
            .collect::<Result<Vec<Effect>, ChartError>>()?;
        if effects.len() % 2 != 0 {
            return Err(ChartError::MalformedVox(
                "effect entries must come in pairs".to_string(),
            ));
        }
        self.chart.effect_list = effects
            .chunks(2)
            .map(|pair| EffectEntry {
                effect1: pair[0].clone(),
                effect2: pair[1].clone(),
            })
            .collect();
        Ok(())
    }

    fn read_autotab_params(&mut self, lines: &[(usize, String)]) -> Result<(), ChartError> {
        let settings = lines
            .iter()
            .map(|(_, line)| AutoTabSetting::from_vox_fields(&line.split(',').collect::<Vec<_>>()))
            .collect::<Result<Vec<AutoTabSetting>, ChartError>>()?;
        if settings.len() % 2 != 0 {
            return Err(ChartError::MalformedVox(
                "auto tab settings must come in pairs".to_string(),
            ));
        }
        self.chart.autotab_list = settings
            .chunks(2)
            .map(|pair| AutoTabEntry {
                effect1: pair[0].clone(),
                effect2: pair[1].clone(),
            })
            .collect();
        Ok(())
    }

    fn read_spcontroller(&mut self, fields: &[&str]) -> Result<(), ChartError> {
        let time = self.parse_time(fields[0])?;
        let keyword = fields.get(1).copied().unwrap_or_default();
        match keyword {
            "BAROFF" => {
                let on = fields.get(4).is_some_and(|f| *f == "ON");
                self.chart.spcontroller_data.hidden_bars.insert(time, on);
                return Ok(());
            }
            "CAM_RotX" | "CAM_Radi" | "Tilt" | "Morphing2" => {}
            "Realize" | "AIRL_ScaX" | "AIRR_ScaX" => return Ok(()),
            other => {
                log::debug!("skipping SP controller keyword {other}");
                return Ok(());
            }
        }

        let ticks = ticks_field(fields, 3)?;
        let first: f64 = field(fields, 4)?;
        let second: f64 = field(fields, 5)?;
        let flag = fields.get(6).map_or(Ok(0.0), |f| parse_float(f))? as i64;
        // Only tilt and lane split carry segment flags
        let keyed = matches!(keyword, "Tilt" | "Morphing2");
        let end = self.chart.add_ticks(time, ticks);

        let sp = &mut self.chart.spcontroller_data;
        let track = match keyword {
            "CAM_RotX" => &mut sp.zoom_top,
            "CAM_Radi" => &mut sp.zoom_bottom,
            "Tilt" => &mut sp.tilt,
            _ => &mut sp.lane_split,
        };

        if ticks == 0 {
            let point_type = if keyed { snap_point_type(flag) } else { SegmentFlag::MIDDLE };
            track.insert(time, SpControllerInfo::new(first, second, point_type));
            return Ok(());
        }

        let head = track
            .entry(time)
            .or_insert_with(|| SpControllerInfo::new(first, first, SegmentFlag::MIDDLE));
        head.end = first;
        if keyed && matches!(flag, 1 | 2) {
            head.point_type |= SegmentFlag::START;
        }
        let tail = track
            .entry(end)
            .or_insert_with(|| SpControllerInfo::new(second, second, SegmentFlag::MIDDLE));
        tail.start = second;
        if keyed && matches!(flag, 1 | 3) {
            tail.point_type |= SegmentFlag::END;
        }
        Ok(())
    }

    /// Bound the last script run of a lane at the end of the chart.
    fn close_scripts(&mut self, lane: Lane) {
        let end = TimePoint::measure_start(self.chart.end_measure.saturating_add(1));
        if let Some(segments) = self.chart.script_ids.get_mut(&lane) {
            let open = segments
                .range(..end)
                .next_back()
                .is_some_and(|(_, ids)| !ids.is_empty());
            if open {
                segments.insert(end, Vec::new());
            }
        }
    }

    /// Parse `mmm,bb,tt` using the time signatures read so far.
    fn parse_time(&self, s: &str) -> Result<TimePoint, ChartError> {
        let parts: Vec<&str> = s.split(',').collect();
        let [measure, beat, tick] = parts[..] else {
            return Err(ChartError::InvalidTimePoint(format!("expected mmm,bb,tt (got {s})")));
        };
        let measure: u32 = parse_int(measure)?;
        let beat: i64 = parse_int(beat)?;
        let tick: i64 = parse_int(tick)?;
        let in_range = (1..=MAX_MEASURE).contains(&measure)
            && (1..=MAX_TICKS).contains(&beat)
            && (0..=MAX_TICKS).contains(&tick);
        if !in_range {
            return Err(ChartError::InvalidTimePoint(s.to_string()));
        }
        let lower = timesig_in(&self.chart.timesigs, measure).lower();
        let position =
            Rational::new(beat - 1, i64::from(lower)) + Rational::new(tick, TICKS_PER_BAR);
        TimePoint::with_position(measure, position)
    }
}

struct VolRow {
    time: TimePoint,
    position: Rational,
    flag: u8,
    spin: SpinType,
    filter: FilterIndex,
    wide: bool,
    ease: EasingType,
    spin_duration: u32,
}

impl VolRow {
    fn to_point(&self, end: Rational, point_type: SegmentFlag) -> Result<VolInfo, ChartError> {
        let mut point = VolInfo::new(self.position, end)?;
        point.spin_type = self.spin;
        point.spin_duration = self.spin_duration;
        point.ease_type = self.ease;
        point.filter_index = self.filter;
        point.point_type = point_type;
        point.wide_laser = self.wide;
        Ok(point)
    }
}

fn timesig_in(timesigs: &BTreeMap<TimePoint, TimeSignature>, measure: u32) -> TimeSignature {
    timesigs
        .range(..=TimePoint::measure_start(measure))
        .next_back()
        .map(|(_, ts)| *ts)
        .unwrap_or_default()
}

fn snap_point_type(flag: i64) -> SegmentFlag {
    match flag {
        1 => SegmentFlag::POINT,
        2 => SegmentFlag::START,
        3 => SegmentFlag::END,
        _ => SegmentFlag::MIDDLE,
    }
}

/// Simplest fraction agreeing with a six decimal position.
fn position_from_f64(value: f64) -> Rational {
    for denom in 1..=MAX_POSITION_DENOMINATOR {
        let numer = (value * denom as f64).round();
        if (numer / denom as f64 - value).abs() < 5e-7 {
            return Rational::new(numer as i64, denom);
        }
    }
    Rational::new((value * POSITION_SCALE as f64).round() as i64, POSITION_SCALE)
}

fn ticks_field(fields: &[&str], index: usize) -> Result<i64, ChartError> {
    let ticks: i64 = field(fields, index)?;
    if !(0..=MAX_TICKS).contains(&ticks) {
        return Err(ChartError::MalformedVox(format!("tick count out of range (got {ticks})")));
    }
    Ok(ticks)
}

fn parse_int<T: std::str::FromStr>(s: &str) -> Result<T, ChartError> {
    s.trim()
        .parse()
        .map_err(|_| ChartError::MalformedVox(format!("expected integer (got {s})")))
}

fn parse_float(s: &str) -> Result<f64, ChartError> {
    s.trim()
        .parse()
        .map_err(|_| ChartError::MalformedVox(format!("expected number (got {s})")))
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize) -> Result<T, ChartError> {
    let raw = fields
        .get(index)
        .ok_or_else(|| ChartError::MalformedVox(format!("missing field {}", index + 1)))?;
    raw.trim()
        .parse()
        .map_err(|_| ChartError::MalformedVox(format!("bad field {} (got {raw})", index + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::vox_encode::VoxEncoder;

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn round_trip(chart: &ChartInfo) -> (ChartInfo, Diagnostics) {
        let config = ConvertConfig {
            include_timestamp: false,
            ..ConvertConfig::default()
        };
        let vox = VoxEncoder::new(&config).encode_to_string(chart).unwrap();
        let mut diag = Diagnostics::new();
        let decoded = VoxDecoder::decode_str(&vox, &mut diag).unwrap();
        (decoded, diag)
    }

    #[test]
    fn test_missing_format_version_is_fatal() {
        let mut diag = Diagnostics::new();
        let err = VoxDecoder::decode_str("#BEAT INFO\n001,01,00\t4\t4\n#END\n", &mut diag)
            .unwrap_err();
        assert!(err.to_string().contains("FORMAT VERSION"));
    }

    #[test]
    fn test_unknown_section_warns() {
        let mut diag = Diagnostics::new();
        let vox = "#FORMAT VERSION\n12\n#END\n#MYSTERY\nabc\n#END\n";
        VoxDecoder::decode_str(vox, &mut diag).unwrap();
        assert_eq!(diag.count(WarningKind::UnrecognizedLine), 1);
    }

    #[test]
    fn test_malformed_line_warns_and_continues() {
        let mut diag = Diagnostics::new();
        let vox = "#FORMAT VERSION\n12\n#END\n#TRACK3\n001,01,00\tx\t0\n001,02,00\t0\t0\n#END\n";
        let chart = VoxDecoder::decode_str(vox, &mut diag).unwrap();
        assert_eq!(diag.count(WarningKind::MalformedValue), 1);
        assert_eq!(chart.note_data.bt[0].len(), 1);
    }

    #[test]
    fn test_timing_round_trip() {
        let mut chart = ChartInfo::new();
        chart.end_measure = 4;
        chart.timesigs.insert(TimePoint::measure_start(2), TimeSignature::new(7, 8).unwrap());
        chart.bpms.insert(tp(3, 0, 1), 180.5);
        chart.stops.insert(tp(3, 1, 4), true);
        chart.stops.insert(tp(3, 1, 2), false);
        chart.tilt_type.insert(tp(2, 0, 1), TiltType::Keep);
        chart.invalidate_caches();

        let (decoded, diag) = round_trip(&chart);
        assert!(diag.is_empty());
        assert_eq!(decoded.timesigs, chart.timesigs);
        assert_eq!(decoded.bpms, chart.bpms);
        assert_eq!(decoded.stops, chart.stops);
        assert_eq!(decoded.tilt_type, chart.tilt_type);
        assert_eq!(decoded.end_measure, 4);
    }

    #[test]
    fn test_notes_round_trip() {
        let mut chart = ChartInfo::new();
        chart.end_measure = 3;
        chart.note_data.bt[2].insert(tp(1, 3, 8), BtInfo::chip());
        chart.note_data.bt[3].insert(tp(2, 0, 1), BtInfo::new(r(3, 4)).unwrap());
        chart.note_data.fx[0].insert(tp(1, 0, 1), FxInfo::new(r(1, 2), 4).unwrap());
        chart.note_data.fx[1].insert(tp(1, 1, 2), FxInfo::new(r(0, 1), 7).unwrap());

        let mut start = VolInfo::new(r(0, 1), r(7, 10)).unwrap();
        start.point_type = SegmentFlag::START;
        start.spin_type = SpinType::SingleSpin;
        start.spin_duration = 48;
        let mut middle = VolInfo::new(r(13, 50), r(13, 50)).unwrap();
        middle.point_type = SegmentFlag::MIDDLE;
        middle.interpolated = true;
        let mut end = VolInfo::new(r(1, 1), r(1, 1)).unwrap();
        end.point_type = SegmentFlag::END;
        end.wide_laser = true;
        let lane = &mut chart.note_data.vol[0];
        lane.insert(tp(1, 0, 1), start);
        lane.insert(tp(1, 1, 4), middle);
        lane.insert(tp(1, 1, 2), end);

        let (decoded, diag) = round_trip(&chart);
        assert!(diag.is_empty());
        assert_eq!(decoded.note_data, chart.note_data);
    }

    #[test]
    fn test_tables_round_trip() {
        let chart = ChartInfo::new();
        let (decoded, _) = round_trip(&chart);
        assert_eq!(decoded.filter_list.len(), chart.filter_list.len());
        assert_eq!(decoded.autotab_list, chart.autotab_list);
        let types = |c: &ChartInfo| {
            c.effect_list
                .iter()
                .map(|e| (e.effect1.fx_type(), e.effect2.fx_type()))
                .collect::<Vec<_>>()
        };
        assert_eq!(types(&decoded), types(&chart));
    }

    #[test]
    fn test_spcontroller_round_trip() {
        let mut chart = ChartInfo::new();
        chart.end_measure = 3;
        let sp = &mut chart.spcontroller_data;
        sp.tilt.insert(tp(1, 0, 1), SpControllerInfo::new(0.0, 0.0, SegmentFlag::START));
        sp.tilt.insert(tp(2, 0, 1), SpControllerInfo::new(-0.42, -0.42, SegmentFlag::END));
        sp.hidden_bars.insert(tp(2, 0, 1), true);
        sp.hidden_bars.insert(tp(3, 0, 1), false);

        let (decoded, _) = round_trip(&chart);
        let decoded_sp = &decoded.spcontroller_data;
        assert_eq!(decoded_sp.hidden_bars, chart.spcontroller_data.hidden_bars);
        assert_eq!(decoded_sp.tilt.len(), 2);
        let tail = decoded_sp.tilt[&tp(2, 0, 1)];
        assert_eq!(tail.start, -0.42);
        assert!(tail.point_type.contains(SegmentFlag::END));
        assert!(decoded_sp.tilt[&tp(1, 0, 1)].point_type.contains(SegmentFlag::START));
        assert_eq!(decoded_sp.zoom_top.len(), 1);
    }

    #[test]
    fn test_autotab_and_scripts() {
        let mut chart = ChartInfo::new();
        chart.end_measure = 2;
        chart.autotab_infos.insert(
            tp(1, 0, 1),
            AutoTabInfo {
                which: 3,
                duration: r(1, 2),
            },
        );
        chart.note_data.bt[0].insert(tp(1, 0, 1), BtInfo::chip());
        chart.note_data.bt[0].insert(tp(1, 1, 4), BtInfo::chip());
        chart
            .script_ids
            .insert(Lane::BtA, BTreeMap::from([(tp(1, 0, 1), vec![5]), (tp(2, 0, 1), vec![])]));

        let (decoded, _) = round_trip(&chart);
        assert_eq!(decoded.autotab_infos, chart.autotab_infos);
        assert_eq!(decoded.script_ids[&Lane::BtA][&tp(1, 0, 1)], vec![5]);
        assert!(decoded.script_ids[&Lane::BtA].values().next_back().unwrap().is_empty());
    }

    #[test]
    fn test_position_recovery() {
        assert_eq!(position_from_f64(0.5), r(1, 2));
        assert_eq!(position_from_f64(0.26), r(13, 50));
        assert_eq!(position_from_f64(0.0), r(0, 1));
        assert_eq!(position_from_f64(0.007874), r(1, 127));
    }
}
