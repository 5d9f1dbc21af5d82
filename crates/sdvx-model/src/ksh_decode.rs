use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use regex::Regex;

use crate::chart::{ChartInfo, SongChart, SongInfo};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::easing::interpolate;
use crate::effect::{Effect, EffectEntry, FlangerParams, FxType, RetriggerParams};
use crate::enums::{DifficultySlot, EasingType, FilterIndex, Lane, SegmentFlag, SpinType, TiltType};
use crate::error::ChartError;
use crate::filter::AutoTabEntry;
use crate::note::{AutoTabInfo, BtInfo, FxInfo, NoteData, SpControllerInfo, VolInfo};
use crate::time::{Rational, TimePoint, TimeSignature, round_half_even};

const BAR_LINE: &str = "--";
const MIN_VERSION: i64 = 160;
const MAX_TIMESIG_TERM: u32 = 128;
/// Longest accepted stop, in 192nds: a thousand 4/4 measures.
const MAX_STOP_LENGTH: i64 = 192_000;

const LASER_POSITION: [&str; 3] = [
    "05AFKPUZejo",
    "0257ACFHKMPSUXZbehjmo",
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmno",
];

// Camera and tilt values are rescaled from KSH units
const ZOOM_BOTTOM_RATE: f64 = -0.006667;
const ZOOM_TOP_RATE: f64 = 0.002222;
const TILT_RATE: f64 = -0.42;
const LANE_SPLIT_RATE: f64 = 0.006667;

/// Laser points closer than this are joined into a slam.
fn slam_distance() -> Rational {
    Rational::new(1, 32)
}

/// Spacing of generated points on curved lasers.
fn interpolation_distance() -> Rational {
    Rational::new(1, 64)
}

/// KSH spin lengths are 192nds that play about 4/3 longer; VOX wants quarter notes.
fn spin_rate() -> Rational {
    Rational::new(4, 3) / 48
}

fn stop_rate() -> Rational {
    Rational::new(1, 192)
}

lazy_static::lazy_static! {
    static ref CHART_LINE: Regex =
        Regex::new(r"^[012]{4}\|[012]{2}\|[0-9A-Za-o:\-]{2}(?:(@(\(|\)|<|>)|S>|S<)\d+)?").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn filter_type(name: &str) -> Option<FilterIndex> {
    match name {
        "peak" => Some(FilterIndex::Peak),
        "lpf1" => Some(FilterIndex::Lpf),
        "hpf1" => Some(FilterIndex::Hpf),
        "bitc" => Some(FilterIndex::Bitcrush),
        _ => None,
    }
}

/// Effects KSH names without a `#define_fx`.
fn builtin_effect(name: &str) -> Option<Effect> {
    let effect = match name {
        "Retrigger" => Effect::Retrigger(RetriggerParams::default()),
        "Gate" => Effect::with_defaults(FxType::Gate),
        "Flanger" => Effect::Flanger(FlangerParams::default()),
        "PitchShift" => Effect::with_defaults(FxType::PitchShift),
        "BitCrusher" => Effect::with_defaults(FxType::Bitcrush),
        "Phaser" => Effect::Flanger(FlangerParams {
            mix: 50.0,
            period: 2.0,
            feedback: 0.35,
            stereo_width: 0,
            hicut_gain: 8.0,
        }),
        "Wobble" => Effect::with_defaults(FxType::Wobble),
        "TapeStop" => Effect::with_defaults(FxType::Tapestop),
        "Echo" => Effect::RetriggerEx(RetriggerParams {
            mix: 100.0,
            wavelength: 4,
            update_period: 4.0,
            feedback: 0.6,
            amount: 1.0,
            decay: 0.8,
        }),
        "SideChain" => Effect::with_defaults(FxType::Sidechain),
        _ => return None,
    };
    Some(effect)
}

/// Laser position for a KSH position character, 0 if it is not one.
pub fn convert_laser_pos(c: char) -> Rational {
    for alphabet in LASER_POSITION {
        if let Some(index) = alphabet.find(c) {
            return Rational::new(index as i64, alphabet.len() as i64 - 1);
        }
    }
    Rational::from_integer(0)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ChartError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ChartError::InvalidParameter(format!("invalid value for {key} (got {value})")))
}

/// Integer with an optional `0x`/`0b` prefix.
fn parse_mask(value: &str) -> Result<u8, ChartError> {
    let lower = value.trim().to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };
    parsed
        .map(|v| v.rem_euclid(0x100) as u8)
        .map_err(|_| ChartError::InvalidParameter(format!("invalid lane mask (got {value})")))
}

fn parse_timesig(value: &str) -> Result<TimeSignature, ChartError> {
    let Some((upper, lower)) = value.split_once('/') else {
        return Err(ChartError::InvalidParameter(format!(
            "invalid time signature (got {value})"
        )));
    };
    let (upper, lower): (u32, u32) = (parse_value("beat", upper)?, parse_value("beat", lower)?);
    if upper > MAX_TIMESIG_TERM || lower > MAX_TIMESIG_TERM {
        return Err(ChartError::InvalidTimeSignature { upper, lower });
    }
    TimeSignature::new(upper, lower)
}

fn vol_index(lane: Lane) -> usize {
    if lane == Lane::VolL { 0 } else { 1 }
}

/// KSH chart decoder.
pub struct KshDecoder;

impl KshDecoder {
    pub fn decode(path: &Path, diag: &mut Diagnostics) -> Result<SongChart> {
        let raw_bytes = std::fs::read(path)?;
        Self::decode_bytes(&raw_bytes, diag)
    }

    pub fn decode_bytes(raw: &[u8], diag: &mut Diagnostics) -> Result<SongChart> {
        let content = detect_encoding_and_decode(raw);
        Self::decode_str(&content, diag)
    }

    pub fn decode_str(content: &str, diag: &mut Diagnostics) -> Result<SongChart> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();

        // Metadata runs up to the first bar line
        let split = lines.iter().position(|l| *l == BAR_LINE);
        let Some(split) = split else {
            return Err(
                ChartError::MissingSeparator("no bar line after the header".to_string()).into(),
            );
        };
        let metadata = &lines[..split];
        let rest = &lines[split + 1..];

        // Definitions trail the last bar line
        let Some(last_bar) = rest.iter().rposition(|l| *l == BAR_LINE) else {
            return Err(ChartError::MissingSeparator(
                "no bar line before the definitions".to_string(),
            )
            .into());
        };
        let notedata = &rest[..=last_bar];
        let definitions = &rest[last_bar + 1..];

        let mut parser = KshParser::new(diag);
        parser.parse_metadata(metadata)?;
        parser.parse_definitions(definitions, split + 2 + last_bar);
        parser.parse_notedata(notedata, split + 1);
        parser.postprocess();

        let mut chart_info = parser.chart;
        chart_info.invalidate_caches();
        log::info!(
            "decoded \"{}\" [{} {}]: {} buttons, end measure {}",
            parser.song.title,
            chart_info.difficulty.shorthand(),
            chart_info.level,
            chart_info.note_data.button_count(),
            chart_info.end_measure
        );
        Ok(SongChart {
            song_info: parser.song,
            chart_info,
        })
    }
}

#[derive(Debug, Clone)]
struct HoldState {
    start: TimePoint,
    duration: Rational,
}

/// Last laser point, kept while a following point could still turn it into a slam.
#[derive(Debug, Clone)]
struct RecentVol {
    when: TimePoint,
    duration: Rational,
    point: VolInfo,
}

struct KshParser<'a> {
    diag: &'a mut Diagnostics,
    song: SongInfo,
    chart: ChartInfo,

    cur_timesig: TimeSignature,
    cur_filter: FilterIndex,
    filter_override: FilterIndex,
    tilt_segment: bool,
    last_tilt: f64,

    holds: HashMap<Lane, HoldState>,
    set_fx: HashMap<Lane, String>,
    set_se: HashMap<Lane, u32>,

    // Per laser lane, indexed VOL-L then VOL-R
    recent_vol: [Option<RecentVol>; 2],
    cont_segment: [bool; 2],
    wide_segment: [bool; 2],
    ease_start: [Option<TimePoint>; 2],
    /// `None` while a curve is running and later points are skipped
    cur_easing: [Option<EasingType>; 2],
    ease_midpoints: [Vec<(TimePoint, EasingType)>; 2],
    ease_ranges: HashMap<TimePoint, (f64, f64)>,

    spins: BTreeMap<TimePoint, String>,
    stops: BTreeMap<TimePoint, Rational>,
    fx_list: Vec<String>,
    filter_names: BTreeMap<TimePoint, String>,
    filter_to_effect: HashMap<String, usize>,

    final_zoom_top: TimePoint,
    final_zoom_bottom: TimePoint,
    first_lane_split: Option<TimePoint>,
    final_lane_split: Option<TimePoint>,
}

impl<'a> KshParser<'a> {
    fn new(diag: &'a mut Diagnostics) -> Self {
        Self {
            diag,
            song: SongInfo::default(),
            chart: ChartInfo::new(),
            cur_timesig: TimeSignature::default(),
            cur_filter: FilterIndex::Peak,
            filter_override: FilterIndex::Peak,
            tilt_segment: false,
            last_tilt: 0.0,
            holds: HashMap::new(),
            set_fx: HashMap::new(),
            set_se: HashMap::new(),
            recent_vol: [None, None],
            cont_segment: [false; 2],
            wide_segment: [false; 2],
            ease_start: [None; 2],
            cur_easing: [Some(EasingType::NoEasing); 2],
            ease_midpoints: [Vec::new(), Vec::new()],
            ease_ranges: HashMap::new(),
            spins: BTreeMap::new(),
            stops: BTreeMap::new(),
            fx_list: Vec::new(),
            filter_names: BTreeMap::new(),
            filter_to_effect: HashMap::new(),
            final_zoom_top: TimePoint::default(),
            final_zoom_bottom: TimePoint::default(),
            first_lane_split: None,
            final_lane_split: None,
        }
    }

    // Header

    fn parse_metadata(&mut self, lines: &[&str]) -> Result<(), ChartError> {
        for (line_no, line) in lines.iter().enumerate() {
            let Some((key, value)) = line.split_once('=') else {
                self.diag.warn_line(
                    WarningKind::UnrecognizedLine,
                    line_no + 1,
                    format!("unrecognized line \"{line}\""),
                );
                continue;
            };
            if key == "ver" {
                match value.trim().parse::<i64>() {
                    Ok(version) if version >= MIN_VERSION => {}
                    _ => {
                        return Err(ChartError::UnsupportedVersion(format!(
                            "ksh file version too old (got {value})"
                        )));
                    }
                }
                continue;
            }
            if let Err(e) = self.apply_metadata(key, value) {
                self.diag
                    .warn_line(WarningKind::MalformedValue, line_no + 1, e.to_string());
            }
        }
        Ok(())
    }

    fn apply_metadata(&mut self, key: &str, value: &str) -> Result<(), ChartError> {
        let origin = TimePoint::default();
        match key {
            "title" => self.song.set_title(value),
            "artist" => self.song.artist = value.to_string(),
            "effect" => self.chart.effector = value.to_string(),
            "jacket" => self.chart.jacket_path = value.to_string(),
            "illustrator" => self.chart.illustrator = value.to_string(),
            "difficulty" => self.chart.difficulty = DifficultySlot::from_ksh(value),
            "level" => self.chart.level = parse_value(key, value)?,
            "t" => {
                if let Some((min, max)) = value.split_once('-') {
                    self.song.min_bpm = parse_value(key, min)?;
                    self.song.max_bpm = parse_value(key, max)?;
                } else {
                    let bpm: f64 = parse_value(key, value)?;
                    self.song.min_bpm = bpm;
                    self.song.max_bpm = bpm;
                    self.chart.bpms.insert(origin, bpm);
                }
            }
            "beat" => {
                let timesig = parse_timesig(value)?;
                self.chart.timesigs.insert(origin, timesig);
                self.cur_timesig = timesig;
            }
            "m" => {
                let mut paths = value.split(';');
                self.chart.music_path = paths.next().unwrap_or_default().to_string();
                if paths.next().is_some() {
                    self.diag.warn(
                        WarningKind::UnsupportedFeature,
                        "multiple song files are not supported",
                    );
                }
            }
            "mvol" => self.song.music_volume = parse_value(key, value)?,
            "o" => self.chart.music_offset = parse_value(key, value)?,
            "po" => self.chart.preview_start = parse_value(key, value)?,
            "filtertype" => {
                if let Some(filter) = filter_type(value) {
                    self.chart.active_filter.insert(origin, filter);
                }
            }
            _ => {}
        }
        Ok(())
    }

    // Trailing `#define_fx` / `#define_filter` lines

    fn parse_definitions(&mut self, lines: &[&str], line_offset: usize) {
        for (i, line) in lines.iter().enumerate() {
            let line_no = line_offset + i + 1;
            if line.is_empty() {
                continue;
            }
            let Some(body) = line.strip_prefix('#') else {
                self.diag.warn_line(
                    WarningKind::UnrecognizedLine,
                    line_no,
                    format!("unrecognized line \"{line}\""),
                );
                continue;
            };
            let parts: Vec<&str> = WHITESPACE.splitn(body, 3).collect();
            let [line_type, name, definition] = parts[..] else {
                self.diag.warn_line(
                    WarningKind::InvalidDefinition,
                    line_no,
                    format!("incomplete definition \"{line}\""),
                );
                continue;
            };

            let mut params: HashMap<String, String> = HashMap::new();
            for pair in definition.split(';') {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                params.insert(k.to_string(), v.to_string());
            }
            if !params.contains_key("type") {
                self.diag.warn_line(
                    WarningKind::InvalidDefinition,
                    line_no,
                    format!("ignoring definition without \"type\": \"{line}\""),
                );
                continue;
            }
            strip_ranges(&mut params);

            let effect = match Effect::from_definition(&params) {
                Ok(effect) => effect,
                Err(e) => {
                    self.diag.warn_line(
                        WarningKind::InvalidDefinition,
                        line_no,
                        format!("ignoring definition \"{line}\": {e}"),
                    );
                    continue;
                }
            };
            match line_type {
                "define_fx" => {
                    self.chart.custom_effects.insert(name.to_string(), effect);
                }
                "define_filter" => {
                    let filters = &mut self.chart.custom_filters;
                    match filters.iter_mut().find(|(n, _)| n == name) {
                        Some(entry) => entry.1 = effect,
                        None => filters.push((name.to_string(), effect)),
                    }
                }
                _ => self.diag.warn_line(
                    WarningKind::InvalidDefinition,
                    line_no,
                    format!("unrecognized definition \"{definition}\""),
                ),
            }
        }
    }

    // Note data

    fn parse_notedata(&mut self, lines: &[&str], line_offset: usize) {
        let mut measure: Vec<&str> = Vec::new();
        let mut measure_number: u32 = 1;
        let mut noteline_count: usize = 0;
        for (i, line) in lines.iter().enumerate() {
            if let Some(m) = CHART_LINE.find(line) {
                measure.push(m.as_str());
                noteline_count += 1;
            } else if line.contains('=') || line.starts_with("//") {
                measure.push(line);
            } else if *line == BAR_LINE {
                self.parse_measure(&measure, measure_number, noteline_count);
                measure_number += 1;
                measure.clear();
                noteline_count = 0;
            } else if !line.is_empty() {
                self.diag.warn_line(
                    WarningKind::UnrecognizedLine,
                    line_offset + i + 1,
                    format!("unrecognized line \"{line}\""),
                );
            }
        }
    }

    fn parse_measure(&mut self, lines: &[&str], measure: u32, line_count: usize) {
        if let Some(timesig) = self.chart.timesigs.get(&TimePoint::measure_start(measure)) {
            self.cur_timesig = *timesig;
        }

        let mut noteline = 0;
        for line in lines {
            let subdivision = Rational::new(
                i64::from(self.cur_timesig.upper()),
                line_count.max(1) as i64 * i64::from(self.cur_timesig.lower()),
            );
            let cur_time = TimePoint::from_parts(measure, subdivision * noteline as i64);

            if let Some(commands) = line.strip_prefix("//") {
                if let Err(e) = self.handle_custom_commands(commands, cur_time) {
                    self.diag.warn_at(WarningKind::MalformedValue, cur_time, e.to_string());
                }
            } else if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = self.handle_chart_metadata(key, value, cur_time) {
                    self.diag.warn_at(WarningKind::MalformedValue, cur_time, e.to_string());
                }
            } else {
                self.handle_noteline(line, cur_time, subdivision);
                noteline += 1;
            }
        }
    }

    fn handle_custom_commands(
        &mut self,
        line: &str,
        cur_time: TimePoint,
    ) -> Result<(), ChartError> {
        for chunk in line.split(';') {
            let (name, value) = chunk.split_once('=').unwrap_or((chunk, ""));
            match name {
                "lightFXL" => {
                    self.set_se.insert(Lane::FxL, parse_value(name, value)?);
                }
                "lightFXR" => {
                    self.set_se.insert(Lane::FxR, parse_value(name, value)?);
                }
                "lightFXLR" => {
                    let se: u32 = parse_value(name, value)?;
                    self.set_se.insert(Lane::FxL, se);
                    self.set_se.insert(Lane::FxR, se);
                }
                "curveBeginL" => self.begin_curve(0, parse_easing(name, value)?, cur_time),
                "curveBeginR" => self.begin_curve(1, parse_easing(name, value)?, cur_time),
                "curveBeginLR" => {
                    let (left, right) = match value.split_once(',') {
                        Some((l, r)) => (l, r.split(',').next().unwrap_or(r)),
                        None => (value, value),
                    };
                    let (left, right) = (parse_easing(name, left)?, parse_easing(name, right)?);
                    self.begin_curve(0, left, cur_time);
                    self.begin_curve(1, right, cur_time);
                }
                "curveBeginSpL" | "curveBeginSpR" => {
                    let args: Vec<&str> = value.split(',').collect();
                    let [ease, init, fin] = args[..] else {
                        return Err(ChartError::InvalidParameter(format!(
                            "incorrect number of args supplied to {name}"
                        )));
                    };
                    let ease = parse_easing(name, ease)?;
                    let mut init: f64 = parse_value(name, init)?;
                    let mut fin: f64 = parse_value(name, fin)?;
                    if init > fin {
                        std::mem::swap(&mut init, &mut fin);
                    }
                    let index = usize::from(name == "curveBeginSpR");
                    self.begin_curve(index, ease, cur_time);
                    self.ease_ranges
                        .insert(cur_time, (init.clamp(0.0, 1.0), fin.clamp(0.0, 1.0)));
                }
                "curveEndL" => self.begin_curve(0, EasingType::NoEasing, cur_time),
                "curveEndR" => self.begin_curve(1, EasingType::NoEasing, cur_time),
                "curveEndLR" => {
                    self.begin_curve(0, EasingType::NoEasing, cur_time);
                    self.begin_curve(1, EasingType::NoEasing, cur_time);
                }
                "applyFilter" => {
                    let filter = match value {
                        "lpf" => FilterIndex::Lpf,
                        "hpf" => FilterIndex::Hpf,
                        "bitc" => FilterIndex::Bitcrush,
                        _ => {
                            let index: i64 = parse_value(name, value)?;
                            u8::try_from(index)
                                .ok()
                                .filter(|i| (1..=5).contains(i))
                                .and_then(FilterIndex::from_value)
                                .unwrap_or(FilterIndex::Peak)
                        }
                    };
                    // Peak stops the rest of the line
                    if filter == FilterIndex::Peak {
                        return Ok(());
                    }
                    self.filter_override = filter;
                    self.cur_filter = filter;
                    if let Some(active) = self.chart.active_filter.get_mut(&cur_time) {
                        *active = filter;
                    }
                }
                "scriptBegin" => {
                    let args: Vec<&str> = value.split(',').collect();
                    if args.len() < 2 {
                        return Err(ChartError::InvalidParameter(format!(
                            "incorrect number of args supplied to {name}"
                        )));
                    }
                    let mask = parse_mask(args[0])?;
                    let ids = args[1..]
                        .iter()
                        .map(|id| parse_value::<u32>(name, id))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.set_scripts(mask, &ids, cur_time);
                }
                "scriptEnd" => {
                    let mask = parse_mask(value)?;
                    self.set_scripts(mask, &[], cur_time);
                }
                "hideBars" => match value {
                    "on" | "1" => {
                        self.chart.spcontroller_data.hidden_bars.insert(cur_time, true);
                    }
                    "off" | "0" => {
                        self.chart.spcontroller_data.hidden_bars.insert(cur_time, false);
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn begin_curve(&mut self, index: usize, easing: EasingType, cur_time: TimePoint) {
        self.ease_start[index] = Some(cur_time);
        self.cur_easing[index] = Some(easing);
    }

    fn set_scripts(&mut self, mask: u8, ids: &[u32], cur_time: TimePoint) {
        for lane in Lane::ALL {
            if mask & lane.script_bit() != 0 {
                self.chart
                    .script_ids
                    .entry(lane)
                    .or_default()
                    .insert(cur_time, ids.to_vec());
            }
        }
    }

    fn handle_chart_metadata(
        &mut self,
        key: &str,
        value: &str,
        cur_time: TimePoint,
    ) -> Result<(), ChartError> {
        let measure = cur_time.measure();
        match key {
            "t" => {
                self.chart.bpms.insert(cur_time, parse_value(key, value)?);
            }
            "beat" => {
                let timesig = parse_timesig(value)?;
                // Mid-measure changes apply from the next measure
                if cur_time.position() != Rational::from_integer(0) {
                    self.chart
                        .timesigs
                        .insert(TimePoint::measure_start(measure + 1), timesig);
                } else {
                    self.chart
                        .timesigs
                        .insert(TimePoint::measure_start(measure), timesig);
                    self.cur_timesig = timesig;
                }
            }
            "stop" => {
                let length: i64 = parse_value(key, value)?;
                if !(0..=MAX_STOP_LENGTH).contains(&length) {
                    return Err(ChartError::InvalidParameter(format!("stop length {length}")));
                }
                self.stops.insert(cur_time, stop_rate() * length);
            }
            "tilt" => self.handle_tilt(value, cur_time),
            "zoom_top" => {
                let zoom = parse_value::<i64>(key, value)? as f64 * ZOOM_TOP_RATE;
                upsert_controller(&mut self.chart.spcontroller_data.zoom_top, cur_time, zoom);
                self.final_zoom_top = cur_time;
            }
            "zoom_bottom" => {
                let zoom = parse_value::<i64>(key, value)? as f64 * ZOOM_BOTTOM_RATE;
                upsert_controller(&mut self.chart.spcontroller_data.zoom_bottom, cur_time, zoom);
                self.final_zoom_bottom = cur_time;
            }
            "center_split" => {
                let split = parse_value::<i64>(key, value)? as f64 * LANE_SPLIT_RATE;
                self.first_lane_split.get_or_insert(cur_time);
                self.final_lane_split = Some(cur_time);
                upsert_controller(&mut self.chart.spcontroller_data.lane_split, cur_time, split);
            }
            "laserrange_l" | "laserrange_r" => {
                let index = usize::from(key == "laserrange_r");
                if !self.cont_segment[index] {
                    self.wide_segment[index] = true;
                }
            }
            "fx-l" | "fx-r" => {
                let lane = if key == "fx-l" { Lane::FxL } else { Lane::FxR };
                if !value.is_empty() && !self.fx_list.iter().any(|fx| fx == value) {
                    self.fx_list.push(value.to_string());
                }
                if let Some(current) = self.set_fx.get(&lane) {
                    if !value.is_empty() && !current.is_empty() && current != value {
                        self.diag.warn_at(
                            WarningKind::ConflictingEffect,
                            cur_time,
                            format!(
                                "ignoring effect \"{value}\" on {lane}, which already has \"{current}\""
                            ),
                        );
                    }
                    return Ok(());
                }
                self.set_fx.insert(lane, value.to_string());
            }
            "fx-l_se" | "fx-r_se" => {
                let lane = if key == "fx-l_se" { Lane::FxL } else { Lane::FxR };
                let sound = value.split(';').next().unwrap_or_default();
                let sound = sound.strip_suffix(".wav").unwrap_or(sound);
                if let Ok(se) = sound.parse::<u32>() {
                    self.set_se.insert(lane, se);
                }
            }
            "filtertype" => {
                self.filter_names.insert(cur_time, value.to_string());
                let filter = if self.filter_override != FilterIndex::Peak {
                    std::mem::replace(&mut self.filter_override, FilterIndex::Peak)
                } else {
                    filter_type(value).unwrap_or(FilterIndex::Custom)
                };
                if filter != self.cur_filter {
                    self.cur_filter = filter;
                    self.chart.active_filter.insert(cur_time, filter);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_tilt(&mut self, value: &str, cur_time: TimePoint) {
        let tilt = if value == "zero" {
            Some(0.0)
        } else {
            value.parse::<f64>().ok().map(|v| v * TILT_RATE)
        };
        let tilt_points = &mut self.chart.spcontroller_data.tilt;

        if let Some(tilt) = tilt {
            self.last_tilt = tilt;
            match tilt_points.get_mut(&cur_time) {
                Some(point) => point.end = tilt,
                None => {
                    let flag = if self.tilt_segment {
                        SegmentFlag::MIDDLE
                    } else {
                        SegmentFlag::START
                    };
                    tilt_points.insert(cur_time, SpControllerInfo::new(tilt, tilt, flag));
                }
            }
            self.tilt_segment = true;
            return;
        }

        let mode = match value {
            "normal" => TiltType::Normal,
            "bigger" | "biggest" => TiltType::Bigger,
            "keep_normal" | "keep_bigger" | "keep_biggest" => TiltType::Keep,
            _ => {
                self.diag.warn_at(
                    WarningKind::MalformedValue,
                    cur_time,
                    format!("unrecognized tilt mode \"{value}\""),
                );
                return;
            }
        };
        // Close a manual tilt segment before switching back to a mode
        if self.tilt_segment && !tilt_points.contains_key(&cur_time) {
            tilt_points.insert(
                cur_time,
                SpControllerInfo::new(self.last_tilt, self.last_tilt, SegmentFlag::MIDDLE),
            );
        }
        self.tilt_segment = false;
        if value == "biggest" {
            self.diag.warn_at(
                WarningKind::UnsupportedFeature,
                cur_time,
                "downgrading tilt \"biggest\" to \"bigger\"",
            );
        }
        self.chart.tilt_type.insert(cur_time, mode);
    }

    fn handle_noteline(&mut self, line: &str, cur_time: TimePoint, subdivision: Rational) {
        let mut fields = line.splitn(3, '|');
        let (Some(bts), Some(fxs), Some(rest)) = (fields.next(), fields.next(), fields.next())
        else {
            return;
        };
        let (vols, spin) = rest.split_at(rest.len().min(2));
        let mut has_notes = false;

        for (lane, state) in NoteData::BT_LANES.into_iter().zip(bts.chars()) {
            let index = lane_index(lane);
            match state {
                '0' => {
                    if let Some(hold) = self.holds.remove(&lane) {
                        has_notes = true;
                        self.insert_bt(index, hold.start, hold.duration);
                    }
                }
                '1' => {
                    has_notes = true;
                    if self.holds.remove(&lane).is_some() {
                        self.diag.warn_at(
                            WarningKind::UnterminatedHold,
                            cur_time,
                            format!("improperly terminated hold on {lane}"),
                        );
                    }
                    self.chart.note_data.bt[index].insert(cur_time, BtInfo::chip());
                }
                '2' => {
                    has_notes = true;
                    self.extend_hold(lane, cur_time, subdivision);
                }
                _ => {}
            }
        }

        for (lane, state) in NoteData::FX_LANES.into_iter().zip(fxs.chars()) {
            let index = lane_index(lane);
            match state {
                '0' => {
                    if let Some(hold) = self.holds.remove(&lane) {
                        has_notes = true;
                        let effect = self.set_fx.remove(&lane).unwrap_or_default();
                        let special = if effect.is_empty() {
                            0
                        } else {
                            self.fx_list.iter().position(|fx| *fx == effect).unwrap_or(0) as u32
                        };
                        self.insert_fx(index, hold.start, hold.duration, special);
                    }
                }
                '1' => {
                    has_notes = true;
                    self.extend_hold(lane, cur_time, subdivision);
                }
                '2' => {
                    has_notes = true;
                    if self.holds.remove(&lane).is_some() {
                        self.diag.warn_at(
                            WarningKind::UnterminatedHold,
                            cur_time,
                            format!("improperly terminated hold on {lane}"),
                        );
                    }
                    let special = self.set_se.get(&lane).copied().unwrap_or(0);
                    self.insert_fx(index, cur_time, Rational::from_integer(0), special);
                }
                _ => {}
            }
            // A sound effect only applies to the next chip
            self.set_se.remove(&lane);
        }

        for (lane, state) in NoteData::VOL_LANES.into_iter().zip(vols.chars()) {
            let index = vol_index(lane);
            match state {
                '-' => self.end_laser(index, lane, cur_time),
                ':' => {
                    has_notes = true;
                    if let Some(easing) = self.cur_easing[index] {
                        if self.ease_start[index] == Some(cur_time) {
                            self.ease_midpoints[index].push((cur_time, easing));
                            if easing != EasingType::NoEasing {
                                self.cur_easing[index] = None;
                            }
                        }
                    }
                }
                c => {
                    has_notes = true;
                    self.laser_point(index, convert_laser_pos(c), cur_time);
                }
            }
            let expired = match &mut self.recent_vol[index] {
                Some(recent) => {
                    recent.duration += subdivision;
                    recent.duration > slam_distance()
                }
                None => false,
            };
            if expired {
                self.recent_vol[index] = None;
            }
        }

        if !spin.is_empty() {
            self.spins.insert(cur_time, spin.to_string());
        }
        if has_notes {
            self.chart.end_measure = cur_time.measure() + 2;
        }
    }

    fn extend_hold(&mut self, lane: Lane, cur_time: TimePoint, subdivision: Rational) {
        self.holds
            .entry(lane)
            .or_insert(HoldState {
                start: cur_time,
                duration: Rational::from_integer(0),
            })
            .duration += subdivision;
    }

    fn insert_bt(&mut self, index: usize, start: TimePoint, duration: Rational) {
        match BtInfo::new(duration) {
            Ok(info) => {
                self.chart.note_data.bt[index].insert(start, info);
            }
            Err(e) => self.diag.warn_at(WarningKind::MalformedValue, start, e.to_string()),
        }
    }

    fn insert_fx(&mut self, index: usize, start: TimePoint, duration: Rational, special: u32) {
        match FxInfo::new(duration, special) {
            Ok(info) => {
                self.chart.note_data.fx[index].insert(start, info);
            }
            Err(e) => self.diag.warn_at(WarningKind::MalformedValue, start, e.to_string()),
        }
    }

    fn end_laser(&mut self, index: usize, lane: Lane, cur_time: TimePoint) {
        self.cont_segment[index] = false;
        self.wide_segment[index] = false;
        self.recent_vol[index] = None;
        match self.cur_easing[index] {
            Some(EasingType::NoEasing) => {}
            Some(_) => {
                self.cur_easing[index] = Some(EasingType::NoEasing);
                self.diag.warn_at(
                    WarningKind::CurveOutsideSegment,
                    cur_time,
                    format!("curve command for {lane} outside of a laser segment"),
                );
            }
            None => {
                self.cur_easing[index] = Some(EasingType::NoEasing);
                self.diag.warn_at(
                    WarningKind::CurveNotClosed,
                    cur_time,
                    format!("curve command not closed after {lane} segment"),
                );
            }
        }
    }

    fn laser_point(&mut self, index: usize, position: Rational, cur_time: TimePoint) {
        let flag = if self.cont_segment[index] {
            SegmentFlag::MIDDLE
        } else {
            SegmentFlag::START
        };
        let point = |easing: EasingType, filter: FilterIndex, wide: bool| -> Option<VolInfo> {
            let mut info = VolInfo::new(position, position).ok()?;
            info.ease_type = easing;
            info.filter_index = filter;
            info.point_type = flag;
            info.wide_laser = wide;
            Some(info)
        };

        let slam_from = self.recent_vol[index].as_ref().filter(|recent| {
            recent.duration <= slam_distance() && recent.point.start() != position
        });
        if let Some(recent) = slam_from {
            // A short segment is a slam from the previous point
            log::debug!("slam at {}, distance {}", recent.when, recent.duration);
            let when = recent.when;
            match VolInfo::new(recent.point.start(), position) {
                Ok(mut slam) => {
                    slam.ease_type = recent.point.ease_type;
                    slam.filter_index = self.cur_filter;
                    slam.point_type = recent.point.point_type;
                    slam.wide_laser = recent.point.wide_laser;
                    self.chart.note_data.vol[index].insert(when, slam);
                }
                Err(e) => self.diag.warn_at(WarningKind::MalformedValue, when, e.to_string()),
            }
        } else if let Some(easing) = self.cur_easing[index] {
            if let Some(info) = point(easing, self.cur_filter, self.wide_segment[index]) {
                self.chart.note_data.vol[index].insert(cur_time, info);
            }
        }

        // Midpoints of a running curve are skipped
        let Some(easing) = self.cur_easing[index] else {
            return;
        };
        if let Some(info) = point(easing, self.cur_filter, self.wide_segment[index]) {
            self.recent_vol[index] = Some(RecentVol {
                when: cur_time,
                duration: Rational::from_integer(0),
                point: info,
            });
        }
        self.cont_segment[index] = true;
        if easing != EasingType::NoEasing {
            self.cur_easing[index] = None;
        }
    }

    // Postprocessing

    fn postprocess(&mut self) {
        // Timing is final from here on
        self.chart.invalidate_caches();

        self.equalize_fx();
        self.apply_spins();
        for (&time, &length) in &self.stops {
            self.chart.stops.insert(time, true);
            let end = self.chart.add_duration(time, length);
            self.chart.stops.insert(end, false);
        }
        for index in 0..2 {
            self.insert_ease_midpoints(index);
            self.interpolate_curves(index);
            self.insert_filter_midpoints(index);
        }
        self.close_controllers();
        self.build_effects();
        self.build_filters();
        self.build_autotab();

        let end = TimePoint::measure_start(self.chart.end_measure);
        for scripts in self.chart.script_ids.values_mut() {
            scripts.insert(end, Vec::new());
        }
    }

    /// Share an effect or sound between simultaneous FX notes when only one side has one.
    fn equalize_fx(&mut self) {
        let [left, right] = &mut self.chart.note_data.fx;
        for (time, l) in left.iter_mut() {
            let Some(r) = right.get_mut(time) else {
                continue;
            };
            if l.duration() != r.duration() {
                continue;
            }
            if l.special == 0 && r.special != 0 {
                l.special = r.special;
            } else if l.special != 0 && r.special == 0 {
                r.special = l.special;
            }
        }
    }

    fn apply_spins(&mut self) {
        for (&time, state) in &self.spins {
            let (kind, length) = state.split_at(state.len().min(2));
            let length = match length.parse::<i64>() {
                Ok(length) => round_half_even(spin_rate() * length).max(1) as u32,
                Err(_) => {
                    self.diag.warn_at(
                        WarningKind::MalformedValue,
                        time,
                        format!("invalid spin length \"{state}\""),
                    );
                    continue;
                }
            };
            let symbol = kind.chars().nth(1);

            let mut matched = false;
            for lane in &mut self.chart.note_data.vol {
                let Some(point) = lane.get_mut(&time) else {
                    continue;
                };
                let spin_type = if point.start() < point.end() {
                    match symbol {
                        Some(')') => Some(SpinType::SingleSpin),
                        Some('>') => Some(SpinType::HalfSpin),
                        _ => None,
                    }
                } else if point.start() > point.end() {
                    match symbol {
                        Some('(') => Some(SpinType::SingleSpin),
                        Some('<') => Some(SpinType::HalfSpin),
                        _ => None,
                    }
                } else {
                    None
                };
                if let Some(spin_type) = spin_type {
                    point.spin_type = spin_type;
                    point.spin_duration = length;
                    matched = true;
                    break;
                }
            }
            if !matched {
                self.diag.warn_at(
                    WarningKind::UnmatchedSpin,
                    time,
                    format!("cannot match spin \"{state}\" with any slam"),
                );
            }
        }
    }

    /// Add points where a curve starts without a laser point.
    fn insert_ease_midpoints(&mut self, index: usize) {
        let midpoints = std::mem::take(&mut self.ease_midpoints[index]);
        let mut new_points = Vec::new();
        {
            let lane = &self.chart.note_data.vol[index];
            for (time, easing) in midpoints {
                if lane.contains_key(&time) {
                    continue;
                }
                let before = lane.range(..=time).next_back();
                let after = lane.range(time..).next();
                let (Some((&ti, pi)), Some((&tf, pf))) = (before, after) else {
                    continue;
                };
                let progress = self.chart.distance(ti, time) / self.chart.distance(ti, tf);
                let position = interpolate(
                    EasingType::Linear,
                    progress,
                    pi.end(),
                    pf.start(),
                    (0.0, 1.0),
                );
                if let Ok(mut info) = VolInfo::new(position, position) {
                    info.ease_type = easing;
                    info.filter_index = pi.filter_index;
                    info.point_type = SegmentFlag::MIDDLE;
                    info.wide_laser = pi.wide_laser;
                    new_points.push((time, info));
                }
            }
        }
        self.chart.note_data.vol[index].extend(new_points);
    }

    /// Close segments and render curves as dense interpolated points.
    fn interpolate_curves(&mut self, index: usize) {
        let times: Vec<TimePoint> = self.chart.note_data.vol[index].keys().copied().collect();
        let Some(&last) = times.last() else {
            return;
        };
        let step = interpolation_distance();

        for pair in times.windows(2) {
            let (ti, tf) = (pair[0], pair[1]);
            let lane = &self.chart.note_data.vol[index];
            let (Some(pi), Some(pf)) = (lane.get(&ti), lane.get(&tf)) else {
                continue;
            };
            if pf.point_type == SegmentFlag::START {
                if let Some(point) = self.chart.note_data.vol[index].get_mut(&ti) {
                    point.point_type |= SegmentFlag::END;
                }
                continue;
            }
            if pi.ease_type == EasingType::NoEasing {
                continue;
            }

            let (ease, initial, target) = (pi.ease_type, pi.end(), pf.start());
            let (filter, wide) = (pi.filter_index, pi.wide_laser);
            let range = self.ease_ranges.get(&ti).copied().unwrap_or((0.0, 1.0));
            let total = self.chart.distance(ti, tf);
            let divisions = (total / step).ceil().to_integer();

            let mut generated = Vec::new();
            for k in 1..divisions {
                let span = step * k;
                let time = self.chart.add_duration(ti, span);
                let position = interpolate(ease, span / total, initial, target, range);
                if let Ok(mut info) = VolInfo::new(position, position) {
                    info.ease_type = ease;
                    info.filter_index = filter;
                    info.point_type = SegmentFlag::MIDDLE;
                    info.wide_laser = wide;
                    info.interpolated = true;
                    generated.push((time, info));
                }
            }
            self.chart.note_data.vol[index].extend(generated);
        }

        if let Some(point) = self.chart.note_data.vol[index].get_mut(&last) {
            point.point_type |= SegmentFlag::END;
        }
    }

    /// Add points where the active filter changes inside a laser segment.
    fn insert_filter_midpoints(&mut self, index: usize) {
        let origin = TimePoint::default();
        let mut new_points = Vec::new();
        let changes: Vec<(TimePoint, FilterIndex)> =
            self.chart.active_filter.iter().map(|(t, f)| (*t, *f)).collect();

        for (time, filter) in changes {
            if let Some(point) = self.chart.note_data.vol[index].get_mut(&time) {
                point.filter_index = filter;
                point.interpolated = false;
                continue;
            }
            let lane = &self.chart.note_data.vol[index];
            let before = lane.range(..time).next_back();
            let after = lane.range(time..).next();
            let (Some((&ti, pi)), Some((&tf, pf))) = (before, after) else {
                continue;
            };
            // Before the chart starts, or between segments
            if ti == origin || pi.point_type.contains(SegmentFlag::END) {
                continue;
            }
            let progress = self.chart.distance(ti, time) / self.chart.distance(ti, tf);
            let position = interpolate(
                EasingType::Linear,
                progress,
                pi.end(),
                pf.start(),
                (0.0, 1.0),
            );
            if let Ok(mut info) = VolInfo::new(position, position) {
                info.ease_type = pi.ease_type;
                info.filter_index = filter;
                info.point_type = SegmentFlag::MIDDLE;
                info.wide_laser = pi.wide_laser;
                new_points.push((time, info));
            }
        }
        self.chart.note_data.vol[index].extend(new_points);
    }

    fn close_controllers(&mut self) {
        let end = TimePoint::measure_start(self.chart.end_measure);
        let sp = &mut self.chart.spcontroller_data;

        for (points, last) in [
            (&mut sp.zoom_top, self.final_zoom_top),
            (&mut sp.zoom_bottom, self.final_zoom_bottom),
        ] {
            if let Some(final_point) = points.get(&last) {
                let mut closing = final_point.clone();
                closing.start = closing.end;
                points.insert(end, closing);
            }
        }

        if let (Some(first), Some(last)) = (self.first_lane_split, self.final_lane_split) {
            if let Some(point) = sp.lane_split.get_mut(&first) {
                point.point_type |= SegmentFlag::START;
            }
            if let Some(final_point) = sp.lane_split.get(&last) {
                let mut closing = final_point.clone();
                closing.start = closing.end;
                sp.lane_split.insert(end, closing);
            }
        }

        for points in [&mut sp.tilt, &mut sp.lane_split] {
            let times: Vec<TimePoint> = points.keys().copied().collect();
            for pair in times.windows(2) {
                if points.get(&pair[1]).is_some_and(|p| p.point_type == SegmentFlag::START) {
                    if let Some(point) = points.get_mut(&pair[0]) {
                        point.point_type |= SegmentFlag::END;
                    }
                }
            }
            if let Some(point) = times.last().and_then(|t| points.get_mut(t)) {
                point.point_type |= SegmentFlag::END;
            }
        }
    }

    fn pad_effect_slots(&mut self, needed: usize) {
        while self.chart.effect_list.len() < needed {
            let index = self.chart.effect_list.len() as i64;
            self.chart.effect_list.push(EffectEntry::default());
            self.chart.autotab_list.push(AutoTabEntry::new(index));
        }
    }

    /// Turn the `fx-l`/`fx-r` names seen in the chart into effect slots.
    fn build_effects(&mut self) {
        if self.fx_list.len() > 12 {
            self.diag.warn(
                WarningKind::TooManyEffects,
                format!("found {} distinct effects, more than 12", self.fx_list.len()),
            );
            self.pad_effect_slots(self.fx_list.len());
        }

        for (i, entry) in self.fx_list.iter().enumerate() {
            let mut parts = entry.split(';');
            let name = parts.next().unwrap_or_default();
            let params = match parts.map(str::parse::<i64>).collect::<Result<Vec<_>, _>>() {
                Ok(params) => params,
                Err(_) => {
                    self.diag.warn(
                        WarningKind::MalformedValue,
                        format!("cannot convert effect parameters \"{entry}\" to int"),
                    );
                    Vec::new()
                }
            };

            let mut effect = match builtin_effect(name)
                .or_else(|| self.chart.custom_effects.get(name).cloned())
            {
                Some(effect) => effect,
                None => {
                    self.diag.warn(
                        WarningKind::UnknownEffect,
                        format!("effect \"{name}\" is not defined"),
                    );
                    Effect::NoEffect
                }
            };
            if let Err(e) = effect.map_params(&params) {
                self.diag
                    .warn(WarningKind::MalformedValue, format!("effect \"{entry}\": {e}"));
            }
            if let Some(slot) = self.chart.effect_list.get_mut(i) {
                *slot = EffectEntry::new(effect);
            }
        }
    }

    /// Custom laser filters take the effect slots after the FX effects.
    fn build_filters(&mut self) {
        let used: Vec<&String> = self.filter_names.values().collect();
        self.chart.custom_filters.retain(|(name, _)| used.contains(&name));

        let fx_len = self.fx_list.len();
        let needed = fx_len + self.chart.custom_filters.len();
        if needed > 12 {
            self.diag.warn(
                WarningKind::TooManyEffects,
                "including custom filters causes more than 12 distinct effects",
            );
            self.pad_effect_slots(needed);
        }
        for (i, (name, effect)) in self.chart.custom_filters.iter().enumerate() {
            if let Some(slot) = self.chart.effect_list.get_mut(fx_len + i) {
                *slot = EffectEntry::new(effect.clone());
            }
            self.filter_to_effect.insert(name.clone(), fx_len + i);
        }
    }

    fn build_autotab(&mut self) {
        let names: Vec<(TimePoint, String)> =
            self.filter_names.iter().map(|(t, n)| (*t, n.clone())).collect();
        for pair in names.windows(2) {
            let ((ti, name), (tf, _)) = (&pair[0], &pair[1]);
            if filter_type(name).is_some() {
                continue;
            }
            match self.filter_to_effect.get(name) {
                Some(&which) => {
                    let duration = self.chart.distance(*ti, *tf);
                    self.chart.autotab_infos.insert(
                        *ti,
                        AutoTabInfo {
                            which: which as u32,
                            duration,
                        },
                    );
                }
                None => self.diag.warn_at(
                    WarningKind::UnknownFilter,
                    *ti,
                    format!("filter \"{name}\" is not defined"),
                ),
            }
        }
    }
}

fn lane_index(lane: Lane) -> usize {
    match lane {
        Lane::BtA | Lane::FxL | Lane::VolL => 0,
        Lane::BtB | Lane::FxR | Lane::VolR => 1,
        Lane::BtC => 2,
        Lane::BtD => 3,
    }
}

fn parse_easing(name: &str, value: &str) -> Result<EasingType, ChartError> {
    let raw: u8 = parse_value(name, value)?;
    EasingType::from_value(raw)
        .ok_or_else(|| ChartError::InvalidParameter(format!("unknown curve type {raw} for {name}")))
}

/// Set a controller value, or the end value of a snap if the point exists.
fn upsert_controller(
    points: &mut BTreeMap<TimePoint, SpControllerInfo>,
    time: TimePoint,
    value: f64,
) {
    match points.get_mut(&time) {
        Some(point) => point.end = value,
        None => {
            points.insert(time, SpControllerInfo::new(value, value, SegmentFlag::MIDDLE));
        }
    }
}

/// Definitions may sweep a parameter as `a>b` or `a-b`; keep the target, drop ranges.
fn strip_ranges(params: &mut HashMap<String, String>) {
    params.retain(|_, value| {
        let dashes = value.matches('-').count();
        !(dashes > 1 || (dashes == 1 && !value.starts_with('-')))
    });
    for value in params.values_mut() {
        if let Some((_, target)) = value.split_once('>') {
            *value = target.split('>').next().unwrap_or(target).to_string();
        }
    }
}

/// Detect encoding and decode bytes to string
pub(crate) fn detect_encoding_and_decode(raw: &[u8]) -> String {
    // Check for UTF-8 BOM
    if raw.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&raw[3..]).into_owned();
    }

    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }

    // Most older charts are Shift_JIS
    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, had_errors) = encoding_rs::EUC_JP.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    let (decoded, _, _) = encoding_rs::SHIFT_JIS.decode(raw);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "title=Test Song\nartist=tester\neffect=someone\ndifficulty=extended\nlevel=17\nt=150\nver=171\n";

    fn decode(body: &str) -> (SongChart, Diagnostics) {
        let mut diag = Diagnostics::new();
        let content = format!("{HEADER}--\n{body}");
        let chart = KshDecoder::decode_str(&content, &mut diag).unwrap();
        (chart, diag)
    }

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    #[test]
    fn test_laser_position_alphabets() {
        assert_eq!(convert_laser_pos('0'), Rational::from_integer(0));
        assert_eq!(convert_laser_pos('o'), Rational::from_integer(1));
        assert_eq!(convert_laser_pos('K'), Rational::new(2, 5));
        // Only in the finest alphabet
        assert_eq!(convert_laser_pos('1'), Rational::new(1, 50));
        assert_eq!(convert_laser_pos('?'), Rational::from_integer(0));
    }

    #[test]
    fn test_metadata() {
        let (chart, diag) = decode("0000|00|--\n--\n");
        assert_eq!(chart.song_info.title, "Test Song");
        assert_eq!(chart.song_info.ascii_label, "testsong");
        assert_eq!(chart.song_info.min_bpm, 150.0);
        assert_eq!(chart.chart_info.level, 17);
        assert_eq!(chart.chart_info.difficulty, DifficultySlot::Exhaust);
        assert_eq!(chart.chart_info.bpm_at(TimePoint::default()), 150.0);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_old_version_is_fatal() {
        let mut diag = Diagnostics::new();
        let result = KshDecoder::decode_str("ver=150\n--\n0000|00|--\n--\n", &mut diag);
        assert!(result.is_err());
        let result = KshDecoder::decode_str("ver=abc\n--\n0000|00|--\n--\n", &mut diag);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_bar_line_is_fatal() {
        let mut diag = Diagnostics::new();
        assert!(KshDecoder::decode_str("title=x\nt=120\n", &mut diag).is_err());
    }

    #[test]
    fn test_chips_and_holds() {
        let body = "1000|00|--\n0200|00|--\n0200|00|--\n0000|00|--\n--\n";
        let (chart, diag) = decode(body);
        let notes = &chart.chart_info.note_data;
        assert_eq!(notes.bt[0].get(&tp(1, 0, 1)), Some(&BtInfo::chip()));
        let hold = notes.bt[1].get(&tp(1, 1, 4)).unwrap();
        assert_eq!(hold.duration(), Rational::new(1, 2));
        assert_eq!(chart.chart_info.end_measure, 3);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_unterminated_hold_warns() {
        let (chart, diag) = decode("2000|00|--\n1000|00|--\n--\n");
        assert_eq!(diag.count(WarningKind::UnterminatedHold), 1);
        assert_eq!(chart.chart_info.note_data.bt[0].len(), 1);
    }

    #[test]
    fn test_fx_effects_assigned_in_order() {
        let body = "fx-l=Retrigger;8\n0000|10|--\nfx-r=Gate;16\n0000|01|--\n0000|00|--\n0000|00|--\n--\n";
        let (chart, _) = decode(body);
        let notes = &chart.chart_info.note_data;
        assert_eq!(notes.fx[0].values().next().unwrap().special, 0);
        assert_eq!(notes.fx[1].values().next().unwrap().special, 1);
        assert!(matches!(chart.chart_info.effect_list[1].effect1, Effect::Gate(_)));
    }

    #[test]
    fn test_unknown_effect_warns() {
        let (chart, diag) = decode("fx-l=Mystery\n0000|10|--\n0000|00|--\n--\n");
        assert!(diag.contains(WarningKind::UnknownEffect));
        assert_eq!(chart.chart_info.effect_list[0].effect1, Effect::NoEffect);
    }

    #[test]
    fn test_short_segment_becomes_slam() {
        let mut body = String::from("0000|00|0-\n0000|00|o-\n");
        for _ in 0..30 {
            body.push_str("0000|00|:-\n");
        }
        body.push_str("0000|00|o-\n--\n");
        let (chart, _) = decode(&body);
        let lane = &chart.chart_info.note_data.vol[0];
        let first = lane.get(&tp(1, 0, 1)).unwrap();
        assert!(first.is_slam());
        assert_eq!(first.end(), Rational::from_integer(1));
        assert_eq!(first.point_type, SegmentFlag::START);
        let last = lane.values().last().unwrap();
        assert!(last.point_type.contains(SegmentFlag::END));
    }

    #[test]
    fn test_spin_attaches_to_slam() {
        // 32nd note spacing so the two points form a slam
        let mut body = String::from("0000|00|0-@)192\n0000|00|o-\n");
        for _ in 0..30 {
            body.push_str("0000|00|--\n");
        }
        body.push_str("--\n");
        let (chart, diag) = decode(&body);
        let slam = chart.chart_info.note_data.vol[0].get(&tp(1, 0, 1)).unwrap();
        assert_eq!(slam.spin_type, SpinType::SingleSpin);
        assert_eq!(slam.spin_duration, 5);
        assert!(!diag.contains(WarningKind::UnmatchedSpin));
    }

    #[test]
    fn test_unmatched_spin_warns() {
        let (_, diag) = decode("0000|00|--@(192\n--\n");
        assert!(diag.contains(WarningKind::UnmatchedSpin));
    }

    #[test]
    fn test_midmeasure_beat_applies_next_measure() {
        let body = "0000|00|--\nbeat=3/4\n0000|00|--\n--\n0000|00|--\n--\n";
        let (chart, _) = decode(body);
        let timesigs = &chart.chart_info.timesigs;
        assert_eq!(timesigs.get(&TimePoint::measure_start(2)).unwrap().upper(), 3);
    }

    #[test]
    fn test_stop_converted_to_span() {
        let (chart, _) = decode("stop=96\n1000|00|--\n--\n");
        let stops = &chart.chart_info.stops;
        assert_eq!(stops.get(&tp(1, 0, 1)), Some(&true));
        assert_eq!(stops.get(&tp(1, 1, 2)), Some(&false));
    }

    #[test]
    fn test_custom_filter_autotab() {
        let content = format!(
            "{HEADER}--\nfiltertype=myFilter\n0000|00|00\n--\nfiltertype=peak\n0000|00|--\n--\n#define_filter myFilter type=BitCrusher;reduction=10samples\n"
        );
        let mut diag = Diagnostics::new();
        let chart = KshDecoder::decode_str(&content, &mut diag).unwrap().chart_info;
        assert_eq!(chart.custom_filters.len(), 1);
        let info = chart.autotab_infos.get(&tp(1, 0, 1)).unwrap();
        assert_eq!(info.which, 0);
        assert_eq!(info.duration, Rational::from_integer(1));
    }

    #[test]
    fn test_strip_ranges() {
        let mut params: HashMap<String, String> = HashMap::from([
            ("a".to_string(), "1>2".to_string()),
            ("b".to_string(), "1-2".to_string()),
            ("c".to_string(), "-3".to_string()),
        ]);
        strip_ranges(&mut params);
        assert_eq!(params.get("a").map(String::as_str), Some("2"));
        assert!(!params.contains_key("b"));
        assert_eq!(params.get("c").map(String::as_str), Some("-3"));
    }

    #[test]
    fn test_scripts_terminated_at_end() {
        let (chart, _) = decode("//scriptBegin=0b00100000,7\n1000|00|--\n--\n");
        let scripts = chart.chart_info.script_ids.get(&Lane::BtA).unwrap();
        assert_eq!(scripts.get(&tp(1, 0, 1)), Some(&vec![7]));
        assert_eq!(scripts.get(&TimePoint::measure_start(3)), Some(&Vec::new()));
    }

    #[test]
    fn test_detect_encoding_sjis() {
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("title=テスト");
        assert_eq!(detect_encoding_and_decode(&encoded), "title=テスト");
    }

    #[test]
    fn test_decode_sample_chart() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-ksh/basic.ksh");
        if path.exists() {
            let mut diag = Diagnostics::new();
            let chart = KshDecoder::decode(&path, &mut diag).unwrap();
            assert!(!chart.chart_info.note_data.is_empty());
        }
    }
}
