use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;

use serde::Serialize;

use crate::analysis::{NoteCounts, RadarValues, compute_radar, count_notes};
use crate::effect::{Effect, EffectEntry, default_effects};
use crate::enums::{DifficultySlot, FilterIndex, Lane, SegmentFlag, TiltType};
use crate::filter::{AutoTabEntry, Filter, default_autotab, default_filters};
use crate::note::{AutoTabInfo, NoteData, SpControllerData, SpControllerInfo};
use crate::time::{Rational, TICKS_PER_BAR, TimePoint, TimeSignature, round_half_even};

/// BPM at which holds and lasers start ticking at half rate.
pub const HALF_TICK_BPM_THRESHOLD: f64 = 255.0;

/// Song-level metadata shared by every difficulty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongInfo {
    pub title: String,
    /// Lower-cased alphanumeric form of the title
    pub ascii_label: String,
    pub artist: String,
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub music_volume: u32,
}

impl Default for SongInfo {
    fn default() -> Self {
        Self {
            title: String::new(),
            ascii_label: String::new(),
            artist: String::new(),
            min_bpm: 0.0,
            max_bpm: 0.0,
            music_volume: 100,
        }
    }
}

impl SongInfo {
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.ascii_label = title
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
    }
}

/// Chart data and metadata.
///
/// Built by one decoder pass and read by the analyzer and encoder afterwards.
/// Derived figures are memoized on first access; call [`ChartInfo::invalidate_caches`]
/// after mutating a chart that has already been queried.
#[derive(Debug, Clone)]
pub struct ChartInfo {
    // Metadata
    pub level: u32,
    pub difficulty: DifficultySlot,
    pub effector: String,
    pub illustrator: String,

    // Paths and offsets used by packagers
    pub music_path: String,
    pub effected_path: String,
    pub music_offset: i64,
    pub preview_start: i64,
    pub jacket_path: String,
    pub end_measure: u32,

    // Timing, each map sparse: the value at a point is the latest key <= point
    pub bpms: BTreeMap<TimePoint, f64>,
    pub timesigs: BTreeMap<TimePoint, TimeSignature>,
    pub stops: BTreeMap<TimePoint, bool>,
    pub tilt_type: BTreeMap<TimePoint, TiltType>,

    // Effects
    pub effect_list: Vec<EffectEntry>,
    pub filter_list: Vec<Filter>,
    pub autotab_list: Vec<AutoTabEntry>,
    pub active_filter: BTreeMap<TimePoint, FilterIndex>,
    pub autotab_infos: BTreeMap<TimePoint, AutoTabInfo>,

    pub note_data: NoteData,
    pub spcontroller_data: SpControllerData,

    /// Script ids active from each point, per lane
    pub script_ids: BTreeMap<Lane, BTreeMap<TimePoint, Vec<u32>>>,

    // Definitions by name
    pub custom_effects: BTreeMap<String, Effect>,
    /// Kept in definition order, which decides their effect slots.
    pub custom_filters: Vec<(String, Effect)>,

    /// Start of measure `i + 1` in whole notes, filled forward on demand.
    measure_starts: RefCell<Vec<Rational>>,
    note_counts: OnceCell<NoteCounts>,
    radar: OnceCell<RadarValues>,
}

impl Default for ChartInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartInfo {
    pub fn new() -> Self {
        let origin = TimePoint::default();
        let mut spcontroller_data = SpControllerData::default();
        spcontroller_data
            .zoom_top
            .insert(origin, SpControllerInfo::new(0.0, 0.0, SegmentFlag::START));
        spcontroller_data
            .zoom_bottom
            .insert(origin, SpControllerInfo::new(0.0, 0.0, SegmentFlag::START));

        Self {
            level: 1,
            difficulty: DifficultySlot::Maximum,
            effector: "dummy".to_string(),
            illustrator: "dummy".to_string(),
            music_path: String::new(),
            effected_path: String::new(),
            music_offset: 0,
            preview_start: 0,
            jacket_path: String::new(),
            end_measure: 0,
            bpms: BTreeMap::from([(origin, 120.0)]),
            timesigs: BTreeMap::from([(origin, TimeSignature::default())]),
            stops: BTreeMap::new(),
            tilt_type: BTreeMap::from([(origin, TiltType::Normal)]),
            effect_list: default_effects(),
            filter_list: default_filters(),
            autotab_list: default_autotab(),
            active_filter: BTreeMap::from([(origin, FilterIndex::Peak)]),
            autotab_infos: BTreeMap::new(),
            note_data: NoteData::default(),
            spcontroller_data,
            script_ids: BTreeMap::new(),
            custom_effects: BTreeMap::new(),
            custom_filters: Vec::new(),
            measure_starts: RefCell::new(Vec::new()),
            note_counts: OnceCell::new(),
            radar: OnceCell::new(),
        }
    }

    /// Drop every memoized value. Needed only if the chart changes after being queried.
    pub fn invalidate_caches(&mut self) {
        self.measure_starts.get_mut().clear();
        self.note_counts = OnceCell::new();
        self.radar = OnceCell::new();
    }

    pub fn has_effected_track(&self) -> bool {
        !self.effected_path.is_empty()
    }

    /// Time signature in force during `measure`.
    pub fn timesig_at(&self, measure: u32) -> TimeSignature {
        self.timesigs
            .range(..TimePoint::measure_start(measure.saturating_add(1)))
            .next_back()
            .map(|(_, ts)| *ts)
            .unwrap_or_default()
    }

    /// BPM in force at `time`, or 0 before the first BPM key.
    pub fn bpm_at(&self, time: TimePoint) -> f64 {
        self.bpms
            .range(..=time)
            .next_back()
            .map(|(_, bpm)| *bpm)
            .unwrap_or(0.0)
    }

    /// Hold and laser tick length at `time`.
    pub fn tick_rate_at(&self, time: TimePoint) -> Rational {
        if self.bpm_at(time) < HALF_TICK_BPM_THRESHOLD {
            Rational::new(1, 16)
        } else {
            Rational::new(1, 8)
        }
    }

    /// Non-negative distance between two points in whole notes.
    pub fn distance(&self, a: TimePoint, b: TimePoint) -> Rational {
        if a == b {
            return Rational::from_integer(0);
        }
        let (a, b) = if b < a { (b, a) } else { (a, b) };
        self.timepoint_to_fraction(b) - self.timepoint_to_fraction(a)
    }

    /// Move `time` forward by `duration`, carrying into following measures.
    pub fn add_duration(&self, time: TimePoint, duration: Rational) -> TimePoint {
        let mut position = time.position() + duration;
        let mut measure = time.measure();
        loop {
            let length = self.timesig_at(measure).as_fraction();
            if position < length {
                break;
            }
            position -= length;
            measure += 1;
        }
        TimePoint::from_parts(measure, position)
    }

    pub fn add_ticks(&self, time: TimePoint, ticks: i64) -> TimePoint {
        self.add_duration(time, Rational::new(ticks, TICKS_PER_BAR))
    }

    /// Format as VOX `mmm,bb,tt`: measure, 1-based beat, tick within the beat.
    pub fn timepoint_to_vox(&self, time: TimePoint) -> String {
        let timesig = self.timesig_at(time.measure());
        let note_value = Rational::new(1, i64::from(timesig.lower()));
        let position = time.position();
        let div = (position / note_value).floor().to_integer();
        let subdiv = round_half_even((position % note_value) * TICKS_PER_BAR);
        format!("{:03},{:02},{:02}", time.measure(), div + 1, subdiv)
    }

    /// Absolute position of `time` in whole notes from the start of measure 1.
    pub fn timepoint_to_fraction(&self, time: TimePoint) -> Rational {
        self.measure_start_fraction(time.measure()) + time.position()
    }

    fn measure_start_fraction(&self, measure: u32) -> Rational {
        let index = measure.saturating_sub(1) as usize;
        let mut starts = self.measure_starts.borrow_mut();
        if starts.is_empty() {
            starts.push(Rational::from_integer(0));
        }
        while starts.len() <= index {
            let filled = starts.len() as u32;
            let next = starts[starts.len() - 1] + self.timesig_at(filled).as_fraction();
            starts.push(next);
        }
        starts[index]
    }

    // Derived figures

    pub fn note_counts(&self) -> NoteCounts {
        *self.note_counts.get_or_init(|| count_notes(self))
    }

    pub fn chip_notecount(&self) -> u32 {
        self.note_counts().chip
    }

    pub fn long_notecount(&self) -> u32 {
        self.note_counts().long
    }

    pub fn vol_notecount(&self) -> u32 {
        self.note_counts().vol
    }

    pub fn max_chain(&self) -> u32 {
        let counts = self.note_counts();
        counts.chip + counts.long + counts.vol
    }

    pub fn max_ex_score(&self) -> u32 {
        let counts = self.note_counts();
        5 * counts.chip + 2 * (counts.long + counts.vol)
    }

    pub fn radar(&self) -> RadarValues {
        *self.radar.get_or_init(|| compute_radar(self))
    }
}

/// A decoded chart together with its song metadata.
#[derive(Debug, Clone, Default)]
pub struct SongChart {
    pub song_info: SongInfo,
    pub chart_info: ChartInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    fn chart_with_7_8_at_3() -> ChartInfo {
        let mut chart = ChartInfo::new();
        chart
            .timesigs
            .insert(tp(3, 0, 1), TimeSignature::new(7, 8).unwrap());
        chart
    }

    #[test]
    fn test_defaults() {
        let chart = ChartInfo::new();
        assert_eq!(chart.bpm_at(TimePoint::default()), 120.0);
        assert_eq!(chart.timesig_at(1), TimeSignature::default());
        assert_eq!(chart.effect_list.len(), 12);
        assert_eq!(chart.filter_list.len(), 5);
        assert_eq!(chart.autotab_list.len(), 12);
        assert_eq!(chart.spcontroller_data.zoom_top.len(), 1);
        assert_eq!(chart.level, 1);
        assert_eq!(chart.effector, "dummy");
    }

    #[test]
    fn test_timesig_lookup_is_sticky() {
        let chart = chart_with_7_8_at_3();
        assert_eq!(chart.timesig_at(2), TimeSignature::default());
        assert_eq!(chart.timesig_at(3).upper(), 7);
        assert_eq!(chart.timesig_at(40).lower(), 8);
    }

    #[test]
    fn test_bpm_predecessor() {
        let mut chart = ChartInfo::new();
        chart.bpms.insert(tp(2, 1, 2), 300.0);
        assert_eq!(chart.bpm_at(tp(2, 1, 4)), 120.0);
        assert_eq!(chart.bpm_at(tp(2, 1, 2)), 300.0);
        assert_eq!(chart.tick_rate_at(tp(1, 0, 1)), Rational::new(1, 16));
        assert_eq!(chart.tick_rate_at(tp(5, 0, 1)), Rational::new(1, 8));
    }

    #[test]
    fn test_distance_across_timesig_change() {
        let chart = chart_with_7_8_at_3();
        let a = tp(2, 1, 2);
        let b = tp(4, 1, 8);
        // 1/2 of measure 2, all of measure 3 (7/8), 1/8 of measure 4
        assert_eq!(chart.distance(a, b), Rational::new(3, 2));
        assert_eq!(chart.distance(b, a), chart.distance(a, b));
        assert_eq!(chart.distance(a, a), Rational::from_integer(0));
    }

    #[test]
    fn test_add_duration_carries() {
        let chart = chart_with_7_8_at_3();
        assert_eq!(chart.add_duration(tp(2, 3, 4), Rational::new(1, 2)), tp(3, 1, 4));
        assert_eq!(chart.add_duration(tp(3, 3, 4), Rational::new(1, 8)), tp(4, 0, 1));
        assert_eq!(chart.add_ticks(tp(1, 0, 1), 48), tp(1, 1, 4));
    }

    #[test]
    fn test_timepoint_to_vox() {
        let chart = chart_with_7_8_at_3();
        assert_eq!(chart.timepoint_to_vox(tp(1, 0, 1)), "001,01,00");
        assert_eq!(chart.timepoint_to_vox(tp(1, 3, 8)), "001,02,24");
        assert_eq!(chart.timepoint_to_vox(tp(3, 3, 8)), "003,04,00");
        assert_eq!(chart.timepoint_to_vox(tp(12, 1, 192)), "012,01,01");
    }

    #[test]
    fn test_timepoint_to_fraction() {
        let chart = chart_with_7_8_at_3();
        assert_eq!(chart.timepoint_to_fraction(tp(1, 0, 1)), Rational::from_integer(0));
        assert_eq!(chart.timepoint_to_fraction(tp(3, 1, 8)), Rational::new(17, 8));
        assert_eq!(chart.timepoint_to_fraction(tp(4, 0, 1)), Rational::new(23, 8));
    }

    #[test]
    fn test_far_measure_fraction() {
        let chart = chart_with_7_8_at_3();
        // two 4/4 measures, then 7/8 from measure 3 on
        let expected = Rational::from_integer(2) + Rational::new(7, 8) * 79_998;
        assert_eq!(chart.timepoint_to_fraction(tp(80_001, 0, 1)), expected);
        assert_eq!(chart.timepoint_to_fraction(tp(10, 0, 1)), Rational::new(65, 8));
        assert_eq!(
            chart.distance(tp(80_001, 0, 1), tp(80_000, 0, 1)),
            Rational::new(7, 8)
        );
    }

    #[test]
    fn test_invalidate_caches_sees_new_timesig() {
        let mut chart = ChartInfo::new();
        assert_eq!(chart.timesig_at(5), TimeSignature::default());
        chart
            .timesigs
            .insert(tp(5, 0, 1), TimeSignature::new(3, 4).unwrap());
        chart.invalidate_caches();
        assert_eq!(chart.timesig_at(5).upper(), 3);
    }

    #[test]
    fn test_ascii_label() {
        let mut song = SongInfo::default();
        song.set_title("Hello, World! 2");
        assert_eq!(song.ascii_label, "helloworld2");
        assert_eq!(song.music_volume, 100);
    }
}
