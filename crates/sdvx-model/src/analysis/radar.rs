// Radar values, an approximation of the game's difficulty profile.
//
// Every coefficient below was fitted against official charts. They are kept as
// literals; re-deriving them is out of scope.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::analysis::ElapsedTime;
use crate::chart::ChartInfo;
use crate::easing::clamp;
use crate::enums::{Lane, SegmentFlag, SpinType};
use crate::note::SpControllerInfo;
use crate::time::{Rational, TimePoint};

const MAX_RADAR_VALUE: f64 = 200.0;
const TRICKY_CAM_FLAT_INC: f64 = 0.103;
/// Seconds between two consecutive 1/16ths at 130 BPM.
const TRICKY_JACK_DISTANCE: f64 = 15.0 / 130.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RadarValues {
    pub notes: u32,
    pub peak: u32,
    pub tsumami: u32,
    pub onehand: u32,
    pub handtrip: u32,
    pub tricky: u32,
}

/// Clamp to the radar range and truncate. NaN (from an empty chart) becomes 0.
fn radar_value(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    clamp(value, 0.0, MAX_RADAR_VALUE) as u32
}

fn onehand_chip_value(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => 1.2132,
        2 => 1.3343,
        3 => 1.6246,
        _ => 1.6365,
    }
}

fn onehand_hold_value(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => 0.2205,
        2 => 0.3530,
        3 => 0.5180,
        _ => 0.5649,
    }
}

fn handtrip_value(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => 1.2486,
        2 => 1.4250,
        _ => 1.5113,
    }
}

/// Buttons that force the hand on `laser` to cross over.
fn handtrip_lanes(laser: Lane) -> &'static [Lane] {
    match laser {
        Lane::VolL => &[Lane::BtA, Lane::BtB, Lane::FxL],
        Lane::VolR => &[Lane::BtC, Lane::BtD, Lane::FxR],
        _ => &[],
    }
}

/// Tricky weight and default length in ticks of each spin.
fn spin_profile(spin: SpinType) -> (f64, i64) {
    match spin {
        SpinType::NoSpin => (0.0, 0),
        SpinType::SingleSpin => (1.1, 152),
        SpinType::SingleSpin2 => (0.7, 104),
        SpinType::SingleSpin3 => (0.9, 128),
        SpinType::TripleSpin => (3.0, 392),
        SpinType::HalfSpin => (0.5, 128),
    }
}

/// Chord weight of simultaneous presses: one per button, less for easy same-hand chords.
fn peak_weight(flags: u32) -> f64 {
    let mut value = 0.0;
    let has = |mask: u32| flags & mask == mask;
    // FX-L, BT-A, BT-B
    if has(0o70) {
        value -= 1.5;
    } else if [0o60, 0o50, 0o30].into_iter().any(has) {
        value -= 0.83;
    }
    // BT-C, BT-D, FX-R
    if has(0o07) {
        value -= 1.5;
    } else if [0o06, 0o05, 0o03].into_iter().any(has) {
        value -= 0.83;
    }
    // Exactly BT-B + BT-C
    if flags == 0o14 {
        value -= 0.83;
    }
    value + f64::from(flags.count_ones())
}

/// Largest chord weight summed over any two second window.
fn peak_density(weights: &[(f64, f64)]) -> (f64, f64) {
    let mut best = (0.0, 0.0);
    for (i, &(tn, _)) in weights.iter().enumerate() {
        let forward: f64 = weights[i..]
            .iter()
            .take_while(|(tr, _)| tr - tn <= 2.0)
            .map(|(_, v)| v)
            .sum();
        let backward: f64 = weights[..=i]
            .iter()
            .rev()
            .take_while(|(tr, _)| tn - tr <= 2.0)
            .map(|(_, v)| v)
            .sum();
        for value in [forward, backward] {
            if value > best.1 {
                best = (tn, value);
            }
        }
    }
    best
}

struct Span {
    begin: TimePoint,
    end: TimePoint,
}

fn chart_span(chart: &ChartInfo) -> Span {
    let mut begin: Option<TimePoint> = None;
    let mut end = TimePoint::default();
    for (_, time, duration) in chart.note_data.iter_buttons() {
        begin = Some(begin.map_or(time, |b| b.min(time)));
        end = end.max(chart.add_duration(time, duration));
    }
    for (_, time, _) in chart.note_data.iter_vols() {
        begin = Some(begin.map_or(time, |b| b.min(time)));
        end = end.max(time);
    }
    Span {
        begin: begin.unwrap_or_default(),
        end,
    }
}

/// Laser intervals on one lane: moving segments and slams, merged when they touch.
type LaserRange = (Lane, TimePoint, TimePoint);

struct TsumamiFigures {
    moving: f64,
    static_: f64,
    slam: f64,
    ranges: Vec<LaserRange>,
}

fn tsumami_figures(chart: &ChartInfo, elapsed: &ElapsedTime) -> TsumamiFigures {
    let vols: Vec<_> = chart.note_data.iter_vols().collect();
    let mut figures = TsumamiFigures {
        moving: 0.0,
        static_: 0.0,
        slam: 0.0,
        ranges: Vec::new(),
    };
    let mut pre_ranges: Vec<LaserRange> = Vec::new();

    for (i, &(lane_i, time_i, vol_i)) in vols.iter().enumerate() {
        if vol_i.is_slam() {
            figures.slam += 0.11;
            pre_ranges.push((lane_i, time_i, time_i));
        }
        let Some(&(lane_f, time_f, vol_f)) = vols.get(i + 1) else {
            continue;
        };
        if lane_i != lane_f || vol_i.point_type.contains(SegmentFlag::END) {
            continue;
        }
        let duration = elapsed.at(time_f) - elapsed.at(time_i);
        log::debug!("vol duration at {time_i}: {duration:.3}s");
        if vol_i.end() != vol_f.start() {
            figures.moving += duration;
            pre_ranges.push((lane_i, time_i, time_f));
        } else {
            figures.static_ += duration;
        }
    }

    let mut prev: Option<LaserRange> = None;
    for (lane, ti, tf) in pre_ranges {
        if let Some((prev_lane, prev_ti, prev_tf)) = prev {
            if lane == prev_lane && ti == prev_tf {
                prev = Some((prev_lane, prev_ti, tf));
                continue;
            }
            figures.ranges.push((prev_lane, prev_ti, prev_tf));
        }
        prev = Some((lane, ti, tf));
    }
    figures.ranges.extend(prev);
    figures
}

#[derive(Default)]
struct HandFigures {
    onehand_chip: f64,
    onehand_long: f64,
    handtrip_chip: f64,
    handtrip_long: f64,
}

fn hand_figures(chart: &ChartInfo, ranges: &[LaserRange]) -> HandFigures {
    let mut figures = HandFigures::default();
    for &(laser, ti, tf) in ranges {
        let crossing = handtrip_lanes(laser);
        let mut chips: BTreeMap<TimePoint, Vec<Lane>> = BTreeMap::new();
        let mut holds: Vec<LaserRange> = Vec::new();
        for (lane, bi, duration) in chart.note_data.iter_buttons() {
            if ti <= bi && bi <= tf {
                chips.entry(bi).or_default().push(lane);
            }
            if duration != Rational::from_integer(0) {
                let bf = chart.add_duration(bi, duration);
                // Loose overlap test: keeps any hold that starts before the range ends
                if bi <= tf || ti <= bf {
                    holds.push((lane, bi, bf));
                }
            }
        }

        let mut checkpoints: BTreeSet<TimePoint> = holds
            .iter()
            .map(|(_, t, _)| *t)
            .filter(|t| ti <= *t && *t <= tf)
            .collect();
        checkpoints.insert(ti);

        for lanes in chips.values() {
            let crossed = lanes.iter().filter(|l| crossing.contains(*l)).count();
            figures.onehand_chip += onehand_chip_value(lanes.len());
            figures.handtrip_chip += handtrip_value(crossed);
        }
        for time in checkpoints {
            let active: Vec<Lane> = holds
                .iter()
                .filter(|(_, hi, hf)| *hi <= time && time < *hf)
                .map(|(l, _, _)| *l)
                .collect();
            let crossed = active.iter().filter(|l| crossing.contains(*l)).count();
            figures.onehand_long += onehand_hold_value(active.len());
            figures.handtrip_long += handtrip_value(crossed);
        }
    }
    figures
}

#[derive(Default)]
struct TrickyFigures {
    camera: f64,
    notes: f64,
    bpm_change: f64,
    bpm_dev: f64,
    jacks: f64,
}

impl TrickyFigures {
    fn total(&self) -> f64 {
        self.camera + self.notes + self.bpm_change + self.bpm_dev + self.jacks
    }
}

fn buttons_between(chart: &ChartInfo, from: TimePoint, to: TimePoint) -> Vec<TimePoint> {
    chart
        .note_data
        .iter_buttons()
        .map(|(_, t, _)| t)
        .filter(|t| from <= *t && *t < to)
        .collect()
}

fn camera_tricky(
    chart: &ChartInfo,
    elapsed: &ElapsedTime,
    track: &BTreeMap<TimePoint, SpControllerInfo>,
    tricky: &mut TrickyFigures,
) {
    let points: Vec<(&TimePoint, &SpControllerInfo)> = track.iter().collect();
    for pair in points.windows(2) {
        let ((&ti, cam_i), (&tf, cam_f)) = (pair[0], pair[1]);
        if cam_i.is_snap() {
            tricky.camera += TRICKY_CAM_FLAT_INC;
        }
        tricky.camera += TRICKY_CAM_FLAT_INC;
        let (time_i, time_f) = (elapsed.at(ti), elapsed.at(tf));
        if time_f <= time_i {
            continue;
        }
        for note in buttons_between(chart, ti, tf) {
            let note_s = elapsed.at(note);
            let cam = (cam_f.start - cam_i.end) * (note_s - time_i) / (time_f - time_i) + cam_i.end;
            tricky.notes += (cam * 100.0).abs().powf(2.5) / 2_100_000.0;
        }
    }
    if points.len() > 1 && points.last().is_some_and(|(_, last)| last.is_snap()) {
        tricky.camera += TRICKY_CAM_FLAT_INC;
    }
}

fn jack_lengths(chart: &ChartInfo, elapsed: &ElapsedTime) -> Vec<u32> {
    let mut jacks = Vec::new();
    let mut last_lane: Option<Lane> = None;
    let mut last_time: Option<f64> = None;
    let mut run = 1;
    for (lane, time, _) in chart.note_data.iter_buttons() {
        if last_lane != Some(lane) {
            last_lane = Some(lane);
            last_time = None;
            if run >= 3 {
                jacks.push(run);
            }
            run = 1;
        }
        let now = elapsed.at(time);
        if let Some(prev) = last_time {
            if now - prev <= TRICKY_JACK_DISTANCE {
                run += 1;
            } else {
                if run >= 3 {
                    jacks.push(run);
                }
                run = 1;
            }
        }
        last_time = Some(now);
    }
    if run >= 3 {
        jacks.push(run);
    }
    jacks
}

/// Compute all six radar values.
pub fn compute_radar(chart: &ChartInfo) -> RadarValues {
    let notes = &chart.note_data;
    let span = chart_span(chart);
    let elapsed = ElapsedTime::new(chart, span.end);
    let standard_bpm = elapsed.standard_bpm();
    log::info!("----- GENERAL INFO -----");
    log::info!("standard bpm: {standard_bpm:.2}bpm");
    for (bpm, duration) in elapsed.bpm_durations() {
        log::info!("bpm duration: {bpm:.2}bpm, {duration:.3}s");
    }

    let begin_s = elapsed.at(span.begin);
    let end_s = elapsed.at(span.end);
    let total = end_s - begin_s;
    // Long charts are scaled down on the density-like values
    let time_coef = (total / 118.5).max(1.0);
    log::info!(
        "chart span: {} ~ {} ({begin_s:.3}s ~ {end_s:.3}s, {total:.3}s)",
        chart.timepoint_to_vox(span.begin),
        chart.timepoint_to_vox(span.end)
    );

    // Notes + peak
    let mut flags_at: BTreeMap<TimePoint, u32> = BTreeMap::new();
    let mut button_count = 0usize;
    for (lane, time, _) in notes.iter_buttons() {
        button_count += 1;
        *flags_at.entry(time).or_default() += u32::from(lane.peak_flag());
    }
    let weights: Vec<(f64, f64)> = flags_at
        .iter()
        .map(|(t, flags)| (elapsed.at(*t), peak_weight(*flags)))
        .collect();

    log::info!("----- NOTES INFO -----");
    log::info!("keypress count: {button_count}");
    let notes_value = button_count as f64 * 200.0 / 12.521 / total;

    let (peak_time, peak_sum) = peak_density(&weights);
    log::info!("----- PEAK INFO -----");
    log::info!("peak value at {peak_time:.3}s: {peak_sum:.2}");
    let peak_value = peak_sum / 0.24;

    // Tsumami
    let tsumami = tsumami_figures(chart, &elapsed);
    log::info!("----- TSUMAMI INFO -----");
    log::info!("moving laser time: {:.3}s", tsumami.moving);
    log::info!("static laser time: {:.3}s", tsumami.static_);
    log::info!("slam laser time: {:.3}s", tsumami.slam);
    let tsumami_value = ((tsumami.moving + tsumami.slam) / total * 191.0
        + tsumami.static_ / total * 29.0)
        * 0.956;

    // One-hand + hand-trip
    let hands = hand_figures(chart, &tsumami.ranges);
    let onehand_sum = hands.onehand_chip + hands.onehand_long;
    log::info!("----- ONE-HAND INFO -----");
    log::info!("button tap value: {:.3}", hands.onehand_chip);
    log::info!("button hold value: {:.3}", hands.onehand_long);
    let onehand_factor = clamp((onehand_sum / button_count as f64 - 0.16) / 0.34, 0.0, 1.0) + 2.0;
    let onehand_value = onehand_sum / 5.55 * onehand_factor / time_coef;
    log::info!("----- HAND-TRIP INFO -----");
    log::info!("button tap value: {:.3}", hands.handtrip_chip);
    log::info!("button hold value: {:.3}", hands.handtrip_long);
    let handtrip_value = (hands.handtrip_chip + hands.handtrip_long) / time_coef;

    // Tricky
    let mut tricky = TrickyFigures::default();
    for (_, start, vol) in notes.iter_vols() {
        if !vol.is_slam() || vol.spin_type == SpinType::NoSpin {
            continue;
        }
        let (increment, mut ticks) = spin_profile(vol.spin_type);
        let camera_value = if vol.spin_type == SpinType::HalfSpin {
            0.82
        } else {
            2.2
        };
        tricky.camera += increment;
        if vol.spin_duration != 0 {
            ticks = i64::from(vol.spin_duration) * 48;
        }
        let end = chart.add_ticks(start, ticks);
        tricky.notes += buttons_between(chart, start, end).len() as f64 * camera_value;
    }
    let spc = &chart.spcontroller_data;
    for track in [&spc.zoom_bottom, &spc.zoom_top] {
        camera_tricky(chart, &elapsed, track, &mut tricky);
    }
    tricky.camera += 0.002 * spc.tilt.len() as f64;
    tricky.jacks = jack_lengths(chart, &elapsed)
        .into_iter()
        .map(|run| f64::from(run).powf(1.85) / 2.6)
        .sum();

    let bpm_changes = chart.bpms.len().saturating_sub(1) as f64;
    tricky.bpm_change = 0.8 * bpm_changes + bpm_changes.powf(1.155) / time_coef;
    for &(bpm, duration) in elapsed.bpm_durations() {
        let mut ratio = standard_bpm / bpm;
        if ratio < 1.0 {
            ratio = 1.0 / ratio;
        } else if ratio == 1.0 {
            continue;
        }
        tricky.bpm_dev += 2.0 * ratio.powf(1.25) * duration.sqrt();
    }
    log::info!("----- TRICKY INFO -----");
    log::info!("bpm change tricky: {:.3}", tricky.bpm_change);
    log::info!("bpm deviation tricky: {:.3}", tricky.bpm_dev);
    log::info!("baseline camera tricky: {:.3}", tricky.camera);
    log::info!("note + lane change tricky: {:.3}", tricky.notes);
    log::info!("jacks tricky: {:.3}", tricky.jacks);
    let tricky_value = tricky.total() / time_coef;

    RadarValues {
        notes: radar_value(notes_value),
        peak: radar_value(peak_value),
        tsumami: radar_value(tsumami_value),
        onehand: radar_value(onehand_value),
        handtrip: radar_value(handtrip_value),
        tricky: radar_value(tricky_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{BtInfo, VolInfo};

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    #[test]
    fn test_empty_chart_is_zero() {
        let chart = ChartInfo::new();
        assert_eq!(compute_radar(&chart), RadarValues::default());
    }

    #[test]
    fn test_peak_weight_chords() {
        assert_eq!(peak_weight(0o20), 1.0);
        // BT-A + BT-B
        assert!((peak_weight(0o30) - (2.0 - 0.83)).abs() < 1e-9);
        // FX-L + BT-A + BT-B
        assert!((peak_weight(0o70) - (3.0 - 1.5)).abs() < 1e-9);
        // BT-B + BT-C
        assert!((peak_weight(0o14) - (2.0 - 0.83)).abs() < 1e-9);
        assert_eq!(peak_weight(0o77), 6.0 - 3.0);
    }

    #[test]
    fn test_peak_density_window() {
        let weights = [(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (2.5, 1.0)];
        let (_, best) = peak_density(&weights);
        assert_eq!(best, 3.0);
    }

    #[test]
    fn test_radar_values_are_clamped() {
        let mut chart = ChartInfo::new();
        // A wall of chords over two beats
        for i in 0..8 {
            for lane in 0..4 {
                chart.note_data.bt[lane].insert(tp(1, i, 16), BtInfo::chip());
            }
        }
        let radar = compute_radar(&chart);
        assert_eq!(radar.notes, 200);
        assert!(radar.peak <= 200);
        assert_eq!(radar.tsumami, 0);
    }

    #[test]
    fn test_jacks_detected() {
        let mut chart = ChartInfo::new();
        // 1/32 apart at 120 BPM is well inside the jack threshold
        for i in 0..4 {
            chart.note_data.bt[0].insert(tp(1, i, 32), BtInfo::chip());
        }
        let elapsed = ElapsedTime::new(&chart, tp(2, 0, 1));
        assert_eq!(jack_lengths(&chart, &elapsed), vec![4]);
    }

    #[test]
    fn test_moving_laser_counts_as_tsumami() {
        let mut chart = ChartInfo::new();
        let mut start = VolInfo::new(Rational::from_integer(0), Rational::from_integer(0)).unwrap();
        start.point_type = SegmentFlag::START;
        let mut end = VolInfo::new(Rational::from_integer(1), Rational::from_integer(1)).unwrap();
        end.point_type = SegmentFlag::END;
        chart.note_data.vol[0].insert(tp(1, 0, 1), start);
        chart.note_data.vol[0].insert(tp(2, 0, 1), end);
        let elapsed = ElapsedTime::new(&chart, tp(2, 0, 1));
        let figures = tsumami_figures(&chart, &elapsed);
        assert!((figures.moving - 2.0).abs() < 1e-9);
        assert_eq!(figures.ranges.len(), 1);
        assert!(compute_radar(&chart).tsumami > 0);
    }
}
