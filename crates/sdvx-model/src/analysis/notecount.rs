use serde::Serialize;

use crate::chart::ChartInfo;
use crate::enums::SegmentFlag;
use crate::time::{Rational, TimePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NoteCounts {
    pub chip: u32,
    pub long: u32,
    pub vol: u32,
}

/// Hold ticks the game actually awards: long holds forgive their last ticks.
pub fn lenient_hold_ticks(ticks: u32) -> u32 {
    let mut credited = ticks;
    if ticks > 5 {
        credited -= 1;
    }
    if ticks > 6 {
        credited -= 1;
    }
    credited
}

/// Move `time` up to the next tick boundary, if it is not on one.
fn align_to_tick(chart: &ChartInfo, time: TimePoint) -> (TimePoint, bool) {
    let rate = chart.tick_rate_at(time);
    let offset = chart.timepoint_to_fraction(time) % rate;
    if offset == Rational::from_integer(0) {
        (time, false)
    } else {
        (chart.add_duration(time, rate - offset), true)
    }
}

/// Tick points in `[start, end)`, starting from `start` which must be aligned.
fn tick_points(chart: &ChartInfo, start: TimePoint, end: TimePoint) -> Vec<TimePoint> {
    let mut ticks = Vec::new();
    let mut time = start;
    while time < end {
        ticks.push(time);
        time = chart.add_duration(time, chart.tick_rate_at(time));
    }
    ticks
}

fn hold_ticks(chart: &ChartInfo, start: TimePoint, duration: Rational) -> u32 {
    let end = chart.add_duration(start, duration);
    let (aligned, moved) = align_to_tick(chart, start);
    let ticks = u32::from(moved) + tick_points(chart, aligned, end).len() as u32;
    lenient_hold_ticks(ticks)
}

/// Ticks of one laser segment plus its slams.
///
/// A slam takes the place of the tick it lands on (or the nearer of two ticks
/// it falls between) so it is not credited twice.
fn laser_segment_ticks(
    chart: &ChartInfo,
    start: TimePoint,
    end: TimePoint,
    slams: &[TimePoint],
) -> u32 {
    let (aligned, _) = align_to_tick(chart, start);
    let ticks = tick_points(chart, aligned, end);
    let mut enabled = vec![true; ticks.len()];

    let mut index: Option<usize> = None;
    for &slam in slams {
        if ticks.is_empty() {
            break;
        }
        loop {
            let next = index.map_or(0, |i| i + 1);
            if next < ticks.len() && ticks[next] < slam {
                index = Some(next);
            } else {
                break;
            }
        }
        match index {
            None => enabled[0] = false,
            Some(i) if i == ticks.len() - 1 => {
                let next_tick = chart.add_duration(ticks[i], chart.tick_rate_at(ticks[i]));
                if slam < next_tick {
                    enabled[i] = false;
                }
            }
            Some(i) => {
                let halfway = chart.add_duration(ticks[i], chart.tick_rate_at(ticks[i]) / 2);
                if slam <= halfway {
                    enabled[i] = false;
                }
                if slam >= halfway {
                    enabled[i + 1] = false;
                }
            }
        }
    }

    let disabled: Vec<String> = ticks
        .iter()
        .zip(&enabled)
        .filter(|(_, on)| !**on)
        .map(|(t, _)| chart.timepoint_to_vox(*t))
        .collect();
    if !disabled.is_empty() {
        log::debug!("disabled laser ticks: {disabled:?}");
    }

    slams.len() as u32 + enabled.iter().filter(|on| **on).count() as u32
}

/// Count chip notes, hold ticks and laser ticks.
pub fn count_notes(chart: &ChartInfo) -> NoteCounts {
    let mut counts = NoteCounts::default();

    for (_, time, duration) in chart.note_data.iter_buttons() {
        if duration == Rational::from_integer(0) {
            counts.chip += 1;
        } else {
            counts.long += hold_ticks(chart, time, duration);
        }
    }

    for lane in &chart.note_data.vol {
        let mut laser_start = TimePoint::default();
        let mut slams: Vec<TimePoint> = Vec::new();
        for (&time, point) in lane {
            if point.point_type == SegmentFlag::POINT {
                counts.vol += 1;
            } else if point.point_type == SegmentFlag::START
                || point.point_type == SegmentFlag::END
            {
                if point.is_slam() {
                    slams.push(time);
                }
                if point.point_type == SegmentFlag::START {
                    laser_start = time;
                } else {
                    log::debug!(
                        "laser segment: {} => {}",
                        chart.timepoint_to_vox(laser_start),
                        chart.timepoint_to_vox(time)
                    );
                    counts.vol += laser_segment_ticks(chart, laser_start, time, &slams);
                    slams.clear();
                }
            } else if point.is_slam() {
                slams.push(time);
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{BtInfo, VolInfo};

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn vol(start: Rational, end: Rational, flag: SegmentFlag) -> VolInfo {
        let mut v = VolInfo::new(start, end).unwrap();
        v.point_type = flag;
        v
    }

    #[test]
    fn test_leniency() {
        assert_eq!(lenient_hold_ticks(1), 1);
        assert_eq!(lenient_hold_ticks(5), 5);
        assert_eq!(lenient_hold_ticks(6), 5);
        assert_eq!(lenient_hold_ticks(7), 5);
        assert_eq!(lenient_hold_ticks(10), 8);
    }

    #[test]
    fn test_chip_and_hold() {
        let mut chart = ChartInfo::new();
        chart.note_data.bt[0].insert(tp(1, 0, 1), BtInfo::chip());
        // Four ticks of 1/16
        chart.note_data.bt[1].insert(tp(1, 0, 1), BtInfo::new(r(1, 4)).unwrap());
        let counts = count_notes(&chart);
        assert_eq!(counts, NoteCounts { chip: 1, long: 4, vol: 0 });
    }

    #[test]
    fn test_unaligned_hold_gets_extra_tick() {
        let mut chart = ChartInfo::new();
        // Starts between ticks: one partial tick, then 1/16 and 2/16
        chart.note_data.bt[0].insert(tp(1, 1, 32), BtInfo::new(r(1, 8)).unwrap());
        assert_eq!(count_notes(&chart).long, 3);
    }

    #[test]
    fn test_fast_bpm_halves_tick_rate() {
        let mut chart = ChartInfo::new();
        chart.bpms.insert(TimePoint::default(), 300.0);
        chart.note_data.bt[0].insert(tp(1, 0, 1), BtInfo::new(r(1, 2)).unwrap());
        assert_eq!(count_notes(&chart).long, 4);
    }

    #[test]
    fn test_isolated_slam_counts_once() {
        let mut chart = ChartInfo::new();
        chart.note_data.vol[0].insert(tp(1, 0, 1), vol(r(0, 1), r(1, 1), SegmentFlag::POINT));
        assert_eq!(count_notes(&chart).vol, 1);
    }

    #[test]
    fn test_slam_replaces_first_tick() {
        let mut chart = ChartInfo::new();
        // Slam at the segment start, then a quarter note of laser
        chart.note_data.vol[0].insert(tp(1, 0, 1), vol(r(0, 1), r(1, 1), SegmentFlag::START));
        chart.note_data.vol[0].insert(tp(1, 1, 4), vol(r(1, 1), r(1, 1), SegmentFlag::END));
        // Four ticks, the first taken by the slam, plus the slam itself
        assert_eq!(count_notes(&chart).vol, 4);
    }
}
