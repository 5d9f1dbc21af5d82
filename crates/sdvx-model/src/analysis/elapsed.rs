use std::collections::BTreeMap;

use crate::chart::ChartInfo;
use crate::time::{Rational, TimePoint, rational_to_f64};

fn seconds(bpm: f64, distance: Rational) -> f64 {
    // One whole note is four beats
    240.0 / bpm * rational_to_f64(distance)
}

/// Wall-clock time of chart points, anchored at every BPM change.
#[derive(Debug, Clone)]
pub struct ElapsedTime<'a> {
    chart: &'a ChartInfo,
    anchors: BTreeMap<TimePoint, f64>,
    /// Total seconds spent at each BPM, in first-seen order
    bpm_durations: Vec<(f64, f64)>,
}

impl<'a> ElapsedTime<'a> {
    /// Build the anchors from the chart's BPM keys up to `endpoint`.
    pub fn new(chart: &'a ChartInfo, endpoint: TimePoint) -> Self {
        let mut anchors = BTreeMap::new();
        let mut bpm_durations: Vec<(f64, f64)> = Vec::new();
        let keys: Vec<TimePoint> = chart
            .bpms
            .keys()
            .copied()
            .chain(std::iter::once(endpoint))
            .collect();

        let mut running_total = 0.0;
        for pair in keys.windows(2) {
            let (ti, tf) = (pair[0], pair[1]);
            if anchors.is_empty() {
                anchors.insert(ti, 0.0);
            }
            let bpm = chart.bpm_at(ti);
            let duration = seconds(bpm, chart.distance(ti, tf));
            match bpm_durations.iter_mut().find(|(b, _)| *b == bpm) {
                Some(entry) => entry.1 += duration,
                None => bpm_durations.push((bpm, duration)),
            }
            running_total += duration;
            anchors.insert(tf, running_total);
        }

        Self {
            chart,
            anchors,
            bpm_durations,
        }
    }

    /// Seconds from the first BPM key to `time`.
    pub fn at(&self, time: TimePoint) -> f64 {
        if let Some(seconds) = self.anchors.get(&time) {
            return *seconds;
        }
        let (anchor, base) = self
            .anchors
            .range(..=time)
            .next_back()
            .map(|(t, s)| (*t, *s))
            .unwrap_or((TimePoint::default(), 0.0));
        base + seconds(self.chart.bpm_at(anchor), self.chart.distance(time, anchor))
    }

    pub fn bpm_durations(&self) -> &[(f64, f64)] {
        &self.bpm_durations
    }

    /// The BPM played the longest; ties go to the faster one.
    pub fn standard_bpm(&self) -> f64 {
        self.bpm_durations
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)))
            .map(|(bpm, _)| *bpm)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(measure: u32, count: i64, subdivision: i64) -> TimePoint {
        TimePoint::new(measure, count, subdivision).unwrap()
    }

    #[test]
    fn test_constant_bpm() {
        let chart = ChartInfo::new();
        let elapsed = ElapsedTime::new(&chart, tp(3, 0, 1));
        // 120 BPM: two seconds per 4/4 measure
        assert!((elapsed.at(tp(3, 0, 1)) - 4.0).abs() < 1e-9);
        assert!((elapsed.at(tp(2, 1, 2)) - 3.0).abs() < 1e-9);
        assert_eq!(elapsed.standard_bpm(), 120.0);
    }

    #[test]
    fn test_bpm_change() {
        let mut chart = ChartInfo::new();
        chart.bpms.insert(tp(2, 0, 1), 240.0);
        let elapsed = ElapsedTime::new(&chart, tp(5, 0, 1));
        assert!((elapsed.at(tp(2, 0, 1)) - 2.0).abs() < 1e-9);
        assert!((elapsed.at(tp(3, 0, 1)) - 3.0).abs() < 1e-9);
        // Three measures at 240 outlast one at 120
        assert_eq!(elapsed.standard_bpm(), 240.0);
        assert_eq!(elapsed.bpm_durations().len(), 2);
    }
}
