use std::collections::BTreeMap;

use serde::Serialize;

use crate::enums::{EasingType, FilterIndex, Lane, SegmentFlag, SpinType};
use crate::error::ChartError;
use crate::time::{Rational, TimePoint, duration_to_ticks};

fn check_duration(duration: Rational) -> Result<Rational, ChartError> {
    if duration < Rational::from_integer(0) {
        return Err(ChartError::NegativeDuration(duration));
    }
    Ok(duration)
}

fn check_position(position: Rational) -> Result<Rational, ChartError> {
    if position < Rational::from_integer(0) || position > Rational::from_integer(1) {
        return Err(ChartError::LaserOutOfRange(position));
    }
    Ok(position)
}

/// A BT note. Zero duration is a chip, anything else a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BtInfo {
    duration: Rational,
}

impl BtInfo {
    pub fn new(duration: Rational) -> Result<Self, ChartError> {
        Ok(Self {
            duration: check_duration(duration)?,
        })
    }

    pub fn chip() -> Self {
        Self {
            duration: Rational::from_integer(0),
        }
    }

    pub fn duration(&self) -> Rational {
        self.duration
    }

    pub fn duration_as_ticks(&self) -> i64 {
        duration_to_ticks(self.duration)
    }
}

/// An FX note.
///
/// `special` is the sound effect index for chips and the effect slot for holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FxInfo {
    duration: Rational,
    pub special: u32,
}

impl FxInfo {
    pub fn new(duration: Rational, special: u32) -> Result<Self, ChartError> {
        Ok(Self {
            duration: check_duration(duration)?,
            special,
        })
    }

    pub fn duration(&self) -> Rational {
        self.duration
    }

    pub fn duration_as_ticks(&self) -> i64 {
        duration_to_ticks(self.duration)
    }
}

/// A point on a laser path. `start != end` makes it a slam.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolInfo {
    start: Rational,
    end: Rational,
    pub spin_type: SpinType,
    /// In quarter notes
    pub spin_duration: u32,
    pub ease_type: EasingType,
    pub filter_index: FilterIndex,
    pub point_type: SegmentFlag,
    pub wide_laser: bool,
    /// Synthetic point rendering a curve
    pub interpolated: bool,
}

impl VolInfo {
    pub fn new(start: Rational, end: Rational) -> Result<Self, ChartError> {
        Ok(Self {
            start: check_position(start)?,
            end: check_position(end)?,
            spin_type: SpinType::NoSpin,
            spin_duration: 0,
            ease_type: EasingType::NoEasing,
            filter_index: FilterIndex::Peak,
            point_type: SegmentFlag::START,
            wide_laser: false,
            interpolated: false,
        })
    }

    pub fn start(&self) -> Rational {
        self.start
    }

    pub fn end(&self) -> Rational {
        self.end
    }

    pub fn set_start(&mut self, start: Rational) -> Result<(), ChartError> {
        self.start = check_position(start)?;
        Ok(())
    }

    pub fn set_end(&mut self, end: Rational) -> Result<(), ChartError> {
        self.end = check_position(end)?;
        Ok(())
    }

    pub fn is_slam(&self) -> bool {
        self.start != self.end
    }
}

/// Every note of a chart, one ordered map per lane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteData {
    pub bt: [BTreeMap<TimePoint, BtInfo>; 4],
    pub fx: [BTreeMap<TimePoint, FxInfo>; 2],
    pub vol: [BTreeMap<TimePoint, VolInfo>; 2],
}

impl NoteData {
    pub const BT_LANES: [Lane; 4] = [Lane::BtA, Lane::BtB, Lane::BtC, Lane::BtD];
    pub const FX_LANES: [Lane; 2] = [Lane::FxL, Lane::FxR];
    pub const VOL_LANES: [Lane; 2] = [Lane::VolL, Lane::VolR];

    /// BT then FX notes, lane by lane, each lane in time order.
    pub fn iter_buttons(&self) -> impl Iterator<Item = (Lane, TimePoint, Rational)> + '_ {
        let bts = self.bt.iter().enumerate().flat_map(|(i, lane)| {
            let kind = Self::BT_LANES[i];
            lane.iter().map(move |(t, n)| (kind, *t, n.duration()))
        });
        let fxs = self.fx.iter().enumerate().flat_map(|(i, lane)| {
            let kind = Self::FX_LANES[i];
            lane.iter().map(move |(t, n)| (kind, *t, n.duration()))
        });
        bts.chain(fxs)
    }

    /// Laser points, left lane first.
    pub fn iter_vols(&self) -> impl Iterator<Item = (Lane, TimePoint, &VolInfo)> + '_ {
        self.vol.iter().enumerate().flat_map(|(i, lane)| {
            let kind = Self::VOL_LANES[i];
            lane.iter().map(move |(t, v)| (kind, *t, v))
        })
    }

    pub fn vol_lane(&self, lane: Lane) -> Option<&BTreeMap<TimePoint, VolInfo>> {
        match lane {
            Lane::VolL => Some(&self.vol[0]),
            Lane::VolR => Some(&self.vol[1]),
            _ => None,
        }
    }

    /// Times of every note on a button lane; empty for lasers.
    pub fn button_times(&self, lane: Lane) -> Vec<TimePoint> {
        match lane {
            Lane::BtA => self.bt[0].keys().copied().collect(),
            Lane::BtB => self.bt[1].keys().copied().collect(),
            Lane::BtC => self.bt[2].keys().copied().collect(),
            Lane::BtD => self.bt[3].keys().copied().collect(),
            Lane::FxL => self.fx[0].keys().copied().collect(),
            Lane::FxR => self.fx[1].keys().copied().collect(),
            Lane::VolL | Lane::VolR => Vec::new(),
        }
    }

    pub fn button_count(&self) -> usize {
        self.bt.iter().map(BTreeMap::len).sum::<usize>()
            + self.fx.iter().map(BTreeMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.button_count() == 0 && self.vol.iter().all(BTreeMap::is_empty)
    }
}

/// A value of an SP controller automation track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpControllerInfo {
    pub start: f64,
    pub end: f64,
    pub point_type: SegmentFlag,
}

impl SpControllerInfo {
    pub fn new(start: f64, end: f64, point_type: SegmentFlag) -> Self {
        Self {
            start,
            end,
            point_type,
        }
    }

    /// Instantaneous change at this point.
    pub fn is_snap(&self) -> bool {
        self.start != self.end
    }
}

/// Camera, tilt and lane split automation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpControllerData {
    pub zoom_top: BTreeMap<TimePoint, SpControllerInfo>,
    pub zoom_bottom: BTreeMap<TimePoint, SpControllerInfo>,
    pub tilt: BTreeMap<TimePoint, SpControllerInfo>,
    pub lane_split: BTreeMap<TimePoint, SpControllerInfo>,
    pub hidden_bars: BTreeMap<TimePoint, bool>,
    pub manual_bars: Vec<TimePoint>,
}

/// Laser effect activation: effect slot `which` for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoTabInfo {
    pub which: u32,
    pub duration: Rational,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_negative_durations_rejected() {
        assert_eq!(
            BtInfo::new(r(-1, 4)),
            Err(ChartError::NegativeDuration(r(-1, 4)))
        );
        assert!(FxInfo::new(r(-1, 8), 0).is_err());
        assert_eq!(BtInfo::new(r(1, 4)).unwrap().duration_as_ticks(), 48);
    }

    #[test]
    fn test_laser_range_enforced() {
        assert!(VolInfo::new(r(3, 2), r(0, 1)).is_err());
        let mut vol = VolInfo::new(r(0, 1), r(1, 1)).unwrap();
        assert!(vol.is_slam());
        assert!(vol.set_end(r(-1, 10)).is_err());
        assert_eq!(vol.end(), r(1, 1));
        vol.set_end(r(0, 1)).unwrap();
        assert!(!vol.is_slam());
    }

    #[test]
    fn test_iter_buttons_lane_order() {
        let mut notes = NoteData::default();
        let t1 = TimePoint::new(1, 1, 4).unwrap();
        let t0 = TimePoint::new(1, 0, 1).unwrap();
        notes.fx[1].insert(t0, FxInfo::new(r(0, 1), 0).unwrap());
        notes.bt[2].insert(t1, BtInfo::chip());
        notes.bt[2].insert(t0, BtInfo::chip());
        let got: Vec<(Lane, TimePoint)> = notes.iter_buttons().map(|(l, t, _)| (l, t)).collect();
        assert_eq!(got, vec![(Lane::BtC, t0), (Lane::BtC, t1), (Lane::FxR, t0)]);
        assert_eq!(notes.button_count(), 3);
        assert_eq!(notes.button_times(Lane::BtC), vec![t0, t1]);
    }

    #[test]
    fn test_snap_detection() {
        assert!(SpControllerInfo::new(0.0, 1.0, SegmentFlag::MIDDLE).is_snap());
        assert!(!SpControllerInfo::new(0.5, 0.5, SegmentFlag::START).is_snap());
    }
}
