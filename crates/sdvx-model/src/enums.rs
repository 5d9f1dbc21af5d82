use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// One of the eight note tracks of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lane {
    BtA,
    BtB,
    BtC,
    BtD,
    FxL,
    FxR,
    VolL,
    VolR,
}

impl Lane {
    pub const ALL: [Lane; 8] = [
        Lane::BtA,
        Lane::BtB,
        Lane::BtC,
        Lane::BtD,
        Lane::FxL,
        Lane::FxR,
        Lane::VolL,
        Lane::VolR,
    ];

    pub const BUTTONS: [Lane; 6] = [
        Lane::BtA,
        Lane::BtB,
        Lane::BtC,
        Lane::BtD,
        Lane::FxL,
        Lane::FxR,
    ];

    /// Lanes in VOX `#TRACKn` order.
    pub const TRACK_ORDER: [Lane; 8] = [
        Lane::VolL,
        Lane::FxL,
        Lane::BtA,
        Lane::BtB,
        Lane::BtC,
        Lane::BtD,
        Lane::FxR,
        Lane::VolR,
    ];

    /// VOX `#TRACKn` number.
    pub fn track_number(self) -> u32 {
        match self {
            Lane::VolL => 1,
            Lane::FxL => 2,
            Lane::BtA => 3,
            Lane::BtB => 4,
            Lane::BtC => 5,
            Lane::BtD => 6,
            Lane::FxR => 7,
            Lane::VolR => 8,
        }
    }

    pub fn from_track_number(n: u32) -> Option<Lane> {
        Lane::TRACK_ORDER.get(n.checked_sub(1)? as usize).copied()
    }

    /// Bit used by `//scriptBegin` lane masks, read left-to-right as VOL-L..VOL-R.
    pub fn script_bit(self) -> u8 {
        match self {
            Lane::VolR => 1,
            Lane::FxR => 2,
            Lane::BtD => 4,
            Lane::BtC => 8,
            Lane::BtB => 16,
            Lane::BtA => 32,
            Lane::FxL => 64,
            Lane::VolL => 128,
        }
    }

    /// Weight of a press in the peak radar, as a six bit pattern.
    pub fn peak_flag(self) -> u8 {
        match self {
            Lane::FxL => 0o40,
            Lane::BtA => 0o20,
            Lane::BtB => 0o10,
            Lane::BtC => 0o04,
            Lane::BtD => 0o02,
            Lane::FxR => 0o01,
            Lane::VolL | Lane::VolR => 0,
        }
    }

    pub fn is_bt(self) -> bool {
        matches!(self, Lane::BtA | Lane::BtB | Lane::BtC | Lane::BtD)
    }

    pub fn is_fx(self) -> bool {
        matches!(self, Lane::FxL | Lane::FxR)
    }

    pub fn is_vol(self) -> bool {
        matches!(self, Lane::VolL | Lane::VolR)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lane::BtA => "BT-A",
            Lane::BtB => "BT-B",
            Lane::BtC => "BT-C",
            Lane::BtD => "BT-D",
            Lane::FxL => "FX-L",
            Lane::FxR => "FX-R",
            Lane::VolL => "VOL-L",
            Lane::VolR => "VOL-R",
        };
        f.write_str(name)
    }
}

/// Position of a point inside a laser or automation segment.
///
/// `POINT` is `START | END`: a segment made of a single slam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SegmentFlag(u8);

impl SegmentFlag {
    pub const MIDDLE: SegmentFlag = SegmentFlag(0);
    pub const START: SegmentFlag = SegmentFlag(1);
    pub const END: SegmentFlag = SegmentFlag(2);
    pub const POINT: SegmentFlag = SegmentFlag(3);

    pub fn from_bits(bits: u8) -> Option<SegmentFlag> {
        (bits <= 3).then_some(SegmentFlag(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: SegmentFlag) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SegmentFlag {
    type Output = SegmentFlag;

    fn bitor(self, rhs: SegmentFlag) -> SegmentFlag {
        SegmentFlag(self.0 | rhs.0)
    }
}

impl BitOrAssign for SegmentFlag {
    fn bitor_assign(&mut self, rhs: SegmentFlag) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DifficultySlot {
    Novice,
    Advanced,
    Exhaust,
    Infinite,
    #[default]
    Maximum,
}

impl DifficultySlot {
    pub fn value(self) -> u8 {
        match self {
            DifficultySlot::Novice => 1,
            DifficultySlot::Advanced => 2,
            DifficultySlot::Exhaust => 3,
            DifficultySlot::Infinite => 4,
            DifficultySlot::Maximum => 5,
        }
    }

    /// Map a KSH `difficulty=` value.
    pub fn from_ksh(s: &str) -> DifficultySlot {
        match s {
            "light" => DifficultySlot::Novice,
            "challenge" => DifficultySlot::Advanced,
            "extended" => DifficultySlot::Exhaust,
            _ => DifficultySlot::Maximum,
        }
    }

    /// Shorthand used in file names, e.g. `3e`.
    pub fn shorthand(self) -> String {
        let initial = match self {
            DifficultySlot::Novice => 'n',
            DifficultySlot::Advanced => 'a',
            DifficultySlot::Exhaust => 'e',
            DifficultySlot::Infinite => 'i',
            DifficultySlot::Maximum => 'm',
        };
        format!("{}{initial}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpinType {
    #[default]
    NoSpin,
    SingleSpin,
    SingleSpin2,
    SingleSpin3,
    TripleSpin,
    HalfSpin,
}

impl SpinType {
    pub fn value(self) -> u8 {
        match self {
            SpinType::NoSpin => 0,
            SpinType::SingleSpin => 1,
            SpinType::SingleSpin2 => 2,
            SpinType::SingleSpin3 => 3,
            SpinType::TripleSpin => 4,
            SpinType::HalfSpin => 5,
        }
    }

    pub fn from_value(value: u8) -> Option<SpinType> {
        match value {
            0 => Some(SpinType::NoSpin),
            1 => Some(SpinType::SingleSpin),
            2 => Some(SpinType::SingleSpin2),
            3 => Some(SpinType::SingleSpin3),
            4 => Some(SpinType::TripleSpin),
            5 => Some(SpinType::HalfSpin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EasingType {
    #[default]
    NoEasing,
    Linear,
    EaseInSine,
    EaseOutSine,
}

impl EasingType {
    pub fn value(self) -> u8 {
        match self {
            EasingType::NoEasing => 0,
            EasingType::Linear => 2,
            EasingType::EaseInSine => 4,
            EasingType::EaseOutSine => 5,
        }
    }

    pub fn from_value(value: u8) -> Option<EasingType> {
        match value {
            0 => Some(EasingType::NoEasing),
            2 => Some(EasingType::Linear),
            4 => Some(EasingType::EaseInSine),
            5 => Some(EasingType::EaseOutSine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TiltType {
    #[default]
    Normal,
    Bigger,
    Keep,
}

impl TiltType {
    pub fn value(self) -> u8 {
        match self {
            TiltType::Normal => 0,
            TiltType::Bigger => 1,
            TiltType::Keep => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<TiltType> {
        match value {
            0 => Some(TiltType::Normal),
            1 => Some(TiltType::Bigger),
            2 => Some(TiltType::Keep),
            _ => None,
        }
    }
}

/// Laser filter slot referenced by VOL points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterIndex {
    #[default]
    Peak,
    LpfAlt,
    Lpf,
    HpfAlt,
    Hpf,
    Bitcrush,
    Custom,
}

impl FilterIndex {
    pub fn value(self) -> u8 {
        match self {
            FilterIndex::Peak => 0,
            FilterIndex::LpfAlt => 1,
            FilterIndex::Lpf => 2,
            FilterIndex::HpfAlt => 3,
            FilterIndex::Hpf => 4,
            FilterIndex::Bitcrush => 5,
            FilterIndex::Custom => 6,
        }
    }

    pub fn from_value(value: u8) -> Option<FilterIndex> {
        match value {
            0 => Some(FilterIndex::Peak),
            1 => Some(FilterIndex::LpfAlt),
            2 => Some(FilterIndex::Lpf),
            3 => Some(FilterIndex::HpfAlt),
            4 => Some(FilterIndex::Hpf),
            5 => Some(FilterIndex::Bitcrush),
            6 => Some(FilterIndex::Custom),
            _ => None,
        }
    }
}
