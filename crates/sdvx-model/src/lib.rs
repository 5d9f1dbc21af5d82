// SDVX chart model: KSH reader, VOX writer and reader, chart analysis

pub mod analysis;
mod chart;
pub mod config;
mod diagnostics;
mod easing;
pub mod effect;
mod enums;
mod error;
pub mod filter;
mod ksh_decode;
mod note;
pub mod time;
mod units;
mod vox_decode;
mod vox_encode;

pub use analysis::{ElapsedTime, NoteCounts, RadarValues};
pub use chart::{ChartInfo, HALF_TICK_BPM_THRESHOLD, SongChart, SongInfo};
pub use config::ConvertConfig;
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use effect::{Effect, EffectEntry, FxType};
pub use enums::{DifficultySlot, EasingType, FilterIndex, Lane, SegmentFlag, SpinType, TiltType};
pub use error::ChartError;
pub use filter::{AutoTabEntry, AutoTabSetting, Filter};
pub use ksh_decode::{KshDecoder, convert_laser_pos};
pub use note::{
    AutoTabInfo, BtInfo, FxInfo, NoteData, SpControllerData, SpControllerInfo, VolInfo,
};
pub use time::{Rational, TimePoint, TimeSignature};
pub use vox_decode::VoxDecoder;
pub use vox_encode::VoxEncoder;
