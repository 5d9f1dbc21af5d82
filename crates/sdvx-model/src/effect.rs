// Audio effect catalog: parameter sets, KSH definitions and VOX rendering

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChartError;
use crate::units::{parse_decibel, parse_frequency, parse_length, parse_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FxType {
    NoEffect,
    Retrigger,
    Gate,
    Flanger,
    Tapestop,
    Sidechain,
    Wobble,
    Bitcrush,
    RetriggerEx,
    PitchShift,
    Tapescratch,
    LowPassFilter,
    HighPassFilter,
}

impl FxType {
    pub fn value(self) -> u8 {
        match self {
            FxType::NoEffect => 0,
            FxType::Retrigger => 1,
            FxType::Gate => 2,
            FxType::Flanger => 3,
            FxType::Tapestop => 4,
            FxType::Sidechain => 5,
            FxType::Wobble => 6,
            FxType::Bitcrush => 7,
            FxType::RetriggerEx => 8,
            FxType::PitchShift => 9,
            FxType::Tapescratch => 10,
            FxType::LowPassFilter => 11,
            FxType::HighPassFilter => 12,
        }
    }

    pub fn from_value(value: u8) -> Option<FxType> {
        match value {
            0 => Some(FxType::NoEffect),
            1 => Some(FxType::Retrigger),
            2 => Some(FxType::Gate),
            3 => Some(FxType::Flanger),
            4 => Some(FxType::Tapestop),
            5 => Some(FxType::Sidechain),
            6 => Some(FxType::Wobble),
            7 => Some(FxType::Bitcrush),
            8 => Some(FxType::RetriggerEx),
            9 => Some(FxType::PitchShift),
            10 => Some(FxType::Tapescratch),
            11 => Some(FxType::LowPassFilter),
            12 => Some(FxType::HighPassFilter),
            _ => None,
        }
    }
}

impl fmt::Display for FxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PassFilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
}

impl PassFilterType {
    pub fn value(self) -> u8 {
        match self {
            PassFilterType::LowPass => 0,
            PassFilterType::HighPass => 1,
            PassFilterType::BandPass => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<PassFilterType> {
        match value {
            0 => Some(PassFilterType::LowPass),
            1 => Some(PassFilterType::HighPass),
            2 => Some(PassFilterType::BandPass),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WaveShape {
    Saw,
    Square,
    Linear,
    #[default]
    Sine,
}

impl WaveShape {
    pub fn value(self) -> u8 {
        match self {
            WaveShape::Saw => 0,
            WaveShape::Square => 1,
            WaveShape::Linear => 2,
            WaveShape::Sine => 3,
        }
    }

    pub fn from_value(value: u8) -> Option<WaveShape> {
        match value {
            0 => Some(WaveShape::Saw),
            1 => Some(WaveShape::Square),
            2 => Some(WaveShape::Linear),
            3 => Some(WaveShape::Sine),
            _ => None,
        }
    }
}

/// Shared by `Retrigger` and `RetriggerEx`; only the defaults differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetriggerParams {
    pub mix: f64,
    pub wavelength: i64,
    pub update_period: f64,
    pub feedback: f64,
    pub amount: f64,
    pub decay: f64,
}

impl Default for RetriggerParams {
    fn default() -> Self {
        Self {
            mix: 95.0,
            wavelength: 4,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.85,
            decay: 0.15,
        }
    }
}

impl RetriggerParams {
    pub fn ex_default() -> Self {
        Self {
            wavelength: 8,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateParams {
    pub mix: f64,
    pub wavelength: i64,
    pub length: f64,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            mix: 98.0,
            wavelength: 16,
            length: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlangerParams {
    pub mix: f64,
    pub period: f64,
    pub feedback: f64,
    pub stereo_width: i64,
    pub hicut_gain: f64,
}

impl Default for FlangerParams {
    fn default() -> Self {
        Self {
            mix: 75.0,
            period: 2.0,
            feedback: 0.5,
            stereo_width: 90,
            hicut_gain: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapestopParams {
    pub mix: f64,
    pub speed: f64,
    pub rate: f64,
}

impl Default for TapestopParams {
    fn default() -> Self {
        Self {
            mix: 100.0,
            speed: 8.0,
            rate: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidechainParams {
    pub mix: f64,
    pub frequency: f64,
    pub attack: i64,
    pub hold: i64,
    pub release: i64,
}

impl Default for SidechainParams {
    fn default() -> Self {
        Self {
            mix: 90.0,
            frequency: 1.0,
            attack: 45,
            hold: 50,
            release: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WobbleParams {
    pub mix: f64,
    pub filter_type: PassFilterType,
    pub wave_shape: WaveShape,
    pub low_cutoff: f64,
    pub hi_cutoff: f64,
    pub frequency: f64,
    pub bandwidth: f64,
}

impl Default for WobbleParams {
    fn default() -> Self {
        Self {
            mix: 80.0,
            filter_type: PassFilterType::LowPass,
            wave_shape: WaveShape::Sine,
            low_cutoff: 500.0,
            hi_cutoff: 18000.0,
            frequency: 4.0,
            bandwidth: 1.4,
        }
    }
}

/// Used by `Bitcrush` and `PitchShift`, both a mix plus an integer amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountParams {
    pub mix: f64,
    pub amount: i64,
}

impl Default for AmountParams {
    fn default() -> Self {
        Self {
            mix: 100.0,
            amount: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapescratchParams {
    pub mix: f64,
    pub curve_slope: f64,
    pub attack: f64,
    pub hold: f64,
    pub release: f64,
}

impl Default for TapescratchParams {
    fn default() -> Self {
        Self {
            mix: 100.0,
            curve_slope: 5.0,
            attack: 1.0,
            hold: 0.1,
            release: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowPassParams {
    pub mix: f64,
    pub low_cutoff: f64,
    pub hi_cutoff: f64,
    pub bandwidth: f64,
}

impl Default for LowPassParams {
    fn default() -> Self {
        Self {
            mix: 75.0,
            low_cutoff: 400.0,
            hi_cutoff: 900.0,
            bandwidth: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighPassParams {
    pub mix: f64,
    pub cutoff: f64,
    pub curve_slope: f64,
    pub bandwidth: f64,
}

impl Default for HighPassParams {
    fn default() -> Self {
        Self {
            mix: 100.0,
            cutoff: 2000.0,
            curve_slope: 5.0,
            bandwidth: 1.4,
        }
    }
}

/// An audio effect with its parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    NoEffect,
    Retrigger(RetriggerParams),
    Gate(GateParams),
    Flanger(FlangerParams),
    Tapestop(TapestopParams),
    Sidechain(SidechainParams),
    Wobble(WobbleParams),
    Bitcrush(AmountParams),
    RetriggerEx(RetriggerParams),
    PitchShift(AmountParams),
    Tapescratch(TapescratchParams),
    LowPassFilter(LowPassParams),
    HighPassFilter(HighPassParams),
}

fn f2(value: f64) -> String {
    format!("{value:.2}")
}

fn get<'a>(def: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    def.get(key).map(String::as_str)
}

fn require_params(fx_type: FxType, params: &[i64], needed: usize) -> Result<(), ChartError> {
    if params.len() < needed {
        return Err(ChartError::InvalidParameter(format!(
            "{fx_type} requires {needed} parameter(s) (got {})",
            params.len()
        )));
    }
    Ok(())
}

impl Effect {
    /// Default parameter set for an effect type.
    pub fn with_defaults(fx_type: FxType) -> Effect {
        match fx_type {
            FxType::NoEffect => Effect::NoEffect,
            FxType::Retrigger => Effect::Retrigger(RetriggerParams::default()),
            FxType::Gate => Effect::Gate(GateParams::default()),
            FxType::Flanger => Effect::Flanger(FlangerParams::default()),
            FxType::Tapestop => Effect::Tapestop(TapestopParams::default()),
            FxType::Sidechain => Effect::Sidechain(SidechainParams::default()),
            FxType::Wobble => Effect::Wobble(WobbleParams::default()),
            FxType::Bitcrush => Effect::Bitcrush(AmountParams::default()),
            FxType::RetriggerEx => Effect::RetriggerEx(RetriggerParams::ex_default()),
            FxType::PitchShift => Effect::PitchShift(AmountParams::default()),
            FxType::Tapescratch => Effect::Tapescratch(TapescratchParams::default()),
            FxType::LowPassFilter => Effect::LowPassFilter(LowPassParams::default()),
            FxType::HighPassFilter => Effect::HighPassFilter(HighPassParams::default()),
        }
    }

    pub fn fx_type(&self) -> FxType {
        match self {
            Effect::NoEffect => FxType::NoEffect,
            Effect::Retrigger(_) => FxType::Retrigger,
            Effect::Gate(_) => FxType::Gate,
            Effect::Flanger(_) => FxType::Flanger,
            Effect::Tapestop(_) => FxType::Tapestop,
            Effect::Sidechain(_) => FxType::Sidechain,
            Effect::Wobble(_) => FxType::Wobble,
            Effect::Bitcrush(_) => FxType::Bitcrush,
            Effect::RetriggerEx(_) => FxType::RetriggerEx,
            Effect::PitchShift(_) => FxType::PitchShift,
            Effect::Tapescratch(_) => FxType::Tapescratch,
            Effect::LowPassFilter(_) => FxType::LowPassFilter,
            Effect::HighPassFilter(_) => FxType::HighPassFilter,
        }
    }

    /// Build an effect from a `#define_fx` parameter map.
    ///
    /// Unknown types return `ChartError::UnknownEffectType`; callers fall back to `NoEffect`.
    pub fn from_definition(def: &HashMap<String, String>) -> Result<Effect, ChartError> {
        let Some(kind) = get(def, "type") else {
            return Err(ChartError::InvalidParameter(
                "effect definition has no type".to_string(),
            ));
        };
        match kind {
            "Retrigger" | "Echo" => {
                let ex = match get(def, "updatePeriod") {
                    Some(period) => parse_length(period)? == 0.0,
                    None => false,
                };
                if ex {
                    Self::retrigger_ex_from(def)
                } else {
                    Self::retrigger_from(def)
                }
            }
            "Gate" => {
                let mut p = GateParams::default();
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                if let Some(v) = get(def, "waveLength") {
                    p.wavelength = (p.length / 2.0 / parse_length(v)?) as i64;
                }
                Ok(Effect::Gate(p))
            }
            "Flanger" => Self::flanger_from(def, FlangerParams::default()),
            "Phaser" => Self::flanger_from(
                def,
                FlangerParams {
                    mix: 50.0,
                    period: 2.0,
                    feedback: 0.35,
                    ..FlangerParams::default()
                },
            ),
            "PitchShift" => {
                let mut p = AmountParams::default();
                if let Some(v) = get(def, "pitch") {
                    p.amount = parse_length(v)? as i64;
                }
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                Ok(Effect::PitchShift(p))
            }
            "BitCrusher" => {
                let mut p = AmountParams::default();
                if let Some(samples) =
                    get(def, "reduction").and_then(|v| v.strip_suffix("samples"))
                {
                    p.amount = samples.trim().parse().map_err(|_| {
                        ChartError::InvalidParameter(format!("invalid reduction (got {samples})"))
                    })?;
                }
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                Ok(Effect::Bitcrush(p))
            }
            "Wobble" => {
                let mut p = WobbleParams::default();
                if let Some(v) = get(def, "waveLength") {
                    p.frequency = 0.25 / parse_length(v)?;
                }
                if let Some(v) = get(def, "loFreq") {
                    p.low_cutoff = parse_frequency(v)?;
                }
                if let Some(v) = get(def, "hiFreq") {
                    p.hi_cutoff = parse_frequency(v)?;
                }
                if let Some(v) = get(def, "Q") {
                    p.bandwidth = parse_length(v)?;
                }
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                Ok(Effect::Wobble(p))
            }
            "TapeStop" => {
                let mut p = TapestopParams::default();
                if let Some(v) = get(def, "speed") {
                    p.speed = parse_length(v)? * 0.16;
                }
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                Ok(Effect::Tapestop(p))
            }
            "SideChain" => {
                let mut p = SidechainParams::default();
                if let Some(v) = get(def, "period") {
                    p.frequency = 0.25 / parse_length(v)?;
                }
                if let Some(v) = get(def, "attackTime") {
                    p.attack = parse_time(v)? as i64;
                }
                if let Some(v) = get(def, "holdTime") {
                    p.hold = parse_time(v)? as i64;
                }
                if let Some(v) = get(def, "releaseTime") {
                    p.release = parse_time(v)? as i64;
                }
                if let Some(v) = get(def, "mix") {
                    p.mix = parse_length(v)? * 100.0;
                }
                Ok(Effect::Sidechain(p))
            }
            other => Err(ChartError::UnknownEffectType(other.to_string())),
        }
    }

    fn retrigger_from(def: &HashMap<String, String>) -> Result<Effect, ChartError> {
        let mut p = RetriggerParams::default();
        if let Some(v) = get(def, "updatePeriod") {
            p.update_period = parse_length(v)? * 4.0;
        }
        if let Some(v) = get(def, "waveLength") {
            p.wavelength = (p.update_period / 4.0 / parse_length(v)?) as i64;
        }
        if let Some(v) = get(def, "rate") {
            p.amount = parse_length(v)?;
        }
        if let Some(v) = get(def, "mix") {
            p.mix = parse_length(v)? * 100.0;
        }
        Ok(Effect::Retrigger(p))
    }

    fn retrigger_ex_from(def: &HashMap<String, String>) -> Result<Effect, ChartError> {
        let mut p = RetriggerParams {
            update_period: 4.0,
            ..RetriggerParams::ex_default()
        };
        if let Some(v) = get(def, "waveLength") {
            p.wavelength = (1.0 / parse_length(v)?) as i64;
        }
        if let Some(v) = get(def, "feedbackLevel") {
            p.feedback = parse_length(v)?;
        }
        if let Some(v) = get(def, "rate") {
            p.amount = parse_length(v)?;
        }
        if let Some(v) = get(def, "mix") {
            p.mix = parse_length(v)? * 100.0;
        }
        Ok(Effect::RetriggerEx(p))
    }

    fn flanger_from(
        def: &HashMap<String, String>,
        mut p: FlangerParams,
    ) -> Result<Effect, ChartError> {
        if let Some(v) = get(def, "period") {
            p.period = parse_length(v)? * 4.0;
        }
        if let Some(v) = get(def, "feedback") {
            p.feedback = parse_length(v)?;
        }
        if let Some(v) = get(def, "stereoWidth") {
            p.stereo_width = (parse_length(v)? * 100.0) as i64;
        }
        if let Some(v) = get(def, "hiCutGain") {
            p.hicut_gain = parse_decibel(v)?;
        }
        if let Some(v) = get(def, "mix") {
            p.mix = parse_length(v)? * 100.0;
        }
        Ok(Effect::Flanger(p))
    }

    /// Apply the integer parameters of a `Name;p1;p2` FX lane effect.
    ///
    /// Effects without mappable parameters ignore them.
    pub fn map_params(&mut self, params: &[i64]) -> Result<(), ChartError> {
        let fx_type = self.fx_type();
        match self {
            Effect::Retrigger(p) => {
                require_params(fx_type, params, 1)?;
                p.wavelength = (params[0] as f64 * p.update_period / 4.0) as i64;
            }
            Effect::RetriggerEx(p) => {
                require_params(fx_type, params, 1)?;
                if let Some(feedback) = params.get(1) {
                    p.feedback = *feedback as f64 / 100.0;
                }
                p.wavelength = (params[0] as f64 * p.update_period / 4.0) as i64;
            }
            Effect::Gate(p) => {
                require_params(fx_type, params, 1)?;
                p.wavelength = (params[0] as f64 * p.length / 2.0) as i64;
            }
            Effect::Tapestop(p) => {
                require_params(fx_type, params, 1)?;
                p.speed = params[0] as f64 * 0.16;
            }
            Effect::Wobble(p) => {
                require_params(fx_type, params, 1)?;
                p.frequency = params[0] as f64 / 4.0;
            }
            Effect::Bitcrush(p) => {
                require_params(fx_type, params, 1)?;
                p.amount = params[0];
            }
            Effect::PitchShift(p) => {
                require_params(fx_type, params, 1)?;
                p.amount = params[0];
            }
            Effect::NoEffect
            | Effect::Flanger(_)
            | Effect::Sidechain(_)
            | Effect::Tapescratch(_)
            | Effect::LowPassFilter(_)
            | Effect::HighPassFilter(_) => {}
        }
        Ok(())
    }

    /// One `#FXBUTTON EFFECT INFO` line, fields separated by `,\t`.
    pub fn to_vox_string(&self) -> String {
        let id = self.fx_type().value().to_string();
        let fields: Vec<String> = match self {
            Effect::NoEffect => {
                let mut fields = vec![id];
                fields.extend(std::iter::repeat_n("0".to_string(), 6));
                fields
            }
            Effect::Retrigger(p) | Effect::RetriggerEx(p) => vec![
                id,
                p.wavelength.to_string(),
                f2(p.mix),
                f2(p.update_period),
                f2(p.feedback),
                f2(p.amount),
                f2(p.decay),
            ],
            Effect::Gate(p) => vec![id, f2(p.mix), p.wavelength.to_string(), f2(p.length)],
            Effect::Flanger(p) => vec![
                id,
                f2(p.mix),
                f2(p.period),
                f2(p.feedback),
                p.stereo_width.to_string(),
                f2(p.hicut_gain),
            ],
            Effect::Tapestop(p) => vec![id, f2(p.mix), f2(p.speed), f2(p.rate)],
            Effect::Sidechain(p) => vec![
                id,
                f2(p.mix),
                f2(p.frequency),
                p.attack.to_string(),
                p.hold.to_string(),
                p.release.to_string(),
            ],
            Effect::Wobble(p) => vec![
                id,
                p.filter_type.value().to_string(),
                p.wave_shape.value().to_string(),
                f2(p.mix),
                f2(p.low_cutoff),
                f2(p.hi_cutoff),
                f2(p.frequency),
                f2(p.bandwidth),
            ],
            Effect::Bitcrush(p) | Effect::PitchShift(p) => {
                vec![id, f2(p.mix), p.amount.to_string()]
            }
            Effect::Tapescratch(p) => vec![
                id,
                f2(p.mix),
                f2(p.curve_slope),
                f2(p.attack),
                f2(p.hold),
                f2(p.release),
            ],
            Effect::LowPassFilter(p) => vec![
                id,
                f2(p.mix),
                f2(p.low_cutoff),
                f2(p.hi_cutoff),
                f2(p.bandwidth),
            ],
            Effect::HighPassFilter(p) => vec![
                id,
                f2(p.mix),
                f2(p.cutoff),
                f2(p.curve_slope),
                f2(p.bandwidth),
            ],
        };
        fields.join(",\t")
    }

    /// Parse the comma-separated fields of a VOX effect line.
    pub fn from_vox_fields(fields: &[&str]) -> Result<Effect, ChartError> {
        let mut reader = FieldReader::new(fields);
        let id = reader.int()?;
        let fx_type = u8::try_from(id)
            .ok()
            .and_then(FxType::from_value)
            .ok_or_else(|| ChartError::UnknownEffectType(id.to_string()))?;
        let effect = match fx_type {
            FxType::NoEffect => Effect::NoEffect,
            FxType::Retrigger | FxType::RetriggerEx => {
                let p = RetriggerParams {
                    wavelength: reader.int()?,
                    mix: reader.float()?,
                    update_period: reader.float()?,
                    feedback: reader.float()?,
                    amount: reader.float()?,
                    decay: reader.float()?,
                };
                if fx_type == FxType::Retrigger {
                    Effect::Retrigger(p)
                } else {
                    Effect::RetriggerEx(p)
                }
            }
            FxType::Gate => Effect::Gate(GateParams {
                mix: reader.float()?,
                wavelength: reader.int()?,
                length: reader.float()?,
            }),
            FxType::Flanger => Effect::Flanger(FlangerParams {
                mix: reader.float()?,
                period: reader.float()?,
                feedback: reader.float()?,
                stereo_width: reader.int()?,
                hicut_gain: reader.float()?,
            }),
            FxType::Tapestop => Effect::Tapestop(TapestopParams {
                mix: reader.float()?,
                speed: reader.float()?,
                rate: reader.float()?,
            }),
            FxType::Sidechain => Effect::Sidechain(SidechainParams {
                mix: reader.float()?,
                frequency: reader.float()?,
                attack: reader.int()?,
                hold: reader.int()?,
                release: reader.int()?,
            }),
            FxType::Wobble => {
                let filter_type = reader.int()?;
                let wave_shape = reader.int()?;
                Effect::Wobble(WobbleParams {
                    filter_type: u8::try_from(filter_type)
                        .ok()
                        .and_then(PassFilterType::from_value)
                        .ok_or_else(|| {
                            ChartError::InvalidParameter(format!("filter type {filter_type}"))
                        })?,
                    wave_shape: u8::try_from(wave_shape)
                        .ok()
                        .and_then(WaveShape::from_value)
                        .ok_or_else(|| {
                            ChartError::InvalidParameter(format!("wave shape {wave_shape}"))
                        })?,
                    mix: reader.float()?,
                    low_cutoff: reader.float()?,
                    hi_cutoff: reader.float()?,
                    frequency: reader.float()?,
                    bandwidth: reader.float()?,
                })
            }
            FxType::Bitcrush | FxType::PitchShift => {
                let p = AmountParams {
                    mix: reader.float()?,
                    amount: reader.int()?,
                };
                if fx_type == FxType::Bitcrush {
                    Effect::Bitcrush(p)
                } else {
                    Effect::PitchShift(p)
                }
            }
            FxType::Tapescratch => Effect::Tapescratch(TapescratchParams {
                mix: reader.float()?,
                curve_slope: reader.float()?,
                attack: reader.float()?,
                hold: reader.float()?,
                release: reader.float()?,
            }),
            FxType::LowPassFilter => Effect::LowPassFilter(LowPassParams {
                mix: reader.float()?,
                low_cutoff: reader.float()?,
                hi_cutoff: reader.float()?,
                bandwidth: reader.float()?,
            }),
            FxType::HighPassFilter => Effect::HighPassFilter(HighPassParams {
                mix: reader.float()?,
                cutoff: reader.float()?,
                curve_slope: reader.float()?,
                bandwidth: reader.float()?,
            }),
        };
        Ok(effect)
    }
}

/// Sequential reader over the fields of one VOX table line.
pub(crate) struct FieldReader<'a> {
    fields: &'a [&'a str],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(fields: &'a [&'a str]) -> Self {
        Self { fields, pos: 0 }
    }

    fn next(&mut self) -> Result<&'a str, ChartError> {
        let field = self.fields.get(self.pos).ok_or_else(|| {
            ChartError::MalformedVox(format!("expected at least {} fields", self.pos + 1))
        })?;
        self.pos += 1;
        Ok(field.trim())
    }

    pub(crate) fn int(&mut self) -> Result<i64, ChartError> {
        let field = self.next()?;
        field
            .parse()
            .map_err(|_| ChartError::MalformedVox(format!("expected integer (got {field})")))
    }

    pub(crate) fn float(&mut self) -> Result<f64, ChartError> {
        let field = self.next()?;
        field
            .parse()
            .map_err(|_| ChartError::MalformedVox(format!("expected number (got {field})")))
    }
}

/// A slot of the effect table; the game applies both effects together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectEntry {
    pub effect1: Effect,
    pub effect2: Effect,
}

impl EffectEntry {
    pub fn new(effect1: Effect) -> Self {
        Self {
            effect1,
            effect2: Effect::NoEffect,
        }
    }

    pub fn to_vox_string(&self) -> String {
        format!(
            "{}\n{}\n",
            self.effect1.to_vox_string(),
            self.effect2.to_vox_string()
        )
    }
}

impl fmt::Display for EffectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.effect1.fx_type(), self.effect2.fx_type())
    }
}

/// Effect table every chart starts with.
pub fn default_effects() -> Vec<EffectEntry> {
    vec![
        // Re8
        EffectEntry::new(Effect::Retrigger(RetriggerParams::default())),
        // Re16
        EffectEntry::new(Effect::Retrigger(RetriggerParams {
            wavelength: 8,
            decay: 0.1,
            ..RetriggerParams::default()
        })),
        // Ga16
        EffectEntry::new(Effect::Gate(GateParams::default())),
        EffectEntry::new(Effect::Flanger(FlangerParams::default())),
        // Re32
        EffectEntry::new(Effect::Retrigger(RetriggerParams {
            wavelength: 16,
            amount: 0.87,
            decay: 0.13,
            ..RetriggerParams::default()
        })),
        // Ga8
        EffectEntry::new(Effect::Gate(GateParams {
            wavelength: 4,
            ..GateParams::default()
        })),
        // Echo4
        EffectEntry::new(Effect::RetriggerEx(RetriggerParams {
            mix: 100.0,
            wavelength: 4,
            update_period: 4.0,
            feedback: 0.6,
            amount: 1.0,
            decay: 0.8,
        })),
        EffectEntry::new(Effect::Tapestop(TapestopParams::default())),
        EffectEntry::new(Effect::Sidechain(SidechainParams::default())),
        // Wo12
        EffectEntry::new(Effect::Wobble(WobbleParams::default())),
        // Re12
        EffectEntry::new(Effect::Retrigger(RetriggerParams {
            wavelength: 6,
            ..RetriggerParams::default()
        })),
        EffectEntry::new(Effect::Bitcrush(AmountParams::default())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_table_shape() {
        let effects = default_effects();
        assert_eq!(effects.len(), 12);
        assert_eq!(effects[0].effect1.fx_type(), FxType::Retrigger);
        assert_eq!(effects[6].effect1.fx_type(), FxType::RetriggerEx);
        assert_eq!(effects[11].effect1.fx_type(), FxType::Bitcrush);
        assert!(effects.iter().all(|e| e.effect2 == Effect::NoEffect));
    }

    #[test]
    fn test_vox_string_format() {
        let effect = Effect::Retrigger(RetriggerParams::default());
        assert_eq!(
            effect.to_vox_string(),
            "1,\t4,\t95.00,\t2.00,\t1.00,\t0.85,\t0.15"
        );
        assert_eq!(
            Effect::NoEffect.to_vox_string(),
            "0,\t0,\t0,\t0,\t0,\t0,\t0"
        );
        assert_eq!(
            Effect::Bitcrush(AmountParams::default()).to_vox_string(),
            "7,\t100.00,\t12"
        );
    }

    #[test]
    fn test_retrigger_definition() {
        let effect = Effect::from_definition(&def(&[
            ("type", "Retrigger"),
            ("updatePeriod", "1/2"),
            ("waveLength", "1/8"),
            ("mix", "80%"),
        ]))
        .unwrap();
        let Effect::Retrigger(p) = effect else {
            panic!("expected retrigger, got {effect:?}");
        };
        assert_eq!(p.update_period, 2.0);
        assert_eq!(p.wavelength, 4);
        assert!((p.mix - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_echo_with_zero_period_is_retrigger_ex() {
        let effect = Effect::from_definition(&def(&[
            ("type", "Echo"),
            ("updatePeriod", "0"),
            ("waveLength", "1/4"),
            ("feedbackLevel", "60%"),
        ]))
        .unwrap();
        let Effect::RetriggerEx(p) = effect else {
            panic!("expected retrigger ex, got {effect:?}");
        };
        assert_eq!(p.update_period, 4.0);
        assert_eq!(p.wavelength, 4);
        assert!((p.feedback - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_phaser_is_flanger() {
        let effect = Effect::from_definition(&def(&[("type", "Phaser")])).unwrap();
        assert_eq!(
            effect,
            Effect::Flanger(FlangerParams {
                mix: 50.0,
                period: 2.0,
                feedback: 0.35,
                stereo_width: 90,
                hicut_gain: 2.0,
            })
        );

        let effect = Effect::from_definition(&def(&[
            ("type", "Phaser"),
            ("stereoWidth", "0%"),
            ("hiCutGain", "8dB"),
        ]))
        .unwrap();
        let Effect::Flanger(p) = effect else {
            panic!("expected flanger, got {effect:?}");
        };
        assert_eq!(p.stereo_width, 0);
        assert!((p.hicut_gain - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_sidechain_times_in_ms() {
        let effect = Effect::from_definition(&def(&[
            ("type", "SideChain"),
            ("attackTime", "10ms"),
            ("holdTime", "0.1s"),
        ]))
        .unwrap();
        let Effect::Sidechain(p) = effect else {
            panic!("expected sidechain, got {effect:?}");
        };
        assert_eq!(p.attack, 10);
        assert_eq!(p.hold, 100);
        assert_eq!(p.release, 60);
    }

    #[test]
    fn test_unknown_and_missing_type() {
        assert_eq!(
            Effect::from_definition(&def(&[("type", "Reverb")])),
            Err(ChartError::UnknownEffectType("Reverb".to_string()))
        );
        assert!(Effect::from_definition(&def(&[("mix", "50%")])).is_err());
    }

    #[test]
    fn test_map_params() {
        let mut gate = Effect::Gate(GateParams::default());
        gate.map_params(&[8]).unwrap();
        assert_eq!(gate, Effect::Gate(GateParams { wavelength: 8, ..GateParams::default() }));

        let mut echo = Effect::RetriggerEx(RetriggerParams {
            update_period: 4.0,
            ..RetriggerParams::ex_default()
        });
        echo.map_params(&[4, 70]).unwrap();
        let Effect::RetriggerEx(p) = &echo else { unreachable!() };
        assert_eq!(p.wavelength, 4);
        assert!((p.feedback - 0.7).abs() < 1e-9);

        let mut crush = Effect::Bitcrush(AmountParams::default());
        assert!(crush.map_params(&[]).is_err());
        let mut flanger = Effect::Flanger(FlangerParams::default());
        assert!(flanger.map_params(&[]).is_ok());
    }

    #[test]
    fn test_vox_fields_round_trip() {
        for entry in default_effects() {
            let line = entry.effect1.to_vox_string();
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(Effect::from_vox_fields(&fields).unwrap(), entry.effect1);
        }
    }
}
