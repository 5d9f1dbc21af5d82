// Laser filters and auto-tab assignments

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effect::FieldReader;
use crate::error::ChartError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassFilterParams {
    pub mix: f64,
    pub min_cutoff: f64,
    pub max_cutoff: f64,
    pub bandwidth: f64,
}

/// Filter swept by a laser knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    LowPass(PassFilterParams),
    HighPass(PassFilterParams),
    Bitcrush { mix: f64, max_amount: i64 },
}

impl Filter {
    pub fn low_pass() -> Filter {
        Filter::LowPass(PassFilterParams {
            mix: 90.0,
            min_cutoff: 400.0,
            max_cutoff: 18000.0,
            bandwidth: 0.7,
        })
    }

    pub fn high_pass() -> Filter {
        Filter::HighPass(PassFilterParams {
            mix: 90.0,
            min_cutoff: 40.0,
            max_cutoff: 5000.0,
            bandwidth: 0.7,
        })
    }

    pub fn bitcrush() -> Filter {
        Filter::Bitcrush {
            mix: 100.0,
            max_amount: 30,
        }
    }

    /// Filter kind as written to `#TAB PARAM ASSIGN INFO`.
    pub fn index(&self) -> u8 {
        match self {
            Filter::LowPass(_) => 1,
            Filter::HighPass(_) => 2,
            Filter::Bitcrush { .. } => 3,
        }
    }

    pub fn to_vox_string(&self) -> String {
        match self {
            Filter::LowPass(p) | Filter::HighPass(p) => format!(
                "{},\t{:.2},\t{:.2},\t{:.2},\t{:.2}",
                self.index(),
                p.mix,
                p.min_cutoff,
                p.max_cutoff,
                p.bandwidth
            ),
            Filter::Bitcrush { mix, max_amount } => {
                format!("{},\t{mix:.2},\t{max_amount}", self.index())
            }
        }
    }

    pub fn from_vox_fields(fields: &[&str]) -> Result<Filter, ChartError> {
        let mut reader = FieldReader::new(fields);
        match reader.int()? {
            kind @ (1 | 2) => {
                let p = PassFilterParams {
                    mix: reader.float()?,
                    min_cutoff: reader.float()?,
                    max_cutoff: reader.float()?,
                    bandwidth: reader.float()?,
                };
                Ok(if kind == 1 {
                    Filter::LowPass(p)
                } else {
                    Filter::HighPass(p)
                })
            }
            3 => Ok(Filter::Bitcrush {
                mix: reader.float()?,
                max_amount: reader.int()?,
            }),
            other => Err(ChartError::MalformedVox(format!(
                "unknown filter kind {other}"
            ))),
        }
    }
}

/// Filter table every chart starts with, addressed by `FilterIndex` 1..=5.
pub fn default_filters() -> Vec<Filter> {
    vec![
        Filter::low_pass(),
        Filter::LowPass(PassFilterParams {
            mix: 90.0,
            min_cutoff: 600.0,
            max_cutoff: 15000.0,
            bandwidth: 5.0,
        }),
        Filter::high_pass(),
        Filter::HighPass(PassFilterParams {
            mix: 90.0,
            min_cutoff: 40.0,
            max_cutoff: 2000.0,
            bandwidth: 3.0,
        }),
        Filter::bitcrush(),
    ]
}

/// Binds a laser to one parameter of an effect slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTabSetting {
    pub effect_index: i64,
    pub param_index: i64,
    pub min_value: f64,
    pub max_value: f64,
}

impl AutoTabSetting {
    pub fn new(effect_index: i64) -> Self {
        Self {
            effect_index,
            param_index: 0,
            min_value: 0.0,
            max_value: 0.0,
        }
    }

    pub fn to_vox_string(&self) -> String {
        format!(
            "{},\t{},\t{:.2},\t{:.2}",
            self.effect_index, self.param_index, self.min_value, self.max_value
        )
    }

    pub fn from_vox_fields(fields: &[&str]) -> Result<Self, ChartError> {
        let mut reader = FieldReader::new(fields);
        Ok(Self {
            effect_index: reader.int()?,
            param_index: reader.int()?,
            min_value: reader.float()?,
            max_value: reader.float()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTabEntry {
    pub effect1: AutoTabSetting,
    pub effect2: AutoTabSetting,
}

impl AutoTabEntry {
    pub fn new(effect_index: i64) -> Self {
        Self {
            effect1: AutoTabSetting::new(effect_index),
            effect2: AutoTabSetting::new(effect_index),
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

impl fmt::Display for AutoTabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.effect1.effect_index, self.effect2.effect_index)
    }
}

/// One auto-tab entry per default effect slot.
pub fn default_autotab() -> Vec<AutoTabEntry> {
    (0..12).map(AutoTabEntry::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters() {
        let filters = default_filters();
        assert_eq!(filters.len(), 5);
        assert_eq!(
            filters.iter().map(Filter::index).collect::<Vec<_>>(),
            vec![1, 1, 2, 2, 3]
        );
        assert_eq!(
            filters[0].to_vox_string(),
            "1,\t90.00,\t400.00,\t18000.00,\t0.70"
        );
        assert_eq!(filters[4].to_vox_string(), "3,\t100.00,\t30");
    }

    #[test]
    fn test_filter_vox_fields() {
        for filter in default_filters() {
            let line = filter.to_vox_string();
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(Filter::from_vox_fields(&fields).unwrap(), filter);
        }
        assert!(Filter::from_vox_fields(&["9", "1.0"]).is_err());
    }

    #[test]
    fn test_autotab_entry_writes_two_lines() {
        let entry = AutoTabEntry::new(3);
        assert_eq!(entry.to_vox_string(), "3,\t0,\t0.00,\t0.00\n3,\t0,\t0.00,\t0.00\n");
        assert_eq!(default_autotab().len(), 12);
    }
}
