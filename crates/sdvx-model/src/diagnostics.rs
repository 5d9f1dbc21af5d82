// Structured parser warnings collected per conversion

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::TimePoint;

/// Category of a recoverable problem found while reading a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    UnrecognizedLine,
    MalformedValue,
    UnterminatedHold,
    UnmatchedSpin,
    TooManyEffects,
    UnknownEffect,
    UnknownFilter,
    InvalidDefinition,
    ConflictingEffect,
    CurveOutsideSegment,
    CurveNotClosed,
    UnsupportedFeature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// 1-based source line, when the problem is tied to one
    pub line: Option<usize>,
    pub time: Option<TimePoint>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.time) {
            (Some(line), _) => write!(f, "line {line}: {}", self.message),
            (None, Some(time)) => write!(f, "{time}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Warning sink passed through readers.
///
/// Every warning is also forwarded to the `log` facade so a binary that only
/// configures a logger still sees them.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.push(Warning {
            kind,
            line: None,
            time: None,
            message: message.into(),
        });
    }

    pub fn warn_line(&mut self, kind: WarningKind, line: usize, message: impl Into<String>) {
        self.push(Warning {
            kind,
            line: Some(line),
            time: None,
            message: message.into(),
        });
    }

    pub fn warn_at(&mut self, kind: WarningKind, time: TimePoint, message: impl Into<String>) {
        self.push(Warning {
            kind,
            line: None,
            time: Some(time),
            message: message.into(),
        });
    }

    fn push(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    pub fn contains(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}
