// Dashboard THI and comfort thresholds

use serde::Serialize;

/// Temperature-humidity index as the dashboard shows it (one decimal).
/// `humidity` is relative humidity in percent.
pub fn classic_thi(temperature: f64, humidity: f64) -> f64 {
    let thi = 0.8 * temperature + (humidity / 100.0) * (temperature - 14.4) + 46.4;
    (thi * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComfortLevel {
    Comfortable,
    SlightlyUncomfortable,
    Uncomfortable,
}

impl ComfortLevel {
    pub fn from_thi(thi: f64) -> Self {
        if thi < 70.0 {
            Self::Comfortable
        } else if thi < 75.0 {
            Self::SlightlyUncomfortable
        } else {
            Self::Uncomfortable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Comfortable => "Comfortable",
            Self::SlightlyUncomfortable => "Slightly Uncomfortable",
            Self::Uncomfortable => "Uncomfortable",
        }
    }

    pub fn alert(self) -> &'static str {
        match self {
            Self::Comfortable => "normal",
            Self::SlightlyUncomfortable => "warning",
            Self::Uncomfortable => "danger",
        }
    }
}

/// Wire form of a comfort classification.
#[derive(Debug, Clone, Serialize)]
pub struct ComfortStatus {
    pub level: ComfortLevel,
    pub label: &'static str,
    pub alert: &'static str,
}

impl From<ComfortLevel> for ComfortStatus {
    fn from(level: ComfortLevel) -> Self {
        Self {
            level,
            label: level.label(),
            alert: level.alert(),
        }
    }
}
