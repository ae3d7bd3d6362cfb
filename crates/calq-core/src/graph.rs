use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};
use crate::value::format_number;

const ZOOM_IN_FACTOR: f64 = 0.7;
const ZOOM_OUT_FACTOR: f64 = 1.3;

/// Sampled plot data handed to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphSeries {
    /// 2D line; `x` and `y` always have the same length.
    Scatter {
        x: Vec<f64>,
        y: Vec<f64>,
        name: String,
    },
    /// 3D mesh; `z[i][j]` is the value at `(x[i], y[j])`.
    Surface {
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<Vec<f64>>,
    },
}

impl GraphSeries {
    /// Number of sampled points.
    pub fn point_count(&self) -> usize {
        match self {
            Self::Scatter { x, .. } => x.len(),
            Self::Surface { z, .. } => z.iter().map(Vec::len).sum(),
        }
    }

    /// Check the length invariants a renderer relies on.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Scatter { x, y, .. } => x.len() == y.len(),
            Self::Surface { x, y, z } => {
                z.len() == x.len() && z.iter().all(|row| row.len() == y.len())
            }
        }
    }
}

/// Closed plotting interval `[min, max]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct GraphRange {
    pub min: f64,
    pub max: f64,
}

impl GraphRange {
    pub const DEFAULT: Self = Self {
        min: -10.0,
        max: 10.0,
    };

    pub fn new(min: f64, max: f64) -> CalcResult<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(CalcError::Evaluation(format!(
                "invalid graph range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Scale the width by `factor` keeping the center fixed.
    pub fn zoom(&self, factor: f64) -> Self {
        let center = self.center();
        let half = self.width() * factor / 2.0;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn zoom_in(&self) -> Self {
        self.zoom(ZOOM_IN_FACTOR)
    }

    pub fn zoom_out(&self) -> Self {
        self.zoom(ZOOM_OUT_FACTOR)
    }
}

impl Default for GraphRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for GraphRange {
    /// Bounds rounded to 9 decimals so repeated zooming prints cleanly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let round = |v: f64| format_number((v * 1e9).round() / 1e9);
        write!(f, "[{}, {}]", round(self.min), round(self.max))
    }
}

impl TryFrom<[f64; 2]> for GraphRange {
    type Error = CalcError;

    fn try_from([min, max]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<GraphRange> for [f64; 2] {
    fn from(r: GraphRange) -> Self {
        [r.min, r.max]
    }
}
