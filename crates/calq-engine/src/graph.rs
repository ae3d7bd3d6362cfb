use calq_core::{Bindings, CompiledExpr, GraphRange, Value};

pub const DEFAULT_SAMPLES: usize = 200;
pub const DEFAULT_DIVISIONS: usize = 30;

/// Turns a compiled expression into plot data.
///
/// Line plots drop points that fail or are not finite, so the output can be
/// shorter than `samples + 1` and have gaps in `x`. Surfaces cannot have
/// holes, so failed points become `0` and the grid stays rectangular.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    /// Steps across the 2D domain.
    pub samples: usize,
    /// Steps along each 3D axis.
    pub divisions: usize,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            divisions: DEFAULT_DIVISIONS,
        }
    }
}

fn finite(f: &dyn CompiledExpr, bindings: &Bindings) -> Option<f64> {
    match f.eval(bindings) {
        Ok(Value::Number(v)) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// `steps + 1` evenly spaced points from `min` to `max` inclusive. Points are
/// computed from the index so rounding does not accumulate.
fn grid(range: GraphRange, steps: usize) -> Vec<f64> {
    let steps = steps.max(1);
    let width = range.width() / steps as f64;
    (0..=steps).map(|i| range.min + i as f64 * width).collect()
}

impl Sampler {
    pub fn line(&self, f: &dyn CompiledExpr, range: GraphRange) -> (Vec<f64>, Vec<f64>) {
        grid(range, self.samples)
            .into_iter()
            .filter_map(|x| finite(f, &[("x", x)]).map(|y| (x, y)))
            .unzip()
    }

    pub fn surface(
        &self,
        f: &dyn CompiledExpr,
        range: GraphRange,
    ) -> (Vec<f64>, Vec<f64>, Vec<Vec<f64>>) {
        let xs = grid(range, self.divisions);
        let ys = xs.clone();
        let z = xs
            .iter()
            .map(|&x| {
                ys.iter()
                    .map(|&y| finite(f, &[("x", x), ("y", y)]).unwrap_or(0.0))
                    .collect()
            })
            .collect();
        (xs, ys, z)
    }
}
