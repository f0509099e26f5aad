//! Control curves for automation playback
//!
//! A sorted point list evaluated against the transport position. The
//! render thread evaluates once per process block, so `rt_safe_eval` is
//! a binary search over a slice: no allocation, no lock, no recursion.
//! Edits happen off the render thread and reach it through the session
//! command queue.

use serde::{Deserialize, Serialize};

/// Interpolation to the next point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurveInterp {
    /// Hold until the next point (switch-like controls, e.g. mute)
    #[default]
    Step,
    /// Linear interpolation
    Linear,
}

/// Single automation point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Time in samples from session start
    pub time_samples: u64,
    /// Normalized value (0.0 - 1.0)
    pub value: f64,
}

impl CurvePoint {
    pub fn new(time_samples: u64, value: f64) -> Self {
        Self {
            time_samples,
            value: value.clamp(0.0, 1.0),
        }
    }
}

/// Automation curve: sorted points plus interpolation mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlCurve {
    points: Vec<CurvePoint>,
    interp: CurveInterp,
    /// Value reported before the first point (and for an empty curve)
    default_value: f64,
}

impl ControlCurve {
    pub fn new(interp: CurveInterp, default_value: f64) -> Self {
        Self {
            points: Vec::new(),
            interp,
            default_value: default_value.clamp(0.0, 1.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Insert a point, keeping the list sorted. A point at an existing
    /// time replaces the old value.
    pub fn add_point(&mut self, time_samples: u64, value: f64) {
        let point = CurvePoint::new(time_samples, value);
        match self.points.binary_search_by_key(&time_samples, |p| p.time_samples) {
            Ok(idx) => self.points[idx] = point,
            Err(idx) => self.points.insert(idx, point),
        }
    }

    /// Remove the point at an exact time. Returns true if one existed.
    pub fn remove_point(&mut self, time_samples: u64) -> bool {
        match self.points.binary_search_by_key(&time_samples, |p| p.time_samples) {
            Ok(idx) => {
                self.points.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Evaluate at a transport position.
    ///
    /// # Audio Thread Safety
    /// - No allocation, no lock: binary search over the point slice
    /// - O(log n)
    #[inline]
    pub fn rt_safe_eval(&self, pos: u64) -> f64 {
        if self.points.is_empty() {
            return self.default_value;
        }
        let idx = match self.points.binary_search_by_key(&pos, |p| p.time_samples) {
            Ok(idx) => return self.points[idx].value,
            Err(idx) => idx,
        };
        if idx == 0 {
            return self.default_value;
        }
        let prev = &self.points[idx - 1];
        match self.interp {
            CurveInterp::Step => prev.value,
            CurveInterp::Linear => {
                if idx == self.points.len() {
                    return prev.value;
                }
                let next = &self.points[idx];
                let span = (next.time_samples - prev.time_samples) as f64;
                if span <= 0.0 {
                    return next.value;
                }
                let t = (pos - prev.time_samples) as f64 / span;
                prev.value + (next.value - prev.value) * t
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
