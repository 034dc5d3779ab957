//! Small smoothing primitives shared by the engines.

use std::collections::VecDeque;

/// Exponential moving average that adopts its first input directly.
#[derive(Clone, Debug)]
pub struct Ema {
    alpha: f32,
    value: f32,
    initialized: bool,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
            initialized: false,
        }
    }

    pub fn update(&mut self, target: f32) -> f32 {
        self.update_with(target, self.alpha)
    }

    /// Update using a one-off rate instead of the configured alpha
    pub fn update_with(&mut self, target: f32, alpha: f32) -> f32 {
        if !target.is_finite() {
            return self.value;
        }
        if self.initialized {
            let a = alpha.clamp(0.0, 1.0);
            self.value += (target - self.value) * a;
        } else {
            self.value = target;
            self.initialized = true;
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// EMA on a circle of degrees, always moving along the shorter arc.
#[derive(Clone, Debug)]
pub struct HueEma {
    alpha: f32,
    degrees: f32,
    initialized: bool,
}

impl HueEma {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            degrees: 0.0,
            initialized: false,
        }
    }

    pub fn update_with(&mut self, target: f32, alpha: f32) -> f32 {
        if !target.is_finite() {
            return self.degrees;
        }
        let target = target.rem_euclid(360.0);
        if self.initialized {
            let delta = shortest_arc(self.degrees, target);
            self.degrees = (self.degrees + delta * alpha.clamp(0.0, 1.0)).rem_euclid(360.0);
        } else {
            self.degrees = target;
            self.initialized = true;
        }
        self.degrees
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn degrees(&self) -> f32 {
        self.degrees
    }
}

/// Signed distance in degrees from `from` to `to` along the shorter arc (-180..180]
pub fn shortest_arc(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Fixed-length window of the most recent values.
#[derive(Clone, Debug)]
pub struct TimeWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl TimeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_ready(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    pub fn latest(&self) -> f32 {
        self.values.back().copied().unwrap_or(0.0)
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_adopts_first_value() {
        let mut ema = Ema::new(0.25);
        assert_eq!(ema.update(0.8), 0.8);
        let v = ema.update(0.0);
        assert!((v - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_hue_ema_wraps_short_way() {
        let mut hue = HueEma::new(0.5);
        hue.update_with(350.0, 0.5);
        let v = hue.update_with(10.0, 0.5);
        assert!((v - 0.0).abs() < 1e-3 || (v - 360.0).abs() < 1e-3, "got {}", v);
    }

    #[test]
    fn test_time_window_average() {
        let mut w = TimeWindow::new(5);
        for v in [0.1, 0.2, 0.4, 0.3, 0.15, 0.1] {
            w.push(v);
        }
        assert!(w.is_ready());
        assert!((w.average() - 0.23).abs() < 1e-6);
        assert_eq!(w.latest(), 0.1);
    }
}
