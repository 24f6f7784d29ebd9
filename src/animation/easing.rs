use crate::core::geo::Point;
use serde::{Deserialize, Serialize};

/// Easing curves used by zoom easing, inertia and fly-to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EasingType {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseOutCubic,
    EaseInOutCubic,
}

impl EasingType {
    /// Apply the easing function to a normalized time value (0.0 to 1.0)
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);

        match self {
            EasingType::Linear => t,
            EasingType::EaseIn => t * t,
            EasingType::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            EasingType::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }
            EasingType::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            EasingType::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

impl Default for EasingType {
    fn default() -> Self {
        Self::EaseOutCubic
    }
}

/// Values that can be linearly interpolated by an animation
pub trait Tweenable {
    /// Interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Tweenable for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Tweenable for Point {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Point::new(self.x.lerp(&other.x, t), self.y.lerp(&other.y, t))
    }
}

/// Normalized progress of an animation that started at `start_ms` and runs
/// for `duration_ms`. Zero-length animations are complete immediately.
pub fn progress(now_ms: f64, start_ms: f64, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return 1.0;
    }
    ((now_ms - start_ms) / duration_ms).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            EasingType::Linear,
            EasingType::EaseIn,
            EasingType::EaseOut,
            EasingType::EaseInOut,
            EasingType::EaseOutCubic,
            EasingType::EaseInOutCubic,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-12);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cubic_ease_out() {
        assert!((EasingType::EaseOutCubic.apply(0.5) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_progress() {
        assert_eq!(progress(50.0, 0.0, 100.0), 0.5);
        assert_eq!(progress(500.0, 0.0, 100.0), 1.0);
        assert_eq!(progress(10.0, 20.0, 100.0), 0.0);
        assert_eq!(progress(0.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn test_point_lerp() {
        let a = Point::new(0.0, 10.0);
        let b = Point::new(10.0, 20.0);
        assert_eq!(a.lerp(&b, 0.5), Point::new(5.0, 15.0));
    }
}
