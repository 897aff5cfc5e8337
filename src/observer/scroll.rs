//! Scroll depth tracking

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Document scroll geometry at the moment of a scroll signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    /// Percentage of the scrollable overflow scrolled past, rounded, 0-100
    ///
    /// A document without overflow always reports 0.
    pub fn percent(&self) -> u8 {
        let overflow = self.scroll_height - self.client_height;
        if overflow.is_nan() || overflow <= 0.0 || !self.scroll_top.is_finite() {
            return 0;
        }
        let percent = (self.scroll_top / overflow * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Current and deepest scroll position for one page load
#[derive(Debug, Default)]
pub struct ScrollDepth {
    current: AtomicU8,
    max: AtomicU8,
}

impl ScrollDepth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scroll position; returns the new current depth
    pub fn record(&self, metrics: &ScrollMetrics) -> u8 {
        let depth = metrics.percent();
        self.current.store(depth, Ordering::Relaxed);
        self.max.fetch_max(depth, Ordering::Relaxed);
        depth
    }

    pub fn current(&self) -> u8 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u8 {
        self.max.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_basic() {
        assert_eq!(ScrollMetrics::new(0.0, 2000.0, 1000.0).percent(), 0);
        assert_eq!(ScrollMetrics::new(500.0, 2000.0, 1000.0).percent(), 50);
        assert_eq!(ScrollMetrics::new(1000.0, 2000.0, 1000.0).percent(), 100);
    }

    #[test]
    fn test_percent_rounds_to_nearest() {
        // 333 / 1000 -> 33.3
        assert_eq!(ScrollMetrics::new(333.0, 2000.0, 1000.0).percent(), 33);
        // 335 / 1000 -> 33.5
        assert_eq!(ScrollMetrics::new(335.0, 2000.0, 1000.0).percent(), 34);
    }

    #[test]
    fn test_percent_without_overflow_is_zero() {
        for top in [0.0, 10.0, 500.0, -20.0] {
            assert_eq!(ScrollMetrics::new(top, 800.0, 800.0).percent(), 0);
        }
        assert_eq!(ScrollMetrics::new(100.0, 600.0, 800.0).percent(), 0);
    }

    #[test]
    fn test_percent_clamped() {
        // Overscroll bounce can push scroll_top outside the overflow range
        assert_eq!(ScrollMetrics::new(1200.0, 2000.0, 1000.0).percent(), 100);
        assert_eq!(ScrollMetrics::new(-50.0, 2000.0, 1000.0).percent(), 0);
        assert_eq!(ScrollMetrics::new(f64::NAN, 2000.0, 1000.0).percent(), 0);
    }

    #[test]
    fn test_max_depth_never_decreases() {
        let depth = ScrollDepth::new();
        let positions = [100.0, 700.0, 300.0, 0.0, 650.0, 900.0, 200.0];
        let mut last_max = 0;

        for top in positions {
            let current = depth.record(&ScrollMetrics::new(top, 2000.0, 1000.0));
            assert!(current <= 100);
            assert!(depth.max() >= last_max);
            assert!(depth.max() >= current);
            last_max = depth.max();
        }

        assert_eq!(depth.current(), 20);
        assert_eq!(depth.max(), 90);
    }
}
