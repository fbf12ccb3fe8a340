use serde::{Deserialize, Serialize};

/// Accumulated engagement signals for one attempt.
///
/// Every field is monotonically non-decreasing over the attempt's lifetime:
/// scroll and elapsed take the max of what was seen, counters only grow.
/// Merging two snapshots is therefore commutative and duplicate-safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub elapsed_seconds: u64,
    /// 0-100, furthest point reached.
    pub scroll_percentage: u8,
    pub interaction_count: u32,
    pub ad_click_count: u32,
    /// Embedded content finished loading. Stays false forever when the
    /// content failed to load, which blocks completion.
    pub loaded: bool,
    /// Signals were acquired through the host-side fallback; ad-click
    /// attribution is structurally impossible in this mode.
    pub cross_origin: bool,
}

impl SignalSnapshot {
    /// Furthest-scroll update, clamped to 100. Never decreases.
    pub fn record_scroll(&mut self, percentage: u8) {
        self.scroll_percentage = self.scroll_percentage.max(percentage.min(100));
    }

    /// Merge another cumulative snapshot into this one, component-wise.
    ///
    /// Both sides are cumulative counts, so max (not addition) is the
    /// lossless combination regardless of delivery order or duplication.
    pub fn merge_from(&mut self, other: &SignalSnapshot) {
        self.elapsed_seconds = self.elapsed_seconds.max(other.elapsed_seconds);
        self.scroll_percentage = self.scroll_percentage.max(other.scroll_percentage.min(100));
        self.interaction_count = self.interaction_count.max(other.interaction_count);
        self.ad_click_count = self.ad_click_count.max(other.ad_click_count);
        self.loaded = self.loaded || other.loaded;
        self.cross_origin = self.cross_origin || other.cross_origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_is_monotonic() {
        let mut s = SignalSnapshot::default();
        s.record_scroll(40);
        s.record_scroll(75);
        s.record_scroll(20);
        assert_eq!(s.scroll_percentage, 75);

        s.record_scroll(200);
        assert_eq!(s.scroll_percentage, 100);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = SignalSnapshot {
            elapsed_seconds: 30,
            scroll_percentage: 50,
            interaction_count: 2,
            ad_click_count: 0,
            loaded: true,
            cross_origin: false,
        };
        let b = SignalSnapshot {
            elapsed_seconds: 25,
            scroll_percentage: 80,
            interaction_count: 5,
            ad_click_count: 1,
            loaded: false,
            cross_origin: true,
        };

        let mut ab = a;
        ab.merge_from(&b);
        let mut ba = b;
        ba.merge_from(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.scroll_percentage, 80);
        assert_eq!(ab.elapsed_seconds, 30);
        assert!(ab.loaded);
    }

    #[test]
    fn test_merge_duplicate_is_noop() {
        let mut a = SignalSnapshot {
            elapsed_seconds: 10,
            scroll_percentage: 33,
            interaction_count: 4,
            ad_click_count: 2,
            loaded: true,
            cross_origin: false,
        };
        let copy = a;
        a.merge_from(&copy);
        assert_eq!(a, copy);
    }
}
