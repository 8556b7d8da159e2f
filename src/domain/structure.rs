//! Swing points and change-of-character (structure) detection.
//!
//! Swings compare each bar only with the bar before it, so a classification
//! is final as soon as its bar is known (non-repainting). The structure
//! detector scans classified swings in index order and keeps just the last
//! three of them:
//!
//! - Bearish change: `[HIGH, LOW]` with the LOW strictly below the HIGH.
//!   Fires at the LOW; reference level is the HIGH.
//! - Bullish change: `[HIGH, LOW, HIGH]` with the LOW strictly below the
//!   first HIGH and the last HIGH strictly above it. Fires at the last HIGH;
//!   reference level is the LOW.

use std::fmt;

use super::price::PricePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    BearishChange,
    BullishChange,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::BearishChange => write!(f, "BEARISH_CHANGE"),
            StructureKind::BullishChange => write!(f, "BULLISH_CHANGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureEvent {
    pub index: usize,
    pub kind: StructureKind,
    pub reference_level: f64,
}

/// Classify bar `index` against the bar before it. A bar that makes both a
/// higher high and a lower low counts as a HIGH.
pub fn classify_swing(bars: &[PricePoint], index: usize) -> Option<SwingPoint> {
    if index == 0 || index >= bars.len() {
        return None;
    }
    let (prev, bar) = (&bars[index - 1], &bars[index]);
    if bar.high > prev.high {
        Some(SwingPoint {
            index,
            kind: SwingKind::High,
            level: bar.high,
        })
    } else if bar.low < prev.low {
        Some(SwingPoint {
            index,
            kind: SwingKind::Low,
            level: bar.low,
        })
    } else {
        None
    }
}

/// One optional swing per bar.
pub fn detect_swings(bars: &[PricePoint]) -> Vec<Option<SwingPoint>> {
    (0..bars.len()).map(|i| classify_swing(bars, i)).collect()
}

/// Append-only swing accumulator with a three-entry window.
#[derive(Debug, Clone, Default)]
pub struct StructureDetector {
    window: [Option<SwingPoint>; 3],
    count: usize,
}

impl StructureDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total swings absorbed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Absorb the next swing (in index order) and report the event it
    /// completes, if any.
    pub fn push(&mut self, swing: SwingPoint) -> Option<StructureEvent> {
        self.window.rotate_left(1);
        self.window[2] = Some(swing);
        self.count += 1;

        match self.window {
            [Some(first), Some(low), Some(last)]
                if first.kind == SwingKind::High
                    && low.kind == SwingKind::Low
                    && last.kind == SwingKind::High
                    && low.level < first.level
                    && last.level > first.level =>
            {
                Some(StructureEvent {
                    index: last.index,
                    kind: StructureKind::BullishChange,
                    reference_level: low.level,
                })
            }
            [_, Some(high), Some(low)]
                if high.kind == SwingKind::High
                    && low.kind == SwingKind::Low
                    && low.level < high.level =>
            {
                Some(StructureEvent {
                    index: low.index,
                    kind: StructureKind::BearishChange,
                    reference_level: high.level,
                })
            }
            _ => None,
        }
    }
}

/// Structure events per bar; `None` where no pattern completes.
pub fn detect_structure(bars: &[PricePoint]) -> Vec<Option<StructureEvent>> {
    let mut detector = StructureDetector::new();
    detect_swings(bars)
        .into_iter()
        .map(|swing| swing.and_then(|s| detector.push(s)))
        .collect()
}

/// Event on the most recent bar, if any.
pub fn latest_structure(bars: &[PricePoint]) -> Option<StructureEvent> {
    detect_structure(bars).last().copied().flatten()
}
