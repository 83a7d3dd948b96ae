use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Where an aggregation pass picks up for a turbine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAnchor {
    /// No window committed yet; starts at the turbine's earliest reading
    Seed(DateTime<Utc>),
    /// End of the last committed window
    Computed(DateTime<Utc>),
}

impl WindowAnchor {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Seed(at) | Self::Computed(at) => *at,
        }
    }
}

/// Time range covered by one aggregation window.
///
/// Windows are `(start, end]`; the first window of a turbine is `[start, end]`
/// so the reading that seeded it is aggregated too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub includes_start: bool,
}

impl WindowBounds {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let after_start = if self.includes_start {
            timestamp >= self.start
        } else {
            timestamp > self.start
        };
        after_start && timestamp <= self.end
    }

    pub fn width(&self) -> Duration {
        self.end - self.start
    }
}

/// The window following `anchor`, if it is complete by `high_watermark`.
pub fn next_window(
    anchor: WindowAnchor,
    high_watermark: DateTime<Utc>,
    width: Duration,
) -> Option<WindowBounds> {
    if width <= Duration::zero() {
        return None;
    }
    let start = anchor.at();
    let end = start.checked_add_signed(width)?;
    if end > high_watermark {
        return None;
    }
    Some(WindowBounds {
        start,
        end,
        includes_start: matches!(anchor, WindowAnchor::Seed(_)),
    })
}

/// Finite sequence of the windows a pass would produce from `anchor` up to a high watermark.
#[derive(Debug, Clone)]
pub struct WindowSchedule {
    anchor: Option<WindowAnchor>,
    high_watermark: DateTime<Utc>,
    width: Duration,
}

impl WindowSchedule {
    pub fn new(anchor: WindowAnchor, high_watermark: DateTime<Utc>, width: Duration) -> Self {
        Self {
            anchor: Some(anchor),
            high_watermark,
            width,
        }
    }
}

impl Iterator for WindowSchedule {
    type Item = WindowBounds;

    fn next(&mut self) -> Option<Self::Item> {
        let anchor = self.anchor.take()?;
        let bounds = next_window(anchor, self.high_watermark, self.width)?;
        self.anchor = Some(WindowAnchor::Computed(bounds.end));
        Some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    #[test]
    fn nothing_until_a_full_window_is_available() {
        let anchor = WindowAnchor::Computed(at(0));
        assert_eq!(next_window(anchor, at(23), Duration::hours(24)), None);

        let window = next_window(anchor, at(24), Duration::hours(24)).unwrap();
        assert_eq!(window.start, at(0));
        assert_eq!(window.end, at(24));
        assert!(!window.includes_start);
    }

    #[test]
    fn seeded_window_includes_its_start() {
        let window = next_window(WindowAnchor::Seed(at(0)), at(30), Duration::hours(24)).unwrap();
        assert!(window.includes_start);
        assert!(window.contains(at(0)));
        assert!(window.contains(at(24)));
        assert!(!window.contains(at(25)));

        let later = next_window(WindowAnchor::Computed(at(24)), at(48), Duration::hours(24)).unwrap();
        assert!(!later.contains(at(24)));
        assert!(later.contains(at(48)));
    }

    #[test]
    fn non_positive_width_yields_nothing() {
        let anchor = WindowAnchor::Computed(at(0));
        assert_eq!(next_window(anchor, at(100), Duration::zero()), None);
        assert_eq!(WindowSchedule::new(anchor, at(100), Duration::hours(-1)).count(), 0);
    }

    proptest! {
        #[test]
        fn schedule_covers_exactly_k_contiguous_windows(
            seeded in any::<bool>(),
            width_hours in 1i64..72,
            span_hours in 0i64..1000,
        ) {
            let anchor = if seeded { WindowAnchor::Seed(at(0)) } else { WindowAnchor::Computed(at(0)) };
            let width = Duration::hours(width_hours);
            let windows: Vec<_> = WindowSchedule::new(anchor, at(span_hours), width).collect();

            let k = span_hours / width_hours;
            prop_assert_eq!(windows.len() as i64, k);

            let mut cursor = at(0);
            for (index, window) in windows.iter().enumerate() {
                prop_assert_eq!(window.start, cursor);
                prop_assert_eq!(window.width(), width);
                prop_assert_eq!(window.includes_start, seeded && index == 0);
                cursor = window.end;
            }
            prop_assert_eq!(cursor, at(k * width_hours));
            prop_assert!(cursor <= at(span_hours));
        }
    }
}
