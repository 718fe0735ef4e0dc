//! Merging of adjacent or overlapping frames
//!
//! `merge(later, earlier)` places `earlier` in front of `later`. Rows of
//! `later` on or before `earlier`'s last date are dropped, so `earlier` wins
//! wherever the two overlap.
//!
//! Accepted shapes (`E` = earlier, `L` = later):
//!
//! ```text
//! overlapping:   E.start <= L.start <= E.end <= L.end
//! adjacent:      E.start <= E.end <  L.start <= L.end
//! ```
//!
//! Anything else is skipped with an [`OverlapShapeWarning`].

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Frame, Layout};
use chrono::NaiveDate;
use std::fmt;

/// Non-fatal report of a merge whose ranges have an unexpected shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapShapeWarning {
    pub later: (NaiveDate, NaiveDate),
    pub earlier: (NaiveDate, NaiveDate),
}

impl fmt::Display for OverlapShapeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "improper time order: earlier [{}, {}] cannot be placed before later [{}, {}]",
            self.earlier.0, self.earlier.1, self.later.0, self.later.1
        )
    }
}

/// Result of a merge attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(Frame),
    Skipped(OverlapShapeWarning),
}

/// Place `earlier` in front of `later`, producing a new frame
///
/// Panel columns follow `earlier`'s order, then symbols only `later` has in
/// ascending order. A non-unique result index is a `DuplicateIndex` error.
pub fn merge(later: &Frame, earlier: &Frame) -> StorageResult<MergeOutcome> {
    if later.layout() != earlier.layout() {
        return Err(StorageError::InvalidParameter(format!(
            "incompatible layouts, {} required but {} provided",
            later.layout(),
            earlier.layout()
        )));
    }

    let (l_start, l_end, e_start, e_end) = match (
        later.start_time(),
        later.end_time(),
        earlier.start_time(),
        earlier.end_time(),
    ) {
        (Some(ls), Some(le), Some(es), Some(ee)) => (ls, le, es, ee),
        _ if earlier.is_empty() => return Ok(MergeOutcome::Merged(later.clone())),
        _ => return Ok(MergeOutcome::Merged(earlier.clone())),
    };

    if !(e_start <= l_start && e_end <= l_end) {
        return Ok(MergeOutcome::Skipped(OverlapShapeWarning {
            later: (l_start, l_end),
            earlier: (e_start, e_end),
        }));
    }

    let tail = later.drop_through(e_end);
    let (head, tail) = match later.layout() {
        Layout::Panel => {
            let order = earlier.symbols().unwrap_or_default();
            let tail = tail.rearrange_symbols(order)?;
            let head = earlier.rearrange_symbols(tail.symbols().unwrap_or_default())?;
            (head, tail)
        }
        Layout::TimeSeries => (earlier.clone(), tail),
    };

    let (layout, mut index, symbols, mut rows) = head.into_parts();
    let (_, tail_index, _, tail_rows) = tail.into_parts();
    index.extend(tail_index);
    rows.extend(tail_rows);

    Frame::from_sorted_parts(layout, index, symbols, rows).map(MergeOutcome::Merged)
}

impl Frame {
    /// Merge `other`, which holds the data immediately preceding this frame
    ///
    /// An improper overlap shape leaves this frame unchanged and is only
    /// logged.
    pub fn update(&mut self, other: &Frame) -> StorageResult<()> {
        match merge(self, other)? {
            MergeOutcome::Merged(frame) => *self = frame,
            MergeOutcome::Skipped(warning) => {
                tracing::warn!("Merge skipped: {}", warning);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::chunked::period::SplitFrequency;
    use crate::storage::types::test_util::{date, panel, series};
    use crate::storage::types::Cell;

    #[test]
    fn test_overlapping_merge_prefers_earlier() {
        let later = series(&["2018-01-03", "2018-01-04", "2018-01-05"]);
        let earlier = Frame::time_series(vec![
            (date("2018-01-01"), Cell::text("e1")),
            (date("2018-01-02"), Cell::text("e2")),
            (date("2018-01-03"), Cell::text("e3")),
        ])
        .unwrap();

        let merged = match merge(&later, &earlier).unwrap() {
            MergeOutcome::Merged(f) => f,
            other => panic!("unexpected outcome: {:?}", other),
        };

        assert_eq!(merged.len(), 5);
        assert!(merged.index().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(merged.value(date("2018-01-03")), Some(&Cell::text("e3")));
        assert_eq!(
            merged.value(date("2018-01-05")),
            Some(&Cell::text("v@2018-01-05"))
        );
    }

    #[test]
    fn test_adjacent_merge() {
        let later = series(&["2018-04-02", "2018-04-03"]);
        let earlier = series(&["2018-03-29", "2018-03-30"]);

        let mut frame = later.clone();
        frame.update(&earlier).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.start_time(), Some(date("2018-03-29")));
    }

    #[test]
    fn test_improper_shape_is_skipped() {
        let later = series(&["2018-01-01", "2018-01-05"]);
        let earlier = series(&["2018-01-02", "2018-01-03"]);

        assert!(matches!(
            merge(&later, &earlier).unwrap(),
            MergeOutcome::Skipped(_)
        ));

        let mut frame = later.clone();
        frame.update(&earlier).unwrap();
        assert_eq!(frame, later);

        // earlier extends past later
        let earlier = series(&["2017-12-01", "2018-02-01"]);
        assert!(matches!(
            merge(&later, &earlier).unwrap(),
            MergeOutcome::Skipped(_)
        ));
    }

    #[test]
    fn test_panel_symbol_alignment() {
        let later = panel(&["c", "a", "d"], &["2018-01-02", "2018-01-03"]);
        let earlier = panel(&["b", "a"], &["2018-01-01", "2018-01-02"]);

        let merged = match merge(&later, &earlier).unwrap() {
            MergeOutcome::Merged(f) => f,
            other => panic!("unexpected outcome: {:?}", other),
        };

        assert_eq!(merged.symbols().unwrap(), &["b", "a", "c", "d"]);
        assert_eq!(merged.len(), 3);
        // 2018-01-02 comes from earlier, which never had "c"
        assert_eq!(
            merged.get(date("2018-01-02"), "c"),
            Some(&Cell::NotAvailable)
        );
        assert_eq!(
            merged.get(date("2018-01-02"), "a"),
            Some(&Cell::text("a@2018-01-02"))
        );
        assert_eq!(merged.get(date("2018-01-03"), "b"), Some(&Cell::NotAvailable));
        assert_eq!(
            merged.get(date("2018-01-03"), "d"),
            Some(&Cell::text("d@2018-01-03"))
        );
    }

    #[test]
    fn test_layout_mismatch() {
        let later = series(&["2018-01-02"]);
        let earlier = panel(&["a"], &["2018-01-01"]);
        assert!(matches!(
            merge(&later, &earlier),
            Err(StorageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_sides() {
        let frame = series(&["2018-01-02"]);
        let empty = Frame::empty(Layout::TimeSeries);

        assert_eq!(
            merge(&frame, &empty).unwrap(),
            MergeOutcome::Merged(frame.clone())
        );
        assert_eq!(
            merge(&empty, &frame).unwrap(),
            MergeOutcome::Merged(frame.clone())
        );
    }

    #[test]
    fn test_split_rejoin_is_identity() {
        let dates = [
            "2017-11-30", "2017-12-29", "2018-01-02", "2018-02-28", "2018-03-30", "2018-04-02",
            "2018-07-02",
        ];
        let original = panel(&["600000", "000001"], &dates);

        let parts: Vec<Frame> = original.split(SplitFrequency::Month).into_values().collect();
        assert_eq!(parts.len(), 7);

        let mut iter = parts.into_iter();
        let mut rejoined = iter.next().unwrap();
        for part in iter {
            let mut next = part;
            next.update(&rejoined).unwrap();
            rejoined = next;
        }

        assert_eq!(rejoined, original);
    }
}
