use chrono::{Datelike, NaiveDateTime};

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Internal-to-ledger overlap signal. The coordinator maps this to
/// `SlotNoLongerAvailable`; it never reaches callers raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OverlapConflict(pub Ulid);

pub(crate) fn validate_span(span: &Span, max_minutes: Minutes) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::LimitExceeded("span start must precede end"));
    }
    let years = [span.start.year(), span.end.year()];
    if years.iter().any(|y| !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(y)) {
        return Err(EngineError::LimitExceeded("datetime out of range"));
    }
    if span.minutes() > max_minutes {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// The defining check of the ledger: does `span` intersect any entry that
/// still holds its interval? Expired pending entries are skipped. Must run
/// under the barber's write guard so check and insert are one atomic step.
pub(crate) fn check_no_conflict(
    state: &BarberState,
    span: &Span,
    now: NaiveDateTime,
) -> Result<(), OverlapConflict> {
    for entry in state.overlapping(span) {
        if entry.status.blocks_at(now) {
            return Err(OverlapConflict(entry.id));
        }
    }
    Ok(())
}

/// Whether `span` lies entirely within one of the barber's shift windows on
/// its own day. Appointments never straddle shifts or midnight.
pub(crate) fn within_shift(state: &BarberState, span: &Span) -> bool {
    let date = span.start.date();
    state
        .shifts_for(weekday_index(date))
        .any(|s| s.window_on(date).contains_span(span))
}

/// Whether `span` intersects a shift break, a barber-scoped block, or a
/// shop-wide block.
pub(crate) fn blocked(state: &BarberState, shop_blocks: &[Block], span: &Span) -> bool {
    let date = span.start.date();
    state
        .shifts_for(weekday_index(date))
        .filter_map(|s| s.break_on(date))
        .any(|b| b.overlaps(span))
        || state.blocks_over(span).next().is_some()
        || shop_blocks.iter().any(|b| b.span.overlaps(span))
}
