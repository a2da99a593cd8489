use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Compute a barber's day schedule: the ordered candidate slots for an
/// appointment of `duration_min`, stepped at `granularity_min`, plus the
/// day verdict.
///
/// A candidate is available iff its `[start, start + duration)` interval
/// avoids every block, shift break and active appointment, and starts no
/// earlier than `min_start`. Intervals are half-open throughout, so a
/// booking ending exactly where another starts is not a conflict.
pub fn day_schedule(
    state: &BarberState,
    shop_blocks: &[Block],
    date: NaiveDate,
    duration_min: Minutes,
    granularity_min: Minutes,
    now: NaiveDateTime,
    min_start: NaiveDateTime,
) -> DaySchedule {
    let weekday = weekday_index(date);
    let mut windows: Vec<Span> = state
        .shifts_for(weekday)
        .map(|s| s.window_on(date))
        .collect();
    windows.sort_by_key(|w| w.start);

    if windows.is_empty() || !state.active {
        return DaySchedule {
            barber_id: state.id,
            date,
            duration_min,
            verdict: DayVerdict::NoShiftToday,
            slots: Vec::new(),
        };
    }

    let busy = day_busy(state, shop_blocks, date, now, min_start);

    let mut slots = Vec::new();
    for window in &windows {
        for start in slot_grid(window, duration_min, granularity_min) {
            let candidate = Span::new(start, start + Duration::minutes(duration_min));
            slots.push(Slot {
                start,
                available: !intersects_any(&busy, &candidate),
            });
        }
    }

    let verdict = if slots.iter().any(|s| s.available) {
        DayVerdict::Bookable
    } else {
        // Shifts exist, but no candidate has enough remaining free time.
        DayVerdict::InsufficientRemainingTime
    };

    DaySchedule {
        barber_id: state.id,
        date,
        duration_min,
        verdict,
        slots,
    }
}

/// Raw free intervals for a barber over an arbitrary query window: shift
/// windows minus breaks, blocks and active appointments. Used by walk-in
/// flows that want gaps instead of a slot grid.
pub fn free_windows(
    state: &BarberState,
    shop_blocks: &[Block],
    query: &Span,
    now: NaiveDateTime,
    min_start: NaiveDateTime,
) -> Vec<Span> {
    if !state.active {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut date = query.start.date();
    let last = query.end.date();
    while date <= last {
        let weekday = weekday_index(date);
        let mut windows: Vec<Span> = state
            .shifts_for(weekday)
            .filter_map(|s| s.window_on(date).clamp_to(query))
            .collect();
        windows.sort_by_key(|w| w.start);

        if !windows.is_empty() {
            let busy = day_busy(state, shop_blocks, date, now, min_start);
            out.extend(subtract_intervals(&windows, &busy));
        }
        date = date + chrono::Days::new(1);
    }
    out
}

/// Everything that makes time unavailable on `date`, merged into disjoint
/// sorted spans: shift breaks, barber and shop-wide blocks, active book
/// entries, and the `[day start, min_start)` lead-time cutoff.
fn day_busy(
    state: &BarberState,
    shop_blocks: &[Block],
    date: NaiveDate,
    now: NaiveDateTime,
    min_start: NaiveDateTime,
) -> Vec<Span> {
    let day = Span::whole_day(date);
    let mut busy: Vec<Span> = Vec::new();

    for shift in state.shifts_for(weekday_index(date)) {
        if let Some(b) = shift.break_on(date) {
            busy.push(b);
        }
    }
    for block in state.blocks_over(&day) {
        if let Some(clamped) = block.span.clamp_to(&day) {
            busy.push(clamped);
        }
    }
    for block in shop_blocks {
        if let Some(clamped) = block.span.clamp_to(&day) {
            busy.push(clamped);
        }
    }
    for entry in state.overlapping(&day) {
        if entry.status.blocks_at(now)
            && let Some(clamped) = entry.span.clamp_to(&day) {
                busy.push(clamped);
            }
    }
    if min_start > day.start {
        busy.push(Span::new(day.start, min_start.min(day.end)));
    }

    busy.sort_by_key(|s| s.start);
    merge_overlapping(&busy)
}

/// Candidate start times for one shift window: `granularity_min` steps from
/// the window start, up to `window.end - duration` inclusive. The boundary
/// candidate is always offered even when it falls off the grid, so the last
/// minutes of a shift stay sellable.
pub fn slot_grid(window: &Span, duration_min: Minutes, granularity_min: Minutes) -> Vec<NaiveDateTime> {
    let mut out = Vec::new();
    if duration_min <= 0 || granularity_min <= 0 {
        return out;
    }
    let last = window.end - Duration::minutes(duration_min);
    if last < window.start {
        return out; // window shorter than the appointment
    }
    let mut t = window.start;
    while t <= last {
        out.push(t);
        t += Duration::minutes(granularity_min);
    }
    if let Some(&tail) = out.last()
        && tail < last {
            out.push(last);
        }
    out
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Subtract sorted `to_remove` intervals from sorted `base` intervals.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Whether `probe` intersects any span in a sorted, disjoint list.
fn intersects_any(sorted: &[Span], probe: &Span) -> bool {
    let i = sorted.partition_point(|s| s.end <= probe.start);
    sorted.get(i).is_some_and(|s| s.start < probe.end)
}
