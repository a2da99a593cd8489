use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole minutes — the only duration unit.
pub type Minutes = i64;

/// Weekday index of a date, 0 = Monday … 6 = Sunday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Midnight at the start of `date`.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Midnight at the end of `date` (start of the next day).
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    day_start(date + chrono::Days::new(1))
}

/// Half-open interval `[start, end)` in shop-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn minutes(&self) -> Minutes {
        self.end.signed_duration_since(self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `window`, or None when they don't overlap.
    pub fn clamp_to(&self, window: &Span) -> Option<Span> {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        (start < end).then(|| Span::new(start, end))
    }

    /// The whole of `date` as a span.
    pub fn whole_day(date: NaiveDate) -> Span {
        Span::new(day_start(date), day_end(date))
    }
}

/// A bookable service from the shop's menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_min: u32,
    /// Minor currency units.
    pub price_cents: u32,
    pub active: bool,
}

/// A recurring weekly working interval for a barber.
///
/// Weekday 0 = Monday … 6 = Sunday. Times are timezone-naive shop-local;
/// the shop's UTC offset lives in `ScheduleConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Ulid,
    pub weekday: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Optional mid-shift break, e.g. lunch. Must lie inside the shift.
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
}

impl Shift {
    /// Concrete working window on `date`. The caller is responsible for
    /// matching `date`'s weekday against `self.weekday`.
    pub fn window_on(&self, date: NaiveDate) -> Span {
        Span::new(date.and_time(self.start), date.and_time(self.end))
    }

    pub fn break_on(&self, date: NaiveDate) -> Option<Span> {
        match (self.break_start, self.break_end) {
            (Some(bs), Some(be)) if bs < be => {
                Some(Span::new(date.and_time(bs), date.and_time(be)))
            }
            _ => None,
        }
    }
}

/// An administrator-defined interval during which no bookings are allowed.
/// `barber_id = None` means the block applies shop-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: Ulid,
    pub barber_id: Option<Ulid>,
    pub span: Span,
}

/// Who booked. Phone is the customer identity; name and email are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    /// Requested but not yet confirmed. Holds its interval until it expires.
    Pending { expires_at: NaiveDateTime },
    Confirmed,
    /// Served and charged. Kept for the POS collaborator; no longer holds
    /// its interval.
    Completed,
}

impl AppointmentStatus {
    /// Whether this entry still holds its interval against new bookings.
    pub fn blocks_at(&self, now: NaiveDateTime) -> bool {
        match self {
            AppointmentStatus::Pending { expires_at } => *expires_at > now,
            AppointmentStatus::Confirmed => true,
            AppointmentStatus::Completed => false,
        }
    }
}

/// One appointment in a barber's book. Duration and price are frozen at
/// booking time — later catalog edits never touch existing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub id: Ulid,
    pub span: Span,
    pub service_ids: Vec<Ulid>,
    pub price_cents: u32,
    pub customer: Customer,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

/// Per-barber page: shifts, barber-scoped blocks, and the appointment book,
/// all guarded by one lock so commit-time re-validation and the insert are a
/// single atomic step.
#[derive(Debug, Clone)]
pub struct BarberState {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
    pub shifts: Vec<Shift>,
    /// Barber-scoped blocks, sorted by `span.start`.
    pub blocks: Vec<Block>,
    /// Appointment entries, sorted by `span.start`.
    pub book: Vec<BookEntry>,
}

impl BarberState {
    pub fn new(id: Ulid, name: String) -> Self {
        Self {
            id,
            name,
            active: true,
            shifts: Vec::new(),
            blocks: Vec::new(),
            book: Vec::new(),
        }
    }

    pub fn shifts_for(&self, weekday: u8) -> impl Iterator<Item = &Shift> {
        self.shifts.iter().filter(move |s| s.weekday == weekday)
    }

    /// Insert entry maintaining sort order by span.start.
    pub fn insert_entry(&mut self, entry: BookEntry) {
        let pos = self
            .book
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.book.insert(pos, entry);
    }

    pub fn remove_entry(&mut self, id: Ulid) -> Option<BookEntry> {
        if let Some(pos) = self.book.iter().position(|e| e.id == id) {
            Some(self.book.remove(pos))
        } else {
            None
        }
    }

    pub fn entry(&self, id: Ulid) -> Option<&BookEntry> {
        self.book.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: Ulid) -> Option<&mut BookEntry> {
        self.book.iter_mut().find(|e| e.id == id)
    }

    /// Return only entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &BookEntry> {
        // Everything at index >= right_bound starts at or after query.end — can't overlap.
        let right_bound = self.book.partition_point(|e| e.span.start < query.end);
        self.book[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    /// Insert a barber-scoped block maintaining sort order by span.start.
    pub fn insert_block(&mut self, block: Block) {
        let pos = self
            .blocks
            .binary_search_by_key(&block.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.blocks.insert(pos, block);
    }

    pub fn remove_block(&mut self, id: Ulid) -> Option<Block> {
        if let Some(pos) = self.blocks.iter().position(|b| b.id == id) {
            Some(self.blocks.remove(pos))
        } else {
            None
        }
    }

    pub fn blocks_over(&self, query: &Span) -> impl Iterator<Item = &Block> {
        let right_bound = self.blocks.partition_point(|b| b.span.start < query.end);
        self.blocks[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types — flat, no nesting beyond value types. This is the WAL
/// record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceDefined {
        id: Ulid,
        name: String,
        duration_min: u32,
        price_cents: u32,
    },
    ServiceRetired {
        id: Ulid,
    },
    BarberRegistered {
        id: Ulid,
        name: String,
    },
    BarberRetired {
        id: Ulid,
    },
    ShiftAssigned {
        id: Ulid,
        barber_id: Ulid,
        weekday: u8,
        start: NaiveTime,
        end: NaiveTime,
        break_start: Option<NaiveTime>,
        break_end: Option<NaiveTime>,
    },
    ShiftRemoved {
        id: Ulid,
        barber_id: Ulid,
    },
    BlockAdded {
        id: Ulid,
        barber_id: Option<Ulid>,
        span: Span,
    },
    BlockRemoved {
        id: Ulid,
        barber_id: Option<Ulid>,
    },
    AppointmentRequested {
        id: Ulid,
        barber_id: Ulid,
        span: Span,
        service_ids: Vec<Ulid>,
        price_cents: u32,
        customer: Customer,
        notes: Option<String>,
        expires_at: NaiveDateTime,
    },
    AppointmentBooked {
        id: Ulid,
        barber_id: Ulid,
        span: Span,
        service_ids: Vec<Ulid>,
        price_cents: u32,
        customer: Customer,
        notes: Option<String>,
    },
    AppointmentConfirmed {
        id: Ulid,
        barber_id: Ulid,
    },
    AppointmentCompleted {
        id: Ulid,
        barber_id: Ulid,
    },
    AppointmentCancelled {
        id: Ulid,
        barber_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarberInfo {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentInfo {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub span: Span,
    pub service_ids: Vec<Ulid>,
    pub price_cents: u32,
    pub customer: Customer,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

impl AppointmentInfo {
    pub fn from_entry(barber_id: Ulid, entry: &BookEntry) -> Self {
        Self {
            id: entry.id,
            barber_id,
            span: entry.span,
            service_ids: entry.service_ids.clone(),
            price_cents: entry.price_cents,
            customer: entry.customer.clone(),
            notes: entry.notes.clone(),
            status: entry.status,
        }
    }
}

/// A candidate bookable start time. Derived at query time, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub available: bool,
}

/// Why a day has, or hasn't, bookable slots. `NoShiftToday` and
/// `InsufficientRemainingTime` are normal outcomes, not errors — the UI
/// tells them apart ("pick another day" vs "pick a shorter combination").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayVerdict {
    Bookable,
    NoShiftToday,
    InsufficientRemainingTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub barber_id: Ulid,
    pub date: NaiveDate,
    pub duration_min: Minutes,
    pub verdict: DayVerdict,
    pub slots: Vec<Slot>,
}
