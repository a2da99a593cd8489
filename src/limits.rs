//! Hard bounds on inputs. These are not tunables — they bound memory and
//! WAL entry size against hostile or buggy callers.

use crate::model::Minutes;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_EMAIL_LEN: usize = 254;

pub const MAX_SERVICES: usize = 1024;
pub const MAX_BARBERS: usize = 256;
pub const MAX_SERVICES_PER_APPOINTMENT: usize = 8;
pub const MAX_SHIFTS_PER_BARBER: usize = 28;
pub const MAX_BLOCKS_PER_SCOPE: usize = 4096;
pub const MAX_ENTRIES_PER_BARBER: usize = 50_000;

/// Longest single appointment (aggregated across services).
pub const MAX_APPOINTMENT_MIN: Minutes = 12 * 60;
/// Longest single block.
pub const MAX_BLOCK_MIN: Minutes = 366 * 24 * 60;

pub const MAX_QUERY_WINDOW_DAYS: i64 = 92;

pub const MIN_GRANULARITY_MIN: Minutes = 5;
pub const MAX_GRANULARITY_MIN: Minutes = 240;

/// Accepted year range for any datetime entering the engine.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;
