use chrono::NaiveDateTime;

use crate::model::Minutes;

/// Engine configuration. Timezone handling and the blocked-interval scope
/// are explicit here rather than inferred defaults.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Shop-local offset from UTC, in minutes. All shifts, blocks and
    /// appointment spans are interpreted in this local time.
    pub utc_offset_min: i32,
    /// Slots starting earlier than `now + lead_time_min` are never offered.
    pub lead_time_min: Minutes,
    /// Grid step used when the caller doesn't pass one.
    pub default_granularity_min: Minutes,
    /// How long a pending (unconfirmed) appointment holds its slot.
    pub pending_ttl_min: Minutes,
    /// Max simultaneous future pending/confirmed appointments per customer
    /// phone. Stops one caller from hoarding the calendar.
    pub max_active_per_customer: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_min: 0,
            lead_time_min: 0,
            default_granularity_min: 30,
            pending_ttl_min: 15,
            max_active_per_customer: 5,
        }
    }
}

impl ScheduleConfig {
    /// Read configuration from `TURNOS_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }
        let d = Self::default();
        Self {
            utc_offset_min: var("TURNOS_UTC_OFFSET_MIN", d.utc_offset_min),
            lead_time_min: var("TURNOS_LEAD_TIME_MIN", d.lead_time_min),
            default_granularity_min: var("TURNOS_GRANULARITY_MIN", d.default_granularity_min),
            pending_ttl_min: var("TURNOS_PENDING_TTL_MIN", d.pending_ttl_min),
            max_active_per_customer: var("TURNOS_MAX_ACTIVE_PER_CUSTOMER", d.max_active_per_customer),
        }
    }

    /// Current shop-local wall clock time.
    pub fn now_local(&self) -> NaiveDateTime {
        (chrono::Utc::now() + chrono::Duration::minutes(self.utc_offset_min as i64)).naive_utc()
    }
}
