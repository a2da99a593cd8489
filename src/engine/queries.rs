use chrono::{Duration, NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::{Engine, EngineError};

impl Engine {
    /// The Availability Calculator entry point: ordered candidate slots for
    /// `date`, for an appointment aggregating `service_ids`, stepped at
    /// `granularity_min`.
    ///
    /// Reads are optimistic — no serialization with concurrent commits. A
    /// stale answer is reconciled by `commit_booking`'s re-validation.
    pub async fn compute_slots(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        service_ids: &[Ulid],
        granularity_min: Minutes,
    ) -> Result<DaySchedule, EngineError> {
        if !(MIN_GRANULARITY_MIN..=MAX_GRANULARITY_MIN).contains(&granularity_min) {
            return Err(EngineError::LimitExceeded("granularity out of range"));
        }
        if service_ids.len() > MAX_SERVICES_PER_APPOINTMENT {
            return Err(EngineError::LimitExceeded("too many services in one appointment"));
        }
        let duration_min = self.catalog.total_duration(service_ids)?;

        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.read().await;
        let shop = self.shop_blocks.read().await;

        let now = self.now_local();
        let min_start = now + Duration::minutes(self.config.lead_time_min);

        metrics::counter!(crate::observability::SLOT_QUERIES_TOTAL).increment(1);
        Ok(availability::day_schedule(
            &guard,
            &shop,
            date,
            duration_min,
            granularity_min,
            now,
            min_start,
        ))
    }

    /// Raw free gaps over a window — walk-in flows want gaps, not a grid.
    pub async fn free_windows(
        &self,
        barber_id: Ulid,
        query: Span,
    ) -> Result<Vec<Span>, EngineError> {
        check_query_window(&query)?;
        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.read().await;
        let shop = self.shop_blocks.read().await;

        let now = self.now_local();
        let min_start = now + Duration::minutes(self.config.lead_time_min);
        Ok(availability::free_windows(&guard, &shop, &query, now, min_start))
    }

    /// Appointments overlapping `query`, in start order. All statuses are
    /// returned; callers filter on `info.status` (the POS reads confirmed
    /// and completed, the agenda reads pending too).
    pub async fn appointments_for(
        &self,
        barber_id: Ulid,
        query: Span,
    ) -> Result<Vec<AppointmentInfo>, EngineError> {
        check_query_window(&query)?;
        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.read().await;
        Ok(guard
            .overlapping(&query)
            .map(|e| AppointmentInfo::from_entry(barber_id, e))
            .collect())
    }

    pub async fn appointment(&self, id: Ulid) -> Result<AppointmentInfo, EngineError> {
        let barber_id = self
            .barber_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.read().await;
        let entry = guard.entry(id).ok_or(EngineError::NotFound(id))?;
        Ok(AppointmentInfo::from_entry(barber_id, entry))
    }

    pub fn list_barbers(&self) -> Vec<BarberInfo> {
        let mut out: Vec<BarberInfo> = self
            .barbers
            .iter()
            .map(|entry| {
                let state = entry.value().clone();
                let guard = state.try_read().expect("list_barbers: uncontended read");
                BarberInfo {
                    id: guard.id,
                    name: guard.name.clone(),
                    active: guard.active,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn shifts_of(&self, barber_id: Ulid) -> Result<Vec<Shift>, EngineError> {
        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.read().await;
        Ok(guard.shifts.clone())
    }

    /// Blocks for one barber (Some) or the shop-wide list (None).
    pub async fn list_blocks(&self, barber_id: Option<Ulid>) -> Result<Vec<Block>, EngineError> {
        match barber_id {
            Some(barber_id) => {
                let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
                let guard = state.read().await;
                Ok(guard.blocks.clone())
            }
            None => Ok(self.shop_blocks.read().await.clone()),
        }
    }

    /// Future pending/confirmed appointments held by a customer phone, across
    /// all barbers. Pages locked by writers are skipped, so the count can
    /// run low — acceptable for an abuse guard.
    pub fn active_appointments_for_phone(&self, phone: &str, now: NaiveDateTime) -> usize {
        let mut count = 0;
        for entry in self.barbers.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                count += guard
                    .book
                    .iter()
                    .filter(|e| {
                        e.customer.phone == phone && e.span.end > now && e.status.blocks_at(now)
                    })
                    .count();
            }
        }
        count
    }
}

fn check_query_window(query: &Span) -> Result<(), EngineError> {
    if query.start >= query.end {
        return Err(EngineError::LimitExceeded("span start must precede end"));
    }
    if query.minutes() > MAX_QUERY_WINDOW_DAYS * 24 * 60 {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}
