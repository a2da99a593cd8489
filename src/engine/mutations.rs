use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{blocked, check_no_conflict, validate_span, within_shift};
use super::{Engine, EngineError, WalCommand};

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::LimitExceeded("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_customer(customer: &Customer) -> Result<(), EngineError> {
    if customer.phone.is_empty() {
        return Err(EngineError::LimitExceeded("customer phone required"));
    }
    if customer.phone.len() > MAX_PHONE_LEN {
        return Err(EngineError::LimitExceeded("customer phone too long"));
    }
    if let Some(ref name) = customer.name
        && name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("customer name too long"));
        }
    if let Some(ref email) = customer.email
        && email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("customer email too long"));
        }
    Ok(())
}

impl Engine {
    // ── Catalog administration ───────────────────────────

    /// Define or replace a service. Edits apply prospectively only —
    /// committed appointments keep their frozen duration and price.
    pub async fn define_service(
        &self,
        id: Ulid,
        name: String,
        duration_min: u32,
        price_cents: u32,
    ) -> Result<(), EngineError> {
        validate_name(&name)?;
        if duration_min == 0 || duration_min as Minutes > MAX_APPOINTMENT_MIN {
            return Err(EngineError::LimitExceeded("service duration out of range"));
        }
        if !self.catalog.contains(&id) && self.catalog.len() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }

        let event = Event::ServiceDefined {
            id,
            name: name.clone(),
            duration_min,
            price_cents,
        };
        self.wal_append(&event).await?;
        self.catalog.upsert(Service {
            id,
            name,
            duration_min,
            price_cents,
            active: true,
        });
        self.notify.send(Ulid::nil(), &event);
        Ok(())
    }

    pub async fn retire_service(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.catalog.contains(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::ServiceRetired { id };
        self.wal_append(&event).await?;
        self.catalog.retire(&id);
        self.notify.send(Ulid::nil(), &event);
        Ok(())
    }

    // ── Roster administration ────────────────────────────

    pub async fn register_barber(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        validate_name(&name)?;
        if self.barbers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.barbers.len() >= MAX_BARBERS {
            return Err(EngineError::LimitExceeded("too many barbers"));
        }

        let event = Event::BarberRegistered {
            id,
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        self.barbers
            .insert(id, Arc::new(RwLock::new(BarberState::new(id, name))));
        metrics::gauge!(crate::observability::BARBERS_ACTIVE).set(self.barbers.len() as f64);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Retire a barber. The page (shifts, blocks, book) is kept for history;
    /// availability and new bookings stop immediately.
    pub async fn retire_barber(&self, id: Ulid) -> Result<(), EngineError> {
        let state = self.barber(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = state.write().await;
        let event = Event::BarberRetired { id };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn assign_shift(
        &self,
        id: Ulid,
        barber_id: Ulid,
        weekday: u8,
        start: NaiveTime,
        end: NaiveTime,
        break_start: Option<NaiveTime>,
        break_end: Option<NaiveTime>,
    ) -> Result<(), EngineError> {
        if weekday > 6 {
            return Err(EngineError::LimitExceeded("weekday out of range"));
        }
        if start >= end {
            return Err(EngineError::LimitExceeded("shift start must precede end"));
        }
        match (break_start, break_end) {
            (None, None) => {}
            (Some(bs), Some(be)) => {
                if bs >= be || bs < start || be > end {
                    return Err(EngineError::LimitExceeded("break must lie inside the shift"));
                }
            }
            _ => return Err(EngineError::LimitExceeded("break needs both ends")),
        }

        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let mut guard = state.write().await;
        if guard.shifts.len() >= MAX_SHIFTS_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many shifts for barber"));
        }
        if let Some(existing) = guard
            .shifts_for(weekday)
            .find(|s| start < s.end && s.start < end)
        {
            return Err(EngineError::AlreadyExists(existing.id));
        }

        let event = Event::ShiftAssigned {
            id,
            barber_id,
            weekday,
            start,
            end,
            break_start,
            break_end,
        };
        self.persist_and_apply(barber_id, &mut guard, &event).await
    }

    pub async fn remove_shift(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.shifts.iter().any(|s| s.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::ShiftRemoved { id, barber_id };
        self.persist_and_apply(barber_id, &mut guard, &event).await?;
        Ok(barber_id)
    }

    /// Add a blackout. `barber_id = None` blocks the whole shop. Existing
    /// appointments under the block are untouched — the admin resolves those
    /// separately; the block only stops new bookings.
    pub async fn add_block(
        &self,
        id: Ulid,
        barber_id: Option<Ulid>,
        span: Span,
    ) -> Result<(), EngineError> {
        validate_span(&span, MAX_BLOCK_MIN)?;
        match barber_id {
            Some(barber_id) => {
                let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
                let mut guard = state.write().await;
                if guard.blocks.len() >= MAX_BLOCKS_PER_SCOPE {
                    return Err(EngineError::LimitExceeded("too many blocks for barber"));
                }
                let event = Event::BlockAdded {
                    id,
                    barber_id: Some(barber_id),
                    span,
                };
                self.persist_and_apply(barber_id, &mut guard, &event).await
            }
            None => {
                let mut shop = self.shop_blocks.write().await;
                if shop.len() >= MAX_BLOCKS_PER_SCOPE {
                    return Err(EngineError::LimitExceeded("too many shop-wide blocks"));
                }
                let event = Event::BlockAdded {
                    id,
                    barber_id: None,
                    span,
                };
                self.wal_append(&event).await?;
                shop.push(Block {
                    id,
                    barber_id: None,
                    span,
                });
                self.notify.send(Ulid::nil(), &event);
                Ok(())
            }
        }
    }

    pub async fn remove_block(&self, id: Ulid) -> Result<(), EngineError> {
        if let Some(barber_id) = self.barber_for_entity(&id) {
            let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
            let mut guard = state.write().await;
            if !guard.blocks.iter().any(|b| b.id == id) {
                return Err(EngineError::NotFound(id));
            }
            let event = Event::BlockRemoved {
                id,
                barber_id: Some(barber_id),
            };
            return self.persist_and_apply(barber_id, &mut guard, &event).await;
        }

        let mut shop = self.shop_blocks.write().await;
        if !shop.iter().any(|b| b.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BlockRemoved {
            id,
            barber_id: None,
        };
        self.wal_append(&event).await?;
        shop.retain(|b| b.id != id);
        self.notify.send(Ulid::nil(), &event);
        Ok(())
    }

    // ── Booking Transaction Coordinator ──────────────────

    /// Book and confirm in one atomic step. Duration and price are
    /// recomputed from the catalog and frozen on the appointment; the slot
    /// is re-validated and inserted under the barber's write guard, closing
    /// the race against the availability query.
    pub async fn commit_booking(
        &self,
        id: Ulid,
        barber_id: Ulid,
        start: NaiveDateTime,
        service_ids: &[Ulid],
        customer: Customer,
        notes: Option<String>,
    ) -> Result<AppointmentInfo, EngineError> {
        self.place_appointment(id, barber_id, start, service_ids, customer, notes, false)
            .await
    }

    /// Book without confirming: the appointment holds its slot for
    /// `pending_ttl_min`, then the reaper releases it. Used by flows where a
    /// human (or the AI assistant) confirms later.
    pub async fn request_booking(
        &self,
        id: Ulid,
        barber_id: Ulid,
        start: NaiveDateTime,
        service_ids: &[Ulid],
        customer: Customer,
        notes: Option<String>,
    ) -> Result<AppointmentInfo, EngineError> {
        self.place_appointment(id, barber_id, start, service_ids, customer, notes, true)
            .await
    }

    async fn place_appointment(
        &self,
        id: Ulid,
        barber_id: Ulid,
        start: NaiveDateTime,
        service_ids: &[Ulid],
        customer: Customer,
        notes: Option<String>,
        pending: bool,
    ) -> Result<AppointmentInfo, EngineError> {
        if service_ids.len() > MAX_SERVICES_PER_APPOINTMENT {
            return Err(EngineError::LimitExceeded("too many services in one appointment"));
        }
        validate_customer(&customer)?;
        if let Some(ref n) = notes
            && n.len() > MAX_NOTES_LEN {
                return Err(EngineError::LimitExceeded("notes too long"));
            }

        // Recompute and freeze duration and price from the current catalog.
        let duration_min = self.catalog.total_duration(service_ids)?;
        let price_cents = self.catalog.total_price(service_ids)?;
        let span = Span::new(start, start + Duration::minutes(duration_min));
        validate_span(&span, MAX_APPOINTMENT_MIN)?;

        let now = self.now_local();

        // Abuse guard, checked before the page lock: it reads other barbers'
        // pages and must not nest inside a write guard. Racy by design — the
        // cap is advisory, the no-overlap invariant is not.
        let active = self.active_appointments_for_phone(&customer.phone, now);
        let max = self.config.max_active_per_customer;
        if active >= max {
            return Err(EngineError::ReservationLimit { active, max });
        }

        let state = self.barber(&barber_id).ok_or(EngineError::NotFound(barber_id))?;
        let mut guard = state.write().await;
        if !guard.active {
            return Err(EngineError::NotFound(barber_id));
        }
        if guard.book.len() >= MAX_ENTRIES_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many appointments for barber"));
        }

        // Re-validation under the write guard: the slot must still be in a
        // shift, unblocked, not in the past, and conflict-free.
        if span.start < now + Duration::minutes(self.config.lead_time_min) {
            return Err(EngineError::SlotNoLongerAvailable);
        }
        if !within_shift(&guard, &span) {
            return Err(EngineError::SlotNoLongerAvailable);
        }
        {
            let shop = self.shop_blocks.read().await;
            if blocked(&guard, &shop, &span) {
                return Err(EngineError::SlotNoLongerAvailable);
            }
        }
        if let Err(conflict) = check_no_conflict(&guard, &span, now) {
            tracing::debug!("booking {id} lost to {}", conflict.0);
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotNoLongerAvailable);
        }

        let event = if pending {
            Event::AppointmentRequested {
                id,
                barber_id,
                span,
                service_ids: service_ids.to_vec(),
                price_cents,
                customer,
                notes,
                expires_at: now + Duration::minutes(self.config.pending_ttl_min),
            }
        } else {
            Event::AppointmentBooked {
                id,
                barber_id,
                span,
                service_ids: service_ids.to_vec(),
                price_cents,
                customer,
                notes,
            }
        };
        self.persist_and_apply(barber_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);

        let entry = guard.entry(id).ok_or(EngineError::NotFound(id))?;
        Ok(AppointmentInfo::from_entry(barber_id, entry))
    }

    /// Promote a pending appointment to confirmed. Confirming an already
    /// confirmed or completed appointment is a no-op; a pending one whose
    /// hold expired must be re-booked.
    pub async fn confirm_appointment(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        let entry = guard.entry(id).ok_or(EngineError::NotFound(id))?;
        match entry.status {
            AppointmentStatus::Pending { expires_at } => {
                if expires_at <= self.now_local() {
                    return Err(EngineError::SlotNoLongerAvailable);
                }
            }
            AppointmentStatus::Confirmed | AppointmentStatus::Completed => return Ok(barber_id),
        }
        let event = Event::AppointmentConfirmed { id, barber_id };
        self.persist_and_apply(barber_id, &mut guard, &event).await?;
        Ok(barber_id)
    }

    /// Mark a confirmed appointment served. The entry stays in the book for
    /// the POS collaborator but stops holding its interval.
    pub async fn complete_appointment(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        let entry = guard.entry(id).ok_or(EngineError::NotFound(id))?;
        match entry.status {
            AppointmentStatus::Confirmed => {}
            AppointmentStatus::Completed => return Ok(barber_id),
            AppointmentStatus::Pending { .. } => return Err(EngineError::NotConfirmed(id)),
        }
        let event = Event::AppointmentCompleted { id, barber_id };
        self.persist_and_apply(barber_id, &mut guard, &event).await?;
        Ok(barber_id)
    }

    /// Cancel an appointment, releasing its interval back to availability.
    pub async fn cancel_appointment(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.entry(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::AppointmentCancelled { id, barber_id };
        self.persist_and_apply(barber_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        Ok(barber_id)
    }

    /// Pending appointments whose hold has expired, as (appointment, barber)
    /// pairs. Pages locked by writers are skipped — the next sweep gets them.
    pub fn collect_expired_pending(&self, now: NaiveDateTime) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.barbers.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                for e in &guard.book {
                    if let AppointmentStatus::Pending { expires_at } = e.status
                        && expires_at <= now {
                            expired.push((e.id, guard.id));
                        }
                }
            }
        }
        expired
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate current state. Retired services are dropped — book entries
    /// carry frozen duration/price and never read the catalog again.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for service in self.catalog.list() {
            if service.active {
                events.push(Event::ServiceDefined {
                    id: service.id,
                    name: service.name,
                    duration_min: service.duration_min,
                    price_cents: service.price_cents,
                });
            }
        }

        for block in self.shop_blocks.read().await.iter() {
            events.push(Event::BlockAdded {
                id: block.id,
                barber_id: None,
                span: block.span,
            });
        }

        let barber_ids: Vec<Ulid> = self.barbers.iter().map(|e| *e.key()).collect();
        for barber_id in barber_ids {
            let Some(state) = self.barber(&barber_id) else {
                continue;
            };
            let guard = state.read().await;

            events.push(Event::BarberRegistered {
                id: guard.id,
                name: guard.name.clone(),
            });
            if !guard.active {
                events.push(Event::BarberRetired { id: guard.id });
            }
            for shift in &guard.shifts {
                events.push(Event::ShiftAssigned {
                    id: shift.id,
                    barber_id: guard.id,
                    weekday: shift.weekday,
                    start: shift.start,
                    end: shift.end,
                    break_start: shift.break_start,
                    break_end: shift.break_end,
                });
            }
            for block in &guard.blocks {
                events.push(Event::BlockAdded {
                    id: block.id,
                    barber_id: Some(guard.id),
                    span: block.span,
                });
            }
            for entry in &guard.book {
                match entry.status {
                    AppointmentStatus::Pending { expires_at } => {
                        events.push(Event::AppointmentRequested {
                            id: entry.id,
                            barber_id: guard.id,
                            span: entry.span,
                            service_ids: entry.service_ids.clone(),
                            price_cents: entry.price_cents,
                            customer: entry.customer.clone(),
                            notes: entry.notes.clone(),
                            expires_at,
                        });
                    }
                    AppointmentStatus::Confirmed | AppointmentStatus::Completed => {
                        events.push(Event::AppointmentBooked {
                            id: entry.id,
                            barber_id: guard.id,
                            span: entry.span,
                            service_ids: entry.service_ids.clone(),
                            price_cents: entry.price_cents,
                            customer: entry.customer.clone(),
                            notes: entry.notes.clone(),
                        });
                        if entry.status == AppointmentStatus::Completed {
                            events.push(Event::AppointmentCompleted {
                                id: entry.id,
                                barber_id: guard.id,
                            });
                        }
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
