mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{day_schedule, free_windows, merge_overlapping, slot_grid, subtract_intervals};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::ServiceCatalog;
use crate::config::ScheduleConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedBarberState = Arc<RwLock<BarberState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The scheduling engine: service catalog, per-barber calendar/ledger pages,
/// shop-wide blocks, WAL, and the notify hub. Holds no request state — all
/// mutation goes through the per-barber write guard and the WAL.
pub struct Engine {
    pub barbers: DashMap<Ulid, SharedBarberState>,
    pub shop_blocks: Arc<RwLock<Vec<Block>>>,
    pub catalog: ServiceCatalog,
    pub config: ScheduleConfig,
    pub notify: Arc<NotifyHub>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: entity (shift/block/appointment) id → barber id.
    pub(super) entity_to_barber: DashMap<Ulid, Ulid>,
}

/// Apply a barber-scoped event directly to a BarberState (no locking — the
/// caller holds the lock).
fn apply_to_barber(state: &mut BarberState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BarberRetired { .. } => {
            state.active = false;
        }
        Event::ShiftAssigned {
            id,
            barber_id,
            weekday,
            start,
            end,
            break_start,
            break_end,
        } => {
            state.shifts.push(Shift {
                id: *id,
                weekday: *weekday,
                start: *start,
                end: *end,
                break_start: *break_start,
                break_end: *break_end,
            });
            state.shifts.sort_by_key(|s| (s.weekday, s.start));
            entity_map.insert(*id, *barber_id);
        }
        Event::ShiftRemoved { id, .. } => {
            state.shifts.retain(|s| s.id != *id);
            entity_map.remove(id);
        }
        Event::BlockAdded { id, barber_id, span } => {
            if let Some(barber_id) = barber_id {
                state.insert_block(Block {
                    id: *id,
                    barber_id: Some(*barber_id),
                    span: *span,
                });
                entity_map.insert(*id, *barber_id);
            }
        }
        Event::BlockRemoved { id, .. } => {
            state.remove_block(*id);
            entity_map.remove(id);
        }
        Event::AppointmentRequested {
            id,
            barber_id,
            span,
            service_ids,
            price_cents,
            customer,
            notes,
            expires_at,
        } => {
            state.insert_entry(BookEntry {
                id: *id,
                span: *span,
                service_ids: service_ids.clone(),
                price_cents: *price_cents,
                customer: customer.clone(),
                notes: notes.clone(),
                status: AppointmentStatus::Pending {
                    expires_at: *expires_at,
                },
            });
            entity_map.insert(*id, *barber_id);
        }
        Event::AppointmentBooked {
            id,
            barber_id,
            span,
            service_ids,
            price_cents,
            customer,
            notes,
        } => {
            state.insert_entry(BookEntry {
                id: *id,
                span: *span,
                service_ids: service_ids.clone(),
                price_cents: *price_cents,
                customer: customer.clone(),
                notes: notes.clone(),
                status: AppointmentStatus::Confirmed,
            });
            entity_map.insert(*id, *barber_id);
        }
        Event::AppointmentConfirmed { id, .. } => {
            if let Some(entry) = state.entry_mut(*id) {
                entry.status = AppointmentStatus::Confirmed;
            }
        }
        Event::AppointmentCompleted { id, .. } => {
            if let Some(entry) = state.entry_mut(*id) {
                entry.status = AppointmentStatus::Completed;
            }
        }
        Event::AppointmentCancelled { id, .. } => {
            state.remove_entry(*id);
            entity_map.remove(id);
        }
        // Catalog, registration and shop-wide events are handled at the
        // Engine level, not here.
        Event::ServiceDefined { .. }
        | Event::ServiceRetired { .. }
        | Event::BarberRegistered { .. } => {}
    }
}

impl Engine {
    /// Open the engine: replay the WAL into fresh stores and start the
    /// group-commit writer. Must run inside a tokio runtime.
    pub fn open(
        wal_path: PathBuf,
        config: ScheduleConfig,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            barbers: DashMap::new(),
            shop_blocks: Arc::new(RwLock::new(Vec::new())),
            catalog: ServiceCatalog::new(),
            config,
            notify,
            wal_tx,
            entity_to_barber: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/
        // try_write always succeed instantly (no contention). Never use
        // blocking_read/blocking_write here because this may run inside an
        // async context.
        for event in &events {
            match event {
                Event::ServiceDefined {
                    id,
                    name,
                    duration_min,
                    price_cents,
                } => {
                    engine.catalog.upsert(Service {
                        id: *id,
                        name: name.clone(),
                        duration_min: *duration_min,
                        price_cents: *price_cents,
                        active: true,
                    });
                }
                Event::ServiceRetired { id } => {
                    engine.catalog.retire(id);
                }
                Event::BarberRegistered { id, name } => {
                    let state = BarberState::new(*id, name.clone());
                    engine.barbers.insert(*id, Arc::new(RwLock::new(state)));
                }
                Event::BlockAdded {
                    id,
                    barber_id: None,
                    span,
                } => {
                    engine
                        .shop_blocks
                        .try_write()
                        .expect("replay: uncontended write")
                        .push(Block {
                            id: *id,
                            barber_id: None,
                            span: *span,
                        });
                }
                Event::BlockRemoved {
                    id,
                    barber_id: None,
                } => {
                    engine
                        .shop_blocks
                        .try_write()
                        .expect("replay: uncontended write")
                        .retain(|b| b.id != *id);
                }
                other => {
                    if let Some(barber_id) = event_barber_id(other)
                        && let Some(entry) = engine.barbers.get(&barber_id) {
                            let state_arc = entry.clone();
                            let mut guard =
                                state_arc.try_write().expect("replay: uncontended write");
                            apply_to_barber(&mut guard, other, &engine.entity_to_barber);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn barber(&self, id: &Ulid) -> Option<SharedBarberState> {
        self.barbers.get(id).map(|e| e.value().clone())
    }

    pub fn barber_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_barber.get(entity_id).map(|e| *e.value())
    }

    /// Current shop-local wall clock time.
    pub fn now_local(&self) -> chrono::NaiveDateTime {
        self.config.now_local()
    }

    /// WAL-append + apply + notify in one call, under the caller's guard.
    pub(super) async fn persist_and_apply(
        &self,
        barber_id: Ulid,
        state: &mut BarberState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_barber(state, event, &self.entity_to_barber);
        self.notify.send(barber_id, event);
        Ok(())
    }

    /// Lookup entity → barber, get the page, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<BarberState>), EngineError> {
        let barber_id = self
            .barber_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let state = self
            .barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let guard = state.write_owned().await;
        Ok((barber_id, guard))
    }
}

/// Extract the owning barber id from a barber-scoped event.
fn event_barber_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ShiftAssigned { barber_id, .. }
        | Event::ShiftRemoved { barber_id, .. }
        | Event::AppointmentRequested { barber_id, .. }
        | Event::AppointmentBooked { barber_id, .. }
        | Event::AppointmentConfirmed { barber_id, .. }
        | Event::AppointmentCompleted { barber_id, .. }
        | Event::AppointmentCancelled { barber_id, .. } => Some(*barber_id),
        Event::BlockAdded { barber_id, .. } | Event::BlockRemoved { barber_id, .. } => *barber_id,
        Event::BarberRetired { id } => Some(*id),
        Event::ServiceDefined { .. }
        | Event::ServiceRetired { .. }
        | Event::BarberRegistered { .. } => None,
    }
}
