//! turnos — appointment scheduling and availability engine for a barbershop.
//!
//! Given selected services, a barber and a date, computes bookable time
//! slots; rejects overlapping or blocked bookings; and serializes concurrent
//! commits per barber so no two active appointments ever overlap. State is
//! event-sourced to an append-only WAL and rebuilt on open.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;
