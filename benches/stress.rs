//! Latency stress harness driving the engine API directly: a fleet of
//! concurrent bookers hammering a handful of barbers, then availability
//! queries over the loaded book. Run with `cargo bench`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use turnos::config::ScheduleConfig;
use turnos::engine::{Engine, EngineError};
use turnos::model::Customer;
use turnos::notify::NotifyHub;

const BARBERS: usize = 8;
const BOOKERS_PER_BARBER: usize = 32;
const QUERIES: usize = 500;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("turnos_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("stress_{}.wal", Ulid::new()));
    let _ = std::fs::remove_file(&path);
    path
}

async fn setup(engine: &Engine) -> (Vec<Ulid>, Ulid) {
    let service = Ulid::new();
    engine
        .define_service(service, "Corte".into(), 45, 1500)
        .await
        .unwrap();

    let mut barbers = Vec::new();
    for i in 0..BARBERS {
        let id = Ulid::new();
        engine.register_barber(id, format!("B{i}")).await.unwrap();
        for weekday in 0..7 {
            engine
                .assign_shift(
                    Ulid::new(),
                    id,
                    weekday,
                    NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
                    None,
                    None,
                )
                .await
                .unwrap();
        }
        barbers.push(id);
    }
    println!("  created {} barbers", barbers.len());
    (barbers, service)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ScheduleConfig {
        max_active_per_customer: usize::MAX,
        ..ScheduleConfig::default()
    };
    let engine = Arc::new(
        Engine::open(bench_wal_path(), config, Arc::new(NotifyHub::new())).unwrap(),
    );

    println!("turnos stress bench");
    let (barbers, service) = setup(&engine).await;
    let week_start = NaiveDate::from_ymd_opt(2031, 6, 2).unwrap();

    // Phase 1: concurrent bookers. Slot starts step every 30 minutes but
    // the service runs 45, so adjacent candidates fight — roughly half the
    // commits exercise the conflict path.
    println!("phase 1: {} concurrent bookers", BARBERS * BOOKERS_PER_BARBER);
    let start = Instant::now();
    let mut handles = Vec::new();
    for (bi, &barber_id) in barbers.iter().enumerate() {
        for w in 0..BOOKERS_PER_BARBER {
            let eng = engine.clone();
            handles.push(tokio::spawn(async move {
                let mut latencies = Vec::new();
                let mut won = 0usize;
                let mut lost = 0usize;
                for k in 0..16usize {
                    let minute = ((w * 16 + k) * 30) as i64;
                    let day = week_start + chrono::Days::new((minute / (24 * 60)) as u64);
                    let slot = day.and_hms_opt(0, 0, 0).unwrap()
                        + chrono::Duration::minutes(minute % (24 * 60));
                    let t0 = Instant::now();
                    let result = eng
                        .commit_booking(
                            Ulid::new(),
                            barber_id,
                            slot,
                            &[service],
                            Customer {
                                phone: format!("555-{bi:02}{w:02}"),
                                name: None,
                                email: None,
                            },
                            None,
                        )
                        .await;
                    latencies.push(t0.elapsed());
                    match result {
                        Ok(_) => won += 1,
                        Err(EngineError::SlotNoLongerAvailable) => lost += 1,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                (latencies, won, lost)
            }));
        }
    }

    let mut commit_latencies = Vec::new();
    let mut total_won = 0;
    let mut total_lost = 0;
    for h in handles {
        let (lat, won, lost) = h.await.unwrap();
        commit_latencies.extend(lat);
        total_won += won;
        total_lost += lost;
    }
    println!(
        "  committed {total_won}, conflicts {total_lost}, wall {:.2}s",
        start.elapsed().as_secs_f64()
    );
    print_latency("commit_booking", &mut commit_latencies);

    // Phase 2: availability queries over the loaded book.
    println!("phase 2: {QUERIES} availability queries");
    let mut query_latencies = Vec::new();
    for i in 0..QUERIES {
        let barber_id = barbers[i % barbers.len()];
        let date = week_start + chrono::Days::new((i % 7) as u64);
        let t0 = Instant::now();
        engine
            .compute_slots(barber_id, date, &[service], 15)
            .await
            .unwrap();
        query_latencies.push(t0.elapsed());
    }
    print_latency("compute_slots", &mut query_latencies);
}
