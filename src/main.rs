//! Base58 Vanity Address Generator CLI
//!
//! Usage:
//!   sol_vanity -p Sol              # Find an address starting with "Sol"
//!   sol_vanity -p xyz -t end       # Find an address ending with "xyz"
//!   sol_vanity -p Cafe -t anywhere -n 5 -c   # Find 5 containing "Cafe", case sensitive

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sol_vanity::matcher::difficulty_description;
use sol_vanity::sink::{ChannelSink, Delivery};
use sol_vanity::{Config, Engine, GenerationResult, Pattern, PoolStatus, SubmitOptions};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    let pattern = match Pattern::new(config.pattern.as_str(), config.position, config.case_sensitive) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Invalid pattern: {}", e);
            process::exit(1);
        }
    };

    let (sink, deliveries) = ChannelSink::new();
    let engine = match Engine::start(config.engine_config(), sink) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to start engine: {}", e);
            process::exit(1);
        }
    };

    let workers = engine.pool_status().workers;
    let estimate = engine.estimator().estimate(&pattern, workers.current);

    println!("Base58 Vanity Address Generator");
    println!("===============================");
    println!("Pattern:    {} ({})", pattern.text(), pattern.position());
    println!(
        "Difficulty: {} (~{} attempts)",
        difficulty_description(estimate.expected_attempts),
        format_number(estimate.expected_attempts as u64)
    );
    println!("Workers:    {} (up to {})", workers.current, workers.total);
    println!("Target:     {} address(es)", config.count);
    println!();

    let stop_flag = Arc::new(AtomicBool::new(false));
    ctrlc_handler(engine.clone(), stop_flag.clone());

    println!("Searching... (Press Ctrl+C to stop)\n");
    let started = Instant::now();

    let exit_code = if config.count == 1 {
        run_single(&engine, &config)
    } else {
        run_batch(&engine, &config, &deliveries, &stop_flag)
    };

    if stop_flag.load(Ordering::Relaxed) {
        println!("\nStopped by user.");
    }

    let status = engine.pool_status();
    print_final_stats(&status, started.elapsed());

    if config.status_json {
        match serde_json::to_string_pretty(status.as_ref()) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "Failed to serialize pool status"),
        }
    }

    engine.shutdown();
    process::exit(exit_code);
}

fn run_single(engine: &Engine, config: &Config) -> i32 {
    let options = SubmitOptions {
        case_sensitive: config.case_sensitive,
        position: config.position,
        ..SubmitOptions::default()
    };

    match engine.submit_generation(&config.pattern, "cli", options) {
        Ok(result) => {
            print_result(&result, 1);
            0
        }
        Err(e) => {
            eprintln!("Generation failed [{}]: {}", e.code(), e);
            1
        }
    }
}

fn run_batch(
    engine: &Engine,
    config: &Config,
    deliveries: &crossbeam_channel::Receiver<Delivery>,
    stop_flag: &AtomicBool,
) -> i32 {
    match engine.enqueue_batch(&config.pattern, config.count, config.position, config.case_sensitive) {
        Ok(admission) => println!(
            "Queued at position {} (estimated {:.1}s)\n",
            admission.queue_position,
            admission.estimated_time.as_secs_f64()
        ),
        Err(e) => {
            eprintln!("Batch rejected [{}]: {}", e.code(), e);
            return 1;
        }
    }

    let report_interval = Duration::from_secs(config.report_interval);
    let mut found = 0;

    loop {
        match deliveries.recv_timeout(report_interval) {
            Ok(delivery) => {
                found += 1;
                print_result(&delivery.result, found);
            }
            Err(RecvTimeoutError::Timeout) => print_progress(&engine.pool_status()),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let failed = engine.pool_status().stats.operations_failed;
        if batch_finished(found, failed, config.count) {
            break;
        }
        if stop_flag.load(Ordering::Relaxed) {
            while let Ok(delivery) = deliveries.try_recv() {
                found += 1;
                print_result(&delivery.result, found);
            }
            break;
        }
    }

    if found == config.count {
        println!("\nTarget reached! Found {} address(es).", found);
        0
    } else {
        println!("\nFound {} of {} address(es).", found, config.count);
        1
    }
}

/// True once every generation of the batch is accounted for.
///
/// Successes count only once their delivery has been received; the status
/// snapshot may already include a generation whose result is still in flight.
fn batch_finished(found: usize, failed: u64, count: usize) -> bool {
    found as u64 + failed >= count as u64
}

fn print_result(result: &GenerationResult, index: usize) {
    println!("=== Match #{} ===", index);
    println!("Address:     {}", result.public_key);
    println!("Secret Key:  {}", result.secret_key.to_base58());
    println!("Worker:      {}", result.worker_id);
    println!("Attempts:    {}", format_number(result.attempts));
    println!("Elapsed:     {:.2}s", result.elapsed.as_secs_f64());
    println!();
}

fn print_progress(status: &PoolStatus) {
    let average = status
        .cpu
        .average
        .map_or_else(|| "n/a".to_string(), |avg| format!("{:.0}%", avg * 100.0));

    println!(
        "[{} done] {} keys tested, {}/{} workers active, CPU {}",
        status.stats.operations_total,
        format_number(status.stats.keys_tested),
        status.workers.active,
        status.workers.total,
        average
    );
    for alert in &status.alerts {
        println!("  ! {}", alert.message);
    }
}

fn print_final_stats(status: &PoolStatus, elapsed: Duration) {
    let stats = &status.stats;
    let seconds = elapsed.as_secs_f64();
    let rate = if seconds > 0.0 {
        stats.keys_tested as f64 / seconds
    } else {
        0.0
    };

    println!("\n--- Final Statistics ---");
    println!("Total keys generated: {}", format_number(stats.keys_tested));
    println!("Total matches found:  {}", stats.operations_succeeded);
    println!("Failed generations:   {}", stats.operations_failed);
    println!("Workers created:      {}", stats.workers_created);
    println!("Time elapsed:         {:.2}s", seconds);
    println!("Average speed:        {}/s", format_number(rate as u64));
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

fn ctrlc_handler(engine: Arc<Engine>, stop_flag: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::Relaxed);
        engine.cancel_current();
    });
    if let Err(e) = result {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_waits_for_last_delivery() {
        assert!(!batch_finished(2, 0, 3));
        assert!(batch_finished(3, 0, 3));
    }

    #[test]
    fn test_batch_counts_failed_generations() {
        assert!(!batch_finished(1, 1, 3));
        assert!(batch_finished(2, 1, 3));
        assert!(batch_finished(0, 3, 3));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_500), "1.50K");
        assert_eq!(format_number(2_000_000), "2.00M");
    }
}
