//! Simulated transport driving a breaker registry

use host_breakers::{BreakerOptions, CircuitError, ConnectionEvent, Registry};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("host_breakers=debug")),
        )
        .init();

    println!("=== Host Breakers Basic Example ===\n");

    let registry = Registry::builder()
        .on_open(|host| println!("🔴 Circuit for '{}' opened!", host))
        .on_close(|host| println!("🟢 Circuit for '{}' closed!", host))
        .on_half_open(|host| println!("🟡 Circuit for '{}' half-open, probing...", host))
        .build();

    registry
        .set(
            "payments.example.com",
            BreakerOptions::new()
                .max_failures(3)
                .max_age(Duration::from_millis(200)),
        )
        .expect("valid options");
    registry.enable();

    println!("--- Successful calls ---");
    for status in [200, 204] {
        simulate(&registry, ConnectionEvent::Completed(Some(status)));
    }

    println!("\n--- Triggering failures ---");
    for event in [
        ConnectionEvent::Completed(Some(503)),
        ConnectionEvent::Timeout,
        ConnectionEvent::Error,
    ] {
        simulate(&registry, event);
    }

    println!("\n--- Attempting call while open ---");
    simulate(&registry, ConnectionEvent::Completed(Some(200)));

    println!("\n--- Waiting for cool-down ---");
    std::thread::sleep(Duration::from_millis(250));
    simulate(&registry, ConnectionEvent::Completed(Some(200)));

    if let Some(snapshot) = registry.get("payments.example.com") {
        println!("\nFinal state: {} ({} failures)", snapshot.state, snapshot.failures);
    }
}

fn simulate(registry: &Registry, outcome: ConnectionEvent) {
    match registry.connect("payments.example.com:443") {
        Ok(attempt) => {
            attempt.report(outcome);
            println!("✓ attempt finished with {:?}", outcome);
        }
        Err(err @ CircuitError::Open { .. }) => println!("✗ {}", err),
    }
}
