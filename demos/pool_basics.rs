//! Acquire, execute and repair against a local server.
//!
//! ```text
//! RUST_LOG=respool=debug cargo run --example pool_basics
//! ```

use std::thread;
use std::time::Duration;

use respool::{ConnectionConfig, ConnectionPool, PoolConfig, RepairOutcome};
use tracing_subscriber::EnvFilter;

fn main() -> respool::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PoolConfig::default()
        .with_max_size(4)
        .with_connection_config(ConnectionConfig::default().with_timeout(Duration::from_millis(300)));
    let pool = ConnectionPool::new(config);

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let pool = pool.clone();
            thread::spawn(move || -> respool::Result<()> {
                for i in 0..5 {
                    let Some(conn) = pool.acquire(("127.0.0.1", 6379))? else {
                        println!("worker {n}: pool full");
                        continue;
                    };
                    let key = format!("demo:{n}");
                    conn.execute_argv(&[b"SET", key.as_bytes(), i.to_string().as_bytes()]);
                    match conn.execute_argv(&[b"GET", key.as_bytes()]) {
                        Some(reply) => println!("worker {n}: {key} = {:?}", reply.as_str()),
                        None => println!("worker {n}: command failed"),
                    }
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        if let Ok(result) = worker.join() {
            result?;
        }
    }

    match pool.repair_sweep() {
        RepairOutcome::Skipped => println!("no failures, sweep skipped"),
        RepairOutcome::Healthy => println!("all connections repaired"),
        RepairOutcome::Degraded { alive, in_use } => println!("{alive}/{in_use} connections alive"),
    }
    println!("{:?}", pool.status());
    Ok(())
}
