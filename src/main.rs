use anyhow::Result;
use clap::{Parser, Subcommand};
use gridlock::{Gridlock, LogLevel, TrackedMutex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Gridlock - runtime deadlock detector, demo scenarios"
)]
struct Cli {
    #[command(subcommand)]
    scenario: Scenario,

    /// Diagnostic level: 1=error 2=warn 3=info 4=debug
    #[arg(long, default_value_t = 2)]
    log_level: u8,

    /// How long to keep the process alive watching for reports
    #[arg(long, default_value_t = 2)]
    seconds: u64,
}

#[derive(Subcommand)]
enum Scenario {
    /// Two threads acquiring two locks in opposite order
    Deadlock,
    /// One thread acquiring the same lock twice
    SelfLock,
    /// N philosophers each grabbing their left then right fork
    Philosophers {
        #[arg(long, default_value_t = 5)]
        n: usize,
    },
    /// Well-ordered acquisition; never reports
    Ordered,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level {
        1 => LogLevel::Error,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        _ => LogLevel::Warn,
    };

    Gridlock::new().log_level(level).start()?;

    match cli.scenario {
        Scenario::Deadlock => deadlock(),
        Scenario::SelfLock => self_lock(),
        Scenario::Philosophers { n } => philosophers(n),
        Scenario::Ordered => ordered(),
    }

    // The stuck scenarios never join; reports land on stderr meanwhile.
    thread::sleep(Duration::from_secs(cli.seconds));
    Ok(())
}

fn deadlock() {
    let a = Arc::new(TrackedMutex::new("resource A"));
    let b = Arc::new(TrackedMutex::new("resource B"));

    let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
    thread::Builder::new()
        .name("demo-ab".into())
        .spawn(move || {
            let _ga = a.lock();
            thread::sleep(Duration::from_millis(100));
            let _gb = b.lock();
        })
        .ok();

    thread::Builder::new()
        .name("demo-ba".into())
        .spawn(move || {
            let _gb = b2.lock();
            thread::sleep(Duration::from_millis(100));
            let _ga = a2.lock();
        })
        .ok();
}

fn self_lock() {
    let m = Arc::new(TrackedMutex::new(()));
    thread::Builder::new()
        .name("demo-self".into())
        .spawn(move || {
            let _outer = m.lock();
            let _inner = m.lock();
        })
        .ok();
}

fn philosophers(n: usize) {
    let forks: Vec<_> = (0..n).map(|_| Arc::new(TrackedMutex::new(()))).collect();

    for i in 0..n {
        let left = Arc::clone(&forks[i]);
        let right = Arc::clone(&forks[(i + 1) % n]);
        thread::Builder::new()
            .name(format!("philosopher-{i}"))
            .spawn(move || {
                let _l = left.lock();
                thread::sleep(Duration::from_millis(100));
                let _r = right.lock();
            })
            .ok();
    }
}

fn ordered() {
    let locks: Vec<_> = (0..3).map(|_| Arc::new(TrackedMutex::new(0u64))).collect();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let locks = locks.clone();
            thread::Builder::new()
                .name(format!("ordered-{t}"))
                .spawn(move || {
                    for _ in 0..100 {
                        let _g0 = locks[0].lock();
                        let _g1 = locks[1].lock();
                        let _g2 = locks[2].lock();
                    }
                })
        })
        .collect();

    for h in handles.into_iter().flatten() {
        let _ = h.join();
    }
    println!("ordered scenario completed without a report");
}
