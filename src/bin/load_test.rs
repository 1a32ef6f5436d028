//! Load Testing Tool
//!
//! Fires concurrent CreateTransaction calls at a fresh account: `--replays`
//! calls sharing one idempotency key plus `--distinct` calls with their own
//! keys, then checks the final balance against the at-most-once expectation.
//!
//! Run with: cargo run --bin load_test --release -- --replays 50 --distinct 200

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use ledger_service::cache::NoopAccountCache;
use ledger_service::domain::{OperationContext, RandomAccountNumbers};
use ledger_service::handlers::{AccountService, CreateAccountCommand, CreateTransactionCommand};
use ledger_service::txn::{RetryPolicy, TransactionExecutor};

fn arg_or(args: &[String], name: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let replays = arg_or(&args, "--replays", 50);
    let distinct = arg_or(&args, "--distinct", 200);
    let amount = arg_or(&args, "--amount", 100) as i64;

    let database_url = std::env::var("DATABASE_URL")?;

    println!(
        "Load Test - {} same-key replays, {} distinct keys, amount {}",
        replays, distinct, amount
    );
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await?;

    let executor = TransactionExecutor::new(pool, RetryPolicy::new(5, Duration::from_millis(20)))
        .with_operation_timeout(Duration::from_secs(30));
    let service = Arc::new(AccountService::new(
        executor,
        Arc::new(NoopAccountCache),
        Arc::new(RandomAccountNumbers),
    ));

    let user_id = Uuid::new_v4();
    let setup = OperationContext::new()
        .with_request_user(user_id)
        .with_idempotency_key(format!("load-test-open-{}", Uuid::new_v4()));
    let account = service
        .create_account(CreateAccountCommand::new(user_id), &setup)
        .await?;
    println!("Account {} ({})", account.account_id, account.account_number);

    let shared_key = format!("load-test-shared-{}", Uuid::new_v4());
    let start = Instant::now();

    let calls = (0..replays + distinct).map(|i| {
        let service = Arc::clone(&service);
        let key = if i < replays {
            shared_key.clone()
        } else {
            format!("load-test-{}", Uuid::new_v4())
        };
        let account_id = account.account_id;
        async move {
            let context = OperationContext::new()
                .with_request_user(user_id)
                .with_idempotency_key(key);
            let started = Instant::now();
            let result = service
                .create_transaction(CreateTransactionCommand::adjustment(account_id, amount), &context)
                .await;
            (result, started.elapsed())
        }
    });

    let results = join_all(calls).await;
    let elapsed = start.elapsed();

    let mut failures = 0u64;
    let mut latencies: Vec<Duration> = Vec::with_capacity(results.len());
    let mut shared_ids = std::collections::HashSet::new();
    for (i, (result, latency)) in results.into_iter().enumerate() {
        latencies.push(latency);
        match result {
            Ok(receipt) if (i as u64) < replays => {
                shared_ids.insert(receipt.transaction.transaction_id);
            }
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                eprintln!("Call {} failed: {}", i, e);
            }
        }
    }
    latencies.sort();

    let check = OperationContext::new().with_request_user(user_id);
    let final_account = service.get_account(account.account_id, &check).await?;
    let applied = u64::from(replays > 0) + distinct;
    let expected = amount * applied as i64;

    let p50 = latencies.get(latencies.len() / 2).copied().unwrap_or_default();
    let p99 = latencies
        .get(latencies.len().saturating_sub(1) * 99 / 100)
        .copied()
        .unwrap_or_default();

    println!("\n=== Load Test Results ===");
    println!("Total calls: {}", replays + distinct);
    println!("Failed calls: {}", failures);
    println!("Distinct responses for shared key: {}", shared_ids.len());
    println!("Final balance: {} (expected {})", final_account.balance, expected);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Latency p50: {:?}, p99: {:?}", p50, p99);

    if failures == 0 && final_account.balance != expected {
        anyhow::bail!("balance mismatch: at-most-once violated");
    }
    if shared_ids.len() > 1 {
        anyhow::bail!("shared key produced {} different transactions", shared_ids.len());
    }

    println!("At-most-once check passed");
    Ok(())
}
