//! Concurrency stress mode.
//!
//! Every round starts `concurrency` tasks at once. Each task connects its own
//! client, sends one count request with a random payload, and closes the
//! client. The round ends only after every task has finished, and only then
//! does the next round start.

use rand::Rng;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::client::ClientHandle;
use crate::config::{ClientConfig, StressConfig};
use crate::dispatcher;
use crate::error::Result;

/// Characters used for random payloads (URL-safe base64 alphabet)
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Payload lengths are drawn from `0..MAX_INPUT_LEN`.
pub const MAX_INPUT_LEN: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StressReport {
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StressReport {
    fn record(&mut self, outcome: std::result::Result<Result<i64>, tokio::task::JoinError>) {
        self.requests += 1;
        match outcome {
            Ok(Ok(_)) => self.succeeded += 1,
            Ok(Err(e)) => {
                warn!("Stress request failed: {}", e);
                self.failed += 1;
            }
            Err(e) => {
                error!("Stress task did not finish: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Random printable string of length in `0..MAX_INPUT_LEN`
pub fn random_input<R: Rng>(rng: &mut R) -> String {
    let len = rng.gen_range(0..MAX_INPUT_LEN);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Run the whole batch. Failures are counted, never propagated, so one bad
/// task does not stop the others.
pub async fn run(client: &ClientConfig, stress: &StressConfig) -> StressReport {
    let mut report = StressReport::default();

    for iteration in 0..stress.iterations {
        let mut tasks = JoinSet::new();
        for i in 0..stress.concurrency {
            let config = client.clone();
            tasks.spawn(async move { run_task(i as u64, &config).await });
        }

        while let Some(outcome) = tasks.join_next().await {
            report.record(outcome);
        }
        info!(
            "Concurrency test round {} finished: {}/{} succeeded",
            iteration + 1,
            report.succeeded,
            report.requests
        );
    }

    report
}

async fn run_task(id: u64, config: &ClientConfig) -> Result<i64> {
    let mut client = ClientHandle::connect(id, config).await?;
    let input = random_input(&mut rand::thread_rng());

    let outcome = dispatcher::send_message(&client, &input).await;
    let closed = client.close().await;
    let count = outcome?;
    closed?;
    Ok(count)
}
