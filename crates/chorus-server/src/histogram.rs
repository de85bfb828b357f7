use chorus_types::ACCESS_COUNT_BUFFER;
use tokio::sync::mpsc;
use tracing::info;

/// Per-round dead-drop access counters published by the tail server:
/// singleton and paired unique drop groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessCount {
    pub singles: i64,
    pub doubles: i64,
}

/// Bounded channel feeding the differential-privacy histogram collector.
/// Publication is non-blocking; counters are dropped when the collector
/// falls behind.
pub fn access_count_channel() -> (mpsc::Sender<AccessCount>, mpsc::Receiver<AccessCount>) {
    mpsc::channel(ACCESS_COUNT_BUFFER)
}

/// Best-effort observer of dead-drop access counts. Every non-terminal
/// server contributes roughly `mu` noise singles and `mu` noise-double
/// onions per round, so the logged estimate subtracts that expectation.
pub struct Histogram {
    pub mu: f64,
    pub num_servers: usize,
}

impl Histogram {
    pub async fn run(self, mut counts: mpsc::Receiver<AccessCount>) {
        let noisy_servers = self.num_servers.saturating_sub(1) as f64;
        while let Some(count) = counts.recv().await {
            let est_singles = count.singles as f64 - noisy_servers * self.mu;
            let est_doubles = count.doubles as f64 - noisy_servers * self.mu / 2.0;
            info!(
                singles = count.singles,
                doubles = count.doubles,
                est_singles,
                est_doubles,
                "dead drop accesses"
            );
        }
    }
}
