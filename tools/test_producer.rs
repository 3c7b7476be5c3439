//! Test Request Producer
//!
//! Sends generated payment requests to the risk engine over NATS request/reply
//! and tallies the decisions that come back.

use payment_risk_engine::card::luhn_valid;
use payment_risk_engine::types::{BehavioralSignals, TransactionRequest};
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Payment request generator for testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
        }
    }

    /// Luhn-valid 16-digit card starting with `prefix`
    fn card(&mut self, prefix: &str) -> String {
        let mut digits: String = prefix.to_string();
        while digits.len() < 15 {
            digits.push(char::from(b'0' + self.rng.gen_range(0..10u8)));
        }
        digits.push(check_digit(&digits));
        digits
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("tx_{:012}", self.counter)
    }

    /// Ordinary purchase on a profiled card
    fn generate_legitimate(&mut self) -> TransactionRequest {
        let card = self.card("4000");
        let cvv = format!("{:03}", self.rng.gen_range(100..900));
        let mut request = TransactionRequest::new(&card, self.rng.gen_range(5.0..400.0), &cvv)
            .with_expiry(&format!("{:02}/{:02}", self.rng.gen_range(1..=12), self.rng.gen_range(27..32)))
            .with_signals(BehavioralSignals {
                typing_latency_ms: Some(self.rng.gen_range(80.0..250.0)),
                geo_shift_km: Some(self.rng.gen_range(0.0..30.0)),
                device_fingerprint: Some(format!("fp_{:016x}", self.rng.gen::<u64>())),
            });
        request.transaction_id = self.next_id();
        request
    }

    /// High amount, sentinel CVV, fast typing far from home
    fn generate_suspicious(&mut self) -> TransactionRequest {
        let card = self.card("5000");
        let mut request = TransactionRequest::new(&card, self.rng.gen_range(5000.0..20000.0), "999")
            .with_signals(BehavioralSignals {
                typing_latency_ms: Some(self.rng.gen_range(5.0..25.0)),
                geo_shift_km: Some(self.rng.gen_range(1000.0..9000.0)),
                device_fingerprint: Some(format!("fp_{:016x}", self.rng.gen::<u64>())),
            });
        request.transaction_id = self.next_id();
        request
    }

    /// Card that fails the checksum
    fn generate_malformed(&mut self) -> TransactionRequest {
        let mut card = self.card("4000");
        let last = card.pop().map(|c| c as u8 - b'0').unwrap_or(0);
        card.push(char::from(b'0' + (last + 1) % 10));
        let mut request = TransactionRequest::new(&card, 20.0, "123");
        request.transaction_id = self.next_id();
        request
    }
}

fn check_digit(partial: &str) -> char {
    (0..10u8)
        .map(|d| char::from(b'0' + d))
        .find(|&c| luhn_valid(&format!("{partial}{c}")))
        .unwrap_or('0')
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("payments.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate, delay_ms).await;
        }
    };

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();
    let mut statuses: BTreeMap<String, u64> = BTreeMap::new();

    info!("Starting to send {} requests...", count);

    for i in 0..count {
        let request = next_request(&mut generator, &mut rng, fraud_rate);
        let payload = serde_json::to_vec(&request)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => {
                let status = serde_json::from_slice::<Value>(&reply.payload)
                    .ok()
                    .and_then(|v| v.get("status").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "UNPARSEABLE".to_string());
                *statuses.entry(status).or_insert(0) += 1;
            }
            Err(e) => {
                warn!(transaction_id = %request.transaction_id, error = %e, "Request failed");
                *statuses.entry("NO_REPLY".to_string()).or_insert(0) += 1;
            }
        }

        if (i + 1) % 10 == 0 {
            info!(sent = i + 1, total = count, statuses = ?statuses, "Progress");
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(sent = count, statuses = ?statuses, "Completed");

    Ok(())
}

fn next_request(
    generator: &mut RequestGenerator,
    rng: &mut rand::rngs::ThreadRng,
    fraud_rate: f64,
) -> TransactionRequest {
    let roll: f64 = rng.gen();
    if roll < 0.02 {
        generator.generate_malformed()
    } else if roll < 0.02 + fraud_rate {
        generator.generate_suspicious()
    } else {
        generator.generate_legitimate()
    }
}

async fn run_dry_mode(count: u64, fraud_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let request = next_request(&mut generator, &mut rng, fraud_rate);
        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
