//! Performance metrics and decision statistics for the risk engine.

use crate::types::decision::DecisionStatus;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;
const MAX_MODULE_SAMPLES: usize = 1_000;

/// Metrics collector shared by every worker
pub struct PipelineMetrics {
    /// Decisions produced (rejections and errors excluded)
    pub decisions: AtomicU64,
    pub rejections: AtomicU64,
    pub internal_errors: AtomicU64,
    pub drift_detections: AtomicU64,
    pub adversarial_blocks: AtomicU64,
    decisions_by_status: RwLock<BTreeMap<DecisionStatus, u64>>,
    rejections_by_kind: RwLock<BTreeMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Module scoring times (in microseconds)
    module_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// How closely module scores agree (1 - std dev)
    module_agreements: RwLock<Vec<f64>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            drift_detections: AtomicU64::new(0),
            adversarial_blocks: AtomicU64::new(0),
            decisions_by_status: RwLock::new(BTreeMap::new()),
            rejections_by_kind: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            module_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            module_agreements: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a completed decision
    pub fn record_decision(&self, status: DecisionStatus, processing_time: Duration, risk_score: f64) {
        self.decisions.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_status) = self.decisions_by_status.write() {
            *by_status.entry(status).or_insert(0) += 1;
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        let bucket = if risk_score.is_finite() {
            (risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize
        } else {
            9
        };
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }

        if status == DecisionStatus::Blocked {
            self.adversarial_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request rejected before scoring
    pub fn record_rejection(&self, kind: &str) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.rejections_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drift(&self) {
        self.drift_detections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record module scoring time
    pub fn record_module_time(&self, module: &str, duration: Duration) {
        if let Ok(mut times) = self.module_times.write() {
            let module_times = times.entry(module.to_string()).or_default();
            module_times.push(duration.as_micros() as u64);
            if module_times.len() > MAX_MODULE_SAMPLES {
                module_times.drain(0..MAX_MODULE_SAMPLES / 2);
            }
        }
    }

    /// Record module agreement (std dev of scores)
    pub fn record_module_agreement(&self, module_scores: &BTreeMap<String, f64>) {
        if module_scores.len() < 2 {
            return;
        }

        let n = module_scores.len() as f64;
        let mean = module_scores.values().sum::<f64>() / n;
        let variance = module_scores.values().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let agreement = 1.0 - variance.sqrt().min(1.0);

        if let Ok(mut agreements) = self.module_agreements.write() {
            agreements.push(agreement);
            if agreements.len() > MAX_MODULE_SAMPLES {
                agreements.drain(0..MAX_MODULE_SAMPLES / 2);
            }
        }
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap_or_else(PoisonError::into_inner);
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted = times.clone();
        drop(times);
        sorted.sort_unstable();

        let count = sorted.len();
        ProcessingStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(&sorted, 0.50),
            p95_us: percentile(&sorted, 0.95),
            p99_us: percentile(&sorted, 0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn get_module_stats(&self) -> BTreeMap<String, ModuleStats> {
        let times = self.module_times.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = BTreeMap::new();

        for (module, module_times) in times.iter() {
            if module_times.is_empty() {
                continue;
            }
            let mut sorted = module_times.clone();
            sorted.sort_unstable();
            let count = sorted.len();

            stats.insert(
                module.clone(),
                ModuleStats {
                    calls: count as u64,
                    mean_us: sorted.iter().sum::<u64>() / count as u64,
                    p50_us: percentile(&sorted, 0.50),
                    p99_us: percentile(&sorted, 0.99),
                },
            );
        }

        stats
    }

    pub fn get_avg_agreement(&self) -> f64 {
        let agreements = self.module_agreements.read().unwrap_or_else(PoisonError::into_inner);
        if agreements.is_empty() {
            return 0.0;
        }
        agreements.iter().sum::<f64>() / agreements.len() as f64
    }

    /// Decisions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.decisions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_decisions_by_status(&self) -> BTreeMap<DecisionStatus, u64> {
        self.decisions_by_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_rejections_by_kind(&self) -> BTreeMap<String, u64> {
        self.rejections_by_kind
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let rejections = self.rejections.load(Ordering::Relaxed);
        let errors = self.internal_errors.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let score_dist = self.get_score_distribution();

        info!(
            decisions,
            rejections,
            internal_errors = errors,
            drift_detections = self.drift_detections.load(Ordering::Relaxed),
            adversarial_blocks = self.adversarial_blocks.load(Ordering::Relaxed),
            throughput = format!("{:.1} tx/s", self.get_throughput()),
            module_agreement = format!("{:.1}%", self.get_avg_agreement() * 100.0),
            "Risk engine metrics summary"
        );
        info!(
            count = processing.count,
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );

        for (status, count) in self.get_decisions_by_status() {
            let pct = if decisions > 0 {
                (count as f64 / decisions as f64) * 100.0
            } else {
                0.0
            };
            info!(status = %status, count, pct = format!("{pct:.1}%"), "Decisions by status");
        }

        for (kind, count) in self.get_rejections_by_kind() {
            info!(kind = %kind, count, "Rejections by kind");
        }

        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            info!(
                bucket = format!("{:.1}-{:.1}", i as f64 / 10.0, (i + 1) as f64 / 10.0),
                count,
                bar = "█".repeat(((pct / 2.0) as usize).min(20)),
                "Risk score distribution"
            );
        }

        for (module, stats) in self.get_module_stats() {
            info!(
                module = %module,
                calls = stats.calls,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                "Module scoring time"
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[u64], q: f64) -> u64 {
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Per-module timing statistics
#[derive(Debug)]
pub struct ModuleStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
