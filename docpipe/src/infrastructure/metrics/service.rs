// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection and export for the document-processing
//! backbone. Tracks run/stage/task execution, worker pool occupancy and
//! queueing, and cache hit/miss rates. Thread-safe with low overhead.

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

use docpipe_domain::CoreError;

/// Prometheus metrics service for the document-processing backbone.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Run/stage execution
    runs_started_total: IntCounter,
    runs_completed_total: IntCounter,
    runs_failed_total: IntCounter,
    run_duration_seconds: Histogram,
    stages_completed_total: IntCounterVec,
    stages_failed_total: IntCounterVec,
    stage_duration_seconds: Histogram,

    // Worker pool
    tasks_dispatched_total: IntCounterVec,
    tasks_completed_total: IntCounterVec,
    active_workers: IntGaugeVec,
    queue_depth: IntGauge,

    // Cache
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,

    // Uploads
    files_received_total: IntCounter,
    files_rejected_total: IntCounter,
    bytes_stored_total: IntCounter,

    // Observability service summary gauges
    active_pipelines: IntGauge,
    pipelines_processed_total: IntCounter,
    throughput_mbps: Gauge,
    pipeline_errors_total: IntCounter,
}

impl MetricsService {
    /// Creates a new `MetricsService` with a fresh Prometheus registry.
    pub fn new() -> Result<Self, CoreError> {
        let registry = Registry::new();

        let runs_started_total = IntCounter::with_opts(
            Opts::new("runs_started_total", "Total number of pipeline runs started").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create runs_started_total metric: {e}")))?;

        let runs_completed_total = IntCounter::with_opts(
            Opts::new("runs_completed_total", "Total number of pipeline runs completed").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create runs_completed_total metric: {e}")))?;

        let runs_failed_total = IntCounter::with_opts(
            Opts::new("runs_failed_total", "Total number of pipeline runs failed").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create runs_failed_total metric: {e}")))?;

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "Wall-clock duration of a pipeline run")
                .namespace("docpipe")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0]),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create run_duration_seconds metric: {e}")))?;

        let stages_completed_total = IntCounterVec::new(
            Opts::new("stages_completed_total", "Total number of stage executions completed").namespace("docpipe"),
            &["stage"],
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create stages_completed_total metric: {e}")))?;

        let stages_failed_total = IntCounterVec::new(
            Opts::new("stages_failed_total", "Total number of stage executions failed").namespace("docpipe"),
            &["stage"],
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create stages_failed_total metric: {e}")))?;

        let stage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("stage_duration_seconds", "Wall-clock duration of a single stage execution")
                .namespace("docpipe")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 120.0]),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create stage_duration_seconds metric: {e}")))?;

        let tasks_dispatched_total = IntCounterVec::new(
            Opts::new("tasks_dispatched_total", "Total number of tasks dispatched to the worker pool")
                .namespace("docpipe"),
            &["class"],
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create tasks_dispatched_total metric: {e}")))?;

        let tasks_completed_total = IntCounterVec::new(
            Opts::new("tasks_completed_total", "Total number of worker pool tasks completed").namespace("docpipe"),
            &["class", "outcome"],
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create tasks_completed_total metric: {e}")))?;

        let active_workers = IntGaugeVec::new(
            Opts::new("active_workers", "Number of in-flight tasks per worker class").namespace("docpipe"),
            &["class"],
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create active_workers metric: {e}")))?;

        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Number of work items waiting for dispatch").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create queue_depth metric: {e}")))?;

        let cache_hits_total = IntCounter::with_opts(
            Opts::new("cache_hits_total", "Total number of cache lookups that hit").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create cache_hits_total metric: {e}")))?;

        let cache_misses_total = IntCounter::with_opts(
            Opts::new("cache_misses_total", "Total number of cache lookups that missed").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create cache_misses_total metric: {e}")))?;

        let files_received_total = IntCounter::with_opts(
            Opts::new("files_received_total", "Total number of files accepted by the upload manager")
                .namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create files_received_total metric: {e}")))?;

        let files_rejected_total = IntCounter::with_opts(
            Opts::new("files_rejected_total", "Total number of files rejected by validation").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create files_rejected_total metric: {e}")))?;

        let bytes_stored_total = IntCounter::with_opts(
            Opts::new("bytes_stored_total", "Total bytes written to the content-addressed store")
                .namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create bytes_stored_total metric: {e}")))?;

        let active_pipelines = IntGauge::with_opts(
            Opts::new("active_pipelines", "Number of pipeline runs currently in flight").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create active_pipelines metric: {e}")))?;

        let pipelines_processed_total = IntCounter::with_opts(
            Opts::new("pipelines_processed_total", "Total number of pipeline runs observed to completion")
                .namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create pipelines_processed_total metric: {e}")))?;

        let throughput_mbps = Gauge::with_opts(
            Opts::new("throughput_mbps", "Most recently observed processing throughput").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create throughput_mbps metric: {e}")))?;

        let pipeline_errors_total = IntCounter::with_opts(
            Opts::new("pipeline_errors_total", "Total number of operation failures observed").namespace("docpipe"),
        )
        .map_err(|e| CoreError::internal_error(format!("failed to create pipeline_errors_total metric: {e}")))?;

        for collector in [
            Box::new(runs_started_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(runs_completed_total.clone()),
            Box::new(runs_failed_total.clone()),
            Box::new(run_duration_seconds.clone()),
            Box::new(stages_completed_total.clone()),
            Box::new(stages_failed_total.clone()),
            Box::new(stage_duration_seconds.clone()),
            Box::new(tasks_dispatched_total.clone()),
            Box::new(tasks_completed_total.clone()),
            Box::new(active_workers.clone()),
            Box::new(queue_depth.clone()),
            Box::new(cache_hits_total.clone()),
            Box::new(cache_misses_total.clone()),
            Box::new(files_received_total.clone()),
            Box::new(files_rejected_total.clone()),
            Box::new(bytes_stored_total.clone()),
            Box::new(active_pipelines.clone()),
            Box::new(pipelines_processed_total.clone()),
            Box::new(throughput_mbps.clone()),
            Box::new(pipeline_errors_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| CoreError::internal_error(format!("failed to register metric: {e}")))?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            runs_started_total,
            runs_completed_total,
            runs_failed_total,
            run_duration_seconds,
            stages_completed_total,
            stages_failed_total,
            stage_duration_seconds,
            tasks_dispatched_total,
            tasks_completed_total,
            active_workers,
            queue_depth,
            cache_hits_total,
            cache_misses_total,
            files_received_total,
            files_rejected_total,
            bytes_stored_total,
            active_pipelines,
            pipelines_processed_total,
            throughput_mbps,
            pipeline_errors_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_run_started(&self) {
        self.runs_started_total.inc();
    }

    pub fn record_run_completed(&self, duration: Duration) {
        self.runs_completed_total.inc();
        self.run_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_run_failed(&self, duration: Duration) {
        self.runs_failed_total.inc();
        self.run_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_stage_completed(&self, stage: &str, duration: Duration) {
        self.stages_completed_total.with_label_values(&[stage]).inc();
        self.stage_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_stage_failed(&self, stage: &str, duration: Duration) {
        self.stages_failed_total.with_label_values(&[stage]).inc();
        self.stage_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_task_dispatched(&self, class: &str) {
        self.tasks_dispatched_total.with_label_values(&[class]).inc();
        self.active_workers.with_label_values(&[class]).inc();
    }

    pub fn record_task_completed(&self, class: &str, outcome: &str) {
        self.tasks_completed_total.with_label_values(&[class, outcome]).inc();
        self.active_workers.with_label_values(&[class]).dec();
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    pub fn record_file_received(&self) {
        self.files_received_total.inc();
    }

    pub fn record_file_rejected(&self) {
        self.files_rejected_total.inc();
    }

    pub fn record_bytes_stored(&self, bytes: u64) {
        self.bytes_stored_total.inc_by(bytes);
    }

    pub fn increment_active_pipelines(&self) {
        self.active_pipelines.inc();
    }

    pub fn decrement_active_pipelines(&self) {
        self.active_pipelines.dec();
    }

    pub fn increment_processed_pipelines(&self) {
        self.pipelines_processed_total.inc();
    }

    pub fn update_throughput(&self, throughput_mbps: f64) {
        self.throughput_mbps.set(throughput_mbps);
    }

    pub fn increment_errors(&self) {
        self.pipeline_errors_total.inc();
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, CoreError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| CoreError::internal_error(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer).map_err(|e| CoreError::internal_error(format!("non-utf8 metrics output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_and_stage_counters_increment() {
        let svc = MetricsService::new().unwrap();
        svc.record_run_started();
        svc.record_run_completed(Duration::from_secs(2));
        svc.record_stage_completed("extract", Duration::from_millis(500));
        svc.record_stage_failed("classify", Duration::from_millis(10));

        let exported = svc.export().unwrap();
        assert!(exported.contains("docpipe_runs_started_total 1"));
        assert!(exported.contains("docpipe_runs_completed_total 1"));
        assert!(exported.contains("docpipe_stages_completed_total"));
        assert!(exported.contains("docpipe_stages_failed_total"));
    }

    #[test]
    fn worker_gauges_track_in_flight_tasks() {
        let svc = MetricsService::new().unwrap();
        svc.record_task_dispatched("thread");
        svc.record_task_dispatched("thread");
        svc.record_task_completed("thread", "success");
        let exported = svc.export().unwrap();
        assert!(exported.contains("docpipe_active_workers{class=\"thread\"} 1"));
    }

    #[test]
    fn cache_hit_rate_is_observable() {
        let svc = MetricsService::new().unwrap();
        svc.record_cache_hit();
        svc.record_cache_hit();
        svc.record_cache_miss();
        let exported = svc.export().unwrap();
        assert!(exported.contains("docpipe_cache_hits_total 2"));
        assert!(exported.contains("docpipe_cache_misses_total 1"));
    }
}
