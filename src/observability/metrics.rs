use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub job_transitions_total: IntCounterVec,
    pub transaction_latency_seconds: HistogramVec,
    pub scoring_fallbacks_total: IntCounterVec,
    pub driver_score: GaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let job_transitions_total = IntCounterVec::new(
            Opts::new(
                "job_transitions_total",
                "Job state transitions by kind and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid job_transitions_total metric");

        let transaction_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transaction_latency_seconds",
                "Wall time of atomic store transactions in seconds",
            ),
            &["operation"],
        )
        .expect("valid transaction_latency_seconds metric");

        let scoring_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "scoring_fallbacks_total",
                "Scoring requests served by the fallback formula after a primary failure",
            ),
            &["mode"],
        )
        .expect("valid scoring_fallbacks_total metric");

        let driver_score = GaugeVec::new(
            Opts::new("driver_score", "Latest composite ranking score per driver"),
            &["driver_id"],
        )
        .expect("valid driver_score metric");

        registry
            .register(Box::new(job_transitions_total.clone()))
            .expect("register job_transitions_total");
        registry
            .register(Box::new(transaction_latency_seconds.clone()))
            .expect("register transaction_latency_seconds");
        registry
            .register(Box::new(scoring_fallbacks_total.clone()))
            .expect("register scoring_fallbacks_total");
        registry
            .register(Box::new(driver_score.clone()))
            .expect("register driver_score");

        Self {
            registry,
            job_transitions_total,
            transaction_latency_seconds,
            scoring_fallbacks_total,
            driver_score,
        }
    }

    pub fn record_transition(&self, transition: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.job_transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
