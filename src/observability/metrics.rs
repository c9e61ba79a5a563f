use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Matching-performance telemetry, exportable in Prometheus text
/// format for dashboards.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub matches_total: IntCounterVec,
    pub active_searches: IntGauge,
    pub matching_latency_seconds: HistogramVec,
    pub candidates_per_match: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let matches_total = IntCounterVec::new(
            Opts::new("matches_total", "Total match attempts by outcome"),
            &["outcome"],
        )
        .expect("valid matches_total metric");

        let active_searches =
            IntGauge::new("active_searches", "Matching runs currently in flight")
                .expect("valid active_searches metric");

        let matching_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "matching_latency_seconds",
                "End-to-end matching latency in seconds",
            ),
            &["outcome"],
        )
        .expect("valid matching_latency_seconds metric");

        let candidates_per_match = Histogram::with_opts(prometheus::HistogramOpts::new(
            "candidates_per_match",
            "Candidates evaluated across all radius steps of one run",
        ))
        .expect("valid candidates_per_match metric");

        registry
            .register(Box::new(matches_total.clone()))
            .expect("register matches_total");
        registry
            .register(Box::new(active_searches.clone()))
            .expect("register active_searches");
        registry
            .register(Box::new(matching_latency_seconds.clone()))
            .expect("register matching_latency_seconds");
        registry
            .register(Box::new(candidates_per_match.clone()))
            .expect("register candidates_per_match");

        Self {
            registry,
            matches_total,
            active_searches,
            matching_latency_seconds,
            candidates_per_match,
        }
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
