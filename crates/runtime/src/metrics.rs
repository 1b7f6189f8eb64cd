use std::collections::BTreeMap;

/// Deterministic counters and gauges.
///
/// Sorted maps keep snapshots stable for logs and assertions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
    peaks: BTreeMap<&'static str, i64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.get(name).copied().unwrap_or(0)
    }

    /// Highest value the gauge has ever held.
    pub fn peak(&self, name: &str) -> i64 {
        self.peaks.get(name).copied().unwrap_or(0)
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
        let peak = self.peaks.entry(name).or_insert(value);
        *peak = (*peak).max(value);
    }

    pub fn add_gauge(&mut self, name: &'static str, delta: i64) {
        let value = self.gauge(name) + delta;
        self.set_gauge(name, value);
    }

    pub fn snapshot(&self) -> Vec<(&'static str, i64)> {
        let mut out: Vec<(&'static str, i64)> = self
            .counters
            .iter()
            .map(|(k, v)| (*k, *v as i64))
            .chain(self.gauges.iter().map(|(k, v)| (*k, *v)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}
