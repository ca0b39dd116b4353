//! Metric allow-list.

use std::collections::HashSet;

use crate::sample::MetricSample;

/// Per-container cadvisor families kept by default.
pub const CADVISOR_METRICS: &[&str] = &[
    // cpu
    "container_cpu_usage_seconds_total",
    "container_cpu_user_seconds_total",
    "container_cpu_system_seconds_total",
    "container_cpu_cfs_throttled_seconds_total",
    "container_cpu_load_average_10s",
    "container_processes",
    "container_start_time_seconds",
    // memory
    "container_memory_usage_bytes",
    "container_memory_max_usage_bytes",
    "container_memory_cache",
    "container_memory_swap",
    "container_memory_failcnt",
    // disk
    "container_fs_reads_bytes_total",
    "container_fs_writes_bytes_total",
    "container_fs_io_time_seconds_total",
    "container_fs_io_time_weighted_seconds_total",
    // network
    "container_network_receive_bytes_total",
    "container_network_receive_errors_total",
    "container_network_transmit_bytes_total",
    "container_network_transmit_errors_total",
];

/// Closed set of metric names eligible for persistence.
///
/// Built once at startup and shared read-only between scrape tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricAllowList {
    names: HashSet<String>,
}

impl MetricAllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The default cadvisor set.
    pub fn cadvisor() -> Self {
        Self::new(CADVISOR_METRICS.iter().copied())
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Drop samples whose metric is not allowed, returning how many were dropped.
    pub fn retain(&self, samples: &mut Vec<MetricSample>) -> usize {
        let before = samples.len();
        samples.retain(|s| self.is_allowed(&s.name));
        before - samples.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for MetricAllowList {
    fn default() -> Self {
        Self::cadvisor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_cadvisor() {
        let list = MetricAllowList::default();
        assert_eq!(list.len(), 20);
        assert!(list.is_allowed("container_cpu_usage_seconds_total"));
        assert!(list.is_allowed("container_network_transmit_errors_total"));
        assert!(!list.is_allowed("not_a_known_metric"));
    }

    #[test]
    fn retain_drops_unknown_metrics() {
        let list = MetricAllowList::cadvisor();
        let mut samples = vec![
            MetricSample::new("container_cpu_usage_seconds_total", 1.0, 0),
            MetricSample::new("not_a_known_metric", 2.0, 0),
            MetricSample::new("container_memory_usage_bytes", 3.0, 0),
        ];
        assert_eq!(list.retain(&mut samples), 1);
        let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["container_cpu_usage_seconds_total", "container_memory_usage_bytes"]
        );
    }

    #[test]
    fn custom_list_replaces_default() {
        let list = MetricAllowList::new(["up"]);
        assert!(list.is_allowed("up"));
        assert!(!list.is_allowed("container_cpu_usage_seconds_total"));
    }
}
