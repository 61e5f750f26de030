//! In-process Prometheus-text metrics.
//!
//! No external metrics crate: a small label-keyed counter/summary
//! registry exposed as Prometheus exposition text on `/metrics`, in the
//! same spirit as a hand-rolled `CounterVec`/`SummaryVec` — cheap to
//! construct, cheap to scrape, no dependency on a metrics backend being
//! reachable.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Summary {
    count: u64,
    sum: f64,
}

fn label_key(labels: &[(&str, &str)]) -> String {
    let mut sorted = labels.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    counters: Mutex<HashMap<&'static str, HashMap<String, u64>>>,
    summaries: Mutex<HashMap<&'static str, HashMap<String, Summary>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner::default()),
        }
    }

    fn inc(&self, name: &'static str, labels: &[(&str, &str)]) {
        let mut counters = self.inner.counters.lock().expect("metrics poisoned");
        *counters
            .entry(name)
            .or_default()
            .entry(label_key(labels))
            .or_insert(0) += 1;
    }

    fn observe(&self, name: &'static str, labels: &[(&str, &str)], value: f64) {
        let mut summaries = self.inner.summaries.lock().expect("metrics poisoned");
        let entry = summaries
            .entry(name)
            .or_default()
            .entry(label_key(labels))
            .or_default();
        entry.count += 1;
        entry.sum += value;
    }

    pub fn http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.inc(
            "aos_http_requests_total",
            &[("method", method), ("path", path), ("status", &status)],
        );
        self.observe("aos_http_request_seconds", &[("path", path)], duration_secs);
    }

    pub fn bus_messages(&self, target: &str, result: &str) {
        self.inc("aos_bus_messages_total", &[("target", target), ("result", result)]);
    }

    pub fn llm_ping(&self, provider: &str, outcome: &str) {
        self.inc("aos_llm_pings_total", &[("provider", provider), ("outcome", outcome)]);
    }

    pub fn llm_chat(&self, provider: &str, outcome: &str, duration_secs: f64) {
        self.inc("aos_llm_chats_total", &[("provider", provider), ("outcome", outcome)]);
        self.observe("aos_llm_chat_seconds", &[("provider", provider)], duration_secs);
    }

    /// Renders every tracked metric as Prometheus exposition text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let counters = self.inner.counters.lock().expect("metrics poisoned");
        for (name, series) in counters.iter() {
            out.push_str(&format!("# HELP {name} counter\n# TYPE {name} counter\n"));
            for (labels, value) in series {
                if labels.is_empty() {
                    out.push_str(&format!("{name} {value}\n"));
                } else {
                    out.push_str(&format!("{name}{{{labels}}} {value}\n"));
                }
            }
        }
        let summaries = self.inner.summaries.lock().expect("metrics poisoned");
        for (name, series) in summaries.iter() {
            out.push_str(&format!("# HELP {name} summary\n# TYPE {name} summary\n"));
            for (labels, s) in series {
                if labels.is_empty() {
                    out.push_str(&format!("{name}_count {}\n{name}_sum {}\n", s.count, s.sum));
                } else {
                    out.push_str(&format!(
                        "{name}_count{{{labels}}} {}\n{name}_sum{{{labels}}} {}\n",
                        s.count, s.sum
                    ));
                }
            }
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let m = Metrics::new();
        m.bus_messages("planner", "sent");
        m.bus_messages("planner", "sent");
        m.bus_messages("planner", "dropped");
        let text = m.render();
        assert!(text.contains("aos_bus_messages_total{result=\"sent\",target=\"planner\"} 2"));
        assert!(text.contains("aos_bus_messages_total{result=\"dropped\",target=\"planner\"} 1"));
    }

    #[test]
    fn summary_tracks_count_and_sum() {
        let m = Metrics::new();
        m.llm_chat("ollama", "ok", 0.5);
        m.llm_chat("ollama", "ok", 1.5);
        let text = m.render();
        assert!(text.contains("aos_llm_chat_seconds_count{provider=\"ollama\"} 2"));
        assert!(text.contains("aos_llm_chat_seconds_sum{provider=\"ollama\"} 2"));
    }
}
