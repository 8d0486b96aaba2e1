//! Cluster-wide aggregation of node statistics
//!
//! The panel is a fixed table of `{name, unit, aggregation}` records. Each
//! aggregation reads nodes through plain selector functions; a selector
//! returning `None` means the metric does not apply to that node, and the
//! node then contributes neither to the count nor to the sum.

use super::NodeStats;

pub type Selector = fn(&NodeStats) -> Option<f64>;

/// The only heap pool reported; other pools report a zero max on the
/// cluster versions this runs against
const OLD_POOL: &str = "old";

#[derive(Clone, Copy)]
pub enum Aggregation {
    /// Sum of the selected values, one point
    Sum(Selector),
    /// min/max/sum/count of the selected values
    Stats(Selector),
    /// `100 * Σnumerator / Σdenominator` over nodes where both apply
    Utilization {
        numerator: Selector,
        denominator: Selector,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
    Bytes,
    Percent,
    None,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Count => "Count",
            Unit::Bytes => "Bytes",
            Unit::Percent => "Percent",
            Unit::None => "None",
        }
    }
}

#[derive(Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: Unit,
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticSet {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sample_count: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Statistics(StatisticSet),
}

/// One published data point
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub name: String,
    pub unit: Unit,
    pub dimensions: Vec<(String, String)>,
    pub value: MetricValue,
}

pub fn sum_data(nodes: &[NodeStats], selector: Selector) -> f64 {
    nodes.iter().filter_map(selector).sum()
}

/// `None` when no node has a value
pub fn stats_data(nodes: &[NodeStats], selector: Selector) -> Option<StatisticSet> {
    let mut stats: Option<StatisticSet> = None;
    for value in nodes.iter().filter_map(selector) {
        stats = Some(match stats {
            None => StatisticSet {
                min: value,
                max: value,
                sum: value,
                sample_count: 1.0,
            },
            Some(s) => StatisticSet {
                min: s.min.min(value),
                max: s.max.max(value),
                sum: s.sum + value,
                sample_count: s.sample_count + 1.0,
            },
        });
    }
    stats
}

/// `None` when the denominator sums to zero
pub fn utilization_data(
    nodes: &[NodeStats],
    numerator: Selector,
    denominator: Selector,
) -> Option<f64> {
    let (num, den) = nodes
        .iter()
        .filter_map(|n| Some((numerator(n)?, denominator(n)?)))
        .fold((0.0, 0.0), |(num, den), (n, d)| (num + n, den + d));
    if den == 0.0 {
        return None;
    }
    Some(100.0 * num / den)
}

fn node_count(_: &NodeStats) -> Option<f64> {
    Some(1.0)
}

fn vcpus(n: &NodeStats) -> Option<f64> {
    Some(n.vcpus as f64)
}

fn load_1m(n: &NodeStats) -> Option<f64> {
    n.load_average.one
}

fn load_5m(n: &NodeStats) -> Option<f64> {
    n.load_average.five
}

fn load_15m(n: &NodeStats) -> Option<f64> {
    n.load_average.fifteen
}

fn excluded(n: &NodeStats) -> Option<f64> {
    Some(if n.excluded { 1.0 } else { 0.0 })
}

fn heap_max(n: &NodeStats) -> Option<f64> {
    Some(n.heap.max as f64)
}

fn heap_used(n: &NodeStats) -> Option<f64> {
    Some(n.heap.used as f64)
}

fn old_pool_max(n: &NodeStats) -> Option<f64> {
    n.heap_pools.get(OLD_POOL).map(|p| p.max as f64)
}

fn old_pool_used(n: &NodeStats) -> Option<f64> {
    n.heap_pools.get(OLD_POOL).map(|p| p.used as f64)
}

fn fs_total(n: &NodeStats) -> Option<f64> {
    n.has_role("data").then_some(n.fs.total as f64)
}

fn fs_available(n: &NodeStats) -> Option<f64> {
    n.has_role("data").then_some(n.fs.available as f64)
}

fn fs_used(n: &NodeStats) -> Option<f64> {
    n.has_role("data")
        .then(|| n.fs.total.saturating_sub(n.fs.available) as f64)
}

static PANEL: &[MetricSpec] = &[
    MetricSpec {
        name: "Nodes",
        unit: Unit::Count,
        aggregation: Aggregation::Sum(node_count),
    },
    MetricSpec {
        name: "VCPUCount",
        unit: Unit::Count,
        aggregation: Aggregation::Sum(vcpus),
    },
    MetricSpec {
        name: "LoadAverage1m",
        unit: Unit::None,
        aggregation: Aggregation::Stats(load_1m),
    },
    MetricSpec {
        name: "LoadAverage5m",
        unit: Unit::None,
        aggregation: Aggregation::Stats(load_5m),
    },
    MetricSpec {
        name: "LoadAverage15m",
        unit: Unit::None,
        aggregation: Aggregation::Stats(load_15m),
    },
    MetricSpec {
        name: "LoadAverage1mUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: load_1m,
            denominator: vcpus,
        },
    },
    MetricSpec {
        name: "LoadAverage5mUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: load_5m,
            denominator: vcpus,
        },
    },
    MetricSpec {
        name: "LoadAverage15mUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: load_15m,
            denominator: vcpus,
        },
    },
    MetricSpec {
        name: "ExcludedNodes",
        unit: Unit::Count,
        aggregation: Aggregation::Sum(excluded),
    },
    MetricSpec {
        name: "JVMHeapMaxBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(heap_max),
    },
    MetricSpec {
        name: "JVMHeapUsedBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(heap_used),
    },
    MetricSpec {
        name: "JVMHeapUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: heap_used,
            denominator: heap_max,
        },
    },
    MetricSpec {
        name: "JVMHeapPoolOldMaxBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(old_pool_max),
    },
    MetricSpec {
        name: "JVMHeapPoolOldUsedBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(old_pool_used),
    },
    MetricSpec {
        name: "JVMHeapPoolOldUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: old_pool_used,
            denominator: old_pool_max,
        },
    },
    MetricSpec {
        name: "FSTotalBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(fs_total),
    },
    MetricSpec {
        name: "FSAvailableBytes",
        unit: Unit::Bytes,
        aggregation: Aggregation::Stats(fs_available),
    },
    MetricSpec {
        name: "FSUtilization",
        unit: Unit::Percent,
        aggregation: Aggregation::Utilization {
            numerator: fs_used,
            denominator: fs_total,
        },
    },
];

/// The fixed metric panel
pub fn panel() -> &'static [MetricSpec] {
    PANEL
}

/// Evaluate the panel over `nodes`.
///
/// Stats with no applicable node and utilisations with a zero denominator
/// are omitted.
pub fn aggregate(nodes: &[NodeStats], dimensions: &[(String, String)]) -> Vec<MetricDatum> {
    PANEL
        .iter()
        .filter_map(|spec| {
            let value = match spec.aggregation {
                Aggregation::Sum(selector) => MetricValue::Value(sum_data(nodes, selector)),
                Aggregation::Stats(selector) => {
                    MetricValue::Statistics(stats_data(nodes, selector)?)
                }
                Aggregation::Utilization {
                    numerator,
                    denominator,
                } => MetricValue::Value(utilization_data(nodes, numerator, denominator)?),
            };
            Some(MetricDatum {
                name: spec.name.to_string(),
                unit: spec.unit,
                dimensions: dimensions.to_vec(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::{FsUsage, LoadAverage, MemoryUsage};
    use super::*;
    use std::collections::BTreeMap;

    fn node(name: &str, roles: &[&str]) -> NodeStats {
        NodeStats {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            excluded: false,
            vcpus: 2,
            load_average: LoadAverage::default(),
            heap: MemoryUsage::default(),
            heap_pools: BTreeMap::new(),
            fs: FsUsage::default(),
        }
    }

    fn datum<'a>(points: &'a [MetricDatum], name: &str) -> Option<&'a MetricDatum> {
        points.iter().find(|p| p.name == name)
    }

    #[test]
    fn test_fs_metrics_only_for_data_nodes() {
        let mut data = node("i-a", &["data"]);
        data.fs = FsUsage {
            total: 100,
            available: 60,
        };
        let mut master = node("i-b", &["master"]);
        master.fs = FsUsage {
            total: 999,
            available: 1,
        };

        let points = aggregate(&[data, master], &[]);

        assert_eq!(
            datum(&points, "FSUtilization").unwrap().value,
            MetricValue::Value(40.0)
        );
        assert_eq!(
            datum(&points, "FSTotalBytes").unwrap().value,
            MetricValue::Statistics(StatisticSet {
                min: 100.0,
                max: 100.0,
                sum: 100.0,
                sample_count: 1.0,
            })
        );
    }

    #[test]
    fn test_null_selector_skips_sample() {
        let mut a = node("i-a", &["data"]);
        a.load_average.one = Some(3.0);
        let b = node("i-b", &["data"]);

        let stats = stats_data(&[a.clone(), b.clone()], load_1m).unwrap();
        assert_eq!(stats.sample_count, 1.0);
        assert_eq!(stats.sum, 3.0);

        // b has no load average, so its vCPUs are not in the denominator
        let util = utilization_data(&[a, b], load_1m, vcpus).unwrap();
        assert_eq!(util, 150.0);
    }

    #[test]
    fn test_zero_denominator_omits_metric() {
        let points = aggregate(&[node("i-a", &["data"])], &[]);
        assert!(datum(&points, "JVMHeapUtilization").is_none());
        assert!(datum(&points, "JVMHeapPoolOldUtilization").is_none());
        assert!(datum(&points, "LoadAverage1m").is_none());
    }

    #[test]
    fn test_counts() {
        let mut a = node("i-a", &["data"]);
        a.excluded = true;
        a.vcpus = 4;
        let b = node("i-b", &[]);
        let dims = vec![("Cluster".to_string(), "logs".to_string())];

        let points = aggregate(&[a, b], &dims);
        assert_eq!(datum(&points, "Nodes").unwrap().value, MetricValue::Value(2.0));
        assert_eq!(datum(&points, "VCPUCount").unwrap().value, MetricValue::Value(6.0));
        assert_eq!(datum(&points, "ExcludedNodes").unwrap().value, MetricValue::Value(1.0));
        assert!(points.iter().all(|p| p.dimensions == dims));
    }

    #[test]
    fn test_only_old_heap_pool_reported() {
        let mut a = node("i-a", &["data"]);
        a.heap_pools.insert("young".into(), MemoryUsage { max: 0, used: 5 });
        a.heap_pools.insert("old".into(), MemoryUsage { max: 200, used: 50 });

        let points = aggregate(&[a], &[]);
        assert_eq!(
            datum(&points, "JVMHeapPoolOldUtilization").unwrap().value,
            MetricValue::Value(25.0)
        );
        assert!(points.iter().all(|p| !p.name.contains("Young")));
    }

    #[test]
    fn test_panel_table() {
        let fs = panel().iter().find(|spec| spec.name == "FSUtilization").unwrap();
        assert_eq!(fs.unit, Unit::Percent);
        assert_eq!(panel().len(), 18);
    }
}
