//! Keep/delete planning over time buckets

use super::{Granularity, RetentionConfig, Timeseries, MAX_BUCKETS};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Result of applying a retention policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Snapshots to keep, oldest first
    pub keep: Vec<DateTime<Utc>>,
    /// Every other input snapshot, oldest first
    pub delete: Vec<DateTime<Utc>>,
    /// Snapshots kept only by the midpoint rescue pass
    pub rescued: usize,
}

#[derive(Debug)]
struct Bucket {
    /// `None` for the catch-all bucket
    granularity: Option<Granularity>,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    /// The newest bucket also holds the instant at its end
    closed: bool,
    snapshots: Timeseries,
}

impl Bucket {
    fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| t >= start) && (t < self.end || (self.closed && t == self.end))
    }

    fn is_catch_all(&self) -> bool {
        self.granularity.is_none()
    }

    fn width_ms(&self) -> f64 {
        self.granularity
            .map(|g| g.width().num_milliseconds() as f64)
            .unwrap_or(f64::INFINITY)
    }
}

/// Decide which snapshots to keep.
///
/// 1. Buckets are laid out backward from the newest snapshot, finest
///    granularity nearest to it, with a catch-all before the oldest bucket.
/// 2. Each snapshot goes to the bucket containing it.
/// 3. Snapshots within a quarter of the finest width of a bucket boundary
///    are moved across it to fill an empty older bucket, or to relieve an
///    older bucket holding several. The catch-all takes part, so a snapshot
///    on the oldest bucket's start can end up discarded.
/// 4. Hour buckets keep everything, wider buckets keep their oldest, the
///    newest bucket also keeps its newest; the catch-all keeps nothing.
/// 5. Where two consecutive kept snapshots from different buckets are at
///    least 1.5 geometric-mean widths apart, the discarded snapshot closest
///    to their midpoint (and at least half a geometric-mean width from
///    both) is kept as well.
///
/// The input order does not matter and duplicates are collapsed.
pub fn plan(config: &RetentionConfig, instants: &[DateTime<Utc>]) -> RetentionPlan {
    let all: Timeseries = instants.iter().copied().collect();
    let Some(newest) = all.peek_newest() else {
        return RetentionPlan::default();
    };
    if config.is_empty() {
        return RetentionPlan {
            delete: all.into_vec(),
            ..Default::default()
        };
    }

    let mut buckets = layout(config, newest);
    assign(&mut buckets, &all);
    redistribute(&mut buckets, config);

    // kept instant → owning bucket index
    let mut kept: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
    let last = buckets.len() - 1;
    for (idx, bucket) in buckets.iter().enumerate() {
        if bucket.is_catch_all() || bucket.snapshots.is_empty() {
            continue;
        }
        if bucket.granularity == Some(Granularity::Hour) {
            for t in bucket.snapshots.iter() {
                kept.insert(t, idx);
            }
        } else if let Some(oldest) = bucket.snapshots.peek_oldest() {
            kept.insert(oldest, idx);
        }
        if idx == last {
            if let Some(t) = bucket.snapshots.peek_newest() {
                kept.insert(t, idx);
            }
        }
    }

    let rescued = rescue_midpoints(&buckets, &all, &mut kept);

    let keep: Vec<DateTime<Utc>> = kept.keys().copied().collect();
    let delete = all.iter().filter(|t| !kept.contains_key(t)).collect();
    RetentionPlan {
        keep,
        delete,
        rescued,
    }
}

/// Buckets oldest first, catch-all at index 0.
///
/// Layout stops at the earliest representable instant; the bucket reaching
/// it is cut short.
fn layout(config: &RetentionConfig, newest: DateTime<Utc>) -> Vec<Bucket> {
    let capacity = config.len().min(MAX_BUCKETS) as usize + 1;
    let mut buckets = Vec::with_capacity(capacity);
    let mut end = newest;
    'granularities: for granularity in Granularity::ALL {
        let width = granularity.width();
        for _ in 0..config.count(granularity) {
            if end == DateTime::<Utc>::MIN_UTC {
                break 'granularities;
            }
            let start = end
                .checked_sub_signed(width)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            buckets.push(Bucket {
                granularity: Some(granularity),
                start: Some(start),
                end,
                closed: buckets.is_empty(),
                snapshots: Timeseries::new(),
            });
            end = start;
        }
    }
    buckets.push(Bucket {
        granularity: None,
        start: None,
        end,
        closed: false,
        snapshots: Timeseries::new(),
    });
    buckets.reverse();
    buckets
}

fn assign(buckets: &mut [Bucket], all: &Timeseries) {
    for t in all.iter() {
        if let Some(bucket) = buckets.iter_mut().find(|b| b.contains(t)) {
            bucket.snapshots.push([t]);
        }
    }
}

fn redistribute(buckets: &mut [Bucket], config: &RetentionConfig) {
    let Some(finest) = config.min_interval() else {
        return;
    };
    let close = finest.width() / 4;

    for i in 0..buckets.len() - 1 {
        let (older, newer) = buckets.split_at_mut(i + 1);
        let b = &mut older[i];
        let nb = &mut newer[0];
        let boundary = b.end;

        if b.snapshots.is_empty() {
            if let Some(oldest) = nb.snapshots.peek_oldest() {
                if oldest - boundary <= close {
                    nb.snapshots.pop_oldest();
                    b.snapshots.push([oldest]);
                }
            }
        } else if b.snapshots.len() > 1 {
            if let Some(newest) = b.snapshots.peek_newest() {
                if boundary - newest <= close {
                    b.snapshots.pop_newest();
                    nb.snapshots.push([newest]);
                }
            }
        }
    }
}

fn rescue_midpoints(
    buckets: &[Bucket],
    all: &Timeseries,
    kept: &mut BTreeMap<DateTime<Utc>, usize>,
) -> usize {
    let initial: Vec<(DateTime<Utc>, usize)> = kept.iter().map(|(t, b)| (*t, *b)).collect();
    let mut rescued = 0;

    for pair in initial.windows(2) {
        let (left, left_bucket) = pair[0];
        let (right, right_bucket) = pair[1];
        if left_bucket == right_bucket {
            continue;
        }

        let geomean = (buckets[left_bucket].width_ms() * buckets[right_bucket].width_ms()).sqrt();
        let span = ms(right - left);
        if span < 1.5 * geomean {
            continue;
        }

        let midpoint = left + (right - left) / 2;
        let mut best: Option<(DateTime<Utc>, f64)> = None;
        for candidate in all.iter() {
            if candidate <= left || candidate >= right || kept.contains_key(&candidate) {
                continue;
            }
            if ms(candidate - left) < 0.5 * geomean || ms(right - candidate) < 0.5 * geomean {
                continue;
            }
            let distance = ms(candidate - midpoint).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }

        if let Some((candidate, _)) = best {
            let owner = buckets
                .iter()
                .position(|b| b.snapshots.contains(candidate))
                .unwrap_or(left_bucket);
            kept.insert(candidate, owner);
            rescued += 1;
        }
    }
    rescued
}

fn ms(d: Duration) -> f64 {
    d.num_milliseconds() as f64
}
