//! Sorted set of instants

use chrono::{DateTime, Utc};

/// Sorted, de-duplicated sequence of instants, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeseries {
    items: Vec<DateTime<Utc>>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every instant, keeping order and uniqueness
    pub fn push<I>(&mut self, instants: I)
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        for t in instants {
            if let Err(pos) = self.items.binary_search(&t) {
                self.items.insert(pos, t);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn peek_oldest(&self) -> Option<DateTime<Utc>> {
        self.items.first().copied()
    }

    pub fn peek_newest(&self) -> Option<DateTime<Utc>> {
        self.items.last().copied()
    }

    pub fn pop_oldest(&mut self) -> Option<DateTime<Utc>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn pop_newest(&mut self) -> Option<DateTime<Utc>> {
        self.items.pop()
    }

    /// Position of `t`, if present
    pub fn find(&self, t: DateTime<Utc>) -> Option<usize> {
        self.items.binary_search(&t).ok()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.find(t).is_some()
    }

    /// Remove every listed instant that is present
    pub fn discard<'a, I>(&mut self, instants: I)
    where
        I: IntoIterator<Item = &'a DateTime<Utc>>,
    {
        for t in instants {
            if let Ok(pos) = self.items.binary_search(t) {
                self.items.remove(pos);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.items.iter().copied()
    }

    pub fn as_slice(&self) -> &[DateTime<Utc>] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<DateTime<Utc>> {
        self.items
    }
}

impl FromIterator<DateTime<Utc>> for Timeseries {
    fn from_iter<I: IntoIterator<Item = DateTime<Utc>>>(iter: I) -> Self {
        let mut series = Timeseries::new();
        series.push(iter);
        series
    }
}
