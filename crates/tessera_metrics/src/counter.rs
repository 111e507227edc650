//! Named event counters

use std::collections::BTreeMap;

#[derive(Default)]
pub struct Counter {
    counts: BTreeMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, value: u64) {
        *self.counts.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let mut counter = Counter::new();
        counter.add("spawned", 10);
        counter.add("spawned", 5);
        counter.add("removed", 1);
        assert_eq!(counter.get("spawned"), 15);
        assert_eq!(counter.get("missing"), 0);
        assert_eq!(counter.get("removed"), 1);
    }
}
