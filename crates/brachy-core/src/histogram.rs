//! Fixed-size accumulation channels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::Verdict;

/// Which lineage slice of a projection to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Primary,
    Secondary,
    Total,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Primary, Channel::Secondary, Channel::Total];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Primary => "primary",
            Channel::Secondary => "secondary",
            Channel::Total => "total",
        }
    }

    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Channel::Primary),
            "secondary" => Some(Channel::Secondary),
            "total" => Some(Channel::Total),
            _ => None,
        }
    }
}

impl From<Verdict> for Channel {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Primary => Channel::Primary,
            Verdict::Secondary => Channel::Secondary,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two accumulators disagree on their bin layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutMismatch {
    pub what: &'static str,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} layout mismatch: expected {}, found {}",
            self.what, self.expected, self.found
        )
    }
}

impl std::error::Error for LayoutMismatch {}

/// Per-bin accumulated value and hit count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramChannel {
    values: Vec<f64>,
    counts: Vec<u64>,
}

impl HistogramChannel {
    pub fn new(bins: usize) -> Self {
        Self {
            values: vec![0.0; bins],
            counts: vec![0; bins],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add one hit. Indices outside the declared range are ignored.
    pub fn fill(&mut self, idx: usize, value: f64) {
        if let (Some(v), Some(c)) = (self.values.get_mut(idx), self.counts.get_mut(idx)) {
            *v += value;
            *c += 1;
        }
    }

    /// Overwrite a bin, used when restoring archived accumulations.
    pub fn set(&mut self, idx: usize, value: f64, count: u64) {
        if let (Some(v), Some(c)) = (self.values.get_mut(idx), self.counts.get_mut(idx)) {
            *v = value;
            *c = count;
        }
    }

    pub fn value(&self, idx: usize) -> f64 {
        self.values.get(idx).copied().unwrap_or(0.0)
    }

    pub fn count(&self, idx: usize) -> u64 {
        self.counts.get(idx).copied().unwrap_or(0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total_value(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(index, value, count)` for every bin that was hit at least once.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, f64, u64)> + '_ {
        self.values
            .iter()
            .zip(&self.counts)
            .enumerate()
            .filter(|(_, (_, c))| **c > 0)
            .map(|(i, (v, c))| (i, *v, *c))
    }

    pub fn merge_from(&mut self, other: &HistogramChannel) -> Result<(), LayoutMismatch> {
        if self.len() != other.len() {
            return Err(LayoutMismatch {
                what: "channel",
                expected: format!("{} bins", self.len()),
                found: format!("{} bins", other.len()),
            });
        }
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }
}

/// Primary, secondary and total channels of one projection.
///
/// Total is filled on every hit rather than summed from the other two, so it
/// stays exact even for paths that never consult the classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub primary: HistogramChannel,
    pub secondary: HistogramChannel,
    pub total: HistogramChannel,
}

impl ChannelSet {
    pub fn new(bins: usize) -> Self {
        Self {
            primary: HistogramChannel::new(bins),
            secondary: HistogramChannel::new(bins),
            total: HistogramChannel::new(bins),
        }
    }

    pub fn len(&self) -> usize {
        self.total.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    pub fn fill(&mut self, idx: usize, value: f64, verdict: Verdict) {
        self.total.fill(idx, value);
        match verdict {
            Verdict::Primary => self.primary.fill(idx, value),
            Verdict::Secondary => self.secondary.fill(idx, value),
        }
    }

    pub fn channel(&self, channel: Channel) -> &HistogramChannel {
        match channel {
            Channel::Primary => &self.primary,
            Channel::Secondary => &self.secondary,
            Channel::Total => &self.total,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut HistogramChannel {
        match channel {
            Channel::Primary => &mut self.primary,
            Channel::Secondary => &mut self.secondary,
            Channel::Total => &mut self.total,
        }
    }

    pub fn merge_from(&mut self, other: &ChannelSet) -> Result<(), LayoutMismatch> {
        self.primary.merge_from(&other.primary)?;
        self.secondary.merge_from(&other.secondary)?;
        self.total.merge_from(&other.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_read() {
        let mut ch = HistogramChannel::new(4);
        ch.fill(1, 2.5);
        ch.fill(1, 0.5);
        ch.fill(3, 1.0);
        assert_eq!(ch.value(1), 3.0);
        assert_eq!(ch.count(1), 2);
        assert_eq!(ch.total_value(), 4.0);
        assert_eq!(ch.total_count(), 3);
        let occupied: Vec<_> = ch.occupied().collect();
        assert_eq!(occupied, vec![(1, 3.0, 2), (3, 1.0, 1)]);
    }

    #[test]
    fn test_fill_out_of_range_ignored() {
        let mut ch = HistogramChannel::new(2);
        ch.fill(2, 1.0);
        ch.fill(usize::MAX, 1.0);
        assert_eq!(ch.total_count(), 0);
        assert_eq!(ch.value(99), 0.0);
    }

    #[test]
    fn test_channel_set_total_tracks_both() {
        let mut set = ChannelSet::new(3);
        set.fill(0, 1.0, Verdict::Primary);
        set.fill(0, 2.0, Verdict::Secondary);
        set.fill(2, 4.0, Verdict::Secondary);
        assert_eq!(set.primary.total_count(), 1);
        assert_eq!(set.secondary.total_count(), 2);
        assert_eq!(set.total.total_count(), 3);
        assert_eq!(set.total.value(0), 3.0);
        assert_eq!(set.channel(Channel::Secondary).value(2), 4.0);
    }

    #[test]
    fn test_merge() {
        let mut a = ChannelSet::new(2);
        let mut b = ChannelSet::new(2);
        a.fill(0, 1.0, Verdict::Primary);
        b.fill(0, 2.0, Verdict::Primary);
        b.fill(1, 3.0, Verdict::Secondary);
        a.merge_from(&b).unwrap();
        assert_eq!(a.primary.value(0), 3.0);
        assert_eq!(a.primary.count(0), 2);
        assert_eq!(a.total.value(1), 3.0);
    }

    #[test]
    fn test_merge_mismatch() {
        let mut a = HistogramChannel::new(2);
        let b = HistogramChannel::new(3);
        let err = a.merge_from(&b).unwrap_err();
        assert_eq!(err.expected, "2 bins");
        assert_eq!(err.found, "3 bins");
    }

    #[test]
    fn test_channel_names() {
        for ch in Channel::ALL {
            assert_eq!(Channel::from_str_lossy(ch.as_str()), Some(ch));
        }
        assert_eq!(Channel::from_str_lossy("bogus"), None);
        assert_eq!(Channel::from(Verdict::Primary), Channel::Primary);
    }
}
