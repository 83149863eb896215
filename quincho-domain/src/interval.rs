use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Half-open same-day time interval [inicio, fin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub inicio: NaiveTime,
    pub fin: NaiveTime,
}

impl Slot {
    pub fn new(inicio: NaiveTime, fin: NaiveTime) -> Self {
        Self { inicio, fin }
    }

    /// Non-empty interval: fin strictly after inicio.
    pub fn is_valid(&self) -> bool {
        self.fin > self.inicio
    }

    /// Standard half-open overlap test: start1 < end2 AND end1 > start2.
    /// Back-to-back slots (10:00-11:00, 11:00-12:00) do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.inicio < other.fin && self.fin > other.inicio
    }

    /// Intersection against an optionally-bounded blocked range.
    /// A range with no times blocks the whole day.
    pub fn intersects_range(&self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> bool {
        match (start, end) {
            (Some(s), Some(e)) => self.overlaps(&Slot::new(s, e)),
            // Whole-day block, or a half-bounded range left by a partial
            // admin entry: treat anything not fully bounded as whole-day.
            _ => true,
        }
    }
}
