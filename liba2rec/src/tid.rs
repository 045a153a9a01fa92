use std::fmt::Display;

/// The event originates from a Monte-Carlo simulation stream.
pub const TID_FLAG_MC: u8 = 0x01;
/// The event is exempt from the stream ordering invariant (scaler-only
/// reads arrive on their own trigger).
pub const TID_FLAG_OUT_OF_ORDER: u8 = 0x02;

/// The trigger identifier: the unique, totally ordered label of one event.
///
/// Tids order by run number, then by the trigger counter within the run.
/// The flags carry provenance, not identity; two events of one run never
/// share a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid {
    pub run: u32,
    pub counter: u32,
    pub flags: u8,
}

impl Tid {
    pub fn new(run: u32, counter: u32) -> Self {
        Self {
            run,
            counter,
            flags: 0,
        }
    }

    pub fn with_flags(run: u32, counter: u32, flags: u8) -> Self {
        Self { run, counter, flags }
    }

    pub fn is_monte_carlo(&self) -> bool {
        self.flags & TID_FLAG_MC != 0
    }

    pub fn is_out_of_order(&self) -> bool {
        self.flags & TID_FLAG_OUT_OF_ORDER != 0
    }

    /// Number of triggers missing between this Tid and a later one of the
    /// same run. Zero for consecutive counters (and across runs).
    pub fn gap_to(&self, later: &Tid) -> u32 {
        if self.run != later.run || later.counter <= self.counter {
            return 0;
        }
        later.counter - self.counter - 1
    }
}

impl PartialOrd for Tid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.run, self.counter, self.flags).cmp(&(other.run, other.counter, other.flags))
    }
}

impl Display for Tid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_monte_carlo() {
            write!(f, "run {} event {} (MC)", self.run, self.counter)
        } else {
            write!(f, "run {} event {}", self.run, self.counter)
        }
    }
}
