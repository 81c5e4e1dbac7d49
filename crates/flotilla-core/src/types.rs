//! Domain types for offers, resources, and tasks.
//!
//! These types are protocol-agnostic: the wire encoding lives in
//! `flotilla-protocol`, which converts to and from the values here at
//! the boundary. Internal code only ever matches on the enums below.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Well-known scalar resource carrying CPU shares.
pub const CPUS: &str = "cpus";

/// Well-known scalar resource carrying memory in megabytes.
pub const MEM: &str = "mem";

/// Well-known range resource carrying host ports.
pub const PORTS: &str = "ports";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque offer identity assigned by the master.
    OfferId
);
string_id!(
    /// Identity of the agent that owns an offer or runs a task.
    AgentId
);
string_id!(
    /// Caller-assigned task identity, unique for the scheduler's lifetime.
    TaskId
);
string_id!(
    /// Framework identity handed out by the master on subscription.
    FrameworkId
);
string_id!(
    /// Acknowledgement token attached to a status update; echoed back verbatim.
    AckToken
);

// ── Ranges ────────────────────────────────────────────────────────

/// An inclusive integer interval `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    pub fn new(begin: u64, end: u64) -> CoreResult<Self> {
        if begin > end {
            return Err(CoreError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    /// Number of discrete values in the interval.
    pub fn len(&self) -> u64 {
        (self.end - self.begin).saturating_add(1)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.begin <= value && value <= self.end
    }
}

/// Ordered set of disjoint inclusive intervals.
///
/// Construction rejects inverted or overlapping intervals, so every
/// `RangeSet` in the process satisfies the disjointness invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Range>", into = "Vec<Range>")]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    /// Build a set from arbitrary-order intervals, validating disjointness.
    pub fn new(mut ranges: Vec<Range>) -> CoreResult<Self> {
        for r in &ranges {
            if r.begin > r.end {
                return Err(CoreError::InvalidRange {
                    begin: r.begin,
                    end: r.end,
                });
            }
        }
        ranges.sort_by_key(|r| r.begin);
        for pair in ranges.windows(2) {
            if pair[1].begin <= pair[0].end {
                return Err(CoreError::OverlappingRanges {
                    a_begin: pair[0].begin,
                    a_end: pair[0].end,
                    b_begin: pair[1].begin,
                    b_end: pair[1].end,
                });
            }
        }
        Ok(Self { ranges })
    }

    /// Build the smallest set of intervals covering exactly `values`.
    pub fn from_values(values: &[u64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<Range> = Vec::new();
        for v in sorted {
            match ranges.last_mut() {
                Some(last) if last.end.checked_add(1) == Some(v) => last.end = v,
                _ => ranges.push(Range { begin: v, end: v }),
            }
        }
        Self { ranges }
    }

    /// Merge two sets, coalescing overlapping or adjacent intervals.
    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut all: Vec<Range> = self.ranges.iter().chain(&other.ranges).copied().collect();
        all.sort_by_key(|r| r.begin);

        let mut merged: Vec<Range> = Vec::with_capacity(all.len());
        for r in all {
            match merged.last_mut() {
                Some(last) if r.begin <= last.end.saturating_add(1) => {
                    last.end = last.end.max(r.end);
                }
                _ => merged.push(r),
            }
        }
        RangeSet { ranges: merged }
    }

    /// Total number of values across all intervals.
    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, value: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(value))
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Remove and return the `count` lowest values.
    ///
    /// Returns `None` without modifying the set when fewer than `count`
    /// values remain.
    pub fn take_lowest(&mut self, count: u64) -> Option<Vec<u64>> {
        if self.len() < count {
            return None;
        }
        let mut taken = Vec::with_capacity(count as usize);
        while (taken.len() as u64) < count {
            let first = &mut self.ranges[0];
            taken.push(first.begin);
            if first.begin == first.end {
                self.ranges.remove(0);
            } else {
                first.begin += 1;
            }
        }
        Some(taken)
    }
}

impl TryFrom<Vec<Range>> for RangeSet {
    type Error = CoreError;

    fn try_from(ranges: Vec<Range>) -> CoreResult<Self> {
        RangeSet::new(ranges)
    }
}

impl From<RangeSet> for Vec<Range> {
    fn from(set: RangeSet) -> Self {
        set.ranges
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// A typed resource quantity inside an offer or a launch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Scalar { name: String, value: f64 },
    Ranges { name: String, ranges: RangeSet },
}

impl Resource {
    /// Build a scalar resource, rejecting negative or non-finite values.
    pub fn scalar(name: impl Into<String>, value: f64) -> CoreResult<Self> {
        let name = name.into();
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::NegativeScalar { name, value });
        }
        Ok(Resource::Scalar { name, value })
    }

    pub fn ranges(name: impl Into<String>, ranges: RangeSet) -> Self {
        Resource::Ranges {
            name: name.into(),
            ranges,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Scalar { name, .. } | Resource::Ranges { name, .. } => name,
        }
    }
}

// ── Offers ────────────────────────────────────────────────────────

/// A time-boxed grant of resources from one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub resources: Vec<Resource>,
    /// Monotonic arrival order across deliveries.
    pub sequence: u64,
}

// ── Tasks ─────────────────────────────────────────────────────────

/// Lifecycle state of a task.
///
/// `Pending → Launching → Running → {Finished | Failed | Killed | Lost}`.
/// Launching may also jump straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Launching,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Launching => "launching",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// What a task needs and how it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub name: String,
    /// Container image; when set the task launches in a Docker container
    /// with port mappings.
    pub image: Option<String>,
    /// Shell command; `None` runs the image entrypoint.
    pub command: Option<String>,
    pub cpus: f64,
    pub mem: f64,
    /// Reserve a second host port for the auxiliary service.
    pub auxiliary_port: bool,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, cpus: f64, mem: f64) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            image: None,
            command: None,
            cpus,
            mem,
            auxiliary_port: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_auxiliary_port(mut self, enabled: bool) -> Self {
        self.auxiliary_port = enabled;
        self
    }

    /// Number of host ports this task must be given.
    pub fn port_count(&self) -> u64 {
        if self.auxiliary_port { 2 } else { 1 }
    }

    /// Reject negative or non-finite resource demands.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, value) in [(CPUS, self.cpus), (MEM, self.mem)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::NegativeScalar {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}
