//! Progress aggregation and unit snapshots.

use super::unit::{EndReason, Progress, UnitId, UnitState};

/// Point-in-time view of one registered unit.
#[derive(Clone, Debug)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub parent: Option<UnitId>,
    pub name: String,
    pub state: UnitState,
    /// True once the unit is waiting for a slot.
    pub scheduled: bool,
    pub hidden: bool,
    /// True while a running unit has handed its slot back to wait for its
    /// children.
    pub joining: bool,
    pub progress: Progress,
    pub description: String,
    pub end_reason: Option<EndReason>,
}

/// Aggregated progress over the visible units of an orchestrator.
///
/// Hidden units are excluded here but still counted by `join`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateProgress {
    pub total: usize,
    /// Registered but not scheduled.
    pub created: usize,
    /// Scheduled and waiting for a slot.
    pub queued: usize,
    /// Running units holding a concurrency slot. Never exceeds the
    /// orchestrator's `max_concurrent`.
    pub running: usize,
    /// Running units that released their slot while joining children.
    pub joining: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Mean progress of running units that report a percentage.
    pub percent: Option<f64>,
    /// `name: description` of running units, joining ones included, in
    /// submission order.
    pub active: Vec<String>,
}

impl AggregateProgress {
    pub(crate) fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a UnitSnapshot>) -> Self {
        let mut aggregate = Self::default();
        let mut percent_sum = 0.0;
        let mut percent_count = 0usize;

        for unit in snapshots.into_iter().filter(|u| !u.hidden) {
            aggregate.total += 1;
            match unit.state {
                UnitState::Created if unit.scheduled => aggregate.queued += 1,
                UnitState::Created => aggregate.created += 1,
                UnitState::Running => {
                    if unit.joining {
                        aggregate.joining += 1;
                    } else {
                        aggregate.running += 1;
                    }
                    if let Some(p) = unit.progress.as_percent() {
                        percent_sum += p;
                        percent_count += 1;
                    }
                    aggregate.active.push(if unit.description.is_empty() {
                        unit.name.clone()
                    } else {
                        format!("{}: {}", unit.name, unit.description)
                    });
                }
                UnitState::Completed => aggregate.completed += 1,
                UnitState::Failed => aggregate.failed += 1,
                UnitState::Canceled => aggregate.canceled += 1,
            }
        }

        if percent_count > 0 {
            aggregate.percent = Some(percent_sum / percent_count as f64);
        }
        aggregate
    }

    /// Terminal units.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.canceled
    }

    /// No visible unit is queued or running.
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.running == 0 && self.joining == 0
    }
}
