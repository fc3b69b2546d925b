//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Named cancellable client timers."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;

/// Timers owned by a streaming client. At most one of each kind is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    Reconnect,
    Replay,
    LatencyProbe,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Reconnect => "reconnect",
            TaskKind::Replay => "replay",
            TaskKind::LatencyProbe => "latency_probe",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledTask {
    due_ms: i64,
    period_ms: Option<i64>,
}

/// Deadline table keyed by [`TaskKind`]; scheduling a kind replaces its previous entry.
#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    tasks: BTreeMap<TaskKind, ScheduledTask>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `kind` once at `due_ms`.
    pub fn schedule_once(&mut self, kind: TaskKind, due_ms: i64) {
        self.tasks.insert(
            kind,
            ScheduledTask {
                due_ms,
                period_ms: None,
            },
        );
    }

    /// Fire `kind` at `first_due_ms` and every `period_ms` after.
    pub fn schedule_every(&mut self, kind: TaskKind, first_due_ms: i64, period_ms: i64) {
        self.tasks.insert(
            kind,
            ScheduledTask {
                due_ms: first_due_ms,
                period_ms: Some(period_ms.max(1)),
            },
        );
    }

    /// Returns whether a task of this kind was active.
    pub fn cancel(&mut self, kind: TaskKind) -> bool {
        self.tasks.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.tasks.contains_key(&kind)
    }

    pub fn due_at(&self, kind: TaskKind) -> Option<i64> {
        self.tasks.get(&kind).map(|task| task.due_ms)
    }

    pub fn next_due(&self) -> Option<i64> {
        self.tasks.values().map(|task| task.due_ms).min()
    }

    /// Take the earliest task due at or before `now_ms`.
    ///
    /// Periodic tasks are re-armed one period later; one-shot tasks are removed.
    pub fn pop_due(&mut self, now_ms: i64) -> Option<TaskKind> {
        let (kind, task) = self
            .tasks
            .iter()
            .filter(|(_, task)| task.due_ms <= now_ms)
            .min_by_key(|(kind, task)| (task.due_ms, **kind))
            .map(|(kind, task)| (*kind, *task))?;
        match task.period_ms {
            Some(period) => {
                self.tasks.insert(
                    kind,
                    ScheduledTask {
                        due_ms: task.due_ms + period,
                        period_ms: Some(period),
                    },
                );
            }
            None => {
                self.tasks.remove(&kind);
            }
        }
        Some(kind)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_existing_task() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule_every(TaskKind::LatencyProbe, 5_000, 5_000);
        scheduler.schedule_every(TaskKind::LatencyProbe, 7_000, 5_000);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.due_at(TaskKind::LatencyProbe), Some(7_000));
    }

    #[test]
    fn pop_due_orders_by_deadline() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule_once(TaskKind::Reconnect, 2_000);
        scheduler.schedule_every(TaskKind::Replay, 1_000, 1_000);
        assert_eq!(scheduler.next_due(), Some(1_000));
        assert_eq!(scheduler.pop_due(500), None);
        assert_eq!(scheduler.pop_due(2_000), Some(TaskKind::Replay));
        assert_eq!(scheduler.pop_due(2_000), Some(TaskKind::Reconnect));
        assert_eq!(scheduler.pop_due(2_000), Some(TaskKind::Replay));
        assert_eq!(scheduler.pop_due(2_000), None);
        assert!(!scheduler.is_scheduled(TaskKind::Reconnect));
        assert_eq!(scheduler.due_at(TaskKind::Replay), Some(3_000));
    }

    #[test]
    fn cancel_all_leaves_nothing_active() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule_once(TaskKind::Reconnect, 1);
        scheduler.schedule_every(TaskKind::Replay, 1, 1);
        assert!(scheduler.cancel(TaskKind::Reconnect));
        assert!(!scheduler.cancel(TaskKind::Reconnect));
        scheduler.cancel_all();
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_due(), None);
    }
}
