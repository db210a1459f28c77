//! Dial synchronization engine
//!
//! Keeps the `sec`, `size`, `pkt` and `bw` dials of each direction consistent
//! under `pkt * size * 8 = bw * sec`. Exactly one of `size`, `pkt`, `bw` is
//! locked per direction. An edit recomputes exactly one other dial, chosen by
//! [`RECOMPUTE`]. Writes made by the engine are delivered back as change
//! notifications on [`DialEngine::settle`], and a one-shot feedback flag per
//! dial swallows them so they never cascade.

use crate::dial::field::{DialField, Direction, LockableField};
use crate::dial::set::DialSet;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use DialField::{Bandwidth, PacketCount, Size};

/// Dial recomputed after an edit, indexed by `[changed][locked]`.
///
/// Columns are the locked field in the order size, pkt, bw. An entry equal
/// to its row recomputes the edited (locked) dial back from the other three.
pub const RECOMPUTE: [[DialField; 3]; 4] = [
    // sec
    [Bandwidth, Bandwidth, PacketCount],
    // size
    [Size, Bandwidth, PacketCount],
    // pkt
    [Bandwidth, PacketCount, Size],
    // bw
    [PacketCount, Size, Bandwidth],
];

/// Dial to recompute when `changed` is edited while `locked` is locked
pub fn recompute_target(changed: DialField, locked: LockableField) -> DialField {
    RECOMPUTE[changed.index()][locked.index()]
}

/// Which end of a dial's range was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    fn of(field: DialField, value: f64) -> Self {
        if value.is_finite() && value < field.min() {
            Bound::Min
        } else {
            Bound::Max
        }
    }
}

/// User-facing notice that a dial was reset because of its range
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNotice {
    pub direction: Direction,
    /// Dial whose limit would have been crossed
    pub field: DialField,
    pub bound: Bound,
}

impl RangeNotice {
    pub fn limit(&self) -> f64 {
        match self.bound {
            Bound::Min => self.field.min(),
            Bound::Max => self.field.max(),
        }
    }
}

impl fmt::Display for RangeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bound {
            Bound::Max => write!(
                f,
                "Dial reset. It would cause the {} dial to exceed its limit of {}.",
                self.field.label(),
                self.limit().trunc()
            ),
            Bound::Min => write!(
                f,
                "Dial reset. It would cause the {} dial to fall below its limit of {}.",
                self.field.label(),
                self.limit()
            ),
        }
    }
}

/// What a change notification did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeOutcome {
    /// Notification caused by an engine write; nothing recomputed
    Suppressed,
    /// The edit was kept and `recomputed` was solved from the other dials
    Updated { recomputed: DialField },
    /// The dependent dial would have left its range, so the edited dial was
    /// solved back from the other three instead
    Reverted { field: DialField },
    /// Input was not a number; the previous value was restored
    Rejected,
}

/// Result of one change notification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReport {
    pub outcome: ChangeOutcome,
    pub notices: Vec<RangeNotice>,
}

impl ChangeReport {
    fn new(outcome: ChangeOutcome) -> Self {
        Self {
            outcome,
            notices: Vec::new(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.outcome == ChangeOutcome::Suppressed
    }
}

/// A value written by the engine, awaiting its change notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialWrite {
    pub direction: Direction,
    pub field: DialField,
    pub value: f64,
}

/// Both directions' dials plus the bookkeeping that keeps them consistent
#[derive(Debug, Clone, Default)]
pub struct DialEngine {
    sets: [DialSet; 2],
    feedback: [[bool; 4]; 2],
    pending: VecDeque<DialWrite>,
}

impl DialEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dials(&self, direction: Direction) -> &DialSet {
        &self.sets[direction.index()]
    }

    /// Replace a direction's dials, keeping its lock
    pub fn load(&mut self, direction: Direction, mut set: DialSet) {
        let idx = direction.index();
        set.lock(self.sets[idx].locked());
        debug!(direction = %direction, params = %set.param_line(direction), "Dials loaded");
        self.sets[idx] = set;
    }

    /// Lock `field`; the previously locked dial becomes editable in the same step
    pub fn set_lock(&mut self, direction: Direction, field: LockableField) {
        let set = &mut self.sets[direction.index()];
        debug!(
            direction = %direction,
            from = %set.locked().field(),
            to = %field.field(),
            "Dial lock changed"
        );
        set.lock(field);
    }

    pub fn locked(&self, direction: Direction) -> LockableField {
        self.sets[direction.index()].locked()
    }

    /// True when a feedback flag is armed for the dial
    pub fn feedback_pending(&self, direction: Direction, field: DialField) -> bool {
        self.feedback[direction.index()][field.index()]
    }

    /// Writes not yet delivered back as change notifications
    pub fn pending_writes(&self) -> impl Iterator<Item = &DialWrite> {
        self.pending.iter()
    }

    /// Programmatically set a dial.
    ///
    /// The value is applied at once. Its change notification is delivered
    /// by [`DialEngine::settle`] and swallowed by the feedback flag, which is
    /// armed here, before the write is queued.
    pub fn write(&mut self, direction: Direction, field: DialField, value: f64) {
        self.sets[direction.index()].set(field, value);
        self.feedback[direction.index()][field.index()] = true;

        // one notification per dial: a later write replaces the queued value
        if let Some(queued) = self
            .pending
            .iter_mut()
            .find(|w| w.direction == direction && w.field == field)
        {
            queued.value = value;
        } else {
            self.pending.push_back(DialWrite {
                direction,
                field,
                value,
            });
        }
        debug!(direction = %direction, field = %field, value = value, "Dial write scheduled");
    }

    /// Deliver every queued write as a change notification
    pub fn settle(&mut self) -> Vec<ChangeReport> {
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some(write) = self.pending.pop_front() {
            reports.push(self.on_field_changed(write.direction, write.field, write.value));
        }
        reports
    }

    /// Handle a dial's value change (on release or blur).
    pub fn on_field_changed(
        &mut self,
        direction: Direction,
        field: DialField,
        value: f64,
    ) -> ChangeReport {
        let d = direction.index();

        if self.feedback[d][field.index()] {
            self.feedback[d][field.index()] = false;
            self.sets[d].set(field, value);
            debug!(direction = %direction, field = %field, value = value, "Feedback consumed");
            return ChangeReport::new(ChangeOutcome::Suppressed);
        }

        debug!(direction = %direction, field = %field, value = value, "Dial changed");
        let previous = self.sets[d].get(field);
        let normalized = field.normalize(value);

        if !normalized.is_finite() {
            warn!(direction = %direction, field = %field, "Dial value is not a number");
            let mut report = ChangeReport::new(ChangeOutcome::Rejected);
            report.notices.push(RangeNotice {
                direction,
                field,
                bound: Bound::of(field, normalized),
            });
            self.write(direction, field, previous);
            return report;
        }

        let mut notices = Vec::new();
        let accepted = field.clamp(normalized);
        if accepted != normalized {
            warn!(
                direction = %direction,
                field = %field,
                value = normalized,
                clamped = accepted,
                "Dial value out of range"
            );
            notices.push(RangeNotice {
                direction,
                field,
                bound: Bound::of(field, normalized),
            });
        }
        if accepted != value {
            self.write(direction, field, accepted);
        } else {
            self.sets[d].set(field, accepted);
        }

        let target = recompute_target(field, self.sets[d].locked());
        let candidate = target.normalize(self.sets[d].derive(target));

        let outcome = if target.accepts(candidate) {
            self.write(direction, target, candidate);
            ChangeOutcome::Updated { recomputed: target }
        } else {
            warn!(
                direction = %direction,
                field = %field,
                dependent = %target,
                value = candidate,
                "Dependent dial out of range, reverting edit"
            );
            notices.push(RangeNotice {
                direction,
                field: target,
                bound: Bound::of(target, candidate),
            });
            let solved = field.normalize(self.sets[d].derive(field));
            let restored = if field.accepts(solved) { solved } else { previous };
            self.write(direction, field, restored);
            ChangeOutcome::Reverted { field }
        };

        ChangeReport { outcome, notices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dial::set::TestParameters;
    use DialField::Seconds;
    use proptest::prelude::*;

    const CS: Direction = Direction::ClientToServer;

    fn engine_with(locked: LockableField) -> DialEngine {
        let mut engine = DialEngine::new();
        engine.set_lock(CS, locked);
        engine
    }

    #[test]
    fn test_precedence_table() {
        use LockableField as L;
        assert_eq!(recompute_target(Seconds, L::Size), Bandwidth);
        assert_eq!(recompute_target(Seconds, L::PacketCount), Bandwidth);
        assert_eq!(recompute_target(Seconds, L::Bandwidth), PacketCount);
        assert_eq!(recompute_target(Size, L::Size), Size);
        assert_eq!(recompute_target(Size, L::PacketCount), Bandwidth);
        assert_eq!(recompute_target(Size, L::Bandwidth), PacketCount);
        assert_eq!(recompute_target(PacketCount, L::Size), Bandwidth);
        assert_eq!(recompute_target(PacketCount, L::PacketCount), PacketCount);
        assert_eq!(recompute_target(PacketCount, L::Bandwidth), Size);
        assert_eq!(recompute_target(Bandwidth, L::Size), PacketCount);
        assert_eq!(recompute_target(Bandwidth, L::PacketCount), Size);
        assert_eq!(recompute_target(Bandwidth, L::Bandwidth), Bandwidth);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let mut engine = DialEngine::new();
        assert_eq!(engine.locked(CS), LockableField::Size);
        for lock in [LockableField::PacketCount, LockableField::Bandwidth, LockableField::Size] {
            engine.set_lock(CS, lock);
            let locked = DialField::ALL
                .iter()
                .filter(|f| engine.dials(CS).is_locked(**f))
                .count();
            assert_eq!(locked, 1);
            assert!(engine.dials(CS).is_locked(lock.field()));
        }
        assert_eq!(engine.locked(Direction::ServerToClient), LockableField::Size);
    }

    #[test]
    fn test_seconds_edit_recomputes_bandwidth() {
        let mut engine = engine_with(LockableField::Size);
        let report = engine.on_field_changed(CS, Seconds, 6.0);
        assert_eq!(report.outcome, ChangeOutcome::Updated { recomputed: Bandwidth });
        assert!(report.notices.is_empty());
        assert_eq!(engine.dials(CS).bandwidth_mbps(), 0.04);
        assert_eq!(engine.dials(CS).size(), 1000.0);
    }

    #[test]
    fn test_bandwidth_edit_recomputes_packets_when_size_locked() {
        let mut engine = engine_with(LockableField::Size);
        let report = engine.on_field_changed(CS, Bandwidth, 1.0);
        assert_eq!(report.outcome, ChangeOutcome::Updated { recomputed: PacketCount });
        assert_eq!(engine.dials(CS).packets(), 375.0);
    }

    #[test]
    fn test_packets_edit_recomputes_size_when_bandwidth_locked() {
        let mut engine = engine_with(LockableField::Bandwidth);
        let report = engine.on_field_changed(CS, PacketCount, 40.0);
        assert_eq!(report.outcome, ChangeOutcome::Updated { recomputed: Size });
        assert_eq!(engine.dials(CS).size(), 750.0);
        assert_eq!(engine.dials(CS).bandwidth_mbps(), 0.08);
    }

    #[test]
    fn test_feedback_swallows_engine_writes() {
        let mut engine = engine_with(LockableField::Size);
        engine.on_field_changed(CS, Seconds, 6.0);
        assert!(engine.feedback_pending(CS, Bandwidth));

        let reports = engine.settle();
        assert_eq!(reports.len(), 1);
        assert!(reports.iter().all(ChangeReport::is_suppressed));
        assert!(!engine.feedback_pending(CS, Bandwidth));
        assert_eq!(engine.pending_writes().count(), 0);

        // the flag is spent: the next user edit of the same dial recomputes
        let report = engine.on_field_changed(CS, Bandwidth, 0.16);
        assert_eq!(report.outcome, ChangeOutcome::Updated { recomputed: PacketCount });
    }

    #[test]
    fn test_programmatic_write_then_notification_recomputes_nothing() {
        let mut engine = engine_with(LockableField::Size);
        let before = *engine.dials(CS);
        engine.write(CS, PacketCount, 60.0);
        let reports = engine.settle();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_suppressed());
        assert_eq!(engine.dials(CS).packets(), 60.0);
        assert_eq!(engine.dials(CS).bandwidth_mbps(), before.bandwidth_mbps());
    }

    #[test]
    fn test_out_of_range_edit_is_clamped() {
        let mut engine = engine_with(LockableField::Size);
        let report = engine.on_field_changed(CS, Seconds, 20.0);
        assert_eq!(report.notices.len(), 1);
        assert_eq!(report.notices[0].field, Seconds);
        assert_eq!(report.notices[0].bound, Bound::Max);
        assert_eq!(engine.dials(CS).seconds(), 10.0);
        assert_eq!(
            report.notices[0].to_string(),
            "Dial reset. It would cause the seconds dial to exceed its limit of 10."
        );
        // the clamped value is written back and its notification swallowed
        assert!(engine.settle().iter().all(ChangeReport::is_suppressed));
        assert!(engine.dials(CS).residual_bits() <= 10.0 * 5_000.0);
    }

    #[test]
    fn test_dependent_overflow_reverts_edited_dial() {
        let mut engine = engine_with(LockableField::Bandwidth);
        engine.load(
            CS,
            DialSet::from_parameters(TestParameters {
                sec: 10.0,
                size: 64.0,
                pkt: 2_000_000.0,
            }),
        );
        let before = *engine.dials(CS);
        // bandwidth locked: doubling the packets would halve the size to 32
        let report = engine.on_field_changed(CS, PacketCount, 4_000_000.0);
        assert_eq!(report.outcome, ChangeOutcome::Reverted { field: PacketCount });
        assert_eq!(report.notices.len(), 1);
        assert_eq!(report.notices[0].field, Size);
        assert_eq!(report.notices[0].bound, Bound::Min);
        assert_eq!(engine.dials(CS).packets(), before.packets());
        assert_eq!(engine.dials(CS).size(), before.size());
        assert_eq!(engine.dials(CS).bandwidth_mbps(), before.bandwidth_mbps());
    }

    #[test]
    fn test_overflow_notice_names_dependent_limit() {
        let mut engine = engine_with(LockableField::Size);
        engine.load(
            CS,
            DialSet::from_parameters(TestParameters {
                sec: 1.0,
                size: 1400.0,
                pkt: 10_000.0,
            }),
        );
        // 2_000_000 packets of 1400 bytes in 1 s is 22400 Mbps
        let report = engine.on_field_changed(CS, PacketCount, 2_000_000.0);
        assert_eq!(report.outcome, ChangeOutcome::Reverted { field: PacketCount });
        assert_eq!(report.notices.len(), 1);
        assert_eq!(
            report.notices[0].to_string(),
            "Dial reset. It would cause the bandwidth dial to exceed its limit of 150."
        );
        assert_eq!(engine.dials(CS).packets(), 10_000.0);
    }

    #[test]
    fn test_not_a_number_is_rejected() {
        let mut engine = engine_with(LockableField::Size);
        let report = engine.on_field_changed(CS, Seconds, f64::NAN);
        assert_eq!(report.outcome, ChangeOutcome::Rejected);
        assert_eq!(report.notices.len(), 1);
        assert_eq!(engine.dials(CS).seconds(), 3.0);
    }

    #[test]
    fn test_locked_dial_edit_is_solved_back() {
        let mut engine = engine_with(LockableField::Size);
        let report = engine.on_field_changed(CS, Size, 500.0);
        assert_eq!(report.outcome, ChangeOutcome::Updated { recomputed: Size });
        assert_eq!(engine.dials(CS).size(), 1000.0);
    }

    fn lockable() -> impl Strategy<Value = LockableField> {
        prop_oneof![
            Just(LockableField::Size),
            Just(LockableField::PacketCount),
            Just(LockableField::Bandwidth),
        ]
    }

    fn field() -> impl Strategy<Value = DialField> {
        prop_oneof![Just(Seconds), Just(Size), Just(PacketCount), Just(Bandwidth)]
    }

    proptest! {
        #[test]
        fn test_edit_preserves_invariant_and_lock(
            sec in 1u32..=10,
            size in 64u32..=1400,
            pkt in 100u32..=13_000,
            lock in lockable(),
            changed in field(),
            fraction in 0.0f64..=1.0,
        ) {
            let mut engine = DialEngine::new();
            engine.load(CS, DialSet::from_parameters(TestParameters {
                sec: sec as f64,
                size: size as f64,
                pkt: pkt as f64,
            }));
            engine.set_lock(CS, lock);
            let initial_residual = engine.dials(CS).residual_bits();
            let locked_before = engine.dials(CS).get(lock.field());

            let value = changed.min() + (changed.max() - changed.min()) * fraction;
            let report = engine.on_field_changed(CS, changed, value);
            prop_assert!(engine.settle().iter().all(ChangeReport::is_suppressed));

            let set = engine.dials(CS);
            prop_assert_eq!(set.locked(), lock);
            if lock.field() != changed {
                prop_assert_eq!(set.get(lock.field()), locked_before);
            }
            for f in DialField::ALL {
                prop_assert!(f.accepts(set.get(f)));
            }

            // every recomputation solves one dial from the other three, so
            // what remains is that dial's rounding step, unless the edit was
            // undone entirely
            let solved = match report.outcome {
                ChangeOutcome::Updated { recomputed } => recomputed,
                ChangeOutcome::Reverted { field } => field,
                _ => changed,
            };
            let step = match solved {
                Seconds => set.bandwidth_bps(),
                Size => 8.0 * set.packets(),
                PacketCount => 8.0 * set.size(),
                Bandwidth => 5_000.0 * set.seconds(),
            };
            let slack = 1e-6 * set.packets() * set.size() * 8.0 + 1e-6;
            prop_assert!(
                set.residual_bits() <= step.max(initial_residual) + slack,
                "residual {} exceeds {} after {:?}",
                set.residual_bits(),
                step,
                report.outcome
            );
        }
    }
}
