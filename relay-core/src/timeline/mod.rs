//! Discrete-Event Timeline
//!
//! The timeline is the engine's scheduler: a discrete-event clock decoupled
//! from wall time, used for wire propagation delays and self-scheduling
//! components such as clocks.
//!
//! # How It Works
//!
//! 1. Logical time is anchored to a real-time epoch. While running,
//!    `now()` is the real time elapsed since the epoch; while paused it is
//!    the frozen time captured at the moment of pausing.
//!
//! 2. Entries are scheduled at absolute logical times. Entries targeting
//!    the same time merge into one bucket and later fire in registration
//!    order. The list of distinct times is kept sorted by insertion
//!    placement.
//!
//! 3. `pause()` freezes logical time without discarding the schedule.
//!    `play()` shifts the epoch forward by the paused duration, so every
//!    pending entry keeps its relative offset. `step()` is valid only
//!    while paused: it jumps logical time to exactly the next bucket's
//!    time and hands the bucket back for synchronous firing.
//!
//! 4. While running, the host drives `poll()`. When a bucket fires more
//!    than the configured lateness threshold behind schedule (e.g. the
//!    process was suspended), the epoch slips forward by the lateness so
//!    the backlog does not fire as a catch-up storm.
//!
//! The timeline is generic over the event payload and knows nothing about
//! circuits; firing an event is the caller's job. The observable
//! `TimelineState` is pushed to a registered observer only when it
//! actually changes.

mod clock;

use std::collections::HashMap;
use std::fmt;
use std::ops::Add;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

pub use clock::{ManualClock, SystemClock, WallClock};

/// A point in logical time, measured from the timeline's start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(Duration);

impl SimTime {
    /// Logical time zero.
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    /// A logical time the given number of milliseconds from the start.
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// This time as milliseconds from the start.
    pub fn as_millis(&self) -> u128 {
        self.0.as_millis()
    }

    /// This time as a duration from the start.
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`, saturating to zero if `earlier` is
    /// actually later.
    pub fn since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0.as_millis())
    }
}

/// Error raised by timeline control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("the timeline is not paused")]
    NotPaused,
    #[error("nothing is scheduled")]
    NothingScheduled,
    #[error("cannot seek behind the current logical time")]
    SeekBehindNow,
}

/// One scheduled entry: an event payload plus a short description used in
/// diagnostics when firing it fails.
#[derive(Debug)]
pub struct Scheduled<E> {
    /// What this entry is, for logs.
    pub description: &'static str,
    /// The payload handed back to the caller at fire time.
    pub event: E,
}

/// A bucket of entries that became due, all scheduled for the same logical
/// time, in registration order.
#[derive(Debug)]
pub struct Firing<E> {
    /// The logical time the bucket was scheduled for.
    pub time: SimTime,
    /// The entries, in the order they were scheduled.
    pub entries: Vec<Scheduled<E>>,
}

/// The observable scheduler state, pushed to the host so it can show or
/// hide its play/pause/step controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineState {
    /// Whether any entry is pending.
    pub has_callbacks: bool,
    /// Whether logical time is frozen.
    pub is_paused: bool,
    /// Whether `step()` would currently succeed.
    pub can_step: bool,
}

/// A discrete-event schedule over logical time.
pub struct Timeline<E> {
    clock: Box<dyn WallClock>,
    /// Real-time instant corresponding to logical zero. Shifted by
    /// `play()` and by lateness slippage.
    epoch: Instant,
    /// Frozen logical time while paused.
    frozen: Option<SimTime>,
    /// Distinct scheduled times, sorted ascending.
    times: Vec<SimTime>,
    buckets: HashMap<SimTime, Vec<Scheduled<E>>>,
    /// Fire this far behind schedule and the epoch slips forward by the
    /// lateness.
    lateness_slip: Duration,
    observer: Option<Box<dyn FnMut(TimelineState)>>,
    last_state: TimelineState,
}

impl<E> Timeline<E> {
    /// A running timeline anchored to the given clock, with logical zero
    /// at the current instant.
    pub fn new(clock: impl WallClock + 'static, lateness_slip: Duration) -> Self {
        let epoch = clock.now();
        Self {
            clock: Box::new(clock),
            epoch,
            frozen: None,
            times: Vec::new(),
            buckets: HashMap::new(),
            lateness_slip,
            observer: None,
            last_state: TimelineState::default(),
        }
    }

    /// Current logical time: the frozen time while paused, otherwise the
    /// real time elapsed since the epoch.
    pub fn now(&self) -> SimTime {
        match self.frozen {
            Some(t) => t,
            None => SimTime(self.clock.now().duration_since(self.epoch)),
        }
    }

    /// Whether logical time is frozen.
    pub fn is_paused(&self) -> bool {
        self.frozen.is_some()
    }

    /// Whether any entry is pending.
    pub fn has_callbacks(&self) -> bool {
        !self.times.is_empty()
    }

    /// The next scheduled logical time, if any.
    pub fn next_time(&self) -> Option<SimTime> {
        self.times.first().copied()
    }

    /// Number of pending entries across all buckets.
    pub fn pending_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// The current observable state.
    pub fn state(&self) -> TimelineState {
        let has_callbacks = self.has_callbacks();
        let is_paused = self.is_paused();
        TimelineState {
            has_callbacks,
            is_paused,
            can_step: is_paused && has_callbacks,
        }
    }

    /// Register the state observer. It is invoked whenever the observable
    /// state actually changes, never redundantly.
    pub fn set_observer(&mut self, observer: impl FnMut(TimelineState) + 'static) {
        self.observer = Some(Box::new(observer));
        self.last_state = self.state();
    }

    fn push_state(&mut self) {
        let state = self.state();
        if state != self.last_state {
            self.last_state = state;
            if let Some(observer) = self.observer.as_mut() {
                observer(state);
            }
        }
    }

    /// Schedule an entry at an absolute logical time. Entries at the same
    /// time merge into one bucket and fire in registration order.
    pub fn schedule_at(&mut self, time: SimTime, description: &'static str, event: E) {
        match self.buckets.get_mut(&time) {
            Some(bucket) => bucket.push(Scheduled { description, event }),
            None => {
                self.buckets.insert(time, vec![Scheduled { description, event }]);
                let pos = self.times.partition_point(|t| *t <= time);
                self.times.insert(pos, time);
            }
        }
        self.push_state();
    }

    /// Schedule an entry `delay` after the current logical time. Returns
    /// the absolute time it was scheduled at.
    pub fn schedule_after(&mut self, delay: Duration, description: &'static str, event: E) -> SimTime {
        let time = self.now() + delay;
        self.schedule_at(time, description, event);
        time
    }

    /// Freeze logical time. The schedule is kept; nothing fires until
    /// `play()` or `step()`. No-op while already paused.
    pub fn pause(&mut self) {
        if self.frozen.is_none() {
            self.frozen = Some(self.now());
            self.push_state();
        }
    }

    /// Resume from a pause. The epoch is shifted forward by the paused
    /// duration, so pending entries keep their relative offsets. No-op
    /// while running.
    pub fn play(&mut self) {
        if let Some(t) = self.frozen.take() {
            self.epoch = self.clock.now() - t.as_duration();
            self.push_state();
        }
    }

    /// Jump logical time to exactly the next bucket's time and return the
    /// bucket for synchronous firing. Valid only while paused with at
    /// least one pending entry.
    pub fn step(&mut self) -> Result<Firing<E>, TimelineError> {
        if self.frozen.is_none() {
            return Err(TimelineError::NotPaused);
        }
        if self.times.is_empty() {
            return Err(TimelineError::NothingScheduled);
        }
        let time = self.times.remove(0);
        let entries = self.buckets.remove(&time).unwrap_or_default();
        self.frozen = Some(time);
        self.push_state();
        Ok(Firing { time, entries })
    }

    /// Advance the frozen logical time to `time` without firing anything.
    /// Valid only while paused; `time` must not lie in the past. Entries
    /// scheduled at or before `time` stay pending, so callers normally
    /// drain due entries with `step()` first.
    pub fn seek(&mut self, time: SimTime) -> Result<(), TimelineError> {
        match self.frozen {
            None => Err(TimelineError::NotPaused),
            Some(now) if time < now => Err(TimelineError::SeekBehindNow),
            Some(_) => {
                self.frozen = Some(time);
                Ok(())
            }
        }
    }

    /// Pop the earliest bucket that is due at the current logical time,
    /// if any. Returns `None` while paused, when nothing is scheduled, or
    /// when the next bucket still lies in the future.
    ///
    /// When a bucket fires more than the lateness threshold behind its
    /// scheduled time, the epoch slips forward by the lateness.
    pub fn poll(&mut self) -> Option<Firing<E>> {
        if self.frozen.is_some() {
            return None;
        }
        let head = *self.times.first()?;
        let now = self.now();
        if head > now {
            return None;
        }

        self.times.remove(0);
        let entries = self.buckets.remove(&head).unwrap_or_default();

        let lateness = now.since(head);
        if lateness > self.lateness_slip {
            debug!(lateness_ms = lateness.as_millis() as u64, "timeline running late, slipping epoch");
            self.epoch += lateness;
        }

        self.push_state();
        Some(Firing { time: head, entries })
    }

    /// Real time until the next bucket is due, for the host's wait
    /// primitive. `None` while paused or when nothing is scheduled;
    /// zero when a bucket is already due.
    pub fn next_wakeup(&self) -> Option<Duration> {
        if self.frozen.is_some() {
            return None;
        }
        let head = *self.times.first()?;
        Some(head.since(self.now()))
    }

    /// Drop every pending entry. Logical time is unaffected.
    pub fn clear(&mut self) {
        self.times.clear();
        self.buckets.clear();
        self.push_state();
    }
}

impl<E> fmt::Debug for Timeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("now", &self.now())
            .field("paused", &self.is_paused())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn paused_timeline() -> (Timeline<u32>, ManualClock) {
        let clock = ManualClock::new();
        let mut timeline = Timeline::new(clock.clone(), Duration::from_millis(100));
        timeline.pause();
        (timeline, clock)
    }

    #[test]
    fn step_jumps_to_the_next_entry() {
        let (mut timeline, _clock) = paused_timeline();
        timeline.schedule_at(SimTime::from_millis(100), "tick", 1);

        let firing = timeline.step().unwrap();
        assert_eq!(firing.time, SimTime::from_millis(100));
        assert_eq!(firing.entries.len(), 1);
        assert_eq!(timeline.now(), SimTime::from_millis(100));

        // Nothing left: stepping again fails.
        assert_eq!(timeline.step().unwrap_err(), TimelineError::NothingScheduled);
        assert!(!timeline.state().can_step);
    }

    #[test]
    fn step_requires_pause() {
        let clock = ManualClock::new();
        let mut timeline: Timeline<u32> = Timeline::new(clock, Duration::from_millis(100));
        timeline.schedule_at(SimTime::from_millis(10), "tick", 1);
        assert_eq!(timeline.step().unwrap_err(), TimelineError::NotPaused);
    }

    #[test]
    fn same_time_entries_merge_and_keep_registration_order() {
        let (mut timeline, _clock) = paused_timeline();
        timeline.schedule_at(SimTime::from_millis(50), "a", 1);
        timeline.schedule_at(SimTime::from_millis(50), "b", 2);
        timeline.schedule_at(SimTime::from_millis(20), "c", 3);

        // Two distinct times, three entries.
        assert_eq!(timeline.pending_count(), 3);

        let first = timeline.step().unwrap();
        assert_eq!(first.time, SimTime::from_millis(20));

        let second = timeline.step().unwrap();
        assert_eq!(second.time, SimTime::from_millis(50));
        let order: Vec<u32> = second.entries.iter().map(|e| e.event).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn pause_freezes_and_play_preserves_offsets() {
        let clock = ManualClock::new();
        let mut timeline: Timeline<u32> = Timeline::new(clock.clone(), Duration::from_millis(100));
        timeline.schedule_at(SimTime::from_millis(100), "tick", 1);

        clock.advance(Duration::from_millis(30));
        timeline.pause();
        assert_eq!(timeline.now(), SimTime::from_millis(30));

        // Wall time passes while paused; logical time does not.
        clock.advance(Duration::from_millis(500));
        assert_eq!(timeline.now(), SimTime::from_millis(30));

        timeline.play();
        assert_eq!(timeline.now(), SimTime::from_millis(30));
        // The entry is still 70ms of real time away.
        assert_eq!(timeline.next_wakeup(), Some(Duration::from_millis(70)));
    }

    #[test]
    fn poll_fires_due_entries_in_time_order() {
        let clock = ManualClock::new();
        let mut timeline: Timeline<u32> = Timeline::new(clock.clone(), Duration::from_millis(100));
        timeline.schedule_at(SimTime::from_millis(20), "a", 1);
        timeline.schedule_at(SimTime::from_millis(40), "b", 2);

        assert!(timeline.poll().is_none());

        clock.advance(Duration::from_millis(45));
        let first = timeline.poll().unwrap();
        assert_eq!(first.time, SimTime::from_millis(20));
        let second = timeline.poll().unwrap();
        assert_eq!(second.time, SimTime::from_millis(40));
        assert!(timeline.poll().is_none());
    }

    #[test]
    fn poll_slips_epoch_when_running_late() {
        let clock = ManualClock::new();
        let mut timeline: Timeline<u32> = Timeline::new(clock.clone(), Duration::from_millis(100));
        timeline.schedule_at(SimTime::from_millis(10), "tick", 1);

        // Fire 500ms behind schedule, well past the threshold.
        clock.advance(Duration::from_millis(510));
        let firing = timeline.poll().unwrap();
        assert_eq!(firing.time, SimTime::from_millis(10));
        // The epoch slipped: logical time snapped back to the fired time.
        assert_eq!(timeline.now(), SimTime::from_millis(10));
    }

    #[test]
    fn small_lateness_does_not_slip() {
        let clock = ManualClock::new();
        let mut timeline: Timeline<u32> = Timeline::new(clock.clone(), Duration::from_millis(100));
        timeline.schedule_at(SimTime::from_millis(10), "tick", 1);

        clock.advance(Duration::from_millis(60));
        timeline.poll().unwrap();
        assert_eq!(timeline.now(), SimTime::from_millis(60));
    }

    #[test]
    fn observer_fires_only_on_changes() {
        let seen: Rc<RefCell<Vec<TimelineState>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let (mut timeline, _clock) = paused_timeline();
        timeline.set_observer(move |state| sink.borrow_mut().push(state));

        timeline.schedule_at(SimTime::from_millis(10), "a", 1);
        // Same observable state: no second notification.
        timeline.schedule_at(SimTime::from_millis(20), "b", 2);

        timeline.step().unwrap();
        timeline.step().unwrap();

        let states = seen.borrow();
        assert_eq!(states.len(), 2);
        assert!(states[0].can_step);
        assert!(!states[1].has_callbacks);
    }

    #[test]
    fn seek_validates_direction() {
        let (mut timeline, _clock) = paused_timeline();
        timeline.seek(SimTime::from_millis(80)).unwrap();
        assert_eq!(timeline.now(), SimTime::from_millis(80));
        assert_eq!(
            timeline.seek(SimTime::from_millis(10)).unwrap_err(),
            TimelineError::SeekBehindNow
        );
    }

    #[test]
    fn clear_drops_pending_entries() {
        let (mut timeline, _clock) = paused_timeline();
        timeline.schedule_at(SimTime::from_millis(10), "a", 1);
        timeline.clear();
        assert!(!timeline.has_callbacks());
        assert_eq!(timeline.step().unwrap_err(), TimelineError::NothingScheduled);
    }
}
