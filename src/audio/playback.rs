//! # Gapless Playback Scheduling
//!
//! Inbound chunks are queued back to back on the output context clock:
//!
//! ```text
//! start(k)  = max(cursor, current_time)
//! cursor   += duration(k)
//! ```
//!
//! so consecutive chunks never overlap, and a chunk arriving after the queue ran dry starts
//! right away instead of in the past. Every started unit is tracked until the context reports
//! that it ended, which lets an interruption cut all of them off at once.

use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::audio::backend::{OutputContext, UnitId};
use crate::audio::codec::AudioBuffer;
use crate::error::{AppError, AppResult};

/// Where and when a chunk was placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub id: UnitId,
    pub start: f64,
    pub duration: f64,
}

/// Cursor plus the set of scheduled-but-unfinished units.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    cursor: f64,
    active: BTreeSet<UnitId>,
    next_id: UnitId,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context time at which the next chunk will start (unless the clock passed it).
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of units scheduled or playing.
    pub fn active_units(&self) -> usize {
        self.active.len()
    }

    /// Place `buffer` right after everything already queued.
    ///
    /// If the context refuses the buffer, nothing is tracked and the cursor does not move.
    pub fn schedule(
        &mut self,
        context: &mut dyn OutputContext,
        buffer: AudioBuffer,
    ) -> AppResult<ScheduledUnit> {
        let start = self.cursor.max(context.current_time());
        let duration = buffer.duration();
        let id = self.next_id;
        self.next_id += 1;

        context
            .start(id, buffer, start)
            .map_err(|e| AppError::Processing(format!("failed to start playback unit: {}", e)))?;

        self.active.insert(id);
        self.cursor = start + duration;
        trace!(unit = id, start, duration, "scheduled playback unit");

        Ok(ScheduledUnit { id, start, duration })
    }

    /// A unit played to its end. Returns whether it was still tracked.
    pub fn finished(&mut self, unit: UnitId) -> bool {
        self.active.remove(&unit)
    }

    /// Stop every tracked unit, forget them and rewind the cursor to zero.
    ///
    /// With no context (already closed) the units are only forgotten. Individual stop failures
    /// are logged and do not keep a unit tracked. Returns how many units were stopped.
    pub fn stop_all(&mut self, context: Option<&mut dyn OutputContext>) -> usize {
        let units = std::mem::take(&mut self.active);
        if let Some(context) = context {
            for &unit in &units {
                if let Err(e) = context.stop(unit) {
                    debug!(unit, error = %e, "stopping playback unit failed");
                }
            }
        }
        self.cursor = 0.0;
        units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Output context with a hand-driven clock.
    #[derive(Default)]
    struct ManualClock {
        now: f64,
        started: Vec<(UnitId, f64)>,
        stopped: Vec<UnitId>,
        refuse: bool,
    }

    #[async_trait]
    impl OutputContext for ManualClock {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn is_suspended(&self) -> bool {
            false
        }

        async fn resume(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn start(&mut self, unit: UnitId, _buffer: AudioBuffer, at: f64) -> anyhow::Result<()> {
            if self.refuse {
                anyhow::bail!("context closed");
            }
            self.started.push((unit, at));
            Ok(())
        }

        fn stop(&mut self, unit: UnitId) -> anyhow::Result<()> {
            self.stopped.push(unit);
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn seconds(duration: f64) -> AudioBuffer {
        AudioBuffer::new(vec![0.0; (duration * 24000.0).round() as usize], 24000, 1)
    }

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_chunks_are_gapless_and_ordered() {
        let mut clock = ManualClock { now: 0.2, ..Default::default() };
        let mut scheduler = PlaybackScheduler::new();

        let mut previous_end = 0.0_f64;
        let mut last = None;
        for duration in [0.5, 0.3, 0.9] {
            let cursor_before = scheduler.cursor();
            let unit = scheduler.schedule(&mut clock, seconds(duration)).unwrap();
            assert!(close_to(unit.start, cursor_before.max(clock.now)));
            assert!(unit.start + 1e-9 >= previous_end, "units overlap");
            assert!(scheduler.cursor() >= cursor_before);
            previous_end = unit.start + unit.duration;
            last = Some(unit);
        }

        let last = last.unwrap();
        assert!(close_to(scheduler.cursor(), last.start + last.duration));
        assert!(close_to(scheduler.cursor(), 0.2 + 0.5 + 0.3 + 0.9));
        assert_eq!(scheduler.active_units(), 3);
        let starts: Vec<f64> = clock.started.iter().map(|&(_, at)| at).collect();
        assert!(close_to(starts[0], 0.2) && close_to(starts[1], 0.7) && close_to(starts[2], 1.0));
    }

    #[test]
    fn test_late_chunk_starts_at_current_time() {
        let mut clock = ManualClock::default();
        let mut scheduler = PlaybackScheduler::new();

        scheduler.schedule(&mut clock, seconds(0.5)).unwrap();
        // The queue ran dry long ago
        clock.now = 3.0;
        let unit = scheduler.schedule(&mut clock, seconds(0.3)).unwrap();
        assert!(close_to(unit.start, 3.0));
        assert!(close_to(scheduler.cursor(), 3.3));
    }

    #[test]
    fn test_interruption_clears_every_unit() {
        for n in [0usize, 1, 5] {
            let mut clock = ManualClock { now: 1.0, ..Default::default() };
            let mut scheduler = PlaybackScheduler::new();
            for _ in 0..n {
                scheduler.schedule(&mut clock, seconds(0.25)).unwrap();
            }

            let stopped = scheduler.stop_all(Some(&mut clock));
            assert_eq!(stopped, n);
            assert_eq!(clock.stopped.len(), n);
            assert_eq!(scheduler.active_units(), 0);
            assert_eq!(scheduler.cursor(), 0.0);
        }
    }

    #[test]
    fn test_finished_units_are_untracked() {
        let mut clock = ManualClock::default();
        let mut scheduler = PlaybackScheduler::new();
        let unit = scheduler.schedule(&mut clock, seconds(0.1)).unwrap();

        assert!(scheduler.finished(unit.id));
        assert!(!scheduler.finished(unit.id));
        assert_eq!(scheduler.active_units(), 0);
        // Natural end does not rewind the cursor
        assert!(close_to(scheduler.cursor(), 0.1));
    }

    #[test]
    fn test_refused_buffer_leaves_state_untouched() {
        let mut clock = ManualClock { refuse: true, ..Default::default() };
        let mut scheduler = PlaybackScheduler::new();

        assert!(scheduler.schedule(&mut clock, seconds(0.5)).is_err());
        assert_eq!(scheduler.cursor(), 0.0);
        assert_eq!(scheduler.active_units(), 0);
    }

    #[test]
    fn test_stop_without_context_still_forgets_units() {
        let mut clock = ManualClock::default();
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(&mut clock, seconds(0.5)).unwrap();

        assert_eq!(scheduler.stop_all(None), 1);
        assert_eq!(scheduler.active_units(), 0);
        assert_eq!(scheduler.cursor(), 0.0);
    }
}
