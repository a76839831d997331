use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::models::Attribution;

use super::{
    events::{FocusBlockCompleted, FocusEvent},
    FocusSnapshot, FocusStatus, Phase, SessionDurations, SessionPlan, SessionState,
};

/// Pomodoro plan state machine.
///
/// The controller never touches a clock source of its own: the host calls
/// [`tick`](Self::tick) once per elapsed second while the plan runs and hands
/// the returned events to whatever persists them.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusSessionController {
    attribution: Attribution,
    durations: SessionDurations,
    plan: Option<SessionPlan>,
    state: SessionState,
}

impl FocusSessionController {
    pub fn new(attribution: Attribution, durations: SessionDurations) -> Self {
        Self {
            attribution,
            durations,
            plan: None,
            state: SessionState::idle(&durations),
        }
    }

    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    pub fn durations(&self) -> SessionDurations {
        self.durations
    }

    pub fn plan(&self) -> Option<&SessionPlan> {
        self.plan.as_ref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn total_cycles(&self) -> u32 {
        self.plan.as_ref().map_or(0, |plan| plan.total_cycles)
    }

    pub fn status(&self) -> FocusStatus {
        match (&self.plan, self.state.is_active, self.state.is_running) {
            (_, true, true) => FocusStatus::Running,
            (_, true, false) => FocusStatus::Paused,
            (Some(plan), false, _) if self.state.cycles_completed == plan.total_cycles => {
                FocusStatus::Completed
            }
            _ => FocusStatus::Idle,
        }
    }

    /// Goal hour currently being worked through, counting from one.
    pub fn hour_in_progress(&self) -> u32 {
        let Some(plan) = &self.plan else {
            return 0;
        };
        let hour = self.state.cycles_completed / 2 + 1;
        hour.min(plan.goal_hours)
    }

    pub fn snapshot(&self) -> FocusSnapshot {
        FocusSnapshot {
            status: self.status(),
            state: self.state.clone(),
            plan: self.plan.clone(),
            total_cycles: self.total_cycles(),
            hour_in_progress: self.hour_in_progress(),
        }
    }

    pub fn start_plan(&mut self, hours: u32) -> Result<Vec<FocusEvent>> {
        self.start_plan_at(hours, Utc::now())
    }

    pub fn start_plan_at(&mut self, hours: u32, now: DateTime<Utc>) -> Result<Vec<FocusEvent>> {
        if hours == 0 {
            bail!("study goal must be at least one hour");
        }
        if self.state.is_active {
            bail!("a focus plan is already active");
        }
        let total_cycles = hours
            .checked_mul(2)
            .ok_or_else(|| anyhow!("study goal of {hours} hours is too large"))?;

        let plan = SessionPlan {
            id: Uuid::new_v4().to_string(),
            goal_hours: hours,
            total_cycles,
            focus_duration_secs: self.durations.focus_secs(),
            break_duration_secs: self.durations.break_secs(),
        };

        self.state = SessionState {
            phase: Phase::Focus,
            seconds_remaining: plan.focus_duration_secs,
            cycles_completed: 0,
            is_running: true,
            is_active: true,
        };

        info!(
            "Started focus plan {} ({} h, {} focus blocks)",
            plan.id, hours, total_cycles
        );

        let event = FocusEvent::PlanStarted {
            attribution: self.attribution.clone(),
            plan_id: plan.id.clone(),
            goal_hours: hours,
            total_cycles,
            started_at: now,
        };
        self.plan = Some(plan);

        Ok(vec![event])
    }

    pub fn tick(&mut self) -> Vec<FocusEvent> {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<FocusEvent> {
        if !self.state.is_running {
            return Vec::new();
        }

        if self.state.seconds_remaining <= 1 {
            self.state.seconds_remaining = 0;
            return self.complete_phase_at(now);
        }

        self.state.seconds_remaining -= 1;
        debug!(
            "{:?} tick, {}s remaining",
            self.state.phase, self.state.seconds_remaining
        );
        Vec::new()
    }

    pub fn complete_phase(&mut self) -> Vec<FocusEvent> {
        self.complete_phase_at(Utc::now())
    }

    /// Ends the current phase regardless of the seconds left on it.
    pub fn complete_phase_at(&mut self, now: DateTime<Utc>) -> Vec<FocusEvent> {
        let Some(plan) = self.plan.as_ref() else {
            return Vec::new();
        };
        if !self.state.is_active {
            return Vec::new();
        }

        match self.state.phase {
            Phase::Break => {
                self.state.phase = Phase::Focus;
                self.state.seconds_remaining = plan.focus_duration_secs;
                info!("Break over, focus block {} begins", self.state.cycles_completed + 1);
                Vec::new()
            }
            Phase::Focus => {
                let mut events = vec![FocusEvent::FocusBlockCompleted(FocusBlockCompleted {
                    attribution: self.attribution.clone(),
                    plan_id: plan.id.clone(),
                    duration_secs: plan.focus_duration_secs,
                    completed_at: now,
                })];

                self.state.cycles_completed += 1;

                if self.state.cycles_completed >= plan.total_cycles {
                    self.state = SessionState {
                        phase: Phase::Focus,
                        seconds_remaining: plan.focus_duration_secs,
                        cycles_completed: plan.total_cycles,
                        is_running: false,
                        is_active: false,
                    };
                    info!("Focus plan {} completed", plan.id);
                    events.push(FocusEvent::PlanCompleted {
                        attribution: self.attribution.clone(),
                        plan_id: plan.id.clone(),
                        cycles_completed: plan.total_cycles,
                        completed_at: now,
                    });
                } else {
                    self.state.phase = Phase::Break;
                    self.state.seconds_remaining = plan.break_duration_secs;
                    info!(
                        "Focus block {}/{} done, starting break",
                        self.state.cycles_completed, plan.total_cycles
                    );
                }

                events
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state.is_running {
            self.state.is_running = false;
            info!("Focus timer paused at {}s", self.state.seconds_remaining);
        }
    }

    pub fn resume(&mut self) {
        if self.state.is_active && !self.state.is_running {
            self.state.is_running = true;
            info!("Focus timer resumed at {}s", self.state.seconds_remaining);
        }
    }

    pub fn reset(&mut self) -> Vec<FocusEvent> {
        self.reset_at(Utc::now())
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) -> Vec<FocusEvent> {
        let mut events = Vec::new();
        if let Some(plan) = self.plan.take() {
            if self.state.is_active {
                info!("Focus plan {} abandoned", plan.id);
                events.push(FocusEvent::PlanAbandoned {
                    attribution: self.attribution.clone(),
                    plan_id: plan.id,
                    cycles_completed: self.state.cycles_completed,
                    abandoned_at: now,
                });
            }
        }
        self.state = SessionState::idle(&self.durations);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(focus: u32, brk: u32) -> FocusSessionController {
        let durations = SessionDurations::new(focus, brk).expect("valid durations");
        FocusSessionController::new(Attribution::room("user-1", "room-1"), durations)
    }

    fn block_count(events: &[FocusEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, FocusEvent::FocusBlockCompleted(_)))
            .count()
    }

    fn assert_invariants(c: &FocusSessionController) {
        let state = c.state();
        assert!(state.cycles_completed <= c.total_cycles());
        let longest = c.durations().focus_secs().max(c.durations().break_secs());
        assert!(state.seconds_remaining <= longest);
        assert!(state.seconds_remaining <= c.durations().for_phase(state.phase));
        if state.is_running {
            assert!(state.is_active);
        }
    }

    #[test]
    fn start_plan_sets_two_cycles_per_hour() {
        for hours in 1..=8 {
            let mut c = controller(25 * 60, 5 * 60);
            let events = c.start_plan(hours).unwrap();

            assert_eq!(c.total_cycles(), hours * 2);
            assert_eq!(c.state().phase, Phase::Focus);
            assert_eq!(c.state().cycles_completed, 0);
            assert_eq!(c.state().seconds_remaining, 25 * 60);
            assert!(c.state().is_running && c.state().is_active);
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], FocusEvent::PlanStarted { total_cycles, .. } if total_cycles == hours * 2));
        }
    }

    #[test]
    fn zero_hour_plan_is_rejected_without_side_effects() {
        let mut c = controller(2, 1);
        let fresh = c.clone();

        assert!(c.start_plan(0).is_err());
        assert_eq!(c, fresh);
        assert_eq!(c.status(), FocusStatus::Idle);
    }

    #[test]
    fn starting_over_an_active_plan_is_rejected() {
        let mut c = controller(2, 1);
        c.start_plan(1).unwrap();
        c.tick();
        let before = c.clone();

        assert!(c.start_plan(2).is_err());
        assert_eq!(c, before);
    }

    #[test]
    fn one_hour_plan_runs_to_completion() {
        let mut c = controller(2, 1);
        c.start_plan(1).unwrap();

        assert!(c.tick().is_empty());
        let events = c.tick();
        assert_eq!(c.state().phase, Phase::Break);
        assert_eq!(c.state().cycles_completed, 1);
        assert_eq!(block_count(&events), 1);
        assert_eq!(events.len(), 1);

        assert!(c.tick().is_empty());
        assert_eq!(c.state().phase, Phase::Focus);
        assert_eq!(c.state().cycles_completed, 1);

        assert!(c.tick().is_empty());
        let events = c.tick();
        assert_eq!(c.state().cycles_completed, 2);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FocusEvent::FocusBlockCompleted(ref b) if b.duration_secs == 2));
        assert!(matches!(events[1], FocusEvent::PlanCompleted { cycles_completed: 2, .. }));
        assert!(!c.state().is_active);
        assert!(!c.state().is_running);
        assert_eq!(c.state().phase, Phase::Focus);
        assert_eq!(c.state().seconds_remaining, 2);
        assert_eq!(c.status(), FocusStatus::Completed);

        // Nothing moves once the plan is over.
        assert!(c.tick().is_empty());
        assert_eq!(c.state().phase, Phase::Focus);
    }

    #[test]
    fn focus_block_event_carries_attribution_and_plan() {
        let mut c = controller(1, 1);
        c.start_plan(1).unwrap();
        let plan_id = c.plan().unwrap().id.clone();

        let events = c.tick();
        match &events[0] {
            FocusEvent::FocusBlockCompleted(block) => {
                assert_eq!(block.attribution, Attribution::room("user-1", "room-1"));
                assert_eq!(block.plan_id, plan_id);
                assert_eq!(block.duration_secs, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn pause_freezes_countdown_until_resume() {
        let mut c = controller(10, 3);
        c.start_plan(1).unwrap();
        c.tick();
        assert_eq!(c.state().seconds_remaining, 9);

        c.pause();
        for _ in 0..5 {
            assert!(c.tick().is_empty());
        }
        assert_eq!(c.state().seconds_remaining, 9);
        assert_eq!(c.status(), FocusStatus::Paused);

        c.resume();
        c.tick();
        assert_eq!(c.state().seconds_remaining, 8);
        assert_eq!(c.status(), FocusStatus::Running);
    }

    #[test]
    fn pausing_twice_matches_pausing_once() {
        let mut once = controller(10, 3);
        once.start_plan(2).unwrap();
        once.tick();
        let mut twice = once.clone();

        once.pause();
        twice.pause();
        twice.pause();

        assert_eq!(once, twice);
    }

    #[test]
    fn resume_without_a_plan_does_nothing() {
        let mut c = controller(10, 3);
        c.resume();
        assert!(!c.state().is_running);
        assert_eq!(c.status(), FocusStatus::Idle);
    }

    #[test]
    fn reset_returns_to_fresh_idle_state() {
        let fresh = controller(3, 2);

        let mut c = fresh.clone();
        c.start_plan(2).unwrap();
        for _ in 0..7 {
            c.tick();
        }
        c.pause();
        c.resume();
        c.tick();
        let events = c.reset();

        assert_eq!(c, fresh);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FocusEvent::PlanAbandoned { .. }));

        // A completed plan is not abandoned.
        let mut done = fresh.clone();
        done.start_plan(1).unwrap();
        for _ in 0..20 {
            done.tick();
        }
        assert_eq!(done.status(), FocusStatus::Completed);
        assert!(done.reset().is_empty());
        assert_eq!(done, fresh);
    }

    #[test]
    fn complete_phase_skips_remaining_time() {
        let mut c = controller(600, 120);
        c.start_plan(1).unwrap();

        let events = c.complete_phase();
        assert_eq!(block_count(&events), 1);
        assert_eq!(c.state().phase, Phase::Break);
        assert_eq!(c.state().seconds_remaining, 120);

        assert!(c.complete_phase().is_empty());
        assert_eq!(c.state().phase, Phase::Focus);
        assert_eq!(c.state().seconds_remaining, 600);
    }

    #[test]
    fn hour_in_progress_is_derived_from_cycles() {
        let mut c = controller(1, 1);
        assert_eq!(c.hour_in_progress(), 0);
        c.start_plan(2).unwrap();
        assert_eq!(c.hour_in_progress(), 1);

        c.tick(); // block 1 done
        c.tick(); // break over
        assert_eq!(c.hour_in_progress(), 1);
        c.tick(); // block 2 done
        assert_eq!(c.hour_in_progress(), 2);
        c.tick();
        c.tick(); // block 3
        c.tick();
        c.tick(); // block 4, plan done
        assert_eq!(c.status(), FocusStatus::Completed);
        assert_eq!(c.hour_in_progress(), 2);
    }

    #[test]
    fn hour_in_progress_holds_at_the_largest_plan() {
        let mut c = controller(1, 1);
        c.start_plan(u32::MAX / 2).unwrap();
        assert_eq!(c.total_cycles(), u32::MAX - 1);

        c.state.cycles_completed = u32::MAX - 2;
        assert_eq!(c.hour_in_progress(), u32::MAX / 2);

        let events = c.complete_phase();
        assert_eq!(events.len(), 2);
        assert_eq!(c.status(), FocusStatus::Completed);
        assert_eq!(c.hour_in_progress(), u32::MAX / 2);
    }

    #[test]
    fn invariants_hold_across_a_long_run() {
        let mut c = controller(4, 2);
        c.start_plan(3).unwrap();
        assert_invariants(&c);

        let mut blocks = 0;
        let mut completions = 0;
        for step in 0..200 {
            if step % 17 == 0 {
                c.pause();
            }
            if step % 17 == 3 {
                c.resume();
            }
            let events = c.tick();
            blocks += block_count(&events);
            completions += events
                .iter()
                .filter(|event| matches!(event, FocusEvent::PlanCompleted { .. }))
                .count();
            assert_invariants(&c);
        }

        assert_eq!(blocks, 6);
        assert_eq!(completions, 1);
        assert_eq!(c.status(), FocusStatus::Completed);
    }
}
