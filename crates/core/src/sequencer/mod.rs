//! Scene-level coordination of the seed head workers.
//!
//! The sequencer periodically decides to "warp": it pauses every registered
//! task at its next checkpoint and switches the star field into warp mode for
//! a while. A warp is only armed once the designated trigger task has parked
//! itself, and a random number of candidate windows is dodged first so the
//! cadence does not become regular.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex, MutexGuard,
    },
    time::Instant,
};

use crate::{
    config::WarpConfig,
    context::Outcome,
    random::SimRng,
    timeline::{seconds, Deadline},
    Result, SeedheadError, TaskId,
};

/// Pause control for one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskControl {
    /// Requested by the sequencer.
    pub pause: bool,
    /// Seconds between pause re-checks while parked.
    pub delay: f64,
    /// Reported by the task while it is parked at a checkpoint.
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpPhase {
    Idle,
    /// The trigger task has been told to pause; waiting for it to comply.
    ArmingWait,
    /// The trigger task is parked; the warp starts on the next tick that
    /// sees it paused.
    Armed,
    Warped,
}

impl WarpPhase {
    /// Armed and warped phases hold every paused task, not just the trigger.
    fn holds_tasks(self) -> bool {
        matches!(self, WarpPhase::Armed | WarpPhase::Warped)
    }
}

#[derive(Debug)]
struct SequencerState {
    controls: BTreeMap<TaskId, TaskControl>,
    phase: WarpPhase,
    deadline: Deadline,
    dodge: u32,
    rng: SimRng,
}

impl SequencerState {
    fn roll_dodge(&mut self, config: &WarpConfig) {
        if self.dodge == 0 {
            let max = i64::from(config.dodge_max) + 1;
            self.dodge = self.rng.int_range(i64::from(config.dodge_min), max) as u32;
        }
    }

    fn warp_time(&mut self, config: &WarpConfig) -> f64 {
        self.rng.choose_or(&config.durations, 20.0)
    }

    fn trigger(&self, config: &WarpConfig) -> Result<TaskControl> {
        self.controls
            .get(&config.trigger_task)
            .copied()
            .ok_or(SeedheadError::UnregisteredTask(config.trigger_task))
    }
}

/// Shared warp state machine and per-task pause table.
#[derive(Debug)]
pub struct Sequencer {
    config: WarpConfig,
    state: Mutex<SequencerState>,
    released: Condvar,
    star_warp: AtomicBool,
    shut_down: AtomicBool,
}

impl Sequencer {
    pub fn new(config: WarpConfig, rng: SimRng, now: Instant) -> Self {
        let mut state = SequencerState {
            controls: BTreeMap::new(),
            phase: WarpPhase::Idle,
            deadline: Deadline::after(now, 0.0),
            dodge: 0,
            rng,
        };
        state.roll_dodge(&config);
        let first_window = state.warp_time(&config);
        state.deadline.reset(now, first_window);

        Self {
            config,
            state: Mutex::new(state),
            released: Condvar::new(),
            star_warp: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Adds `task` to the control table, unpaused, with the default poll
    /// delay.
    pub fn register(&self, task: TaskId) -> Result<()> {
        let mut state = self.lock()?;
        state.controls.insert(
            task,
            TaskControl {
                pause: false,
                delay: self.config.default_poll_delay,
                paused: false,
            },
        );
        Ok(())
    }

    pub fn control(&self, task: TaskId) -> Result<TaskControl> {
        self.lock()?
            .controls
            .get(&task)
            .copied()
            .ok_or(SeedheadError::UnregisteredTask(task))
    }

    pub fn set_control(&self, task: TaskId, pause: bool, delay: f64) -> Result<()> {
        let mut state = self.lock()?;
        let control = state
            .controls
            .get_mut(&task)
            .ok_or(SeedheadError::UnregisteredTask(task))?;
        control.pause = pause;
        control.delay = delay;
        if !pause {
            self.released.notify_all();
        }
        Ok(())
    }

    pub fn tasks(&self) -> Result<Vec<TaskId>> {
        Ok(self.lock()?.controls.keys().copied().collect())
    }

    pub fn phase(&self) -> Result<WarpPhase> {
        Ok(self.lock()?.phase)
    }

    pub fn dodges_remaining(&self) -> Result<u32> {
        Ok(self.lock()?.dodge)
    }

    /// Whether the star field should render in warp mode.
    pub fn star_warp(&self) -> bool {
        self.star_warp.load(Ordering::Relaxed)
    }

    /// Wakes every parked task and makes further checkpoints return
    /// immediately.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        // Take the lock so a task between its flag check and its wait
        // cannot miss the notification.
        let _guard = self.state.lock();
        self.released.notify_all();
    }

    /// Cooperative yield point for `task`. Blocks while the sequencer holds
    /// the task paused, reporting `paused` in the control table for the
    /// duration.
    pub fn checkpoint(&self, task: TaskId) -> Result<Outcome> {
        let trigger = self.config.trigger_task;
        let mut state = self.lock()?;
        if !state.controls.contains_key(&task) {
            return Err(SeedheadError::UnregisteredTask(task));
        }

        let mut parked = false;
        let outcome = loop {
            if self.shut_down.load(Ordering::SeqCst) {
                break Outcome::Interrupted;
            }
            let holding = state.phase.holds_tasks() || task == trigger;
            let Some(control) = state.controls.get_mut(&task) else {
                break Outcome::Completed;
            };
            if !(holding && control.pause) {
                break Outcome::Completed;
            }
            control.paused = true;
            let delay = seconds(control.delay.max(0.001));
            if !parked {
                tracing::debug!(task, "task parked by sequencer");
                parked = true;
            }
            state = self
                .released
                .wait_timeout(state, delay)
                .map_err(|_| SeedheadError::msg("sequencer has been poisoned"))?
                .0;
        };

        if let Some(control) = state.controls.get_mut(&task) {
            control.paused = false;
        }
        if parked {
            tracing::debug!(task, "task released by sequencer");
        }
        Ok(outcome)
    }

    /// Advances the warp state machine. Called by the main loop once per
    /// frame.
    pub fn tick(&self, now: Instant) -> Result<WarpPhase> {
        let config = &self.config;
        let mut state = self.lock()?;

        if state.deadline.expired(now) {
            match state.phase {
                WarpPhase::Armed | WarpPhase::Warped => {
                    for control in state.controls.values_mut() {
                        control.pause = false;
                    }
                    self.star_warp.store(false, Ordering::Relaxed);
                    let calm = state.warp_time(config);
                    state.deadline.reset(now, calm);
                    state.roll_dodge(config);
                    state.phase = WarpPhase::Idle;
                    self.released.notify_all();
                    tracing::info!(calm_secs = calm, dodges = state.dodge, "warp released");
                }
                WarpPhase::Idle | WarpPhase::ArmingWait => {
                    if state.dodge > 0 {
                        state.dodge -= 1;
                        let calm = state.warp_time(config);
                        state.deadline.reset(now, calm);
                        state.phase = WarpPhase::Idle;
                        tracing::debug!(dodges = state.dodge, "warp window dodged");
                    } else if !state.trigger(config)?.paused {
                        if let Some(trigger) = state.controls.get_mut(&config.trigger_task) {
                            trigger.pause = true;
                            trigger.delay = config.trigger_poll_delay;
                            trigger.paused = false;
                        }
                        state.deadline.reset(now, config.arming_timeout);
                        state.phase = WarpPhase::ArmingWait;
                    } else {
                        state.deadline.reset(now, config.sync_timeout);
                        state.phase = WarpPhase::Armed;
                        tracing::info!(
                            trigger = config.trigger_task,
                            timeout_secs = config.sync_timeout,
                            "trigger task parked, warp armed"
                        );
                    }
                }
            }
        } else if state.phase == WarpPhase::Armed && state.trigger(config)?.paused {
            self.star_warp.store(true, Ordering::Relaxed);
            for control in state.controls.values_mut() {
                control.pause = true;
                control.delay = config.broadcast_poll_delay;
            }
            let length = state.warp_time(config);
            state.deadline.reset(now, length);
            state.phase = WarpPhase::Warped;
            tracing::info!(length_secs = length, "warp started");
        }

        Ok(state.phase)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SequencerState>> {
        self.state
            .lock()
            .map_err(|_| SeedheadError::msg("sequencer has been poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    fn config(dodges: u32) -> WarpConfig {
        WarpConfig {
            trigger_task: 3,
            dodge_min: dodges,
            dodge_max: dodges,
            durations: vec![5.0],
            arming_timeout: 2.0,
            sync_timeout: 30.0,
            trigger_poll_delay: 0.01,
            broadcast_poll_delay: 0.01,
            default_poll_delay: 0.01,
            ..WarpConfig::default()
        }
    }

    fn sequencer(dodges: u32, now: Instant) -> Arc<Sequencer> {
        let sequencer = Sequencer::new(config(dodges), SimRng::seeded(5), now);
        for task in [3, 6, 7] {
            sequencer.register(task).unwrap();
        }
        Arc::new(sequencer)
    }

    fn wait_until_paused(sequencer: &Sequencer, task: TaskId) {
        for _ in 0..500 {
            if sequencer.control(task).unwrap().paused {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("task {task} never reported paused");
    }

    fn secs(now: Instant, secs: f64) -> Instant {
        now + seconds(secs)
    }

    #[test]
    fn unregistered_task_fails_fast() {
        let sequencer = sequencer(0, Instant::now());
        assert!(matches!(
            sequencer.checkpoint(99),
            Err(SeedheadError::UnregisteredTask(99))
        ));
        assert!(matches!(
            sequencer.control(42),
            Err(SeedheadError::UnregisteredTask(42))
        ));
    }

    #[test]
    fn checkpoint_passes_straight_through_when_idle() {
        let sequencer = sequencer(0, Instant::now());
        assert_eq!(sequencer.checkpoint(6).unwrap(), Outcome::Completed);
        assert!(!sequencer.control(6).unwrap().paused);
    }

    #[test]
    fn dodges_skip_windows_before_arming() {
        let t0 = Instant::now();
        let sequencer = sequencer(2, t0);
        assert_eq!(sequencer.dodges_remaining().unwrap(), 2);

        assert_eq!(sequencer.tick(secs(t0, 5.0)).unwrap(), WarpPhase::Idle);
        assert_eq!(sequencer.dodges_remaining().unwrap(), 1);
        assert_eq!(sequencer.tick(secs(t0, 10.0)).unwrap(), WarpPhase::Idle);
        assert_eq!(sequencer.dodges_remaining().unwrap(), 0);
        assert_eq!(sequencer.tick(secs(t0, 15.0)).unwrap(), WarpPhase::ArmingWait);
        assert!(sequencer.control(3).unwrap().pause);
    }

    #[test]
    fn unexpired_deadline_is_a_no_op() {
        let t0 = Instant::now();
        let sequencer = sequencer(3, t0);
        assert_eq!(sequencer.tick(secs(t0, 1.0)).unwrap(), WarpPhase::Idle);
        assert_eq!(sequencer.dodges_remaining().unwrap(), 3);
    }

    #[test]
    fn full_warp_cycle_parks_and_releases_every_task() {
        let t0 = Instant::now();
        let sequencer = sequencer(0, t0);

        // Window expires with no dodges left: command the trigger to pause.
        assert_eq!(sequencer.tick(secs(t0, 5.0)).unwrap(), WarpPhase::ArmingWait);

        let trigger = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.checkpoint(3).unwrap())
        };
        wait_until_paused(&sequencer, 3);

        assert_eq!(sequencer.tick(secs(t0, 6.0)).unwrap(), WarpPhase::ArmingWait);
        assert_eq!(sequencer.tick(secs(t0, 7.0)).unwrap(), WarpPhase::Armed);
        assert!(!sequencer.star_warp());

        assert_eq!(sequencer.tick(secs(t0, 7.5)).unwrap(), WarpPhase::Warped);
        assert!(sequencer.star_warp());
        for task in sequencer.tasks().unwrap() {
            assert!(sequencer.control(task).unwrap().pause);
        }

        let follower = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.checkpoint(6).unwrap())
        };
        wait_until_paused(&sequencer, 6);

        assert_eq!(sequencer.tick(secs(t0, 12.5)).unwrap(), WarpPhase::Idle);
        assert!(!sequencer.star_warp());
        assert_eq!(trigger.join().unwrap(), Outcome::Completed);
        assert_eq!(follower.join().unwrap(), Outcome::Completed);
        for task in sequencer.tasks().unwrap() {
            let control = sequencer.control(task).unwrap();
            assert!(!control.pause);
            assert!(!control.paused);
        }
    }

    #[test]
    fn non_trigger_tasks_are_not_held_outside_a_warp() {
        let t0 = Instant::now();
        let sequencer = sequencer(0, t0);
        sequencer.set_control(6, true, 0.01).unwrap();
        assert_eq!(sequencer.checkpoint(6).unwrap(), Outcome::Completed);
    }

    #[test]
    fn shutdown_interrupts_parked_tasks() {
        let t0 = Instant::now();
        let sequencer = sequencer(0, t0);
        sequencer.set_control(3, true, 60.0).unwrap();

        let trigger = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.checkpoint(3).unwrap())
        };
        wait_until_paused(&sequencer, 3);
        sequencer.shutdown();
        assert_eq!(trigger.join().unwrap(), Outcome::Interrupted);
        assert!(!sequencer.control(3).unwrap().paused);
    }

    #[test]
    fn safety_timeout_releases_an_armed_sequence() {
        let t0 = Instant::now();
        let sequencer = sequencer(0, t0);
        sequencer.tick(secs(t0, 5.0)).unwrap();

        let trigger = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.checkpoint(3).unwrap())
        };
        wait_until_paused(&sequencer, 3);
        assert_eq!(sequencer.tick(secs(t0, 7.0)).unwrap(), WarpPhase::Armed);
        // No tick observes the armed state before the safety timeout runs out.
        assert_eq!(sequencer.tick(secs(t0, 40.0)).unwrap(), WarpPhase::Idle);
        assert_eq!(trigger.join().unwrap(), Outcome::Completed);
        assert!(!sequencer.control(3).unwrap().pause);
    }
}
