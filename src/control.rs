//! Debounced actuation.
//!
//! `ActionGate` turns the per-cycle decision stream into a minimal command
//! stream: the actuator is driven only when the commanded action changes, and
//! shutdown always leaves it stopped.
//!
//! The gate is owned by the main cycle and mutated from that thread only.
//! An actuator that forwards commands to another execution context must treat
//! each `apply` call as the single atomic step for that decision.

use serde::Serialize;
use std::time::SystemTime;

use crate::planner::{Decision, NavAction};

/// Side-effecting sink for navigation actions.
pub trait Actuator: Send {
    fn apply(&mut self, action: NavAction);
}

/// Simulated actuation layer: logs each command.
#[derive(Debug, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn apply(&mut self, action: NavAction) {
        let message = match action {
            NavAction::Forward => "Moving forward",
            NavAction::TurnLeft => "Turning left",
            NavAction::TurnRight => "Turning right",
            NavAction::Stop => "Stopping",
        };
        log::info!("[ACTION] {}", message);
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn apply(&mut self, action: NavAction) {
        (**self).apply(action)
    }
}

/// Read-only snapshot of the gate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionStatus {
    pub action: NavAction,
    pub running: bool,
    pub last_action_time: SystemTime,
}

pub struct ActionGate<A: Actuator> {
    actuator: A,
    current: NavAction,
    last_change: SystemTime,
    running: bool,
    applied: u64,
}

impl<A: Actuator> ActionGate<A> {
    /// A gate that is not yet running. Decisions are ignored until `initialize`.
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            current: NavAction::Stop,
            last_change: SystemTime::now(),
            running: false,
            applied: 0,
        }
    }

    /// Start accepting decisions. The platform is assumed stopped; nothing is
    /// applied until the first decision that differs from `STOP`.
    pub fn initialize(&mut self) {
        self.running = true;
        self.current = NavAction::Stop;
        self.last_change = SystemTime::now();
        log::info!("ActionGate: initialized (current action {})", self.current);
    }

    /// Apply `decision` if its action differs from the current one.
    ///
    /// Returns true when the actuator was driven.
    pub fn execute_decision(&mut self, decision: &Decision) -> bool {
        if !self.running || decision.action == self.current {
            return false;
        }
        log::debug!(
            "ActionGate: {} -> {} ({})",
            self.current,
            decision.action,
            decision.reasoning
        );
        self.current = decision.action;
        self.last_change = SystemTime::now();
        self.apply(decision.action);
        true
    }

    /// Apply a command given by name, e.g. from an external command source.
    ///
    /// Names outside the four canonical actions are logged and ignored.
    pub fn execute_command(&mut self, name: &str) -> bool {
        match name.parse::<NavAction>() {
            Ok(action) => self.execute_decision(&Decision::new(action, "external command")),
            Err(err) => {
                log::warn!("[ACTION] Unknown action: {} ({})", name, err);
                false
            }
        }
    }

    /// Force a final `STOP` and stop accepting decisions. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.apply(NavAction::Stop);
        self.current = NavAction::Stop;
        self.last_change = SystemTime::now();
        self.running = false;
        log::info!(
            "ActionGate: shutdown complete ({} commands applied)",
            self.applied
        );
    }

    pub fn status(&self) -> ActionStatus {
        ActionStatus {
            action: self.current,
            running: self.running,
            last_action_time: self.last_change,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of commands sent to the actuator so far.
    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn apply(&mut self, action: NavAction) {
        self.applied += 1;
        self.actuator.apply(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        applied: Vec<NavAction>,
    }

    impl Actuator for Recorder {
        fn apply(&mut self, action: NavAction) {
            self.applied.push(action);
        }
    }

    fn decision(action: NavAction) -> Decision {
        Decision::new(action, "test")
    }

    fn running_gate() -> ActionGate<Recorder> {
        let mut gate = ActionGate::new(Recorder::default());
        gate.initialize();
        gate
    }

    #[test]
    fn initialize_does_not_apply() {
        let gate = running_gate();
        assert!(gate.actuator().applied.is_empty());
        assert_eq!(gate.status().action, NavAction::Stop);
        assert!(gate.status().running);
    }

    #[test]
    fn repeated_actions_apply_once_per_change() {
        let mut gate = running_gate();
        for action in [
            NavAction::Forward,
            NavAction::Stop,
            NavAction::Stop,
            NavAction::Forward,
        ] {
            gate.execute_decision(&decision(action));
        }
        assert_eq!(
            gate.actuator().applied,
            vec![NavAction::Forward, NavAction::Stop, NavAction::Forward]
        );
    }

    #[test]
    fn transitions_from_forward_apply_twice() {
        let mut gate = running_gate();
        gate.execute_decision(&decision(NavAction::Forward));
        let before = gate.applied_count();

        for action in [
            NavAction::Forward,
            NavAction::Stop,
            NavAction::Stop,
            NavAction::Forward,
        ] {
            gate.execute_decision(&decision(action));
        }
        assert_eq!(gate.applied_count() - before, 2);
    }

    #[test]
    fn initial_stop_decision_is_suppressed() {
        let mut gate = running_gate();
        assert!(!gate.execute_decision(&decision(NavAction::Stop)));
        assert!(gate.actuator().applied.is_empty());
    }

    #[test]
    fn decisions_before_initialize_are_ignored() {
        let mut gate = ActionGate::new(Recorder::default());
        assert!(!gate.execute_decision(&decision(NavAction::Forward)));
        assert!(gate.actuator().applied.is_empty());
        assert!(!gate.status().running);
    }

    #[test]
    fn shutdown_forces_stop_once() {
        let mut gate = running_gate();
        gate.execute_decision(&decision(NavAction::Forward));
        gate.shutdown();
        gate.shutdown();

        assert_eq!(
            gate.actuator().applied,
            vec![NavAction::Forward, NavAction::Stop]
        );
        let status = gate.status();
        assert_eq!(status.action, NavAction::Stop);
        assert!(!status.running);
    }

    #[test]
    fn shutdown_applies_stop_even_when_already_stopped() {
        let mut gate = running_gate();
        gate.shutdown();
        assert_eq!(gate.actuator().applied, vec![NavAction::Stop]);
    }

    #[test]
    fn decisions_after_shutdown_are_ignored() {
        let mut gate = running_gate();
        gate.shutdown();
        assert!(!gate.execute_decision(&decision(NavAction::TurnLeft)));
        assert_eq!(gate.actuator().applied, vec![NavAction::Stop]);
    }

    #[test]
    fn unknown_command_is_a_no_op() {
        let mut gate = running_gate();
        assert!(!gate.execute_command("JUMP"));
        assert!(gate.execute_command("TURN_LEFT"));
        assert_eq!(gate.actuator().applied, vec![NavAction::TurnLeft]);
    }

    #[test]
    fn transition_updates_last_action_time() {
        let mut gate = running_gate();
        let before = gate.status().last_action_time;
        std::thread::sleep(std::time::Duration::from_millis(2));
        gate.execute_decision(&decision(NavAction::TurnRight));
        assert!(gate.status().last_action_time > before);

        let changed = gate.status().last_action_time;
        gate.execute_decision(&decision(NavAction::TurnRight));
        assert_eq!(gate.status().last_action_time, changed);
    }
}
