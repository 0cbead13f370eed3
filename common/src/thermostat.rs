use crate::schedule::{resolve, Demand, Interval};

pub const DEFAULT_HYSTERESIS_POS: f64 = 0.2;
pub const DEFAULT_HYSTERESIS_NEG: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    ClearOverride,
    SendAcknowledgement,
    SwitchActuator(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub above: f64,
    pub below: f64,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            above: DEFAULT_HYSTERESIS_POS,
            below: DEFAULT_HYSTERESIS_NEG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermostatState {
    pub heating_on: bool,
    /// Which threshold was crossed last; decides inside the dead band.
    pub ascending: bool,
    pub first_update: bool,
}

impl Default for ThermostatState {
    fn default() -> Self {
        Self {
            heating_on: false,
            ascending: true,
            first_update: true,
        }
    }
}

impl ThermostatState {
    pub fn commit(&mut self, on: bool) {
        self.heating_on = on;
        self.first_update = false;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Inputs<'a> {
    pub hm: i32,
    pub program: &'a [Interval],
    pub override_program: Option<&'a Interval>,
    pub temp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// `heating_on` is left untouched; only a successful write commits it.
    pub state: ThermostatState,
    pub demand: Demand,
    pub desired: bool,
    pub actions: Vec<EngineAction>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThermostatEngine {
    pub hysteresis: Hysteresis,
}

impl ThermostatEngine {
    pub fn new(hysteresis: Hysteresis) -> Self {
        Self { hysteresis }
    }

    pub fn decide(&self, demand: Demand, temp: Option<f64>, ascending: bool) -> (bool, bool) {
        let Demand::Heat { target } = demand else {
            return (false, true);
        };
        let (Some(temp), Some(target)) = (temp, target) else {
            return (true, true);
        };

        if temp <= target - self.hysteresis.below {
            (true, true)
        } else if temp >= target + self.hysteresis.above {
            (false, false)
        } else {
            (ascending, ascending)
        }
    }

    pub fn evaluate(&self, state: &ThermostatState, inputs: &Inputs<'_>) -> Decision {
        let mut actions = Vec::new();
        let resolution = resolve(inputs.hm, inputs.program, inputs.override_program);
        if resolution.override_expired {
            actions.push(EngineAction::ClearOverride);
            actions.push(EngineAction::SendAcknowledgement);
        }

        let (desired, ascending) = self.decide(resolution.demand, inputs.temp, state.ascending);
        if desired != state.heating_on || state.first_update {
            actions.push(EngineAction::SwitchActuator(desired));
        }

        Decision {
            state: ThermostatState {
                ascending,
                ..*state
            },
            demand: resolution.demand,
            desired,
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn heat(target: f64) -> Demand {
        Demand::Heat {
            target: Some(target),
        }
    }

    fn program() -> Vec<Interval> {
        vec![Interval {
            begin: 600,
            end: 800,
            status: true,
            temp: Some(21.0),
        }]
    }

    fn step(
        engine: &ThermostatEngine,
        state: &mut ThermostatState,
        inputs: &Inputs<'_>,
    ) -> Decision {
        let decision = engine.evaluate(state, inputs);
        *state = decision.state;
        for action in &decision.actions {
            if let EngineAction::SwitchActuator(on) = action {
                state.commit(*on);
            }
        }
        decision
    }

    #[test]
    fn dead_band_inherits_direction() {
        let engine = ThermostatEngine::default();
        let mut ascending = true;

        for temp in [19.0, 19.95, 20.1] {
            let (on, next) = engine.decide(heat(20.0), Some(temp), ascending);
            assert!(on, "expected heating at {temp}");
            assert!(next);
            ascending = next;
        }

        assert_eq!(engine.decide(heat(20.0), Some(20.3), ascending), (false, false));
        assert_eq!(engine.decide(heat(20.0), Some(20.0), false), (false, false));
        assert_eq!(engine.decide(heat(20.0), Some(19.85), false), (true, true));
    }

    #[test]
    fn unknown_temperature_keeps_heating() {
        let engine = ThermostatEngine::default();
        assert_eq!(engine.decide(heat(20.0), None, false), (true, true));
        assert_eq!(engine.decide(Demand::Heat { target: None }, Some(30.0), false), (true, true));
    }

    #[test]
    fn off_demand_resets_direction() {
        let engine = ThermostatEngine::default();
        assert_eq!(engine.decide(Demand::Off, Some(10.0), false), (false, true));
    }

    #[test]
    fn first_evaluation_always_switches() {
        let engine = ThermostatEngine::default();
        let state = ThermostatState::default();
        let program = program();
        let inputs = Inputs {
            hm: 1200,
            program: &program,
            override_program: None,
            temp: Some(20.0),
        };

        let decision = engine.evaluate(&state, &inputs);
        assert_eq!(decision.actions, vec![EngineAction::SwitchActuator(false)]);
    }

    #[test]
    fn unchanged_inputs_are_idempotent() {
        let engine = ThermostatEngine::default();
        let mut state = ThermostatState::default();
        let program = program();
        let inputs = Inputs {
            hm: 700,
            program: &program,
            override_program: None,
            temp: Some(20.95),
        };

        step(&engine, &mut state, &inputs);
        let settled = state;
        let again = step(&engine, &mut state, &inputs);

        assert!(again.actions.is_empty());
        assert_eq!(state, settled);
    }

    #[test]
    fn uncommitted_switch_is_requested_again() {
        let engine = ThermostatEngine::default();
        let mut state = ThermostatState::default();
        state.commit(false);
        let program = program();
        let inputs = Inputs {
            hm: 700,
            program: &program,
            override_program: None,
            temp: Some(18.0),
        };

        let first = engine.evaluate(&state, &inputs);
        state = first.state;
        let second = engine.evaluate(&state, &inputs);

        assert_eq!(second.actions, vec![EngineAction::SwitchActuator(true)]);
    }

    #[test]
    fn morning_program_scenario() {
        let engine = ThermostatEngine::default();
        let mut state = ThermostatState::default();
        let program = program();

        let morning = step(
            &engine,
            &mut state,
            &Inputs {
                hm: 700,
                program: &program,
                override_program: None,
                temp: Some(20.5),
            },
        );
        assert!(morning.desired);
        assert_eq!(morning.demand.target(), Some(21.0));
        assert!(state.heating_on);

        let later = step(
            &engine,
            &mut state,
            &Inputs {
                hm: 900,
                program: &program,
                override_program: None,
                temp: Some(5.0),
            },
        );
        assert!(!later.desired);
        assert_eq!(later.actions, vec![EngineAction::SwitchActuator(false)]);
        assert!(state.ascending);
    }

    #[test]
    fn expired_override_clears_before_acknowledging() {
        let engine = ThermostatEngine::default();
        let mut state = ThermostatState::default();
        state.commit(true);
        let program = Vec::new();
        let boost = Interval {
            begin: 1000,
            end: 1200,
            status: true,
            temp: Some(22.0),
        };

        let during = engine.evaluate(
            &state,
            &Inputs {
                hm: 1100,
                program: &program,
                override_program: Some(&boost),
                temp: Some(19.0),
            },
        );
        assert!(during.actions.is_empty());

        let after = engine.evaluate(
            &state,
            &Inputs {
                hm: 1200,
                program: &program,
                override_program: Some(&boost),
                temp: Some(19.0),
            },
        );
        assert_eq!(
            after.actions,
            vec![
                EngineAction::ClearOverride,
                EngineAction::SendAcknowledgement,
                EngineAction::SwitchActuator(false),
            ]
        );
    }
}
