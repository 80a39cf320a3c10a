//! Scripted perception scenarios
//!
//! Each scenario is a deterministic sequence of camera observations played
//! against the control server, standing in for a real vision pipeline.

use pickbot_shared::SensorReport;

/// A named, scripted run of camera observations
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub observations: Vec<SensorReport>,
}

impl Scenario {
    pub fn names() -> &'static [&'static str] {
        &["delivery", "object-lost", "noisy"]
    }

    pub fn by_name(name: &str) -> Option<Scenario> {
        match name {
            "delivery" => Some(Self::delivery()),
            "object-lost" => Some(Self::object_lost()),
            "noisy" => Some(Self::noisy()),
            _ => None,
        }
    }

    /// Happy path: find a square, pick it up, deliver it to its bin
    pub fn delivery() -> Scenario {
        Scenario {
            name: "delivery",
            description: "full pick-and-deliver cycle for a square",
            observations: vec![
                SensorReport::empty(),
                SensorReport::empty(),
                SensorReport::new("cuadrado", 30),
                SensorReport::new("cuadrado", 1200),
                SensorReport::new("cuadrado", 6000),
                SensorReport::new("cuadrado", 12000),
                SensorReport::new("cuadrado", 31000),
                SensorReport::empty(), // pick fires here
                SensorReport::empty(),
                SensorReport::new("contenedor_cuadrado", 2000),
                SensorReport::new("contenedor_cuadrado", 6000),
                SensorReport::new("contenedor_cuadrado", 15000),
                SensorReport::new("contenedor_cuadrado", 31000),
                SensorReport::empty(), // drop fires here
            ],
        }
    }

    /// The object slips out of view mid-approach and is found again
    pub fn object_lost() -> Scenario {
        Scenario {
            name: "object-lost",
            description: "target lost mid-approach, reacquired, picked up",
            observations: vec![
                SensorReport::new("cuadrado", 30),
                SensorReport::new("cuadrado", 4000),
                SensorReport::new("pared", 0),
                SensorReport::new("cuadrado", 40),
                SensorReport::new("cuadrado", 31000),
                SensorReport::empty(),
            ],
        }
    }

    /// Unknown labels and sub-threshold sightings interleaved with a real
    /// cylinder
    pub fn noisy() -> Scenario {
        Scenario {
            name: "noisy",
            description: "noisy labels around a cylinder pickup",
            observations: vec![
                SensorReport::new("sombra", 500),
                SensorReport::empty(),
                SensorReport::new("cilindro", 5),
                SensorReport::new("cilindro", 2000),
                SensorReport::new("pared", 800),
                SensorReport::new("cilindro", 8000),
                SensorReport::new("cilindro", 31000),
                SensorReport::empty(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickbot_shared::controller::{
        ControlConfig, Phase, PickPlaceController, SessionState,
    };
    use pickbot_shared::Command;

    fn play(scenario: &Scenario) -> (Vec<Command>, SessionState) {
        let controller = PickPlaceController::new(ControlConfig::default());
        let mut state = SessionState::new();
        let commands = scenario
            .observations
            .iter()
            .map(|observation| controller.step(&mut state, observation).command)
            .collect();
        (commands, state)
    }

    #[test]
    fn test_every_name_resolves() {
        for name in Scenario::names() {
            assert!(Scenario::by_name(name).is_some(), "missing scenario {name}");
        }
        assert!(Scenario::by_name("unknown").is_none());
    }

    #[test]
    fn test_delivery_scenario_completes_a_cycle() {
        let (commands, state) = play(&Scenario::delivery());

        let grabs = commands.iter().filter(|c| **c == Command::Grab).count();
        let releases = commands.iter().filter(|c| **c == Command::Release).count();
        assert_eq!(grabs, 1);
        assert_eq!(releases, 1);
        assert_eq!(state.phase, Phase::SearchObject);
        assert!(state.held_object.is_none());
    }

    #[test]
    fn test_object_lost_scenario_recovers() {
        let (commands, state) = play(&Scenario::object_lost());

        // The wall sighting forces a stop, then the square is reacquired
        assert!(commands.contains(&Command::Stop));
        assert_eq!(commands.last(), Some(&Command::Grab));
        assert_eq!(state.phase, Phase::SearchDestination);
    }

    #[test]
    fn test_noisy_scenario_still_picks_up() {
        let (commands, state) = play(&Scenario::noisy());

        assert_eq!(commands.last(), Some(&Command::Grab));
        assert!(state.held_object.is_some());
    }
}
