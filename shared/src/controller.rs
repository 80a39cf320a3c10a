//! Pick-and-Place Controller
//!
//! The per-session decision engine: consumes one sensor report plus the
//! session's mutable state and produces exactly one command, plus a velocity
//! profile change when the selected profile differs from the active one.
//!
//! Every `(phase, report)` pair maps to a defined outcome; unknown or invalid
//! labels are ordinary "no valid target" inputs to the search algorithm, not
//! errors.

use std::collections::HashMap;

use tracing::error;

use crate::profile::{ConfigError, ProfileKey, ProfileTable, VelocityProfile};
use crate::{control, Command, DestinationClass, ObjectClass, SensorReport};

/// One phase of the pick-up-and-deliver cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SearchObject,
    ApproachObject,
    Pick,
    SearchDestination,
    ApproachDestination,
    Drop,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::SearchObject => "search_object",
            Phase::ApproachObject => "approach_object",
            Phase::Pick => "pick",
            Phase::SearchDestination => "search_destination",
            Phase::ApproachDestination => "approach_destination",
            Phase::Drop => "drop",
        }
    }
}

/// Which way the robot turns while searching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Left,
    Right,
}

impl SearchDirection {
    fn flipped(self) -> Self {
        match self {
            SearchDirection::Left => SearchDirection::Right,
            SearchDirection::Right => SearchDirection::Left,
        }
    }

    fn turn_command(self) -> Command {
        match self {
            SearchDirection::Left => Command::TurnLeft,
            SearchDirection::Right => Command::TurnRight,
        }
    }
}

/// Mutable state owned by one robot session.
///
/// Created when a connection is accepted and destroyed with it; a
/// reconnecting robot starts its cycle over.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    /// The object class currently being pursued; refreshed on every valid
    /// sighting while approaching
    pub target_object: Option<ObjectClass>,
    /// Set at pick time; drives destination routing until the drop
    pub held_object: Option<ObjectClass>,
    /// Last observed apparent size of the pursued/held object
    pub held_size: u32,
    pub target_destination: Option<DestinationClass>,
    pub search_attempts: u32,
    pub search_direction: SearchDirection,
    pub last_command: Option<Command>,
    pub active_profile: Option<ProfileKey>,
    pub move_count: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::SearchObject,
            target_object: None,
            held_object: None,
            held_size: 0,
            target_destination: None,
            search_attempts: 0,
            search_direction: SearchDirection::Right,
            last_command: None,
            active_profile: None,
            move_count: 0,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup configuration for the controller, immutable for the process
/// lifetime
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Below this apparent size a target is "far" (normal approach speed)
    pub min_size: u32,
    /// At or above this apparent size the robot has arrived
    pub max_size: u32,
    /// Where each object class gets delivered
    pub destinations: HashMap<ObjectClass, DestinationClass>,
    pub profiles: ProfileTable,
}

impl ControlConfig {
    /// Check the configuration is complete: every object class routed, every
    /// phase tag mapped to a profile. Run once at startup; failures here must
    /// never surface mid-session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.profiles.validate()?;
        for class in ObjectClass::ALL {
            if !self.destinations.contains_key(&class) {
                return Err(ConfigError::UnmappedObjectClass(class));
            }
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        let mut destinations = HashMap::new();
        destinations.insert(ObjectClass::Square, DestinationClass::SquareBin);
        destinations.insert(ObjectClass::Cylinder, DestinationClass::CylinderBin);

        Self {
            min_size: control::DEFAULT_MIN_SIZE,
            max_size: control::DEFAULT_MAX_SIZE,
            destinations,
            profiles: ProfileTable::default(),
        }
    }
}

/// Result of one controller step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub command: Command,
    /// Present only when the selected profile differs from the session's
    /// active one; redundant speed-set commands are debounced away
    pub profile_change: Option<(ProfileKey, VelocityProfile)>,
}

/// The pick-and-place decision engine
#[derive(Debug, Clone)]
pub struct PickPlaceController {
    config: ControlConfig,
}

impl PickPlaceController {
    pub fn new(config: ControlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Advance the session by one report.
    ///
    /// Total over all `(phase, report)` pairs: a configuration gap that
    /// validation should have caught is logged loudly and answered with a
    /// safe stop and a cycle restart.
    pub fn step(&self, state: &mut SessionState, report: &SensorReport) -> StepOutput {
        let decided = match state.phase {
            Phase::SearchObject => self.search_object(state, report),
            Phase::ApproachObject => self.approach_object(state, report),
            Phase::Pick => self.pick(state),
            Phase::SearchDestination => self.search_destination(state, report),
            Phase::ApproachDestination => self.approach_destination(state, report),
            Phase::Drop => self.drop_held(state),
        };

        let (command, profile_change) = match decided {
            Ok((command, Some(key))) => match self.select_profile(state, key) {
                Ok(change) => (command, change),
                Err(err) => return self.fail_safe(state, err),
            },
            Ok((command, None)) => (command, None),
            Err(err) => return self.fail_safe(state, err),
        };

        state.last_command = Some(command);
        state.move_count += 1;

        StepOutput {
            command,
            profile_change,
        }
    }

    /// Debounced profile selection: emit a change only when the key differs
    /// from the session's active profile
    fn select_profile(
        &self,
        state: &mut SessionState,
        key: ProfileKey,
    ) -> Result<Option<(ProfileKey, VelocityProfile)>, ConfigError> {
        if state.active_profile == Some(key) {
            return Ok(None);
        }
        let profile = self.config.profiles.get(key)?;
        state.active_profile = Some(key);
        Ok(Some((key, profile)))
    }

    /// Defined-by-construction escape hatch for configuration gaps that
    /// validation should have made impossible: stop the robot and restart
    /// the cycle from object search.
    fn fail_safe(&self, state: &mut SessionState, err: ConfigError) -> StepOutput {
        error!(error = %err, phase = state.phase.name(), "controller invariant violated, forcing stop");

        let mut reset = SessionState::new();
        reset.search_direction = state.search_direction;
        reset.move_count = state.move_count + 1;
        reset.last_command = Some(Command::Stop);
        *state = reset;

        StepOutput {
            command: Command::Stop,
            profile_change: None,
        }
    }

    fn search_object(
        &self,
        state: &mut SessionState,
        report: &SensorReport,
    ) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        if let Some(class) = ObjectClass::from_label(&report.label) {
            if report.size > control::OBJECT_DETECT_MIN_SIZE {
                state.target_object = Some(class);
                state.held_size = report.size;
                state.phase = Phase::ApproachObject;
                state.search_attempts = 0;
                return Ok((Command::Forward, Some(ProfileKey::SearchObject)));
            }
        }
        Ok((search_step(state), Some(ProfileKey::SearchObject)))
    }

    fn approach_object(
        &self,
        state: &mut SessionState,
        report: &SensorReport,
    ) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        let Some(class) = ObjectClass::from_label(&report.label) else {
            // Target lost: back to search. Losing and re-finding is normal
            // operation, not an error.
            state.phase = Phase::SearchObject;
            state.target_object = None;
            state.search_attempts = 0;
            return Ok((Command::Stop, None));
        };

        state.target_object = Some(class);
        state.held_size = report.size;

        if report.size >= self.config.max_size {
            state.phase = Phase::Pick;
            Ok((Command::Stop, None))
        } else if report.size < self.config.min_size {
            Ok((Command::Forward, Some(ProfileKey::ApproachObject)))
        } else {
            Ok((Command::Forward, Some(ProfileKey::ApproachObjectSlow)))
        }
    }

    /// Single-shot: mark the pursued object as held and move on to finding
    /// its bin
    fn pick(&self, state: &mut SessionState) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        state.held_object = state.target_object;
        state.phase = Phase::SearchDestination;
        state.search_attempts = 0;
        Ok((Command::Grab, None))
    }

    fn search_destination(
        &self,
        state: &mut SessionState,
        report: &SensorReport,
    ) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        let Some(held) = state.held_object else {
            // Unreachable through normal transitions
            error!("destination search with empty gripper, restarting cycle");
            state.phase = Phase::SearchObject;
            state.search_attempts = 0;
            return Ok((Command::Stop, None));
        };
        let wanted = self.destination_for(held)?;

        if let Some(seen) = DestinationClass::from_label(&report.label) {
            // Only the bin mapped to the held object counts; any other bin
            // marker is ignored no matter how close it looms.
            if seen == wanted && report.size > control::DESTINATION_DETECT_MIN_SIZE {
                state.target_destination = Some(seen);
                state.phase = Phase::ApproachDestination;
                state.search_attempts = 0;
                return Ok((Command::Forward, Some(ProfileKey::SearchDestination)));
            }
        }

        // Scan in place for about a full rotation, then explore straight
        // ahead, then start the scan over.
        state.search_attempts += 1;
        if state.search_attempts <= control::DESTINATION_SCAN_ATTEMPTS {
            Ok((
                state.search_direction.turn_command(),
                Some(ProfileKey::SearchDestination),
            ))
        } else if state.search_attempts <= control::DESTINATION_EXPLORE_ATTEMPTS {
            Ok((Command::Forward, Some(ProfileKey::Explore)))
        } else {
            state.search_attempts = 0;
            Ok((
                state.search_direction.turn_command(),
                Some(ProfileKey::SearchDestination),
            ))
        }
    }

    fn approach_destination(
        &self,
        state: &mut SessionState,
        report: &SensorReport,
    ) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        let Some(held) = state.held_object else {
            error!("destination approach with empty gripper, restarting cycle");
            state.phase = Phase::SearchObject;
            state.search_attempts = 0;
            return Ok((Command::Stop, None));
        };
        let wanted = self.destination_for(held)?;

        if DestinationClass::from_label(&report.label) != Some(wanted) {
            // Destination lost; the held object stays held.
            state.phase = Phase::SearchDestination;
            state.target_destination = None;
            state.search_attempts = 0;
            return Ok((Command::Stop, None));
        }

        if report.size >= self.config.max_size {
            state.phase = Phase::Drop;
            Ok((Command::Stop, None))
        } else if report.size < self.config.min_size {
            Ok((Command::Forward, Some(ProfileKey::ApproachDestination)))
        } else {
            Ok((Command::Forward, Some(ProfileKey::ApproachDestinationSlow)))
        }
    }

    /// Single-shot: release the held object and start the cycle over
    fn drop_held(
        &self,
        state: &mut SessionState,
    ) -> Result<(Command, Option<ProfileKey>), ConfigError> {
        state.held_object = None;
        state.target_object = None;
        state.target_destination = None;
        state.held_size = 0;
        state.search_attempts = 0;
        // Cleared so the next search cycle re-emits its profile
        state.active_profile = None;
        state.phase = Phase::SearchObject;
        Ok((Command::Release, None))
    }

    fn destination_for(&self, class: ObjectClass) -> Result<DestinationClass, ConfigError> {
        self.config
            .destinations
            .get(&class)
            .copied()
            .ok_or(ConfigError::UnmappedObjectClass(class))
    }
}

/// Bounded turn/forward alternation used while no valid target is visible:
/// a few forward probes, then turns in the current direction, then a
/// direction flip to cover the other side.
fn search_step(state: &mut SessionState) -> Command {
    state.search_attempts += 1;
    if state.search_attempts <= control::SEARCH_FORWARD_ATTEMPTS {
        Command::Forward
    } else if state.search_attempts <= control::SEARCH_TURN_ATTEMPTS {
        state.search_direction.turn_command()
    } else {
        state.search_direction = state.search_direction.flipped();
        state.search_attempts = 0;
        state.search_direction.turn_command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PickPlaceController {
        PickPlaceController::new(ControlConfig::default())
    }

    fn report(label: &str, size: u32) -> SensorReport {
        SensorReport::new(label, size)
    }

    fn nothing() -> SensorReport {
        SensorReport::empty()
    }

    #[test]
    fn test_initial_state() {
        let state = SessionState::new();
        assert_eq!(state.phase, Phase::SearchObject);
        assert_eq!(state.search_direction, SearchDirection::Right);
        assert_eq!(state.search_attempts, 0);
        assert!(state.held_object.is_none());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(ControlConfig::default().validate().is_ok());
    }

    #[test]
    fn test_incomplete_config_fails_validation() {
        let mut config = ControlConfig::default();
        config.destinations.remove(&ObjectClass::Cylinder);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnmappedObjectClass(ObjectClass::Cylinder))
        ));
    }

    #[test]
    fn test_search_is_bounded_and_flips_direction() {
        let ctl = controller();
        let mut state = SessionState::new();

        let mut commands = Vec::new();
        for _ in 0..8 {
            commands.push(ctl.step(&mut state, &nothing()).command);
        }
        assert_eq!(
            commands,
            vec![
                Command::Forward,
                Command::Forward,
                Command::Forward,
                Command::TurnRight,
                Command::TurnRight,
                Command::TurnRight,
                Command::TurnRight,
                Command::TurnRight,
            ]
        );

        // Ninth miss flips the turn direction and restarts the round
        let ninth = ctl.step(&mut state, &nothing());
        assert_eq!(ninth.command, Command::TurnLeft);
        assert_eq!(state.search_direction, SearchDirection::Left);
        assert_eq!(state.search_attempts, 0);
    }

    #[test]
    fn test_small_sighting_does_not_count_as_detection() {
        let ctl = controller();
        let mut state = SessionState::new();

        let out = ctl.step(&mut state, &report("cuadrado", 10));
        assert_eq!(state.phase, Phase::SearchObject);
        assert_eq!(out.command, Command::Forward); // first search probe
        assert_eq!(state.search_attempts, 1);
    }

    #[test]
    fn test_detection_starts_the_approach() {
        let ctl = controller();
        let mut state = SessionState::new();

        let out = ctl.step(&mut state, &report("cuadrado", 30));
        assert_eq!(out.command, Command::Forward);
        assert_eq!(state.phase, Phase::ApproachObject);
        assert_eq!(state.target_object, Some(ObjectClass::Square));
        assert_eq!(state.search_attempts, 0);
    }

    #[test]
    fn test_approach_size_bands() {
        let ctl = controller();
        let mut state = SessionState::new();
        ctl.step(&mut state, &report("cuadrado", 30));

        // Far band: forward at the normal approach profile
        let far = ctl.step(&mut state, &report("cuadrado", 4999));
        assert_eq!(far.command, Command::Forward);
        assert_eq!(
            far.profile_change.map(|(key, _)| key),
            Some(ProfileKey::ApproachObject)
        );

        // Near band: same command, slower profile
        let near = ctl.step(&mut state, &report("cuadrado", 5000));
        assert_eq!(near.command, Command::Forward);
        assert_eq!(
            near.profile_change.map(|(key, _)| key),
            Some(ProfileKey::ApproachObjectSlow)
        );

        // Arrived: stop and hand over to the pick phase
        let arrived = ctl.step(&mut state, &report("cuadrado", 30000));
        assert_eq!(arrived.command, Command::Stop);
        assert!(arrived.profile_change.is_none());
        assert_eq!(state.phase, Phase::Pick);
    }

    #[test]
    fn test_profile_changes_are_debounced() {
        let ctl = controller();
        let mut state = SessionState::new();
        ctl.step(&mut state, &report("cuadrado", 30));

        let first = ctl.step(&mut state, &report("cuadrado", 1000));
        assert!(first.profile_change.is_some());

        // Second report in the same band: no redundant speed-set commands
        let second = ctl.step(&mut state, &report("cuadrado", 1200));
        assert!(second.profile_change.is_none());
    }

    #[test]
    fn test_losing_the_object_restarts_the_search() {
        let ctl = controller();
        let mut state = SessionState::new();
        ctl.step(&mut state, &report("cuadrado", 30));
        state.search_attempts = 7; // stale count from an earlier round

        let out = ctl.step(&mut state, &report("pared", 9000));
        assert_eq!(out.command, Command::Stop);
        assert_eq!(state.phase, Phase::SearchObject);
        assert!(state.target_object.is_none());
        assert_eq!(state.search_attempts, 0);
        assert!(state.held_object.is_none());
    }

    #[test]
    fn test_pick_marks_held_and_emits_grab() {
        let ctl = controller();
        let mut state = SessionState::new();
        ctl.step(&mut state, &report("cilindro", 30));
        ctl.step(&mut state, &report("cilindro", 30000));
        assert_eq!(state.phase, Phase::Pick);

        let out = ctl.step(&mut state, &nothing());
        assert_eq!(out.command, Command::Grab);
        assert_eq!(state.phase, Phase::SearchDestination);
        assert_eq!(state.held_object, Some(ObjectClass::Cylinder));
    }

    #[test]
    fn test_destination_routing_ignores_the_wrong_bin() {
        let ctl = controller();
        let mut state = SessionState::new();
        state.phase = Phase::SearchDestination;
        state.held_object = Some(ObjectClass::Square);

        // A looming cylinder bin must not divert a robot holding a square
        let out = ctl.step(&mut state, &report("contenedor_cilindro", 25000));
        assert_eq!(state.phase, Phase::SearchDestination);
        assert_eq!(out.command, Command::TurnRight);
        assert!(state.target_destination.is_none());

        // The square bin does
        let out = ctl.step(&mut state, &report("contenedor_cuadrado", 25000));
        assert_eq!(out.command, Command::Forward);
        assert_eq!(state.phase, Phase::ApproachDestination);
        assert_eq!(state.target_destination, Some(DestinationClass::SquareBin));
    }

    #[test]
    fn test_destination_scan_turns_then_explores_then_restarts() {
        let ctl = controller();
        let mut state = SessionState::new();
        state.phase = Phase::SearchDestination;
        state.held_object = Some(ObjectClass::Square);

        for _ in 0..12 {
            let out = ctl.step(&mut state, &nothing());
            assert_eq!(out.command, Command::TurnRight);
        }
        for _ in 12..20 {
            let out = ctl.step(&mut state, &nothing());
            assert_eq!(out.command, Command::Forward);
        }
        // Round is exhausted: the scan starts over
        let out = ctl.step(&mut state, &nothing());
        assert_eq!(out.command, Command::TurnRight);
        assert_eq!(state.search_attempts, 0);
    }

    #[test]
    fn test_explore_leg_uses_the_explore_profile() {
        let ctl = controller();
        let mut state = SessionState::new();
        state.phase = Phase::SearchDestination;
        state.held_object = Some(ObjectClass::Square);
        state.search_attempts = 12;

        let out = ctl.step(&mut state, &nothing());
        assert_eq!(out.command, Command::Forward);
        assert_eq!(
            out.profile_change.map(|(key, _)| key),
            Some(ProfileKey::Explore)
        );
    }

    #[test]
    fn test_losing_the_destination_keeps_the_held_object() {
        let ctl = controller();
        let mut state = SessionState::new();
        state.phase = Phase::ApproachDestination;
        state.held_object = Some(ObjectClass::Square);
        state.target_destination = Some(DestinationClass::SquareBin);

        let out = ctl.step(&mut state, &report("cuadrado", 8000));
        assert_eq!(out.command, Command::Stop);
        assert_eq!(state.phase, Phase::SearchDestination);
        assert!(state.target_destination.is_none());
        assert_eq!(state.held_object, Some(ObjectClass::Square));
    }

    #[test]
    fn test_drop_releases_and_restarts_the_cycle() {
        let ctl = controller();
        let mut state = SessionState::new();
        state.phase = Phase::ApproachDestination;
        state.held_object = Some(ObjectClass::Square);
        state.target_destination = Some(DestinationClass::SquareBin);

        let arrived = ctl.step(&mut state, &report("contenedor_cuadrado", 30000));
        assert_eq!(arrived.command, Command::Stop);
        assert_eq!(state.phase, Phase::Drop);

        let out = ctl.step(&mut state, &nothing());
        assert_eq!(out.command, Command::Release);
        assert_eq!(state.phase, Phase::SearchObject);
        assert!(state.held_object.is_none());
        assert!(state.target_destination.is_none());
        assert!(state.active_profile.is_none());
    }

    #[test]
    fn test_full_pickup_cycle() {
        let ctl = controller();
        let mut state = SessionState::new();

        let inputs = [
            nothing(),
            nothing(),
            report("cuadrado", 30),
            report("cuadrado", 6000),
            report("cuadrado", 31000),
        ];
        let commands: Vec<Command> = inputs
            .iter()
            .map(|input| ctl.step(&mut state, input).command)
            .collect();
        assert_eq!(
            commands,
            vec![
                Command::Forward,
                Command::Forward,
                Command::Forward,
                Command::Forward,
                Command::Stop,
            ]
        );
        assert_eq!(state.phase, Phase::Pick);

        // Pick cycle
        assert_eq!(ctl.step(&mut state, &nothing()).command, Command::Grab);
        assert_eq!(state.phase, Phase::SearchDestination);
        assert_eq!(state.held_object, Some(ObjectClass::Square));

        // Deliver
        ctl.step(&mut state, &report("contenedor_cuadrado", 25000));
        ctl.step(&mut state, &report("contenedor_cuadrado", 6000));
        let arrived = ctl.step(&mut state, &report("contenedor_cuadrado", 31000));
        assert_eq!(arrived.command, Command::Stop);
        assert_eq!(state.phase, Phase::Drop);

        let released = ctl.step(&mut state, &nothing());
        assert_eq!(released.command, Command::Release);
        assert_eq!(state.phase, Phase::SearchObject);
    }

    #[test]
    fn test_step_is_total_over_all_phases() {
        let ctl = controller();
        let probes = [
            nothing(),
            report("cuadrado", 0),
            report("cuadrado", 50000),
            report("contenedor_cilindro", 50000),
            report("???", 7),
        ];
        let phases = [
            Phase::SearchObject,
            Phase::ApproachObject,
            Phase::Pick,
            Phase::SearchDestination,
            Phase::ApproachDestination,
            Phase::Drop,
        ];

        for phase in phases {
            for probe in &probes {
                let mut state = SessionState::new();
                state.phase = phase;
                state.held_object = Some(ObjectClass::Square);
                state.target_object = Some(ObjectClass::Square);

                let before = state.move_count;
                let out = ctl.step(&mut state, probe);
                // Every step yields exactly one command and advances the
                // move counter
                assert_eq!(state.move_count, before + 1);
                assert_eq!(state.last_command, Some(out.command));
            }
        }
    }

    #[test]
    fn test_config_gap_forces_a_safe_stop() {
        let mut config = ControlConfig::default();
        config.destinations.remove(&ObjectClass::Square);
        let ctl = PickPlaceController::new(config);

        let mut state = SessionState::new();
        state.phase = Phase::SearchDestination;
        state.held_object = Some(ObjectClass::Square);

        let out = ctl.step(&mut state, &nothing());
        assert_eq!(out.command, Command::Stop);
        assert_eq!(state.phase, Phase::SearchObject);
        assert!(state.held_object.is_none());
    }
}
