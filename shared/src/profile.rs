//! Velocity profile table
//!
//! Maps each motion phase of the controller to a left/right wheel speed pair.
//! The table is fixed at process start and validated before any session runs;
//! a missing entry at runtime is a programming defect, not a recoverable
//! condition.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::ObjectClass;

/// Phase tag used to look up a velocity profile.
///
/// One tag per motion phase, plus the two slow-zone tags used while closing
/// in on a target and the straight-line exploration tag used when a
/// destination scan comes up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKey {
    SearchObject,
    ApproachObject,
    ApproachObjectSlow,
    SearchDestination,
    ApproachDestination,
    ApproachDestinationSlow,
    Explore,
}

impl ProfileKey {
    pub const ALL: [ProfileKey; 7] = [
        ProfileKey::SearchObject,
        ProfileKey::ApproachObject,
        ProfileKey::ApproachObjectSlow,
        ProfileKey::SearchDestination,
        ProfileKey::ApproachDestination,
        ProfileKey::ApproachDestinationSlow,
        ProfileKey::Explore,
    ];
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileKey::SearchObject => "search_object",
            ProfileKey::ApproachObject => "approach_object",
            ProfileKey::ApproachObjectSlow => "approach_object_slow",
            ProfileKey::SearchDestination => "search_destination",
            ProfileKey::ApproachDestination => "approach_destination",
            ProfileKey::ApproachDestinationSlow => "approach_destination_slow",
            ProfileKey::Explore => "explore",
        };
        f.write_str(name)
    }
}

/// A left/right wheel speed pair, in the robot's 0-255 speed units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityProfile {
    pub left: u8,
    pub right: u8,
}

impl VelocityProfile {
    pub const fn new(left: u8, right: u8) -> Self {
        Self { left, right }
    }
}

/// Errors in the startup configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no velocity profile configured for phase {0}")]
    MissingProfile(ProfileKey),

    #[error("no destination configured for object class {0}")]
    UnmappedObjectClass(ObjectClass),
}

/// The phase-to-speed mapping supplied at process start
#[derive(Debug, Clone)]
pub struct ProfileTable {
    entries: HashMap<ProfileKey, VelocityProfile>,
}

impl ProfileTable {
    /// Create an empty table; callers are expected to fill and validate it
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Set the profile for a phase tag
    pub fn set(&mut self, key: ProfileKey, profile: VelocityProfile) {
        self.entries.insert(key, profile);
    }

    /// Look up the profile for a phase tag
    pub fn get(&self, key: ProfileKey) -> Result<VelocityProfile, ConfigError> {
        self.entries
            .get(&key)
            .copied()
            .ok_or(ConfigError::MissingProfile(key))
    }

    /// Check that every phase tag has a profile
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in ProfileKey::ALL {
            self.get(key)?;
        }
        Ok(())
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.set(ProfileKey::SearchObject, VelocityProfile::new(120, 120));
        table.set(ProfileKey::ApproachObject, VelocityProfile::new(100, 100));
        table.set(ProfileKey::ApproachObjectSlow, VelocityProfile::new(80, 80));
        table.set(ProfileKey::SearchDestination, VelocityProfile::new(110, 110));
        table.set(ProfileKey::ApproachDestination, VelocityProfile::new(100, 100));
        table.set(
            ProfileKey::ApproachDestinationSlow,
            VelocityProfile::new(70, 70),
        );
        table.set(ProfileKey::Explore, VelocityProfile::new(90, 90));
        table
    }
}
