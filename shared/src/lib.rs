//! Pickbot Shared Protocol Types
//!
//! This crate provides the shared protocol types, the line-oriented wire
//! codec, and the pick-and-place controller used by the control server and
//! the robot simulator.

pub mod codec;
pub mod controller;
pub mod profile;

use std::fmt;

/// Control parameters for the pick-and-place cycle
pub mod control {
    /// Minimum apparent size for a sighting to count as an object detection
    pub const OBJECT_DETECT_MIN_SIZE: u32 = 10;

    /// Minimum apparent size for a sighting to count as a destination detection
    pub const DESTINATION_DETECT_MIN_SIZE: u32 = 20;

    /// Default "far" threshold - below this the robot approaches at normal speed
    pub const DEFAULT_MIN_SIZE: u32 = 5000;

    /// Default "arrived" threshold - at or above this the robot stops
    pub const DEFAULT_MAX_SIZE: u32 = 30000;

    /// Forward probes at the start of a search round
    pub const SEARCH_FORWARD_ATTEMPTS: u32 = 3;

    /// Total attempts per search round before the turn direction flips
    pub const SEARCH_TURN_ATTEMPTS: u32 = 8;

    /// Destination scan turns (roughly one full rotation)
    pub const DESTINATION_SCAN_ATTEMPTS: u32 = 12;

    /// Total destination attempts before the scan starts over
    pub const DESTINATION_EXPLORE_ATTEMPTS: u32 = 20;

    /// Delay between control cycles, protects a slow physical link
    pub const PACING_DELAY_MS: u64 = 100;
}

/// A collectible object class the vision system can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Square,
    Cylinder,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 2] = [ObjectClass::Square, ObjectClass::Cylinder];

    /// Parse a normalized (lower-case) vision label into an object class
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "cuadrado" | "square" => Some(ObjectClass::Square),
            "cilindro" | "cylinder" => Some(ObjectClass::Cylinder),
            _ => None,
        }
    }

    /// Canonical wire label for this class
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Square => "cuadrado",
            ObjectClass::Cylinder => "cilindro",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A drop location class; each object class maps to exactly one of these
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationClass {
    SquareBin,
    CylinderBin,
}

impl DestinationClass {
    pub const ALL: [DestinationClass; 2] =
        [DestinationClass::SquareBin, DestinationClass::CylinderBin];

    /// Parse a normalized (lower-case) vision label into a destination class
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "contenedor_cuadrado" | "square_bin" => Some(DestinationClass::SquareBin),
            "contenedor_cilindro" | "cylinder_bin" => Some(DestinationClass::CylinderBin),
            _ => None,
        }
    }

    /// Canonical wire label for this class
    pub fn label(&self) -> &'static str {
        match self {
            DestinationClass::SquareBin => "contenedor_cuadrado",
            DestinationClass::CylinderBin => "contenedor_cilindro",
        }
    }
}

impl fmt::Display for DestinationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One motion command sent to a robot per control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Forward,
    TurnLeft,
    TurnRight,
    Stop,
    Grab,
    Release,
}

impl Command {
    /// Wire token for this command
    pub fn token(&self) -> &'static str {
        match self {
            Command::Forward => "FORWARD",
            Command::TurnLeft => "TURN_LEFT",
            Command::TurnRight => "TURN_RIGHT",
            Command::Stop => "STOP",
            Command::Grab => "GRAB",
            Command::Release => "RELEASE",
        }
    }

    /// Parse a wire token back into a command (used by the robot side)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "FORWARD" => Some(Command::Forward),
            "TURN_LEFT" => Some(Command::TurnLeft),
            "TURN_RIGHT" => Some(Command::TurnRight),
            "STOP" => Some(Command::Stop),
            "GRAB" => Some(Command::Grab),
            "RELEASE" => Some(Command::Release),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One normalized perception observation from a robot's camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReport {
    /// Lower-cased vision label; may be empty or unknown
    pub label: String,
    /// Apparent size in pixel-area units; 0 when the robot did not report one
    pub size: u32,
}

impl SensorReport {
    /// Create a report, normalizing the label to lower-case
    pub fn new(label: impl Into<String>, size: u32) -> Self {
        Self {
            label: label.into().to_lowercase(),
            size,
        }
    }

    /// A "saw nothing" report
    pub fn empty() -> Self {
        Self {
            label: String::new(),
            size: 0,
        }
    }
}
