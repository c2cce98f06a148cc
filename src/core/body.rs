//! Shared data model between the locomotion controller and the body/physics
//! collaborator: leg indexing, observations, joint commands, and the
//! composition-based body plan builder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Everything the controller can fail with. Numerical degeneracy is handled
/// locally with epsilon guards and never surfaces here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Caller-supplied action has the wrong dimensionality or the wrong set
    /// of structured fields for the current control mode.
    #[error("action shape mismatch: {0}")]
    Shape(String),
    /// The declared sensor placements cannot support stumbling detection on
    /// every leg. Raised at construction; the controller cannot run partial.
    #[error("sensor configuration invalid: {0}")]
    Configuration(String),
}

pub const LEG_COUNT: usize = 6;

/// Actuated degrees of freedom per leg (coxa to tarsus).
pub const LEG_DOF: usize = 7;

/// Abdomen segments appended to the joint command. The controller does not
/// drive them; their target angles are always zero.
pub const ABDOMEN_SEGMENTS: [&str; 5] = ["A1A2", "A3", "A4", "A5", "A6"];

/// Total joint targets in one command: 6 legs x 7 DoF + 5 abdomen hinges.
pub const TOTAL_DOF: usize = LEG_COUNT * LEG_DOF + ABDOMEN_SEGMENTS.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Front/middle/hind grouping. Correction offset vectors are defined per
/// group, not per leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegGroup {
    Front,
    Middle,
    Hind,
}

/// One of the six legs, in the fixed order used by every per-leg array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegIndex {
    LeftFront,
    LeftMiddle,
    LeftHind,
    RightFront,
    RightMiddle,
    RightHind,
}

impl LegIndex {
    pub const ALL: [LegIndex; LEG_COUNT] = [
        LegIndex::LeftFront,
        LegIndex::LeftMiddle,
        LegIndex::LeftHind,
        LegIndex::RightFront,
        LegIndex::RightMiddle,
        LegIndex::RightHind,
    ];

    #[inline]
    pub fn as_usize(self) -> usize {
        match self {
            LegIndex::LeftFront => 0,
            LegIndex::LeftMiddle => 1,
            LegIndex::LeftHind => 2,
            LegIndex::RightFront => 3,
            LegIndex::RightMiddle => 4,
            LegIndex::RightHind => 5,
        }
    }

    #[inline]
    pub fn side(self) -> Side {
        match self {
            LegIndex::LeftFront | LegIndex::LeftMiddle | LegIndex::LeftHind => Side::Left,
            _ => Side::Right,
        }
    }

    #[inline]
    pub fn group(self) -> LegGroup {
        match self {
            LegIndex::LeftFront | LegIndex::RightFront => LegGroup::Front,
            LegIndex::LeftMiddle | LegIndex::RightMiddle => LegGroup::Middle,
            LegIndex::LeftHind | LegIndex::RightHind => LegGroup::Hind,
        }
    }

    /// Short anatomical tag ("LF", "RM", ...), the naming the sensor
    /// placement list uses.
    pub fn tag(self) -> &'static str {
        match self {
            LegIndex::LeftFront => "LF",
            LegIndex::LeftMiddle => "LM",
            LegIndex::LeftHind => "LH",
            LegIndex::RightFront => "RF",
            LegIndex::RightMiddle => "RM",
            LegIndex::RightHind => "RH",
        }
    }
}

/// Distal leg segments carrying contact sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Tibia,
    Tarsus1,
    Tarsus2,
    Tarsus3,
    Tarsus4,
    Tarsus5,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::Tibia,
        Segment::Tarsus1,
        Segment::Tarsus2,
        Segment::Tarsus3,
        Segment::Tarsus4,
        Segment::Tarsus5,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Segment::Tibia => "Tibia",
            Segment::Tarsus1 => "Tarsus1",
            Segment::Tarsus2 => "Tarsus2",
            Segment::Tarsus3 => "Tarsus3",
            Segment::Tarsus4 => "Tarsus4",
            Segment::Tarsus5 => "Tarsus5",
        }
    }
}

/// One contact sensor site on the body. The observation's `contact_forces`
/// array is indexed in the order these were declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorPlacement {
    pub leg: LegIndex,
    pub segment: Segment,
}

/// The default placement set: every distal segment of every leg.
pub fn default_sensor_placements() -> Vec<SensorPlacement> {
    let mut out = Vec::with_capacity(LEG_COUNT * Segment::ALL.len());
    for leg in LegIndex::ALL {
        for segment in Segment::ALL {
            out.push(SensorPlacement { leg, segment });
        }
    }
    out
}

/// One tick's sensed state, produced by the body collaborator.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Fly base position in world coordinates.
    pub fly_position: [f64; 3],
    /// Unit forward-orientation vector of the fly.
    pub fly_orientation: [f64; 3],
    /// End-effector (pretarsus tip) world positions, fixed leg order.
    pub end_effector_positions: [[f64; 3]; LEG_COUNT],
    /// Contact force vectors, one per declared sensor placement.
    pub contact_forces: Vec<[f64; 3]>,
    /// Raw odor intensities: [channel][palp/antenna][left/right] flattened.
    pub odor_intensity: Vec<f64>,
}

/// Actuator targets for one tick. Ephemeral: rebuilt every tick, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct JointCommand {
    /// Leg joint angles in fixed leg order, then one zero per abdomen hinge.
    pub joints: Vec<f64>,
    /// 1 = contact adhesion engaged.
    pub adhesion: [u8; LEG_COUNT],
}

impl JointCommand {
    pub fn empty() -> Self {
        Self {
            joints: Vec::with_capacity(TOTAL_DOF),
            adhesion: [0; LEG_COUNT],
        }
    }
}

/// What the body collaborator reports after applying a joint command.
#[derive(Debug, Clone, Default)]
pub struct Termination {
    pub terminated: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Observation,
    pub termination: Termination,
    pub info: HashMap<String, f64>,
}

/// The physics/body collaborator, as seen from the controller.
pub trait BodyModel {
    fn observation(&self) -> &Observation;
    fn apply(&mut self, command: &JointCommand) -> StepOutcome;
    /// Re-initialize the body for a fresh episode.
    fn reset(&mut self) -> Observation;
}

/// The preprogrammed-steps collaborator: maps oscillator state to nominal
/// joint angles and adhesion on/off per leg.
pub trait StepGenerator {
    fn joint_angles(&self, leg: LegIndex, phase: f64, magnitude: f64) -> [f64; LEG_DOF];
    fn adhesion(&self, leg: LegIndex, phase: f64) -> bool;
}

// ---------------------------------------------------------------------------
// Body plan builder.
//
// The anatomical model itself lives in the physics collaborator; what the
// controller side owns is the declaration of which joints/actuators exist.
// Extensions (abdomen hinges, adhesion actuators) stack as plug-ins instead
// of subclassing a base body.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDecl {
    pub name: String,
    pub stiffness: f64,
    pub damping: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorDecl {
    pub name: String,
    pub joint: String,
    pub kind: ActuatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorKind {
    Position,
    Velocity,
    Torque,
    Adhesion,
}

/// Ordered declaration of joints and actuators the controller will drive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyPlan {
    pub joints: Vec<JointDecl>,
    pub actuators: Vec<ActuatorDecl>,
}

impl BodyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply contributors in order. Order is observable: the joint command
    /// layout follows declaration order.
    pub fn with_contributors(mut self, contributors: &[&dyn SegmentContributor]) -> Self {
        for c in contributors {
            c.extend(&mut self);
        }
        self
    }

    pub fn add_joint(&mut self, name: impl Into<String>, stiffness: f64, damping: f64) {
        self.joints.push(JointDecl {
            name: name.into(),
            stiffness,
            damping,
        });
    }

    pub fn add_actuator(&mut self, name: impl Into<String>, joint: impl Into<String>, kind: ActuatorKind) {
        self.actuators.push(ActuatorDecl {
            name: name.into(),
            joint: joint.into(),
            kind,
        });
    }
}

/// A body-plan plug-in. Contributors stack; each sees the plan as left by the
/// ones before it.
pub trait SegmentContributor {
    fn extend(&self, plan: &mut BodyPlan);
}

/// Adds a pitch hinge per abdomen segment so the abdomen can bend, plus
/// position/velocity/torque actuators on each.
#[derive(Debug, Clone, Copy)]
pub struct AbdomenSegments {
    pub stiffness: f64,
    pub damping: f64,
}

impl Default for AbdomenSegments {
    fn default() -> Self {
        Self {
            stiffness: 5.0,
            damping: 5.0,
        }
    }
}

impl SegmentContributor for AbdomenSegments {
    fn extend(&self, plan: &mut BodyPlan) {
        for seg in ABDOMEN_SEGMENTS {
            let joint = format!("joint_{seg}");
            plan.add_joint(joint.clone(), self.stiffness, self.damping);
            plan.add_actuator(
                format!("actuator_position_{joint}"),
                joint.clone(),
                ActuatorKind::Position,
            );
            plan.add_actuator(
                format!("actuator_velocity_{joint}"),
                joint.clone(),
                ActuatorKind::Velocity,
            );
            plan.add_actuator(
                format!("actuator_torque_{joint}"),
                joint,
                ActuatorKind::Torque,
            );
        }
    }
}

/// Adds one adhesion actuator per leg tip.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdhesionActuators;

impl SegmentContributor for AdhesionActuators {
    fn extend(&self, plan: &mut BodyPlan) {
        for leg in LegIndex::ALL {
            plan.add_actuator(
                format!("adhesion_{}", leg.tag()),
                format!("joint_{}Tarsus5", leg.tag()),
                ActuatorKind::Adhesion,
            );
        }
    }
}
