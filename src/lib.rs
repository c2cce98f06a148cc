#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/body.rs"]
pub mod body;

#[path = "core/oscillator.rs"]
pub mod oscillator;

#[path = "core/correction.rs"]
pub mod correction;

#[path = "core/steering.rs"]
pub mod steering;

#[path = "core/controller.rs"]
pub mod controller;

pub mod experiments;
