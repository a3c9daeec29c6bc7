//! Badge progression driven by consistency and engagement

pub mod progression;
pub mod stats;

pub use progression::{BadgeProgression, BadgeUpdate};
