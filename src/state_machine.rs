//! Session phase state machine
//!
//! Pure transitions in the Elm style: `(phase, event) -> phase`, no I/O.

mod event;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use event::Event;
pub use state::Phase;
pub use transition::{transition, TransitionError};
