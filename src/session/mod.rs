//! Measurement session: sampling loop, merged readings and display state

mod display;
mod latest;
mod sampler;
mod timer;

pub use display::DisplayState;
pub use sampler::{MeasurementSession, SessionConfig};
