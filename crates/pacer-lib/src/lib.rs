pub mod circuit;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod plot;
pub mod pulse;
pub mod sequencer;
pub mod validation;

pub use circuit::*;
pub use error::{ModelError, Result};
pub use feedback::*;
pub use metrics::*;
pub use pulse::*;
pub use sequencer::*;
pub use validation::*;
