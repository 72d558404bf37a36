//! Network-domain modules: local channels and gates between pipeline
//! stages, plus the framed pickle transport to the metrics receiver.

pub mod channel;
pub mod frame;
pub mod input_gate;
pub mod metrics_sink;
pub mod output_gate;
pub mod pickle;

pub use channel::*;
pub use frame::*;
pub use input_gate::*;
pub use metrics_sink::*;
pub use output_gate::*;
pub use pickle::*;
