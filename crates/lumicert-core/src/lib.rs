//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish loop exports."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Runtime that drives the fleet simulator on a fixed cadence and hands every
//! payload to a [`lumicert_msg::Transport`].

pub mod clock;
pub mod publisher;
pub mod scheduling;

pub use clock::{Clock, FixedClock, SystemClock};
pub use publisher::{LoopState, PublishLoop, PublishStats, TickReport};
pub use scheduling::RateLimiter;
