//! Client-side metrics event recorder.
//!
//! Application code reports singular events, aggregate counts, start/stop
//! sequences and aggregate timers through an [`EventRecorder`]. The recorder
//! turns each report into the exact method call the metrics collector expects
//! and sends it over a [`BusTransport`].

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod payload;
pub mod recorder;

// Re-export the pieces most callers need
pub use bus::{BusCall, BusReply, BusTransport, ObjectPath, TransportError};
pub use clock::RelativeTimestamp;
pub use config::RecorderConfig;
pub use error::{IdentityError, RecorderError, Result};
pub use identity::EventId;
pub use payload::{OptionalPayload, PayloadValue};
pub use recorder::pending::PendingCall;
pub use recorder::stats::StatsSnapshot;
pub use recorder::timer::AggregateTimer;
pub use recorder::EventRecorder;
