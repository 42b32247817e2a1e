//! Core functionalities: link state, break recovery, event dispatch, serial I/O.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod link;
pub mod memory;
pub mod message;
pub mod runtime;
pub mod serial_service;
pub mod stats;
pub mod timer;
pub mod transcript;
pub mod watchdog;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::{AppConfig, WatchdogConfig};
pub use dispatch::{Context, Dispatcher, EventHandler};
pub use error::{LinkError, Result};
pub use event::{Edge, EventKind, LinkEvent};
pub use link::{ControlPin, Level, LinkState, RecoveryPhase, SerialLink};
pub use memory::{MemoryLink, MemoryPin};
pub use message::Message;
pub use runtime::Runtime;
pub use serial_service::{ControlHandle, ControlLine, PortInfo, PulseLine, SerialConfig, SerialHandle, SerialService};
pub use stats::{LinkStats, StatsSnapshot};
pub use timer::{Timers, Wake, WakeHandler};
pub use transcript::{Direction, Transcript};
pub use watchdog::Watchdog;
