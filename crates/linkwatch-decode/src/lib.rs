//! UART vocabulary shared by the linkwatch backends.
//!
//! [`ErrorSource`] decodes an ERRORSRC-style register into [`LineError`]s;
//! the core crate turns those into link events and dispatches them.

pub mod uart;

pub use uart::{BaudRate, ErrorSource, LineError, ParseBaudError, UnsupportedBaud};
