//! # Query logger
//!
//! Records which queries ran, filtered by [`QueryLogFlags`]. Events go to
//! registered subscribers in registration order, or to a log file when no
//! subscriber is registered.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use querylog::{LogOptions, QueryLogger};
//!
//! let logger = QueryLogger::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! logger.register(move |event| sink.lock().unwrap().push(event.message.clone()));
//! logger.log("select Users", &LogOptions::new()).unwrap();
//! assert_eq!(*seen.lock().unwrap(), ["select Users"]);
//! ```

mod flags;
mod logger;

use std::io;

use thiserror::Error;

pub use flags::{FlagSpec, QueryLogFlags};
pub use logger::{Action, LogOptions, QueryLogEvent, QueryLogger, SubscriberId};

#[derive(Debug, Error)]
pub enum QueryLogError {
    #[error("unknown query log flag: {0}")]
    UnknownFlag(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
