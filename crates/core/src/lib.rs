pub mod config;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod transport;

pub use config::{Config, ServerConfig, TransportKind};
pub use error::{Result, TallyError};
pub use protocol::{Message, TallySlot, TallyState};
pub use scheduler::{Scheduler, Sweep, Tick};
pub use service::Service;
pub use source::TallySource;
pub use transport::{ConnectionState, Link, Transport};
