pub mod auth;
pub mod error;
pub mod media;
pub mod protocol;
pub mod transport;

pub use auth::{Authentication, Credentials};
pub use error::{Result, RtspError};
pub use media::{Depacketizer, MediaFrame, depacketizer_for};
pub use transport::{ListenerConfig, RtspEvent, RtspListener};
