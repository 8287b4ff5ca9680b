//! Avatar transport boundary for avatalk.
//!
//! A connector turns a credential into a live [`AvatarConnection`]: a
//! transport handle for control calls plus the receiver of its event feed.

pub mod error;
pub mod providers;
pub mod transport;

pub use error::AvatarError;
pub use providers::heygen::{HeyGenConnector, HeyGenTransport};
pub use providers::scripted::{
    FailurePoint, ScriptedConnector, ScriptedController, ScriptedTransport, TransportCall,
};
pub use transport::{AvatarConnection, AvatarConnector, AvatarTransport, EVENT_CHANNEL_CAPACITY};
