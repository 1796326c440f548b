pub mod errors;
pub mod id;

pub use errors::{ConfigError, TandemError};
pub use id::{new_id, NegotiationId, PeerId, ResourceRootId, SessionId};

pub type Result<T> = std::result::Result<T, TandemError>;
