//! Session entity: participants, permissions and shared resource roots.

mod entity;
mod types;

pub use entity::Session;
pub use types::{Participant, Permission, ShareOutcome, SharedRoot};
