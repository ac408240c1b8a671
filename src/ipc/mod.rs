/*!
 * IPC Module
 * Inter-process communication: mailboxes and the shared segment
 */

pub mod mailbox;
pub mod shared;

// Re-export for convenience
pub use mailbox::{ChannelVolume, Message, PayloadKind, TraceEntry};
pub use shared::SharedKey;

pub(crate) use mailbox::Mailbox;
pub(crate) use shared::SharedSegment;
