pub mod events;
pub mod platform;

pub use events::{Message, MessageKind, UserInfo};
pub use platform::Platform;
