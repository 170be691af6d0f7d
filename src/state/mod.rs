mod hub;
mod mailbox;

pub use hub::Hub;
pub use mailbox::Mailbox;
