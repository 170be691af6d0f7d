pub mod backend;
mod controller;
mod events;

pub use backend::{thingsboard::ThingsboardBackend, InitialRoster, MappingBackend};
pub use controller::MappingController;
pub use events::{parse as parse_control_event, ControlEvent};
