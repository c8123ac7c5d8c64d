pub mod events;
pub mod fare;
