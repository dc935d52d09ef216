pub mod capabilities;
pub mod events;
pub mod models;
pub mod platforms;
