pub mod assets;
pub mod events;
pub mod health;
pub mod transform;
