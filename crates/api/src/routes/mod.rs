pub mod alerts;
pub mod drivers;
pub mod sessions;
