pub mod preferences;
pub mod usage;
