pub mod custom;
pub mod model;
