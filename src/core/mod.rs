pub mod face;
pub mod geometry;
pub mod tracker;
