pub mod camera;
pub mod payload;
