pub mod camera;
pub mod detection;
pub mod overlay;
pub mod pipeline;
pub mod shared;

#[cfg(test)]
mod testing;
