pub mod rgba_overlay;
pub mod snapshot_writer;
