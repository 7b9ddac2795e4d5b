pub mod draw_options;
pub mod overlay_surface;
