pub mod image_helper;

pub use image_helper::image_helper::{
    ChannelImages, decode_grid, draw_selection, resize_to_720p, save_selection_preview,
};
