// THEORY:
// The `Grid` is the single-channel intensity image the rest of the pipeline reads from.
// Like the pixel containers it replaces, it is a "dumb" data container: it owns a
// row-major buffer of 8-bit intensities and knows its own dimensions, nothing more.
// Decoding and resizing happen before a `Grid` exists (see `utils::image_helper`);
// after construction a grid is never mutated.

use crate::core_modules::channel::Channel;
use crate::error::GridError;
use image::GrayImage;
use std::collections::BTreeMap;

/// An immutable, row-major 2D array of 0-255 intensities for one channel image.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Grid {
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self, GridError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(GridError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A grid where every pixel has the same intensity.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The row of intensities at `y`. Panics if `y` is out of range.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.data[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn to_image(&self) -> GrayImage {
        // The buffer length always equals width * height.
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([self.data[y as usize * self.width as usize + x as usize]])
        })
    }
}

impl From<GrayImage> for Grid {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// Supplies the intensity grid of each channel to a pipeline.
pub trait GridSource {
    fn load(&self, channel: Channel) -> Result<Grid, GridError>;
}

impl GridSource for BTreeMap<Channel, Grid> {
    fn load(&self, channel: Channel) -> Result<Grid, GridError> {
        self.get(&channel).cloned().ok_or(GridError::Missing(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffer_of_wrong_length() {
        let err = Grid::from_vec(4, 3, vec![0; 11]).unwrap_err();
        assert!(matches!(
            err,
            GridError::SizeMismatch {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn indexes_row_major() {
        let grid = Grid::from_vec(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(grid.get(2, 0), Some(3));
        assert_eq!(grid.get(0, 1), Some(4));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.row(1), &[4, 5, 6]);
    }

    #[test]
    fn converts_from_gray_image() {
        let image = GrayImage::from_pixel(5, 7, image::Luma([42]));
        let grid = Grid::from(image);
        assert_eq!((grid.width(), grid.height()), (5, 7));
        assert!(grid.as_raw().iter().all(|&v| v == 42));
        assert_eq!(grid.to_image().get_pixel(4, 6).0, [42]);
    }
}
