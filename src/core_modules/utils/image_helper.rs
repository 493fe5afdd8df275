pub mod image_helper {
    use crate::core_modules::channel::Channel;
    use crate::core_modules::grid::{Grid, GridSource};
    use crate::core_modules::region::Point;
    use crate::error::GridError;
    use image::imageops::FilterType;
    use image::{DynamicImage, GrayImage, ImageEncoder, ImageReader, Luma};
    use log::debug;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    pub const TARGET_WIDTH: u32 = 1280;
    pub const TARGET_HEIGHT: u32 = 720;

    /// Preview outline intensity and thickness.
    const OUTLINE_VALUE: u8 = 255;
    const OUTLINE_THICKNESS: f64 = 2.0;

    /// Decodes an image file into a grayscale grid. The format is detected from the file
    /// contents, so the extension does not matter.
    pub fn decode_grid(path: &Path) -> Result<Grid, GridError> {
        let image = read_image(path).map_err(|source| GridError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Grid::from(to_gray(image)))
    }

    fn read_image(path: &Path) -> image::ImageResult<DynamicImage> {
        ImageReader::open(path)?.with_guessed_format()?.decode()
    }

    /// Converts to 8-bit grayscale with BT.601 luma weights. 8-bit gray input is kept
    /// as is.
    pub fn to_gray(image: DynamicImage) -> GrayImage {
        match image {
            DynamicImage::ImageLuma8(gray) => gray,
            other => {
                let rgb = other.to_rgb8();
                GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let [r, g, b] = rgb.get_pixel(x, y).0;
                    Luma([luminance(r, g, b)])
                })
            }
        }
    }

    fn luminance(red: u8, green: u8, blue: u8) -> u8 {
        let l = 0.299 * red as f64 + 0.587 * green as f64 + 0.114 * blue as f64;
        l.round().clamp(0.0, 255.0) as u8
    }

    /// Output size that fits `width` x `height` into 1280x720, keeping the aspect ratio.
    /// Smaller inputs are scaled up.
    pub fn fit_720p(width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        let scale = (TARGET_WIDTH as f64 / width as f64).min(TARGET_HEIGHT as f64 / height as f64);
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        (new_width, new_height)
    }

    pub fn resize_to_720p(grid: &Grid) -> Grid {
        let (width, height) = fit_720p(grid.width(), grid.height());
        if (width, height) == (grid.width(), grid.height()) {
            return grid.clone();
        }
        debug!(
            "Resizing {}x{} grid to {}x{}",
            grid.width(),
            grid.height(),
            width,
            height
        );
        let resized = image::imageops::resize(&grid.to_image(), width, height, FilterType::Triangle);
        Grid::from(resized)
    }

    /// One image file per channel, decoded and resized on demand.
    #[derive(Debug, Clone)]
    pub struct ChannelImages {
        paths: BTreeMap<Channel, PathBuf>,
        resize: bool,
    }

    impl Default for ChannelImages {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ChannelImages {
        pub fn new() -> Self {
            Self {
                paths: BTreeMap::new(),
                resize: true,
            }
        }

        pub fn with_image(mut self, channel: Channel, path: impl Into<PathBuf>) -> Self {
            self.paths.insert(channel, path.into());
            self
        }

        /// Keep native resolution instead of fitting to 1280x720.
        pub fn native_resolution(mut self) -> Self {
            self.resize = false;
            self
        }

        pub fn path(&self, channel: Channel) -> Option<&Path> {
            self.paths.get(&channel).map(PathBuf::as_path)
        }
    }

    impl GridSource for ChannelImages {
        fn load(&self, channel: Channel) -> Result<Grid, GridError> {
            let path = self.path(channel).ok_or(GridError::Missing(channel))?;
            let grid = decode_grid(path)?;
            Ok(if self.resize { resize_to_720p(&grid) } else { grid })
        }
    }

    /// A copy of `grid` with a ring drawn around every selected region.
    pub fn draw_selection(grid: &Grid, points: &[Point], radius: u32) -> GrayImage {
        let mut canvas = grid.to_image();
        let (width, height) = canvas.dimensions();
        let r = radius as f64;
        let reach = radius as i64 + OUTLINE_THICKNESS as i64;

        for point in points {
            for dy in -reach..=reach {
                for dx in -reach..=reach {
                    let (x, y) = (point.x as i64 + dx, point.y as i64 + dy);
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let distance = ((dx * dx + dy * dy) as f64).sqrt();
                    if (distance - r).abs() < OUTLINE_THICKNESS / 2.0 {
                        canvas.put_pixel(x as u32, y as u32, Luma([OUTLINE_VALUE]));
                    }
                }
            }
        }
        canvas
    }

    pub fn save(name: &Path, image: &GrayImage) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(name)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )?;

        Ok(())
    }

    /// Writes a PNG of `grid` with the selected regions outlined.
    pub fn save_selection_preview(
        path: &Path,
        grid: &Grid,
        points: &[Point],
        radius: u32,
    ) -> Result<(), image::error::ImageError> {
        save(path, &draw_selection(grid, points, radius))
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::channel::Channel;
    use crate::core_modules::grid::{Grid, GridSource};
    use crate::core_modules::region::Point;
    use crate::error::GridError;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn fits_into_720p_box() {
        assert_eq!(fit_720p(3072, 2048), (1080, 720));
        assert_eq!(fit_720p(1920, 1080), (1280, 720));
        assert_eq!(fit_720p(640, 360), (1280, 720));
        assert_eq!(fit_720p(1280, 720), (1280, 720));
    }

    #[test]
    fn converts_color_with_bt601_weights() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let gray = to_gray(DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.get_pixel(1, 1).0, [76]);
    }

    #[test]
    fn resize_preserves_uniform_intensity() {
        let grid = Grid::filled(1600, 900, 77);
        let resized = resize_to_720p(&grid);
        assert_eq!((resized.width(), resized.height()), (1280, 720));
        assert!(resized.as_raw().iter().all(|&v| v == 77));
    }

    #[test]
    fn save_and_decode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.png");
        let grid = Grid::from_vec(4, 2, vec![0, 10, 20, 30, 40, 50, 60, 70]).unwrap();

        save(&path, &grid.to_image()).expect("Error Saving File.");
        let decoded = decode_grid(&path).unwrap();
        assert_eq!(decoded, grid);

        let images = ChannelImages::new()
            .with_image(Channel::Red, &path)
            .native_resolution();
        assert_eq!(images.load(Channel::Red).unwrap(), grid);
        assert!(matches!(
            images.load(Channel::Blue),
            Err(GridError::Missing(Channel::Blue))
        ));
    }

    #[test]
    fn decodes_by_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::from_vec(3, 2, vec![5, 15, 25, 35, 45, 55]).unwrap();

        let bare = dir.path().join("band_nir");
        save(&bare, &grid.to_image()).expect("Error Saving File.");
        assert_eq!(decode_grid(&bare).unwrap(), grid);

        let misnamed = dir.path().join("band_nir.jpg");
        save(&misnamed, &grid.to_image()).expect("Error Saving File.");
        assert_eq!(decode_grid(&misnamed).unwrap(), grid);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let images = ChannelImages::new().with_image(Channel::Green, "does/not/exist.png");
        assert!(matches!(
            images.load(Channel::Green),
            Err(GridError::Decode { .. })
        ));
    }

    #[test]
    fn preview_outlines_regions_but_keeps_centers() {
        let grid = Grid::filled(60, 60, 0);
        let canvas = draw_selection(&grid, &[Point::new(30, 30)], 10);
        assert_eq!(canvas.get_pixel(30, 30).0, [0]);
        assert_eq!(canvas.get_pixel(40, 30).0, [255]);
        assert_eq!(canvas.get_pixel(30, 20).0, [255]);
        assert_eq!(canvas.get_pixel(55, 55).0, [0]);
    }

    #[test]
    fn writes_preview_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let grid = Grid::filled(32, 32, 100);
        save_selection_preview(&path, &grid, &[Point::new(5, 5), Point::new(-3, 40)], 4)
            .expect("Error Saving File.");
        let decoded = decode_grid(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }
}
