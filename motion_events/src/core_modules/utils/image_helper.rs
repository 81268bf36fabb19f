// Rendering helpers for consumers of the pipeline: draw events onto a frame and
// write frames or masks out as PNG.

pub mod image_helper {
    use crate::core_modules::rect::Rect;
    use image::{GrayImage, ImageEncoder, Rgb, RgbImage};
    use imageproc::drawing::draw_hollow_rect_mut;
    use std::path::Path;

    pub const EVENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

    /// Copy of `frame` with every event outlined in `color`.
    ///
    /// Boxes are clipped by the drawing routine; degenerate boxes are skipped.
    pub fn annotate(frame: &RgbImage, events: &[Rect], color: Rgb<u8>) -> RgbImage {
        let mut output = frame.clone();
        for event in events.iter().filter(|e| e.width > 0 && e.height > 0) {
            let rect = imageproc::rect::Rect::at(event.x, event.y)
                .of_size(event.width as u32, event.height as u32);
            draw_hollow_rect_mut(&mut output, rect, color);
        }
        output
    }

    pub fn save_rgb(path: impl AsRef<Path>, image: &RgbImage) -> anyhow::Result<()> {
        write_png(path.as_ref(), image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)
    }

    pub fn save_mask(path: impl AsRef<Path>, mask: &GrayImage) -> anyhow::Result<()> {
        write_png(path.as_ref(), mask.as_raw(), mask.width(), mask.height(), image::ExtendedColorType::L8)
    }

    fn write_png(
        path: &Path,
        buffer: &[u8],
        width: u32,
        height: u32,
        color: image::ExtendedColorType,
    ) -> anyhow::Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));

        encoder.write_image(buffer, width, height, color)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::rect::Rect;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn annotate_outlines_events() {
        let frame = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let output = annotate(&frame, &[Rect::new(2, 3, 5, 4)], EVENT_COLOR);

        assert_eq!(output.get_pixel(2, 3), &EVENT_COLOR);
        assert_eq!(output.get_pixel(6, 6), &EVENT_COLOR);
        // Interior untouched.
        assert_eq!(output.get_pixel(4, 5), &Rgb([0, 0, 0]));
        // Source untouched.
        assert_eq!(frame.get_pixel(2, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn annotate_tolerates_boxes_past_the_edge() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let output = annotate(&frame, &[Rect::new(-3, -3, 8, 8), Rect::new(5, 5, 0, 3)], EVENT_COLOR);
        assert_eq!(output.get_pixel(4, 0), &EVENT_COLOR);
        assert_eq!(output.get_pixel(5, 6), &Rgb([0, 0, 0]));
    }

    #[test]
    fn save_frame_and_mask() {
        let dir = std::env::temp_dir();
        let frame_path = dir.join(format!("motion_events_frame_{}.png", std::process::id()));
        let mask_path = dir.join(format!("motion_events_mask_{}.png", std::process::id()));

        let frame = RgbImage::from_pixel(16, 8, Rgb([10, 200, 30]));
        let mask = GrayImage::from_pixel(16, 8, Luma([255]));
        save_rgb(&frame_path, &frame).expect("Error Saving File.");
        save_mask(&mask_path, &mask).expect("Error Saving File.");

        let reread = image::open(&frame_path).expect("Error Reading File.").to_rgb8();
        assert_eq!(reread.dimensions(), (16, 8));
        assert_eq!(reread.get_pixel(3, 3), &Rgb([10, 200, 30]));
        let reread_mask = image::open(&mask_path).expect("Error Reading File.").to_luma8();
        assert_eq!(reread_mask.get_pixel(0, 0), &Luma([255]));

        let _ = std::fs::remove_file(frame_path);
        let _ = std::fs::remove_file(mask_path);
    }
}
