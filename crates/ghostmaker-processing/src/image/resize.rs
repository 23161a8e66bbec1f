use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Largest size with the source aspect ratio that fits inside `box_w x box_h`.
/// Never upscales; each edge is at least 1 pixel.
pub fn fit_inside(width: u32, height: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    if width <= box_w && height <= box_h {
        return (width, height);
    }
    let scale = (box_w as f64 / width as f64).min(box_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, box_w.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, box_h.max(1));
    (w, h)
}

/// Pick a resampling filter by downscale ratio. Heavy reductions use cheaper filters.
pub fn select_filter(orig_width: u32, orig_height: u32, new_width: u32, new_height: u32) -> FilterType {
    let width_ratio = orig_width as f32 / new_width.max(1) as f32;
    let height_ratio = orig_height as f32 / new_height.max(1) as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

/// Resize `img` to fit inside the box. Returns a clone when no reduction is needed.
pub fn resize_to_fit(img: &DynamicImage, box_w: u32, box_h: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (w, h) = fit_inside(width, height, box_w, box_h);
    if (w, h) == (width, height) {
        return img.clone();
    }
    img.resize_exact(w, h, select_filter(width, height, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_fit_inside_landscape() {
        assert_eq!(fit_inside(4000, 3000, 320, 320), (320, 240));
        assert_eq!(fit_inside(4000, 3000, 1920, 1920), (1920, 1440));
    }

    #[test]
    fn test_fit_inside_portrait() {
        assert_eq!(fit_inside(1080, 1920, 640, 640), (360, 640));
    }

    #[test]
    fn test_fit_inside_never_upscales() {
        assert_eq!(fit_inside(200, 100, 1920, 1920), (200, 100));
    }

    #[test]
    fn test_fit_inside_extreme_aspect_keeps_one_pixel() {
        assert_eq!(fit_inside(10000, 10, 20, 20), (20, 1));
    }

    #[test]
    fn test_select_filter_by_ratio() {
        assert_eq!(select_filter(4000, 3000, 320, 240), FilterType::Triangle);
        assert_eq!(select_filter(1800, 1800, 1000, 1000), FilterType::CatmullRom);
        assert_eq!(select_filter(1000, 1000, 900, 900), FilterType::Lanczos3);
    }

    #[test]
    fn test_resize_to_fit() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 200, Rgba([1, 2, 3, 255])));
        assert_eq!(resize_to_fit(&img, 100, 100).dimensions(), (100, 50));
        assert_eq!(resize_to_fit(&img, 1000, 1000).dimensions(), (400, 200));
    }
}
