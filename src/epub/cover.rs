//! Cover download and conversion to baseline JPEG.

use crate::scraper::Fetcher;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::Url;

const JPEG_QUALITY: u8 = 90;

/// Fetch `url` and convert it to JPEG. Any failure is logged and yields `None`;
/// the book is then built without a cover.
pub(super) fn fetch_cover(fetcher: &dyn Fetcher, url: &str) -> Option<Vec<u8>> {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(url, error = %e, "Invalid cover URL; building without cover");
            return None;
        }
    };
    let bytes = match fetcher.fetch_bytes(&parsed) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(url, error = %e, "Cover download failed; building without cover");
            return None;
        }
    };
    match to_jpeg(&bytes) {
        Ok(jpeg) => {
            tracing::debug!(url, bytes = jpeg.len(), "Cover converted");
            Some(jpeg)
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "Cover could not be converted; building without cover");
            None
        }
    }
}

/// Decode any supported image and re-encode it as JPEG. Transparent pixels are
/// composited onto white.
fn to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let rgb = flatten(&img);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let over_white = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}
