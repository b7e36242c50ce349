use std::{fmt, str::FromStr};
use image::{DynamicImage, GenericImageView, ImageError};
use indexmap::IndexMap;

/// An 8-bit RGB color. Displays as `#RRGGBB` with uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    /// The `#RRGGBB` form handed to render scripts.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl From<[u8; 3]> for Color {
    fn from(rgb: [u8; 3]) -> Self {
        Color::new(rgb[0], rgb[1], rgb[2])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color '{0}', expected #RRGGBB")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseColorError(s.to_string()));
        }

        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| ParseColorError(s.to_string()));

        Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Errors that can occur while extracting a swatch color.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("could not decode image: {0}")]
    ImageDecode(#[from] ImageError),

    #[error("sample region {width}x{height} is empty for a {image_width}x{image_height} image")]
    InvalidRegion {
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Where to look for the swatch, as fractions of the image size, and which
/// pixels count as part of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    pub x_start: f64,
    pub x_extent: f64,
    pub y_start: f64,
    pub y_extent: f64,
    /// Pixels are counted only when their alpha is strictly above this.
    pub alpha_threshold: u8,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            x_start: 0.9,
            x_extent: 0.1,
            y_start: 0.05,
            y_extent: 0.05,
            alpha_threshold: 200,
        }
    }
}

/// A rectangle in absolute pixel coordinates, always inside the image it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SampleRect {
    /// Computes the sample rectangle for an image of the given size.
    ///
    /// The start is floored and clamped to the last row/column, the extent is at least one pixel
    /// and the end never goes past the image border.
    pub fn from_params(image_width: u32, image_height: u32, params: &Params) -> Result<SampleRect, ExtractError> {
        let invalid = |width, height| ExtractError::InvalidRegion {
            width,
            height,
            image_width,
            image_height,
        };

        if image_width == 0 || image_height == 0 {
            return Err(invalid(0, 0));
        }

        let (x, width) = clamp_span(image_width, params.x_start, params.x_extent);
        let (y, height) = clamp_span(image_height, params.y_start, params.y_extent);

        if width == 0 || height == 0 {
            return Err(invalid(width, height));
        }

        Ok(SampleRect { x, y, width, height })
    }

    /// Pixel coordinates in row-major order.
    pub fn coordinates(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.y + self.height)
            .flat_map(move |y| (self.x..self.x + self.width).map(move |x| (x, y)))
    }
}

fn clamp_span(size: u32, start: f64, extent: f64) -> (u32, u32) {
    // `as` saturates: negative and NaN fractions land on 0.
    let start = ((start * size as f64).floor() as u32).min(size - 1);
    let extent = ((extent * size as f64).floor() as u32).max(1);
    let end = start.saturating_add(extent).min(size);
    (start, end - start)
}

/// Returns the most frequent opaque color in the sample rectangle of `img`.
///
/// Colors are counted in row-major order and ties go to the color seen first. If no pixel in the
/// rectangle is opaque enough, the pixel at the rectangle's top-left corner is returned as is.
pub fn extract_color(img: &DynamicImage, params: Params) -> Result<Color, ExtractError> {
    let (width, height) = img.dimensions();
    let rect = SampleRect::from_params(width, height, &params)?;

    // Keeps first-seen order, which decides ties.
    let mut counts: IndexMap<[u8; 3], u32> = IndexMap::new();

    for (x, y) in rect.coordinates() {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        if a <= params.alpha_threshold {
            continue;
        }
        *counts.entry([r, g, b]).or_insert(0) += 1;
    }

    let mut best: Option<([u8; 3], u32)> = None;
    for (&rgb, &count) in &counts {
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((rgb, count)),
        }
    }

    match best {
        Some((rgb, _)) => Ok(Color::from(rgb)),
        None => {
            let [r, g, b, _] = img.get_pixel(rect.x.min(width - 1), rect.y).0;
            log::debug!("no opaque pixels in {:?}, falling back to corner pixel", rect);
            Ok(Color::new(r, g, b))
        }
    }
}
