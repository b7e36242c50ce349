/// This module contains the swatch color extraction used to derive a thread color from a pattern image.
pub mod swatch;
/// Render configuration loaded from JSON and overridden from the command line.
pub mod config;
pub mod script;
/// Pattern discovery and invocation of the external renderer.
pub mod render;

pub use swatch::{extract_color, Color, ExtractError, Params, SampleRect};

use std::path::Path;

/// Opens an image file and extracts its swatch color.
///
/// # Arguments
///
/// * `path` - The image file to read. Any format supported by `image` works, PNG at minimum.
/// * `params` - Where to sample and which pixels count as opaque.
///
/// # Returns
///
/// The most frequent opaque color in the sample region, or an `ExtractError` if the file can't be
/// read or decoded.
pub fn extract_color_from_path<P: AsRef<Path>>(path: P, params: Params) -> Result<Color, ExtractError> {
    let img = image::open(path)?;
    extract_color(&img, params)
}

/// Decodes an in-memory image, guessing its format from the leading bytes, and extracts its swatch
/// color.
pub fn extract_color_from_bytes(bytes: &[u8], params: Params) -> Result<Color, ExtractError> {
    let img = image::load_from_memory(bytes)?;
    extract_color(&img, params)
}
