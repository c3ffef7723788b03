//! PNG encoding and header inspection

use image::{ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

use crate::error::Failure;

/// Encode an RGB raster as PNG bytes
pub fn encode_rgb(raster: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png = Vec::new();
    raster.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Read `(width, height)` from PNG bytes without decoding the pixel data.
///
/// Anything that is not a PNG is a protocol error: the gateway only ever
/// hands out `image/png`.
pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32), Failure> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => {}
        Ok(other) => {
            return Err(Failure::protocol(format!(
                "Expected a PNG image, received {:?}.",
                other
            )))
        }
        Err(_) => return Err(Failure::protocol("Received data is not a recognisable image.")),
    }

    ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| Failure::protocol(format!("Unreadable PNG header: {}", e)))
}
