//! Challenge rendering.

use std::io::Cursor;

use {
    base64::Engine,
    image::{DynamicImage, ImageFormat, Luma},
    qrcode::QrCode,
};

use crate::{Context, Result};

/// Render a challenge string as a PNG QR code wrapped in a `data:` URL.
pub fn to_data_url(challenge: &str) -> Result<String> {
    let code = QrCode::new(challenge.as_bytes()).context("unable to encode QR code")?;
    let image = code.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("unable to render QR code")?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(png);
    Ok(format!("data:image/png;base64,{encoded}"))
}
