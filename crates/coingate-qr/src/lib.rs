//! QR rendering for payment instructions.
//!
//! This crate implements the `coingate-core` PaymentCodeEncoder with `qrcode`,
//! writing the result as PNG through `image`.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use coingate_core::{errors::Error, ports::PaymentCodeEncoder, Result};

const MODULE_PX: u32 = 10;

#[derive(Clone, Copy, Debug, Default)]
pub struct QrEncoder;

impl QrEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl PaymentCodeEncoder for QrEncoder {
    fn encode_payment_code(&self, text: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(text.as_bytes())
            .map_err(|e| Error::PaymentCode(format!("qr encode failed: {e}")))?;

        let img = code
            .render::<Luma<u8>>()
            .module_dimensions(MODULE_PX, MODULE_PX)
            .quiet_zone(true)
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| Error::PaymentCode(format!("png write failed: {e}")))?;
        Ok(png)
    }
}
