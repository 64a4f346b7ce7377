//! QR code rendering for pairing tokens.
//!
//! The phone shows the image; the desktop scans it and posts the embedded
//! `sessionId` back to `/api/auth/verify-qrcode`.  The image is an SVG
//! wrapped in a base64 `data:` URL so clients can drop it straight into an
//! `<img src>` without another request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::{render::svg, EcLevel, QrCode};
use serde::Serialize;

use relay_core::{RelayError, UserId};

/// Smallest edge length of the rendered image, in pixels.
const MIN_DIMENSION: u32 = 240;

/// Contents encoded in the QR code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload<'a> {
    pub session_id: &'a str,
    pub device_id: &'a str,
    pub user_id: UserId,
}

/// Renders `payload` as an SVG QR code inside a `data:image/svg+xml` URL.
///
/// # Errors
///
/// Returns [`RelayError::Storage`] if the payload cannot be encoded (it is
/// far too short for that to happen in practice).
pub fn render_data_url(payload: &PairingPayload<'_>) -> Result<String, RelayError> {
    let json = serde_json::to_string(payload)
        .map_err(|e| RelayError::Storage(format!("QR payload encoding failed: {e}")))?;
    let code = QrCode::with_error_correction_level(json.as_bytes(), EcLevel::M)
        .map_err(|e| RelayError::Storage(format!("QR encoding failed: {e}")))?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
