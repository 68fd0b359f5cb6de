//! Crop encoding: PNG bytes → base64 wrapped in `ImageData`.
//!
//! The splitter already produces PNG bytes, so there is no re-encode here;
//! the crop is only wrapped for the vision API. `detail: "high"` keeps the
//! small caption glyphs legible on providers that tile images.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a PNG-encoded crop for a vision request.
pub fn encode_png(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded crop: {} bytes PNG, {} bytes base64", png.len(), b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}
