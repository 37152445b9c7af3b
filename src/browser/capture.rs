//! Screenshot capture
//!
//! CDP-backed [`PixelSource`]: clips a screenshot to a computed region.

use crate::browser::PageHandle;
use crate::capture::{CaptureDescriptor, ImageRef, PixelSource};
use crate::error::{CaptureError, Result};
use crate::page::PageDriver;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport as ClipRegion};
use chromiumoxide::page::ScreenshotParams;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Image format for captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// PNG screenshot
    #[default]
    Png,
    /// JPEG screenshot
    Jpeg,
    /// WebP screenshot
    Webp,
}

impl CaptureFormat {
    /// Get appropriate MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            CaptureFormat::Png => "image/png",
            CaptureFormat::Jpeg => "image/jpeg",
            CaptureFormat::Webp => "image/webp",
        }
    }

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureFormat::Png => "png",
            CaptureFormat::Jpeg => "jpg",
            CaptureFormat::Webp => "webp",
        }
    }

    fn cdp(&self) -> CaptureScreenshotFormat {
        match self {
            CaptureFormat::Png => CaptureScreenshotFormat::Png,
            CaptureFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            CaptureFormat::Webp => CaptureScreenshotFormat::Webp,
        }
    }
}

/// Options for screenshot capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Image format
    #[serde(default)]
    pub format: CaptureFormat,
    /// JPEG/WebP quality (0-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    85
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            format: CaptureFormat::Png,
            quality: 85,
        }
    }
}

impl CaptureOptions {
    /// Create options for PNG screenshot
    pub fn png() -> Self {
        Self::default()
    }

    /// Create options for JPEG screenshot
    pub fn jpeg(quality: u8) -> Self {
        Self {
            format: CaptureFormat::Jpeg,
            quality,
        }
    }
}

/// Screenshots a live page, clipped to the requested region
pub struct PageCapture {
    page: PageHandle,
    options: CaptureOptions,
}

impl PageCapture {
    /// Create a pixel source for `page`
    pub fn new(page: PageHandle, options: CaptureOptions) -> Self {
        Self { page, options }
    }

    /// Capture options in use
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }
}

#[async_trait]
impl PixelSource for PageCapture {
    #[instrument(skip(self, region), fields(element = %region.element))]
    async fn acquire(&self, region: &CaptureDescriptor) -> Result<ImageRef> {
        info!("Capturing screenshot");

        // Descriptors are viewport-relative; clips are document-relative
        let viewport = self.page.viewport().await?;
        let clip = ClipRegion {
            x: region.x + viewport.scroll_x,
            y: region.y + viewport.scroll_y,
            width: region.width,
            height: region.height,
            scale: 1.0,
        };

        let mut params_builder = ScreenshotParams::builder()
            .format(self.options.format.cdp())
            .from_surface(true)
            .capture_beyond_viewport(true)
            .clip(clip);

        if matches!(
            self.options.format,
            CaptureFormat::Jpeg | CaptureFormat::Webp
        ) {
            params_builder = params_builder.quality(self.options.quality as i64);
        }

        let data = self
            .page
            .page
            .screenshot(params_builder.build())
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))?;

        let size = data.len();
        debug!("Screenshot captured: {} bytes", size);

        Ok(ImageRef {
            mime_type: self.options.format.mime_type().to_string(),
            data: BASE64.encode(&data),
            size,
        })
    }
}
