//! Region capture
//!
//! [`RegionCapture`] works out where a region sits in the viewport and
//! assembles a [`CaptureDescriptor`] for it. Pixels come from a
//! [`PixelSource`], a privileged capability held outside the engine.

use crate::automation::ElementResolver;
use crate::error::{CaptureError, Result};
use crate::page::{PageDriver, Rect};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Label used for whole-document captures
pub const FULL_PAGE: &str = "full-page";

/// What to capture
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureTarget {
    /// Explicit viewport-relative rectangle
    Rect(Rect),
    /// Bounds of the first element matching a selector
    Selector(String),
    /// Bounds of the document element
    FullPage,
}

/// Capture request as received over the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Left edge
    #[serde(default)]
    pub x: Option<f64>,
    /// Top edge
    #[serde(default)]
    pub y: Option<f64>,
    /// Width
    #[serde(default)]
    pub width: Option<f64>,
    /// Height
    #[serde(default)]
    pub height: Option<f64>,
    /// Element selector, preferred over coordinates when present
    #[serde(default)]
    pub selector: Option<String>,
}

impl TryFrom<CaptureRequest> for CaptureTarget {
    type Error = CaptureError;

    fn try_from(req: CaptureRequest) -> std::result::Result<Self, Self::Error> {
        if let Some(selector) = req.selector {
            return Ok(CaptureTarget::Selector(selector));
        }
        match (req.x, req.y, req.width, req.height) {
            (None, None, None, None) => Ok(CaptureTarget::FullPage),
            (Some(x), Some(y), Some(width), Some(height)) => {
                Ok(CaptureTarget::Rect(Rect::new(x, y, width, height)))
            }
            _ => Err(CaptureError::InvalidRegion(
                "a rectangle needs x, y, width and height".to_string(),
            )),
        }
    }
}

/// Bounds of a captured region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDescriptor {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Selector, `rect`, or `full-page`
    pub element: String,
    /// When the bounds were computed
    pub timestamp: DateTime<Utc>,
}

impl CaptureDescriptor {
    /// The region as a rectangle
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Reference to image data acquired outside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    /// MIME type of the image
    pub mime_type: String,
    /// Base64-encoded image bytes
    pub data: String,
    /// Size of the decoded image in bytes
    pub size: usize,
}

/// Descriptor plus the image acquired for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResponse {
    /// Region bounds
    pub descriptor: CaptureDescriptor,
    /// Acquired image
    pub image: ImageRef,
}

/// Privileged capability that turns a region into pixels
#[async_trait]
pub trait PixelSource: Send + Sync {
    /// Acquire the pixels of `region`
    async fn acquire(&self, region: &CaptureDescriptor) -> Result<ImageRef>;
}

/// Computes capture regions
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionCapture {
    resolver: ElementResolver,
}

impl RegionCapture {
    /// Create a region capture that resolves selectors with `resolver`
    pub fn new(resolver: ElementResolver) -> Self {
        Self { resolver }
    }

    /// Compute the descriptor for `target`
    #[instrument(skip(self, page, cancel))]
    pub async fn capture<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        target: &CaptureTarget,
        cancel: &CancellationToken,
    ) -> Result<CaptureDescriptor> {
        let (rect, element) = match target {
            CaptureTarget::Rect(rect) => (*rect, "rect".to_string()),
            CaptureTarget::Selector(selector) => {
                (self.element_bounds(page, selector, cancel).await?, selector.clone())
            }
            CaptureTarget::FullPage => (
                self.element_bounds(page, "html", cancel).await?,
                FULL_PAGE.to_string(),
            ),
        };
        validate(&rect)?;

        debug!(
            "Capture region {}: {}x{} at ({}, {})",
            element, rect.width, rect.height, rect.x, rect.y
        );

        Ok(CaptureDescriptor {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            element,
            timestamp: Utc::now(),
        })
    }

    /// Compute the descriptor and hand it to `source` for pixels
    #[instrument(skip(self, page, source, cancel))]
    pub async fn capture_with<P, S>(
        &self,
        page: &P,
        target: &CaptureTarget,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<CaptureResponse>
    where
        P: PageDriver + ?Sized,
        S: PixelSource + ?Sized,
    {
        let descriptor = self.capture(page, target, cancel).await?;
        let image = source.acquire(&descriptor).await?;
        info!("Captured {} ({} bytes)", descriptor.element, image.size);
        Ok(CaptureResponse { descriptor, image })
    }

    async fn element_bounds<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Rect> {
        let element = self
            .resolver
            .resolve(page, selector, cancel)
            .await
            .map_err(CaptureError::from)?;
        let rect = page.bounds(&element).await.map_err(CaptureError::Bounds)?;
        Ok(rect)
    }
}

fn validate(rect: &Rect) -> std::result::Result<(), CaptureError> {
    let values = [rect.x, rect.y, rect.width, rect.height];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CaptureError::InvalidRegion(
            "coordinates must be finite".to_string(),
        ));
    }
    if rect.width < 0.0 || rect.height < 0.0 {
        return Err(CaptureError::InvalidRegion(format!(
            "negative size {}x{}",
            rect.width, rect.height
        )));
    }
    Ok(())
}
