//! Visual capture module
//!
//! Bounds computation and descriptor assembly for region captures. Pixel
//! acquisition sits behind [`PixelSource`]; the browser module provides a
//! CDP-backed implementation.

pub mod region;

pub use region::{
    CaptureDescriptor, CaptureRequest, CaptureResponse, CaptureTarget, ImageRef, PixelSource,
    RegionCapture, FULL_PAGE,
};
