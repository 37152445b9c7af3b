//! Browser automation module
//!
//! This module provides live-page control through ChromiumOxide, including
//! lifecycle management, navigation, the CDP page driver, and screenshot
//! capture.

pub mod capture;
pub mod controller;
pub mod driver;
pub mod navigation;

pub use capture::{CaptureFormat, CaptureOptions, PageCapture};
pub use controller::{BrowserConfig, BrowserController, PageHandle};
pub use navigation::{validate_url, NavigationOptions, NavigationResult, PageNavigator, WaitUntil};
