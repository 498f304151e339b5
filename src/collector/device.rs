//! Device classification

use crate::config::DeviceConfig;
use serde::{Deserialize, Serialize};

/// User agent substrings that identify a handheld device
const MOBILE_MARKERS: [&str; 5] = ["Mobi", "Android", "iPhone", "iPad", "iPod"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub is_mobile: bool,
}

impl DeviceProfile {
    pub fn mobile() -> Self {
        Self { is_mobile: true }
    }

    /// Mobile when the user agent carries a mobile marker or the viewport is
    /// narrower than the configured breakpoint.
    pub fn from_user_agent(user_agent: &str, viewport_width: f64, config: &DeviceConfig) -> Self {
        let ua_mobile = MOBILE_MARKERS.iter().any(|m| user_agent.contains(m));
        let narrow = viewport_width.is_finite() && viewport_width < config.mobile_breakpoint_px;
        Self {
            is_mobile: ua_mobile || narrow,
        }
    }
}
