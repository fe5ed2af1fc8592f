//! Editor-wide tunables, loadable from a JSON file.

use crate::viewport::ViewportConfig;
use mg_core::placement::PlacementConfig;
use serde::{Deserialize, Serialize};

// ─── Config ───────────────────────────────────────────────────────────────

/// Configuration shared by the viewport engine and the op applier.
///
/// Every field has a default, so a partial document like
/// `{"viewport": {"maxScale": 4}}` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub placement: PlacementConfig,
    pub viewport: ViewportConfig,
}

impl EditorConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Clamp obviously broken values back to something usable.
    pub fn sanitized(mut self) -> Self {
        let v = &mut self.viewport;
        if v.min_scale.is_nan() || v.min_scale <= 0.0 {
            v.min_scale = ViewportConfig::default().min_scale;
        }
        if v.max_scale < v.min_scale {
            v.max_scale = v.min_scale;
        }
        if !(0.0..1.0).contains(&v.decay) {
            v.decay = ViewportConfig::default().decay;
        }
        if v.frame_ms.is_nan() || v.frame_ms <= 0.0 {
            v.frame_ms = ViewportConfig::default().frame_ms;
        }
        if self.placement.ring_samples == 0 {
            self.placement.ring_samples = 1;
        }
        self
    }
}
