//! Scenes: captured per-light state snapshots
//!
//! A scene lives inside a group, keyed by an 8-bit id. It holds one
//! light-state record per member light plus scene metadata. Capture, recall
//! and modify all work on these records; the radio commands that accompany
//! them are built by the cluster layer.

use serde::{Deserialize, Serialize};

/// Color mode of a captured light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Xy,
    Ct,
    Hs,
    #[default]
    None,
}

/// Captured state of one light inside a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    /// Unique id of the light sub-device
    pub uniqueid: String,
    /// On/off
    pub on: bool,
    /// Brightness
    pub bri: u8,
    /// Color mode the remaining fields are valid for
    pub color_mode: ColorMode,
    /// CIE x, scaled to u16
    pub x: u16,
    /// CIE y, scaled to u16
    pub y: u16,
    /// Color temperature in mired
    pub ct: u16,
    /// Enhanced hue
    pub enhanced_hue: u16,
    /// Saturation
    pub sat: u8,
    /// Color loop active
    pub colorloop: bool,
    /// Transition time in 1/10 s
    pub transition_time: u16,
}

impl LightState {
    /// A default off-state record for a light.
    pub fn new(uniqueid: impl Into<String>) -> Self {
        Self {
            uniqueid: uniqueid.into(),
            on: false,
            bri: 0,
            color_mode: ColorMode::None,
            x: 0,
            y: 0,
            ct: 0,
            enhanced_hue: 0,
            sat: 0,
            colorloop: false,
            transition_time: 4,
        }
    }
}

/// A scene: metadata plus per-light snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// 8-bit scene id, unique within the group
    pub id: u8,
    /// Display name
    pub name: String,
    /// Default transition time in 1/10 s
    pub transition_time: u16,
    /// Optional picture URL
    pub picture: Option<String>,
    /// Recycled automatically when unreferenced
    pub recycle: bool,
    /// Optional application blob
    pub app_data: Option<serde_json::Value>,
    /// Captured light states
    pub lights: Vec<LightState>,
}

impl Scene {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transition_time: 4,
            picture: None,
            recycle: false,
            app_data: None,
            lights: Vec::new(),
        }
    }

    /// Snapshot for one light, if captured.
    pub fn light(&self, uniqueid: &str) -> Option<&LightState> {
        self.lights.iter().find(|l| l.uniqueid == uniqueid)
    }

    /// Insert or replace the snapshot for a light.
    pub fn set_light(&mut self, state: LightState) {
        if let Some(existing) = self.lights.iter_mut().find(|l| l.uniqueid == state.uniqueid) {
            *existing = state;
        } else {
            self.lights.push(state);
        }
    }

    /// Drop the snapshot for a light; returns true if one was removed.
    pub fn remove_light(&mut self, uniqueid: &str) -> bool {
        let before = self.lights.len();
        self.lights.retain(|l| l.uniqueid != uniqueid);
        self.lights.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_light_replaces() {
        let mut scene = Scene::new(1, "Evening");
        let mut state = LightState::new("a");
        state.bri = 100;
        scene.set_light(state.clone());
        state.bri = 200;
        scene.set_light(state);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.light("a").unwrap().bri, 200);
    }

    #[test]
    fn test_remove_light() {
        let mut scene = Scene::new(1, "Evening");
        scene.set_light(LightState::new("a"));
        assert!(scene.remove_light("a"));
        assert!(!scene.remove_light("a"));
        assert!(scene.lights.is_empty());
    }
}
