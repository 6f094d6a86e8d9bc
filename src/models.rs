use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor applied to any width/height so "clamped strictly positive" holds
/// without introducing NaN/zero-size elements from malformed client input.
pub const MIN_POSITIVE: f64 = 0.0001;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;

fn clamp_positive(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { MIN_POSITIVE }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Square,
    Rectangle,
    Circle,
    Triangle,
    Star,
    Image,
    Text,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Readonly,
}

/// A drawable item in a room. See the data model for field semantics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub shape: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    pub color: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_decoration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub layer_id: String,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Element {
    /// Enforce the positive-size invariant in place. Called on insert and on
    /// every merge from an `Update`/`Move` patch.
    pub fn sanitize(&mut self) {
        self.width = clamp_positive(self.width);
        self.height = clamp_positive(self.height);
    }
}

/// A partial update to an element, keyed by `id`. Unset fields are left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_decoration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl ElementPatch {
    /// Merge this patch's `Some` fields onto `target`, then re-sanitize.
    pub fn apply_to(&self, target: &mut Element) {
        if let Some(v) = self.shape {
            target.shape = v;
        }
        if let Some(v) = self.x {
            target.x = v;
        }
        if let Some(v) = self.y {
            target.y = v;
        }
        if let Some(v) = self.width {
            target.width = v;
        }
        if let Some(v) = self.height {
            target.height = v;
        }
        if let Some(v) = self.rotation {
            target.rotation = v;
        }
        if let Some(ref v) = self.color {
            target.color = v.clone();
        }
        if let Some(ref v) = self.text {
            target.text = v.clone();
        }
        if self.font_size.is_some() {
            target.font_size = self.font_size;
        }
        if let Some(ref v) = self.font_family {
            target.font_family = Some(v.clone());
        }
        if let Some(ref v) = self.font_weight {
            target.font_weight = Some(v.clone());
        }
        if let Some(ref v) = self.font_style {
            target.font_style = Some(v.clone());
        }
        if let Some(ref v) = self.text_decoration {
            target.text_decoration = Some(v.clone());
        }
        if let Some(ref v) = self.filename {
            target.filename = Some(v.clone());
        }
        if let Some(ref v) = self.original_name {
            target.original_name = Some(v.clone());
        }
        if let Some(ref v) = self.layer_id {
            target.layer_id = v.clone();
        }
        if let Some(v) = self.z_index {
            target.z_index = v;
        }
        if self.group_id.is_some() {
            target.group_id = self.group_id.clone();
        }
        target.sanitize();
    }
}

/// An ordered, named grouping of elements within a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub elements: Vec<String>,
}

impl Layer {
    pub fn new_default(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible: true,
            locked: false,
            elements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl LayerPatch {
    pub fn apply_to(&self, target: &mut Layer) {
        if let Some(ref v) = self.name {
            target.name = v.clone();
        }
        if let Some(v) = self.visible {
            target.visible = v;
        }
        if let Some(v) = self.locked {
            target.locked = v;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Camera {
    /// Zoom is clamped to [0.1, 5.0] whenever the camera crosses a boundary
    /// (stored to disk or sent to a client).
    pub fn clamped(mut self) -> Self {
        self.zoom = self.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self
    }
}

/// Advisory "who is touching this shape right now" entry. Never gates a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeHolder {
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub acquired_at: DateTime<Utc>,
}

/// The on-disk snapshot schema for a room (§4.4). Field order matches the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub elements: Vec<Element>,
    pub layers: Vec<Layer>,
    pub camera: Camera,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly_password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_element() -> Element {
        Element {
            id: "e1".into(),
            shape: ShapeKind::Circle,
            x: 1.0,
            y: 1.0,
            width: 10.0,
            height: 10.0,
            rotation: 0.0,
            color: "#000".into(),
            text: String::new(),
            font_size: None,
            font_family: None,
            font_weight: None,
            font_style: None,
            text_decoration: None,
            filename: None,
            original_name: None,
            layer_id: "l1".into(),
            z_index: 0,
            group_id: None,
        }
    }

    #[test]
    fn element_sanitize_clamps_nonpositive_size() {
        let mut el = base_element();
        el.width = -5.0;
        el.height = 0.0;
        el.sanitize();
        assert!(el.width > 0.0);
        assert!(el.height > 0.0);
    }

    #[test]
    fn camera_zoom_clamped_to_bounds() {
        let c = Camera { x: 0.0, y: 0.0, zoom: 50.0 }.clamped();
        assert_eq!(c.zoom, MAX_ZOOM);

        let c = Camera { x: 0.0, y: 0.0, zoom: 0.0 }.clamped();
        assert_eq!(c.zoom, MIN_ZOOM);
    }

    #[test]
    fn element_patch_merges_only_set_fields() {
        let mut el = base_element();
        let patch = ElementPatch {
            id: "e1".into(),
            shape: None,
            x: Some(5.0),
            y: None,
            width: None,
            height: None,
            rotation: None,
            color: None,
            text: None,
            font_size: None,
            font_family: None,
            font_weight: None,
            font_style: None,
            text_decoration: None,
            filename: None,
            original_name: None,
            layer_id: None,
            z_index: None,
            group_id: None,
        };
        patch.apply_to(&mut el);
        assert_eq!(el.x, 5.0);
        assert_eq!(el.y, 1.0);
        assert_eq!(el.color, "#000");
    }
}
