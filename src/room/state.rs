//! In-memory state of a single room (C1). Owned exclusively by that room's
//! actor task — nothing outside `room::actor` ever touches a `RoomState`
//! directly, which is what lets every mutation here skip locking.

use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;

use crate::error::RoomError;
use crate::models::{Camera, Element, ElementPatch, Layer, LayerPatch, RoomSnapshot, ShapeHolder};

pub struct RoomState {
    pub name: String,
    /// Insertion order matters for `z_index`-free stacking fallback and for
    /// deterministic full-sync payloads.
    pub elements: IndexMap<String, Element>,
    pub layers: IndexMap<String, Layer>,
    pub camera: Camera,
    pub admin_password_hash: Option<String>,
    pub readonly_password_hash: Option<String>,
    /// userId -> advisory lock info, for the soft-lock "who's touching this" UI hint.
    pub holders: HashMap<String, ShapeHolder>,
    pub created_at: chrono::DateTime<Utc>,
    pub last_modified_at: chrono::DateTime<Utc>,
    /// Set on any mutation, cleared by the persistence sweep once written.
    pub dirty: bool,
}

const DEFAULT_LAYER_ID: &str = "default";

impl RoomState {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut layers = IndexMap::new();
        layers.insert(
            DEFAULT_LAYER_ID.to_string(),
            Layer::new_default(DEFAULT_LAYER_ID, "Layer 1"),
        );
        Self {
            name: name.into(),
            elements: IndexMap::new(),
            layers,
            camera: Camera::default(),
            admin_password_hash: None,
            readonly_password_hash: None,
            holders: HashMap::new(),
            created_at: now,
            last_modified_at: now,
            dirty: true,
        }
    }

    pub fn from_snapshot(name: impl Into<String>, snapshot: RoomSnapshot) -> Self {
        let mut elements = IndexMap::new();
        for mut el in snapshot.elements {
            el.sanitize();
            elements.insert(el.id.clone(), el);
        }
        let mut layers = IndexMap::new();
        for layer in snapshot.layers {
            layers.insert(layer.id.clone(), layer);
        }
        let mut state = Self {
            name: name.into(),
            elements,
            layers,
            camera: snapshot.camera.clamped(),
            admin_password_hash: snapshot.admin_password_hash,
            readonly_password_hash: snapshot.readonly_password_hash,
            holders: HashMap::new(),
            created_at: snapshot.created_at,
            last_modified_at: snapshot.last_modified_at,
            dirty: false,
        };
        state.rebuild_layer_index();
        state
    }

    pub fn to_snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            elements: self.elements.values().cloned().collect(),
            layers: self.layers.values().cloned().collect(),
            camera: self.camera,
            admin_password_hash: self.admin_password_hash.clone(),
            readonly_password_hash: self.readonly_password_hash.clone(),
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
        }
    }

    fn touch(&mut self) {
        self.last_modified_at = Utc::now();
        self.dirty = true;
    }

    pub fn add_element(&mut self, mut element: Element) -> Result<Element, RoomError> {
        if self.elements.contains_key(&element.id) {
            return Err(RoomError::DuplicateElement(element.id));
        }
        if !self.layers.contains_key(&element.layer_id) {
            element.layer_id = self.first_layer_id();
        }
        element.sanitize();
        let layer_id = element.layer_id.clone();
        self.elements.insert(element.id.clone(), element.clone());
        if let Some(layer) = self.layers.get_mut(&layer_id) {
            layer.elements.push(element.id.clone());
        }
        self.touch();
        Ok(element)
    }

    /// Merges `patch` into the element it names. Returns `None` (a no-op)
    /// if the id is unknown, mirroring `update_layer`'s idempotent miss.
    pub fn update_element(&mut self, patch: &ElementPatch) -> Option<Element> {
        let old_layer = self.elements.get(&patch.id)?.layer_id.clone();
        let element = self
            .elements
            .get_mut(&patch.id)
            .expect("existence checked above");
        patch.apply_to(element);
        let new_layer = element.layer_id.clone();
        let updated = element.clone();

        if old_layer != new_layer {
            if let Some(layer) = self.layers.get_mut(&old_layer) {
                layer.elements.retain(|id| id != &patch.id);
            }
            if self.layers.contains_key(&new_layer) {
                if let Some(layer) = self.layers.get_mut(&new_layer) {
                    layer.elements.push(patch.id.clone());
                }
            } else {
                // target layer doesn't exist: snap back to the element's old layer
                let element = self.elements.get_mut(&patch.id).unwrap();
                element.layer_id = old_layer.clone();
                if let Some(layer) = self.layers.get_mut(&old_layer) {
                    layer.elements.push(patch.id.clone());
                }
            }
        }

        self.touch();
        Some(updated)
    }

    pub fn delete_element(&mut self, id: &str) -> Option<Element> {
        let removed = self.elements.shift_remove(id)?;
        if let Some(layer) = self.layers.get_mut(&removed.layer_id) {
            layer.elements.retain(|e| e != id);
        }
        self.holders.remove(id);
        self.touch();
        Some(removed)
    }

    pub fn add_layer(&mut self, layer: Layer) -> Result<Layer, RoomError> {
        if self.layers.contains_key(&layer.id) {
            return Err(RoomError::DuplicateLayer(layer.id));
        }
        self.layers.insert(layer.id.clone(), layer.clone());
        self.touch();
        Ok(layer)
    }

    pub fn update_layer(&mut self, patch: &LayerPatch) -> Option<Layer> {
        let layer = self.layers.get_mut(&patch.id)?;
        patch.apply_to(layer);
        let updated = layer.clone();
        self.touch();
        Some(updated)
    }

    /// Deletes a layer and reassigns its elements to the first remaining
    /// layer. Refuses to delete the last layer in a room.
    pub fn delete_layer(&mut self, id: &str) -> Result<(), RoomError> {
        if self.layers.len() <= 1 {
            return Err(RoomError::LastLayer);
        }
        let Some(removed) = self.layers.shift_remove(id) else {
            return Ok(());
        };
        let fallback = self.first_layer_id();
        for element_id in &removed.elements {
            if let Some(element) = self.elements.get_mut(element_id) {
                element.layer_id = fallback.clone();
            }
        }
        if let Some(layer) = self.layers.get_mut(&fallback) {
            layer.elements.extend(removed.elements);
        }
        self.touch();
        Ok(())
    }

    pub fn reorder_layers(&mut self, order: &[String]) {
        let mut reordered = IndexMap::with_capacity(self.layers.len());
        for id in order {
            if let Some(layer) = self.layers.shift_remove(id) {
                reordered.insert(id.clone(), layer);
            }
        }
        // Any layer missing from `order` keeps its relative position, appended at the end.
        for (id, layer) in self.layers.drain(..) {
            reordered.insert(id, layer);
        }
        self.layers = reordered;
        self.touch();
    }

    pub fn update_camera(&mut self, camera: Camera) {
        self.camera = camera.clamped();
        self.touch();
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        for layer in self.layers.values_mut() {
            layer.elements.clear();
        }
        self.holders.clear();
        self.touch();
    }

    /// Replaces both elements and layers wholesale (a client-driven full
    /// resync), rebuilds the element<->layer index, and drops any shape
    /// holder whose element no longer exists.
    pub fn full_sync(&mut self, elements: Vec<Element>, layers: Vec<Layer>) {
        self.elements = elements.into_iter().map(|e| (e.id.clone(), e)).collect();
        self.layers = layers.into_iter().map(|l| (l.id.clone(), l)).collect();
        if self.layers.is_empty() {
            self.layers.insert(
                DEFAULT_LAYER_ID.to_string(),
                Layer::new_default(DEFAULT_LAYER_ID, "Layer 1"),
            );
        }
        for element in self.elements.values_mut() {
            element.sanitize();
        }
        self.rebuild_layer_index();
        let elements = &self.elements;
        self.holders.retain(|id, _| elements.contains_key(id));
        self.touch();
    }

    pub fn select_shape(&mut self, id: &str, holder: ShapeHolder) {
        if self.elements.contains_key(id) {
            self.holders.insert(id.to_string(), holder);
        }
    }

    pub fn deselect_shape(&mut self, id: &str, user_id: &str) {
        if self.holders.get(id).is_some_and(|h| h.user_id == user_id) {
            self.holders.remove(id);
        }
    }

    /// Releases every shape held by a user, typically on disconnect.
    pub fn release_holders_for(&mut self, user_id: &str) {
        self.holders.retain(|_, h| h.user_id != user_id);
    }

    pub fn first_layer_id(&self) -> String {
        self.layers
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| DEFAULT_LAYER_ID.to_string())
    }

    /// Rebuilds each layer's `elements` list from the elements' own
    /// `layer_id`, reassigning orphans (pointing at a layer that no longer
    /// exists) to the first layer. Run once after loading a snapshot in
    /// case the two halves of the index drifted (e.g. manual edit of the
    /// on-disk file, or a crash mid-write).
    pub fn rebuild_layer_index(&mut self) {
        for layer in self.layers.values_mut() {
            layer.elements.clear();
        }
        let fallback = self.first_layer_id();
        let mut reassignments = Vec::new();
        for element in self.elements.values() {
            if self.layers.contains_key(&element.layer_id) {
                continue;
            }
            reassignments.push(element.id.clone());
        }
        for id in &reassignments {
            if let Some(element) = self.elements.get_mut(id) {
                element.layer_id = fallback.clone();
            }
        }
        for element in self.elements.values() {
            if let Some(layer) = self.layers.get_mut(&element.layer_id) {
                layer.elements.push(element.id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShapeKind;

    fn element(id: &str, layer_id: &str) -> Element {
        Element {
            id: id.to_string(),
            shape: ShapeKind::Square,
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            rotation: 0.0,
            color: "#fff".into(),
            text: String::new(),
            font_size: None,
            font_family: None,
            font_weight: None,
            font_style: None,
            text_decoration: None,
            filename: None,
            original_name: None,
            layer_id: layer_id.to_string(),
            z_index: 0,
            group_id: None,
        }
    }

    #[test]
    fn add_element_rejects_duplicate_id() {
        let mut state = RoomState::new("room1");
        let layer = state.first_layer_id();
        state.add_element(element("e1", &layer)).unwrap();
        let err = state.add_element(element("e1", &layer)).unwrap_err();
        assert_eq!(err, RoomError::DuplicateElement("e1".into()));
    }

    #[test]
    fn update_element_unknown_id_is_a_no_op() {
        let mut state = RoomState::new("room1");
        let patch: ElementPatch =
            serde_json::from_value(serde_json::json!({"id": "missing"})).unwrap();
        assert!(state.update_element(&patch).is_none());
    }

    #[test]
    fn delete_last_layer_is_rejected() {
        let mut state = RoomState::new("room1");
        let only_layer = state.first_layer_id();
        assert_eq!(state.delete_layer(&only_layer), Err(RoomError::LastLayer));
    }

    #[test]
    fn delete_layer_reassigns_elements_to_fallback() {
        let mut state = RoomState::new("room1");
        let first = state.first_layer_id();
        let second = state
            .add_layer(Layer::new_default("l2", "Layer 2"))
            .unwrap();
        state.add_element(element("e1", &second.id)).unwrap();

        state.delete_layer(&second.id).unwrap();

        let moved = state.elements.get("e1").unwrap();
        assert_eq!(moved.layer_id, first);
        assert!(state.layers[&first].elements.contains(&"e1".to_string()));
    }

    #[test]
    fn full_sync_replaces_elements_and_drops_stale_holders() {
        let mut state = RoomState::new("room1");
        let layer = state.first_layer_id();
        state.add_element(element("old", &layer)).unwrap();
        state.select_shape(
            "old",
            ShapeHolder {
                user_id: "u1".into(),
                user_name: "Alice".into(),
                action: "select".into(),
                acquired_at: Utc::now(),
            },
        );

        state.full_sync(vec![element("new", "missing-layer")], vec![]);

        assert!(!state.elements.contains_key("old"));
        assert!(state.elements.contains_key("new"));
        assert!(state.holders.is_empty());
        let fallback = state.first_layer_id();
        assert_eq!(state.elements["new"].layer_id, fallback);
        assert!(state.layers[&fallback].elements.contains(&"new".to_string()));
    }

    #[test]
    fn rebuild_layer_index_reassigns_orphans() {
        let mut state = RoomState::new("room1");
        let mut el = element("e1", "missing-layer");
        el.sanitize();
        state.elements.insert(el.id.clone(), el);
        state.rebuild_layer_index();
        let fallback = state.first_layer_id();
        assert_eq!(state.elements["e1"].layer_id, fallback);
        assert!(state.layers[&fallback].elements.contains(&"e1".to_string()));
    }
}
