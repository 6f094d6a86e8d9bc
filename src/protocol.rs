//! Wire format for the WebSocket collaboration channel. Every frame, in either
//! direction, is a JSON object `{"type": ..., "data": ...}`; serde's adjacently
//! tagged representation maps onto that directly.

use serde::{Deserialize, Serialize};

use crate::models::{Camera, Element, ElementPatch, Layer, LayerPatch, Role, ShapeHolder};

/// A frame sent by a client over the collaboration socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    JoinRoom(JoinRoomData),
    AddElement { element: Element },
    UpdateElement { patch: ElementPatch },
    MoveElement { patch: ElementPatch },
    DeleteElement { id: String },
    AddLayer { layer: Layer },
    UpdateLayer { patch: LayerPatch },
    DeleteLayer { id: String },
    ReorderLayers { order: Vec<String> },
    UpdateCamera { camera: Camera },
    SelectShape { id: String, action: String },
    DeselectShape { id: String },
    CursorMove { x: f64, y: f64, world_x: f64, world_y: f64, action: String },
    ClearCanvas,
    FullSync { elements: Vec<Element>, layers: Vec<Layer> },
    UpdateUserName { user_name: String },
    Ping,
    Pong,
}

/// A frame sent by the server over the collaboration socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerFrame {
    Init(InitData),
    ElementAdded(ElementBroadcast<Element>),
    ElementUpdated(ElementBroadcast<Element>),
    ElementMoved(ElementBroadcast<Element>),
    ElementDeleted(ElementBroadcast<IdPayload>),
    LayerAdded(ElementBroadcast<Layer>),
    LayerUpdated(ElementBroadcast<Layer>),
    LayerDeleted(ElementBroadcast<IdPayload>),
    LayersReordered(ElementBroadcast<OrderPayload>),
    CameraUpdated(ElementBroadcast<Camera>),
    ShapeSelected(ElementBroadcast<ShapeSelectData>),
    ShapeDeselected(ElementBroadcast<IdPayload>),
    CursorMoved(CursorData),
    CanvasCleared(UserInfoData),
    UserJoined(UserInfoData),
    UserLeft(UserLeftData),
    FullSync(FullSyncData),
    PasswordChanged(PasswordChangedData),
    Ping,
    Pong,
    Error(ErrorData),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    pub room: String,
    pub password: Option<String>,
    pub user_name: String,
}

/// Wraps a broadcasted payload with the originating user, so recipients can
/// attribute the change without a second round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBroadcast<T> {
    pub user_id: String,
    pub user_name: String,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdPayload {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeSelectData {
    pub id: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorData {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    pub world_x: f64,
    pub world_y: f64,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoData {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftData {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    pub user_id: String,
    pub color: String,
    pub role: Role,
    pub elements: Vec<Element>,
    pub layers: Vec<Layer>,
    pub camera: Camera,
    pub holders: Vec<ShapeHolder>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncData {
    pub elements: Vec<Element>,
    pub layers: Vec<Layer>,
    pub camera: Camera,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangedData {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: String,
}
