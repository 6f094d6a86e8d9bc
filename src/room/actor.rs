//! The room actor (C2): a single task owns one room's `RoomState` and
//! processes commands one at a time over an mpsc channel, which is what
//! gives every mutation in a room a single, serialized writer.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RoomError;
use crate::models::{Camera, Element, ElementPatch, Layer, LayerPatch, Role, ShapeHolder};
use super::state::RoomState;

/// Outbound channel capacity per room. A slow consumer that falls behind by
/// this many frames gets dropped frames, not an unbounded queue.
const BROADCAST_CAPACITY: usize = 256;

pub struct JoinResult {
    pub role: Role,
    pub elements: Vec<Element>,
    pub layers: Vec<Layer>,
    pub camera: Camera,
    pub holders: Vec<ShapeHolder>,
}

pub enum Command {
    Join {
        user_id: String,
        user_name: String,
        color: String,
        password: Option<String>,
        reply: oneshot::Sender<Result<JoinResult, RoomError>>,
    },
    Leave {
        user_id: String,
    },
    AddElement {
        user_id: String,
        user_name: String,
        element: Element,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    UpdateElement {
        user_id: String,
        user_name: String,
        patch: ElementPatch,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    MoveElement {
        user_id: String,
        user_name: String,
        patch: ElementPatch,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    DeleteElement {
        user_id: String,
        user_name: String,
        id: String,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    AddLayer {
        user_id: String,
        user_name: String,
        layer: Layer,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    UpdateLayer {
        user_id: String,
        user_name: String,
        patch: LayerPatch,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    DeleteLayer {
        user_id: String,
        user_name: String,
        id: String,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ReorderLayers {
        user_id: String,
        user_name: String,
        order: Vec<String>,
        role: Role,
    },
    UpdateCamera {
        user_id: String,
        user_name: String,
        camera: Camera,
    },
    SelectShape {
        user_id: String,
        user_name: String,
        id: String,
        action: String,
        role: Role,
    },
    DeselectShape {
        user_id: String,
        id: String,
    },
    /// Updates the session's display name, not persisted and not broadcast.
    SetUserName {
        user_id: String,
        user_name: String,
    },
    ClearCanvas {
        user_id: String,
        user_name: String,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Admin-only wholesale replace of elements and layers, followed by an
    /// index rebuild. See `RoomState::full_sync`.
    FullSync {
        user_id: String,
        user_name: String,
        elements: Vec<Element>,
        layers: Vec<Layer>,
        role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ChangePassword {
        role: Role,
        new_hash: String,
        current_password: Option<String>,
        requester_role: Role,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Returns a snapshot only if the room has unflushed mutations, clearing
    /// the dirty flag as a side effect.
    FlushIfDirty {
        reply: oneshot::Sender<Option<crate::models::RoomSnapshot>>,
    },
    /// Unconditional snapshot, used on room unload.
    Flush {
        reply: oneshot::Sender<crate::models::RoomSnapshot>,
    },
    ActiveSessionCount {
        reply: oneshot::Sender<usize>,
    },
    RequiresPassword {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// A cheap, cloneable reference to a running room actor.
#[derive(Clone)]
pub struct RoomHandle {
    pub name: String,
    commands: mpsc::Sender<Command>,
    broadcast: broadcast::Sender<crate::protocol::ServerFrame>,
}

impl RoomHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<crate::protocol::ServerFrame> {
        self.broadcast.subscribe()
    }

    pub async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            warn!(room = %self.name, "command dropped: room actor is gone");
        }
    }

    /// Publishes a frame straight to the broadcast channel, bypassing the
    /// command queue. Used for ephemeral, non-persisted traffic like cursor
    /// moves that don't need to go through `RoomState` at all.
    pub fn publish(&self, frame: crate::protocol::ServerFrame) {
        let _ = self.broadcast.send(frame);
    }
}

/// Spawns the actor task for a freshly created or freshly loaded room and
/// returns a handle to it. The actor exits when every `RoomHandle` clone is
/// dropped (the registry keeps the canonical one) or on `Command::Shutdown`.
pub fn spawn(state: RoomState) -> RoomHandle {
    let (tx, rx) = mpsc::channel(64);
    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    let name = state.name.clone();
    let handle = RoomHandle {
        name: name.clone(),
        commands: tx,
        broadcast: broadcast_tx.clone(),
    };
    tokio::spawn(run(name, state, rx, broadcast_tx));
    handle
}

async fn run(
    name: String,
    mut state: RoomState,
    mut rx: mpsc::Receiver<Command>,
    tx: broadcast::Sender<crate::protocol::ServerFrame>,
) {
    use crate::protocol::*;

    let mut active_sessions: HashMap<String, (String, String)> = HashMap::new();
    let publish = |frame: ServerFrame| {
        let _ = tx.send(frame);
    };

    while let Some(command) = rx.recv().await {
        match command {
            Command::Join {
                user_id,
                user_name,
                color,
                password,
                reply,
            } => {
                let role = match resolve_role(&state, password.as_deref()) {
                    Ok(role) => role,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                };
                active_sessions.insert(user_id.clone(), (user_name.clone(), color.clone()));
                let result = JoinResult {
                    role,
                    elements: state.elements.values().cloned().collect(),
                    layers: state.layers.values().cloned().collect(),
                    camera: state.camera,
                    holders: state.holders.values().cloned().collect(),
                };
                let _ = reply.send(Ok(result));
                publish(ServerFrame::UserJoined(UserInfoData {
                    user_id,
                    user_name,
                    color,
                }));
            }
            Command::Leave { user_id } => {
                active_sessions.remove(&user_id);
                state.release_holders_for(&user_id);
                publish(ServerFrame::UserLeft(UserLeftData { user_id }));
            }
            Command::AddElement {
                user_id,
                user_name,
                element,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                match state.add_element(element) {
                    Ok(added) => {
                        let _ = reply.send(Ok(()));
                        publish(ServerFrame::ElementAdded(ElementBroadcast {
                            user_id,
                            user_name,
                            payload: added,
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::UpdateElement {
                user_id,
                user_name,
                patch,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                if let Some(updated) = state.update_element(&patch) {
                    let _ = reply.send(Ok(()));
                    publish(ServerFrame::ElementUpdated(ElementBroadcast {
                        user_id,
                        user_name,
                        payload: updated,
                    }));
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            Command::MoveElement {
                user_id,
                user_name,
                patch,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                if let Some(moved) = state.update_element(&patch) {
                    let _ = reply.send(Ok(()));
                    publish(ServerFrame::ElementMoved(ElementBroadcast {
                        user_id,
                        user_name,
                        payload: moved,
                    }));
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            Command::DeleteElement {
                user_id,
                user_name,
                id,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                if state.delete_element(&id).is_some() {
                    let _ = reply.send(Ok(()));
                    publish(ServerFrame::ElementDeleted(ElementBroadcast {
                        user_id,
                        user_name,
                        payload: IdPayload { id },
                    }));
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            Command::AddLayer {
                user_id,
                user_name,
                layer,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                match state.add_layer(layer) {
                    Ok(added) => {
                        let _ = reply.send(Ok(()));
                        publish(ServerFrame::LayerAdded(ElementBroadcast {
                            user_id,
                            user_name,
                            payload: added,
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::UpdateLayer {
                user_id,
                user_name,
                patch,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                if let Some(updated) = state.update_layer(&patch) {
                    let _ = reply.send(Ok(()));
                    publish(ServerFrame::LayerUpdated(ElementBroadcast {
                        user_id,
                        user_name,
                        payload: updated,
                    }));
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            Command::DeleteLayer {
                user_id,
                user_name,
                id,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                match state.delete_layer(&id) {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                        publish(ServerFrame::LayerDeleted(ElementBroadcast {
                            user_id,
                            user_name,
                            payload: IdPayload { id },
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::ReorderLayers {
                user_id,
                user_name,
                order,
                role,
            } => {
                if role == Role::Readonly {
                    continue;
                }
                state.reorder_layers(&order);
                publish(ServerFrame::LayersReordered(ElementBroadcast {
                    user_id,
                    user_name,
                    payload: OrderPayload { order },
                }));
            }
            Command::UpdateCamera {
                user_id,
                user_name,
                camera,
            } => {
                state.update_camera(camera);
                publish(ServerFrame::CameraUpdated(ElementBroadcast {
                    user_id,
                    user_name,
                    payload: state.camera,
                }));
            }
            Command::SelectShape {
                user_id,
                user_name,
                id,
                action,
                role,
            } => {
                if role == Role::Readonly {
                    continue;
                }
                state.select_shape(
                    &id,
                    ShapeHolder {
                        user_id: user_id.clone(),
                        user_name: user_name.clone(),
                        action: action.clone(),
                        acquired_at: Utc::now(),
                    },
                );
                publish(ServerFrame::ShapeSelected(ElementBroadcast {
                    user_id,
                    user_name,
                    payload: ShapeSelectData { id, action },
                }));
            }
            Command::DeselectShape { user_id, id } => {
                state.deselect_shape(&id, &user_id);
                publish(ServerFrame::ShapeDeselected(ElementBroadcast {
                    user_id: user_id.clone(),
                    user_name: String::new(),
                    payload: IdPayload { id },
                }));
            }
            Command::SetUserName { user_id, user_name } => {
                if let Some(entry) = active_sessions.get_mut(&user_id) {
                    entry.0 = user_name;
                }
            }
            Command::ClearCanvas {
                user_id,
                user_name,
                role,
                reply,
            } => {
                if role == Role::Readonly {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                state.clear();
                let _ = reply.send(Ok(()));
                publish(ServerFrame::CanvasCleared(UserInfoData {
                    user_id,
                    user_name,
                    color: String::new(),
                }));
            }
            Command::FullSync {
                user_id,
                user_name,
                elements,
                layers,
                role,
                reply,
            } => {
                if role != Role::Admin {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                state.full_sync(elements, layers);
                let _ = reply.send(Ok(()));
                publish(ServerFrame::FullSync(FullSyncData {
                    elements: state.elements.values().cloned().collect(),
                    layers: state.layers.values().cloned().collect(),
                    camera: state.camera,
                }));
                debug!(room = %name, user = %user_id, who = %user_name, "full sync applied");
            }
            Command::ChangePassword {
                role,
                new_hash,
                current_password: _,
                requester_role,
                reply,
            } => {
                if requester_role != Role::Admin {
                    let _ = reply.send(Err(RoomError::ReadonlyRole));
                    continue;
                }
                match role {
                    Role::Admin => state.admin_password_hash = Some(new_hash),
                    Role::Readonly => state.readonly_password_hash = Some(new_hash),
                }
                state.dirty = true;
                let _ = reply.send(Ok(()));
                publish(ServerFrame::PasswordChanged(PasswordChangedData { role }));
            }
            Command::FlushIfDirty { reply } => {
                if state.dirty {
                    let snapshot = state.to_snapshot();
                    state.dirty = false;
                    let _ = reply.send(Some(snapshot));
                } else {
                    let _ = reply.send(None);
                }
            }
            Command::Flush { reply } => {
                let snapshot = state.to_snapshot();
                state.dirty = false;
                let _ = reply.send(snapshot);
            }
            Command::ActiveSessionCount { reply } => {
                let _ = reply.send(active_sessions.len());
            }
            Command::RequiresPassword { reply } => {
                let requires = state.admin_password_hash.is_some() || state.readonly_password_hash.is_some();
                let _ = reply.send(requires);
            }
            Command::Shutdown => {
                debug!(room = %name, "room actor shutting down");
                break;
            }
        }
    }
}

/// Legacy rule preserved from the original chat room's admin-key behavior:
/// a room with no admin password set grants Admin to anyone, even a blank
/// password, as long as no readonly-only password has been configured either.
fn resolve_role(state: &RoomState, password: Option<&str>) -> Result<Role, RoomError> {
    let password = password.filter(|p| !p.is_empty());
    match (&state.admin_password_hash, &state.readonly_password_hash) {
        (None, None) => Ok(Role::Admin),
        (Some(admin_hash), readonly_hash) => {
            if let Some(pw) = password {
                if crate::auth::verify_password(pw, admin_hash) {
                    return Ok(Role::Admin);
                }
                if let Some(ro_hash) = readonly_hash
                    && crate::auth::verify_password(pw, ro_hash)
                {
                    return Ok(Role::Readonly);
                }
            }
            Err(RoomError::WrongPassword)
        }
        (None, Some(ro_hash)) => match password {
            None => Ok(Role::Admin),
            Some(pw) if crate::auth::verify_password(pw, ro_hash) => Ok(Role::Readonly),
            Some(_) => {
                debug!("legacy no-admin-password room: non-matching password rejected rather than falling back to admin");
                Err(RoomError::WrongPassword)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_room_always_grants_admin() {
        let state = RoomState::new("r1");
        assert_eq!(resolve_role(&state, None), Ok(Role::Admin));
        assert_eq!(resolve_role(&state, Some("anything")), Ok(Role::Admin));
    }

    #[test]
    fn admin_and_readonly_hashes_gate_by_match() {
        let mut state = RoomState::new("r1");
        state.admin_password_hash = Some(crate::auth::hash_password("adminpw"));
        state.readonly_password_hash = Some(crate::auth::hash_password("viewpw"));

        assert_eq!(resolve_role(&state, Some("adminpw")), Ok(Role::Admin));
        assert_eq!(resolve_role(&state, Some("viewpw")), Ok(Role::Readonly));
        assert_eq!(resolve_role(&state, Some("wrong")), Err(RoomError::WrongPassword));
        assert_eq!(resolve_role(&state, None), Err(RoomError::WrongPassword));
    }

    #[test]
    fn readonly_only_hash_grants_admin_on_blank_password() {
        let mut state = RoomState::new("r1");
        state.readonly_password_hash = Some(crate::auth::hash_password("viewpw"));

        assert_eq!(resolve_role(&state, None), Ok(Role::Admin));
        assert_eq!(resolve_role(&state, Some("")), Ok(Role::Admin));
        assert_eq!(resolve_role(&state, Some("viewpw")), Ok(Role::Readonly));
        assert_eq!(resolve_role(&state, Some("wrong")), Err(RoomError::WrongPassword));
    }
}
