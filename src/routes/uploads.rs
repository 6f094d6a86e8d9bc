use std::sync::Arc;

use rocket::fs::TempFile;
use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::{get, post, FromForm, State};

use crate::config::Config;
use crate::room::registry::validate_room_name;

const MAX_IMAGE_SIZE: u64 = 3 * 1024 * 1024;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(FromForm)]
pub struct ImageUploadForm<'r> {
    pub room: String,
    pub file: TempFile<'r>,
}

#[derive(serde::Serialize)]
pub struct UploadedImage {
    pub filename: String,
    pub original_name: String,
}

/// `POST /api/upload/image` — saves an uploaded image under the room's
/// upload directory after validating content type, extension, magic bytes,
/// and size, per the upload acceptance rules.
#[post("/api/upload/image", data = "<form>")]
pub async fn upload_image(
    config: &State<Arc<Config>>,
    mut form: rocket::form::Form<ImageUploadForm<'_>>,
) -> Result<Json<UploadedImage>, (Status, Json<serde_json::Value>)> {
    if validate_room_name(&form.room).is_err() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "invalid room name"})),
        ));
    }

    let original_name = form
        .file
        .raw_name()
        .map(|n| n.dangerous_unsafe_unsanitized_raw().to_string())
        .unwrap_or_else(|| "upload".to_string());

    let extension = original_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !matches!(extension.as_str(), "jpg" | "jpeg" | "png") {
        return Err((
            Status::UnsupportedMediaType,
            Json(serde_json::json!({"error": "only .jpg, .jpeg, .png are accepted"})),
        ));
    }

    let content_type = form.file.content_type().cloned();
    let mime_ok = content_type
        .as_ref()
        .is_some_and(|ct| ct == &ContentType::JPEG || ct == &ContentType::PNG);
    if !mime_ok {
        return Err((
            Status::UnsupportedMediaType,
            Json(serde_json::json!({"error": "only image/jpeg and image/png are accepted"})),
        ));
    }

    if form.file.len() >= MAX_IMAGE_SIZE {
        return Err((
            Status::PayloadTooLarge,
            Json(serde_json::json!({"error": format!("image must be under {MAX_IMAGE_SIZE} bytes")})),
        ));
    }

    let room_dir = config.uploads_root.join(&form.room);
    std::fs::create_dir_all(&room_dir).map_err(|e| {
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })?;

    let stored_name = format!("{}.{extension}", uuid::Uuid::new_v4());
    let dest = room_dir.join(&stored_name);
    form.file.persist_to(&dest).await.map_err(|e| {
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })?;

    if !has_valid_magic_bytes(&dest, &extension) {
        let _ = std::fs::remove_file(&dest);
        return Err((
            Status::UnsupportedMediaType,
            Json(serde_json::json!({"error": "file content does not match an accepted image format"})),
        ));
    }

    Ok(Json(UploadedImage {
        filename: stored_name,
        original_name,
    }))
}

fn has_valid_magic_bytes(path: &std::path::Path, extension: &str) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    match extension {
        "jpg" | "jpeg" => bytes.starts_with(&JPEG_MAGIC),
        "png" => bytes.starts_with(&PNG_MAGIC),
        _ => false,
    }
}

/// `GET /api/uploads/{room}/{filename}` — streams a previously uploaded image.
#[get("/api/uploads/<room>/<filename>")]
pub async fn download_upload(
    config: &State<Arc<Config>>,
    room: &str,
    filename: &str,
) -> Result<(ContentType, Vec<u8>), Status> {
    if validate_room_name(room).is_err() || filename.contains("..") || filename.contains('/') {
        return Err(Status::BadRequest);
    }
    let path = config.uploads_root.join(room).join(filename);
    let bytes = std::fs::read(&path).map_err(|_| Status::NotFound)?;
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => ContentType::PNG,
        Some("jpg") | Some("jpeg") => ContentType::JPEG,
        _ => ContentType::Binary,
    };
    Ok((content_type, bytes))
}
