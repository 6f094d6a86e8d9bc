mod rooms;
mod system;
mod uploads;

pub use rooms::{check_room, generate_room, update_password};
pub use system::{health, not_found, run_retention_now, too_many_requests};
pub use uploads::{download_upload, upload_image};

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}
