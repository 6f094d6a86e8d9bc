pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod protocol;
pub mod rate_limit;
pub mod retention;
pub mod room;
pub mod routes;
pub mod session;
pub mod ws_server;

use std::sync::Arc;

use config::Config;
use rate_limit::{RateLimitConfig, RateLimiter};
use rocket_cors::CorsOptions;
use room::RoomRegistry;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    build_rocket(Config::from_env())
}

pub fn rocket_with_config(config: Config) -> rocket::Rocket<rocket::Build> {
    build_rocket(config)
}

fn build_rocket(config: Config) -> rocket::Rocket<rocket::Build> {
    std::fs::create_dir_all(&config.data_root).ok();
    std::fs::create_dir_all(&config.uploads_root).ok();

    let config = Arc::new(config);
    let registry = Arc::new(RoomRegistry::new(
        config.data_root.clone(),
        config.uploads_root.clone(),
        std::time::Duration::from_secs(config.room_idle_grace_secs),
    ));
    let rate_limit_config = RateLimitConfig::from_env();
    let rate_limiter = Arc::new(RateLimiter::new());

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let ws_fairing_config = Arc::clone(&config);
    let ws_fairing_registry = Arc::clone(&registry);
    let ws_fairing_rate_limiter = Arc::clone(&rate_limiter);

    let writer_config = Arc::clone(&config);
    let writer_registry = Arc::clone(&registry);

    let retention_config = Arc::clone(&config);
    let retention_registry = Arc::clone(&registry);

    rocket::build()
        .manage(Arc::clone(&config))
        .manage(Arc::clone(&registry))
        .manage(rate_limit_config)
        .manage(Arc::clone(&rate_limiter))
        .attach(cors)
        .register(
            "/",
            rocket::catchers![routes::too_many_requests, routes::not_found],
        )
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::run_retention_now,
                routes::generate_room,
                routes::check_room,
                routes::update_password,
                routes::upload_image,
                routes::download_upload,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Collaboration WebSocket Server",
            move |_rocket| {
                Box::pin(async move {
                    ws_server::spawn(ws_fairing_config, ws_fairing_registry, ws_fairing_rate_limiter);
                    tracing::info!("collaboration websocket server started");
                })
            },
        ))
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Snapshot Writer",
            move |_rocket| {
                Box::pin(async move {
                    persistence::spawn_writer(
                        writer_registry,
                        writer_config.data_root.clone(),
                        std::time::Duration::from_secs(writer_config.snapshot_cadence_secs),
                    );
                    tracing::info!("snapshot writer started");
                })
            },
        ))
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Room Retention",
            move |_rocket| {
                Box::pin(async move {
                    retention::spawn_retention_task(
                        retention_config.data_root.clone(),
                        retention_registry,
                        retention_config.retention_days,
                    );
                    tracing::info!("room retention sweeper started");
                })
            },
        ))
}
