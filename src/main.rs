use infinite_canvas::rocket;

#[rocket::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = rocket().launch().await {
        tracing::error!("server exited with error: {e}");
        std::process::exit(1);
    }
}
