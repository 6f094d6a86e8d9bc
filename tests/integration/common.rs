use rocket::local::blocking::Client;

/// Wrapper around Client that auto-deletes the temp data/uploads directories
/// on drop, so test runs don't accumulate `/tmp/canvas_test_*` trees.
pub struct TestClient {
    client: Option<Client>,
    data_root: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_dir_all(&self.data_root);
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

impl TestClient {
    pub fn data_root(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.data_root)
    }
}

pub fn test_client() -> TestClient {
    test_client_with_config(infinite_canvas::config::Config::default())
}

pub fn test_client_with_config(mut config: infinite_canvas::config::Config) -> TestClient {
    let suffix = uuid::Uuid::new_v4().to_string();
    let data_root = format!("/tmp/canvas_test_{suffix}");
    config.data_root = data_root.clone().into();
    config.uploads_root = format!("{data_root}/uploads").into();
    // Each test spins up its own WS accept loop; a fixed port would collide
    // across the parallel test runner.
    config.ws_addr = format!("127.0.0.1:{}", 20000 + (rand_port_offset() % 20000));

    let rocket = infinite_canvas::rocket_with_config(config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), data_root }
}

fn rand_port_offset() -> u16 {
    let bytes = uuid::Uuid::new_v4().as_u128();
    (bytes % 20000) as u16
}
