use clap::Parser;

use super::*;

const IDLE_AGENT: &str = "read -r line\nwhile read -r line; do :; done\n";

#[tokio::test]
async fn prepare_binds_an_ephemeral_port_and_serves_health() {
    let db_dir = tempfile::tempdir().expect("tempdir");
    let package_dir = tempfile::tempdir().expect("tempdir");
    let db_path = db_dir.path().join("bridged.sqlite3");

    let config = Config::parse_from([
        "bridged",
        "--port",
        "0",
        "--db-path",
        db_path.to_str().unwrap(),
        "--package-dir",
        package_dir.path().to_str().unwrap(),
        "--",
        "sh",
        "-c",
        IDLE_AGENT,
    ]);

    let daemon = prepare(config).await.expect("prepare daemon");
    let addr = daemon.listener.local_addr().expect("local addr");

    let handle = tokio::spawn(daemon.run());

    let url = format!("http://{addr}/health");
    let body = reqwest::get(&url).await.expect("GET /health").text().await.expect("body");
    assert!(body.contains("\"status\":\"ok\""));

    handle.abort();
}
