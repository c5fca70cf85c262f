use super::*;

#[tokio::test]
async fn open_in_memory_runs_migrations() {
    let store = Store::open_in_memory().await.expect("open store");
    let threads = store.list_threads(false).await.expect("list threads");
    assert!(threads.is_empty());
}
