use std::path::Path;
use std::sync::Arc;

use serial_test::serial;
use sift_core::{Config, discover_repositories};
use sift_index::{CollectionKind, HashCache, IndexStore, RepoIndexer, SqliteStore};
use tempfile::TempDir;

fn write_config(dir: &Path, db: &Path) -> std::path::PathBuf {
    let path = dir.join("sift.toml");
    std::fs::write(
        &path,
        format!(
            "[index]\nchunk_size = 400\nchunk_overlap = 40\nbatch_size = 2\n\n[storage]\nsqlite_path = \"{}\"\n",
            db.display()
        ),
    )
    .unwrap();
    path
}

fn python_module(functions: usize) -> String {
    let mut out = String::from("import os\n\n");
    for i in 0..functions {
        out.push_str(&format!(
            "def handler_{i}(event):\n    value = event.get('key_{i}')\n    return os.path.join(value, '{i}')\n\n"
        ));
    }
    out
}

fn make_repo(root: &Path, name: &str) -> std::path::PathBuf {
    let repo = root.join(name);
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::create_dir_all(repo.join("src")).unwrap();
    std::fs::write(repo.join("src/handlers.py"), python_module(20)).unwrap();
    std::fs::write(repo.join("README.md"), "# Service\n\nHandlers for events.\n").unwrap();
    std::fs::write(repo.join("image.png"), [0u8, 1, 2, 3]).unwrap();
    repo
}

fn indexer_for(config: &Config, store: &Arc<SqliteStore>) -> RepoIndexer {
    RepoIndexer::new(
        Arc::clone(store) as Arc<dyn IndexStore>,
        Arc::new(HashCache::new()),
        config.indexer_config(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn config_file_drives_sqlite_indexing() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state/index.db");
    let config = Config::load(&write_config(dir.path(), &db)).unwrap();
    config.validate().unwrap();
    assert_eq!(config.index.chunk_size, 400);

    let repo = make_repo(dir.path(), "svc");
    let store = Arc::new(SqliteStore::new(&config.storage.sqlite_path).await.unwrap());
    assert!(db.exists());

    let first = indexer_for(&config, &store)
        .index_repository(&repo, "svc")
        .await
        .unwrap();
    assert!(first.is_clean());
    assert_eq!(first.files_scanned, 2);
    assert_eq!(first.files_added, 2);
    assert!(first.chunks_processed > 2);

    let chunks = store.load_chunks("svc", "src/handlers.py").await.unwrap();
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.size <= 400 || c.oversized));

    let second = indexer_for(&config, &store)
        .index_repository(&repo, "svc")
        .await
        .unwrap();
    assert_eq!(second.files_unchanged, 2);
    assert_eq!(second.chunks_processed, 0);
    assert_eq!(second.progress_line(), "==");

    assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 2);
    assert_eq!(
        store.count(CollectionKind::Chunks).await.unwrap(),
        u64::try_from(first.chunks_processed).unwrap()
    );
}

#[tokio::test]
#[serial]
async fn reopened_database_keeps_state() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("index.db");
    let config = Config::load(&write_config(dir.path(), &db)).unwrap();
    let repo = make_repo(dir.path(), "svc");

    {
        let store = Arc::new(SqliteStore::new(&config.storage.sqlite_path).await.unwrap());
        indexer_for(&config, &store)
            .index_repository(&repo, "svc")
            .await
            .unwrap();
        store.pool().close().await;
    }

    std::fs::remove_file(repo.join("README.md")).unwrap();
    std::fs::write(repo.join("src/extra.rs"), "fn main() {}\n").unwrap();

    let store = Arc::new(SqliteStore::new(&config.storage.sqlite_path).await.unwrap());
    let report = indexer_for(&config, &store)
        .index_repository(&repo, "svc")
        .await
        .unwrap();
    assert_eq!(report.files_added, 1);
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(report.files_removed, 1);
    assert!(store.load_file("svc", "README.md").await.unwrap().is_none());
    assert!(store.load_chunks("svc", "README.md").await.unwrap().is_empty());
    assert_eq!(store.repositories().await.unwrap(), vec![("svc".to_owned(), 2)]);
}

#[tokio::test]
#[serial]
async fn index_all_then_delete_one_repository() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("repos");
    let db = dir.path().join("index.db");
    let config = Config::load(&write_config(dir.path(), &db)).unwrap();
    make_repo(&root, "beta");
    make_repo(&root, "alpha");
    std::fs::create_dir_all(root.join("not-a-repo")).unwrap();

    let store = Arc::new(SqliteStore::new(&config.storage.sqlite_path).await.unwrap());
    let repos = discover_repositories(&root, None).unwrap();
    assert_eq!(repos.len(), 2);
    for repo in &repos {
        let report = indexer_for(&config, &store)
            .index_repository(&repo.path, &repo.name)
            .await
            .unwrap();
        assert_eq!(report.files_added, 2);
    }

    let listed: Vec<String> = store
        .repositories()
        .await
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(listed, vec!["alpha", "beta"]);

    store.delete_repository("alpha").await.unwrap();
    assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 2);
    assert!(store.load_chunks("alpha", "src/handlers.py").await.unwrap().is_empty());
    assert!(!store.load_chunks("beta", "src/handlers.py").await.unwrap().is_empty());
}
