use metre_rs::{
    storage::{Storage, StorageConfig},
    sync::{keys, ManualClock},
    MainTableLine, Workspace, WorkspaceConfig,
};
use std::sync::Arc;

async fn workspace(storage: Arc<Storage>, source: &str) -> Workspace {
    let config = WorkspaceConfig {
        source: source.to_string(),
        ..WorkspaceConfig::default()
    };
    Workspace::with_storage(storage, config, Arc::new(ManualClock::new(0)))
        .await
        .unwrap()
}

fn line(title: &str, quantity: f64, unit_price: f64) -> MainTableLine {
    MainTableLine {
        title: title.to_string(),
        quantity,
        unit_price,
        ..MainTableLine::new()
    }
}

#[tokio::test]
async fn versions_are_isolated() {
    let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
    let mut ws = workspace(storage, "metre").await;

    let a_chapter = ws.add_root_chapter().await.unwrap();
    ws.add_line(&a_chapter, line("Fondations", 10.0, 150.0)).await.unwrap();
    ws.set_note(&a_chapter, "version A").await.unwrap();
    ws.select(Some(a_chapter.as_str())).await.unwrap();

    let b = ws.create_version("Variante B").await.unwrap();
    assert_eq!(ws.active_version(), Some(b.as_str()));
    assert!(ws.document().tree().is_empty());
    assert_eq!(ws.view().selected_key, None);

    let b_chapter = ws.add_root_chapter().await.unwrap();
    ws.add_line(&b_chapter, line("Charpente", 2.0, 800.0)).await.unwrap();

    ws.switch_version(keys::DEFAULT_VERSION_ID).await.unwrap();
    let doc = ws.document();
    assert!(doc.tree().contains(&a_chapter));
    assert!(!doc.tree().contains(&b_chapter));
    assert_eq!(doc.grand_total(), 1500.0);
    assert_eq!(doc.note(&a_chapter), "version A");
    assert_eq!(ws.view().selected_key.as_deref(), Some(a_chapter.as_str()));

    ws.switch_version(&b).await.unwrap();
    assert!(ws.document().tree().contains(&b_chapter));
    assert_eq!(ws.document().grand_total(), 1600.0);

    let names: Vec<_> = ws.list_versions().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Version par défaut", "Variante B"]);
}

#[tokio::test]
async fn active_version_survives_reopen() {
    let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
    let mut first = workspace(storage.clone(), "metre").await;
    let b = first.create_version("B").await.unwrap();
    let chapter = first.add_root_chapter().await.unwrap();
    drop(first);

    let second = workspace(storage.clone(), "summary").await;
    assert_eq!(second.active_version(), Some(b.as_str()));
    assert!(second.document().tree().contains(&chapter));
    assert_eq!(storage.get(keys::CURRENT_VERSION).await.unwrap(), Some(b));
}

#[tokio::test]
async fn unknown_version_is_an_error() {
    let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
    let mut ws = workspace(storage, "metre").await;
    let chapter = ws.add_root_chapter().await.unwrap();

    assert!(ws.switch_version("missing").await.is_err());
    assert_eq!(ws.active_version(), Some(keys::DEFAULT_VERSION_ID));
    assert!(ws.document().tree().contains(&chapter));
}

#[tokio::test]
async fn cleared_selection_stays_cleared_after_switch() {
    let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
    let mut ws = workspace(storage, "metre").await;
    let chapter = ws.add_root_chapter().await.unwrap();

    ws.select(Some(chapter.as_str())).await.unwrap();
    ws.select(None).await.unwrap();
    ws.create_version("B").await.unwrap();
    ws.switch_version(keys::DEFAULT_VERSION_ID).await.unwrap();

    assert_eq!(ws.view().selected_key, None);
}
