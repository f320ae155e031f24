use metre_rs::{
    quantity::{DetailColumn, LineColumn},
    storage::StorageConfig,
    CellValue, DetailLine, MainTableLine, Workspace, WorkspaceConfig,
};
use tempfile::tempdir;

#[tokio::test]
async fn test_sqlite_storage() -> Result<(), Box<dyn std::error::Error>> {
    // Create a temporary directory for the SQLite database
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("test_metre.db");

    let config = WorkspaceConfig {
        storage: StorageConfig::Sqlite {
            path: db_path.to_string_lossy().to_string(),
        },
        ..WorkspaceConfig::default()
    };

    let mut ws = Workspace::open(config.clone()).await?;

    // Build a chapter with one line broken down into two detail rows
    let root = ws.add_root_chapter().await?;
    ws.update_chapter(&root, None, Some("Gros oeuvre")).await?;
    let child = ws.add_child_chapter(&root).await?;

    let line = MainTableLine {
        title: "Dalle".to_string(),
        unit_price: 80.0,
        ..MainTableLine::new()
    };
    let index = ws.add_line(&child, line).await?;

    let mut slab = DetailLine::new("Dalle RDC");
    slab.number = 1.0;
    slab.length = 10.0;
    slab.width = 5.0;
    slab.height = 0.2;
    ws.add_detail_row(&child, index, slab).await?;
    ws.add_detail_row(&child, index, DetailLine::new("Dalle R+1")).await?;
    ws.edit_detail(&child, index, 1, DetailColumn::Number, &CellValue::from("1")).await?;
    ws.edit_detail(&child, index, 1, DetailColumn::Length, &CellValue::Number(5.0)).await?;
    ws.edit_detail(&child, index, 1, DetailColumn::Width, &CellValue::Number(2.0)).await?;
    ws.edit_detail(&child, index, 1, DetailColumn::Height, &CellValue::Number(1.0)).await?;

    assert_eq!(ws.apply_detail_quantity(&child, index).await?, Some(20.0));
    ws.set_note(&child, "Béton C25/30").await?;
    ws.set_active_tab("details").await?;

    let table = ws.document().table(&child).cloned().unwrap();
    assert_eq!(table.total(), 1600.0);
    assert_eq!(table.get(index).map(|l| l.get(LineColumn::Quantity)), Some(CellValue::Number(20.0)));

    ws.close().await?;

    // Reopen the same database as a new context
    let reopened = Workspace::open(WorkspaceConfig {
        source: "other".to_string(),
        ..config
    })
    .await?;

    let doc = reopened.document();
    assert_eq!(doc.tree().title_of(&root).as_deref(), Some("1 - Gros oeuvre"));
    assert_eq!(doc.tree().title_of(&child).as_deref(), Some("1.1 - Nouveau poste"));
    assert_eq!(doc.table(&child).map(|t| t.total()), Some(1600.0));
    assert_eq!(doc.detail_table(&child, index).map(|t| t.len()), Some(2));
    assert_eq!(doc.note(&child), "Béton C25/30");
    assert_eq!(reopened.view().active_tab.as_deref(), Some("details"));

    Ok(())
}
