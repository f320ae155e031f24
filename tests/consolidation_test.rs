use metre_rs::{
    consolidation::PROJECT_TOTAL_TITLE,
    payload::ProjectFull,
    quantity::LineColumn,
    storage::{Storage, StorageConfig},
    sync::ManualClock,
    CellValue, ConsolidatedRow, EditOutcome, Workspace, WorkspaceConfig,
};
use std::sync::Arc;

const PROJECT: &str = r#"{
    "project": { "id": 12, "name": "Maison Durand" },
    "chapters": [
        {
            "chapter": { "id": 2, "num": "2", "label": "Charpente", "content": "bois" },
            "lines": [
                { "mainTableLine": { "id": 21, "title": "Poutres", "quantity": "4", "unitPrice": 400, "position": 0 } }
            ]
        },
        {
            "chapter": { "id": 1, "num": "1", "label": "Maçonnerie" },
            "lines": [
                {
                    "mainTableLine": { "id": 11, "title": "Parpaings", "quantity": 10, "unitPrice": 150, "position": 0 },
                    "details": [
                        { "id": 111, "title": "Mur nord", "number": 1, "length": 10, "width": 1, "height": 1, "factor": 1 }
                    ]
                }
            ]
        }
    ]
}"#;

#[tokio::test]
async fn summary_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(Storage::new(StorageConfig::Memory).await?);
    let mut ws = Workspace::with_storage(storage, WorkspaceConfig::default(), Arc::new(ManualClock::new(0))).await?;

    let full: ProjectFull = serde_json::from_str(PROJECT)?;
    ws.hydrate(&full).await?;

    let mut summary = ws.consolidate();
    assert_eq!(summary.grand_total(), 3100.0);
    assert_eq!(summary.grand_total(), ws.document().grand_total());

    match &summary.rows()[0] {
        ConsolidatedRow::ChapterHeader { chapter_id, title } => {
            assert_eq!(chapter_id, "1");
            assert_eq!(title, "1 - Maçonnerie");
        }
        other => panic!("expected a chapter header, got {:?}", other),
    }
    let last = summary.rows().len() - 1;
    assert_eq!(summary.rows()[last].cell(LineColumn::Gr), CellValue::from(PROJECT_TOTAL_TITLE));

    // Row 1 is the Parpaings line of chapter 1
    let outcome = ws
        .apply_summary_edit(&mut summary, 1, LineColumn::UnitPrice, &CellValue::from("200"))
        .await?;
    assert_eq!(outcome, EditOutcome::Applied { grand_total: 3600.0 });
    assert_eq!(ws.document().table("1").map(|t| t.total()), Some(2000.0));

    let rejected = ws
        .apply_summary_edit(&mut summary, 1, LineColumn::TotalPrice, &CellValue::Number(0.0))
        .await?;
    assert!(matches!(rejected, EditOutcome::Rejected(_)));

    // A fresh flatten agrees with the edited summary
    assert_eq!(ws.consolidate(), summary);

    // Details survive the round trip keyed by line id
    assert_eq!(ws.document().detail_table("1", 0).map(|t| t.total()), Some(10.0));
    assert_eq!(ws.document().note("2"), "bois");

    let payload = ws.export_payload().unwrap();
    assert_eq!(payload.project.id, Some(12));
    assert_eq!(payload.chapters.len(), 2);
    Ok(())
}
