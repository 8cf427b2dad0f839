use std::fs;

use learnpath_core::model::{ChapterId, ModuleId};
use learnpath_core::time::fixed_clock;
use services::{AppConfig, AppServices, AppServicesError, ContentLoadError, ProgressSettings};
use storage::repository::StorageTier;
use storage::tiered::StorageOptions;

const CONTENT: &str = r"
phases:
  - id: phase1
    name: Foundations
    modules:
      - id: part0
        name: Fundamentals
        chapters:
          - id: a
            name: Chapter A
            url: https://example.com/a
            exercises: [one, two]
";

fn config(dir: &std::path::Path, db: &str) -> AppConfig {
    let content_path = dir.join("learning-path.yaml");
    fs::write(&content_path, CONTENT).unwrap();
    AppConfig {
        content_path,
        storage: StorageOptions {
            db_url: Some(db.to_owned()),
            session_dir: Some(dir.to_path_buf()),
        },
        progress: ProgressSettings::default(),
        auto_complete_chapters: true,
    }
}

#[tokio::test]
async fn toggles_persist_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("learnpath.sqlite3").display()
    );
    let cfg = config(dir.path(), &db);

    {
        let mut app = AppServices::open(&cfg, fixed_clock()).await.unwrap();
        let checklist = app.checklist_mut();
        checklist
            .toggle_exercise(&ModuleId::new("part0"), &ChapterId::new("a"), 0)
            .await
            .unwrap();
        let outcome = checklist
            .toggle_exercise(&ModuleId::new("part0"), &ChapterId::new("a"), 1)
            .await
            .unwrap();
        assert_eq!(outcome.auto_completed_chapter, Some("part0-a".parse().unwrap()));
    }

    let app = AppServices::open(&cfg, fixed_clock()).await.unwrap();
    assert_eq!(app.checklist().overall().percent(), 100);

    let diagnostics = app.diagnostics().await;
    assert_eq!(
        diagnostics.tiers,
        vec![StorageTier::Durable, StorageTier::Session, StorageTier::Memory]
    );
    assert_eq!(diagnostics.report.active_tier, StorageTier::Durable);
    assert_eq!(diagnostics.report.completed, 3);
}

#[tokio::test]
async fn missing_content_fails_before_storage_opens() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), "sqlite:file:memdb_missing_content?mode=memory&cache=shared");
    cfg.content_path = dir.path().join("absent.yaml");

    let err = AppServices::open(&cfg, fixed_clock()).await.err().unwrap();
    assert!(matches!(
        err,
        AppServicesError::Content(ContentLoadError::Io { .. })
    ));
}
