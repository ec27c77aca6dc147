mod support;

use tilekeep_core::layout::DataLayout;
use tilekeep_core::repo::tiles;
use tilekeep_core::resync::{self, ResyncAction};
use tilekeep_core::types::{NewTile, TileStatus};

async fn register(store: &tilekeep_core::db::Store, product_id: &str, folder: &str) -> i64 {
    let descriptor = support::sample_product(product_id, folder);
    tiles::find_or_register(store, &NewTile::from(&descriptor))
        .await
        .expect("register tile")
}

#[tokio::test]
async fn plan_is_clean_when_disk_matches_store() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    layout.ensure().expect("layout dirs");

    let id = register(&store, "P1", "S2A_T33UWP").await;
    tiles::mark_downloaded(&store, id).await.expect("mark");
    tiles::mark_unpacked(&store, id).await.expect("mark");
    std::fs::create_dir_all(layout.tile_dir("S2A_T33UWP")).expect("folder");

    let report = resync::plan(&store, &layout).await.expect("plan");
    assert!(report.is_clean());
}

#[tokio::test]
async fn unpacked_tile_without_any_artifact_is_cleared_to_pending() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    layout.ensure().expect("layout dirs");

    let id = register(&store, "P1", "S2A_T33UWP").await;
    tiles::mark_downloaded(&store, id).await.expect("mark");
    tiles::mark_unpacked(&store, id).await.expect("mark");

    let report = resync::plan(&store, &layout).await.expect("plan");
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].action, ResyncAction::ClearDownloaded);

    resync::apply(&store, &report).await.expect("apply");
    let tile = tiles::get(&store, id).await.expect("tile");
    assert_eq!(tile.status, TileStatus::Pending);
    assert!(tile.downloaded_at.is_none());
    assert!(tile.unpacked_at.is_none());
}

#[tokio::test]
async fn unpacked_tile_with_surviving_archive_falls_back_one_stage() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    layout.ensure().expect("layout dirs");

    let id = register(&store, "P1", "S2A_T33UWP").await;
    tiles::mark_downloaded(&store, id).await.expect("mark");
    tiles::mark_unpacked(&store, id).await.expect("mark");
    std::fs::write(
        layout.archive_path("S2A_T33UWP"),
        support::zip_bytes("S2A_T33UWP"),
    )
    .expect("archive");

    let report = resync::plan(&store, &layout).await.expect("plan");
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].action, ResyncAction::ClearUnpacked);

    resync::apply(&store, &report).await.expect("apply");
    let tile = tiles::get(&store, id).await.expect("tile");
    assert_eq!(tile.status, TileStatus::Downloaded);
    assert!(tile.downloaded_at.is_some());
    assert!(tile.unpacked_at.is_none());

    // The fallen-back tile reappears in the unpack queue.
    let queue = tiles::pending_unpack(&store).await.expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, id);
}

#[tokio::test]
async fn downloaded_tile_without_archive_is_cleared() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    layout.ensure().expect("layout dirs");

    let id = register(&store, "P1", "S2A_T33UWP").await;
    tiles::mark_downloaded(&store, id).await.expect("mark");

    let report = resync::plan(&store, &layout).await.expect("plan");
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].action, ResyncAction::ClearDownloaded);

    resync::apply(&store, &report).await.expect("apply");
    assert_eq!(
        tiles::get(&store, id).await.expect("tile").status,
        TileStatus::Pending
    );
}
