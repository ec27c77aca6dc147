mod support;

use support::{RecordingCropper, ScriptedProvider, StaticCountry};
use tilekeep_core::acquisition::AcquisitionOrchestrator;
use tilekeep_core::extract::ZipExtractor;
use tilekeep_core::layout::DataLayout;
use tilekeep_core::repo::{links, pois, tiles};
use tilekeep_core::types::{NewTile, TileStatus};

#[tokio::test]
async fn basic_flow_downloads_unpacks_and_links() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let provider = ScriptedProvider::new(vec![support::sample_product("P1", "S2A_T33UWP")]);
    let extractor = ZipExtractor;
    let cropper = RecordingCropper::new();
    let resolver = StaticCountry("AT");

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        layout.clone(),
    );
    let outcome = orchestrator
        .run(&support::sample_request())
        .await
        .expect("acquisition run");

    assert_eq!(outcome.considered, 1);
    assert_eq!(outcome.unpacked, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(provider.download_count(), 1);

    let all_tiles = tiles::list(&store).await.expect("tiles");
    assert_eq!(all_tiles.len(), 1);
    let tile = &all_tiles[0];
    assert_eq!(tile.status, TileStatus::Unpacked);
    assert!(tile.downloaded_at.is_some());
    assert!(tile.unpacked_at.is_some());
    assert_eq!(tile.spatial_reference.as_deref(), Some("EPSG:32633"));
    assert!(layout.tile_dir(&tile.folder_name).is_dir());

    let poi = pois::get(&store, outcome.poi_id).await.expect("poi");
    assert!(poi.tiles_identified_at.is_some());
    assert_eq!(
        links::for_poi(&store, outcome.poi_id)
            .await
            .expect("associations")
            .len(),
        1
    );
}

#[tokio::test]
async fn rerunning_the_same_request_is_a_no_op() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let provider = ScriptedProvider::new(vec![support::sample_product("P1", "S2A_T33UWP")]);
    let extractor = ZipExtractor;
    let cropper = RecordingCropper::new();
    let resolver = StaticCountry("AT");

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        layout,
    );
    let first = orchestrator
        .run(&support::sample_request())
        .await
        .expect("first run");
    let second = orchestrator
        .run(&support::sample_request())
        .await
        .expect("second run");

    assert_eq!(first.poi_id, second.poi_id);
    assert_eq!(pois::list(&store).await.expect("pois").len(), 1);
    assert_eq!(tiles::list(&store).await.expect("tiles").len(), 1);
    // Tiles were already identified: the provider is not searched again and
    // nothing is re-downloaded.
    assert_eq!(provider.download_count(), 1);
}

#[tokio::test]
async fn unpacked_folder_on_disk_skips_the_network_entirely() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());
    layout.ensure().expect("layout dirs");

    // The database believes nothing is downloaded, but a previous interrupted
    // run already left the unpacked folder behind.
    let descriptor = support::sample_product("P1", "S2A_T33UWP");
    let tile_id = tiles::find_or_register(&store, &NewTile::from(&descriptor))
        .await
        .expect("register");
    std::fs::create_dir_all(layout.tile_dir("S2A_T33UWP")).expect("pre-existing folder");

    // Offline product: any download attempt would defer instead of complete.
    let provider =
        ScriptedProvider::new(vec![descriptor.clone()]).with_offline("P1");
    let extractor = ZipExtractor;
    let cropper = RecordingCropper::new();
    let resolver = StaticCountry("AT");

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        layout,
    );
    let outcome = orchestrator.resume_pending().await.expect("resume");

    assert_eq!(outcome.unpacked, 1);
    assert_eq!(provider.download_count(), 0);
    let tile = tiles::get(&store, tile_id).await.expect("tile");
    assert_eq!(tile.status, TileStatus::Unpacked);
    assert!(tile.downloaded_at.is_some());
    assert!(tile.unpacked_at.is_some());
}

#[tokio::test]
async fn offline_tier_product_is_left_requested() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let provider = ScriptedProvider::new(vec![support::sample_product("P1", "S2A_T33UWP")])
        .with_offline("P1");
    let extractor = ZipExtractor;
    let cropper = RecordingCropper::new();
    let resolver = StaticCountry("AT");

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        layout,
    );
    let outcome = orchestrator
        .run(&support::sample_request())
        .await
        .expect("run");

    assert_eq!(outcome.deferred, 1);
    assert_eq!(provider.retrieval_count(), 1);

    let all_tiles = tiles::list(&store).await.expect("tiles");
    assert_eq!(all_tiles[0].status, TileStatus::Requested);
    // The POI still completes identification; the tile is picked up later.
    let poi = pois::get(&store, outcome.poi_id).await.expect("poi");
    assert!(poi.tiles_identified_at.is_some());
    assert_eq!(
        links::for_poi(&store, outcome.poi_id)
            .await
            .expect("associations")
            .len(),
        1
    );
}

#[tokio::test]
async fn one_failing_download_does_not_abort_the_batch() {
    let store = support::memory_store().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = DataLayout::new(dir.path());

    let mut request = support::sample_request();
    request.tile_limit = 2;

    let provider = ScriptedProvider::new(vec![
        support::sample_product("P1", "S2A_T33UWP"),
        support::sample_product("P2", "S2A_T33UWQ"),
    ])
    .with_failing_download("P1");
    let extractor = ZipExtractor;
    let cropper = RecordingCropper::new();
    let resolver = StaticCountry("AT");

    let orchestrator = AcquisitionOrchestrator::new(
        &store,
        &provider,
        &extractor,
        &cropper,
        &resolver,
        layout,
    );
    let outcome = orchestrator.run(&request).await.expect("run");

    assert_eq!(outcome.considered, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.unpacked, 1);

    // Both tiles are registered and linked; the failed one stays pending for
    // a later pass, and the batch still reaches tile identification.
    assert_eq!(tiles::list(&store).await.expect("tiles").len(), 2);
    assert_eq!(
        links::for_poi(&store, outcome.poi_id)
            .await
            .expect("associations")
            .len(),
        2
    );
    let poi = pois::get(&store, outcome.poi_id).await.expect("poi");
    assert!(poi.tiles_identified_at.is_some());

    let failed = tiles::list(&store)
        .await
        .expect("tiles")
        .into_iter()
        .find(|tile| tile.product_id == "P1")
        .expect("failed tile registered");
    assert_eq!(failed.status, TileStatus::Pending);
}
