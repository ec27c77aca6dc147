mod support;

use std::path::Path;

use support::StaticCountry;
use tilekeep_core::geocode::UNKNOWN_COUNTRY;
use tilekeep_core::repo::{links, pois, tiles};
use tilekeep_core::types::{CropStatus, NewTile, TileStatus};

fn new_tile(product_id: &str) -> NewTile {
    let descriptor = support::sample_product(product_id, &format!("{}_folder", product_id));
    NewTile::from(&descriptor)
}

#[tokio::test]
async fn registering_same_product_twice_keeps_one_row() {
    let store = support::memory_store().await;

    let first = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("first registration");
    let before = tiles::get(&store, first).await.expect("get");

    let second = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("second registration");
    let after = tiles::get(&store, second).await.expect("get again");

    assert_eq!(first, second);
    assert_eq!(tiles::list(&store).await.expect("list").len(), 1);
    // The repeat refreshes the last-request stamp but nothing else.
    assert!(after.last_requested_at >= before.last_requested_at);
    assert_eq!(after.first_requested_at, before.first_requested_at);
    assert_eq!(after.status, TileStatus::Pending);
    assert!(after.downloaded_at.is_none());
}

#[tokio::test]
async fn status_transitions_are_monotonic() {
    let store = support::memory_store().await;
    let id = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("register");

    tiles::mark_downloaded(&store, id).await.expect("download");
    let downloaded = tiles::get(&store, id).await.expect("get");
    assert_eq!(downloaded.status, TileStatus::Downloaded);
    assert!(downloaded.downloaded_at.is_some());

    tiles::mark_unpacked(&store, id).await.expect("unpack");
    let unpacked = tiles::get(&store, id).await.expect("get");
    assert_eq!(unpacked.status, TileStatus::Unpacked);
    assert!(unpacked.unpacked_at.is_some());

    // Marking downloaded again must not downgrade an unpacked tile.
    tiles::mark_downloaded(&store, id)
        .await
        .expect("late download mark is a no-op");
    let still_unpacked = tiles::get(&store, id).await.expect("get");
    assert_eq!(still_unpacked.status, TileStatus::Unpacked);
    assert_eq!(still_unpacked.downloaded_at, unpacked.downloaded_at);
}

#[tokio::test]
async fn clear_downloaded_resets_to_pending() {
    let store = support::memory_store().await;
    let id = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("register");
    tiles::mark_downloaded(&store, id).await.expect("download");
    tiles::mark_unpacked(&store, id).await.expect("unpack");

    tiles::clear_downloaded(&store, id).await.expect("clear");

    let tile = tiles::get(&store, id).await.expect("get");
    assert_eq!(tile.status, TileStatus::Pending);
    assert!(tile.downloaded_at.is_none());
    assert!(tile.unpacked_at.is_none());
    // The row itself survives; identifiers are never reused.
    assert_eq!(tiles::list(&store).await.expect("list").len(), 1);
}

#[tokio::test]
async fn pending_queries_reflect_status() {
    let store = support::memory_store().await;
    let first = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("register P1");
    let second = tiles::find_or_register(&store, &new_tile("P2"))
        .await
        .expect("register P2");

    tiles::mark_requested(&store, second).await.expect("request");
    let pending = tiles::pending_download(&store).await.expect("pending");
    assert_eq!(pending.len(), 2);

    tiles::mark_downloaded(&store, first).await.expect("download");
    let pending = tiles::pending_download(&store).await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);

    let unpack = tiles::pending_unpack(&store).await.expect("unpack queue");
    assert_eq!(unpack.len(), 1);
    assert_eq!(unpack[0].id, first);
}

#[tokio::test]
async fn linking_same_pair_twice_keeps_one_association() {
    let store = support::memory_store().await;
    let resolver = StaticCountry(UNKNOWN_COUNTRY);
    let poi_id = pois::find_or_create(&store, &resolver, &support::sample_request())
        .await
        .expect("poi");
    let tile_id = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("tile");

    links::link(&store, poi_id, tile_id).await.expect("link");
    links::link(&store, poi_id, tile_id)
        .await
        .expect("relink is a no-op");

    let associations = links::for_poi(&store, poi_id).await.expect("for_poi");
    assert_eq!(associations.len(), 1);
    assert_eq!(associations[0].status, CropStatus::Pending);
}

#[tokio::test]
async fn cancelled_crop_is_not_overwritten_by_mark_cropped() {
    let store = support::memory_store().await;
    let resolver = StaticCountry(UNKNOWN_COUNTRY);
    let poi_id = pois::find_or_create(&store, &resolver, &support::sample_request())
        .await
        .expect("poi");
    let tile_id = tiles::find_or_register(&store, &new_tile("P1"))
        .await
        .expect("tile");
    links::link(&store, poi_id, tile_id).await.expect("link");
    let assoc = links::get(&store, poi_id, tile_id)
        .await
        .expect("get")
        .expect("association exists");

    links::cancel_crop(&store, assoc.id).await.expect("cancel");
    links::mark_cropped(&store, assoc.id, Path::new("/tmp/crop.tif"), None)
        .await
        .expect("late crop mark is a no-op");

    let after = links::get(&store, poi_id, tile_id)
        .await
        .expect("get again")
        .expect("association still there");
    assert_eq!(after.status, CropStatus::Cancelled);
    assert!(after.crop_path.is_none());
    assert!(after.cropped_at.is_none());
}
