use std::{collections::HashSet, path::Path};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;
use tracing_test::traced_test;

use super::{
    catalog::{Catalog, FreeListHead},
    error::StoreError,
    extent::{quantize_extent_size, ExtentManager, FreeListAnchor},
    file::DataFile,
    loc::DiskLoc,
    record::RecordStore,
    repr::DATA_FILE_HEADER_SIZE,
};
use crate::config::{ExtentConfig, FilesConfig};

const MIB: i32 = 1024 * 1024;

fn files_config() -> FilesConfig {
    FilesConfig {
        initial_file_size: 4 * MIB,
        max_file_size: 64 * MIB,
        ..Default::default()
    }
}

fn extent_config() -> ExtentConfig {
    ExtentConfig {
        min_extent_size: 0x1000,
        max_extent_size: 16 * MIB,
        page_size: 0x1000,
    }
}

fn manager(dir: &Path) -> ExtentManager {
    let mut em = ExtentManager::new(dir, "test", files_config(), extent_config());
    em.init().expect("failed to init extent manager");
    em
}

/// every extent on the free list, checking the links in both directions on the way
fn walk_free_list(em: &ExtentManager, anchor: &FreeListHead) -> Vec<DiskLoc> {
    let mut out = vec![];
    let mut prev = DiskLoc::null();
    let mut at = anchor.free_list_start();
    while let Some(loc) = at.non_null() {
        let ext = em.get_extent(loc, true).unwrap();
        assert_eq!(ext.xprev, prev, "free list back link mismatch at {loc}");
        out.push(loc);
        prev = loc;
        at = ext.xnext;
    }
    assert_eq!(anchor.free_list_end(), prev, "free list end is not the last extent");
    out
}

#[test]
#[traced_test]
fn freed_extent_is_reused() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();

    let a = em
        .allocate_extent(&mut anchor, "test.a", false, 1_000_000, 0)
        .unwrap();
    assert_eq!(a, DiskLoc::new(0, DATA_FILE_HEADER_SIZE));
    let ext = em.get_extent(a, true).unwrap();
    assert!(ext.length >= 1_000_000);
    assert!(ext.xnext.is_null() && ext.xprev.is_null());

    em.free_extents(&mut anchor, a, a).unwrap();
    assert_eq!(anchor.start, a);
    assert_eq!(anchor.end, a);

    let b = em
        .allocate_extent(&mut anchor, "test.b", false, 900_000, 0)
        .unwrap();
    assert_eq!(a, b, "expected the freed extent to be reused");
    assert!(anchor.start.is_null() && anchor.end.is_null());
    assert_eq!(em.num_files(), 1);
}

#[test]
#[traced_test]
fn quantized_sizes_are_monotonic_and_large_enough() {
    let cfg = ExtentConfig::default();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut sizes = (0..2000)
        .map(|_| rng.gen_range(1..=cfg.max_extent_size))
        .chain([1, 0x1000, 0x1001, 16 * MIB, 16 * MIB + 1, cfg.max_extent_size])
        .collect::<Vec<_>>();
    sizes.sort_unstable();
    let mut last = 0;
    for size in sizes {
        let q = quantize_extent_size(&cfg, size);
        assert!(q >= size, "quantize({size}) = {q} is too small");
        assert!(q >= last, "quantize is not monotonic at {size}");
        assert!(q <= cfg.max_extent_size);
        assert_eq!(q % cfg.page_size, 0);
        last = q;
    }
    assert_eq!(quantize_extent_size(&cfg, 1), cfg.min_extent_size);
    assert_eq!(
        quantize_extent_size(&cfg, cfg.max_extent_size + 1),
        cfg.max_extent_size
    );
}

#[test]
#[traced_test]
fn oversized_extent_is_refused() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();
    let res = em.allocate_extent(&mut anchor, "test.big", false, 16 * MIB + 1, 0);
    assert!(matches!(res, Err(StoreError::ExtentTooLarge { .. })));
    assert_eq!(em.num_files(), 0);
}

#[test]
#[traced_test]
fn quota_limits_file_growth() {
    let dir = tempdir().unwrap();
    let files = FilesConfig {
        initial_file_size: MIB,
        max_file_size: MIB,
        ..Default::default()
    };
    let cfg = ExtentConfig {
        max_extent_size: MIB / 2,
        ..extent_config()
    };
    let mut em = ExtentManager::new(dir.path(), "quota", files, cfg);
    em.init().unwrap();
    let mut anchor = FreeListHead::default();

    // one half-file extent fits in each file
    let a = em
        .allocate_extent(&mut anchor, "quota.a", false, MIB / 2, 1)
        .unwrap();
    let b = em
        .allocate_extent(&mut anchor, "quota.a", false, MIB / 2, 1)
        .unwrap();
    assert_eq!((a.file, b.file), (0, 1));
    let res = em.allocate_extent(&mut anchor, "quota.a", false, MIB / 2, 1);
    match res {
        Err(StoreError::QuotaExceeded { file_no, quota }) => assert_eq!((file_no, quota), (2, 1)),
        other => panic!("expected quota error, got {other:?}"),
    }
    assert_eq!(em.num_files(), 2);
}

#[test]
#[traced_test]
fn capped_requests_only_reuse_close_fits() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();

    let a = em
        .allocate_extent(&mut anchor, "test.a", false, 0x4000, 0)
        .unwrap();
    em.free_extents(&mut anchor, a, a).unwrap();

    let far = em
        .allocate_extent(&mut anchor, "test.capped", true, 10_000, 0)
        .unwrap();
    assert_ne!(far, a);
    assert_eq!(anchor.start, a);

    let close = em
        .allocate_extent(&mut anchor, "test.capped", true, 16_000, 0)
        .unwrap();
    assert_eq!(close, a);
}

#[test]
#[traced_test]
fn free_list_and_allocations_never_overlap() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();
    let mut rng = StdRng::seed_from_u64(42);
    let mut live: Vec<DiskLoc> = vec![];

    for _ in 0..300 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let size = rng.gen_range(0x1000..200_000);
            let loc = em
                .allocate_extent(&mut anchor, "test.rand", false, size, 0)
                .unwrap();
            assert!(!live.contains(&loc), "extent {loc} handed out twice");
            let ext = em.get_extent(loc, true).unwrap();
            assert!(ext.length >= size);
            live.push(loc);
        } else {
            let loc = live.swap_remove(rng.gen_range(0..live.len()));
            em.free_extents(&mut anchor, loc, loc).unwrap();
        }

        let free = walk_free_list(&em, &anchor);
        let free_set = free.iter().copied().collect::<HashSet<_>>();
        assert_eq!(free.len(), free_set.len(), "free list visits an extent twice");
        for loc in &live {
            assert!(!free_set.contains(loc), "live extent {loc} is on the free list");
        }
        assert_eq!(em.free_list_stats(&anchor).unwrap().0, free.len());
    }
    assert!(!em.is_poisoned());
}

#[test]
#[traced_test]
fn freeing_a_broken_chain_poisons_the_manager() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();
    let a = em
        .allocate_extent(&mut anchor, "test.a", false, 0x1000, 0)
        .unwrap();
    let b = em
        .allocate_extent(&mut anchor, "test.a", false, 0x1000, 0)
        .unwrap();

    // `a` and `b` were never linked together
    let err = em.free_extents(&mut anchor, a, b).unwrap_err();
    assert!(err.is_corruption(), "unexpected error {err:?}");
    assert!(em.is_poisoned());
    assert!(anchor.start.is_null(), "free list was modified");

    let res = em.allocate_extent(&mut anchor, "test.a", false, 0x1000, 0);
    assert!(matches!(res, Err(StoreError::Poisoned)));

    em.reset();
    em.init().unwrap();
    assert!(!em.is_poisoned());
}

#[test]
#[traced_test]
fn bad_extent_locations_fail_the_sanity_check() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();
    let a = em
        .allocate_extent(&mut anchor, "test.a", false, 0x1000, 0)
        .unwrap();
    assert!(em.get_extent(a, true).is_ok());

    let misaligned = a.offset(16);
    assert!(matches!(
        em.get_extent(misaligned, true),
        Err(StoreError::Corrupt { .. })
    ));
    // without the check it reads whatever is there
    assert!(em.get_extent(misaligned, false).is_ok());
    assert!(matches!(
        em.get_extent(DiskLoc::new(7, 0), true),
        Err(StoreError::InvalidLoc(..))
    ));
    assert!(matches!(
        em.get_extent(DiskLoc::null(), true),
        Err(StoreError::InvalidLoc(..))
    ));
}

#[test]
#[traced_test]
fn records_round_trip_and_deleted_space_is_reused() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("test.rec", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "test.rec");

    let a = store.insert(b"hello").unwrap();
    let b = store.insert(&[7u8; 1000]).unwrap();
    let c = store.insert(b"").unwrap();
    assert_eq!(store.read(a).unwrap(), b"hello");
    assert_eq!(store.read(b).unwrap(), &[7u8; 1000][..]);
    assert_eq!(store.read(c).unwrap(), b"");
    assert_eq!(store.details().nrecords, 3);
    assert_eq!(store.details().data_size, 1005);

    store.delete(b).unwrap();
    assert!(matches!(store.read(b), Err(StoreError::InvalidLoc(..))));
    assert!(matches!(store.delete(b), Err(StoreError::InvalidLoc(..))));
    let order = store.iter().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(order, vec![a, c]);

    let again = store.insert(&[9u8; 1000]).unwrap();
    assert_eq!(again, b, "deleted record was not reused");
    assert_eq!(store.details().nrecords, 3);
}

#[test]
#[traced_test]
fn record_chain_links_are_symmetric_across_extents() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("test.chain", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "test.chain");

    // grow until the collection spans three extents
    let mut extents: Vec<DiskLoc> = vec![];
    let mut locs: Vec<(DiskLoc, DiskLoc)> = vec![];
    while extents.len() < 3 {
        let loc = store.insert(&[0xAB; 1000]).unwrap();
        let ext = store.extent_manager().extent_loc_for(loc).unwrap();
        if !extents.contains(&ext) {
            extents.push(ext);
        }
        locs.push((loc, ext));
    }

    let em = store.extent_manager();
    let order = store.iter().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(order, locs.iter().map(|(l, _)| *l).collect::<Vec<_>>());
    for pair in order.windows(2) {
        assert_eq!(em.get_next_record(pair[0]).unwrap(), pair[1]);
        assert_eq!(em.get_prev_record(pair[1]).unwrap(), pair[0]);
    }
    assert!(em.get_prev_record(order[0]).unwrap().is_null());
    assert!(em.get_next_record(order[order.len() - 1]).unwrap().is_null());

    // the in-extent variants stop at the boundary
    let last_of_first = locs.iter().filter(|(_, e)| *e == extents[0]).last().unwrap().0;
    let first_of_second = locs.iter().find(|(_, e)| *e == extents[1]).unwrap().0;
    assert!(em.get_next_record_in_extent(last_of_first).unwrap().is_null());
    assert_eq!(em.get_next_record(last_of_first).unwrap(), first_of_second);
    assert!(em.get_prev_record_in_extent(first_of_second).unwrap().is_null());
    assert_eq!(em.get_prev_record(first_of_second).unwrap(), last_of_first);
    assert_eq!(em.extent_for(last_of_first).unwrap().my_loc, extents[0]);
    assert_eq!(em.extent_for(first_of_second).unwrap().my_loc, extents[1]);
    assert_eq!(em.first_record_from(extents[1]).unwrap(), first_of_second);
    assert_eq!(
        em.last_record_from(store.details().last_extent).unwrap(),
        order[order.len() - 1]
    );

    // empty the middle extent, traversal must step over it
    for (loc, _) in locs.iter().filter(|(_, e)| *e == extents[1]) {
        store.delete(*loc).unwrap();
    }
    let em = store.extent_manager();
    assert!(em.get_extent(extents[1], true).unwrap().is_empty());
    let first_of_last = locs.iter().find(|(_, e)| *e == extents[2]).unwrap().0;
    assert_eq!(em.get_next_record(last_of_first).unwrap(), first_of_last);
    assert_eq!(em.get_prev_record(first_of_last).unwrap(), last_of_first);

    assert_eq!(em.last_record_from(extents[1]).unwrap(), last_of_first);

    let remaining = store.iter().collect::<Result<Vec<_>, _>>().unwrap();
    let expected = locs
        .iter()
        .filter(|(_, e)| *e != extents[1])
        .map(|(l, _)| *l)
        .collect::<Vec<_>>();
    assert_eq!(remaining, expected);
}

#[test]
#[traced_test]
fn dropping_a_collection_frees_its_extents() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("test.drop", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "test.drop");
    for i in 0..100u32 {
        store.insert(&i.to_le_bytes().repeat(200)).unwrap();
    }
    let first = store.details().first_extent;
    store.drop_all().unwrap();
    assert!(store.details().first_extent.is_null());
    assert_eq!(store.iter().count(), 0);

    let (n, total) = em.free_list_stats(&catalog.free_list).unwrap();
    assert!(n >= 2, "expected several extents to be freed, got {n}");
    assert!(total > 0);
    assert_eq!(catalog.free_list.start, first);
}

#[test]
#[traced_test]
fn store_survives_reopening() {
    let dir = tempdir().unwrap();
    let catalog_path = Catalog::path_for(dir.path(), "test");
    let payloads = (0..50u8).map(|i| vec![i; i as usize * 10]).collect::<Vec<_>>();
    {
        let mut em = manager(dir.path());
        let mut catalog = Catalog::load(&catalog_path).unwrap();
        let (anchor, details) = catalog.split("test.persist", false);
        let mut store = RecordStore::new(&mut em, anchor, details, "test.persist");
        for p in &payloads {
            store.insert(p).unwrap();
        }
        em.flush_files(true).unwrap();
        catalog.save(&catalog_path).unwrap();
    }

    let mut em = manager(dir.path());
    assert_eq!(em.num_files(), 1);
    let mut catalog = Catalog::load(&catalog_path).unwrap();
    assert_eq!(catalog.collections["test.persist"].nrecords, 50);
    let (anchor, details) = catalog.split("test.persist", false);
    let store = RecordStore::new(&mut em, anchor, details, "test.persist");
    let read = store
        .iter()
        .map(|loc| store.read(loc?).map(<[u8]>::to_vec))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(read, payloads);
}

#[test]
#[traced_test]
fn foreign_files_are_refused() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("test.0"), vec![0u8; 16384]).unwrap();
    let mut em = ExtentManager::new(dir.path(), "test", files_config(), extent_config());
    assert!(matches!(em.init(), Err(StoreError::NotADataFile(..))));
}

#[test]
#[traced_test]
fn poisoned_manager_refuses_record_changes() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("test.p", false);
    let loc = RecordStore::new(&mut em, anchor, details, "test.p")
        .insert(b"kept")
        .unwrap();

    let mut other = FreeListHead::default();
    let a = em
        .allocate_extent(&mut other, "test.x", false, 0x1000, 0)
        .unwrap();
    let b = em
        .allocate_extent(&mut other, "test.x", false, 0x1000, 0)
        .unwrap();
    assert!(em.free_extents(&mut other, a, b).is_err());
    assert!(em.is_poisoned());

    let (anchor, details) = catalog.split("test.p", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "test.p");
    assert!(matches!(store.insert(b"more"), Err(StoreError::Poisoned)));
    assert!(matches!(store.delete(loc), Err(StoreError::Poisoned)));
    assert!(matches!(store.drop_all(), Err(StoreError::Poisoned)));
    assert_eq!(store.read(loc).unwrap(), b"kept");
    assert_eq!(store.details().nrecords, 1);
}

#[test]
#[traced_test]
fn corruption_found_by_a_record_change_poisons_the_manager() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("test.c", false);
    let loc = RecordStore::new(&mut em, anchor, details, "test.c")
        .insert(b"victim")
        .unwrap();

    let mut ext = em.extent_for(loc).unwrap();
    ext.magic = 0;
    em.write_extent(&ext).unwrap();
    assert!(!em.is_poisoned());

    let (anchor, details) = catalog.split("test.c", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "test.c");
    let err = store.delete(loc).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "unexpected error {err:?}");
    assert!(store.extent_manager().is_poisoned());
    assert!(matches!(store.insert(b"next"), Err(StoreError::Poisoned)));
}

#[test]
#[traced_test]
fn freeing_a_free_extent_is_refused() {
    let dir = tempdir().unwrap();
    let mut em = manager(dir.path());
    let mut anchor = FreeListHead::default();
    let a = em
        .allocate_extent(&mut anchor, "test.a", false, 0x1000, 0)
        .unwrap();
    em.free_extents(&mut anchor, a, a).unwrap();

    let err = em.free_extents(&mut anchor, a, a).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "unexpected error {err:?}");
    assert!(em.is_poisoned());
    assert_eq!(walk_free_list(&em, &anchor), vec![a]);
    let ext = em.get_extent(a, true).unwrap();
    assert!(ext.xnext.is_null() && ext.xprev.is_null());

    // the whole list at once
    em.reset();
    em.init().unwrap();
    let b = em
        .allocate_extent(&mut anchor, "test.b", false, 0x8000, 0)
        .unwrap();
    em.free_extents(&mut anchor, b, b).unwrap();
    assert_eq!(walk_free_list(&em, &anchor), vec![b, a]);
    assert!(matches!(
        em.free_extents(&mut anchor, b, a),
        Err(StoreError::Corrupt { .. })
    ));
    assert_eq!(walk_free_list(&em, &anchor), vec![b, a]);
}

#[test]
#[traced_test]
fn reused_extents_are_never_smaller_than_requested() {
    let dir = tempdir().unwrap();
    let files = FilesConfig {
        initial_file_size: 160 * MIB,
        max_file_size: 256 * MIB,
        ..Default::default()
    };
    let cfg = ExtentConfig {
        max_extent_size: 128 * MIB,
        ..extent_config()
    };
    let mut em = ExtentManager::new(dir.path(), "big", files, cfg);
    em.init().unwrap();
    let mut anchor = FreeListHead::default();
    let a = em
        .allocate_extent(&mut anchor, "big.a", false, 64 * MIB, 0)
        .unwrap();
    assert_eq!(em.get_extent(a, true).unwrap().length, 64 * MIB);
    em.free_extents(&mut anchor, a, a).unwrap();

    // rounds up to 80MiB, which puts 64MiB inside the usual reuse window
    let size = 64 * MIB + 1;
    let b = em
        .allocate_extent(&mut anchor, "big.b", false, size, 0)
        .unwrap();
    assert_ne!(a, b);
    assert!(em.get_extent(b, true).unwrap().length >= size);
    assert_eq!(anchor.start, a);
}

#[test]
#[traced_test]
fn record_store_growth_respects_the_quota() {
    let dir = tempdir().unwrap();
    let files = FilesConfig {
        initial_file_size: MIB,
        max_file_size: MIB,
        ..Default::default()
    };
    let cfg = ExtentConfig {
        max_extent_size: MIB / 2,
        ..extent_config()
    };
    let mut em = ExtentManager::new(dir.path(), "quota", files, cfg);
    em.init().unwrap();
    let mut catalog = Catalog::default();
    let (anchor, details) = catalog.split("quota.rec", false);
    let mut store = RecordStore::new(&mut em, anchor, details, "quota.rec").with_quota(1);

    // two records per half-file extent, one extent per file
    let payload = vec![0x5a; 200_000];
    let err = loop {
        if let Err(e) = store.insert(&payload) {
            break e;
        }
    };
    assert!(
        matches!(err, StoreError::QuotaExceeded { file_no: 2, quota: 1 }),
        "unexpected error {err:?}"
    );
    assert_eq!(store.details().nrecords, 4);
    assert!(!store.extent_manager().is_poisoned());
}

fn preallocating_config() -> (FilesConfig, ExtentConfig) {
    let files = FilesConfig {
        initial_file_size: MIB,
        max_file_size: 4 * MIB,
        preallocate_next: true,
        ..Default::default()
    };
    let cfg = ExtentConfig {
        max_extent_size: 2 * MIB,
        ..extent_config()
    };
    (files, cfg)
}

#[test]
#[traced_test]
fn preallocated_files_are_used_as_they_are() {
    let dir = tempdir().unwrap();
    let (files, cfg) = preallocating_config();
    let mut em = ExtentManager::new(dir.path(), "pre", files, cfg);
    em.init().unwrap();
    let mut anchor = FreeListHead::default();

    let a = em
        .allocate_extent(&mut anchor, "pre.a", false, MIB / 2, 0)
        .unwrap();
    assert_eq!(a.file, 0);
    assert_eq!(em.num_files(), 1);
    let next = em.file_set().file_name(1);
    assert!(next.is_file(), "next file was not preallocated");

    // mark the tail, past where the next extent goes
    let marked = 2 * MIB - 16;
    {
        let mut file = DataFile::open(&next, 1).unwrap();
        assert_eq!(file.len(), 2 * MIB);
        file.write(marked, &0xfeed_f00d_u64).unwrap();
    }

    let b = em
        .allocate_extent(&mut anchor, "pre.a", false, MIB / 2, 0)
        .unwrap();
    assert_eq!(b, DiskLoc::new(1, DATA_FILE_HEADER_SIZE));
    let file = em.file_set().file(1).unwrap();
    assert_eq!(file.len(), 2 * MIB);
    assert_eq!(file.read::<u64>(marked), Some(0xfeed_f00d));
    assert_eq!(
        file.header().unused_length,
        2 * MIB - DATA_FILE_HEADER_SIZE - MIB / 2
    );
    assert!(em.file_set().file_name(2).is_file());
}

#[test]
#[traced_test]
fn too_small_preallocated_file_is_replaced() {
    let dir = tempdir().unwrap();
    let (files, cfg) = preallocating_config();
    let files = FilesConfig {
        preallocate_next: false,
        ..files
    };
    let mut em = ExtentManager::new(dir.path(), "pre", files, cfg);
    em.init().unwrap();
    em.preallocate_a_file().unwrap();
    assert_eq!(em.num_files(), 0);
    let name = em.file_set().file_name(0);
    assert_eq!(std::fs::metadata(&name).unwrap().len(), MIB as u64);

    let mut anchor = FreeListHead::default();
    let a = em
        .allocate_extent(&mut anchor, "pre.big", false, 2 * MIB, 0)
        .unwrap();
    assert_eq!(a, DiskLoc::new(0, DATA_FILE_HEADER_SIZE));
    let file = em.file_set().file(0).unwrap();
    assert_eq!(file.len(), 2 * MIB + DATA_FILE_HEADER_SIZE);
    assert_eq!(file.header().file_length, 2 * MIB + DATA_FILE_HEADER_SIZE);
    assert!(!em.file_set().file_name(1).exists());
}
