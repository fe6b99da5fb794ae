//! fill a collection with records, then read every one back through the access gate

use std::{path::Path, sync::Arc, time::Instant};

use anyhow::Result;
use extentstore::{
    config::StoreConfig,
    gate::{run_with_fault_retry, AccessGate, CurOp},
    misc::sfmt,
    residency::{default_probe, Estimator},
    store::{Catalog, ExtentManager, RecordStore},
};

pub fn main(
    dir: &Path,
    db: &str,
    ns: &str,
    count: usize,
    size: usize,
    cfg: StoreConfig,
) -> Result<()> {
    let mut em = ExtentManager::new(dir, db, cfg.files, cfg.extents);
    em.init()?;
    let catalog_path = Catalog::path_for(dir, db);
    let mut catalog = Catalog::load(&catalog_path)?;
    let gate = AccessGate::new(
        Arc::new(Estimator::new(&cfg.residency)),
        default_probe(),
        cfg.gate,
    );

    let (anchor, details) = catalog.split(ns, false);
    let mut store = RecordStore::new(&mut em, anchor, details, ns);

    info!("inserting {count} record(s) of {} into `{ns}`", sfmt(size));
    let start = Instant::now();
    for i in 0..count {
        let payload = vec![(i % 251) as u8; size];
        store.insert(&payload)?;
    }
    info!("inserted in {:?}", start.elapsed());

    let op = CurOp::new();
    let start = Instant::now();
    let mut records = 0usize;
    let mut bytes = 0usize;
    for loc in store.iter() {
        let loc = loc?;
        bytes += run_with_fault_retry(
            || {
                gate.check_record(store.extent_manager(), &op, loc)?;
                Ok(store.read(loc)?.len())
            },
            |fault| gate.touch(store.extent_manager(), fault.loc),
        )?;
        records += 1;
    }
    info!(
        "read back {records} record(s), {} in {:?}",
        sfmt(bytes),
        start.elapsed()
    );
    info!(
        "collection `{ns}` now holds {} record(s), {}",
        store.details().nrecords,
        sfmt(store.details().data_size.max(0) as usize)
    );

    let (n, free) = em.free_list_stats(&catalog.free_list)?;
    info!("free list: {n} extent(s), {}", sfmt(free as usize));
    info!("access stats: {:?}", gate.stats());

    em.flush_files(true)?;
    catalog.save(&catalog_path)?;
    Ok(())
}
