//! print info on the on-disk structures (in general, or optionally of the database in `dir`)

use std::{mem::size_of, path::PathBuf};

use anyhow::Result;
use extentstore::{
    config::StoreConfig,
    misc::sfmt,
    store::{
        repr::{DataFileHeader, ExtentHeader, RecordHeader, DATA_FILE_HEADER_SIZE},
        Catalog, ExtentManager,
    },
};

pub fn main(dir: Option<PathBuf>, db: &str, cfg: StoreConfig) -> Result<()> {
    info!(" -------- dumping layout info --------");
    info!(
        "  DataFileHeader = {} (reserved: {})",
        sfmt(size_of::<DataFileHeader>()),
        sfmt(DATA_FILE_HEADER_SIZE as usize)
    );
    info!("  ExtentHeader = {}", sfmt(size_of::<ExtentHeader>()));
    info!("  RecordHeader = {}", sfmt(size_of::<RecordHeader>()));
    info!(
        "  extents: {} to {}, page size {}",
        sfmt(cfg.extents.min_extent_size as usize),
        sfmt(cfg.extents.max_extent_size as usize),
        sfmt(cfg.extents.page_size as usize)
    );

    if let Some(dir) = dir {
        info!(" -------- dumping database info for `{db}` in {dir:?} --------");
        let min_extent = cfg.extents.min_extent_size as i64;
        let mut em = ExtentManager::new(&dir, db, cfg.files, cfg.extents);
        em.init()?;
        info!(
            "{} data file(s), {} total",
            em.num_files(),
            sfmt(em.file_size() as usize)
        );
        for file in em.file_set().files() {
            let header = file.header();
            info!(
                "  {:?}: {} ({} unused)",
                file.path(),
                sfmt(file.len() as usize),
                sfmt(header.unused_length as usize)
            );
        }

        let catalog = Catalog::load(&Catalog::path_for(&dir, db))?;
        em.print_free_list(&catalog.free_list)?;
        let limit = em.file_size() / min_extent + 1;
        for (ns, details) in &catalog.collections {
            info!(
                "collection `{ns}`: {} record(s), {} of data (capped: {})",
                details.nrecords,
                sfmt(details.data_size.max(0) as usize),
                details.capped
            );
            let mut at = details.first_extent;
            let mut seen = 0;
            while let Some(loc) = at.non_null() {
                if seen > limit {
                    error!("extent chain of `{ns}` does not terminate, stopping");
                    break;
                }
                let ext = em.get_extent(loc, true)?;
                info!(
                    "  extent {loc}: {} (empty: {})",
                    sfmt(ext.length as usize),
                    ext.is_empty()
                );
                at = ext.xnext;
                seen += 1;
            }
        }
    }
    info!(" -------- infodump complete --------");
    Ok(())
}
