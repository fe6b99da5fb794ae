use std::io;

use super::loc::DiskLoc;
use crate::gate::PageFault;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O Error: {0}")]
    IOError(#[from] io::Error),
    #[error("the file at {0} does not contain a data file written by this store")]
    NotADataFile(String),
    #[error("quota exceeded: extent would go in file {file_no}, but the quota allows files up to {quota}")]
    QuotaExceeded { file_no: i32, quota: i32 },
    #[error("requested extent of {requested} bytes is larger than the maximum ({max})")]
    ExtentTooLarge { requested: i64, max: i32 },
    #[error("could not find or create a file with room for a {0} byte extent")]
    OutOfSpace(i32),
    #[error("data in the store is corrupt or misinterpreted ({what}, at {at})")]
    Corrupt { what: &'static str, at: DiskLoc },
    #[error("location {0} does not resolve to mapped data")]
    InvalidLoc(DiskLoc),
    #[error("refusing to modify the store after corruption was detected")]
    Poisoned,
    #[error("catalog error: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error("record data is not in memory, release locks and retry ({0:?})")]
    PageFault(PageFault),
}

impl StoreError {
    /// the recoverable residency fault, as opposed to every other (hard) error
    pub fn is_page_fault(&self) -> bool {
        matches!(self, Self::PageFault(..))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Poisoned)
    }
}

impl From<PageFault> for StoreError {
    fn from(fault: PageFault) -> Self {
        Self::PageFault(fault)
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
