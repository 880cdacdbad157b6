//! Unique, timestamped file names for record tables.

use crate::{files::FileStore, repository::Repository};
use chrono::{Duration, Local, NaiveDateTime};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;

/// `dd-mm-YYYY-HH-MM-SS`, also stored as the record date.
pub const DATE_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

#[derive(Debug)]
pub struct PathAllocator {
    csv_dir: String,
    reserved: Mutex<HashSet<String>>,
}

/// A path held for a pending write; released on drop.
#[derive(Debug)]
pub struct Reservation<'a> {
    allocator: &'a PathAllocator,
    pub path: String,
    pub date: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.allocator.reserved.lock().remove(&self.path);
    }
}

impl PathAllocator {
    pub fn new(csv_dir: impl Into<String>) -> Self {
        let csv_dir = csv_dir.into();
        Self {
            csv_dir: csv_dir.trim_end_matches('/').to_string(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn allocate(&self, repo: &dyn Repository, files: &dyn FileStore) -> Reservation<'_> {
        self.allocate_at(Local::now().naive_local(), repo, files)
    }

    /// First free path at or after `at`, stepping one second per collision
    /// with a stored record, an existing file or another reservation.
    pub fn allocate_at(
        &self,
        at: NaiveDateTime,
        repo: &dyn Repository,
        files: &dyn FileStore,
    ) -> Reservation<'_> {
        let mut reserved = self.reserved.lock();
        let mut at = at;
        loop {
            let date = at.format(DATE_FORMAT).to_string();
            let path = format!("{}/record_{}.csv", self.csv_dir, date);
            let taken = reserved.contains(&path)
                || files.exists(&path)
                || repo.record_by_path(&path).is_some();
            if !taken {
                reserved.insert(path.clone());
                return Reservation {
                    allocator: self,
                    path,
                    date,
                };
            }
            debug!("path {} is taken, trying one second later", path);
            at += Duration::seconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{files::DiskFileStore, repository::MemoryRepository};
    use chrono::NaiveDate;
    use eegp_lib::io::Table;
    use tempfile::tempdir;

    fn instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(14, 7, 59))
            .unwrap()
    }

    #[test]
    fn formats_path_and_date() {
        let dir = tempdir().unwrap();
        let (repo, files) = (MemoryRepository::new(), DiskFileStore::new(dir.path()));
        let alloc = PathAllocator::new("csvs/");
        let r = alloc.allocate_at(instant(), &repo, &files);
        assert_eq!(r.path, "csvs/record_05-03-2024-14-07-59.csv");
        assert_eq!(r.date, "05-03-2024-14-07-59");
    }

    #[test]
    fn same_instant_allocations_are_distinct() {
        let dir = tempdir().unwrap();
        let (repo, files) = (MemoryRepository::new(), DiskFileStore::new(dir.path()));
        let alloc = PathAllocator::new("csvs");
        let a = alloc.allocate_at(instant(), &repo, &files);
        let b = alloc.allocate_at(instant(), &repo, &files);
        assert_ne!(a.path, b.path);
        assert_eq!(b.date, "05-03-2024-14-08-00");
        drop(a);
        let c = alloc.allocate_at(instant(), &repo, &files);
        assert_eq!(c.date, "05-03-2024-14-07-59");
    }

    #[test]
    fn existing_files_are_skipped() {
        let dir = tempdir().unwrap();
        let (repo, files) = (MemoryRepository::new(), DiskFileStore::new(dir.path()));
        files
            .write_table("csvs/record_05-03-2024-14-07-59.csv", &Table::new(vec!["Stimulus".into()]))
            .unwrap();
        let alloc = PathAllocator::new("csvs");
        let r = alloc.allocate_at(instant(), &repo, &files);
        assert_eq!(r.path, "csvs/record_05-03-2024-14-08-00.csv");
    }
}
