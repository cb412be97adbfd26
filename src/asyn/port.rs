use std::{
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::asyn::{AsynDriver, InterruptLists};

/// An in-process asyn port.
///
/// Keeps the interrupt lists for its records and remembers which databases
/// were loaded and which records asked to be processed at startup, so an IOC
/// shell (or a test) can act on them.
pub struct PortDriver {
    name: String,
    interrupts: InterruptLists,
    databases: Mutex<Vec<PathBuf>>,
    init_records: Mutex<Vec<String>>,
}

impl PortDriver {
    pub fn new(name: &str) -> Self {
        PortDriver {
            name: name.to_owned(),
            interrupts: InterruptLists::default(),
            databases: Mutex::new(Vec::new()),
            init_records: Mutex::new(Vec::new()),
        }
    }

    pub fn loaded_databases(&self) -> Vec<PathBuf> {
        self.databases.lock().clone()
    }

    pub fn records_processed_at_init(&self) -> Vec<String> {
        self.init_records.lock().clone()
    }
}

impl AsynDriver for PortDriver {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn interrupts(&self) -> &InterruptLists {
        &self.interrupts
    }

    fn load_database(&self, path: &Path) -> io::Result<()> {
        let text = fs::read_to_string(path)?;
        info!(
            "Port {}: loaded {} records from {}",
            self.name,
            text.matches("record(").count(),
            path.display()
        );
        self.databases.lock().push(path.to_owned());
        Ok(())
    }

    fn process_at_init(&self, record: &str) {
        debug!("Port {}: {record} will be processed at init", self.name);
        self.init_records.lock().push(record.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_init_records() {
        let port = PortDriver::new("DEV");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.db");
        std::fs::write(&path, "record(ai, \"A\") {\n}\n\nrecord(ao, \"B\") {\n}\n").unwrap();
        port.load_database(&path).unwrap();
        port.process_at_init("B");
        assert_eq!(port.loaded_databases(), vec![path]);
        assert_eq!(port.records_processed_at_init(), vec!["B".to_string()]);
    }

    #[test]
    fn missing_database() {
        let port = PortDriver::new("DEV");
        let dir = tempfile::tempdir().unwrap();
        assert!(port.load_database(&dir.path().join("none.db")).is_err());
        assert!(port.loaded_databases().is_empty());
    }
}
