use crate::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Append-only log of client order ids submitted by one strategy instance
///
/// One id per line. Every append is flushed and synced before returning, so an id
/// is on disk before the corresponding order can exist on the exchange.
#[derive(Debug)]
pub struct OrderIdLog {
    path: PathBuf,
    ids: Vec<String>,
    index: HashSet<String>,
}

impl OrderIdLog {
    /// `{dir}/{strategy_name}_order_ids.txt`
    pub fn path_for(dir: &Path, strategy_name: &str) -> PathBuf {
        dir.join(format!("{}_order_ids.txt", strategy_name))
    }

    /// Open the log for a strategy, loading any ids already recorded.
    /// A missing file is an empty log.
    pub fn open(dir: &Path, strategy_name: &str) -> Result<Self> {
        let path = Self::path_for(dir, strategy_name);

        let ids: Vec<String> = match fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            ids = ids.len(),
            "loaded order id log"
        );

        let index = ids.iter().cloned().collect();
        Ok(Self { path, ids, index })
    }

    /// Durably append one id
    ///
    /// A valid id is tracked in memory even when the write fails, so the position
    /// guard of this process still recognises the order.
    pub fn append(&mut self, client_order_id: &str) -> Result<()> {
        if client_order_id.is_empty() || client_order_id.contains(['\n', '\r']) {
            return Err(Error::Config(format!(
                "invalid client order id {:?}",
                client_order_id
            )));
        }

        if self.index.insert(client_order_id.to_string()) {
            self.ids.push(client_order_id.to_string());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", client_order_id)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    pub fn contains(&self, client_order_id: &str) -> bool {
        self.index.contains(client_order_id)
    }

    /// Ids in append order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
