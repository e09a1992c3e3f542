//! Name-keyed directory of open sessions.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gridsql_config::Settings;
use gridsql_core::GridSource;

use crate::error::{Error, Invalid, Object, Result};
use crate::names;
use crate::session::{DataSource, Session};

pub struct ConnectionRegistry {
    grid: Arc<dyn GridSource>,
    settings: Settings,
    sessions: BTreeMap<String, Session>,
}

impl ConnectionRegistry {
    /// Sessions opened through this registry read grid tables from `grid`.
    pub fn new(grid: Arc<dyn GridSource>, settings: Settings) -> Self {
        Self { grid, settings, sessions: BTreeMap::new() }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open a session under `name`. With `overwrite`, an existing session of
    /// that name is closed first.
    pub fn open(&mut self, name: &str, source: &DataSource, overwrite: bool) -> Result<&mut Session> {
        let name = names::connection_name(name)?;
        if let Some(mut existing) = self.sessions.remove(&name) {
            if !overwrite {
                self.sessions.insert(name.clone(), existing);
                return Err(Error::already_exists(Object::Connection, name));
            }
            existing.dispose();
        }

        let session = Session::open(source, Arc::clone(&self.grid), &self.settings)?;
        log::debug!("connection {name} opened");
        Ok(self.sessions.entry(name).or_insert(session))
    }

    pub fn close(&mut self, name: &str) -> Result<()> {
        let name = names::connection_name(name)?;
        let mut session = self
            .sessions
            .remove(&name)
            .ok_or_else(|| Error::not_found(Object::Connection, name.clone()))?;
        session.dispose();
        log::debug!("connection {name} closed");
        Ok(())
    }

    /// Create an empty database file at `path` and open it as `name`.
    ///
    /// The connection name is checked before the file system is touched.
    pub fn create(&mut self, path: &Path, name: &str, file_overwrite: bool, conn_overwrite: bool) -> Result<&mut Session> {
        let name = names::connection_name(name)?;
        if !path.is_absolute() {
            return Err(Invalid::DbFile(path.display().to_string()).into());
        }
        if self.sessions.contains_key(&name) && !conn_overwrite {
            return Err(Error::already_exists(Object::Connection, name));
        }

        let path = if path.extension().is_none() {
            path.with_extension(&self.settings.file.default_extension)
        } else {
            path.to_path_buf()
        };
        if path.exists() {
            if !file_overwrite {
                return Err(Invalid::DbFile(format!("{} already exists", path.display())).into());
            }
            fs::remove_file(&path).map_err(|e| Invalid::DbFile(format!("{}: {e}", path.display())))?;
        }
        fs::File::create(&path).map_err(|e| Invalid::DbFile(format!("{}: {e}", path.display())))?;
        log::debug!("created database file {}", path.display());

        self.open(&name, &DataSource::File { path, read_only: false }, conn_overwrite)
    }

    pub fn get(&mut self, name: &str) -> Result<&mut Session> {
        let name = names::connection_name(name)?;
        self.sessions
            .get_mut(&name)
            .ok_or_else(|| Error::not_found(Object::Connection, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        names::connection_name(name).is_ok_and(|n| self.sessions.contains_key(&n))
    }

    /// Connection names in order, filtered by a case-insensitive pattern.
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<String>> {
        let filter = names::name_filter(filter)?;
        Ok(self.sessions.keys().filter(|n| filter.is_match(n)).cloned().collect())
    }

    /// Dispose every session, in name order.
    pub fn close_all(&mut self) {
        while let Some((name, mut session)) = self.sessions.pop_first() {
            session.dispose();
            log::debug!("connection {name} closed");
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
