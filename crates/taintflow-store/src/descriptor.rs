//! # Open-File Table
//!
//! Assigns descriptor numbers the POSIX way: the lowest free number wins,
//! so a closed descriptor's number is handed out again on the next open.
//! Descriptors 0, 1 and 2 start open as the standard streams.
//!
//! The table records what each descriptor points at so diagnostics can
//! resolve it to a path or a remote peer. Taint belongs to the open-file
//! entry, not to the path: reopening the same file yields a fresh,
//! untainted descriptor.

use crate::error::{Result, StoreError};
use crate::location::Fd;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Default maximum number of simultaneously open descriptors.
pub const DEFAULT_DESCRIPTOR_LIMIT: usize = 1024;

/// What an open descriptor refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTarget {
    /// A filesystem path.
    Path(PathBuf),
    /// A connected socket.
    Peer(SocketAddr),
    /// One of the standard streams.
    Stdio(String),
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTarget::Path(path) => write!(f, "{}", path.display()),
            FileTarget::Peer(addr) => write!(f, "{addr}"),
            FileTarget::Stdio(name) => write!(f, "<{name}>"),
        }
    }
}

/// The open-file table.
#[derive(Debug)]
pub struct DescriptorTable {
    open: DashMap<Fd, FileTarget>,
    in_use: Mutex<BTreeSet<i32>>,
    limit: usize,
}

impl DescriptorTable {
    /// Creates a table with the standard streams open.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_DESCRIPTOR_LIMIT)
    }

    /// Creates a table allowing at most `limit` open descriptors
    /// (standard streams included).
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let table = Self {
            open: DashMap::new(),
            in_use: Mutex::new(BTreeSet::new()),
            limit,
        };
        for (fd, name) in [(0, "stdin"), (1, "stdout"), (2, "stderr")] {
            table.open.insert(Fd(fd), FileTarget::Stdio(name.to_string()));
            table
                .in_use
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(fd);
        }
        table
    }

    /// Opens a descriptor on `target`, returning the lowest free number.
    ///
    /// # Errors
    ///
    /// `DescriptorsExhausted` when `limit` descriptors are already open.
    pub fn open(&self, target: FileTarget) -> Result<Fd> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        if in_use.len() >= self.limit {
            return Err(StoreError::DescriptorsExhausted { limit: self.limit });
        }
        let mut candidate = 0;
        for &used in in_use.iter() {
            if used != candidate {
                break;
            }
            candidate += 1;
        }
        in_use.insert(candidate);
        let fd = Fd(candidate);
        trace!("open {} -> {}", fd, target);
        self.open.insert(fd, target);
        Ok(fd)
    }

    /// Closes a descriptor.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` if `fd` is not open.
    pub fn close(&self, fd: Fd) -> Result<FileTarget> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, target) = self.open.remove(&fd).ok_or(StoreError::BadDescriptor(fd))?;
        in_use.remove(&fd.0);
        trace!("close {} ({})", fd, target);
        Ok(target)
    }

    /// Returns what `fd` refers to, if it is open.
    #[must_use]
    pub fn target(&self, fd: Fd) -> Option<FileTarget> {
        self.open.get(&fd).map(|t| t.clone())
    }

    /// Returns `true` if `fd` is open.
    #[must_use]
    pub fn is_open(&self, fd: Fd) -> bool {
        self.open.contains_key(&fd)
    }

    /// Number of open descriptors, standard streams included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Returns `true` when nothing is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}
