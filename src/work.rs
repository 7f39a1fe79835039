//! Work to be carried out on the target during a download session.
//!
//! A session executes a [`WorkChain`]: an ordered list of [`WorkItem`]s, each
//! of which may poke memory, download an image and jump into it. Chains come
//! either from the command line ([`parse_jobs`]) or from the target's work
//! file ([`WorkFile`]).

mod parse;

use std::path::PathBuf;

pub use parse::{find_work_file, parse_jobs, parse_number, WorkFile, SYSTEM_WORK_DIR};

/// What a memory directive does with the addressed 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Read,
    Write,
    SetBits,
    ClearBits,
}

/// A single memory directive, applied before the item's download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWork {
    pub op: MemOp,
    pub address: u32,
    /// Value written, or the mask for `SetBits`/`ClearBits`. Unused by `Read`.
    pub value: u32,
}

/// Where execution continues once an image is downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpMode {
    /// Stay in the boot ROM.
    None,
    /// Jump through the image vector table found in the image.
    Header,
    /// Jump to this IVT address.
    Address(u32),
}
impl Default for JumpMode {
    fn default() -> Self {
        JumpMode::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItem {
    /// Image to download; `None` for memory-only items.
    pub file: Option<PathBuf>,
    pub mem: Vec<MemWork>,
    /// Process this item once more after it completes instead of moving on.
    /// Used to feed a program the item itself has just started.
    pub plug: bool,
    pub jump: JumpMode,
    /// Load address; taken from the image header when not given.
    pub load: Option<u32>,
    /// Download at most this many bytes of the file.
    pub size: Option<usize>,
}
impl WorkItem {
    pub fn download(file: impl Into<PathBuf>) -> Self {
        WorkItem {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    pub fn memory(mem: Vec<MemWork>) -> Self {
        WorkItem {
            mem,
            ..Default::default()
        }
    }
}

/// The ordered work of a session. An item's successor is the next item in the
/// chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkChain {
    items: Vec<WorkItem>,
}
impl WorkChain {
    pub fn new(items: Vec<WorkItem>) -> Self {
        WorkChain { items }
    }

    /// Items given on the command line take precedence over the ones from the
    /// work file.
    pub fn resolve(jobs: WorkChain, configured: WorkChain) -> WorkChain {
        if jobs.is_empty() {
            configured
        } else {
            jobs
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<usize> {
        self.next_from(0)
    }

    pub fn next(&self, index: usize) -> Option<usize> {
        self.next_from(index + 1)
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WorkItem> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub(crate) fn push(&mut self, item: WorkItem) {
        self.items.push(item)
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut WorkItem> {
        self.items.last_mut()
    }

    fn next_from(&self, index: usize) -> Option<usize> {
        if index < self.items.len() {
            Some(index)
        } else {
            None
        }
    }
}
impl From<Vec<WorkItem>> for WorkChain {
    fn from(items: Vec<WorkItem>) -> Self {
        WorkChain::new(items)
    }
}
