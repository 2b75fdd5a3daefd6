// Helper class for watching file descriptors
// OS-compatibility layer
use nix::sys::select::{select, FdSet};
use nix::sys::time::{TimeVal, TimeValLike};

use std::os::unix::io::{BorrowedFd, RawFd};

// A file descriptor watcher
//
// The fds are borrowed from their owners (the X connection keeps its
// own), so dropping the watcher does not close anything.
pub struct FdWatch {
    // Events to watch
    fdw_events: Vec<RawFd>,
}

impl FdWatch {
    pub fn new() -> FdWatch {
        FdWatch {
            fdw_events: Vec::new(),
        }
    }

    pub fn add_fd(&mut self, fd: RawFd) {
        self.fdw_events.push(fd);
    }

    // timeout in ms
    // returns true if something is ready to be read
    pub fn wait_for_events(&mut self, timeout: Option<usize>) -> bool {
        let fds: Vec<BorrowedFd> = self
            .fdw_events
            .iter()
            .map(|fd| unsafe { BorrowedFd::borrow_raw(*fd) })
            .collect();

        let mut fdset = FdSet::new();
        for fd in fds.iter() {
            fdset.insert(*fd);
        }

        let mut out = timeout.map(|ms| TimeVal::milliseconds(ms as i64));
        match select(None, Some(&mut fdset), None, None, out.as_mut()) {
            Ok(n) => n > 0,
            Err(_) => false,
        }
    }
}

impl Default for FdWatch {
    fn default() -> Self {
        Self::new()
    }
}
