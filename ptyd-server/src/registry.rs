// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory table of supervised children.
//!
//! Insertion-ordered and pid-keyed. The backing Vec reallocates as it
//! grows, so nothing outside this module holds references or indices across
//! mutations; cross-references are always by pid. A record outlives its
//! child: it leaves the table only once the client has received the
//! corresponding termination message.

use nix::unistd::Pid;
use ptyd_ipc::{ChildReport, LaunchRequest};
use std::os::fd::OwnedFd;

pub struct ChildRecord {
    /// The request that started the child, kept verbatim for replay.
    pub launch: LaunchRequest,
    pub pid: Pid,
    /// Open for as long as the record exists; after `terminated` is set the
    /// supervisor initiates no further I/O on it.
    pub master: OwnedFd,
    pub terminated: bool,
    /// Raw wait status; meaningful once `terminated` is set.
    pub status: i32,
}

impl ChildRecord {
    pub fn report(&self, is_last: bool) -> ChildReport {
        ChildReport {
            is_last,
            pid: self.pid.as_raw(),
            path: self.launch.path.clone(),
            argv: self.launch.argv.clone(),
            envp: self.launch.envp.clone(),
            is_utf8: self.launch.is_utf8,
            pwd: self.launch.pwd.clone(),
        }
    }
}

#[derive(Default)]
pub struct ChildRegistry {
    records: Vec<ChildRecord>,
}

impl ChildRegistry {
    pub fn new() -> ChildRegistry {
        ChildRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a freshly launched child. Pids are unique among records; a
    /// colliding insert would mean we never reported the old child's death.
    pub fn add(&mut self, launch: LaunchRequest, master: OwnedFd, pid: Pid) {
        debug_assert!(self.get(pid).is_none(), "pid {pid} already registered");
        self.records.push(ChildRecord {
            launch,
            pid,
            master,
            terminated: false,
            status: 0,
        });
    }

    pub fn get(&self, pid: Pid) -> Option<&ChildRecord> {
        self.records.iter().find(|record| record.pid == pid)
    }

    /// Records the reaped status. Happens at most once per child, from the
    /// main loop only.
    pub fn mark_terminated(&mut self, pid: Pid, status: i32) -> bool {
        match self.records.iter_mut().find(|record| record.pid == pid) {
            Some(record) => {
                debug_assert!(!record.terminated, "pid {pid} reaped twice");
                record.terminated = true;
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Drops the record, closing the master. Relative order of the
    /// remaining records is preserved.
    pub fn remove(&mut self, pid: Pid) -> Option<ChildRecord> {
        let index = self.records.iter().position(|record| record.pid == pid)?;
        Some(self.records.remove(index))
    }

    /// Insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ChildRecord> {
        self.records.iter()
    }

    pub fn live_pids(&self) -> Vec<Pid> {
        self.records
            .iter()
            .filter(|record| !record.terminated)
            .map(|record| record.pid)
            .collect()
    }

    pub fn terminated_pids(&self) -> Vec<Pid> {
        self.records
            .iter()
            .filter(|record| record.terminated)
            .map(|record| record.pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::ffi::CString;

    fn request(tag: i64) -> LaunchRequest {
        LaunchRequest {
            path: CString::new("/bin/sh").unwrap(),
            argv: vec![CString::new("sh").unwrap()],
            envp: vec![],
            width: 80,
            height: 24,
            is_utf8: true,
            pwd: CString::new("/").unwrap(),
            unique_id: tag,
        }
    }

    fn fd() -> OwnedFd {
        let (read, _write) = nix::unistd::pipe().unwrap();
        read
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut registry = ChildRegistry::new();
        for pid in [30, 10, 20] {
            registry.add(request(pid as i64), fd(), Pid::from_raw(pid));
        }
        let pids: Vec<i32> = registry.iter().map(|r| r.pid.as_raw()).collect();
        assert_eq!(pids, vec![30, 10, 20]);
    }

    #[test]
    fn remove_preserves_relative_order() {
        let mut registry = ChildRegistry::new();
        for pid in [1, 2, 3, 4] {
            registry.add(request(pid as i64), fd(), Pid::from_raw(pid));
        }
        registry.remove(Pid::from_raw(2)).unwrap();
        let pids: Vec<i32> = registry.iter().map(|r| r.pid.as_raw()).collect();
        assert_eq!(pids, vec![1, 3, 4]);
    }

    #[test]
    fn mark_terminated_records_the_status() {
        let mut registry = ChildRegistry::new();
        registry.add(request(1), fd(), Pid::from_raw(100));
        assert!(registry.mark_terminated(Pid::from_raw(100), 0x7f00));
        let record = registry.get(Pid::from_raw(100)).unwrap();
        assert!(record.terminated);
        assert_eq!(record.status, 0x7f00);
        assert!(registry.live_pids().is_empty());
        assert_eq!(registry.terminated_pids(), vec![Pid::from_raw(100)]);
    }

    #[test]
    fn mark_terminated_on_unknown_pid_is_refused() {
        let mut registry = ChildRegistry::new();
        assert!(!registry.mark_terminated(Pid::from_raw(999), 0));
    }

    #[test]
    fn report_mirrors_the_launch_request() {
        let mut registry = ChildRegistry::new();
        registry.add(request(7), fd(), Pid::from_raw(55));
        let report = registry.get(Pid::from_raw(55)).unwrap().report(true);
        assert!(report.is_last);
        assert_eq!(report.pid, 55);
        assert_eq!(report.path, CString::new("/bin/sh").unwrap());
        assert!(report.is_utf8);
    }

    #[test]
    fn master_closes_when_the_record_is_removed() {
        use std::io::Read;
        let (read, write) = nix::unistd::pipe().unwrap();
        let mut registry = ChildRegistry::new();
        registry.add(request(1), write, Pid::from_raw(41));
        registry.remove(Pid::from_raw(41)).map(drop).unwrap();
        // Write end dropped with the record: the read side sees EOF.
        let mut out = Vec::new();
        let n = std::fs::File::from(read).read_to_end(&mut out).unwrap();
        assert_eq!(n, 0);
    }

    proptest! {
        // Random add/mark/remove sequences keep pids unique among records
        // and never lose insertion order.
        #[test]
        fn registry_stays_ordered_and_unique(ops in prop::collection::vec((0u8..3, 1i32..40), 0..60)) {
            let mut registry = ChildRegistry::new();
            let mut model: Vec<i32> = Vec::new();
            for (op, pid) in ops {
                let pid_t = Pid::from_raw(pid);
                match op {
                    0 => {
                        if !model.contains(&pid) {
                            registry.add(request(pid as i64), fd(), pid_t);
                            model.push(pid);
                        }
                    }
                    1 => {
                        let known = model.contains(&pid);
                        let already = registry.get(pid_t).map(|r| r.terminated).unwrap_or(false);
                        if known && !already {
                            prop_assert!(registry.mark_terminated(pid_t, 0));
                        }
                    }
                    _ => {
                        let removed = registry.remove(pid_t).is_some();
                        prop_assert_eq!(removed, model.contains(&pid));
                        model.retain(|&p| p != pid);
                    }
                }
                let pids: Vec<i32> = registry.iter().map(|r| r.pid.as_raw()).collect();
                prop_assert_eq!(&pids, &model);
            }
        }
    }
}
