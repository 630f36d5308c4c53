use caller_core::traits::{ProcessProbe, ProcessStatus};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Host process inspection through `sysinfo`.
///
/// A live pid only counts as ours when its command line contains
/// `identity_marker`; this catches pids recycled by unrelated programs.
#[derive(Debug, Clone)]
pub struct SysinfoProcessProbe {
    identity_marker: String,
}

impl SysinfoProcessProbe {
    pub fn new(identity_marker: impl Into<String>) -> Self {
        Self {
            identity_marker: identity_marker.into(),
        }
    }
}

impl ProcessProbe for SysinfoProcessProbe {
    fn probe(&self, pid: u32) -> ProcessStatus {
        if pid == 0 {
            return ProcessStatus::NotRunning;
        }

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let Some(process) = system.process(pid) else {
            return ProcessStatus::NotRunning;
        };
        if process.status() == sysinfo::ProcessStatus::Zombie {
            return ProcessStatus::NotRunning;
        }

        let cmdline = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        if cmdline.is_empty() {
            // Command lines of other users' processes are unreadable off Linux.
            if cfg!(target_os = "linux") {
                ProcessStatus::Foreign
            } else {
                ProcessStatus::Owned
            }
        } else if cmdline.contains(&self.identity_marker) {
            ProcessStatus::Owned
        } else {
            ProcessStatus::Foreign
        }
    }
}
