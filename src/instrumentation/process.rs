//! Process state attached to server-error events.

use std::time::Duration;

use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// Resident set size. `None` when the process table could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_memory_bytes: Option<u64>,
    /// Time since the instrumentation layer was created.
    pub uptime_secs: u64,
    pub system_uptime_secs: u64,
}

impl ProcessSnapshot {
    pub fn capture(service_uptime: Duration) -> Self {
        let pid = std::process::id();
        let mut system = System::new();

        let (memory_bytes, virtual_memory_bytes) = match sysinfo::get_current_pid() {
            Ok(current) if system.refresh_process(current) => system
                .process(current)
                .map(|p| (Some(p.memory()), Some(p.virtual_memory())))
                .unwrap_or((None, None)),
            _ => (None, None),
        };

        Self {
            pid,
            memory_bytes,
            virtual_memory_bytes,
            uptime_secs: service_uptime.as_secs(),
            system_uptime_secs: System::uptime(),
        }
    }
}
