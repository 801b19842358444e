mod types;

pub use types::ProcessUsage;

use chrono::Utc;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples CPU and resident memory of the tester process, so test summaries
/// show how hard the workload is actually pushing.
pub struct ProcessSampler {
    system: System,
    pid: Pid,
}

impl ProcessSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self { system, pid }
    }

    /// CPU usage is a delta since the previous refresh, so the first sample
    /// after `new` or `reset` may read zero.
    pub fn sample(&mut self) -> ProcessUsage {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));

        match self.system.process(self.pid) {
            Some(process) => ProcessUsage {
                timestamp: Utc::now(),
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => ProcessUsage {
                timestamp: Utc::now(),
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
        }
    }

    pub fn reset(&mut self) {
        // Re-establish baseline for CPU after reset
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_own_process() {
        let mut sampler = ProcessSampler::new();
        let usage = sampler.sample();

        assert!(usage.memory_mb > 0.0);
        assert!(usage.cpu_percent >= 0.0);
    }

    #[test]
    fn sampling_after_reset_still_sees_the_process() {
        let mut sampler = ProcessSampler::new();
        sampler.sample();
        sampler.reset();

        let usage = sampler.sample();
        assert!(usage.memory_mb > 0.0);
    }
}
