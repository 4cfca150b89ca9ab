//! Process and load probing with `sysinfo`

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};

use vg_core::time::current_time_millis;
use vg_core::traits::SecurityProvider;
use vg_core::{ProviderError, SignatureSet};
use vg_protocol::{Detection, Severity, SystemReport};

const PROVIDER: &str = "security";

/// Security provider backed by the local process table
pub struct SysinfoSecurityProvider {
    system: Arc<Mutex<System>>,
}

impl SysinfoSecurityProvider {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    async fn with_system<T, F>(&self, probe: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce(&mut System) -> T + Send + 'static,
    {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || probe(&mut system.lock()))
            .await
            .map_err(|e| ProviderError::failed(PROVIDER, format!("probe task failed: {}", e)))
    }
}

impl Default for SysinfoSecurityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecurityProvider for SysinfoSecurityProvider {
    async fn system_snapshot(&self) -> Result<SystemReport, ProviderError> {
        self.with_system(|sys| {
            sys.refresh_memory();
            sys.refresh_cpu_usage();
            sys.refresh_processes(ProcessesToUpdate::All, true);

            let total_memory = sys.total_memory();
            let memory_percent = if total_memory == 0 {
                0.0
            } else {
                (sys.used_memory() as f64 / total_memory as f64 * 100.0) as f32
            };

            SystemReport {
                hostname: gethostname::gethostname().to_string_lossy().into_owned(),
                process_count: sys.processes().len(),
                cpu_percent: sys.global_cpu_usage(),
                memory_percent,
                load_avg_1m: System::load_average().one as f32,
                captured_at: current_time_millis(),
            }
        })
        .await
    }

    async fn scan_threats(&self, signatures: &SignatureSet) -> Result<Vec<Detection>, ProviderError> {
        if signatures.process_names.is_empty() {
            return Ok(Vec::new());
        }
        let signatures = signatures.clone();

        self.with_system(move |sys| {
            sys.refresh_processes(ProcessesToUpdate::All, true);

            let mut matches: BTreeMap<String, (String, Vec<u32>)> = BTreeMap::new();
            for (pid, process) in sys.processes() {
                let name = process.name().to_string_lossy();
                if let Some(signature) = signatures.match_process(&name) {
                    matches
                        .entry(name.into_owned())
                        .or_insert_with(|| (signature.to_string(), Vec::new()))
                        .1
                        .push(pid.as_u32());
                }
            }

            matches
                .into_iter()
                .map(|(name, (signature, mut pids))| {
                    pids.sort_unstable();
                    Detection::new(
                        "unwanted_app",
                        Severity::High,
                        format!("{} is running", name),
                    )
                    .with_detail("process", name)
                    .with_detail("signature", signature)
                    .with_detail("pids", pids)
                })
                .collect()
        })
        .await
    }
}
