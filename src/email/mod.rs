pub mod gmail;
pub mod hub;
pub mod memory;
pub mod model;
pub mod provider;
pub mod records;
pub mod repository;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use gmail::GmailProvider;
use memory::MemoryProvider;
use provider::EmailProvider;
use records::RecordsProvider;

/// Build the adapter selected by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn EmailProvider>> {
    let provider: Arc<dyn EmailProvider> = match config.kind {
        BackendKind::Memory => {
            let memory = match &config.memory.seed_file {
                Some(path) => MemoryProvider::from_seed_file(path).await?,
                None => MemoryProvider::seeded()?,
            };
            Arc::new(memory.with_latency(Duration::from_millis(config.memory.latency_ms)))
        }
        BackendKind::Records => Arc::new(RecordsProvider::new(
            &config.records.base_url,
            config.records.project_id.clone(),
            config.records.public_key.clone(),
        )?),
        BackendKind::Gmail => Arc::new(GmailProvider::new(
            &config.gmail.base_url,
            config.gmail.access_token.clone(),
        )?),
    };

    tracing::info!("Email backend: {}", provider.name());
    Ok(provider)
}
