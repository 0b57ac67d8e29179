use std::sync::Arc;
use std::time::Duration;

use completion_provider::{CompletionBackend, ProviderInitError};
use completion_provider_mock::{MockBackend, MOCK_PROVIDER_ID};
use completion_provider_openai::{OpenAiBackend, OpenAiBackendConfig, OPENAI_PROVIDER_ID};

use crate::config::{Config, API_KEY_ENV_VAR};
use crate::interrupt::Interrupt;

/// Builds the backend named by `config.provider`.
///
/// Backends that can abort a request watch `interrupt`'s cancellation flag.
pub fn backend_for_config(
    config: &Config,
    interrupt: &Interrupt,
) -> Result<Arc<dyn CompletionBackend>, ProviderInitError> {
    match config.provider.trim() {
        OPENAI_PROVIDER_ID => {
            let api_key = config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    ProviderInitError::new(format!(
                        "Missing API key for provider '{OPENAI_PROVIDER_ID}'. Set {API_KEY_ENV_VAR} or api_key in the config file"
                    ))
                })?;

            let mut backend_config = OpenAiBackendConfig::new(api_key)
                .with_default_model(config.params.model.clone())
                .with_timeout(Duration::from_secs(config.timeout_sec));
            if let Some(base_url) = &config.base_url {
                backend_config = backend_config.with_base_url(base_url.clone());
            }
            if let Some(organization) = &config.organization {
                backend_config = backend_config.with_organization(organization.clone());
            }
            if let Some(max_retries) = config.max_retries {
                backend_config = backend_config.with_max_retries(max_retries);
            }
            if let Some(dir) = &config.backup_dir {
                backend_config = backend_config.with_backup_dir(dir.clone());
            }

            Ok(Arc::new(
                OpenAiBackend::new(backend_config)?.with_cancellation(interrupt.cancellation()),
            ))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(MockBackend::echo())),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {OPENAI_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        ))),
    }
}
