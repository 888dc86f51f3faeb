// SPDX-License-Identifier: Apache-2.0
mod backend;
mod types;

pub use backend::{BackendClient, OpenAiCompatBackend};
pub use types::*;

/// Construct the configured backend client.
///
/// There is exactly one backend shape: an OpenAI-compatible chat-completions
/// endpoint. Provider fan-out lives in the HTTP base URL, not in this
/// function — pointing `model.base_url` at a different compatible gateway is
/// how a deployment switches providers.
pub fn from_config(cfg: &waygate_config::ModelConfig) -> anyhow::Result<Box<dyn BackendClient>> {
    Ok(Box::new(OpenAiCompatBackend::new(
        cfg.base_url.clone(),
        cfg.api_key.clone(),
        cfg.name.clone(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waygate_config::ModelConfig;

    #[test]
    fn from_config_builds_a_backend() {
        let cfg = ModelConfig {
            name: "deepseek-chat".into(),
            api_key: Some("test-key".into()),
            base_url: "https://api.deepseek.com/v1".into(),
            max_tokens: 4096,
            temperature: 0.2,
        };
        assert!(from_config(&cfg).is_ok());
    }
}
