use std::time::Duration;

use expressr_providers::{build_client, ReplicateConfig, StorageConfig, StripeConfig};

pub fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5))
}

#[allow(dead_code)]
pub fn replicate_config(api_url: &str) -> ReplicateConfig {
    ReplicateConfig {
        api_token: "r8_test".into(),
        api_url: api_url.into(),
        trainer_model: "ostris/flux-dev-lora-trainer".into(),
        trainer_version: "trainer123".into(),
        destination: "expressr/faces".into(),
        face_model: "detector/faces:face123".into(),
        lora_base_model: "base/flux-lora".into(),
        webhook_secret: None,
    }
}

#[allow(dead_code)]
pub fn stripe_config(api_url: &str) -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test".into(),
        webhook_secret: "whsec_test".into(),
        api_url: api_url.into(),
        price_cents: 999,
    }
}

#[allow(dead_code)]
pub fn storage_config(url: &str) -> StorageConfig {
    StorageConfig {
        url: url.into(),
        service_key: "service-key".into(),
        bucket: "generated-images".into(),
    }
}
