//! Provider configuration loaded from environment variables.

/// Default Replicate API base URL.
const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com";

/// Default LoRA trainer model.
const DEFAULT_TRAINER_MODEL: &str = "ostris/flux-dev-lora-trainer";

/// Default base model that applies LoRA weights given by URL.
const DEFAULT_LORA_BASE_MODEL: &str = "black-forest-labs/flux-dev-lora";

/// Default face detection model.
const DEFAULT_FACE_MODEL: &str =
    "chigozienri/mediapipe-face:b52b4833a810a8b8d835d6339b72536d63590918b185588be2def78a89e7ca7b";

/// Default Stripe API base URL.
const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";

/// Default checkout price in cents ($9.99).
const DEFAULT_PRICE_CENTS: i64 = 999;

/// Default storage bucket for generated images and training archives.
const DEFAULT_STORAGE_BUCKET: &str = "generated-images";

/// Replicate training / inference settings.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub api_url: String,
    /// Trainer model as `owner/name`.
    pub trainer_model: String,
    /// Trainer version hash.
    pub trainer_version: String,
    /// Destination model (`owner/name`) receiving trained versions.
    pub destination: String,
    /// Face detection model as `owner/name:version`.
    pub face_model: String,
    /// Model (`owner/name` or `owner/name:version`) that runs a trained
    /// model delivered as a weights URL.
    pub lora_base_model: String,
    /// Secret for verifying training webhooks; `None` disables the check.
    pub webhook_secret: Option<String>,
}

impl ReplicateConfig {
    /// Load from environment.
    ///
    /// | Env var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `REPLICATE_API_TOKEN`       | required                         |
    /// | `REPLICATE_API_URL`         | `https://api.replicate.com`      |
    /// | `REPLICATE_TRAINER_MODEL`   | `ostris/flux-dev-lora-trainer`   |
    /// | `REPLICATE_TRAINER_VERSION` | required                         |
    /// | `REPLICATE_DESTINATION`     | required                         |
    /// | `REPLICATE_FACE_MODEL`      | `chigozienri/mediapipe-face:...` |
    /// | `REPLICATE_LORA_BASE_MODEL` | `black-forest-labs/flux-dev-lora`|
    /// | `REPLICATE_WEBHOOK_SECRET`  | unset (no verification)          |
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            api_token: std::env::var("REPLICATE_API_TOKEN")
                .expect("REPLICATE_API_TOKEN must be set"),
            api_url: env_or("REPLICATE_API_URL", DEFAULT_REPLICATE_API_URL),
            trainer_model: env_or("REPLICATE_TRAINER_MODEL", DEFAULT_TRAINER_MODEL),
            trainer_version: std::env::var("REPLICATE_TRAINER_VERSION")
                .expect("REPLICATE_TRAINER_VERSION must be set"),
            destination: std::env::var("REPLICATE_DESTINATION")
                .expect("REPLICATE_DESTINATION must be set"),
            face_model: env_or("REPLICATE_FACE_MODEL", DEFAULT_FACE_MODEL),
            lora_base_model: env_or("REPLICATE_LORA_BASE_MODEL", DEFAULT_LORA_BASE_MODEL),
            webhook_secret: std::env::var("REPLICATE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Stripe checkout settings.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_url: String,
    pub price_cents: i64,
}

impl StripeConfig {
    /// Load from environment.
    ///
    /// | Env var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `STRIPE_SECRET_KEY`     | required                 |
    /// | `STRIPE_WEBHOOK_SECRET` | required                 |
    /// | `STRIPE_API_URL`        | `https://api.stripe.com` |
    /// | `CHECKOUT_PRICE_CENTS`  | `999`                    |
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            api_url: env_or("STRIPE_API_URL", DEFAULT_STRIPE_API_URL),
            price_cents: std::env::var("CHECKOUT_PRICE_CENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PRICE_CENTS),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

impl StorageConfig {
    /// Load from environment.
    ///
    /// | Env var               | Default            |
    /// |-----------------------|--------------------|
    /// | `STORAGE_URL`         | required           |
    /// | `STORAGE_SERVICE_KEY` | required           |
    /// | `STORAGE_BUCKET`      | `generated-images` |
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("STORAGE_URL").expect("STORAGE_URL must be set"),
            service_key: std::env::var("STORAGE_SERVICE_KEY")
                .expect("STORAGE_SERVICE_KEY must be set"),
            bucket: env_or("STORAGE_BUCKET", DEFAULT_STORAGE_BUCKET),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
