//! Provider-specific URL and authentication rules.
//!
//! Most hosts speak the `OpenAI` wire format verbatim. Azure `OpenAI` routes
//! by deployment and authenticates with an `api-key` header instead of a
//! bearer token.

/// Default Azure API version when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Supported completion providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// Deployment name (required for Azure)
        deployment_name: String,
        /// API version (e.g., "2024-08-01-preview")
        api_version: String,
    },
    /// Generic OpenAI-compatible provider (`OpenRouter`, Groq, local servers, ...)
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// Azure detection leaves the deployment empty; the caller fills it in
    /// from configuration.
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openai.azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("api.openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Build the chat completions URL for this provider.
    #[must_use]
    pub fn completions_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            Self::OpenAI | Self::Generic => format!("{base}/v1/chat/completions"),
        }
    }

    /// Attach credentials to an outgoing request.
    #[must_use]
    pub fn authorize(
        &self,
        rb: reqwest::RequestBuilder,
        api_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match (self, api_key) {
            (_, None) => rb,
            (Self::AzureOpenAI { .. }, Some(key)) => rb.header("api-key", key),
            (Self::OpenAI | Self::Generic, Some(key)) => rb.bearer_auth(key),
        }
    }
}
