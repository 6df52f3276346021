//! One-time onboarding form
//!
//! On first run the app collects a name, country and email and posts them to
//! a configured endpoint. The flag that suppresses the prompt is set by the
//! caller only after an accepted submission; a failed post means the form
//! is offered again on the next start.

use crate::api::ApiError;
use crate::utils::logger;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingForm {
    pub name: String,
    pub country: String,
    pub email: String,
}

pub struct OnboardingClient {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl OnboardingClient {
    /// With no endpoint configured, `submit` is a logged no-op.
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: crate::api::http_client(),
            endpoint,
        }
    }

    pub async fn submit(&self, form: &OnboardingForm) -> Result<(), ApiError> {
        let Some(endpoint) = &self.endpoint else {
            logger::debug("no onboarding endpoint configured, skipping submission");
            return Ok(());
        };

        let response = self.client.post(endpoint).json(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: format!("onboarding submission failed with HTTP {}", status.as_u16()),
            });
        }
        logger::info("onboarding form submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_serializes_all_fields() {
        let form = OnboardingForm {
            name: "Dana".to_string(),
            country: "Jordan".to_string(),
            email: "dana@example.com".to_string(),
        };
        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["name"], "Dana");
        assert_eq!(json["country"], "Jordan");
        assert_eq!(json["email"], "dana@example.com");
    }

    #[tokio::test]
    async fn test_submit_without_endpoint_is_noop() {
        let client = OnboardingClient::new(None);
        let form = OnboardingForm {
            name: String::new(),
            country: String::new(),
            email: String::new(),
        };
        assert!(client.submit(&form).await.is_ok());
    }
}
