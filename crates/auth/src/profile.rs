//! User profile retrieval
//!
//! Fetches the authenticated user's profile (`/2/users/me`) and arbitrary
//! profiles by handle. Handles are normalized (leading `@` stripped, case
//! preserved) and avatar URLs are upscaled from the provider's tiny default
//! variant to the 400x400 one before they reach callers.

use serde::Deserialize;
use tracing::debug;

use crate::client::ApiClient;
use crate::config::ProviderConfig;
use crate::error::AuthError;

const USERS_ME_ENDPOINT: &str = "/2/users/me";
const USER_BY_HANDLE_ENDPOINT: &str = "/2/users/by/username";

const USER_FIELDS: &str = "id,name,username,profile_image_url,description,public_metrics";

/// Follower/following/post counts attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
}

/// A provider user profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable provider-assigned user id.
    pub id: String,
    /// The user's handle (without `@`).
    pub handle: String,
    /// Display name.
    pub display_name: String,
    /// Avatar URL, upscaled to the 400x400 variant.
    pub profile_image_url: Option<String>,
    /// Bio text.
    pub description: Option<String>,
    /// Audience counts, when the provider returns them.
    pub public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    name: String,
    username: String,
    profile_image_url: Option<String>,
    description: Option<String>,
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: UserData,
}

/// Normalize user-supplied handle input.
///
/// Accepts a bare handle, `@handle`, or a full profile URL; the result is
/// the bare handle. Garbage input passes through for the provider to reject.
#[must_use]
pub fn normalize_handle(handle: &str) -> String {
    let trimmed = handle.trim();

    if trimmed.contains("://") {
        if let Ok(parsed) = url::Url::parse(trimmed) {
            if let Some(segment) =
                parsed.path_segments().and_then(|mut segments| segments.next())
            {
                if !segment.is_empty() {
                    return segment.trim_start_matches('@').to_string();
                }
            }
        }
    }

    trimmed.trim_start_matches('@').to_string()
}

/// Swap the provider's default `_normal` (48x48) avatar variant for the
/// 400x400 one. URLs without the marker pass through unchanged.
#[must_use]
pub fn upscale_avatar(url: &str) -> String {
    url.replace("_normal", "_400x400")
}

fn into_profile(data: UserData) -> UserProfile {
    UserProfile {
        id: data.id,
        handle: data.username,
        display_name: data.name,
        profile_image_url: data.profile_image_url.as_deref().map(upscale_avatar),
        description: data.description,
        public_metrics: data.public_metrics,
    }
}

/// Client for provider user-profile endpoints.
pub struct ProfileClient<'a> {
    client: &'a ApiClient,
    config: &'a ProviderConfig,
}

impl<'a> ProfileClient<'a> {
    pub fn new(client: &'a ApiClient, config: &'a ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Fetch the profile of the user the access token belongs to.
    pub async fn fetch_me(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        debug!("fetching authenticated user profile");

        let request = self
            .client
            .http()
            .get(self.config.users_me_url())
            .bearer_auth(access_token)
            .query(&[("user.fields", USER_FIELDS)]);

        let response = self
            .client
            .execute_with::<UserEnvelope>(USERS_ME_ENDPOINT, request, &self.config.login_retry)
            .await
            .map_err(AuthError::from_transport)?;

        Ok(into_profile(response.body.data))
    }

    /// Fetch a profile by handle, authenticating with the given token.
    ///
    /// The handle is normalized first; callers may pass `@somebody` verbatim
    /// from user input.
    pub async fn fetch_by_handle(
        &self,
        handle: &str,
        access_token: &str,
    ) -> Result<UserProfile, AuthError> {
        let handle = normalize_handle(handle);
        debug!(handle, "resolving user handle");

        let request = self
            .client
            .http()
            .get(self.config.user_by_handle_url(&handle))
            .bearer_auth(access_token)
            .query(&[("user.fields", USER_FIELDS)]);

        let response = self
            .client
            .execute_with::<UserEnvelope>(
                USER_BY_HANDLE_ENDPOINT,
                request,
                &self.config.lookup_retry,
            )
            .await
            .map_err(AuthError::from_transport)?;

        Ok(into_profile(response.body.data))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn handle_normalization() {
        assert_eq!(normalize_handle("@somebody"), "somebody");
        assert_eq!(normalize_handle("  @somebody "), "somebody");
        assert_eq!(normalize_handle("somebody"), "somebody");
        assert_eq!(normalize_handle("SomeBody"), "SomeBody");
        assert_eq!(normalize_handle("https://x.com/somebody"), "somebody");
        assert_eq!(normalize_handle("https://twitter.com/somebody?s=20"), "somebody");
        assert_eq!(normalize_handle("https://x.com/@somebody"), "somebody");
    }

    #[test]
    fn avatar_urls_are_upscaled() {
        assert_eq!(
            upscale_avatar("https://pbs.example/img/abc_normal.jpg"),
            "https://pbs.example/img/abc_400x400.jpg"
        );
        assert_eq!(
            upscale_avatar("https://pbs.example/img/original.jpg"),
            "https://pbs.example/img/original.jpg"
        );
    }

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "data": {
                "id": "12345",
                "name": "Some Body",
                "username": "somebody",
                "profile_image_url": "https://pbs.example/img/abc_normal.jpg",
                "description": "hello",
                "public_metrics": {
                    "followers_count": 120,
                    "following_count": 80,
                    "tweet_count": 3000,
                },
            }
        })
    }

    #[tokio::test]
    async fn fetch_me_requests_extended_fields_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .and(header("authorization", "Bearer user-token"))
            .and(query_param("user.fields", USER_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;

        let config =
            crate::config::ProviderConfig::new("id", "secret").with_api_base(server.uri());
        let client = ApiClient::new(&config.user_agent).unwrap();

        let profile =
            ProfileClient::new(&client, &config).fetch_me("user-token").await.unwrap();

        assert_eq!(profile.id, "12345");
        assert_eq!(profile.handle, "somebody");
        assert_eq!(profile.display_name, "Some Body");
        assert_eq!(
            profile.profile_image_url.as_deref(),
            Some("https://pbs.example/img/abc_400x400.jpg")
        );
        assert_eq!(profile.public_metrics.unwrap().followers_count, 120);
    }

    #[tokio::test]
    async fn fetch_by_handle_strips_at_sign() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/by/username/somebody"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;

        let config =
            crate::config::ProviderConfig::new("id", "secret").with_api_base(server.uri());
        let client = ApiClient::new(&config.user_agent).unwrap();

        let profile = ProfileClient::new(&client, &config)
            .fetch_by_handle("@somebody", "app-token")
            .await
            .unwrap();
        assert_eq!(profile.handle, "somebody");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config =
            crate::config::ProviderConfig::new("id", "secret").with_api_base(server.uri());
        let client = ApiClient::new(&config.user_agent).unwrap();

        let error =
            ProfileClient::new(&client, &config).fetch_me("user-token").await.unwrap_err();
        assert!(matches!(error, AuthError::ServiceUnavailable(_)), "got {error:?}");
        assert!(error.is_retryable());
    }
}
