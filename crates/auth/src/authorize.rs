//! Authorization URL construction
//!
//! Pure assembly of the provider redirect URL from config and freshly
//! generated PKCE material. The only failure mode is a malformed configured
//! authorize endpoint, which is operator error.

use url::Url;

use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::pkce::PkceChallenge;

/// Build the interactive authorization URL for one handshake attempt.
///
/// With `force_login` set, the configured force-login parameters are appended
/// so the provider shows its account picker even when a session cookie
/// exists. Used when the user explicitly switches accounts.
pub fn build_authorize_url(
    config: &ProviderConfig,
    challenge: &PkceChallenge,
    redirect_uri: &str,
    force_login: bool,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&config.authorize_url)
        .map_err(|e| AuthError::ProviderConfig(format!("bad authorize url: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &config.scope_string())
            .append_pair("state", &challenge.state)
            .append_pair("code_challenge", &challenge.code_challenge)
            .append_pair("code_challenge_method", challenge.challenge_method());

        if force_login {
            for (key, value) in &config.force_login_params {
                query.append_pair(key, value);
            }
        }
    }

    Ok(url)
}
