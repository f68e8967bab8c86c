use std::collections::HashMap;

use chrono::{TimeDelta, Utc};
use log::{debug, warn};
use url::{Url, form_urlencoded};

use crate::{
    config::Config,
    mendeley::{AuthError, Error, Session, USER_AGENT},
};

/// An OAuth implicit-grant flow against the Mendeley authorization server.
///
/// The access token comes back in the fragment of the redirect issued after the credentials
/// are posted to the login URL, so there is no separate code exchange.
pub struct ImplicitGrant {
    authorize_url: Url,
    client_id: String,
    redirect_uri: String,
    state: String,
}

impl ImplicitGrant {
    /// Start a flow with a fresh random `state`.
    pub fn new(api_url: &Url, client_id: &str, redirect_uri: &str) -> Result<Self, Error> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        Self::with_state(api_url, client_id, redirect_uri, &state)
    }

    pub fn with_state(
        api_url: &Url,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Self, Error> {
        Ok(ImplicitGrant {
            authorize_url: api_url.join("oauth/authorize")?,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state: state.to_string(),
        })
    }

    pub fn login_url(&self) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", "all")
            .append_pair("state", &self.state);
        url
    }

    /// Post the credentials to the login URL and return the `Location` of the redirect.
    pub fn login(&self, agent: &ureq::Agent, username: &str, password: &str) -> Result<String, Error> {
        let res = agent
            .post(self.login_url().as_str())
            .header("User-Agent", USER_AGENT)
            .config()
            .max_redirects(0)
            .build()
            .send_form([("username", username), ("password", password)])?;

        let status = res.status().as_u16();
        if status != 302 {
            return Err(AuthError::NotRedirected(status).into());
        }

        let location = res
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingLocation)?;
        Ok(location.to_string())
    }

    /// Turn the redirect location into a session.
    pub fn authenticate(&self, location: &str) -> Result<Session, Error> {
        let url = Url::parse(location)
            .or_else(|_| self.authorize_url.join(location))
            .map_err(|_| AuthError::BadLocation(location.to_string()))?;

        // Errors may be reported in the query, tokens always travel in the fragment.
        let params: HashMap<String, String> = url
            .query_pairs()
            .chain(form_urlencoded::parse(url.fragment().unwrap_or("").as_bytes()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if let Some(error) = params.get("error") {
            return Err(AuthError::Denied {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            }
            .into());
        }

        if params.get("state") != Some(&self.state) {
            return Err(AuthError::StateMismatch.into());
        }

        let token = params
            .get("access_token")
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let token_type = params
            .get("token_type")
            .cloned()
            .unwrap_or_else(|| "bearer".to_string());
        if !token_type.eq_ignore_ascii_case("bearer") {
            warn!("unexpected token type `{token_type}`, using it as a bearer token");
        }

        let expires_at = params
            .get("expires_in")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(TimeDelta::try_seconds)
            .map(|ttl| Utc::now() + ttl);

        Ok(Session::new(token.clone(), token_type, expires_at))
    }
}

/// Run the whole implicit grant with the credentials from `config`.
pub fn sign_in(agent: &ureq::Agent, config: &Config) -> Result<Session, Error> {
    let grant = ImplicitGrant::new(&config.api_url, &config.client_id, &config.redirect_uri)?;
    debug!("logging in as {} via {}", config.username, grant.authorize_url);
    let location = grant.login(agent, &config.username, &config.password)?;
    let session = grant.authenticate(&location)?;
    match session.expires_at() {
        Some(at) => debug!("obtained {} token valid until {at}", session.token_type()),
        None => debug!("obtained {} token", session.token_type()),
    }
    Ok(session)
}
