//! Docker Registry v2 client.

use std::sync::Arc;

use forge_engine::{Auth, FetchOptions, FetchOutcome, ForgeError, Workstream};
use forge_types::Secret;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::PushCache;
use crate::challenge::BearerChallenge;
use crate::reference::RegistryTarget;

const UNAUTHORIZED: u16 = 401;
const MANIFEST_UNKNOWN: &str = "MANIFEST_UNKNOWN";

/// Answers "is this image in the registry?" and remembers the answer for the run.
#[derive(Clone)]
pub struct RegistryClient {
    workstream: Workstream,
    target: RegistryTarget,
    cache: Arc<PushCache>,
    scheme: String,
}

impl RegistryClient {
    pub fn new(workstream: Workstream, target: RegistryTarget) -> Self {
        Self {
            workstream,
            target,
            cache: Arc::new(PushCache::new()),
            scheme: "https".to_string(),
        }
    }

    /// Shares an existing cache instead of starting empty.
    pub fn with_cache(mut self, cache: Arc<PushCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Talks to the registry over `scheme` (`https` unless overridden).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn target(&self) -> &RegistryTarget {
        &self.target
    }

    pub fn cache(&self) -> &Arc<PushCache> {
        &self.cache
    }

    /// GET `url` with basic credentials, completing a bearer token handshake when the
    /// registry answers 401.
    ///
    /// The first request tolerates 401 in addition to `expected`; the retry with the
    /// bearer token does not. Only the retry is a visible work item.
    pub async fn authenticated_get(
        &self,
        url: &str,
        expected: &[u16],
        user: &str,
        password: &Secret,
    ) -> Result<FetchOutcome, ForgeError> {
        let basic = Auth::basic(user, password.clone());
        let mut statuses = expected.to_vec();
        statuses.push(UNAUTHORIZED);

        let first = self
            .workstream
            .fetch(url, fetch_options(statuses).hidden().auth(basic.clone()))
            .await?;
        if first.status != UNAUTHORIZED || expected.contains(&UNAUTHORIZED) {
            return Ok(first);
        }

        let header = first
            .header("www-authenticate")
            .ok_or_else(|| ForgeError::registry_protocol("401 without an authentication challenge", first.body.clone()))?;
        let challenge = BearerChallenge::parse(header)?;
        debug!(realm = %challenge.realm, service = %challenge.service, "registry requested bearer token");

        let token = self.bearer_token(&challenge, basic).await?;
        self.workstream
            .fetch(url, fetch_options(expected.to_vec()).auth(Auth::Bearer(token)))
            .await
    }

    async fn bearer_token(&self, challenge: &BearerChallenge, basic: Auth) -> Result<Secret, ForgeError> {
        let mut token_url = Url::parse(&challenge.realm)
            .map_err(|error| ForgeError::registry_protocol(format!("invalid token realm ({error})"), challenge.realm.clone()))?;
        token_url
            .query_pairs_mut()
            .append_pair("service", &challenge.service)
            .append_pair("scope", &challenge.scope);

        let reply = self
            .workstream
            .fetch(token_url.as_str(), fetch_options(vec![200]).hidden().secret_body().auth(basic))
            .await?;
        let body: Value = reply
            .json()
            .map_err(|_| ForgeError::registry_protocol("token response is not JSON", reply.body.clone()))?;
        body.get("token")
            .or_else(|| body.get("access_token"))
            .and_then(Value::as_str)
            .map(Secret::new)
            .ok_or_else(|| ForgeError::registry_protocol("token response has no token", reply.body.clone()))
    }

    /// Whether `name:version` exists in this client's repository.
    pub async fn image_exists_remote(&self, name: &str, version: &str) -> Result<bool, ForgeError> {
        let target = self.target.clone();
        self.image_exists_remote_at(&target, name, version).await
    }

    /// Whether `name:version` exists in `target`, memoized per fully qualified reference.
    ///
    /// An answer that is neither a manifest nor a `MANIFEST_UNKNOWN` error is a protocol
    /// error carrying the raw body.
    pub async fn image_exists_remote_at(&self, target: &RegistryTarget, name: &str, version: &str) -> Result<bool, ForgeError> {
        let image = target.image(name, version);
        if let Some(exists) = self.cache.get(&image) {
            debug!(image = %image, exists, "registry cache hit");
            return Ok(exists);
        }

        let url = format!(
            "{}://{}/v2/{}/{}/manifests/{}",
            self.scheme, target.registry, target.repo, name, version
        );
        let response = self
            .authenticated_get(&url, &[200, 404], &target.user, &target.password)
            .await?;
        let exists = classify_manifest(&response.body)?;
        self.cache.insert(image.clone(), exists);
        debug!(image = %image, exists, "registry manifest checked");
        Ok(exists)
    }

    /// Forgets the cached answer for `image` so the next check queries the registry.
    pub fn invalidate(&self, image: &str) {
        if self.cache.invalidate(image).is_some() {
            debug!(image = %image, "registry cache entry invalidated");
        }
    }
}

fn fetch_options(expected: Vec<u16>) -> FetchOptions {
    FetchOptions {
        expected,
        ..FetchOptions::default()
    }
}

fn classify_manifest(body: &str) -> Result<bool, ForgeError> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| ForgeError::registry_protocol("manifest response is not JSON", body))?;

    if value.get("signatures").is_some() && value.get("fsLayers").is_some() {
        return Ok(true);
    }
    let first_code = value
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|error| error.get("code"))
        .and_then(Value::as_str);
    if first_code == Some(MANIFEST_UNKNOWN) {
        return Ok(false);
    }
    Err(ForgeError::registry_protocol("unrecognized manifest response", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_manifest_exists() {
        let body = r#"{"schemaVersion":1,"signatures":[{}],"fsLayers":[{"blobSum":"sha256:00"}]}"#;
        assert!(classify_manifest(body).expect("manifest"));
    }

    #[test]
    fn manifest_unknown_does_not_exist() {
        let body = r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#;
        assert!(!classify_manifest(body).expect("known error"));
    }

    #[test]
    fn other_shapes_are_never_guessed() {
        for body in [
            r#"{"errors":[{"code":"UNAUTHORIZED"}]}"#,
            r#"{"errors":[]}"#,
            r#"{"signatures":[]}"#,
            r#"{"schemaVersion":2,"layers":[]}"#,
            "<html>bad gateway</html>",
        ] {
            match classify_manifest(body) {
                Err(ForgeError::RegistryProtocol { body: raw, .. }) => assert_eq!(raw, body),
                other => panic!("{body} classified as {other:?}"),
            }
        }
    }
}
