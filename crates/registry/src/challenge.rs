//! `WWW-Authenticate` challenge parsing.

use forge_engine::ForgeError;

/// Parameters of a `Bearer` challenge needed to request a scoped token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl BearerChallenge {
    /// Parses `Bearer realm="…",service="…",scope="…"`.
    ///
    /// Any other scheme, or a challenge missing one of the three parameters, is a
    /// protocol error carrying the header text.
    pub fn parse(header: &str) -> Result<Self, ForgeError> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(ForgeError::registry_protocol("unsupported authentication challenge", header));
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in parse_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        match (realm, service, scope) {
            (Some(realm), Some(service), Some(scope)) => Ok(Self { realm, service, scope }),
            _ => Err(ForgeError::registry_protocol("incomplete bearer challenge", header)),
        }
    }
}

/// Splits `k1="v1", k2=v2` on commas outside quotes. Quotes are stripped and `\"` escapes
/// are honoured inside quoted values.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    items.push(current);

    items
        .into_iter()
        .filter_map(|item| {
            let (key, value) = item.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_hub_challenge() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:acme/web:pull""#,
        )
        .expect("valid challenge");
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
        assert_eq!(challenge.scope, "repository:acme/web:pull");
    }

    #[test]
    fn commas_inside_quotes_do_not_split() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="https://r.example/token", service="r.example", scope="repository:a/b:pull,push""#,
        )
        .expect("valid challenge");
        assert_eq!(challenge.scope, "repository:a/b:pull,push");
    }

    #[test]
    fn basic_challenge_is_a_protocol_error() {
        let error = BearerChallenge::parse(r#"Basic realm="registry""#).expect_err("not bearer");
        assert!(matches!(error, ForgeError::RegistryProtocol { .. }));
    }

    #[test]
    fn missing_scope_is_a_protocol_error() {
        let error = BearerChallenge::parse(r#"Bearer realm="https://r.example/token",service="r.example""#).expect_err("incomplete");
        assert!(error.to_string().contains("incomplete bearer challenge"));
    }
}
