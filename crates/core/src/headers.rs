//! Request header assembly.

use {
    reqwest::header::{HeaderMap, HeaderName, HeaderValue},
    secrecy::{ExposeSecret, Secret},
    tracing::warn,
};

use crate::{
    auth::{AuthTokenGetters, auth_header_name},
    error::{Error, Result},
    value::ClientHeaders,
};

pub(crate) fn insert(headers: &mut HeaderMap, name: &str, value: &str, sensitive: bool) -> Result<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    let mut header_value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    header_value.set_sensitive(sensitive);
    headers.insert(header_name, header_value);
    Ok(())
}

/// Resolve every client header into a fresh map.
pub(crate) async fn resolve_client_headers(client_headers: &ClientHeaders) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(client_headers.len());
    for (name, source) in client_headers {
        let value = source.resolve().await?;
        insert(&mut headers, name, &value, false)?;
    }
    Ok(headers)
}

/// Resolve auth tokens into `<source>_token` headers.
pub(crate) async fn add_auth_headers(headers: &mut HeaderMap, getters: &AuthTokenGetters) -> Result<()> {
    for (source, getter) in getters {
        let token: Secret<String> = getter.token().await?;
        insert(headers, &auth_header_name(source), token.expose_secret(), true)?;
    }
    Ok(())
}

/// Auth sources whose header name is already taken by a client header.
pub(crate) fn conflicting_sources<'a>(
    sources: impl IntoIterator<Item = &'a String>,
    client_headers: &ClientHeaders,
) -> Vec<String> {
    sources
        .into_iter()
        .map(String::as_str)
        .map(auth_header_name)
        .filter(|header| {
            client_headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case(header))
        })
        .collect()
}

/// Warn when headers would travel over plain HTTP.
pub(crate) fn warn_if_insecure(base_url: &str, headers: &HeaderMap) {
    if !headers.is_empty() && base_url.starts_with("http://") {
        warn!(
            url = %base_url,
            "sending headers over HTTP, user data may be exposed; use HTTPS for secure communication"
        );
    }
}
