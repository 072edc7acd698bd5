//! Auth requirement resolution and credential providers.
//!
//! A tool may require auth sources in two places: per parameter (the server
//! fills the parameter from the token's claims) and per invocation. In both
//! places any one of the listed sources satisfies the requirement.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    future::Future,
    sync::Arc,
};

use {
    futures::{FutureExt, future::BoxFuture},
    secrecy::Secret,
};

use crate::error::Result;

/// Header carrying the token for `source`.
pub fn auth_header_name(source: &str) -> String {
    format!("{source}_token")
}

type TokenProducer = Arc<dyn Fn() -> BoxFuture<'static, Result<Secret<String>>> + Send + Sync>;

/// Produces a token for one auth source, on every invocation.
#[derive(Clone)]
pub struct AuthTokenGetter(TokenProducer);

impl AuthTokenGetter {
    /// A getter that always yields the same token.
    pub fn fixed(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self::from_fn(move || token.clone())
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(move || {
            let token = Secret::new(f());
            async move { Ok(token) }.boxed()
        }))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self(Arc::new(move || f().map(|res| res.map(Secret::new)).boxed()))
    }

    pub async fn token(&self) -> Result<Secret<String>> {
        (self.0)().await
    }
}

impl fmt::Debug for AuthTokenGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthTokenGetter(..)")
    }
}

/// Credential providers keyed by auth source.
pub type AuthTokenGetters = BTreeMap<String, AuthTokenGetter>;

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Parameters still lacking any of their sources.
    pub remaining_params: BTreeMap<String, Vec<String>>,
    /// Invocation-level sources, kept whole when none was supplied.
    pub remaining_invocation: Vec<String>,
    /// Supplied sources that satisfied at least one requirement.
    pub used: BTreeSet<String>,
}

impl Resolution {
    pub fn is_satisfied(&self) -> bool {
        self.remaining_params.is_empty() && self.remaining_invocation.is_empty()
    }
}

/// Match required auth sources against the supplied ones.
///
/// Parameters and the invocation list share a single `used` accumulator, so
/// one source may satisfy both.
pub fn resolve<'a, I>(
    param_auth: &BTreeMap<String, Vec<String>>,
    invocation_auth: &[String],
    supplied: I,
) -> Resolution
where
    I: IntoIterator<Item = &'a str>,
{
    let supplied: BTreeSet<&str> = supplied.into_iter().collect();
    let mut resolution = Resolution::default();

    let satisfy = |sources: &[String], used: &mut BTreeSet<String>| {
        let matched: Vec<&String> = sources
            .iter()
            .filter(|s| supplied.contains(s.as_str()))
            .collect();
        used.extend(matched.iter().map(|s| (*s).clone()));
        !matched.is_empty()
    };

    for (param, sources) in param_auth {
        if !sources.is_empty() && !satisfy(sources.as_slice(), &mut resolution.used) {
            resolution
                .remaining_params
                .insert(param.clone(), sources.clone());
        }
    }

    if !invocation_auth.is_empty() && !satisfy(invocation_auth, &mut resolution.used) {
        resolution.remaining_invocation = invocation_auth.to_vec();
    }

    resolution
}
