//! Path classification for the access gate.

use std::fmt;

/// Which side of the gate a path falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefixes that are public no matter what the configuration adds.
const BUILTIN_PUBLIC: &[&str] = &[
    "/api/auth",
    "/static",
    "/assets",
    "/favicon.ico",
    "/health",
];

/// Splits a path into its segments. `None` for anything that is not a clean
/// absolute path: no leading `/`, `.`/`..` segments, or empty interior
/// segments. A single trailing `/` is tolerated.
fn segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
        return None;
    }
    Some(parts)
}

/// The static allow-list. Built once at startup and never mutated.
///
/// A path is public when its leading segments equal every segment of some
/// allow-listed prefix, so `/login` covers `/login` and `/login/reset` but
/// not `/login-admin`. Everything else is protected.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: Vec<Vec<String>>,
}

impl RouteTable {
    /// Builds the table from the login path plus any extra public prefixes.
    /// Rejects prefixes that are not clean paths and the bare root, which
    /// would make every route public.
    pub fn new(login_path: &str, extra_public: &[String]) -> Result<Self, String> {
        let mut public = Vec::new();
        let all = std::iter::once(login_path)
            .chain(BUILTIN_PUBLIC.iter().copied())
            .chain(extra_public.iter().map(String::as_str));
        for prefix in all {
            let parts = segments(prefix)
                .ok_or_else(|| format!("public prefix '{}' is not a clean absolute path", prefix))?;
            if parts.is_empty() {
                return Err(format!("public prefix '{}' would expose every route", prefix));
            }
            public.push(parts.into_iter().map(str::to_string).collect());
        }
        Ok(RouteTable { public })
    }

    pub fn classify(&self, path: &str) -> Visibility {
        let Some(parts) = segments(path) else {
            return Visibility::Protected;
        };
        let matched = self.public.iter().any(|prefix| {
            prefix.len() <= parts.len() && prefix.iter().zip(&parts).all(|(a, b)| a == b)
        });
        if matched {
            Visibility::Public
        } else {
            Visibility::Protected
        }
    }
}
