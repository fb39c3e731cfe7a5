//! Endpoint parsing shared by the probe strategies.

/// Drop a leading `scheme://`, if any.
pub fn strip_scheme(endpoint: &str) -> &str {
    match endpoint.find("://") {
        Some(pos) => &endpoint[pos + 3..],
        None => endpoint,
    }
}

/// Lower-cased scheme, if the endpoint has one.
pub fn scheme(endpoint: &str) -> Option<String> {
    endpoint
        .find("://")
        .map(|pos| endpoint[..pos].to_ascii_lowercase())
}

/// `host[:port]` portion: no scheme, userinfo, path, query, or fragment.
fn authority(endpoint: &str) -> &str {
    let rest = strip_scheme(endpoint.trim());
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    authority.rsplit('@').next().unwrap_or(authority)
}

/// Split an endpoint into host and optional port. IPv6 literals may be
/// bracketed (`[::1]:5432`) or bare (`::1`, no port).
pub fn host_port(endpoint: &str) -> (String, Option<u16>) {
    let authority = authority(endpoint);

    if let Some(inner) = authority.strip_prefix('[') {
        let (host, tail) = inner.split_once(']').unwrap_or((inner, ""));
        let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
        return (host.to_string(), port);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (authority.to_string(), None),
        },
        _ => (authority.to_string(), None),
    }
}

/// Bare hostname of an endpoint.
pub fn hostname(endpoint: &str) -> String {
    host_port(endpoint).0
}

/// Database engine inferred from a connection string's scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
    Redis,
    Unknown,
}

impl DatabaseEngine {
    pub fn from_endpoint(endpoint: &str) -> Self {
        let scheme = scheme(endpoint).unwrap_or_default();
        if scheme.starts_with("postgres") || scheme == "pg" {
            DatabaseEngine::Postgres
        } else if scheme.starts_with("mysql") || scheme.starts_with("mariadb") {
            DatabaseEngine::Mysql
        } else if scheme.starts_with("redis") {
            DatabaseEngine::Redis
        } else {
            DatabaseEngine::Unknown
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DatabaseEngine::Mysql => 3306,
            DatabaseEngine::Redis => 6379,
            DatabaseEngine::Postgres | DatabaseEngine::Unknown => 5432,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::Mysql => "mysql",
            DatabaseEngine::Redis => "redis",
            DatabaseEngine::Unknown => "unknown",
        }
    }
}
