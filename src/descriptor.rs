use std::fmt;

const SSH_FILE_PREFIX: &str = "ssh-file://";
const WEBDAV_SECURE_PREFIX: &str = "webdav-secure://";
const WEBDAV_PREFIX: &str = "webdav://";
const FTP_PREFIX: &str = "ftp://";

/// Transfer protocol selected by a connection descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain FTP, the default when no prefix is given
    Ftp,
    /// SFTP over an SSH session
    SshFile,
    /// WebDAV over plain HTTP
    WebDav,
    /// WebDAV over HTTPS
    WebDavSecure,
}

impl Scheme {
    /// Port used when the descriptor carries none
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Ftp => 21,
            Scheme::SshFile => 22,
            Scheme::WebDav => 80,
            Scheme::WebDavSecure => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ftp => "ftp",
            Scheme::SshFile => "ssh-file",
            Scheme::WebDav => "webdav",
            Scheme::WebDavSecure => "webdav-secure",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login for the remote store
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Parsed connection string identifying a remote store
///
/// `host` is the raw string with the scheme prefix removed and nothing else
/// touched, so it may still carry a `:port` and, for WebDAV, a `/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub scheme: Scheme,
    pub host: String,
    pub credentials: Credentials,
}

impl ConnectionDescriptor {
    /// Parse a connection string. Never fails: anything without a known
    /// prefix is treated as an FTP host, which covers bare IP addresses.
    /// Surrounding whitespace is trimmed before the prefix is matched.
    pub fn parse(raw: &str, credentials: Credentials) -> Self {
        let (scheme, host) = split_scheme(raw.trim());
        Self {
            scheme,
            host: host.to_string(),
            credentials,
        }
    }

    /// Authority part of the host: everything before the first `/`
    pub fn authority(&self) -> &str {
        match self.host.find('/') {
            Some(idx) => &self.host[..idx],
            None => &self.host,
        }
    }

    /// Path part of the host, without leading or trailing slashes
    pub fn root_path(&self) -> &str {
        match self.host.find('/') {
            Some(idx) => self.host[idx..].trim_matches('/'),
            None => "",
        }
    }

    /// Host name without port
    pub fn host_name(&self) -> &str {
        split_port(self.authority()).0
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> u16 {
        split_port(self.authority())
            .1
            .unwrap_or_else(|| self.scheme.default_port())
    }

    /// `(host, port)` pair for socket connections
    pub fn address(&self) -> (String, u16) {
        (self.host_name().to_string(), self.port())
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}

/// Strip the first matching prefix. Order matters: SFTP first, then the
/// secure WebDAV prefix before the plain one.
fn split_scheme(raw: &str) -> (Scheme, &str) {
    const PREFIXES: [(&str, Scheme); 4] = [
        (SSH_FILE_PREFIX, Scheme::SshFile),
        (WEBDAV_SECURE_PREFIX, Scheme::WebDavSecure),
        (WEBDAV_PREFIX, Scheme::WebDav),
        (FTP_PREFIX, Scheme::Ftp),
    ];

    PREFIXES
        .iter()
        .find_map(|(prefix, scheme)| raw.strip_prefix(prefix).map(|rest| (*scheme, rest)))
        .unwrap_or((Scheme::Ftp, raw))
}

/// Split `host:port`. A suffix that is not a valid port stays part of the host.
fn split_port(authority: &str) -> (&str, Option<u16>) {
    // Bracketed IPv6 literal, e.g. [::1]:2121
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((addr, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (addr, port);
        }
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (authority, None),
        },
        _ => (authority, None),
    }
}
