//! Reverse-proxy configuration (nginx).
//!
//! Fragments are built as values and only turned into text by their
//! `Display` impls. Hostnames and service keys are validated upstream, so
//! nothing here needs quoting.

use labgen_core::ServiceRef;
use serde::Serialize;
use std::fmt;

/// Port the virtual hosts listen on.
pub const LISTEN_PORT: u16 = 80;

/// Public hostname of a service, `None` when it is not exposed.
///
/// There is exactly one naming rule: `<domain or key>.<base domain>`.
pub fn hostname(service: ServiceRef<'_>, base_domain: &str) -> Option<String> {
    service
        .spec
        .domain
        .label(service.key)
        .map(|label| format!("{}.{}", label.to_ascii_lowercase(), base_domain))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upstream {
    pub name: String,
    /// `host:port` addresses.
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    pub server_name: String,
    pub listen: u16,
    pub upstream: String,
}

/// Proxy configuration for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyFragment {
    pub upstream: Upstream,
    pub host: VirtualHost,
}

/// Renders proxy fragments under one base domain.
#[derive(Debug, Clone)]
pub struct ProxyRenderer {
    base_domain: String,
}

impl ProxyRenderer {
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
        }
    }

    /// Fragment routing the service's hostname to `target` (`host:port`).
    pub fn render(&self, service: ServiceRef<'_>, target: &str) -> Option<ProxyFragment> {
        let server_name = hostname(service, &self.base_domain)?;
        Some(ProxyFragment {
            upstream: Upstream {
                name: service.key.to_string(),
                servers: vec![target.to_string()],
            },
            host: VirtualHost {
                server_name,
                listen: LISTEN_PORT,
                upstream: service.key.to_string(),
            },
        })
    }

    /// Fragment for an exposed service with a port, addressed by its key.
    pub fn render_service(&self, service: ServiceRef<'_>) -> Option<ProxyFragment> {
        let port = service.spec.primary_port()?;
        self.render(service, &format!("{}:{}", service.key, port))
    }
}

/// A whole `proxy.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    pub fragments: Vec<ProxyFragment>,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "upstream {} {{", self.name)?;
        for server in &self.servers {
            writeln!(f, "    server {};", server)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for VirtualHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "server {{")?;
        writeln!(f, "    listen {};", self.listen)?;
        writeln!(f, "    server_name {};", self.server_name)?;
        writeln!(f)?;
        writeln!(f, "    location / {{")?;
        writeln!(f, "        proxy_pass http://{};", self.upstream)?;
        writeln!(f, "        proxy_http_version 1.1;")?;
        writeln!(f, "        proxy_set_header Host $host;")?;
        writeln!(f, "        proxy_set_header Upgrade $http_upgrade;")?;
        writeln!(f, "        proxy_set_header Connection \"upgrade\";")?;
        writeln!(f, "        proxy_set_header X-Real-IP $remote_addr;")?;
        writeln!(f, "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;")?;
        writeln!(f, "        proxy_set_header X-Forwarded-Proto $scheme;")?;
        writeln!(f, "    }}")?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for ProxyFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.upstream)?;
        writeln!(f)?;
        write!(f, "{}", self.host)
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Generated by labgen. Do not edit.")?;
        for fragment in &self.fragments {
            writeln!(f)?;
            write!(f, "{}", fragment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgen_core::{Domain, ServiceSpec};

    #[test]
    fn test_default_domain_is_service_key() {
        let spec = ServiceSpec::new("app");
        assert_eq!(
            hostname(ServiceRef::new("grafana", &spec), "lab.example.com").as_deref(),
            Some("grafana.lab.example.com")
        );
    }

    #[test]
    fn test_custom_and_disabled_domains() {
        let mut spec = ServiceSpec::new("app");
        spec.domain = Domain::Custom("dash".to_string());
        assert_eq!(
            hostname(ServiceRef::new("grafana", &spec), "home.arpa").as_deref(),
            Some("dash.home.arpa")
        );
        spec.domain = Domain::Disabled;
        assert!(hostname(ServiceRef::new("grafana", &spec), "home.arpa").is_none());
    }

    #[test]
    fn test_render_service_needs_port() {
        let renderer = ProxyRenderer::new("home.arpa");
        let mut spec = ServiceSpec::new("app");
        assert!(renderer.render_service(ServiceRef::new("app", &spec)).is_none());

        spec.ports = vec![3000, 3001];
        let fragment = renderer.render_service(ServiceRef::new("app", &spec)).unwrap();
        assert_eq!(fragment.upstream.servers, vec!["app:3000".to_string()]);
        assert_eq!(fragment.host.server_name, "app.home.arpa");
    }

    #[test]
    fn test_rendered_text() {
        let renderer = ProxyRenderer::new("home.arpa");
        let mut spec = ServiceSpec::new("app");
        spec.ports = vec![8096];
        let config = ProxyConfig {
            fragments: vec![renderer.render_service(ServiceRef::new("jellyfin", &spec)).unwrap()],
        };
        let text = config.to_string();
        assert!(text.starts_with("# Generated by labgen"));
        assert!(text.contains("upstream jellyfin {\n    server jellyfin:8096;\n}\n"));
        assert!(text.contains("    server_name jellyfin.home.arpa;\n"));
        assert!(text.contains("        proxy_pass http://jellyfin;\n"));
    }
}
