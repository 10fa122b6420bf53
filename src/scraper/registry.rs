//! Host → strategy lookup, built once at startup from a static descriptor table.

use super::error::RegistryError;
use super::Strategy;
use reqwest::Url;
use std::collections::HashMap;

/// Static description of one strategy: its name, the base URLs it serves, and a constructor.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    /// Fully-qualified base URLs, e.g. `https://www.example.com/`.
    pub base_urls: &'static [&'static str],
    pub build: fn(Url) -> Box<dyn Strategy>,
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("name", &self.name)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl StrategyDescriptor {
    /// True when `url`'s host matches one of the base URLs, ignoring a `www.`/`m.` prefix.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = normalize_host(host);
        self.base_urls.iter().any(|base| {
            Url::parse(base)
                .ok()
                .and_then(|u| u.host_str().map(|h| normalize_host(h) == host))
                .unwrap_or(false)
        })
    }
}

/// Lowercase `host` and strip one leading `www.` or `m.` label.
pub fn normalize_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    for prefix in ["www.", "m."] {
        if let Some(rest) = host.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    host
}

/// Maps normalized hosts to strategy descriptors. Read-only once built.
#[derive(Debug, Default)]
pub struct Registry {
    by_host: HashMap<String, StrategyDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in crate::sources::BUILTIN {
            registry.register(*descriptor)?;
        }
        Ok(registry)
    }

    /// Index `descriptor` under the host of each base URL. Returns the number of hosts added.
    ///
    /// A host already claimed by a different strategy is rejected; use
    /// [`register_override`](Self::register_override) to replace deliberately.
    pub fn register(&mut self, descriptor: StrategyDescriptor) -> Result<usize, RegistryError> {
        let hosts = hosts_of(&descriptor)?;
        for host in &hosts {
            if let Some(existing) = self.by_host.get(host) {
                if existing.name != descriptor.name {
                    return Err(RegistryError::DuplicateHost {
                        host: host.clone(),
                        existing: existing.name,
                        incoming: descriptor.name,
                    });
                }
            }
        }
        Ok(self.insert(descriptor, hosts))
    }

    /// Index `descriptor`, replacing whatever strategy held its hosts before.
    pub fn register_override(
        &mut self,
        descriptor: StrategyDescriptor,
    ) -> Result<usize, RegistryError> {
        let hosts = hosts_of(&descriptor)?;
        for host in &hosts {
            if let Some(existing) = self.by_host.get(host) {
                if existing.name != descriptor.name {
                    tracing::info!(
                        host = %host,
                        replaced = existing.name,
                        by = descriptor.name,
                        "Strategy overridden"
                    );
                }
            }
        }
        Ok(self.insert(descriptor, hosts))
    }

    fn insert(&mut self, descriptor: StrategyDescriptor, hosts: Vec<String>) -> usize {
        if hosts.is_empty() {
            tracing::debug!(strategy = descriptor.name, "No base URLs; not registered");
        }
        let count = hosts.len();
        for host in hosts {
            tracing::debug!(strategy = descriptor.name, host = %host, "Registered strategy");
            self.by_host.insert(host, descriptor);
        }
        count
    }

    /// Descriptor serving `url`'s host, if any.
    pub fn descriptor_for(&self, url: &Url) -> Option<&StrategyDescriptor> {
        let host = normalize_host(url.host_str()?);
        self.by_host.get(&host)
    }

    /// Build a strategy instance for `url`. `None` means the site is unsupported.
    pub fn resolve(&self, url: &Url) -> Option<Box<dyn Strategy>> {
        self.descriptor_for(url).map(|d| (d.build)(url.clone()))
    }

    /// Registered (host, strategy name) pairs, sorted by host.
    pub fn hosts(&self) -> Vec<(&str, &'static str)> {
        let mut hosts: Vec<_> = self
            .by_host
            .iter()
            .map(|(h, d)| (h.as_str(), d.name))
            .collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

fn hosts_of(descriptor: &StrategyDescriptor) -> Result<Vec<String>, RegistryError> {
    let mut hosts = Vec::with_capacity(descriptor.base_urls.len());
    for base in descriptor.base_urls {
        let url = Url::parse(base).map_err(|e| RegistryError::InvalidBaseUrl {
            strategy: descriptor.name,
            url: base,
            reason: e.to_string(),
        })?;
        let host = url.host_str().ok_or_else(|| RegistryError::InvalidBaseUrl {
            strategy: descriptor.name,
            url: base,
            reason: "URL has no host".to_string(),
        })?;
        let host = normalize_host(host);
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    Ok(hosts)
}
