use rama::http::Uri;
use serde::Deserialize;

use crate::config::serde_url;

/// Container-image registry origin.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url", with = "serde_url")]
    pub url: Uri,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
        }
    }
}

fn default_registry_url() -> Uri {
    Uri::from_static("https://registry-1.docker.io")
}

/// Go module mirror origin. The checksum-database branch derives its target
/// host from the request path itself and needs no origin of its own.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleProxyConfig {
    #[serde(default = "default_module_mirror_url", with = "serde_url")]
    pub mirror_url: Uri,
}

impl Default for ModuleProxyConfig {
    fn default() -> Self {
        Self {
            mirror_url: default_module_mirror_url(),
        }
    }
}

fn default_module_mirror_url() -> Uri {
    Uri::from_static("https://proxy.golang.org")
}

/// Static-content mirror origins for the `/cdn/` gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Single CDN origin serving the `gh/`, `npm/` and `wp/` namespaces.
    #[serde(default = "default_cdn_url", with = "serde_url")]
    pub cdn_url: Uri,
    /// Source-control host backing the `cnb/` raw-file rewrite.
    #[serde(default = "default_cnb_url", with = "serde_url")]
    pub cnb_url: Uri,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            cdn_url: default_cdn_url(),
            cnb_url: default_cnb_url(),
        }
    }
}

fn default_cdn_url() -> Uri {
    Uri::from_static("https://cdn.jsdelivr.net")
}

fn default_cnb_url() -> Uri {
    Uri::from_static("https://cnb.cool")
}
