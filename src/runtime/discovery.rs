//! Latest-version lookup through appc meta discovery.
//!
//! `https://<name>?ac-discovery=1` serves `<meta name="ac-discovery" content="prefix template">`
//! tags. The template rendered with version `latest` redirects to the concrete archive,
//! whose file name carries the version.

use crate::error::{ErrorFieldExt, ErrorKind, Result, ResultExt};
use crate::runtime::VersionResolver;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;

pub struct AppcDiscovery {
    client: reqwest::Client,
    insecure: bool,
}

impl AppcDiscovery {
    /// `insecure` also allows plain http endpoints
    pub fn new(insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .err_ctx(ErrorKind::Config, "Failed to create discovery http client")?;
        Ok(Self { client, insecure })
    }

    fn schemes(&self) -> &'static [&'static str] {
        if self.insecure {
            &["https", "http"]
        } else {
            &["https"]
        }
    }

    async fn templates(&self, name: &str) -> Vec<String> {
        for candidate in discovery_candidates(name) {
            for scheme in self.schemes() {
                let url = format!("{}://{}?ac-discovery=1", scheme, candidate);
                let body = match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::trace!(url = %url, error = %e, "Discovery request failed");
                        continue;
                    }
                };
                let templates = parse_discovery_meta(&body, name);
                if !templates.is_empty() {
                    return templates;
                }
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl VersionResolver for AppcDiscovery {
    async fn latest_version(&self, name: &str) -> Result<Option<String>> {
        for template in self.templates(name).await {
            let url = render_template(&template, name, "latest");
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .err_ctx(ErrorKind::Runtime, "Latest version request failed")
                .field("url", &url)?;

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            tracing::debug!(url = %url, location = ?location, "Latest version url");

            if let Some(version) = location.and_then(|l| extract_version(&l, name)) {
                return Ok(Some(version));
            }
        }
        Ok(None)
    }
}

/// `name`, then each parent path of it
fn discovery_candidates(name: &str) -> Vec<&str> {
    let mut candidates = vec![name];
    let mut current = name;
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        candidates.push(current);
    }
    candidates
}

/// Templates of every `ac-discovery` meta tag whose prefix matches `name`
pub fn parse_discovery_meta(html: &str, name: &str) -> Vec<String> {
    let Ok(meta) = Regex::new(r#"<meta\s+name="ac-discovery"\s+content="([^"]+)"\s*/?>"#) else {
        return Vec::new();
    };
    meta.captures_iter(html)
        .filter_map(|c| {
            let mut parts = c[1].split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(prefix), Some(template)) if name.starts_with(prefix) => {
                    Some(template.to_string())
                }
                _ => None,
            }
        })
        .collect()
}

pub fn render_template(template: &str, name: &str, version: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{version}", version)
        .replace("{os}", "linux")
        .replace("{arch}", "amd64")
        .replace("{ext}", "aci")
}

/// Version embedded in an archive url such as `.../app-1.2.3-linux-amd64.aci`
pub fn extract_version(url: &str, name: &str) -> Option<String> {
    let short = name.rsplit('/').next().unwrap_or(name);
    let pattern = format!(r"{}-(.+)-linux-amd64\.aci", regex::escape(short));
    let re = Regex::new(&pattern).ok()?;
    re.captures(url).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_discovery_meta_filters_by_prefix() {
        let html = r#"<html><head>
<meta name="ac-discovery" content="example.com https://repo.example.com/{name}-{version}-{os}-{arch}.{ext}">
<meta name="ac-discovery" content="other.org https://other.org/{name}.{ext}"/>
</head></html>"#;
        let templates = parse_discovery_meta(html, "example.com/app");
        assert_eq!(
            templates,
            vec!["https://repo.example.com/{name}-{version}-{os}-{arch}.{ext}".to_string()]
        );
    }

    #[test]
    fn test_render_template() {
        let url = render_template(
            "https://repo.example.com/{name}-{version}-{os}-{arch}.{ext}",
            "example.com/app",
            "latest",
        );
        assert_eq!(url, "https://repo.example.com/example.com/app-latest-linux-amd64.aci");
    }

    #[test]
    fn test_extract_version_from_redirect() {
        let location = "https://repo.example.com/example.com/app-1.3.0-2-linux-amd64.aci";
        assert_eq!(
            extract_version(location, "example.com/app"),
            Some("1.3.0-2".to_string())
        );
        assert_eq!(extract_version("https://repo/x.aci", "example.com/app"), None);
    }

    #[test]
    fn test_discovery_candidates_walk_up() {
        assert_eq!(
            discovery_candidates("example.com/team/app"),
            vec!["example.com/team/app", "example.com/team", "example.com"]
        );
    }
}
