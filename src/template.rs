//! Strict placeholder rendering for config and unit files.
//!
//! Templates contain `<name>` tokens (lowercase letters, digits and
//! underscores). Rendering is plain text substitution: there are no
//! conditionals or loops. Every token must have a value, otherwise rendering
//! fails with `MissingPlaceholder` and nothing is produced, so a
//! half-expanded config never reaches the disk. Values keyed by a name that
//! is not a valid token are rejected for the same reason.

use crate::error::{ProvisionError, Result};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-z][a-z0-9_]*)>").expect("placeholder pattern is valid"));

/// Placeholder name -> replacement value.
pub type Placeholders = BTreeMap<String, String>;

/// A named template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub source: &'static str,
}

/// nginx site served over plain HTTP.
pub const NGINX_HTTP: Template = Template {
    name: "nginx.conf",
    source: include_str!("../templates/nginx.conf"),
};

/// nginx site with an HTTP->HTTPS redirect and Let's Encrypt certificate paths.
pub const NGINX_SSL: Template = Template {
    name: "nginx_ssl.conf",
    source: include_str!("../templates/nginx_ssl.conf"),
};

/// systemd unit for the panel queue worker.
pub const QUEUE_WORKER_UNIT: Template = Template {
    name: "pteroq.service",
    source: include_str!("../templates/pteroq.service"),
};

/// Dedicated PHP-FPM pool (RHEL-like hosts).
pub const PHP_FPM_POOL: Template = Template {
    name: "php-fpm-pool.conf",
    source: include_str!("../templates/php-fpm-pool.conf"),
};

impl Template {
    /// Names of every placeholder this template references.
    pub fn placeholders(&self) -> BTreeSet<String> {
        referenced_placeholders(self.source)
    }

    pub fn render(&self, values: &Placeholders) -> Result<String> {
        render(self.name, self.source, values)
    }
}

/// Render `source`, replacing every `<key>` with `values[key]`.
///
/// Replacement values are inserted verbatim and never rescanned.
///
/// # Errors
///
/// `Validation` if a key in `values` is not a valid placeholder name, since
/// its token would silently survive rendering. `MissingPlaceholder` listing
/// every referenced key absent from `values`.
pub fn render(name: &str, source: &str, values: &Placeholders) -> Result<String> {
    let malformed: Vec<&str> = values
        .keys()
        .map(String::as_str)
        .filter(|key| !is_placeholder_name(key))
        .collect();
    if !malformed.is_empty() {
        return Err(ProvisionError::validation(format!(
            "template '{}' was given invalid placeholder name(s): {} (expected lowercase letters, digits and '_')",
            name,
            malformed.join(", ")
        )));
    }

    let missing: Vec<String> = referenced_placeholders(source)
        .into_iter()
        .filter(|key| !values.contains_key(key))
        .collect();

    if !missing.is_empty() {
        return Err(ProvisionError::MissingPlaceholder {
            template: name.to_string(),
            keys: missing,
        });
    }

    let rendered = PLACEHOLDER.replace_all(source, |caps: &Captures<'_>| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });
    tracing::debug!("Rendered template {} ({} bytes)", name, rendered.len());
    Ok(rendered.into_owned())
}

/// Whether `key` can appear as a `<key>` token.
pub fn is_placeholder_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Placeholder keys referenced by `text`.
pub fn referenced_placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> Placeholders {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let out = render(
            "t",
            "server_name <domain>;\ncert /live/<domain>/fullchain.pem;",
            &values(&[("domain", "panel.example.com")]),
        )
        .unwrap();
        assert_eq!(
            out,
            "server_name panel.example.com;\ncert /live/panel.example.com/fullchain.pem;"
        );
    }

    #[test]
    fn test_missing_key_lists_all_missing() {
        let err = render("nginx.conf", "<domain> <php_socket> <domain>", &values(&[]))
            .unwrap_err();
        match err {
            ProvisionError::MissingPlaceholder { template, keys } => {
                assert_eq!(template, "nginx.conf");
                assert_eq!(keys, vec!["domain".to_string(), "php_socket".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extra_values_are_ignored() {
        let out = render("t", "no tokens here", &values(&[("domain", "x")])).unwrap();
        assert_eq!(out, "no tokens here");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let out = render("t", "<a>", &values(&[("a", "<b>")])).unwrap();
        assert_eq!(out, "<b>");
    }

    #[test]
    fn test_non_placeholder_angle_brackets_untouched() {
        let source = "if (a <= b) { x <Upper> <1st> }";
        assert!(referenced_placeholders(source).is_empty());
        assert_eq!(render("t", source, &values(&[])).unwrap(), source);
    }

    #[test]
    fn test_uppercase_key_is_rejected() {
        let err = render(
            "site.conf",
            "server_name <Domain>;",
            &values(&[("Domain", "panel.acme.test")]),
        )
        .unwrap_err();
        match err {
            ProvisionError::Validation(msg) => {
                assert!(msg.contains("site.conf"));
                assert!(msg.contains("Domain"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_hyphenated_key_is_rejected() {
        let err = render(
            "site.conf",
            "fastcgi_pass unix:<php-socket>;",
            &values(&[("php-socket", "/run/php/php8.3-fpm.sock"), ("domain", "x")]),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(ref msg) if msg.contains("php-socket") && !msg.contains("domain")));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_placeholder_names() {
        assert!(is_placeholder_name("php_socket"));
        assert!(is_placeholder_name("a1"));
        assert!(!is_placeholder_name(""));
        assert!(!is_placeholder_name("1st"));
        assert!(!is_placeholder_name("Domain"));
        assert!(!is_placeholder_name("php-socket"));
    }

    #[test]
    fn test_embedded_templates_reference_expected_keys() {
        let keys = |t: Template| t.placeholders().into_iter().collect::<Vec<_>>();
        assert_eq!(keys(NGINX_HTTP), vec!["domain", "panel_root", "php_socket"]);
        assert_eq!(keys(NGINX_SSL), vec!["domain", "panel_root", "php_socket"]);
        assert_eq!(keys(QUEUE_WORKER_UNIT), vec!["panel_root", "redis_service", "user"]);
        assert_eq!(keys(PHP_FPM_POOL), vec!["php_socket", "user"]);
    }

    #[test]
    fn test_queue_worker_unit_renders_fully() {
        let unit = QUEUE_WORKER_UNIT
            .render(&values(&[
                ("user", "www-data"),
                ("redis_service", "redis-server"),
                ("panel_root", "/var/www/pterodactyl"),
            ]))
            .unwrap();
        assert!(unit.contains("After=redis-server.service"));
        assert!(unit.contains("User=www-data"));
        assert!(unit.contains("Restart=always"));
        assert!(referenced_placeholders(&unit).is_empty());
    }
}
