//! Product patching policy
//!
//! A policy file maps base products to the advisory categories patched on
//! systems running them:
//!
//! ```text
//! # product friendly name, categories
//! SUSE Linux Enterprise Server 15 SP5 x86_64, security bugfix
//! SUSE Manager Proxy 4.3 x86_64, all
//! ```
//!
//! Tokens are `security`, `bugfix`, `product_enhancement` and `all`, in any
//! case. `all` makes the rest of the row irrelevant.

use super::operation::CategorySource;
use crate::input::split_fields;
use fleetkit::{AdvisoryType, Client, SystemId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("could not read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy file line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Base product name to advisory categories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPolicy {
    products: BTreeMap<String, Vec<AdvisoryType>>,
}

impl ProductPolicy {
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse policy content. Any malformed row fails the whole policy.
    pub fn parse(content: &str) -> Result<Self, PolicyError> {
        let mut products = BTreeMap::new();
        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let malformed = |reason: String| PolicyError::Malformed { line, reason };

            let fields = split_fields(trimmed);
            if fields.len() != 2 {
                return Err(malformed(format!(
                    "expected 'product, categories', found {} field(s)",
                    fields.len()
                )));
            }
            let product = fields[0].trim();
            if product.is_empty() {
                return Err(malformed("empty product name".to_string()));
            }
            let tokens: Vec<&str> = fields[1].split_whitespace().collect();
            if tokens.is_empty() {
                return Err(malformed(format!("no categories for '{product}'")));
            }

            let mut categories = Vec::new();
            for token in tokens {
                let category = AdvisoryType::from_token(token)
                    .ok_or_else(|| malformed(format!("unknown category '{token}'")))?;
                categories.push(category);
            }

            if products
                .insert(product.to_string(), normalize(&categories))
                .is_some()
            {
                log::warn!("Policy line {line}: '{product}' listed again, last entry wins");
            }
        }
        log::debug!("Loaded policy for {} product(s)", products.len());
        Ok(Self { products })
    }

    pub fn categories_for(&self, product: &str) -> Option<&[AdvisoryType]> {
        self.products.get(product).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Deduplicate categories keeping first-seen order. `All` absorbs the rest.
pub fn normalize(categories: &[AdvisoryType]) -> Vec<AdvisoryType> {
    if categories.contains(&AdvisoryType::All) {
        return vec![AdvisoryType::All];
    }
    let mut out = Vec::with_capacity(categories.len());
    for category in categories {
        if !out.contains(category) {
            out.push(*category);
        }
    }
    out
}

/// Categories to patch on one system. Empty means nothing to do.
pub fn resolve(
    client: &Client,
    name: &str,
    sid: SystemId,
    source: &CategorySource,
) -> fleetkit::Result<Vec<AdvisoryType>> {
    let policy = match source {
        CategorySource::Explicit(categories) => return Ok(normalize(categories)),
        CategorySource::Policy(policy) => policy,
    };

    let products = client.installed_products(sid)?;
    let Some(base) = products.iter().find(|p| p.is_base_product) else {
        log::warn!("System {name} has no base product");
        return Ok(Vec::new());
    };

    match policy.categories_for(&base.friendly_name) {
        Some(categories) => {
            log::debug!(
                "System {name} runs '{}', patching {categories:?}",
                base.friendly_name
            );
            Ok(categories.to_vec())
        }
        None => {
            log::warn!(
                "Product '{}' not found in policy file for system {name}",
                base.friendly_name
            );
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetkit::{Credentials, MemorySessionStore, MockBackend};

    const POLICY: &str = "\
# base products
SUSE Linux Enterprise Server 15 SP5 x86_64, security bugfix

SUSE Manager Proxy 4.3 x86_64, BugFix all security
SLES for SAP 15 SP4, product_enhancement security product_enhancement
";

    fn client(mock: &MockBackend) -> Client {
        let mut client =
            Client::with_backend(Box::new(mock.clone()), Box::new(MemorySessionStore::new()));
        client.login(&Credentials::new("admin", "admin")).unwrap();
        client
    }

    #[test]
    fn test_parse_policy() {
        let policy = ProductPolicy::parse(POLICY).unwrap();
        assert_eq!(policy.len(), 3);
        assert_eq!(
            policy.categories_for("SUSE Linux Enterprise Server 15 SP5 x86_64"),
            Some(&[AdvisoryType::Security, AdvisoryType::Bugfix][..])
        );
        assert_eq!(
            policy.categories_for("SUSE Manager Proxy 4.3 x86_64"),
            Some(&[AdvisoryType::All][..])
        );
        assert_eq!(
            policy.categories_for("SLES for SAP 15 SP4"),
            Some(&[AdvisoryType::ProductEnhancement, AdvisoryType::Security][..])
        );
        assert_eq!(policy.categories_for("Ubuntu 22.04"), None);
    }

    #[test]
    fn test_malformed_rows_fail_whole_policy() {
        let err = ProductPolicy::parse("SLES 15\n").unwrap_err();
        assert!(matches!(err, PolicyError::Malformed { line: 1, .. }));

        let err = ProductPolicy::parse("# ok\nSLES 15, security critical\n").unwrap_err();
        assert!(matches!(err, PolicyError::Malformed { line: 2, .. }));
        assert!(err.to_string().contains("critical"));

        assert!(ProductPolicy::parse("SLES 15,   \n").is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(&[AdvisoryType::Bugfix, AdvisoryType::Bugfix, AdvisoryType::Security]),
            vec![AdvisoryType::Bugfix, AdvisoryType::Security]
        );
        assert_eq!(
            normalize(&[AdvisoryType::Security, AdvisoryType::All]),
            vec![AdvisoryType::All]
        );
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_resolve_by_base_product() {
        let mut mock = MockBackend::new();
        mock.add_product(7, "sle-module-basesystem", false);
        mock.add_product(7, "SUSE Linux Enterprise Server 15 SP5 x86_64", true);
        let client = client(&mock);
        let source = CategorySource::Policy(ProductPolicy::parse(POLICY).unwrap());

        let categories = resolve(&client, "web01", 7, &source).unwrap();
        assert_eq!(categories, vec![AdvisoryType::Security, AdvisoryType::Bugfix]);
    }

    #[test]
    fn test_resolve_unknown_product_is_empty() {
        let mut mock = MockBackend::new();
        mock.add_product(7, "openSUSE Leap 15.5", true);
        mock.add_product(8, "sle-module-basesystem", false);
        let client = client(&mock);
        let source = CategorySource::Policy(ProductPolicy::parse(POLICY).unwrap());

        assert!(resolve(&client, "leap", 7, &source).unwrap().is_empty());
        assert!(resolve(&client, "no-base", 8, &source).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_explicit_skips_server() {
        let mock = MockBackend::new();
        let client = client(&mock);
        let source = CategorySource::Explicit(vec![AdvisoryType::Security]);

        assert_eq!(
            resolve(&client, "web01", 7, &source).unwrap(),
            vec![AdvisoryType::Security]
        );
        assert_eq!(mock.count(fleetkit::Method::SystemGetInstalledProducts), 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProductPolicy::load(Path::new("/nonexistent/policy.csv")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
