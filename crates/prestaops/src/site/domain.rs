//! Shop URL records and the staging domain rewrite.

use serde::Serialize;

/// One row of the destination `shop_url` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopDomainRecord {
    pub id: u32,
    pub domain: String,
    pub domain_ssl: String,
    pub physical_uri: String,
    pub virtual_uri: String,
}

impl ShopDomainRecord {
    /// The record as it should look on the staging copy, or `None` when it
    /// already carries the suffix.
    pub fn with_staging_suffix(&self, suffix: &str) -> Option<ShopDomainRecord> {
        let domain = staging_domain(&self.domain, suffix)?;
        Some(ShopDomainRecord {
            id: self.id,
            domain_ssl: domain.clone(),
            domain,
            physical_uri: "/".to_string(),
            virtual_uri: String::new(),
        })
    }
}

/// Rewrite `domain` under the staging `suffix`.
///
/// The existing suffix is stripped, the top-level label is dropped and the
/// remaining labels are concatenated before `.{suffix}` is appended:
/// `shop.example.com` under `staging.example.com` becomes
/// `shopexample.staging.example.com`. Matching ignores ASCII case and the
/// result is lowercase.
///
/// Returns `None` when the domain already ends with the suffix or nothing
/// is left to build a label from; [`already_suffixed`] tells the two apart.
pub fn staging_domain(domain: &str, suffix: &str) -> Option<String> {
    let suffix = normalize_suffix(suffix);
    let domain = domain.trim().to_ascii_lowercase();
    if suffix.is_empty() || domain.ends_with(&suffix) {
        return None;
    }

    let stripped = domain.replace(&suffix, "");
    let base = stripped.trim_matches(|c| c == '.' || c == '-');
    let base = match base.rsplit_once('.') {
        Some((labels, _tld)) => labels,
        None => base,
    };
    let label: String = base.chars().filter(|c| *c != '.').collect();

    if label.is_empty() {
        return None;
    }
    Some(format!("{}.{}", label, suffix))
}

/// Whether `domain` already ends with `suffix`, ignoring ASCII case.
pub fn already_suffixed(domain: &str, suffix: &str) -> bool {
    let suffix = normalize_suffix(suffix);
    !suffix.is_empty() && domain.trim().to_ascii_lowercase().ends_with(&suffix)
}

fn normalize_suffix(suffix: &str) -> String {
    suffix.trim().trim_matches('.').to_ascii_lowercase()
}
