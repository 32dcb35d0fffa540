//! Domain name validation, canonicalization and dedup

use tracing::warn;

use crate::errors::AcmeError;
use crate::types::Domain;

/// Lowercases a domain and strips the trailing dot of its FQDN form.
pub fn canonical_domain(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_lowercase()
}

pub fn is_wildcard(name: &str) -> bool {
    name.starts_with("*.")
}

/// Canonicalizes and validates a certificate request, returning the full
/// name list with the main domain first.
///
/// A wildcard is only accepted as the complete leftmost label and may not
/// nest another wildcard.
pub fn validate_domain(domain: &Domain) -> Result<Vec<String>, AcmeError> {
    if domain.main.is_empty() {
        return Err(AcmeError::InvalidDomain {
            domain: String::new(),
            reason: "Main domain is empty".to_string(),
        });
    }
    let names: Vec<String> = domain
        .to_vec()
        .iter()
        .map(|name| canonical_domain(name))
        .collect();
    for name in &names {
        validate_name(name)?;
    }
    Ok(names)
}

fn validate_name(name: &str) -> Result<(), AcmeError> {
    let invalid = |reason: &str| {
        Err(AcmeError::InvalidDomain {
            domain: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return invalid("Domain is empty");
    }
    if let Some(rest) = name.strip_prefix("*.") {
        if rest.is_empty() {
            return invalid("Wildcard has no base domain");
        }
        if rest.contains('*') {
            return invalid("Only one wildcard label is allowed");
        }
    } else if name.contains('*') {
        return invalid("Wildcard is only allowed as the leftmost label");
    }
    Ok(())
}

/// Whether a certificate name covers a requested name.
///
/// Both sides are expected in canonical form. A wildcard matches exactly
/// one additional label, so `*.example.com` covers `www.example.com` but
/// neither `example.com` nor `a.b.example.com`.
pub fn domain_matches(name: &str, candidate: &str) -> bool {
    if name == candidate {
        return true;
    }
    if let Some(base) = name.strip_prefix("*.") {
        if let Some(prefix) = candidate.strip_suffix(base) {
            if let Some(label) = prefix.strip_suffix('.') {
                return !label.is_empty() && !label.contains('.') && !label.contains('*');
            }
        }
    }
    false
}

/// Drops names and whole certificate requests already covered by an
/// earlier request, keeping the configured order.
///
/// The result is canonical, so running it twice yields the same output.
pub fn dedup_domains(domains: &[Domain]) -> Vec<Domain> {
    let mut kept: Vec<Domain> = Vec::new();
    for domain in domains {
        let mut remaining: Vec<String> = Vec::new();
        for name in domain.to_vec() {
            let name = canonical_domain(&name);
            let covered = kept
                .iter()
                .flat_map(|kept_domain| kept_domain.to_vec())
                .chain(remaining.iter().cloned())
                .any(|earlier| domain_matches(&earlier, &name));
            if covered {
                warn!(
                    "Domain {} is already covered by an earlier certificate request, skipping",
                    name
                );
                continue;
            }
            remaining.push(name);
        }
        match remaining.split_first() {
            Some((main, sans)) => {
                kept.push(Domain::new(main.clone()).with_sans(sans.to_vec()));
            }
            None => {
                warn!(
                    "Certificate request for {} is fully covered by earlier requests, dropping it",
                    domain.main
                );
            }
        }
    }
    kept
}

/// True when the list pairs a wildcard with its own base domain, as in
/// `["*.example.com", "example.com"]`.
pub fn has_wildcard_with_root(names: &[String]) -> bool {
    names.iter().any(|name| {
        name.strip_prefix("*.")
            .map(|base| names.iter().any(|other| other == base))
            .unwrap_or(false)
    })
}
