//! Query optimizer
//!
//! Pure rewriting of gateway operations before they reach the upstream:
//!
//! - **Field expansion** - relation fields pull their common related columns
//!   in the same round trip, avoiding follow-up reads per row.
//! - **Predicate reordering** - the upstream evaluates domains left to
//!   right, so leaves on indexed columns are moved to the front. Operator
//!   positions are preserved.
//! - **Limit clamping** - per-operation ceilings bound response size.
//! - **Cache policy** - which operations cache, for how long, under which
//!   key, and which patterns a write invalidates.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::newtypes::TenantId;
use super::operation::{OperationKind, CACHEABLE_OPERATIONS};
use super::predicate::{DomainTerm, SearchDomain};

/// Related columns fetched alongside common relation fields
const RELATION_FIELDS: &[(&str, &[&str])] = &[
    ("partner_id", &["partner_id.name", "partner_id.email", "partner_id.phone", "partner_id.vat"]),
    ("user_id", &["user_id.name", "user_id.email", "user_id.login"]),
    ("company_id", &["company_id.name", "company_id.currency_id"]),
    ("product_id", &["product_id.name", "product_id.default_code", "product_id.barcode"]),
    ("category_id", &["category_id.name", "category_id.complete_name"]),
    ("product_tmpl_id", &["product_tmpl_id.name", "product_tmpl_id.default_code"]),
    ("warehouse_id", &["warehouse_id.name", "warehouse_id.code"]),
    ("location_id", &["location_id.name", "location_id.complete_name"]),
    ("picking_type_id", &["picking_type_id.name", "picking_type_id.code"]),
    ("currency_id", &["currency_id.name", "currency_id.symbol"]),
    ("pricelist_id", &["pricelist_id.name", "pricelist_id.currency_id"]),
    ("sale_order_id", &["sale_order_id.name", "sale_order_id.state"]),
    ("purchase_order_id", &["purchase_order_id.name", "purchase_order_id.state"]),
    ("invoice_id", &["invoice_id.name", "invoice_id.state"]),
    ("account_id", &["account_id.name", "account_id.code"]),
    ("journal_id", &["journal_id.name", "journal_id.code"]),
    ("tax_id", &["tax_id.name", "tax_id.amount"]),
    ("state_id", &["state_id.name", "state_id.code"]),
    ("country_id", &["country_id.name", "country_id.code"]),
];

/// Columns the upstream keeps indexed; leaves on these go first
const INDEXED_FIELDS: &[&str] = &[
    "id",
    "create_date",
    "write_date",
    "name",
    "active",
    "state",
    "company_id",
];

/// Default order injected when a search caller supplies none
pub const DEFAULT_ORDER: &str = "id DESC";

/// Length of the hex fingerprint embedded in cache keys
const FINGERPRINT_LEN: usize = 16;

/// Expand relation fields with their common related columns
///
/// `None` (all fields) stays `None`. The result is deduplicated; order is
/// irrelevant to the upstream.
pub fn optimize_fields(_model: &str, fields: Option<&[String]>) -> Option<Vec<String>> {
    let fields = fields?;
    if fields.is_empty() {
        return None;
    }

    let mut expanded: Vec<String> = fields.to_vec();
    for field in fields {
        if let Some((_, related)) = RELATION_FIELDS.iter().find(|(name, _)| name == field) {
            for rel in *related {
                if !expanded.iter().any(|f| f == rel) {
                    expanded.push((*rel).to_string());
                }
            }
        }
    }
    expanded.sort();
    expanded.dedup();
    Some(expanded)
}

/// Reorder a domain so indexed-column leaves come first
///
/// Operators keep their positions at the front of the reconstructed list,
/// then indexed leaves, then the rest, each group in original order.
#[must_use]
pub fn optimize_domain(domain: &SearchDomain) -> SearchDomain {
    if domain.is_empty() {
        return SearchDomain::empty();
    }

    let mut operators = Vec::new();
    let mut indexed = Vec::new();
    let mut others = Vec::new();

    for term in &domain.0 {
        match term {
            DomainTerm::Operator(_) => operators.push(term.clone()),
            DomainTerm::Leaf { field, .. } if INDEXED_FIELDS.contains(&field.as_str()) => {
                indexed.push(term.clone());
            }
            DomainTerm::Leaf { .. } => others.push(term.clone()),
        }
    }

    let mut optimized = operators;
    optimized.extend(indexed);
    optimized.extend(others);
    SearchDomain(optimized)
}

/// Per-operation result-size ceiling, `None` for unbounded operations
#[must_use]
pub fn max_limit(op: OperationKind) -> Option<u32> {
    match op {
        OperationKind::SearchRead | OperationKind::WebSearchRead => Some(200),
        OperationKind::Read => Some(100),
        OperationKind::Search => Some(500),
        OperationKind::NameSearch => Some(50),
        _ => None,
    }
}

/// Clamp a requested limit to the operation's ceiling
///
/// A missing limit becomes the ceiling itself; unbounded operations pass
/// the request through.
#[must_use]
pub fn clamp_limit(op: OperationKind, requested: Option<u32>) -> Option<u32> {
    match max_limit(op) {
        None => requested,
        Some(ceiling) => Some(requested.map_or(ceiling, |r| r.min(ceiling))),
    }
}

/// Cache TTL in seconds for a cacheable operation
#[must_use]
pub fn cache_ttl(op: OperationKind) -> u64 {
    match op {
        OperationKind::FieldsGet => 3600,
        OperationKind::NameSearch | OperationKind::NameGet => 600,
        _ => 300,
    }
}

/// Build the deterministic cache key for an operation
///
/// The fingerprint input is canonicalized (object keys sorted recursively),
/// serialized, and hashed; the key embeds tenant, operation, and model so
/// invalidation can target them with a glob.
pub fn cache_key(tenant: &TenantId, op: OperationKind, model: &str, fingerprint_input: &Value) -> String {
    let canonical = canonicalize(fingerprint_input);
    let serialized = canonical.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    let mut hex = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("op:{tenant}:{}:{model}:{hex}", op.as_str())
}

/// Wildcard keys a write on `(tenant, model)` must evict
///
/// One pattern per cacheable read operation, covering every fingerprint.
pub fn invalidation_patterns(tenant: &TenantId, model: &str) -> Vec<String> {
    CACHEABLE_OPERATIONS
        .iter()
        .map(|op| format!("op:{tenant}:{}:{model}:*", op.as_str()))
        .collect()
}

/// Recursively sort object keys so equal values serialize identically
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_optimize_fields_none_means_all() {
        assert!(optimize_fields("res.partner", None).is_none());
        assert!(optimize_fields("res.partner", Some(&[])).is_none());
    }

    #[test]
    fn test_optimize_fields_expands_relations() {
        let result = optimize_fields("sale.order", Some(&fields(&["name", "partner_id"]))).unwrap();
        assert!(result.contains(&"partner_id.name".to_string()));
        assert!(result.contains(&"partner_id.email".to_string()));
        assert!(result.contains(&"name".to_string()));
    }

    #[test]
    fn test_optimize_fields_idempotent() {
        let once = optimize_fields("sale.order", Some(&fields(&["partner_id", "user_id"]))).unwrap();
        let twice = optimize_fields("sale.order", Some(&once)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_optimize_domain_moves_indexed_first() {
        let domain = SearchDomain::from_json(&json!([
            ["email", "ilike", "@example.com"],
            ["id", ">", 100],
            "|",
            ["active", "=", true],
            ["phone", "!=", false]
        ]))
        .unwrap();

        let optimized = optimize_domain(&domain);
        let rendered = optimized.to_json();
        let arr = rendered.as_array().unwrap();
        // Operator first, then the indexed leaves, then the rest
        assert_eq!(arr[0], json!("|"));
        assert_eq!(arr[1], json!(["id", ">", 100]));
        assert_eq!(arr[2], json!(["active", "=", true]));
        assert_eq!(arr[3], json!(["email", "ilike", "@example.com"]));
    }

    #[test]
    fn test_optimize_domain_idempotent() {
        let domain = SearchDomain::from_json(&json!([
            ["email", "ilike", "x"],
            ["id", ">", 1],
            "&",
            ["state", "=", "done"]
        ]))
        .unwrap();
        let once = optimize_domain(&domain);
        let twice = optimize_domain(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clamp_limit_ceilings() {
        assert_eq!(clamp_limit(OperationKind::SearchRead, Some(1000)), Some(200));
        assert_eq!(clamp_limit(OperationKind::SearchRead, None), Some(200));
        assert_eq!(clamp_limit(OperationKind::SearchRead, Some(10)), Some(10));
        assert_eq!(clamp_limit(OperationKind::Read, Some(500)), Some(100));
        assert_eq!(clamp_limit(OperationKind::Search, None), Some(500));
        assert_eq!(clamp_limit(OperationKind::NameSearch, Some(80)), Some(50));
        // Unbounded operations pass through
        assert_eq!(clamp_limit(OperationKind::SearchCount, Some(9999)), Some(9999));
        assert_eq!(clamp_limit(OperationKind::WebRead, Some(500)), Some(500));
        assert_eq!(clamp_limit(OperationKind::FieldsGet, None), None);
    }

    #[test]
    fn test_cache_ttls() {
        assert_eq!(cache_ttl(OperationKind::FieldsGet), 3600);
        assert_eq!(cache_ttl(OperationKind::NameSearch), 600);
        assert_eq!(cache_ttl(OperationKind::NameGet), 600);
        assert_eq!(cache_ttl(OperationKind::SearchRead), 300);
        assert_eq!(cache_ttl(OperationKind::Read), 300);
    }

    #[test]
    fn test_cache_key_deterministic_across_key_order() {
        let tenant = TenantId::new();
        let a = cache_key(
            &tenant,
            OperationKind::SearchRead,
            "res.partner",
            &json!({"domain": [["id", ">", 1]], "fields": ["name"], "limit": 10}),
        );
        let b = cache_key(
            &tenant,
            OperationKind::SearchRead,
            "res.partner",
            &json!({"limit": 10, "fields": ["name"], "domain": [["id", ">", 1]]}),
        );
        assert_eq!(a, b);
        assert!(a.starts_with(&format!("op:{tenant}:search_read:res.partner:")));
        assert_eq!(a.rsplit(':').next().unwrap().len(), 16);
    }

    #[test]
    fn test_cache_key_differs_on_input() {
        let tenant = TenantId::new();
        let a = cache_key(&tenant, OperationKind::Read, "res.partner", &json!({"ids": [1]}));
        let b = cache_key(&tenant, OperationKind::Read, "res.partner", &json!({"ids": [2]}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalidation_patterns_cover_all_reads() {
        let tenant = TenantId::new();
        let patterns = invalidation_patterns(&tenant, "res.partner");
        assert_eq!(patterns.len(), 9);
        assert!(patterns
            .iter()
            .any(|p| p == &format!("op:{tenant}:search_read:res.partner:*")));
        assert!(patterns.iter().all(|p| p.ends_with(":res.partner:*")));
    }
}
