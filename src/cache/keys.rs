//! Cache key definitions.
//!
//! Every key has the shape `{prefix}:{scope}:{namespace}:{discriminants}`.
//! Listing keys carry a digest of the canonical filter plus paging, sort and
//! locale; detail keys carry a slug or id plus locale. Free-text components
//! are percent-escaped, so the separators `:` and `=` only ever appear as
//! structure and a namespace or detail prefix never matches a sibling.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Filters nested deeper than this are refused instead of canonicalized.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Whether a key belongs to the public, shareable cache or to an admin view.
///
/// Admin keys exist so that admin and public queries can never collide, but
/// the read-through wrapper never reads or writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Public,
    Admin,
}

impl CacheScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "pub",
            Self::Admin => "adm",
        }
    }

    pub fn is_cacheable(self) -> bool {
        matches!(self, Self::Public)
    }
}

/// TTL buckets; the concrete durations live in [`super::CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    Listing,
    Detail,
    Reference,
    Session,
}

/// Logical grouping of cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Products,
    Product,
    Blogs,
    Blog,
    Categories,
    CategoryTree,
    Category,
    Brands,
    Brand,
    Cart,
}

impl Namespace {
    pub const ALL: [Namespace; 10] = [
        Namespace::Products,
        Namespace::Product,
        Namespace::Blogs,
        Namespace::Blog,
        Namespace::Categories,
        Namespace::CategoryTree,
        Namespace::Category,
        Namespace::Brands,
        Namespace::Brand,
        Namespace::Cart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Product => "product",
            Self::Blogs => "blogs",
            Self::Blog => "blog",
            Self::Categories => "categories",
            Self::CategoryTree => "category-tree",
            Self::Category => "category",
            Self::Brands => "brands",
            Self::Brand => "brand",
            Self::Cart => "cart",
        }
    }

    pub fn ttl_class(self) -> TtlClass {
        match self {
            Self::Products | Self::Blogs => TtlClass::Listing,
            Self::Product | Self::Blog | Self::Category | Self::Brand => TtlClass::Detail,
            Self::Categories | Self::CategoryTree | Self::Brands => TtlClass::Reference,
            Self::Cart => TtlClass::Session,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cache namespace `{0}`")]
pub struct UnknownNamespace(pub String);

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|ns| ns.as_str() == needle)
            .ok_or_else(|| UnknownNamespace(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageWindow {
    pub page: u32,
    pub limit: u32,
}

/// How a detail entry is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetailIdent {
    Slug(String),
    Id(String),
}

impl DetailIdent {
    fn render(&self) -> String {
        match self {
            Self::Slug(slug) => format!("slug={}", escape_component(slug)),
            Self::Id(id) => format!("id={}", escape_component(id)),
        }
    }
}

/// Discriminants of a logical query.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyParams {
    Listing {
        filter: Value,
        window: PageWindow,
        sort: Option<SortKey>,
        locale: Option<String>,
    },
    Detail {
        ident: DetailIdent,
        locale: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum KeySerializationError {
    #[error("filter could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("filter nesting exceeds {max} levels")]
    TooDeep { max: usize },
}

/// A fully rendered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    value: String,
    scope: CacheScope,
    namespace: Namespace,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn scope(&self) -> CacheScope {
        self.scope
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Builds keys and key prefixes for one deployment.
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    prefix: String,
}

impl KeyPolicy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build_key(
        &self,
        scope: CacheScope,
        namespace: Namespace,
        params: &KeyParams,
    ) -> Result<CacheKey, KeySerializationError> {
        let mut value = self.namespace_prefix(scope, namespace);
        match params {
            KeyParams::Listing {
                filter,
                window,
                sort,
                locale,
            } => {
                let digest = filter_digest(filter)?;
                let sort = sort
                    .as_ref()
                    .map(|sort| {
                        format!(
                            "{}.{}",
                            escape_component(&sort.field),
                            sort.direction.as_str()
                        )
                    })
                    .unwrap_or_else(|| "-".to_string());
                value.push_str(&format!(
                    "f={digest}:p={}:l={}:s={sort}:loc={}",
                    window.page,
                    window.limit,
                    render_locale(locale.as_deref())
                ));
            }
            KeyParams::Detail { ident, locale } => {
                value.push_str(&ident.render());
                value.push_str(":loc=");
                value.push_str(&render_locale(locale.as_deref()));
            }
        }

        Ok(CacheKey {
            value,
            scope,
            namespace,
        })
    }

    /// Listing key for any serializable filter.
    pub fn listing<F: Serialize + ?Sized>(
        &self,
        scope: CacheScope,
        namespace: Namespace,
        filter: &F,
        window: PageWindow,
        sort: Option<&SortKey>,
        locale: Option<&str>,
    ) -> Result<CacheKey, KeySerializationError> {
        let params = KeyParams::Listing {
            filter: serde_json::to_value(filter)?,
            window,
            sort: sort.cloned(),
            locale: locale.map(str::to_string),
        };
        self.build_key(scope, namespace, &params)
    }

    pub fn detail(
        &self,
        scope: CacheScope,
        namespace: Namespace,
        ident: DetailIdent,
        locale: Option<&str>,
    ) -> CacheKey {
        let mut value = self.detail_prefix(scope, namespace, &ident);
        value.push_str("loc=");
        value.push_str(&render_locale(locale));
        CacheKey {
            value,
            scope,
            namespace,
        }
    }

    /// Prefix matching every key of a namespace within a scope.
    pub fn namespace_prefix(&self, scope: CacheScope, namespace: Namespace) -> String {
        format!("{}:{}:{}:", self.prefix, scope.as_str(), namespace.as_str())
    }

    /// Prefix matching all locale variants of one detail entry.
    pub fn detail_prefix(
        &self,
        scope: CacheScope,
        namespace: Namespace,
        ident: &DetailIdent,
    ) -> String {
        format!(
            "{}{}:",
            self.namespace_prefix(scope, namespace),
            ident.render()
        )
    }
}

/// Hex SHA-256 of the canonical form of `filter`.
pub fn filter_digest(filter: &Value) -> Result<String, KeySerializationError> {
    let canonical = canonical_json(filter)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Renders `value` with sorted object keys and `null` members dropped.
pub fn canonical_json(value: &Value) -> Result<String, KeySerializationError> {
    let mut out = String::new();
    write_canonical(value, 0, &mut out)?;
    Ok(out)
}

fn write_canonical(
    value: &Value,
    depth: usize,
    out: &mut String,
) -> Result<(), KeySerializationError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(KeySerializationError::TooDeep {
            max: MAX_FILTER_DEPTH,
        });
    }

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => out.push_str(&value.to_string()),
        Value::String(text) => out.push_str(&serde_json::to_string(text)?),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, depth + 1, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> =
                map.iter().filter(|(_, value)| !value.is_null()).collect();
            members.sort_by(|left, right| left.0.cmp(right.0));

            out.push('{');
            for (index, (name, member)) in members.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                write_canonical(member, depth + 1, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn render_locale(locale: Option<&str>) -> String {
    match locale.map(str::trim).filter(|locale| !locale.is_empty()) {
        Some(locale) => escape_component(&locale.to_ascii_lowercase()),
        None => "-".to_string(),
    }
}

/// Percent-escapes every byte outside `[A-Za-z0-9._~-]`.
///
/// Covers the key separators and the glob metacharacters used by
/// prefix scans, and keeps the mapping injective.
pub fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet};

    use serde_json::json;

    use super::*;

    fn policy() -> KeyPolicy {
        KeyPolicy::new("sf")
    }

    fn window(page: u32, limit: u32) -> PageWindow {
        PageWindow { page, limit }
    }

    #[derive(Serialize)]
    struct ProductFilter<'a> {
        category: Option<&'a str>,
        brand: Option<&'a str>,
        min_price: Option<u64>,
    }

    #[test]
    fn insertion_order_does_not_change_key() {
        let mut forward = HashMap::new();
        forward.insert("category", json!("solar-panels"));
        forward.insert("brand", json!("sunco"));
        forward.insert("nested", json!({"b": 1, "a": [1, {"z": true, "y": null}]}));

        let mut backward = BTreeMap::new();
        backward.insert("nested", json!({"a": [1, {"z": true}], "b": 1}));
        backward.insert("brand", json!("sunco"));
        backward.insert("category", json!("solar-panels"));

        let a = policy()
            .listing(
                CacheScope::Public,
                Namespace::Products,
                &forward,
                window(1, 20),
                None,
                Some("en"),
            )
            .expect("key");
        let b = policy()
            .listing(
                CacheScope::Public,
                Namespace::Products,
                &backward,
                window(1, 20),
                None,
                Some("EN"),
            )
            .expect("key");
        assert_eq!(a, b);
    }

    #[test]
    fn struct_and_map_filters_agree_once_nulls_are_dropped() {
        let typed = ProductFilter {
            category: Some("solar-panels"),
            brand: None,
            min_price: Some(1_000),
        };
        let loose = json!({"min_price": 1000, "category": "solar-panels"});

        let a = policy()
            .listing(CacheScope::Public, Namespace::Products, &typed, window(2, 10), None, None)
            .expect("key");
        let b = policy()
            .listing(CacheScope::Public, Namespace::Products, &loose, window(2, 10), None, None)
            .expect("key");
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn listing_key_layout() {
        let key = policy()
            .listing(
                CacheScope::Public,
                Namespace::Products,
                &json!({}),
                window(3, 25),
                Some(&SortKey::new("price", SortDirection::Desc)),
                Some("fr"),
            )
            .expect("key");
        let digest = filter_digest(&json!({})).expect("digest");
        assert_eq!(
            key.as_str(),
            format!("sf:pub:products:f={digest}:p=3:l=25:s=price.desc:loc=fr")
        );
        assert_eq!(key.namespace(), Namespace::Products);
        assert_eq!(key.scope(), CacheScope::Public);
    }

    #[test]
    fn distinct_queries_yield_distinct_keys() {
        let filters = [
            json!({}),
            json!({"category": "solar-panels"}),
            json!({"category": "solar-panels", "brand": "sunco"}),
            json!({"search": "panel"}),
        ];
        let sorts = [
            None,
            Some(SortKey::new("price", SortDirection::Asc)),
            Some(SortKey::new("price", SortDirection::Desc)),
        ];
        let locales = [None, Some("en"), Some("de")];

        let mut seen = HashSet::new();
        let mut count = 0;
        for scope in [CacheScope::Public, CacheScope::Admin] {
            for namespace in [Namespace::Products, Namespace::Blogs] {
                for filter in &filters {
                    for (page, limit) in [(1, 20), (2, 20), (1, 50)] {
                        for sort in &sorts {
                            for locale in locales {
                                let key = policy()
                                    .listing(
                                        scope,
                                        namespace,
                                        filter,
                                        window(page, limit),
                                        sort.as_ref(),
                                        locale,
                                    )
                                    .expect("key");
                                seen.insert(key.as_str().to_string());
                                count += 1;
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), count);
    }

    #[test]
    fn detail_prefix_covers_every_locale_but_not_siblings() {
        let policy = policy();
        let prefix = policy.detail_prefix(
            CacheScope::Public,
            Namespace::Product,
            &DetailIdent::Slug("panel".into()),
        );

        for locale in [None, Some("en"), Some("de")] {
            let key = policy.detail(
                CacheScope::Public,
                Namespace::Product,
                DetailIdent::Slug("panel".into()),
                locale,
            );
            assert!(key.as_str().starts_with(&prefix));
        }

        let sibling = policy.detail(
            CacheScope::Public,
            Namespace::Product,
            DetailIdent::Slug("panel-xl".into()),
            None,
        );
        assert!(!sibling.as_str().starts_with(&prefix));

        let listing_prefix = policy.namespace_prefix(CacheScope::Public, Namespace::Products);
        assert!(!sibling.as_str().starts_with(&listing_prefix));
    }

    #[test]
    fn separators_in_slugs_are_escaped() {
        let policy = policy();
        let tricky = policy.detail(
            CacheScope::Public,
            Namespace::Blog,
            DetailIdent::Slug("a:loc=en".into()),
            None,
        );
        let plain = policy.detail(
            CacheScope::Public,
            Namespace::Blog,
            DetailIdent::Slug("a".into()),
            Some("en"),
        );
        assert_ne!(tricky, plain);
        assert_eq!(tricky.as_str(), "sf:pub:blog:slug=a%3Aloc%3Den:loc=-");
        assert_eq!(escape_component("50%*"), "50%25%2A");
    }

    #[test]
    fn scope_separates_admin_from_public() {
        let policy = policy();
        let public = policy
            .listing(CacheScope::Public, Namespace::Products, &json!({}), window(1, 20), None, None)
            .expect("key");
        let admin = policy
            .listing(CacheScope::Admin, Namespace::Products, &json!({}), window(1, 20), None, None)
            .expect("key");
        assert_ne!(public, admin);
        assert!(admin.as_str().starts_with("sf:adm:"));
    }

    #[test]
    fn overly_nested_filter_is_rejected() {
        let mut value = json!("leaf");
        for _ in 0..=MAX_FILTER_DEPTH {
            value = json!({ "n": value });
        }
        let err = policy()
            .listing(CacheScope::Public, Namespace::Products, &value, window(1, 20), None, None)
            .expect_err("depth should be rejected");
        assert!(matches!(err, KeySerializationError::TooDeep { .. }));
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let mut filter = HashMap::new();
        filter.insert((1, 2), "x");
        let err = policy()
            .listing(CacheScope::Public, Namespace::Products, &filter, window(1, 20), None, None)
            .expect_err("tuple keys cannot become JSON object keys");
        assert!(matches!(err, KeySerializationError::Serialize(_)));
    }

    #[test]
    fn namespaces_parse_from_cli_names() {
        assert_eq!("category-tree".parse::<Namespace>(), Ok(Namespace::CategoryTree));
        assert_eq!(" Products ".parse::<Namespace>(), Ok(Namespace::Products));
        assert!("widgets".parse::<Namespace>().is_err());
    }
}
