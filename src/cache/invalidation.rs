//! Invalidation coordinator.
//!
//! Mutations are expanded into key prefixes through a declarative rule table
//! ([`InvalidationRules`]) and purged synchronously, before the mutating
//! request responds. Purge failures are collected in the report and logged;
//! they never fail the mutation, and the affected entries age out by TTL.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::keys::{CacheScope, DetailIdent, KeyPolicy, Namespace};
use super::registry::CacheRegistry;
use super::store::{GuardedStore, PrefixPurge};

pub(crate) const METRIC_INVALIDATION_TOTAL: &str = "storefront_cache_invalidation_total";
pub(crate) const METRIC_INVALIDATION_FAILURE_TOTAL: &str =
    "storefront_cache_invalidation_failure_total";
pub(crate) const METRIC_INVALIDATION_MS: &str = "storefront_cache_invalidation_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    Blog,
    Category,
    Brand,
    Promotion,
    Cart,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Blog => "blog",
            Self::Category => "category",
            Self::Brand => "brand",
            Self::Promotion => "promotion",
            Self::Cart => "cart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// An entity addressed by id and by every slug it had or has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
    pub slugs: Vec<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
            slugs: Vec::new(),
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        if !self.slugs.contains(&slug) {
            self.slugs.push(slug);
        }
        self
    }

    fn detail_idents(&self) -> impl Iterator<Item = DetailIdent> + '_ {
        std::iter::once(DetailIdent::Id(self.id.clone()))
            .chain(self.slugs.iter().cloned().map(DetailIdent::Slug))
    }
}

/// A committed origin write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub subject: EntityRef,
    pub kind: MutationKind,
    pub relations: Vec<EntityRef>,
}

impl Mutation {
    pub fn new(entity: EntityKind, kind: MutationKind, id: impl ToString) -> Self {
        Self {
            subject: EntityRef::new(entity, id),
            kind,
            relations: Vec::new(),
        }
    }

    /// Adds a slug of the subject; pass both old and new slugs on rename.
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.subject = self.subject.with_slug(slug);
        self
    }

    pub fn with_relation(mut self, relation: EntityRef) -> Self {
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        self
    }

    pub fn with_relations(self, relations: impl IntoIterator<Item = EntityRef>) -> Self {
        relations
            .into_iter()
            .fold(self, |mutation, relation| mutation.with_relation(relation))
    }

    fn related(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRef> {
        self.relations
            .iter()
            .filter(move |relation| relation.kind == kind)
    }
}

/// One target of a rule, expanded against a concrete mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTemplate {
    /// Every locale variant of the subject's detail entry, by id and slug.
    SubjectDetail(Namespace),
    /// The whole namespace.
    Listing(Namespace),
    /// The whole namespace, when the mutation carries a relation of this kind.
    ListingIfRelated {
        relation: EntityKind,
        namespace: Namespace,
    },
    /// Detail entries of every related entity of this kind.
    RelatedDetail {
        relation: EntityKind,
        namespace: Namespace,
    },
}

/// Entity kind → key templates.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRules {
    rules: HashMap<EntityKind, Vec<KeyTemplate>>,
}

impl InvalidationRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The storefront's rule table.
    pub fn standard() -> Self {
        use KeyTemplate::*;

        Self::empty()
            .with_rule(
                EntityKind::Product,
                vec![
                    SubjectDetail(Namespace::Product),
                    Listing(Namespace::Products),
                    ListingIfRelated {
                        relation: EntityKind::Blog,
                        namespace: Namespace::Blogs,
                    },
                    // Blog detail pages embed snippets of their products.
                    RelatedDetail {
                        relation: EntityKind::Blog,
                        namespace: Namespace::Blog,
                    },
                    Listing(Namespace::Cart),
                ],
            )
            .with_rule(
                EntityKind::Blog,
                vec![
                    SubjectDetail(Namespace::Blog),
                    Listing(Namespace::Blogs),
                    RelatedDetail {
                        relation: EntityKind::Product,
                        namespace: Namespace::Product,
                    },
                ],
            )
            .with_rule(
                EntityKind::Category,
                vec![
                    SubjectDetail(Namespace::Category),
                    Listing(Namespace::Categories),
                    Listing(Namespace::CategoryTree),
                ],
            )
            .with_rule(
                EntityKind::Brand,
                vec![SubjectDetail(Namespace::Brand), Listing(Namespace::Brands)],
            )
            .with_rule(
                EntityKind::Promotion,
                vec![
                    RelatedDetail {
                        relation: EntityKind::Product,
                        namespace: Namespace::Product,
                    },
                    Listing(Namespace::Products),
                    // Blog views carry discounted prices in their product snippets.
                    ListingIfRelated {
                        relation: EntityKind::Blog,
                        namespace: Namespace::Blogs,
                    },
                    RelatedDetail {
                        relation: EntityKind::Blog,
                        namespace: Namespace::Blog,
                    },
                    Listing(Namespace::Cart),
                ],
            )
            .with_rule(EntityKind::Cart, vec![SubjectDetail(Namespace::Cart)])
    }

    /// Replaces the templates for `entity`.
    pub fn with_rule(mut self, entity: EntityKind, templates: Vec<KeyTemplate>) -> Self {
        self.rules.insert(entity, templates);
        self
    }

    pub fn templates_for(&self, entity: EntityKind) -> &[KeyTemplate] {
        self.rules.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Expands `mutation` into the public prefixes it invalidates.
    pub fn plan(&self, policy: &KeyPolicy, mutation: &Mutation) -> InvalidationPlan {
        let scope = CacheScope::Public;
        let mut prefixes = BTreeSet::new();

        for template in self.templates_for(mutation.subject.kind) {
            match *template {
                KeyTemplate::SubjectDetail(namespace) => {
                    for ident in mutation.subject.detail_idents() {
                        prefixes.insert(policy.detail_prefix(scope, namespace, &ident));
                    }
                }
                KeyTemplate::Listing(namespace) => {
                    prefixes.insert(policy.namespace_prefix(scope, namespace));
                }
                KeyTemplate::ListingIfRelated {
                    relation,
                    namespace,
                } => {
                    if mutation.related(relation).next().is_some() {
                        prefixes.insert(policy.namespace_prefix(scope, namespace));
                    }
                }
                KeyTemplate::RelatedDetail {
                    relation,
                    namespace,
                } => {
                    for related in mutation.related(relation) {
                        for ident in related.detail_idents() {
                            prefixes.insert(policy.detail_prefix(scope, namespace, &ident));
                        }
                    }
                }
            }
        }

        InvalidationPlan::from_prefixes(prefixes)
    }
}

/// Deduplicated prefixes to purge; prefixes covered by a shorter one are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    prefixes: Vec<String>,
}

impl InvalidationPlan {
    fn from_prefixes(sorted: BTreeSet<String>) -> Self {
        let mut prefixes: Vec<String> = Vec::with_capacity(sorted.len());
        for prefix in sorted {
            // A covering prefix sorts before everything it covers.
            if prefixes
                .last()
                .is_some_and(|covering| prefix.starts_with(covering.as_str()))
            {
                continue;
            }
            prefixes.push(prefix);
        }
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidationPlan {{ prefixes: [{}] }}", self.prefixes.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Prefixes the plan targeted.
    pub targeted: usize,
    /// Entries removed, as reported by the backend.
    pub deleted: u64,
    /// Prefixes or keys whose purge failed; these stay stale until TTL.
    pub failed: Vec<String>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct InvalidationCoordinator {
    store: GuardedStore,
    registry: Arc<CacheRegistry>,
    policy: Arc<KeyPolicy>,
    rules: InvalidationRules,
}

impl InvalidationCoordinator {
    pub fn new(
        store: GuardedStore,
        registry: Arc<CacheRegistry>,
        policy: Arc<KeyPolicy>,
        rules: InvalidationRules,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            rules,
        }
    }

    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    /// Purges every entry affected by `mutation`.
    #[instrument(
        skip_all,
        fields(
            entity = mutation.subject.kind.as_str(),
            mutation = mutation.kind.as_str(),
            id = %mutation.subject.id
        )
    )]
    pub async fn invalidate(&self, mutation: &Mutation) -> InvalidationReport {
        let plan = self.rules.plan(&self.policy, mutation);
        debug!(%plan, "Invalidation planned");
        let entity = mutation.subject.kind.as_str();
        self.execute(&plan, entity).await
    }

    /// Purges a whole public namespace; used by the operator command.
    #[instrument(skip_all, fields(namespace = namespace.as_str()))]
    pub async fn purge_namespace(&self, namespace: Namespace) -> InvalidationReport {
        let prefix = self.policy.namespace_prefix(CacheScope::Public, namespace);
        let plan = InvalidationPlan::from_prefixes(BTreeSet::from([prefix]));
        self.execute(&plan, "namespace").await
    }

    async fn execute(&self, plan: &InvalidationPlan, entity: &'static str) -> InvalidationReport {
        let started_at = Instant::now();
        let mut report = InvalidationReport {
            targeted: plan.prefixes().len(),
            ..Default::default()
        };

        for prefix in plan.prefixes() {
            match self.store.delete_by_prefix(prefix).await {
                PrefixPurge::Deleted(count) => {
                    report.deleted += count;
                    self.registry.forget_prefix(prefix);
                }
                PrefixPurge::Unsupported => {
                    for key in self.registry.keys_with_prefix(prefix) {
                        if self.store.delete(&key).await {
                            report.deleted += 1;
                            self.registry.forget(&key);
                        } else {
                            report.failed.push(key);
                        }
                    }
                }
                PrefixPurge::Failed => report.failed.push(prefix.clone()),
            }
        }

        counter!(METRIC_INVALIDATION_TOTAL, "entity" => entity).increment(1);
        histogram!(METRIC_INVALIDATION_MS, "entity" => entity)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        if report.is_complete() {
            info!(
                targeted = report.targeted,
                deleted = report.deleted,
                "Cache invalidation complete"
            );
        } else {
            counter!(METRIC_INVALIDATION_FAILURE_TOTAL, "entity" => entity)
                .increment(report.failed.len() as u64);
            warn!(
                targeted = report.targeted,
                deleted = report.deleted,
                failed = ?report.failed,
                result = "partial",
                hint = "failed entries stay stale until their TTL expires",
                "Cache invalidation incomplete"
            );
        }
        report
    }
}
