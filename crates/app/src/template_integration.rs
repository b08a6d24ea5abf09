//! The `template` integration: turns configuration entries into template
//! entities, either written out directly or instantiated from a blueprint.
//!
//! ```toml
//! [[template]]
//! name = "Inverted foo"
//! use_blueprint = { path = "inverted_binary_sensor.toml", input = { original_entity = "binary_sensor.foo" } }
//!
//! [[template]]
//! sensor = [{ name = "Doubled", state = "{{ states('sensor.x') | float * 2 }}" }]
//! ```

use std::future::Future;
use std::sync::Arc;

use tmplhub_domain::document::{Document, Mapping};
use tmplhub_domain::error::TmplHubError;
use tmplhub_domain::id::EntityId;
use tmplhub_domain::schema::{self, DocPath, MappingSchema, Schema, SchemaError, SchemaErrorKind};
use tmplhub_domain::template_entity::{Platform, TemplateEntityConfig};

use crate::blueprint_store::BlueprintStore;
use crate::ports::{BlueprintSource, Integration, SetupReport, StateBus};
use crate::runtime::TemplateRuntime;

/// Blueprint domain served by this integration.
pub const DOMAIN: &str = "template";

fn platform_keys() -> impl Iterator<Item = &'static str> {
    Platform::ALL.into_iter().map(Platform::as_str)
}

/// Schema of one integration entry.
#[must_use]
pub fn entry_schema() -> Schema {
    let use_blueprint = MappingSchema::new()
        .required("path", Schema::String)
        .with_default("input", Schema::map(Schema::Any), Mapping::new());
    let mut schema = MappingSchema::new()
        .optional("use_blueprint", use_blueprint.into())
        .optional("name", Schema::String)
        .optional("unique_id", Schema::String)
        .optional("variables", Schema::map(Schema::Any));
    for key in platform_keys() {
        schema = schema
            .optional(key, Schema::list(Schema::Any))
            .exclusive(["use_blueprint", key]);
    }
    schema
        .at_least_one(std::iter::once("use_blueprint").chain(platform_keys()))
        .into()
}

/// Schema of an instantiated blueprint body: one platform, one entity.
fn instance_schema() -> Schema {
    let mut schema = MappingSchema::new().optional("variables", Schema::map(Schema::Any));
    for key in platform_keys() {
        schema = schema.optional(key, Schema::list(Schema::Any));
    }
    schema
        .exclusive(platform_keys())
        .at_least_one(platform_keys())
        .into()
}

/// Configured `template` integration.
pub struct TemplateIntegration<S, B> {
    entries: Document,
    store: Arc<BlueprintStore<S>>,
    runtime: Arc<TemplateRuntime<B>>,
    activated: Vec<EntityId>,
}

impl<S: BlueprintSource, B: StateBus + 'static> TemplateIntegration<S, B> {
    /// `entries` is the `template` section of the configuration: one entry or
    /// a list of them.
    pub fn new(entries: Document, store: Arc<BlueprintStore<S>>, runtime: Arc<TemplateRuntime<B>>) -> Self {
        Self {
            entries,
            store,
            runtime,
            activated: Vec::new(),
        }
    }

    /// Entities activated by the last setup, in configuration order.
    #[must_use]
    pub fn activated(&self) -> &[EntityId] {
        &self.activated
    }

    /// Validate one entry and build the entity configurations it describes.
    async fn resolve_entry(&self, entry: &Document, path: &DocPath) -> Result<Vec<TemplateEntityConfig>, TmplHubError> {
        let entry = schema::validate_at(entry, &entry_schema(), path)?;

        let Some(use_blueprint) = entry.get("use_blueprint") else {
            let overrides = EntryOverrides::from_entry(&entry, false);
            return platform_configs(&entry, path, &overrides);
        };

        let blueprint_path = use_blueprint.get("path").and_then(Document::as_str).unwrap_or_default();
        let inputs = use_blueprint
            .get("input")
            .and_then(Document::as_mapping)
            .cloned()
            .unwrap_or_default();

        let blueprint = self.store.get(blueprint_path).await?;
        let instance = blueprint.instantiate(&inputs)?;
        let instance = schema::validate_at(&instance, &instance_schema(), path)?;

        let configs = platform_configs(&instance, path, &EntryOverrides::from_entry(&entry, true))?;
        if configs.len() != 1 {
            return Err(SchemaError::new(
                path.key("use_blueprint"),
                SchemaErrorKind::Invalid {
                    expected: "blueprint defining exactly one entity",
                    value: blueprint_path.to_string(),
                },
            )
            .into());
        }
        Ok(configs)
    }
}

/// Entry-level fields applied to the entities an entry yields.
struct EntryOverrides {
    name: Option<Document>,
    unique_id: Option<Document>,
    variables: Option<Mapping>,
}

impl EntryOverrides {
    fn from_entry(entry: &Document, with_identity: bool) -> Self {
        let identity = |key: &str| entry.get(key).filter(|_| with_identity).cloned();
        Self {
            name: identity("name"),
            unique_id: identity("unique_id"),
            variables: entry.get("variables").and_then(Document::as_mapping).cloned(),
        }
    }

    /// Merge into one entity mapping. Variables merge in order: `base` (the
    /// document-level variables), the entity's own, then the entry's.
    fn apply(&self, entity: &Mapping, base: Option<&Mapping>) -> Mapping {
        let mut merged = entity.clone();
        if let Some(name) = &self.name {
            merged.insert("name", name.clone());
        }
        if let Some(unique_id) = &self.unique_id {
            merged.insert("unique_id", unique_id.clone());
        }

        let own = entity.get("variables").and_then(Document::as_mapping);
        let layers = [base, own, self.variables.as_ref()];
        if layers.iter().any(Option::is_some) {
            let mut variables = Mapping::new();
            for (key, value) in layers.into_iter().flatten().flat_map(Mapping::iter) {
                variables.insert(key, value.clone());
            }
            merged.insert("variables", Document::Mapping(variables));
        }
        merged
    }
}

/// Build every entity listed under the platform keys of `document`.
fn platform_configs(
    document: &Document,
    path: &DocPath,
    overrides: &EntryOverrides,
) -> Result<Vec<TemplateEntityConfig>, TmplHubError> {
    let base = document.get("variables").and_then(Document::as_mapping);

    let mut configs = Vec::new();
    for platform in Platform::ALL {
        let Some(items) = document.get(platform.as_str()).and_then(Document::as_sequence) else {
            continue;
        };
        for (index, item) in items.iter().enumerate() {
            let at = path.key(platform.as_str()).index(index);
            let entity = item
                .as_mapping()
                .ok_or_else(|| {
                    SchemaError::new(
                        at.clone(),
                        SchemaErrorKind::WrongType {
                            expected: "mapping",
                            found: item.kind(),
                        },
                    )
                })?;
            let merged = Document::Mapping(overrides.apply(entity, base));
            configs.push(TemplateEntityConfig::from_document(platform, &merged, &at)?);
        }
    }
    Ok(configs)
}

impl<S: BlueprintSource, B: StateBus + 'static> Integration for TemplateIntegration<S, B> {
    fn name(&self) -> &'static str {
        DOMAIN
    }

    fn setup(&mut self) -> impl Future<Output = Result<SetupReport, TmplHubError>> + Send {
        async move {
            let root = DocPath::root().key(DOMAIN);
            let entries = schema::validate_at(&self.entries, &Schema::list(Schema::Any), &root)?;
            let entries = entries.as_sequence().map(<[Document]>::to_vec).unwrap_or_default();

            let mut report = SetupReport::default();
            for (index, entry) in entries.iter().enumerate() {
                let path = root.index(index);
                let configs = match self.resolve_entry(entry, &path).await {
                    Ok(configs) => configs,
                    Err(err) => {
                        tracing::error!(path = %path, error = ?err, "template entry rejected");
                        report.failures.push((path, err));
                        continue;
                    }
                };
                for config in configs {
                    match self.runtime.activate(config) {
                        Ok(entity_id) => {
                            self.activated.push(entity_id.clone());
                            report.activated.push(entity_id);
                        }
                        Err(err) => {
                            tracing::error!(path = %path, %err, "template entity not activated");
                            report.failures.push((path.clone(), err.into()));
                        }
                    }
                }
            }

            tracing::info!(
                activated = report.activated.len(),
                failed = report.failures.len(),
                "template integration set up"
            );
            Ok(report)
        }
    }

    fn teardown(&mut self) -> impl Future<Output = Result<(), TmplHubError>> + Send {
        async move {
            for entity_id in std::mem::take(&mut self.activated) {
                if let Err(err) = self.runtime.teardown(&entity_id).await {
                    tracing::warn!(entity_id = %entity_id, %err, "entity already gone");
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use tmplhub_domain::blueprint::{BlueprintError, InputError};
    use tmplhub_domain::entity::{Attributes, EntityState};

    use super::*;
    use crate::runtime::RuntimeConfig;
    use crate::state_bus::InMemoryStateBus;

    #[derive(Default)]
    struct MemorySource {
        documents: HashMap<String, Document>,
    }

    impl MemorySource {
        fn with(mut self, path: &str, value: serde_json::Value) -> Self {
            self.documents.insert(path.to_string(), Document::from(value));
            self
        }
    }

    impl BlueprintSource for MemorySource {
        async fn load(&self, _domain: &str, path: &str) -> Result<Option<Document>, TmplHubError> {
            Ok(self.documents.get(path).cloned())
        }

        async fn list(&self, _domain: &str) -> Result<Vec<String>, TmplHubError> {
            Ok(self.documents.keys().cloned().collect())
        }
    }

    type Subject = TemplateIntegration<MemorySource, InMemoryStateBus>;

    fn source() -> MemorySource {
        MemorySource::default()
            .with(
                "inverted_binary_sensor.toml",
                json!({
                    "domain": "template",
                    "input": {"original_entity": {"selector": {"entity": {"domain": "binary_sensor"}}}},
                    "variables": {"original_entity": {"!input": "original_entity"}},
                    "binary_sensor": {"state": "{{ not is_state(original_entity, 'on') }}"}
                }),
            )
            .with(
                "label.toml",
                json!({
                    "domain": "template",
                    "variables": {"label": "blueprint"},
                    "sensor": {"name": "Label", "state": "{{ label }}"}
                }),
            )
            .with(
                "two_platforms.toml",
                json!({
                    "domain": "template",
                    "sensor": {"state": "1"},
                    "binary_sensor": {"state": "on"}
                }),
            )
    }

    fn integration(entries: serde_json::Value) -> Subject {
        let bus = Arc::new(InMemoryStateBus::default());
        bus.publish(&id("binary_sensor.foo"), EntityState::On, Attributes::new());
        bus.publish(&id("binary_sensor.bar"), EntityState::Off, Attributes::new());
        TemplateIntegration::new(
            Document::from(entries),
            Arc::new(BlueprintStore::new(DOMAIN, source())),
            Arc::new(TemplateRuntime::new(bus, RuntimeConfig::default())),
        )
    }

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    fn state(subject: &Subject, entity_id: &str) -> Option<String> {
        subject
            .runtime
            .bus()
            .get_state(&id(entity_id))
            .map(|snapshot| snapshot.state.to_string())
    }

    fn inverted(name: &str, source: &str) -> serde_json::Value {
        json!({
            "name": name,
            "use_blueprint": {
                "path": "inverted_binary_sensor.toml",
                "input": {"original_entity": source}
            }
        })
    }

    #[tokio::test]
    async fn should_activate_one_entity_per_blueprint_entry() {
        let mut subject = integration(json!([
            inverted("Inverted foo", "binary_sensor.foo"),
            inverted("Inverted bar", "binary_sensor.bar"),
        ]));

        let report = subject.setup().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(
            report.activated,
            [id("binary_sensor.inverted_foo"), id("binary_sensor.inverted_bar")]
        );
        assert_eq!(state(&subject, "binary_sensor.inverted_foo").as_deref(), Some("off"));
        assert_eq!(state(&subject, "binary_sensor.inverted_bar").as_deref(), Some("on"));
        assert_eq!(subject.store.cached(), ["inverted_binary_sensor.toml"]);
    }

    #[tokio::test]
    async fn should_keep_siblings_when_entry_fails() {
        let mut subject = integration(json!([
            inverted("Inverted foo", "binary_sensor.foo"),
            {"name": "Broken", "use_blueprint": {"path": "inverted_binary_sensor.toml"}},
            {"use_blueprint": {"path": "missing.toml"}},
            inverted("Inverted bar", "binary_sensor.bar"),
        ]));

        let report = subject.setup().await.unwrap();

        assert_eq!(report.activated.len(), 2);
        assert_eq!(report.failures.len(), 2);
        let (path, err) = &report.failures[0];
        assert_eq!(path.to_string(), "template[1]");
        assert!(matches!(err, TmplHubError::Input(InputError::Missing(name)) if name == "original_entity"));
        let (path, err) = &report.failures[1];
        assert_eq!(path.to_string(), "template[2]");
        assert!(matches!(err, TmplHubError::Blueprint(BlueprintError::NotFound { .. })));
    }

    #[tokio::test]
    async fn should_report_path_when_blueprint_and_platform_are_mixed() {
        let mut subject = integration(json!({
            "use_blueprint": {"path": "inverted_binary_sensor.toml"},
            "sensor": {"state": "1"}
        }));

        let report = subject.setup().await.unwrap();

        let (path, err) = &report.failures[0];
        assert_eq!(path.to_string(), "template[0]");
        let TmplHubError::Schema(err) = err else {
            panic!("expected a schema error, got {err:?}");
        };
        assert!(matches!(err.kind, SchemaErrorKind::Exclusive(_)));
    }

    #[tokio::test]
    async fn should_activate_entities_written_out_directly() {
        let mut subject = integration(json!({
            "variables": {"factor": 2},
            "sensor": [
                {"name": "Doubled", "state": "{{ 21 * factor }}"},
                {"name": "Tripled", "state": "{{ 7 * factor }}", "variables": {"factor": 3}}
            ],
            "binary_sensor": {"name": "Door open", "state": "{{ is_state('binary_sensor.foo', 'on') }}"}
        }));

        let report = subject.setup().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.activated.len(), 3);
        assert_eq!(state(&subject, "binary_sensor.door_open").as_deref(), Some("on"));
        assert_eq!(state(&subject, "sensor.doubled").as_deref(), Some("42"));
        assert_eq!(state(&subject, "sensor.tripled").as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn should_merge_entry_variables_over_blueprint_ones() {
        let mut subject = integration(json!([
            {"name": "Default label", "use_blueprint": {"path": "label.toml"}},
            {"name": "Custom label", "use_blueprint": {"path": "label.toml"}, "variables": {"label": "entry"}}
        ]));

        subject.setup().await.unwrap();

        assert_eq!(state(&subject, "sensor.default_label").as_deref(), Some("blueprint"));
        assert_eq!(state(&subject, "sensor.custom_label").as_deref(), Some("entry"));
    }

    #[tokio::test]
    async fn should_reject_blueprint_defining_several_platforms() {
        let mut subject = integration(json!({"use_blueprint": {"path": "two_platforms.toml"}}));

        let report = subject.setup().await.unwrap();

        assert!(report.activated.is_empty());
        assert!(matches!(report.failures[0].1, TmplHubError::Schema(_)));
    }

    #[tokio::test]
    async fn should_report_duplicate_entity() {
        let mut subject = integration(json!([
            inverted("Inverted foo", "binary_sensor.foo"),
            inverted("Inverted foo", "binary_sensor.bar"),
        ]));

        let report = subject.setup().await.unwrap();

        assert_eq!(report.activated.len(), 1);
        assert!(matches!(report.failures[0].1, TmplHubError::Runtime(_)));
    }

    #[tokio::test]
    async fn should_remove_every_entity_on_teardown() {
        let mut subject = integration(json!([
            inverted("Inverted foo", "binary_sensor.foo"),
            inverted("Inverted bar", "binary_sensor.bar"),
        ]));
        subject.setup().await.unwrap();
        assert_eq!(subject.runtime.bus().subscription_count(), 2);

        subject.teardown().await.unwrap();

        assert!(subject.activated().is_empty());
        assert!(subject.runtime.entity_ids().is_empty());
        assert_eq!(subject.runtime.bus().subscription_count(), 0);
    }
}
