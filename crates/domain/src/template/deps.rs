//! Static dependency extraction.
//!
//! Walks the parsed tree without evaluating it. Entity ids are collected
//! from literal (or statically bound) first arguments of the state functions
//! and from `states.<domain>.<object_id>` chains. Anything that cannot be
//! resolved without evaluation marks the set as dynamic.

use std::collections::{BTreeMap, BTreeSet};

use super::syntax::{self, CallArg, Expr, Stmt};
use super::{Template, Value, Variables};
use crate::id::EntityId;

/// What a template reads from the state bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub entities: BTreeSet<EntityId>,
    /// Attribute names read per entity, where known.
    pub attributes: BTreeMap<EntityId, BTreeSet<String>>,
    /// Set when an entity reference could not be resolved statically.
    pub dynamic: bool,
}

impl Dependencies {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && !self.dynamic
    }

    #[must_use]
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.entities.contains(entity_id)
    }

    pub fn merge(&mut self, other: Self) {
        self.entities.extend(other.entities);
        for (entity_id, names) in other.attributes {
            self.attributes.entry(entity_id).or_default().extend(names);
        }
        self.dynamic |= other.dynamic;
    }

    fn add_entity(&mut self, entity_id: EntityId) {
        self.entities.insert(entity_id);
    }

    fn add_attribute(&mut self, entity_id: EntityId, name: &str) {
        self.attributes
            .entry(entity_id.clone())
            .or_default()
            .insert(name.to_string());
        self.entities.insert(entity_id);
    }
}

pub(crate) fn resolve(template: &Template) -> Dependencies {
    resolve_with(template, &Variables::new())
}

pub(crate) fn resolve_with(template: &Template, statics: &Variables) -> Dependencies {
    let mut resolver = Resolver {
        statics,
        found: Dependencies::default(),
    };
    match syntax::parse(template.source()) {
        Ok(root) => resolver.stmt(&root),
        Err(_) => resolver.found.dynamic = true,
    }
    resolver.found
}

/// How far a `states` chain has been narrowed.
enum StatesRef {
    Root,
    Domain(String),
    Entity(EntityId),
}

/// State functions whose first argument names an entity.
const ENTITY_FUNCTIONS: &[&str] = &["states", "is_state", "state_attr", "is_state_attr", "has_value"];

/// Of those, the ones whose second argument names an attribute.
const ATTRIBUTE_FUNCTIONS: &[&str] = &["state_attr", "is_state_attr"];

struct Resolver<'a> {
    statics: &'a Variables,
    found: Dependencies,
}

impl Resolver<'_> {
    fn stmt(&mut self, stmt: &Stmt<'_>) {
        let Some((exprs, bodies)) = syntax::stmt_parts(stmt) else {
            self.found.dynamic = true;
            return;
        };
        for expr in exprs {
            self.expr(expr);
        }
        for stmt in bodies.into_iter().flatten() {
            self.stmt(stmt);
        }
    }

    fn expr(&mut self, expr: &Expr<'_>) {
        match self.states_ref(expr) {
            Some(StatesRef::Entity(entity_id)) => {
                self.found.add_entity(entity_id);
                return;
            }
            Some(StatesRef::Root | StatesRef::Domain(_)) => {
                self.found.dynamic = true;
                return;
            }
            None => {}
        }

        match expr {
            Expr::GetAttr(node) => {
                if let Some(entity_id) = self.attributes_of(&node.expr) {
                    self.found.add_attribute(entity_id, node.name);
                } else {
                    self.expr(&node.expr);
                }
            }
            Expr::GetItem(node) => {
                match (self.attributes_of(&node.expr), syntax::const_str(&node.subscript_expr)) {
                    (Some(entity_id), Some(name)) => self.found.add_attribute(entity_id, name),
                    _ => self.expr(&node.expr),
                }
                self.expr(&node.subscript_expr);
            }
            Expr::Call(node) => match &node.expr {
                Expr::Var(var) if self.is_function(var.id) => {
                    if ENTITY_FUNCTIONS.iter().any(|name| *name == var.id) {
                        self.entity_call(var.id, &node.args);
                    }
                    for arg in &node.args {
                        self.expr(syntax::arg_expr(arg));
                    }
                }
                _ => self.children(expr),
            },
            _ => self.children(expr),
        }
    }

    fn children(&mut self, expr: &Expr<'_>) {
        match syntax::expr_children(expr) {
            Some(children) => children.into_iter().for_each(|child| self.expr(child)),
            None => self.found.dynamic = true,
        }
    }

    /// A name that refers to a template function rather than a variable.
    fn is_function(&self, name: &str) -> bool {
        !self.statics.contains_key(name)
    }

    fn entity_call(&mut self, function: &str, args: &[CallArg<'_>]) {
        let Some(args) = syntax::positional(args) else {
            self.found.dynamic = true;
            return;
        };
        let Some(first) = args.first() else {
            return;
        };
        match self.static_argument(first) {
            Some(raw) => {
                let Ok(entity_id) = EntityId::parse(raw) else {
                    return;
                };
                let attribute = args.get(1).and_then(|arg| syntax::const_str(arg));
                match attribute {
                    Some(name) if ATTRIBUTE_FUNCTIONS.iter().any(|candidate| *candidate == function) => {
                        self.found.add_attribute(entity_id, name);
                    }
                    _ => self.found.add_entity(entity_id),
                }
            }
            None => {
                if !matches!(self.states_ref(first), Some(StatesRef::Entity(_))) {
                    self.found.dynamic = true;
                }
            }
        }
    }

    /// Entity whose `.attributes` mapping `expr` is, if any.
    fn attributes_of(&self, expr: &Expr<'_>) -> Option<EntityId> {
        match expr {
            Expr::GetAttr(node) if node.name == "attributes" => match self.states_ref(&node.expr) {
                Some(StatesRef::Entity(entity_id)) => Some(entity_id),
                _ => None,
            },
            _ => None,
        }
    }

    fn states_ref(&self, expr: &Expr<'_>) -> Option<StatesRef> {
        let (object, key) = match expr {
            Expr::Var(var) if var.id == "states" && !self.statics.contains_key(var.id) => {
                return Some(StatesRef::Root);
            }
            Expr::GetAttr(node) => (&node.expr, node.name),
            Expr::GetItem(node) => (&node.expr, syntax::const_str(&node.subscript_expr)?),
            _ => return None,
        };
        match self.states_ref(object)? {
            StatesRef::Root => Some(StatesRef::Domain(key.to_string())),
            StatesRef::Domain(domain) => EntityId::parse(format!("{domain}.{key}"))
                .ok()
                .map(StatesRef::Entity),
            StatesRef::Entity(_) => None,
        }
    }

    /// String value of a function argument, when known without evaluation.
    fn static_argument<'e>(&'e self, arg: &'e Expr<'_>) -> Option<&'e str> {
        match arg {
            Expr::Const(_) => syntax::const_str(arg),
            Expr::Var(var) => self.statics.get(var.id).and_then(Value::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(source: &str) -> Dependencies {
        Template::compile(source).unwrap().dependencies()
    }

    fn ids(deps: &Dependencies) -> Vec<&str> {
        deps.entities.iter().map(EntityId::as_str).collect()
    }

    #[test]
    fn should_collect_literal_function_arguments() {
        let found = deps("{{ states('sensor.a') }} {{ is_state('binary_sensor.b', 'on') }}");
        assert_eq!(ids(&found), ["binary_sensor.b", "sensor.a"]);
        assert!(!found.dynamic);
    }

    #[test]
    fn should_record_attribute_names_read_through_state_attr() {
        let found = deps("{{ state_attr('light.lamp', 'brightness') }}");
        assert_eq!(ids(&found), ["light.lamp"]);
        let lamp = EntityId::parse("light.lamp").unwrap();
        assert!(found.attributes[&lamp].contains("brightness"));
    }

    #[test]
    fn should_collect_states_attribute_chains() {
        let found = deps(
            "{{ states.sensor.x.state }} {{ states.sensor.y.attributes.unit }} {{ states['sensor']['z'] }}",
        );
        assert_eq!(ids(&found), ["sensor.x", "sensor.y", "sensor.z"]);
        let y = EntityId::parse("sensor.y").unwrap();
        assert!(found.attributes[&y].contains("unit"));
        assert!(!found.dynamic);
    }

    #[test]
    fn should_collect_references_inside_if_blocks() {
        let found = deps("{% if is_state('switch.a', 'on') %}{{ states('sensor.b') }}{% else %}{{ states('sensor.c') }}{% endif %}");
        assert_eq!(ids(&found), ["sensor.b", "sensor.c", "switch.a"]);
    }

    #[test]
    fn should_mark_dynamic_when_argument_is_computed() {
        let found = deps("{{ states('sensor.' ~ name) }}");
        assert!(found.entities.is_empty());
        assert!(found.dynamic);
    }

    #[test]
    fn should_mark_dynamic_when_states_is_iterated() {
        assert!(deps("{{ states.sensor }}").dynamic);
        assert!(deps("{{ states }}").dynamic);
    }

    #[test]
    fn should_resolve_arguments_bound_to_static_variables() {
        let template = Template::compile("{{ states(source) }}").unwrap();
        let statics = Variables::from([("source".to_string(), Value::from("sensor.foo"))]);
        let found = template.dependencies_with(&statics);
        assert_eq!(ids(&found), ["sensor.foo"]);
        assert!(!found.dynamic);

        let unbound = template.dependencies();
        assert!(unbound.entities.is_empty());
        assert!(unbound.dynamic);
    }

    #[test]
    fn should_ignore_invalid_literal_entity_ids() {
        let found = deps("{{ states('Not An Id') }}");
        assert!(found.entities.is_empty());
        assert!(!found.dynamic);
    }

    #[test]
    fn should_merge_dependency_sets() {
        let mut left = deps("{{ states('sensor.a') }}");
        left.merge(deps("{{ state_attr('sensor.b', 'x') }} {{ states(other) }}"));
        assert_eq!(ids(&left), ["sensor.a", "sensor.b"]);
        assert!(left.dynamic);
    }
}
