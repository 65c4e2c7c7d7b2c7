//! Trait definitions, implementations, and the resolution registry.
//!
//! A [`Trait`] names a set of required methods and associated types and may
//! inherit from parent traits. A [`TraitImpl`] binds one trait to one
//! concrete type. Completeness is recomputed on every query against the
//! registry's current state — nothing is memoized, so registering a missing
//! method is immediately visible.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::Type;

/// A required method signature on a trait.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitMethod {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    /// Methods with a default body need no implementation to be complete.
    pub has_default: bool,
}

/// A trait definition: requirements plus the parent-trait inheritance chain.
#[derive(Debug, Clone, Default)]
pub struct Trait {
    pub name: String,
    methods: Vec<TraitMethod>,
    associated_types: Vec<String>,
    parents: Vec<String>,
}

impl Trait {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_method(&mut self, method: TraitMethod) {
        self.methods.push(method);
    }

    pub fn add_associated_type(&mut self, name: impl Into<String>) {
        self.associated_types.push(name.into());
    }

    pub fn add_parent(&mut self, name: impl Into<String>) {
        self.parents.push(name.into());
    }

    pub fn methods(&self) -> &[TraitMethod] {
        &self.methods
    }

    pub fn associated_types(&self) -> &[String] {
        &self.associated_types
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn method(&self, name: &str) -> Option<&TraitMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// One trait implemented for one concrete type.
///
/// The target type is stored by canonical text, which is the registry's
/// lookup identity.
#[derive(Debug, Clone)]
pub struct TraitImpl {
    pub trait_name: String,
    pub target: String,
    methods: BTreeMap<String, TraitMethod>,
    associated_types: BTreeMap<String, Type>,
}

impl TraitImpl {
    pub fn new(trait_name: impl Into<String>, target: &Type) -> Self {
        Self {
            trait_name: trait_name.into(),
            target: target.canonical(),
            methods: BTreeMap::new(),
            associated_types: BTreeMap::new(),
        }
    }

    pub fn add_method(&mut self, method: TraitMethod) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn add_associated_type(&mut self, name: impl Into<String>, ty: Type) {
        self.associated_types.insert(name.into(), ty);
    }

    pub fn provides_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn associated_type(&self, name: &str) -> Option<&Type> {
        self.associated_types.get(name)
    }
}

/// Registry of traits and their implementations for one pipeline.
///
/// Single-threaded state owned by the compilation unit; only the diagnostic
/// sink is shared across threads.
#[derive(Debug, Default)]
pub struct TraitRegistry {
    traits: FxHashMap<String, Trait>,
    impls: FxHashMap<String, TraitImpl>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trait. Returns `false` when the name was already taken
    /// (the existing definition wins).
    pub fn register_trait(&mut self, definition: Trait) -> bool {
        if self.traits.contains_key(&definition.name) {
            return false;
        }
        self.traits.insert(definition.name.clone(), definition);
        true
    }

    pub fn trait_def(&self, name: &str) -> Option<&Trait> {
        self.traits.get(name)
    }

    pub fn register_impl(&mut self, implementation: TraitImpl) {
        let key = Self::impl_key(&implementation.trait_name, &implementation.target);
        self.impls.insert(key, implementation);
    }

    pub fn impl_for(&self, trait_name: &str, target: &Type) -> Option<&TraitImpl> {
        self.impls
            .get(&Self::impl_key(trait_name, &target.canonical()))
    }

    /// Every method the trait requires, including those inherited through
    /// the transitive parent chain. Cycle-safe; unknown parents are skipped
    /// (their absence is diagnosed where the trait is declared).
    pub fn required_methods(&self, trait_name: &str) -> Vec<&TraitMethod> {
        let mut methods = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        self.walk_chain(trait_name, &mut seen, &mut |t| {
            methods.extend(t.methods().iter());
        });
        methods
    }

    /// Every associated-type name the trait requires, inherited included.
    pub fn required_associated_types(&self, trait_name: &str) -> Vec<&str> {
        let mut names = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        self.walk_chain(trait_name, &mut seen, &mut |t| {
            names.extend(t.associated_types().iter().map(String::as_str));
        });
        names
    }

    /// Whether the implementation currently satisfies every requirement.
    ///
    /// Recomputed on each call so the answer always reflects the registry's
    /// present state.
    pub fn is_complete(&self, implementation: &TraitImpl) -> bool {
        let (methods, associated) = self.missing_requirements(implementation);
        methods.is_empty() && associated.is_empty()
    }

    /// The names of required methods and associated types the
    /// implementation does not provide.
    pub fn missing_requirements(&self, implementation: &TraitImpl) -> (Vec<String>, Vec<String>) {
        let missing_methods = self
            .required_methods(&implementation.trait_name)
            .into_iter()
            .filter(|m| !m.has_default && !implementation.provides_method(&m.name))
            .map(|m| m.name.clone())
            .collect();
        let missing_associated = self
            .required_associated_types(&implementation.trait_name)
            .into_iter()
            .filter(|name| implementation.associated_type(name).is_none())
            .map(str::to_string)
            .collect();
        (missing_methods, missing_associated)
    }

    /// Whether `target` has a complete implementation of `trait_name`.
    pub fn type_implements(&self, target: &Type, trait_name: &str) -> bool {
        self.impl_for(trait_name, target)
            .is_some_and(|imp| self.is_complete(imp))
    }

    fn walk_chain<'a>(
        &'a self,
        trait_name: &str,
        seen: &mut std::collections::BTreeSet<String>,
        visit: &mut impl FnMut(&'a Trait),
    ) {
        if !seen.insert(trait_name.to_string()) {
            return;
        }
        let Some(definition) = self.traits.get(trait_name) else {
            return;
        };
        visit(definition);
        for parent in definition.parents() {
            self.walk_chain(parent, seen, visit);
        }
    }

    fn impl_key(trait_name: &str, target: &str) -> String {
        format!("{trait_name} for {target}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show_method() -> TraitMethod {
        TraitMethod {
            name: "show".to_string(),
            params: vec![],
            ret: Type::STRING,
            has_default: false,
        }
    }

    #[test]
    fn missing_method_flips_completeness() {
        let mut registry = TraitRegistry::new();
        let mut show = Trait::new("Show");
        show.add_method(show_method());
        registry.register_trait(show);

        let mut imp = TraitImpl::new("Show", &Type::INT);
        assert!(!registry.is_complete(&imp));

        imp.add_method(show_method());
        assert!(registry.is_complete(&imp));
    }

    #[test]
    fn parent_chain_requirements() {
        let mut registry = TraitRegistry::new();
        let mut display = Trait::new("Display");
        display.add_method(show_method());
        registry.register_trait(display);

        let mut debug = Trait::new("Debug");
        debug.add_parent("Display");
        debug.add_method(TraitMethod {
            name: "dump".to_string(),
            params: vec![],
            ret: Type::STRING,
            has_default: false,
        });
        registry.register_trait(debug);

        let mut imp = TraitImpl::new("Debug", &Type::INT);
        imp.add_method(TraitMethod {
            name: "dump".to_string(),
            params: vec![],
            ret: Type::STRING,
            has_default: false,
        });
        let (methods, _) = registry.missing_requirements(&imp);
        assert_eq!(methods, vec!["show".to_string()]);

        imp.add_method(show_method());
        assert!(registry.is_complete(&imp));
    }

    #[test]
    fn associated_types_are_required() {
        let mut registry = TraitRegistry::new();
        let mut iter = Trait::new("Iterator");
        iter.add_associated_type("Item");
        registry.register_trait(iter);

        let mut imp = TraitImpl::new("Iterator", &Type::array(Type::INT));
        assert!(!registry.is_complete(&imp));

        imp.add_associated_type("Item", Type::INT);
        assert!(registry.is_complete(&imp));
    }

    #[test]
    fn default_methods_are_not_required() {
        let mut registry = TraitRegistry::new();
        let mut show = Trait::new("Show");
        show.add_method(TraitMethod {
            has_default: true,
            ..show_method()
        });
        registry.register_trait(show);

        let imp = TraitImpl::new("Show", &Type::INT);
        assert!(registry.is_complete(&imp));
    }

    #[test]
    fn completeness_reflects_registry_updates() {
        let mut registry = TraitRegistry::new();
        registry.register_trait(Trait::new("Marker"));
        let imp = TraitImpl::new("Marker", &Type::INT);
        assert!(registry.is_complete(&imp));

        // Redefining the chain is not possible, but growing it is: a new
        // parent link must immediately affect completeness queries.
        let mut child = Trait::new("Child");
        child.add_parent("Base");
        registry.register_trait(child);
        let mut base = Trait::new("Base");
        base.add_method(show_method());
        registry.register_trait(base);

        let child_imp = TraitImpl::new("Child", &Type::INT);
        assert!(!registry.is_complete(&child_imp));
    }

    #[test]
    fn cyclic_parent_chains_terminate() {
        let mut registry = TraitRegistry::new();
        let mut a = Trait::new("A");
        a.add_parent("B");
        let mut b = Trait::new("B");
        b.add_parent("A");
        b.add_method(show_method());
        registry.register_trait(a);
        registry.register_trait(b);

        let methods = registry.required_methods("A");
        assert_eq!(methods.len(), 1);
    }

    #[test]
    fn type_implements_requires_completeness() {
        let mut registry = TraitRegistry::new();
        let mut show = Trait::new("Show");
        show.add_method(show_method());
        registry.register_trait(show);

        let imp = TraitImpl::new("Show", &Type::INT);
        registry.register_impl(imp);
        assert!(!registry.type_implements(&Type::INT, "Show"));

        let mut complete = TraitImpl::new("Show", &Type::INT);
        complete.add_method(show_method());
        registry.register_impl(complete);
        assert!(registry.type_implements(&Type::INT, "Show"));
        assert!(!registry.type_implements(&Type::STRING, "Show"));
    }
}
