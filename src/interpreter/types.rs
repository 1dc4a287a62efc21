use crate::ast::*;
use crate::types::JsValue;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of evaluating a statement. Abrupt completions propagate upward
/// until a matching construct absorbs them: loops absorb Break/Continue,
/// call boundaries absorb Return, try/catch absorbs Throw.
#[derive(Debug)]
pub enum Completion {
    Normal(JsValue),
    Return(JsValue),
    Throw(JsValue),
    Break(Option<String>),
    Continue(Option<String>),
}

impl Completion {
    pub(crate) fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }
}

pub type EnvRef = Rc<RefCell<Environment>>;

/// One node in the scope chain. Bindings live here; the parent link makes
/// resolution walk outward. Shared ownership keeps an environment alive for
/// as long as any closure captures it.
#[derive(Debug)]
pub struct Environment {
    pub(crate) bindings: FxHashMap<String, Binding>,
    pub(crate) parent: Option<EnvRef>,
}

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) value: JsValue,
    pub(crate) kind: BindingKind,
    pub(crate) initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
}

/// Why an environment operation failed. The interpreter converts these into
/// thrown error objects; the names follow the error taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EnvError {
    /// No environment in the chain holds the name.
    NotFound(String),
    /// Temporal dead zone: the binding exists but its declaration has not
    /// executed yet.
    Uninitialized(String),
    /// Write to an initialized `const` binding.
    Immutable(String),
    /// Redeclaration in the same environment where that is disallowed.
    AlreadyDeclared(String),
}

impl Environment {
    pub fn new(parent: Option<EnvRef>) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            bindings: FxHashMap::default(),
            parent,
        }))
    }

    /// Installs a binding in this environment. `var` bindings start
    /// initialized (to undefined); `let`/`const` start in the dead zone.
    /// Hoisting the same `var` name twice is allowed; every other collision
    /// is a duplicate declaration.
    pub(crate) fn declare(&mut self, name: &str, kind: BindingKind) -> Result<(), EnvError> {
        if let Some(existing) = self.bindings.get(name) {
            if kind == BindingKind::Var && existing.kind == BindingKind::Var {
                return Ok(());
            }
            return Err(EnvError::AlreadyDeclared(name.to_string()));
        }
        self.bindings.insert(
            name.to_string(),
            Binding {
                value: JsValue::Undefined,
                kind,
                initialized: kind == BindingKind::Var,
            },
        );
        Ok(())
    }

    /// Gives an existing binding in this environment its first value and
    /// takes it out of the dead zone. Used when a `let`/`const` declaration
    /// statement executes and when a function declaration is installed.
    pub(crate) fn initialize(&mut self, name: &str, value: JsValue) {
        if let Some(binding) = self.bindings.get_mut(name) {
            binding.value = value;
            binding.initialized = true;
        }
    }

    /// Resolves a name through the chain, inner to outer.
    pub(crate) fn lookup(&self, name: &str) -> Result<JsValue, EnvError> {
        if let Some(binding) = self.bindings.get(name) {
            if !binding.initialized {
                return Err(EnvError::Uninitialized(name.to_string()));
            }
            return Ok(binding.value.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().lookup(name),
            None => Err(EnvError::NotFound(name.to_string())),
        }
    }

    /// Resolves then mutates in place. There is no implicit-global fallback:
    /// assigning an unresolved name is an error.
    pub(crate) fn assign(&mut self, name: &str, value: JsValue) -> Result<(), EnvError> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if !binding.initialized {
                return Err(EnvError::Uninitialized(name.to_string()));
            }
            if binding.kind == BindingKind::Const {
                return Err(EnvError::Immutable(name.to_string()));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => Err(EnvError::NotFound(name.to_string())),
        }
    }

    /// Inserts a pre-initialized binding, bypassing declaration checks.
    /// Used for `this` and for globals installed during setup.
    pub(crate) fn define(&mut self, name: &str, kind: BindingKind, value: JsValue) {
        self.bindings.insert(
            name.to_string(),
            Binding {
                value,
                kind,
                initialized: true,
            },
        );
    }
}

/// How `this` resolves inside a function body. Arrows never rebind: they see
/// the `this` of their defining environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThisMode {
    Normal,
    Arrow,
}

/// The call form, resolved at the call site. This is the explicit state
/// machine over call shapes: plain calls bind `this` to undefined, method
/// calls to the receiver, constructor calls to the freshly created object.
#[derive(Clone, Debug)]
pub(crate) enum CallForm {
    Plain,
    Method(JsValue),
    Construct(JsValue),
}

impl CallForm {
    pub(crate) fn this_value(&self) -> JsValue {
        match self {
            CallForm::Plain => JsValue::Undefined,
            CallForm::Method(v) | CallForm::Construct(v) => v.clone(),
        }
    }
}

pub enum JsFunction {
    User {
        name: Option<String>,
        params: Vec<String>,
        body: Vec<Statement>,
        closure: EnvRef,
        this_mode: ThisMode,
    },
    Native(
        String,
        usize,
        Rc<dyn Fn(&mut super::Interpreter, &JsValue, &[JsValue]) -> Completion>,
    ),
}

impl JsFunction {
    pub fn native(
        name: String,
        arity: usize,
        f: impl Fn(&mut super::Interpreter, &JsValue, &[JsValue]) -> Completion + 'static,
    ) -> Self {
        JsFunction::Native(name, arity, Rc::new(f))
    }
}

impl Clone for JsFunction {
    fn clone(&self) -> Self {
        match self {
            JsFunction::User {
                name,
                params,
                body,
                closure,
                this_mode,
            } => JsFunction::User {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                closure: closure.clone(),
                this_mode: *this_mode,
            },
            JsFunction::Native(name, arity, f) => {
                JsFunction::Native(name.clone(), *arity, f.clone())
            }
        }
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsFunction::User { name, .. } => write!(f, "JsFunction::User({name:?})"),
            JsFunction::Native(name, arity, _) => {
                write!(f, "JsFunction::Native({name:?}, {arity})")
            }
        }
    }
}

/// Data property descriptor. Accessors are outside the model, so every
/// field is concrete.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub value: JsValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value,
            writable,
            enumerable,
            configurable,
        }
    }

    pub fn data_default(value: JsValue) -> Self {
        Self::data(value, true, true, true)
    }
}

/// Record behind `Function.prototype.bind`. Kept as object state rather
/// than captured in a native closure so the collector can trace it.
#[derive(Debug, Clone)]
pub(crate) struct BoundFunction {
    pub(crate) target: JsValue,
    pub(crate) this_val: JsValue,
    pub(crate) bound_args: Vec<JsValue>,
}

pub struct JsObjectData {
    pub id: Option<u64>,
    /// Ordered property table; insertion order drives enumeration.
    pub properties: IndexMap<String, PropertyDescriptor>,
    pub prototype: Option<Rc<RefCell<JsObjectData>>>,
    pub callable: Option<JsFunction>,
    pub(crate) bound: Option<BoundFunction>,
    pub class_name: String,
    pub extensible: bool,
}

impl JsObjectData {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            properties: IndexMap::new(),
            prototype: None,
            callable: None,
            bound: None,
            class_name: "Object".to_string(),
            extensible: true,
        }
    }

    /// Own properties first, then the prototype chain; undefined when the
    /// chain is exhausted. The chain is acyclic by construction (cycle
    /// attempts are rejected at mutation), so the walk terminates.
    pub fn get_property(&self, key: &str) -> JsValue {
        if let Some(desc) = self.properties.get(key) {
            return desc.value.clone();
        }
        if let Some(proto) = &self.prototype {
            return proto.borrow().get_property(key);
        }
        JsValue::Undefined
    }

    pub fn get_own_property(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        if self.properties.contains_key(key) {
            return true;
        }
        if let Some(proto) = &self.prototype {
            return proto.borrow().has_property(key);
        }
        false
    }

    /// Own enumerable keys in insertion order, then the prototype chain's,
    /// shadowed names skipped.
    pub fn enumerable_keys_with_proto(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut keys = Vec::new();
        for (k, desc) in &self.properties {
            if desc.enumerable && seen.insert(k.clone()) {
                keys.push(k.clone());
            }
        }
        if let Some(ref proto) = self.prototype {
            for k in proto.borrow().enumerable_keys_with_proto() {
                if seen.insert(k.clone()) {
                    keys.push(k);
                }
            }
        }
        keys
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    /// Explicit descriptor installation. Rejects changes a non-configurable
    /// property forbids and additions to a non-extensible object.
    pub fn define_own_property(&mut self, key: String, desc: PropertyDescriptor) -> bool {
        if let Some(current) = self.properties.get(&key) {
            if !current.configurable {
                if desc.configurable || desc.enumerable != current.enumerable {
                    return false;
                }
                if !current.writable {
                    if desc.writable {
                        return false;
                    }
                    if !crate::interpreter::strict_equality(&current.value, &desc.value) {
                        return false;
                    }
                }
            }
        } else if !self.extensible {
            return false;
        }
        self.properties.insert(key, desc);
        true
    }

    /// Ordinary set: writes to the receiver's own property, creating it when
    /// absent. Writes through a non-writable own property are dropped; the
    /// prototype chain is never consulted for the write target.
    pub fn set_property_value(&mut self, key: &str, value: JsValue) {
        if let Some(desc) = self.properties.get_mut(key) {
            if desc.writable {
                desc.value = value;
            }
        } else if self.extensible {
            self.properties
                .insert(key.to_string(), PropertyDescriptor::data_default(value));
        }
    }

    pub fn insert_value(&mut self, key: String, value: JsValue) {
        self.properties
            .insert(key, PropertyDescriptor::data_default(value));
    }

    /// Built-in method slot: writable and configurable, hidden from
    /// enumeration.
    pub fn insert_builtin(&mut self, key: String, value: JsValue) {
        self.properties
            .insert(key, PropertyDescriptor::data(value, true, false, true));
    }

    pub fn insert_property(&mut self, key: String, desc: PropertyDescriptor) {
        self.properties.insert(key, desc);
    }

    pub fn remove_property(&mut self, key: &str) {
        self.properties.shift_remove(key);
    }
}

pub(crate) const GC_THRESHOLD: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_and_lookup() {
        let env = Environment::new(None);
        env.borrow_mut().declare("x", BindingKind::Var).unwrap();
        assert!(matches!(
            env.borrow().lookup("x"),
            Ok(JsValue::Undefined)
        ));
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let outer = Environment::new(None);
        outer
            .borrow_mut()
            .define("x", BindingKind::Var, JsValue::Number(1.0));
        let inner = Environment::new(Some(outer));
        assert!(matches!(
            inner.borrow().lookup("x"),
            Ok(JsValue::Number(n)) if n == 1.0
        ));
        assert!(matches!(
            inner.borrow().lookup("missing"),
            Err(EnvError::NotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn let_binding_starts_in_dead_zone() {
        let env = Environment::new(None);
        env.borrow_mut().declare("x", BindingKind::Let).unwrap();
        assert!(matches!(
            env.borrow().lookup("x"),
            Err(EnvError::Uninitialized(name)) if name == "x"
        ));
        assert_eq!(
            env.borrow_mut().assign("x", JsValue::Number(1.0)),
            Err(EnvError::Uninitialized("x".to_string()))
        );
        env.borrow_mut().initialize("x", JsValue::Number(1.0));
        assert!(matches!(env.borrow().lookup("x"), Ok(JsValue::Number(_))));
    }

    #[test]
    fn const_assignment_is_immutable() {
        let env = Environment::new(None);
        env.borrow_mut().declare("c", BindingKind::Const).unwrap();
        env.borrow_mut().initialize("c", JsValue::Number(1.0));
        assert_eq!(
            env.borrow_mut().assign("c", JsValue::Number(2.0)),
            Err(EnvError::Immutable("c".to_string()))
        );
    }

    #[test]
    fn duplicate_declaration_rejected() {
        let env = Environment::new(None);
        env.borrow_mut().declare("x", BindingKind::Let).unwrap();
        assert_eq!(
            env.borrow_mut().declare("x", BindingKind::Let),
            Err(EnvError::AlreadyDeclared("x".to_string()))
        );
        // var-over-var re-hoisting is fine
        env.borrow_mut().declare("y", BindingKind::Var).unwrap();
        env.borrow_mut().declare("y", BindingKind::Var).unwrap();
        assert_eq!(
            env.borrow_mut().declare("y", BindingKind::Let),
            Err(EnvError::AlreadyDeclared("y".to_string()))
        );
    }

    #[test]
    fn property_order_is_insertion_order() {
        let mut obj = JsObjectData::new();
        obj.insert_value("b".to_string(), JsValue::Number(1.0));
        obj.insert_value("a".to_string(), JsValue::Number(2.0));
        obj.insert_value("c".to_string(), JsValue::Number(3.0));
        assert_eq!(obj.own_keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn non_writable_write_is_dropped() {
        let mut obj = JsObjectData::new();
        obj.insert_property(
            "k".to_string(),
            PropertyDescriptor::data(JsValue::Number(1.0), false, true, true),
        );
        obj.set_property_value("k", JsValue::Number(2.0));
        assert!(matches!(obj.get_property("k"), JsValue::Number(n) if n == 1.0));
    }

    #[test]
    fn define_respects_non_configurable() {
        let mut obj = JsObjectData::new();
        obj.insert_property(
            "k".to_string(),
            PropertyDescriptor::data(JsValue::Number(1.0), false, false, false),
        );
        assert!(!obj.define_own_property(
            "k".to_string(),
            PropertyDescriptor::data(JsValue::Number(2.0), false, false, false),
        ));
        assert!(!obj.define_own_property(
            "k".to_string(),
            PropertyDescriptor::data(JsValue::Number(1.0), true, false, false),
        ));
    }
}
