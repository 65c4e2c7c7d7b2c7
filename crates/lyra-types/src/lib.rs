//! Semantic type representations for Lyra.
//!
//! This crate defines the value types shared by the type checker and the IR
//! generator, plus the trait registry. Types are cheap immutable values: the
//! AST stores owned copies and registries key lookups on the canonical
//! rendering produced by `Display`.

use std::fmt;

use rustc_hash::FxHashMap;

pub mod traits;

pub use traits::{Trait, TraitImpl, TraitMethod, TraitRegistry};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The kind of a basic (non-compound) type.
///
/// `Float` is the 64-bit kind; `float64` is accepted as a spelled alias in
/// [`TypeTable`]. `Float32` is carried explicitly because the IR boundary
/// maps it to a distinct 32-bit representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Void,
    Bool,
    Int,
    Float,
    Float32,
    Char,
    Str,
    Array,
    Map,
    Function,
    Class,
    Interface,
    Pointer,
    Reference,
    Unknown,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Void => "void",
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Float => "float",
            BasicKind::Float32 => "float32",
            BasicKind::Char => "char",
            BasicKind::Str => "string",
            BasicKind::Array => "array",
            BasicKind::Map => "map",
            BasicKind::Function => "function",
            BasicKind::Class => "class",
            BasicKind::Interface => "interface",
            BasicKind::Pointer => "pointer",
            BasicKind::Reference => "reference",
            BasicKind::Unknown => "unknown",
        }
    }
}

/// A semantic type.
///
/// The textual rendering produced by `Display` is the canonical identity:
/// registries and layout memoization compare types by that string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Basic(BasicKind),
    /// Instantiated named generic: `array<int>`, `channel<string>`.
    Generic { name: String, args: Vec<Type> },
    Function { params: Vec<Type>, ret: Box<Type> },
    Option(Box<Type>),
    Result { ok: Box<Type>, err: Box<Type> },
    /// `T?` — a value that may also be nil.
    Nullable(Box<Type>),
}

impl Type {
    pub const VOID: Type = Type::Basic(BasicKind::Void);
    pub const BOOL: Type = Type::Basic(BasicKind::Bool);
    pub const INT: Type = Type::Basic(BasicKind::Int);
    pub const FLOAT: Type = Type::Basic(BasicKind::Float);
    pub const FLOAT32: Type = Type::Basic(BasicKind::Float32);
    pub const CHAR: Type = Type::Basic(BasicKind::Char);
    pub const STRING: Type = Type::Basic(BasicKind::Str);
    pub const UNKNOWN: Type = Type::Basic(BasicKind::Unknown);

    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Generic {
            name: name.into(),
            args,
        }
    }

    /// `array<elem>`.
    pub fn array(elem: Type) -> Type {
        Type::generic("array", vec![elem])
    }

    /// `map<key, value>`.
    pub fn map(key: Type, value: Type) -> Type {
        Type::generic("map", vec![key, value])
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn nullable(inner: Type) -> Type {
        Type::Nullable(Box::new(inner))
    }

    pub fn option(inner: Type) -> Type {
        Type::Option(Box::new(inner))
    }

    pub fn result(ok: Type, err: Type) -> Type {
        Type::Result {
            ok: Box::new(ok),
            err: Box::new(err),
        }
    }

    /// The canonical textual identity used for registry and layout keys.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Basic(BasicKind::Unknown))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Basic(BasicKind::Void))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Basic(BasicKind::Int))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Basic(BasicKind::Float | BasicKind::Float32))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Whether a value of `self` may be assigned to a slot of `target`
    /// without an explicit conversion.
    ///
    /// Rules: identity, `int → float`/`float32`, `float32 → float`,
    /// nullable widening (`T → T?`, nil → `T?`), and generics of the same
    /// name with pointwise-assignable arguments. The `unknown` placeholder
    /// is assignable in both directions so one diagnosed error does not
    /// cascade through every enclosing expression.
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        if self.is_unknown() || target.is_unknown() {
            return true;
        }

        match (self, target) {
            (Type::Basic(BasicKind::Int), Type::Basic(BasicKind::Float | BasicKind::Float32)) => {
                true
            }
            (Type::Basic(BasicKind::Float32), Type::Basic(BasicKind::Float)) => true,
            // Nil (typed void by the literal rule) and plain values both
            // widen into a nullable slot.
            (Type::Basic(BasicKind::Void), Type::Nullable(_)) => true,
            (_, Type::Nullable(inner)) => self.is_assignable_to(inner),
            (
                Type::Generic { name, args },
                Type::Generic {
                    name: target_name,
                    args: target_args,
                },
            ) => {
                name == target_name
                    && args.len() == target_args.len()
                    && args
                        .iter()
                        .zip(target_args)
                        .all(|(arg, target_arg)| arg.is_assignable_to(target_arg))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(kind) => write!(f, "{}", kind.name()),
            Type::Generic { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Option(inner) => write!(f, "Option<{inner}>"),
            Type::Result { ok, err } => write!(f, "Result<{ok}, {err}>"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
        }
    }
}

// ---------------------------------------------------------------------------
// Type-name table
// ---------------------------------------------------------------------------

/// The name → type resolution table for basic type spellings.
///
/// Constructed once by the driver and passed by reference into the stages
/// that need it — never ambient global state.
#[derive(Debug)]
pub struct TypeTable {
    names: FxHashMap<&'static str, Type>,
}

impl Default for TypeTable {
    fn default() -> Self {
        let mut names = FxHashMap::default();
        names.insert("void", Type::VOID);
        names.insert("bool", Type::BOOL);
        names.insert("int", Type::INT);
        names.insert("float", Type::FLOAT);
        names.insert("float64", Type::FLOAT);
        names.insert("float32", Type::FLOAT32);
        names.insert("char", Type::CHAR);
        names.insert("string", Type::STRING);
        names.insert("unknown", Type::UNKNOWN);
        Self { names }
    }
}

impl TypeTable {
    pub fn resolve(&self, name: &str) -> Option<&Type> {
        self.names.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering() {
        assert_eq!(Type::INT.canonical(), "int");
        assert_eq!(Type::array(Type::INT).canonical(), "array<int>");
        assert_eq!(
            Type::map(Type::STRING, Type::FLOAT).canonical(),
            "map<string, float>"
        );
        assert_eq!(
            Type::function(vec![Type::INT, Type::BOOL], Type::VOID).canonical(),
            "(int, bool) -> void"
        );
        assert_eq!(Type::option(Type::INT).canonical(), "Option<int>");
        assert_eq!(
            Type::result(Type::INT, Type::STRING).canonical(),
            "Result<int, string>"
        );
        assert_eq!(Type::nullable(Type::STRING).canonical(), "string?");
    }

    #[test]
    fn numeric_widening_assignability() {
        assert!(Type::INT.is_assignable_to(&Type::FLOAT));
        assert!(Type::INT.is_assignable_to(&Type::FLOAT32));
        assert!(Type::FLOAT32.is_assignable_to(&Type::FLOAT));
        assert!(!Type::FLOAT.is_assignable_to(&Type::FLOAT32));
        assert!(!Type::FLOAT.is_assignable_to(&Type::INT));
        assert!(!Type::STRING.is_assignable_to(&Type::INT));
    }

    #[test]
    fn nullable_widening() {
        let nullable_int = Type::nullable(Type::INT);
        assert!(Type::INT.is_assignable_to(&nullable_int));
        assert!(Type::VOID.is_assignable_to(&nullable_int));
        assert!(!nullable_int.is_assignable_to(&Type::INT));
    }

    #[test]
    fn generic_pointwise_assignability() {
        let ints = Type::array(Type::INT);
        let floats = Type::array(Type::FLOAT);
        assert!(ints.is_assignable_to(&floats));
        assert!(!floats.is_assignable_to(&ints));
        assert!(!ints.is_assignable_to(&Type::generic("channel", vec![Type::INT])));
    }

    #[test]
    fn unknown_does_not_cascade() {
        assert!(Type::UNKNOWN.is_assignable_to(&Type::INT));
        assert!(Type::STRING.is_assignable_to(&Type::UNKNOWN));
    }

    #[test]
    fn type_table_aliases() {
        let table = TypeTable::default();
        assert_eq!(table.resolve("float64"), Some(&Type::FLOAT));
        assert_eq!(table.resolve("float32"), Some(&Type::FLOAT32));
        assert_eq!(table.resolve("list"), None);
    }
}
