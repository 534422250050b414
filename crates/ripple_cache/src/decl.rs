//! Declarations, their stable identities, and the lookup keys they answer.

use ripple_common::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an externally visible declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    /// A regular (non-inline) function.
    Function,
    /// A property or top-level constant.
    Property,
    /// A class, interface, or object. Its members live in its member scope.
    Class,
    /// A function whose compiled body is copied into every call site.
    InlineFunction,
}

impl DeclKind {
    /// Returns `true` for declarations whose body is embedded by callers.
    pub fn is_inline(self) -> bool {
        self == DeclKind::InlineFunction
    }
}

/// Visibility modifier of a declaration.
///
/// Recorded so that it participates in change detection; private
/// declarations propagate exactly like public ones.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible everywhere.
    #[default]
    Public,
    /// Visible inside the module.
    Internal,
    /// Visible to subclasses.
    Protected,
    /// Visible inside the declaring scope.
    Private,
}

/// A `(scope, name)` pair meaning "something named `name` was looked up in `scope`".
///
/// The scope is a package, a class member scope (the class's qualified name),
/// or any other resolution context the front-end reports. Unresolved lookups
/// use the same key shape as resolved ones.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct LookupKey {
    /// The scope the lookup was performed in.
    pub scope: String,
    /// The simple name that was looked up.
    pub name: String,
}

impl LookupKey {
    /// Creates a lookup key.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.name)
    }
}

/// Stable identity of a declaration: scope, name, and parameter shape.
///
/// Two overloads of the same name differ in `shape` (e.g. `"(Int)"` and
/// `"(Int,String)"`); properties and classes use an empty shape.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct DeclarationId {
    /// Enclosing scope.
    pub scope: String,
    /// Simple name.
    pub name: String,
    /// Parameter arity/shape.
    pub shape: String,
}

impl DeclarationId {
    /// Creates a declaration identity.
    pub fn new(scope: impl Into<String>, name: impl Into<String>, shape: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
            shape: shape.into(),
        }
    }

    /// The lookup key under which this declaration is found.
    pub fn lookup_key(&self) -> LookupKey {
        LookupKey::new(self.scope.clone(), self.name.clone())
    }

    /// The dotted qualified name (`scope.name`, or `name` in the root scope).
    pub fn qualified_name(&self) -> String {
        if self.scope.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.scope, self.name)
        }
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.qualified_name(), self.shape)
    }
}

/// An externally visible declaration owned by one compilation unit.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Declaration {
    /// Stable identity.
    pub id: DeclarationId,
    /// Declaration kind.
    pub kind: DeclKind,
    /// Visibility modifier.
    pub visibility: Visibility,
    /// Hash of everything observable from outside the unit: parameter and
    /// return types, modifiers, default-value presence. For a compile-time
    /// constant the value is included, since readers inline it.
    pub signature: ContentHash,
    /// Hash of the emitted body, for inline functions only.
    pub inline_body: Option<ContentHash>,
    /// Qualified names of direct supertypes, for classes only.
    pub supertypes: Vec<String>,
}

impl Declaration {
    /// Creates a public declaration of the given kind.
    pub fn new(
        kind: DeclKind,
        id: DeclarationId,
        signature: ContentHash,
    ) -> Self {
        Self {
            id,
            kind,
            visibility: Visibility::Public,
            signature,
            inline_body: None,
            supertypes: Vec::new(),
        }
    }

    /// Creates a public function declaration.
    pub fn function(scope: &str, name: &str, shape: &str, signature: ContentHash) -> Self {
        Self::new(
            DeclKind::Function,
            DeclarationId::new(scope, name, shape),
            signature,
        )
    }

    /// Creates a public property declaration.
    pub fn property(scope: &str, name: &str, signature: ContentHash) -> Self {
        Self::new(DeclKind::Property, DeclarationId::new(scope, name, ""), signature)
    }

    /// Creates a public class declaration.
    pub fn class(scope: &str, name: &str, signature: ContentHash) -> Self {
        Self::new(DeclKind::Class, DeclarationId::new(scope, name, ""), signature)
    }

    /// Creates a public inline function declaration with its body hash.
    pub fn inline_function(
        scope: &str,
        name: &str,
        shape: &str,
        signature: ContentHash,
        body: ContentHash,
    ) -> Self {
        let mut decl = Self::new(
            DeclKind::InlineFunction,
            DeclarationId::new(scope, name, shape),
            signature,
        );
        decl.inline_body = Some(body);
        decl
    }

    /// Sets the visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the direct supertypes.
    pub fn with_supertypes<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes = supertypes.into_iter().map(Into::into).collect();
        self
    }

    /// The lookup key under which this declaration is found.
    pub fn lookup_key(&self) -> LookupKey {
        self.id.lookup_key()
    }

    /// Returns `true` for inline functions.
    pub fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    /// The scope containing this class's members, or `None` for non-classes.
    pub fn member_scope(&self) -> Option<String> {
        (self.kind == DeclKind::Class).then(|| self.id.qualified_name())
    }

    /// Returns `true` if only the inline body differs from `other`.
    pub fn differs_only_in_body(&self, other: &Declaration) -> bool {
        self.kind == other.kind
            && self.visibility == other.visibility
            && self.signature == other.signature
            && self.supertypes == other.supertypes
            && self.inline_body != other.inline_body
    }
}
