//! Authorization contexts
//!
//! Every grant lives in a context: [`Context::Global`], a resource type
//! ([`Context::Class`]) or a single resource ([`Context::Instance`]). In
//! storage a context is a nullable `(context_type, context_id)` pair, with
//! both columns NULL for the global context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RbacError, RbacResult};

/// Scope in which a role or permission is held
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Context {
    #[default]
    Global,
    Class {
        class_name: String,
    },
    Instance {
        class_name: String,
        id: i32,
    },
}

/// Stored form of a non-global context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef {
    pub context_type: String,
    pub context_id: Option<i32>,
}

/// A host record that can act as an authorization context
pub trait Resource {
    /// Type name stored in `context_type`
    fn resource_type(&self) -> &str;

    /// Primary key, `None` while the record is unsaved
    fn resource_id(&self) -> Option<i32>;
}

/// A host type whose name can be used as a class context
pub trait ResourceKind {
    const RESOURCE_TYPE: &'static str;
}

impl Context {
    pub fn class(class_name: impl Into<String>) -> Self {
        Self::Class {
            class_name: class_name.into(),
        }
    }

    pub fn instance(class_name: impl Into<String>, id: i32) -> Self {
        Self::Instance {
            class_name: class_name.into(),
            id,
        }
    }

    /// Class context for a host type
    pub fn of_kind<K: ResourceKind + ?Sized>() -> Self {
        Self::class(K::RESOURCE_TYPE)
    }

    /// Normalize any supported context argument
    pub fn parse(source: impl IntoContext) -> RbacResult<Self> {
        source.into_context()
    }

    /// Rebuild a context from its raw columns.
    ///
    /// An id without a type is rejected. An empty type counts as absent.
    pub fn from_columns(context_type: Option<String>, context_id: Option<i32>) -> RbacResult<Self> {
        let context_type = context_type.filter(|t| !t.is_empty());
        match (context_type, context_id) {
            (None, None) => Ok(Self::Global),
            (None, Some(id)) => Err(RbacError::invalid_context(format!(
                "context id {} given without a context type",
                id
            ))),
            (Some(class_name), None) => Ok(Self::Class { class_name }),
            (Some(class_name), Some(id)) => Ok(Self::Instance { class_name, id }),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Self::Class { .. })
    }

    pub fn is_instance(&self) -> bool {
        matches!(self, Self::Instance { .. })
    }

    /// Value for the `context_type` column
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Class { class_name } | Self::Instance { class_name, .. } => Some(class_name.as_str()),
        }
    }

    /// Value for the `context_id` column
    pub fn id(&self) -> Option<i32> {
        match self {
            Self::Instance { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Column values `(context_type, context_id)`
    pub fn columns(&self) -> (Option<String>, Option<i32>) {
        (self.class_name().map(str::to_string), self.id())
    }

    /// Stored form, `None` for the global context
    pub fn to_ref(&self) -> Option<ContextRef> {
        self.class_name().map(|class_name| ContextRef {
            context_type: class_name.to_string(),
            context_id: self.id(),
        })
    }

    /// The next wider context: instance -> class -> global
    pub fn parent(&self) -> Option<Context> {
        match self {
            Self::Global => None,
            Self::Class { .. } => Some(Self::Global),
            Self::Instance { class_name, .. } => Some(Self::class(class_name.clone())),
        }
    }

    /// This context followed by every wider one, ending at global
    pub fn chain(&self) -> Vec<Context> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(Context::parent) {
            chain.push(parent);
        }
        chain
    }

    /// Contexts to search for a lookup: only this one when forced
    pub fn lookup_chain(&self, force_context: bool) -> Vec<Context> {
        if force_context {
            vec![self.clone()]
        } else {
            self.chain()
        }
    }

    /// Whether `other` equals this context or is narrower than it
    pub fn contains(&self, other: &Context) -> bool {
        match self {
            Self::Global => true,
            Self::Class { class_name } => other.class_name() == Some(class_name.as_str()),
            Self::Instance { .. } => self == other,
        }
    }
}

/// Whether a role or permission bound to `target_context` may be granted in
/// `context`. Unbound targets are grantable anywhere, class-bound ones within
/// their class, instance-bound ones only on that instance.
pub fn verify_target_context(target_context: &Context, context: &Context) -> bool {
    target_context.contains(context)
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Class { class_name } => write!(f, "{}", class_name),
            Self::Instance { class_name, id } => write!(f, "{}:{}", class_name, id),
        }
    }
}

/// Parses `global`, `Post` or `Post:42`. Namespaced types keep their `::`
/// separators (`Blog::Post:42`).
impl FromStr for Context {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "global" {
            return Ok(Self::Global);
        }

        match s.rsplit_once(':') {
            Some((head, tail)) if !head.ends_with(':') => {
                let id = tail.parse::<i32>().map_err(|_| {
                    RbacError::invalid_context(format!("'{}' is not a valid context id in '{}'", tail, s))
                })?;
                Self::from_columns(Some(head.to_string()), Some(id))
            }
            _ => Ok(Self::class(s)),
        }
    }
}

impl From<Option<ContextRef>> for Context {
    fn from(scope: Option<ContextRef>) -> Self {
        match scope {
            None => Self::Global,
            Some(ContextRef {
                context_type,
                context_id: None,
            }) => Self::Class {
                class_name: context_type,
            },
            Some(ContextRef {
                context_type,
                context_id: Some(id),
            }) => Self::Instance {
                class_name: context_type,
                id,
            },
        }
    }
}

impl ContextRef {
    /// Stored form from raw columns, `None` when both are NULL
    pub fn from_columns(
        context_type: Option<String>,
        context_id: Option<i32>,
    ) -> RbacResult<Option<ContextRef>> {
        Ok(Context::from_columns(context_type, context_id)?.to_ref())
    }

    /// Same stored context, comparing the type case-insensitively
    pub fn matches_ignore_case(&self, other: &ContextRef) -> bool {
        self.context_id == other.context_id
            && self.context_type.eq_ignore_ascii_case(&other.context_type)
    }
}

/// Anything accepted as a context argument
pub trait IntoContext {
    fn into_context(self) -> RbacResult<Context>;
}

impl IntoContext for Context {
    fn into_context(self) -> RbacResult<Context> {
        Ok(self)
    }
}

impl IntoContext for &Context {
    fn into_context(self) -> RbacResult<Context> {
        Ok(self.clone())
    }
}

impl IntoContext for &str {
    fn into_context(self) -> RbacResult<Context> {
        self.parse()
    }
}

impl IntoContext for ContextRef {
    fn into_context(self) -> RbacResult<Context> {
        Context::from_columns(Some(self.context_type), self.context_id)
    }
}

/// Absent context means global
impl<T: IntoContext> IntoContext for Option<T> {
    fn into_context(self) -> RbacResult<Context> {
        match self {
            Some(source) => source.into_context(),
            None => Ok(Context::Global),
        }
    }
}

/// A saved record is an instance context; an unsaved one scopes to its type
impl<R: Resource + ?Sized> IntoContext for &R {
    fn into_context(self) -> RbacResult<Context> {
        let resource_type = self.resource_type();
        let context_type = (!resource_type.is_empty()).then(|| resource_type.to_string());
        Context::from_columns(context_type, self.resource_id())
    }
}

/// Predicate on one nullable context column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMatch<T> {
    /// `column = value`
    Equals(T),
    /// `column IS NULL`
    IsNull,
    /// `(column IS NULL OR column = value)`
    NullOrEquals(T),
}

impl<T> ColumnMatch<T> {
    /// `column = value`, or `column IS NULL` when there is no value
    pub fn is_or_equal(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Equals(value),
            None => Self::IsNull,
        }
    }

    /// `(column IS NULL OR column = value)`, or `column IS NULL` when there is no value
    pub fn null_or_equal(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::NullOrEquals(value),
            None => Self::IsNull,
        }
    }
}

impl<T: PartialEq> ColumnMatch<T> {
    /// Evaluate the predicate against a column value
    pub fn matches(&self, column: Option<&T>) -> bool {
        match self {
            Self::Equals(value) => column == Some(value),
            Self::IsNull => column.is_none(),
            Self::NullOrEquals(value) => column.is_none() || column == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Post {
        id: Option<i32>,
    }

    impl Resource for Post {
        fn resource_type(&self) -> &str {
            "Post"
        }

        fn resource_id(&self) -> Option<i32> {
            self.id
        }
    }

    impl ResourceKind for Post {
        const RESOURCE_TYPE: &'static str = "Post";
    }

    struct Orphan;

    impl Resource for Orphan {
        fn resource_type(&self) -> &str {
            ""
        }

        fn resource_id(&self) -> Option<i32> {
            Some(7)
        }
    }

    #[test]
    fn test_parse_records() {
        assert_eq!(
            Context::parse(&Post { id: Some(42) }).unwrap(),
            Context::instance("Post", 42)
        );
        assert_eq!(Context::parse(&Post { id: None }).unwrap(), Context::class("Post"));
        assert_eq!(Context::of_kind::<Post>(), Context::class("Post"));
        assert_eq!(Context::parse(None::<&Context>).unwrap(), Context::Global);

        let err = Context::parse(&Orphan).unwrap_err();
        assert!(err.is_invalid_context());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("global".parse::<Context>().unwrap(), Context::Global);
        assert_eq!("".parse::<Context>().unwrap(), Context::Global);
        assert_eq!("Post".parse::<Context>().unwrap(), Context::class("Post"));
        assert_eq!("Post:42".parse::<Context>().unwrap(), Context::instance("Post", 42));
        assert_eq!(
            "Blog::Post".parse::<Context>().unwrap(),
            Context::class("Blog::Post")
        );
        assert_eq!(
            "Blog::Post:7".parse::<Context>().unwrap(),
            Context::instance("Blog::Post", 7)
        );

        assert!(":42".parse::<Context>().unwrap_err().is_invalid_context());
        assert!("Post:abc".parse::<Context>().unwrap_err().is_invalid_context());
        assert!("Post:".parse::<Context>().unwrap_err().is_invalid_context());
    }

    #[test]
    fn test_display_round_trips() {
        for context in [
            Context::Global,
            Context::class("Post"),
            Context::instance("Blog::Post", 3),
        ] {
            assert_eq!(context.to_string().parse::<Context>().unwrap(), context);
        }
    }

    #[test]
    fn test_stored_form() {
        assert_eq!(Context::Global.to_ref(), None);
        assert_eq!(Context::from(None), Context::Global);

        let stored = Context::instance("Post", 42).to_ref();
        assert_eq!(
            stored,
            Some(ContextRef {
                context_type: "Post".to_string(),
                context_id: Some(42)
            })
        );
        assert_eq!(Context::from(stored), Context::instance("Post", 42));

        assert!(ContextRef::from_columns(None, Some(1)).is_err());
        assert_eq!(ContextRef::from_columns(Some(String::new()), None).unwrap(), None);
    }

    #[test]
    fn test_chain() {
        assert_eq!(Context::Global.chain(), vec![Context::Global]);
        assert_eq!(
            Context::class("Post").chain(),
            vec![Context::class("Post"), Context::Global]
        );
        assert_eq!(
            Context::instance("Post", 1).chain(),
            vec![Context::instance("Post", 1), Context::class("Post"), Context::Global]
        );
        assert_eq!(
            Context::instance("Post", 1).lookup_chain(true),
            vec![Context::instance("Post", 1)]
        );
    }

    #[test]
    fn test_verify_target_context() {
        let post_1 = Context::instance("Post", 1);
        let post_2 = Context::instance("Post", 2);
        let posts = Context::class("Post");
        let comments = Context::class("Comment");

        assert!(verify_target_context(&Context::Global, &post_1));
        assert!(verify_target_context(&Context::Global, &Context::Global));
        assert!(verify_target_context(&posts, &post_1));
        assert!(verify_target_context(&posts, &posts));
        assert!(!verify_target_context(&posts, &comments));
        assert!(!verify_target_context(&posts, &Context::Global));
        assert!(verify_target_context(&post_1, &post_1));
        assert!(!verify_target_context(&post_1, &post_2));
        assert!(!verify_target_context(&post_1, &posts));
    }

    #[test]
    fn test_column_match() {
        let exact = ColumnMatch::is_or_equal(Some(42));
        assert!(exact.matches(Some(&42)));
        assert!(!exact.matches(None));

        let null = ColumnMatch::<i32>::is_or_equal(None);
        assert!(null.matches(None));
        assert!(!null.matches(Some(&42)));

        let wildcard = ColumnMatch::null_or_equal(Some(42));
        assert!(wildcard.matches(None));
        assert!(wildcard.matches(Some(&42)));
        assert!(!wildcard.matches(Some(&7)));
    }
}
