use crate::ir::Literal;
use crate::visitor::FieldRef;

/// A `static final` (or instance `final`) field whose constant value a
/// literal was inlined from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedField {
    pub field: FieldRef,
    pub is_static: bool,
}

/// Class metadata lookup for constant fields.
///
/// Implementations typically index the `ConstantValue` attributes of the
/// classes on the classpath.
pub trait ConstantResolver {
    /// The constant field of `owner` (or its supertypes) holding `value`,
    /// when exactly one such field exists.
    fn constant_field(&self, owner: &str, value: &Literal) -> Option<ResolvedField>;
}

impl<F> ConstantResolver for F
where
    F: Fn(&str, &Literal) -> Option<ResolvedField>,
{
    fn constant_field(&self, owner: &str, value: &Literal) -> Option<ResolvedField> {
        self(owner, value)
    }
}
