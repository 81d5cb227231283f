//! Resolver configuration.

/// How the resolver treats pointers it cannot map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Fail with [`DumpError::UnresolvedObject`](crate::DumpError::UnresolvedObject)
    /// on the first pointer or root naming an id that is not in the dump.
    /// When unset, such pointers become
    /// [`PointerTarget::Unresolved`](crate::PointerTarget::Unresolved) and an
    /// anomaly is reported. Default: `false`.
    pub strict_unresolved: bool,
    /// Keep null references as [`PointerTarget::Null`](crate::PointerTarget::Null)
    /// entries so outgoing pointer lists stay aligned with field order.
    /// Default: `true`.
    pub keep_null_pointers: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strict_unresolved: false,
            keep_null_pointers: true,
        }
    }
}

impl ResolverConfig {
    /// The default configuration with strict resolution enabled.
    pub fn strict() -> Self {
        Self {
            strict_unresolved: true,
            ..Self::default()
        }
    }
}
