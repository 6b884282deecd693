//! Named policies that can be put in effect for the calling thread.
//!
//! A policy is a marker: instituting it says "this behavior is active here", for
//! example to stop a retried operation from retrying again further down the stack.
mod namespace;

pub use namespace::PolicyNamespace;

use std::borrow::Cow;
use std::sync::Arc;

/// A named marker whose presence in a thread's registry means "this is in effect here".
///
/// Registries compare instances by identity: another instance with the same name is a
/// different policy. Each implementing type supplies its own [`PolicyNamespace`],
/// usually a `static`.
///
/// # Example
///
/// ```rust
/// use retry_helper::{Policy, PolicyHandle, PolicyNamespace};
/// use std::sync::Arc;
///
/// struct NoRetry(&'static str);
///
/// impl Policy for NoRetry {
///     fn name(&self) -> &str {
///         self.0
///     }
///
///     fn namespace() -> &'static PolicyNamespace<Self> {
///         static NAMESPACE: PolicyNamespace<NoRetry> = PolicyNamespace::new();
///         &NAMESPACE
///     }
/// }
///
/// let policy = Arc::new(NoRetry("uploads"));
/// assert!(policy.institute());
/// assert!(policy.in_effect());
/// assert!(!Arc::new(NoRetry("uploads")).institute());
/// assert!(policy.revoke());
/// ```
pub trait Policy: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn namespace() -> &'static PolicyNamespace<Self>
    where
        Self: Sized;
}

/// Instance-level shortcuts delegating to the policy type's namespace.
pub trait PolicyHandle {
    /// See [`PolicyNamespace::institute_policy`].
    fn institute(&self) -> bool;
    /// See [`PolicyNamespace::revoke_policy`].
    fn revoke(&self) -> bool;
    /// See [`PolicyNamespace::policy_in_effect`].
    fn in_effect(&self) -> bool;
}

impl<P: Policy> PolicyHandle for Arc<P> {
    fn institute(&self) -> bool {
        P::namespace().institute_policy(self)
    }

    fn revoke(&self) -> bool {
        P::namespace().revoke_policy(self)
    }

    fn in_effect(&self) -> bool {
        P::namespace().policy_in_effect(self)
    }
}

/// A general-purpose policy identified by name alone.
#[derive(Debug)]
pub struct NamedPolicy {
    name: Cow<'static, str>,
}

impl NamedPolicy {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }
}

impl Policy for NamedPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace() -> &'static PolicyNamespace<Self> {
        static NAMESPACE: PolicyNamespace<NamedPolicy> = PolicyNamespace::new();
        &NAMESPACE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::lorem::en::Word;
    use fake::Fake;
    use std::thread;

    #[derive(Debug)]
    struct AuditPolicy(String);

    impl Policy for AuditPolicy {
        fn name(&self) -> &str {
            &self.0
        }

        fn namespace() -> &'static PolicyNamespace<Self> {
            static NAMESPACE: PolicyNamespace<AuditPolicy> = PolicyNamespace::new();
            &NAMESPACE
        }
    }

    // Tests share the process-wide namespaces, so each one works under its own names.
    fn unique_name(prefix: &str) -> String {
        format!("{}-{}-{}", prefix, Word().fake::<String>(), uuid::Uuid::new_v4())
    }

    #[test]
    fn name_is_kept() {
        let name = unique_name("named");

        assert_eq!(NamedPolicy::new(name.clone()).name(), name);
        assert_eq!(NamedPolicy::new("static").name(), "static");
    }

    #[test]
    fn handle_delegates_to_the_namespace() {
        let policy = Arc::new(NamedPolicy::new(unique_name("handle")));

        assert!(!policy.in_effect());
        assert!(policy.institute());
        assert!(NamedPolicy::namespace().policy_in_effect(&policy));
        assert!(policy.in_effect());
        assert!(!policy.institute());
        assert!(policy.revoke());
        assert!(!NamedPolicy::namespace().policy_in_effect(&policy));
        assert!(!policy.revoke());
    }

    #[test]
    fn instituting_only_affects_the_calling_thread() {
        let policy = Arc::new(NamedPolicy::new(unique_name("thread")));

        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(policy.institute());
                assert!(policy.in_effect());
            });
        });

        assert!(!policy.in_effect());
    }

    #[test]
    fn policy_types_have_separate_namespaces() {
        let name = unique_name("shared");
        let named = Arc::new(NamedPolicy::new(name.clone()));
        let audit = Arc::new(AuditPolicy(name.clone()));

        assert!(named.institute());
        assert!(audit.institute());
        assert!(NamedPolicy::namespace().current(&name).is_some());
        assert!(named.revoke());
        assert!(audit.in_effect());
        assert!(AuditPolicy::namespace().current(&name).is_some());
    }
}
