use crate::policies::Policy;
use std::any::Any;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

type Registry<P> = HashMap<String, Arc<P>>;

static NEXT_NAMESPACE_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    // Registries forked by this thread, keyed by namespace id.
    static FORKED: RefCell<HashMap<usize, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// The set of policies of one type that are in effect, as seen by each thread.
///
/// The root thread works directly on the namespace's root registry. Any other thread
/// gets a private copy of the root registry the first time it touches the namespace;
/// from then on the two evolve independently and the copy never sees later changes
/// to the root, nor the root changes made in the copy. Threads never see each other's
/// copies.
///
/// The root thread is the one that calls [`PolicyNamespace::claim_root`], or failing
/// that the process's `main` thread once it accesses the namespace.
///
/// Every policy type owns its own namespace, so equal names in different policy types
/// never collide.
pub struct PolicyNamespace<P> {
    id: OnceLock<usize>,
    root_thread: OnceLock<ThreadId>,
    root: Mutex<Option<Registry<P>>>,
}

impl<P> PolicyNamespace<P> {
    pub const fn new() -> Self {
        Self {
            id: OnceLock::new(),
            root_thread: OnceLock::new(),
            root: Mutex::new(None),
        }
    }
}

impl<P> Default for PolicyNamespace<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for PolicyNamespace<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyNamespace")
            .field("id", &self.id.get())
            .field("root_thread", &self.root_thread.get())
            .finish()
    }
}

impl<P: Policy> PolicyNamespace<P> {
    /// Make the calling thread the root, unless another thread already is.
    ///
    /// A thread that has already forked its own copy cannot become the root, since
    /// that copy would silently drop out of view. Returns whether the calling thread
    /// is the root afterwards.
    pub fn claim_root(&self) -> bool {
        let current = thread::current().id();
        if self.has_forked() {
            return self.root_thread.get() == Some(&current);
        }
        *self.root_thread.get_or_init(|| current) == current
    }

    /// Put `policy` in effect for the calling thread.
    ///
    /// Returns false, changing nothing, if a policy with the same name is already in effect.
    pub fn institute_policy(&self, policy: &Arc<P>) -> bool {
        self.with_registry(|registry| match registry.entry(policy.name().to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(policy));
                true
            }
        })
    }

    /// Whether this exact instance is the one in effect for its name.
    pub fn policy_in_effect(&self, policy: &Arc<P>) -> bool {
        self.with_registry(|registry| is_active(registry, policy))
    }

    /// Take `policy` out of effect for the calling thread.
    ///
    /// Returns false, changing nothing, unless this exact instance is in effect.
    pub fn revoke_policy(&self, policy: &Arc<P>) -> bool {
        let revoked = self.with_registry(|registry| {
            if is_active(registry, policy) {
                registry.remove(policy.name())
            } else {
                None
            }
        });
        // Dropped outside the registry borrow, in case `P`'s destructor touches it.
        revoked.is_some()
    }

    /// The instance in effect under `name`, if any.
    pub fn current(&self, name: &str) -> Option<Arc<P>> {
        self.with_registry(|registry| registry.get(name).cloned())
    }

    /// Names of all policies in effect, sorted.
    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.with_registry(|registry| registry.keys().cloned().collect());
        names.sort();
        names
    }

    fn id(&self) -> usize {
        *self
            .id
            .get_or_init(|| NEXT_NAMESPACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    fn has_forked(&self) -> bool {
        match self.id.get() {
            Some(id) => FORKED.with(|forked| forked.borrow().contains_key(id)),
            None => false,
        }
    }

    fn is_root(&self) -> bool {
        let current = thread::current();
        match self.root_thread.get() {
            Some(root) => *root == current.id(),
            None if current.name() == Some("main") => self.claim_root(),
            None => false,
        }
    }

    fn lock_root(&self) -> MutexGuard<'_, Option<Registry<P>>> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fork(&self) -> Registry<P> {
        self.lock_root().get_or_insert_with(HashMap::new).clone()
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry<P>) -> R) -> R {
        if self.is_root() {
            let mut root = self.lock_root();
            return f(root.get_or_insert_with(HashMap::new));
        }

        let id = self.id();
        FORKED.with(|forked| {
            let mut forked = forked.borrow_mut();
            let registry = forked
                .entry(id)
                .or_insert_with(|| Box::new(self.fork()))
                .downcast_mut::<Registry<P>>()
                // Namespace ids are never reused, so the slot always holds this namespace's type.
                .expect("Forked registry should match its namespace");
            f(registry)
        })
    }
}

fn is_active<P>(registry: &Registry<P>, policy: &Arc<P>) -> bool
where
    P: Policy,
{
    registry
        .get(policy.name())
        .is_some_and(|active| Arc::ptr_eq(active, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::NamedPolicy;
    use std::sync::mpsc;

    fn policy(name: &str) -> Arc<NamedPolicy> {
        Arc::new(NamedPolicy::new(name.to_owned()))
    }

    fn rooted() -> PolicyNamespace<NamedPolicy> {
        let namespace = PolicyNamespace::new();
        assert!(namespace.claim_root());
        namespace
    }

    #[test]
    fn institutes_a_policy_that_is_not_in_effect() {
        let namespace = rooted();
        let policy = policy("test");

        assert!(namespace.institute_policy(&policy));
        assert!(namespace.policy_in_effect(&policy));
        assert!(Arc::ptr_eq(&namespace.current("test").unwrap(), &policy));
    }

    #[test]
    fn refuses_a_second_instance_with_the_same_name() {
        let namespace = rooted();
        let first = policy("test");
        let second = policy("test");

        assert!(namespace.institute_policy(&first));
        assert!(!namespace.institute_policy(&second));
        assert!(!namespace.policy_in_effect(&second));
        assert!(namespace.policy_in_effect(&first));
    }

    #[test]
    fn revoking_another_instance_with_the_same_name_changes_nothing() {
        let namespace = rooted();
        let active = policy("test");
        namespace.institute_policy(&active);

        assert!(!namespace.revoke_policy(&policy("test")));
        assert!(namespace.policy_in_effect(&active));
    }

    #[test]
    fn revokes_the_policy_in_effect() {
        let namespace = rooted();
        let policy = policy("test");
        namespace.institute_policy(&policy);

        assert!(namespace.revoke_policy(&policy));
        assert!(!namespace.policy_in_effect(&policy));
        assert!(namespace.current("test").is_none());
        assert!(!namespace.revoke_policy(&policy));
    }

    #[test]
    fn active_names_are_sorted() {
        let namespace = rooted();
        for name in ["gamma", "alpha", "beta"] {
            namespace.institute_policy(&policy(name));
        }

        assert_eq!(namespace.active_names(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn only_one_thread_can_claim_the_root() {
        let namespace = rooted();

        thread::scope(|scope| {
            scope.spawn(|| assert!(!namespace.claim_root()));
        });
        assert!(namespace.claim_root());
    }

    #[test]
    fn child_threads_start_from_a_copy_of_the_root() {
        let namespace = rooted();
        let shared = policy("shared");
        namespace.institute_policy(&shared);

        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(namespace.policy_in_effect(&shared));
                assert!(namespace.revoke_policy(&shared));
                assert!(!namespace.policy_in_effect(&shared));
            });
        });

        assert!(namespace.policy_in_effect(&shared));
    }

    #[test]
    fn later_root_changes_stay_invisible_to_forked_threads() {
        let namespace = &rooted();
        let late = &policy("late");
        let (forked_tx, forked_rx) = mpsc::channel();
        let (instituted_tx, instituted_rx) = mpsc::channel::<()>();

        thread::scope(|scope| {
            scope.spawn(move || {
                assert!(namespace.active_names().is_empty());
                forked_tx.send(()).unwrap();
                instituted_rx.recv().unwrap();
                assert!(!namespace.policy_in_effect(late));
                assert!(namespace.current("late").is_none());
            });

            forked_rx.recv().unwrap();
            assert!(namespace.institute_policy(late));
            instituted_tx.send(()).unwrap();
        });

        assert!(namespace.policy_in_effect(late));
    }

    #[test]
    fn sibling_threads_never_see_each_other() {
        let namespace = rooted();
        let mine = policy("worker");

        thread::scope(|scope| {
            scope.spawn(|| assert!(namespace.institute_policy(&mine)));
        });
        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(!namespace.policy_in_effect(&mine));
                assert!(namespace.current("worker").is_none());
            });
        });

        assert!(!namespace.policy_in_effect(&mine));
    }

    #[test]
    fn unrooted_namespace_still_forks_from_an_empty_root() {
        let namespace: PolicyNamespace<NamedPolicy> = PolicyNamespace::new();
        let policy = policy("test");

        thread::scope(|scope| {
            scope.spawn(|| {
                assert!(namespace.institute_policy(&policy));
                assert!(namespace.policy_in_effect(&policy));
            });
        });

        assert!(namespace.lock_root().is_some());
    }

    #[test]
    fn main_thread_becomes_the_root_on_first_access() {
        let namespace = &PolicyNamespace::<NamedPolicy>::new();
        let seeded = &policy("seeded");

        thread::scope(|scope| {
            thread::Builder::new()
                .name("main".to_owned())
                .spawn_scoped(scope, move || {
                    assert!(namespace.institute_policy(seeded));
                })
                .unwrap();
        });
        thread::scope(|scope| {
            scope.spawn(move || {
                assert!(namespace.policy_in_effect(seeded));
                assert!(!namespace.claim_root());
            });
        });

        assert!(namespace.lock_root().as_ref().unwrap().contains_key("seeded"));
        assert!(!namespace.claim_root());
    }

    #[test]
    fn forked_thread_cannot_claim_the_root() {
        let namespace = &PolicyNamespace::<NamedPolicy>::new();
        let forked = &policy("forked");

        thread::scope(|scope| {
            scope.spawn(move || {
                assert!(namespace.institute_policy(forked));
                assert!(!namespace.claim_root());
                assert!(namespace.policy_in_effect(forked));
            });
        });

        assert!(namespace.claim_root());
        assert!(!namespace.policy_in_effect(forked));
    }

    #[test]
    fn namespaces_are_isolated_from_each_other() {
        let first = rooted();
        let second = rooted();
        let policy = policy("test");

        assert!(first.institute_policy(&policy));
        assert!(!second.policy_in_effect(&policy));
        assert!(second.institute_policy(&policy));
        assert!(first.revoke_policy(&policy));
        assert!(second.policy_in_effect(&policy));
    }
}
