//! Named strategy registries and shared strategy handles.
//!
//! A [`StrategyRegistry`] maps names to factories. Strategies are selected
//! with a specification string `name` or `name=args`; the factory receives
//! `args` and returns the strategy instance. [`StrategyHandle`] shares one
//! instance between any number of holders.

use crate::error::{RegistryError, Result, StrategyError};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Builds a strategy instance from the argument part of a specification.
pub type Factory<T> = dyn Fn(&str) -> std::result::Result<Box<T>, StrategyError> + Send + Sync;

/// Installs built-in strategies on first use of a registry.
pub type Installer<T> = fn(&StrategyRegistry<T>);

/// Reserved token selecting every registered strategy in name lists.
pub const ALL_TOKEN: &str = "all";

/// One registered strategy.
pub struct StrategyEntry<T: ?Sized> {
    name: String,
    help_token: Option<String>,
    removable: bool,
    factory: Box<Factory<T>>,
}

impl<T: ?Sized> StrategyEntry<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help_token(&self) -> Option<&str> {
        self.help_token.as_deref()
    }

    /// Help token when present, else the name.
    pub fn display_token(&self) -> &str {
        self.help_token.as_deref().unwrap_or(&self.name)
    }

    pub fn is_removable(&self) -> bool {
        self.removable
    }

    /// True if `spec` is this name, or this name followed by `=`.
    fn matches(&self, spec: &str) -> bool {
        let len = self.name.len();
        let Some(head) = spec.get(..len) else {
            return false;
        };
        head.eq_ignore_ascii_case(&self.name) && matches!(spec.as_bytes().get(len), None | Some(b'='))
    }
}

impl<T: ?Sized> fmt::Debug for StrategyEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("name", &self.name)
            .field("help_token", &self.help_token)
            .field("removable", &self.removable)
            .finish_non_exhaustive()
    }
}

/// Registry of named strategies of one kind.
///
/// Entries are kept in registration order and enumerated most recent first.
/// Built-ins come from an optional installer that runs once, on the first
/// call to any operation; calls made by the installer itself see the
/// partially installed registry.
pub struct StrategyRegistry<T: ?Sized> {
    kind: &'static str,
    entries: RefCell<Vec<Arc<StrategyEntry<T>>>>,
    installer: Option<Installer<T>>,
    initialized: Cell<bool>,
    initializing: Cell<bool>,
}

impl<T: ?Sized> StrategyRegistry<T> {
    /// Empty registry without built-ins.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RefCell::new(Vec::new()),
            installer: None,
            initialized: Cell::new(false),
            initializing: Cell::new(false),
        }
    }

    /// Registry whose built-ins are installed lazily by `installer`.
    pub fn with_installer(kind: &'static str, installer: Installer<T>) -> Self {
        Self {
            installer: Some(installer),
            ..Self::new(kind)
        }
    }

    /// Label used in log messages ("multiply", "init").
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn ensure_initialized(&self) {
        if self.initialized.get() || self.initializing.get() {
            return;
        }
        self.initializing.set(true);
        if let Some(install) = self.installer {
            install(self);
            log::debug!(
                "installed {} built-in {} strategies",
                self.entries.borrow().len(),
                self.kind
            );
        }
        self.initializing.set(false);
        self.initialized.set(true);
    }

    /// Register a removable strategy.
    pub fn register<F>(&self, name: &str, help_token: Option<&str>, factory: F) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&str) -> std::result::Result<Box<T>, StrategyError> + Send + Sync + 'static,
    {
        self.insert(name, help_token, Box::new(factory), true)
    }

    /// Register a strategy that [`unregister`](Self::unregister) will not remove.
    pub fn register_builtin<F>(&self, name: &str, help_token: Option<&str>, factory: F) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&str) -> std::result::Result<Box<T>, StrategyError> + Send + Sync + 'static,
    {
        self.insert(name, help_token, Box::new(factory), false)
    }

    fn insert(
        &self,
        name: &str,
        help_token: Option<&str>,
        factory: Box<Factory<T>>,
        removable: bool,
    ) -> std::result::Result<(), RegistryError> {
        self.ensure_initialized();
        validate_name(name)?;
        if self.find(name).is_some() {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        log::debug!("registered {} strategy '{}'", self.kind, name);
        self.entries.borrow_mut().push(Arc::new(StrategyEntry {
            name: name.to_string(),
            help_token: help_token.map(str::to_string),
            removable,
            factory,
        }));
        Ok(())
    }

    /// Remove a user-registered strategy. Returns whether anything was removed.
    ///
    /// Handles created from the entry stay valid.
    pub fn unregister(&self, name: &str) -> bool {
        self.ensure_initialized();
        let mut entries = self.entries.borrow_mut();
        let Some(pos) = entries
            .iter()
            .position(|e| e.removable && e.name.eq_ignore_ascii_case(name))
        else {
            return false;
        };
        entries.remove(pos);
        log::debug!("unregistered {} strategy '{}'", self.kind, name);
        true
    }

    /// Find the strategy selected by `spec` (`name` or `name=args`).
    ///
    /// The longest matching name wins, so `basic-fortran` is never shadowed
    /// by `basic`. Matching ignores ASCII case.
    pub fn lookup(&self, spec: &str) -> Option<Arc<StrategyEntry<T>>> {
        self.ensure_initialized();
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.matches(spec))
            .max_by_key(|e| e.name.len())
            .cloned()
    }

    /// Exact, case-insensitive name match.
    fn find(&self, name: &str) -> Option<Arc<StrategyEntry<T>>> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Canonical names, most recently registered first.
    pub fn registered_names(&self) -> Vec<String> {
        self.ensure_initialized();
        self.entries.borrow().iter().rev().map(|e| e.name.clone()).collect()
    }

    /// Display tokens, most recently registered first.
    pub fn names(&self) -> Vec<String> {
        self.ensure_initialized();
        self.entries
            .borrow()
            .iter()
            .rev()
            .map(|e| e.display_token().to_string())
            .collect()
    }

    /// Display tokens joined with `|`, for usage text.
    pub fn token_list(&self) -> String {
        self.names().join("|")
    }

    pub fn len(&self) -> usize {
        self.ensure_initialized();
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a comma-separated selection to `current`.
    ///
    /// Tokens are names prefixed by `+` (add, the default) or `-` (remove).
    /// `all` stands for every registered name. A leading `=` starts from an
    /// empty set instead of `current`.
    pub fn parse_name_list(
        &self,
        current: &BTreeSet<String>,
        spec: &str,
    ) -> std::result::Result<BTreeSet<String>, RegistryError> {
        self.ensure_initialized();
        let (mut selected, body) = match spec.strip_prefix('=') {
            Some(rest) => (BTreeSet::new(), rest),
            None => (current.clone(), spec),
        };

        for raw in body.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            let (add, name) = match token.strip_prefix('-') {
                Some(rest) => (false, rest),
                None => (true, token.strip_prefix('+').unwrap_or(token)),
            };
            if name.is_empty() {
                return Err(RegistryError::InvalidList {
                    spec: spec.to_string(),
                    token: token.to_string(),
                });
            }

            if name.eq_ignore_ascii_case(ALL_TOKEN) {
                if add {
                    selected.extend(self.registered_names());
                } else {
                    selected.clear();
                }
                continue;
            }

            let entry = self
                .find(name)
                .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
            if add {
                selected.insert(entry.name.clone());
            } else {
                selected.remove(&entry.name);
            }
        }
        Ok(selected)
    }

    /// Allocate a strategy instance from `spec`.
    ///
    /// Everything after the first `=` is handed to the factory; without `=`
    /// the factory receives an empty string.
    pub fn create(&self, spec: &str) -> Result<StrategyHandle<T>> {
        self.ensure_initialized();
        let (name, args) = spec.split_once('=').unwrap_or((spec, ""));
        let entry = self
            .find(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        let instance = (entry.factory)(args)?;
        log::debug!("allocated {} strategy '{}'", self.kind, spec);
        Ok(StrategyHandle {
            entry,
            instance: Arc::from(instance),
            spec: spec.to_string(),
        })
    }
}

impl<T: ?Sized> fmt::Debug for StrategyRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kind", &self.kind)
            .field("entries", &self.entries.borrow())
            .field("initialized", &self.initialized.get())
            .finish()
    }
}

fn validate_name(name: &str) -> std::result::Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if name.eq_ignore_ascii_case(ALL_TOKEN)
        || name.contains(['=', ','])
        || name.contains(char::is_whitespace)
        || name.starts_with(['+', '-'])
    {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Shared reference to an allocated strategy instance.
///
/// Cloning retains the instance; it is released when the last clone drops.
pub struct StrategyHandle<T: ?Sized> {
    entry: Arc<StrategyEntry<T>>,
    instance: Arc<T>,
    spec: String,
}

impl<T: ?Sized> StrategyHandle<T> {
    /// Canonical registered name.
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    /// Specification the handle was created from.
    pub fn specification(&self) -> &str {
        &self.spec
    }

    pub fn instance(&self) -> &T {
        &self.instance
    }

    /// Number of live handles sharing this instance.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.instance)
    }
}

impl<T: ?Sized> Clone for StrategyHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            instance: Arc::clone(&self.instance),
            spec: self.spec.clone(),
        }
    }
}

impl<T: ?Sized> Drop for StrategyHandle<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.instance) == 1 {
            log::debug!("released strategy '{}'", self.spec);
        }
    }
}

impl<T: ?Sized> fmt::Debug for StrategyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyHandle")
            .field("name", &self.entry.name)
            .field("spec", &self.spec)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MmbenchError;
    use std::sync::atomic::{AtomicBool, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Echo(String);

    impl Greeter for Echo {
        fn greet(&self) -> String {
            self.0.clone()
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Greeter for DropFlag {
        fn greet(&self) -> String {
            "flag".into()
        }
    }

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn echo(args: &str) -> std::result::Result<Box<dyn Greeter>, StrategyError> {
        Ok(Box::new(Echo(args.to_string())))
    }

    fn install_greeters(registry: &StrategyRegistry<dyn Greeter>) {
        // Re-entrant calls must see the registry as it is being built.
        assert!(registry.lookup("basic").is_none());
        for name in ["opt", "basic-fortran", "basic"] {
            registry
                .register_builtin(name, None, echo)
                .expect("built-in names are valid");
        }
        assert!(registry.lookup("basic").is_some());
    }

    fn registry() -> StrategyRegistry<dyn Greeter> {
        StrategyRegistry::with_installer("greeter", install_greeters)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn should_prefer_longest_matching_name() {
        let reg = registry();
        assert_eq!(reg.lookup("basic").unwrap().name(), "basic");
        assert_eq!(reg.lookup("basic-fortran").unwrap().name(), "basic-fortran");
        assert_eq!(reg.lookup("basic=5").unwrap().name(), "basic");
        assert_eq!(reg.lookup("BASIC-Fortran=x").unwrap().name(), "basic-fortran");
        assert!(reg.lookup("basicx").is_none());
        assert!(reg.lookup("bas").is_none());
    }

    #[test]
    fn should_install_builtins_once_in_natural_order() {
        let reg = registry();
        assert_eq!(reg.names(), ["basic", "basic-fortran", "opt"]);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.token_list(), "basic|basic-fortran|opt");
    }

    #[test]
    fn should_reject_invalid_and_duplicate_names() {
        let reg = registry();
        assert_eq!(reg.register("", None, echo), Err(RegistryError::EmptyName));
        for bad in ["a=b", "a,b", "a b", "all", "ALL", "-x"] {
            assert!(matches!(
                reg.register(bad, None, echo),
                Err(RegistryError::InvalidName(_))
            ));
        }
        assert_eq!(
            reg.register("BASIC", None, echo),
            Err(RegistryError::Duplicate("BASIC".into()))
        );
    }

    #[test]
    fn should_list_user_registrations_first_with_help_token() {
        let reg = registry();
        reg.register("greet", Some("greet{=<text>}"), echo).unwrap();
        assert_eq!(reg.names()[0], "greet{=<text>}");
        assert_eq!(reg.registered_names()[0], "greet");
    }

    #[test]
    fn should_only_unregister_removable_entries() {
        let reg = registry();
        reg.register("custom", None, echo).unwrap();

        assert!(!reg.unregister("basic"));
        assert!(!reg.unregister("missing"));
        assert!(reg.unregister("CUSTOM"));
        assert!(reg.lookup("custom").is_none());
        assert!(reg.lookup("basic").is_some());
    }

    #[test]
    fn should_apply_name_list_operations() {
        let reg = registry();
        reg.register("blas", None, echo).unwrap();
        let current = set(&["basic", "opt"]);

        assert_eq!(reg.parse_name_list(&current, "-opt,+blas").unwrap(), set(&["basic", "blas"]));
        assert_eq!(
            reg.parse_name_list(&current, "=all").unwrap(),
            set(&["basic", "basic-fortran", "blas", "opt"])
        );
        assert_eq!(reg.parse_name_list(&current, "-all,+basic").unwrap(), set(&["basic"]));
        assert_eq!(reg.parse_name_list(&current, "=").unwrap(), set(&[]));
        assert_eq!(reg.parse_name_list(&current, "Basic-Fortran,,").unwrap(), set(&["basic", "basic-fortran", "opt"]));
    }

    #[test]
    fn should_reject_unknown_names_in_list() {
        let reg = registry();
        let err = reg.parse_name_list(&BTreeSet::new(), "basic,nope").unwrap_err();
        assert_eq!(err, RegistryError::Unknown("nope".into()));
        assert!(matches!(
            reg.parse_name_list(&BTreeSet::new(), "+"),
            Err(RegistryError::InvalidList { .. })
        ));
    }

    #[test]
    fn should_pass_arguments_to_factory() {
        let reg = registry();
        let handle = reg.create("basic=hello=world").unwrap();
        assert_eq!(handle.name(), "basic");
        assert_eq!(handle.specification(), "basic=hello=world");
        assert_eq!(handle.instance().greet(), "hello=world");

        assert_eq!(reg.create("opt").unwrap().instance().greet(), "");
    }

    #[test]
    fn should_fail_create_for_unknown_or_rejected_spec() {
        let reg = registry();
        assert!(matches!(
            reg.create("nope"),
            Err(MmbenchError::Registry(RegistryError::Unknown(_)))
        ));

        reg.register("picky", None, |args: &str| {
            Err(StrategyError::InvalidArgument {
                strategy: "picky".into(),
                message: format!("rejected '{args}'"),
            })
        })
        .unwrap();
        assert!(matches!(
            reg.create("picky=1"),
            Err(MmbenchError::Strategy(StrategyError::InvalidArgument { .. }))
        ));
    }

    #[test]
    fn should_release_instance_with_last_handle() {
        let reg = StrategyRegistry::<dyn Greeter>::new("greeter");
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        reg.register("flag", None, move |_: &str| {
            Ok(Box::new(DropFlag(Arc::clone(&flag))) as Box<dyn Greeter>)
        })
        .unwrap();

        let handle = reg.create("flag").unwrap();
        let retained = handle.clone();
        assert_eq!(handle.ref_count(), 2);

        drop(handle);
        assert!(!dropped.load(Ordering::SeqCst));
        assert_eq!(retained.instance().greet(), "flag");

        // The handle outlives its registry entry.
        assert!(reg.unregister("flag"));
        drop(retained);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
