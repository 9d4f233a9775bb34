use crate::generator::Gen;
use crate::runner::{self, TestOutcome};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Registration was attempted after the harness froze the registry.
    #[error("test registry is sealed; register tests before the harness starts")]
    Sealed,

    /// The selector matched neither a test name nor a valid index.
    #[error("no registered test matches selector {0:?}")]
    UnknownTest(String),
}

/// A named test: a generator tree and a property, erased into a closure
/// from raw input bytes to an outcome.
///
/// Type erasure happens here so the registry can hold tests over arbitrary
/// value types in one list.
pub struct RegisteredTest {
    name: String,
    execute: Box<dyn Fn(&[u8]) -> TestOutcome + Send + Sync>,
}

impl RegisteredTest {
    pub fn new<T: 'static>(
        name: impl Into<String>,
        generator: Gen<T>,
        property: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let report_name = name.clone();
        let execute = Box::new(move |buffer: &[u8]| {
            runner::run_property(&report_name, &generator, &property, buffer)
        });
        Self { name, execute }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run this test once against one input buffer.
    pub fn execute(&self, buffer: &[u8]) -> TestOutcome {
        (self.execute)(buffer)
    }
}

/// Append-only collection of tests with a single-writer phase followed by
/// a frozen phase. Sealing happens when the harness starts; registrations
/// after that point are programmer errors.
#[derive(Default)]
pub struct TestRegistry {
    tests: Vec<Arc<RegisteredTest>>,
    sealed: bool,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test: RegisteredTest) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed);
        }
        self.tests.push(Arc::new(test));
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tests.iter().map(|test| test.name.clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<Arc<RegisteredTest>> {
        self.tests.get(index).cloned()
    }

    /// Look a test up by numeric index or by name. Duplicate names are
    /// allowed at registration; the first match wins here.
    pub fn find(&self, selector: &str) -> Result<Arc<RegisteredTest>, RegistryError> {
        if let Ok(index) = selector.parse::<usize>() {
            return self
                .get(index)
                .ok_or_else(|| RegistryError::UnknownTest(selector.to_string()));
        }
        self.tests
            .iter()
            .find(|test| test.name == selector)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTest(selector.to_string()))
    }
}

static GLOBAL: Lazy<Mutex<TestRegistry>> = Lazy::new(|| Mutex::new(TestRegistry::new()));

fn with_global<R>(f: impl FnOnce(&mut TestRegistry) -> R) -> R {
    let mut registry = GLOBAL.lock().expect("test registry lock poisoned");
    f(&mut registry)
}

/// Register a named test in the process-wide registry.
///
/// # Panics
///
/// Panics when the registry is already sealed; use [`try_add_test`] to
/// handle that case as an error instead.
pub fn add_test<T: 'static>(
    name: impl Into<String>,
    generator: Gen<T>,
    property: impl Fn(T) + Send + Sync + 'static,
) {
    if let Err(error) = try_add_test(name, generator, property) {
        panic!("{error}");
    }
}

pub fn try_add_test<T: 'static>(
    name: impl Into<String>,
    generator: Gen<T>,
    property: impl Fn(T) + Send + Sync + 'static,
) -> Result<(), RegistryError> {
    with_global(|registry| registry.add(RegisteredTest::new(name, generator, property)))
}

/// Register a test without naming it; it gets `case-<index>`.
pub fn add_anonymous_test<T: 'static>(
    generator: Gen<T>,
    property: impl Fn(T) + Send + Sync + 'static,
) {
    with_global(|registry| {
        let name = format!("case-{}", registry.len());
        registry.add(RegisteredTest::new(name, generator, property))
    })
    .unwrap_or_else(|error| panic!("{error}"));
}

/// Freeze the process-wide registry. Called by the harness entry points.
pub fn seal() {
    with_global(|registry| registry.seal());
}

pub fn test_names() -> Vec<String> {
    with_global(|registry| registry.names())
}

pub fn find_test(selector: &str) -> Result<Arc<RegisteredTest>, RegistryError> {
    with_global(|registry| registry.find(selector))
}

pub fn first_test() -> Option<Arc<RegisteredTest>> {
    with_global(|registry| registry.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::uint8;
    use crate::runner::TestOutcome;

    fn sample_test(name: &str) -> RegisteredTest {
        RegisteredTest::new(name, uint8(), |_value| {})
    }

    #[test]
    fn add_then_find_by_name_and_index() {
        let mut registry = TestRegistry::new();
        registry.add(sample_test("first")).unwrap();
        registry.add(sample_test("second")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["first", "second"]);
        assert_eq!(registry.find("second").unwrap().name(), "second");
        assert_eq!(registry.find("1").unwrap().name(), "second");
        assert_eq!(registry.get(0).unwrap().name(), "first");
    }

    #[test]
    fn duplicate_names_are_allowed_and_first_match_wins() {
        let mut registry = TestRegistry::new();
        registry.add(sample_test("dup")).unwrap();
        registry.add(sample_test("dup")).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(
            &registry.find("dup").unwrap(),
            &registry.get(0).unwrap()
        ));
    }

    #[test]
    fn sealed_registry_rejects_registration() {
        let mut registry = TestRegistry::new();
        registry.seal();
        assert!(registry.is_sealed());
        assert!(matches!(
            registry.add(sample_test("late")),
            Err(RegistryError::Sealed)
        ));
    }

    #[test]
    fn unknown_selectors_are_reported_with_the_selector() {
        let registry = TestRegistry::new();
        match registry.find("missing") {
            Err(RegistryError::UnknownTest(selector)) => assert_eq!(selector, "missing"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(test) => panic!("unexpected match: {}", test.name()),
        }
        assert!(matches!(
            registry.find("7"),
            Err(RegistryError::UnknownTest(_))
        ));
    }

    #[test]
    fn registered_tests_execute_their_property() {
        let test = RegisteredTest::new("low-bytes-only", uint8(), |value: u8| {
            crate::property::check(value < 0x80);
        });
        assert!(matches!(test.execute(&[0x10]), TestOutcome::Pass));
        crate::runner::install_quiet_panic_hook();
        assert!(test.execute(&[0x90]).is_failure());
        assert!(matches!(test.execute(&[]), TestOutcome::Invalid));
    }
}
