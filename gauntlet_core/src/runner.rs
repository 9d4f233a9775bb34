use crate::generator::Gen;
use crate::property::{FailSignal, InvalidSignal};
use crate::source::ByteSource;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::Once;

/// Distinguishes a deliberate counterexample from an unplanned panic.
/// Both abort the iteration the same way; reports tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Fail,
    Crash,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Fail => f.write_str("failed"),
            FailureKind::Crash => f.write_str("crashed"),
        }
    }
}

/// Everything a human (or the CLI's JSON writer) needs to understand a
/// failing case: which test, what went wrong, the offending value, and a
/// hash of the raw input buffer that reproduces it.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub test_name: String,
    pub kind: FailureKind,
    pub message: String,
    pub counterexample: Option<String>,
    pub input_hash: String,
}

/// The four-valued termination protocol of one test iteration.
#[derive(Debug)]
pub enum TestOutcome {
    Pass,
    /// The generated case was uninteresting (guard, bad_test, or the
    /// input buffer ran dry mid-generation). Not a failure.
    Invalid,
    Fail(FailureReport),
    Crash(FailureReport),
}

impl TestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Fail(_) | TestOutcome::Crash(_))
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            TestOutcome::Fail(report) | TestOutcome::Crash(report) => Some(report),
            TestOutcome::Pass | TestOutcome::Invalid => None,
        }
    }
}

/// Run one property against one input buffer and classify the result.
///
/// The property is invoked under `catch_unwind`; this is the only place an
/// unwind crosses, and nothing is ever rethrown. Byte exhaustion during
/// generation short-circuits to [`TestOutcome::Invalid`] without invoking
/// the property at all.
pub fn run_property<T: 'static>(
    test_name: &str,
    generator: &Gen<T>,
    property: &(dyn Fn(T) + Send + Sync),
    buffer: &[u8],
) -> TestOutcome {
    let mut source = ByteSource::new(buffer);
    let value = match generator.run(&mut source) {
        Ok(value) => value,
        Err(_) => return TestOutcome::Invalid,
    };

    match catch_unwind(AssertUnwindSafe(|| property(value))) {
        Ok(()) => TestOutcome::Pass,
        Err(payload) => classify_unwind(payload, test_name, generator, buffer),
    }
}

fn classify_unwind<T: 'static>(
    payload: Box<dyn Any + Send>,
    test_name: &str,
    generator: &Gen<T>,
    buffer: &[u8],
) -> TestOutcome {
    if payload.downcast_ref::<InvalidSignal>().is_some() {
        return TestOutcome::Invalid;
    }

    let (kind, message) = if let Some(signal) = payload.downcast_ref::<FailSignal>() {
        (FailureKind::Fail, signal.message.clone())
    } else if let Some(text) = payload.downcast_ref::<&str>() {
        (FailureKind::Crash, text.to_string())
    } else if let Some(text) = payload.downcast_ref::<String>() {
        (FailureKind::Crash, text.clone())
    } else {
        (FailureKind::Crash, "unknown panic payload".to_string())
    };

    let report = FailureReport {
        test_name: test_name.to_string(),
        kind,
        message,
        counterexample: render_counterexample(generator, buffer),
        input_hash: format!("{:x}", md5::compute(buffer)),
    };
    match kind {
        FailureKind::Fail => TestOutcome::Fail(report),
        FailureKind::Crash => TestOutcome::Crash(report),
    }
}

/// Rebuild the failing value for the report by replaying the generator
/// over the same buffer. Generation is deterministic, so this is the exact
/// value the property saw.
fn render_counterexample<T: 'static>(generator: &Gen<T>, buffer: &[u8]) -> Option<String> {
    let mut source = ByteSource::new(buffer);
    generator
        .run(&mut source)
        .ok()
        .map(|value| generator.show(&value))
}

/// Suppress the default panic banner for the two outcome signals, which
/// are control flow here, not programmer errors. Installed once per
/// process; every other panic still reaches the previous hook.
pub fn install_quiet_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let payload = info.payload();
            if payload.is::<FailSignal>() || payload.is::<InvalidSignal>() {
                return;
            }
            previous(info);
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{self, uint8};
    use crate::property::{check_eq, guard};

    #[test]
    fn returning_normally_is_a_pass() {
        let outcome = run_property("always-true", &uint8(), &|_value| {}, &[0x07]);
        assert!(matches!(outcome, TestOutcome::Pass));
    }

    #[test]
    fn a_failing_check_eq_reports_both_values_and_the_counterexample() {
        install_quiet_panic_hook();
        let tree = generator::int();
        let outcome = run_property(
            "off-by-one",
            &tree,
            &|value: i64| check_eq(&value, &(value + 1)),
            &[0x05, 0, 0, 0, 0, 0, 0, 0],
        );
        let report = outcome.failure().expect("expected a failure");
        assert_eq!(report.kind, FailureKind::Fail);
        assert_eq!(report.test_name, "off-by-one");
        assert!(report.message.contains('5') && report.message.contains('6'));
        assert_eq!(report.counterexample.as_deref(), Some("5"));
    }

    #[test]
    fn guard_false_is_invalid_not_a_failure() {
        install_quiet_panic_hook();
        let outcome = run_property("guarded", &uint8(), &|_value| guard(false), &[0x01]);
        assert!(matches!(outcome, TestOutcome::Invalid));
    }

    #[test]
    fn truncated_input_is_invalid_and_skips_the_property() {
        let outcome = run_property(
            "needs-four-bytes",
            &generator::int32(),
            &|_value| panic!("property must not run"),
            &[0x01, 0x02],
        );
        assert!(matches!(outcome, TestOutcome::Invalid));
    }

    #[test]
    fn a_stray_panic_is_classified_as_a_crash_with_its_message() {
        let outcome = run_property(
            "panics",
            &uint8(),
            &|value: u8| {
                if value == 0xFF {
                    panic!("Boom!");
                }
            },
            &[0xFF],
        );
        let report = outcome.failure().expect("expected a failure");
        assert_eq!(report.kind, FailureKind::Crash);
        assert!(report.message.contains("Boom!"));
    }

    #[test]
    fn the_input_hash_identifies_the_raw_buffer() {
        install_quiet_panic_hook();
        let buffer = [0xAB, 0xCD];
        let outcome = run_property(
            "hashing",
            &uint8(),
            &|_value| crate::property::fail("nope"),
            &buffer,
        );
        let report = outcome.failure().unwrap();
        assert_eq!(report.input_hash, format!("{:x}", md5::compute(buffer)));
    }

    #[test]
    fn counterexamples_render_through_the_attached_printer() {
        install_quiet_panic_hook();
        let masked = uint8().with_printer(std::sync::Arc::new(
            |out: &mut dyn std::fmt::Write, _value: &u8| out.write_str("#masked#"),
        ));
        let outcome = run_property(
            "masked",
            &masked,
            &|_value| crate::property::fail("nope"),
            &[0x11],
        );
        assert_eq!(
            outcome.failure().unwrap().counterexample.as_deref(),
            Some("#masked#")
        );
    }

    #[test]
    fn printerless_counterexamples_fall_back_to_the_placeholder() {
        install_quiet_panic_hook();
        let opaque = uint8().map(|value| value as u32);
        let outcome = run_property(
            "opaque",
            &opaque,
            &|_value| crate::property::fail("nope"),
            &[0x11],
        );
        assert_eq!(
            outcome.failure().unwrap().counterexample.as_deref(),
            Some(crate::printer::UNPRINTABLE)
        );
    }
}
