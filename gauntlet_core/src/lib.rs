//! Fuzzer-driven property testing.
//!
//! Properties are checked against structured values decoded from a raw
//! byte stream that an external coverage-guided fuzzer supplies. The
//! pieces: a [`source::ByteSource`] cursor over the fuzzer's buffer, a
//! [`generator::Gen`] combinator algebra that turns bytes into values of
//! arbitrary type, an outcome protocol (pass / fail / invalid / crash)
//! raised from inside properties via [`property`], a process-wide
//! [`registry`] of named tests, and a [`harness`] loop that speaks the
//! persistent-mode protocol back to the fuzzer.
//!
//! Generation is a deterministic function of the input bytes, so any
//! buffer the fuzzer saves replays to the same outcome.
//!
//! ```no_run
//! use gauntlet_core::generator::{list, uint8};
//! use gauntlet_core::property::check_eq;
//! use gauntlet_core::{harness, registry};
//!
//! registry::add_test("sort-idempotent", list(uint8()), |mut values: Vec<u8>| {
//!     values.sort();
//!     let once = values.clone();
//!     values.sort();
//!     check_eq(&once, &values);
//! });
//!
//! let test = registry::first_test().expect("a test is registered");
//! let mut link = harness::SingleShotLink::new(std::io::stdin());
//! harness::harness_main(&test, &mut link);
//! ```

pub mod config;
pub mod generator;
pub mod harness;
pub mod printer;
pub mod property;
pub mod registry;
pub mod runner;
pub mod source;

pub use config::{HarnessConfig, HarnessMode};
pub use generator::Gen;
pub use harness::{
    FuzzerLink, HarnessSummary, INVALID_EXIT_CODE, LoopExit, PersistentLink, SingleShotLink,
};
pub use property::{bad_test, check, check_eq, fail, guard, nonetheless};
pub use registry::{RegisteredTest, RegistryError, TestRegistry, add_test};
pub use runner::{FailureKind, FailureReport, TestOutcome};
pub use source::{ByteSource, Exhausted};
