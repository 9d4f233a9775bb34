use gauntlet_core::generator::{int, list, map2, uint8};
use gauntlet_core::harness::{self, SingleShotLink};
use gauntlet_core::property::check_eq;
use gauntlet_core::registry;

/// Minimal demo harness: a couple of properties, one selected test,
/// inputs from stdin (or the persistent pipe pair when the environment
/// asks for it).
fn register_demo_tests() {
    registry::add_test(
        "sum-is-commutative",
        map2(int(), int(), |a, b| (a, b)),
        |(a, b): (i64, i64)| {
            check_eq(&a.wrapping_add(b), &b.wrapping_add(a));
        },
    );

    registry::add_test("sort-idempotent", list(uint8()), |mut values: Vec<u8>| {
        values.sort();
        let once = values.clone();
        values.sort();
        check_eq(&once, &values);
    });
}

fn main() {
    register_demo_tests();

    let selector = std::env::var("GAUNTLET_TEST").unwrap_or_else(|_| "0".to_string());
    let test = match registry::find_test(&selector) {
        Ok(test) => test,
        Err(error) => {
            eprintln!("{error}");
            eprintln!("registered tests: {:?}", registry::test_names());
            std::process::exit(2);
        }
    };

    #[cfg(unix)]
    if let Some(mut link) = harness::persistent_link_from_env() {
        harness::harness_main(&test, &mut link);
    }

    let mut link = SingleShotLink::new(std::io::stdin());
    harness::harness_main(&test, &mut link);
}
