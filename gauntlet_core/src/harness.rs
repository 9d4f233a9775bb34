use crate::registry::{self, RegisteredTest};
use crate::runner::{self, FailureReport, TestOutcome};
use std::io::{self, Read, Write};
use std::process;

/// Exit code for a single-shot run whose input was invalid. Disjoint from
/// success (0) and from failure (the process aborts instead of exiting),
/// and reserved by the fuzzer collaborator for "skip".
pub const INVALID_EXIT_CODE: i32 = 42;

/// Token written on the status pipe when a persistent-mode harness comes up.
pub const HANDSHAKE_TOKEN: [u8; 4] = *b"GNT1";

/// Per-iteration status words written back to the fuzzer.
pub const STATUS_PASS: u32 = 0;
pub const STATUS_SKIP: u32 = 1;
pub const STATUS_FAIL: u32 = 2;

/// Conventional descriptor numbers for the persistent-mode pipe pair.
pub const CONTROL_FD: i32 = 198;
pub const STATUS_FD: i32 = 199;

/// When set, the demo binaries attach a [`PersistentLink`] to the
/// conventional descriptors instead of reading stdin once.
pub const PERSISTENT_ENV_VAR: &str = "GAUNTLET_PERSISTENT";

/// The boundary between the harness and whatever feeds it inputs.
///
/// One implementation wraps a pipe pair for AFL-style persistent mode;
/// another reads a buffer from stdin or a seed file exactly once. The
/// buffer returned by `next_input` is stable for the whole iteration.
pub trait FuzzerLink {
    fn handshake(&mut self) -> Result<(), anyhow::Error>;

    /// The next input buffer, or `None` when the input stream is done.
    fn next_input(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error>;

    /// Signal the status of the iteration that just finished.
    fn report(&mut self, status: u32) -> Result<(), anyhow::Error>;
}

/// Yields one buffer (all of stdin, or a whole seed file), then ends the
/// loop. Replaying a saved buffer through this link reproduces the
/// original outcome exactly, by generator determinism.
pub struct SingleShotLink<R: Read> {
    input: Option<R>,
}

impl<R: Read> SingleShotLink<R> {
    pub fn new(input: R) -> Self {
        Self { input: Some(input) }
    }
}

impl<R: Read> FuzzerLink for SingleShotLink<R> {
    fn handshake(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    fn next_input(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        let Some(mut input) = self.input.take() else {
            return Ok(None);
        };
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer)?;
        Ok(Some(buffer))
    }

    fn report(&mut self, _status: u32) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// AFL-style persistent mode over a pipe pair.
///
/// Wire format: the harness writes [`HANDSHAKE_TOKEN`] on the status pipe
/// once, then for each iteration reads a 4-byte little-endian length
/// followed by that many input bytes from the control pipe (EOF at a frame
/// boundary ends the loop; a zero length is a legitimate empty input), and
/// writes one 4-byte little-endian status word back.
pub struct PersistentLink<R: Read, W: Write> {
    control: R,
    status: W,
}

impl<R: Read, W: Write> PersistentLink<R, W> {
    pub fn new(control: R, status: W) -> Self {
        Self { control, status }
    }
}

impl<R: Read, W: Write> FuzzerLink for PersistentLink<R, W> {
    fn handshake(&mut self) -> Result<(), anyhow::Error> {
        self.status.write_all(&HANDSHAKE_TOKEN)?;
        self.status.flush()?;
        Ok(())
    }

    fn next_input(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        let mut length_raw = [0u8; 4];
        match self.control.read_exact(&mut length_raw) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error.into()),
        }
        let length = u32::from_le_bytes(length_raw) as usize;
        let mut buffer = vec![0u8; length];
        self.control
            .read_exact(&mut buffer)
            .map_err(|error| anyhow::anyhow!("truncated input frame of {length} bytes: {error}"))?;
        Ok(Some(buffer))
    }

    fn report(&mut self, status: u32) -> Result<(), anyhow::Error> {
        self.status.write_all(&status.to_le_bytes())?;
        self.status.flush()?;
        Ok(())
    }
}

/// Attach a [`PersistentLink`] to the conventional descriptors when the
/// environment asks for persistent mode.
#[cfg(unix)]
pub fn persistent_link_from_env() -> Option<PersistentLink<std::fs::File, std::fs::File>> {
    use std::os::fd::FromRawFd;

    std::env::var_os(PERSISTENT_ENV_VAR)?;
    // The fuzzer collaborator owns these descriptors for the process
    // lifetime; taking File ownership of them here is the only claimant.
    let control = unsafe { std::fs::File::from_raw_fd(CONTROL_FD) };
    let status = unsafe { std::fs::File::from_raw_fd(STATUS_FD) };
    Some(PersistentLink::new(control, status))
}

/// Counts for a completed (non-failing) harness loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarnessSummary {
    pub executions: u64,
    pub passed: u64,
    pub invalid: u64,
}

/// How the harness loop ended.
#[derive(Debug)]
pub enum LoopExit {
    /// The input stream was exhausted without a failure.
    Completed(HarnessSummary),
    /// Some iteration failed; the offending report is returned so the
    /// caller can print it and abort.
    Failed(FailureReport),
}

/// Drive one registered test over every input the link yields.
///
/// Pass and invalid iterations are counted and reported to the link;
/// the first failing iteration ends the loop. This function never aborts
/// and never rethrows, so callers (and tests) observe every exit path.
pub fn run_harness(
    test: &RegisteredTest,
    link: &mut dyn FuzzerLink,
) -> Result<LoopExit, anyhow::Error> {
    runner::install_quiet_panic_hook();
    link.handshake()?;

    let mut summary = HarnessSummary::default();
    while let Some(buffer) = link.next_input()? {
        summary.executions += 1;
        match test.execute(&buffer) {
            TestOutcome::Pass => {
                summary.passed += 1;
                link.report(STATUS_PASS)?;
            }
            TestOutcome::Invalid => {
                summary.invalid += 1;
                link.report(STATUS_SKIP)?;
            }
            TestOutcome::Fail(report) | TestOutcome::Crash(report) => {
                // Best effort: the fuzzer learns the status even though
                // the process is about to abort.
                let _ = link.report(STATUS_FAIL);
                return Ok(LoopExit::Failed(report));
            }
        }
    }
    Ok(LoopExit::Completed(summary))
}

/// Print a failure report to standard error in the shape the fuzzer's
/// crash log expects: test name, counterexample, message, input hash.
pub fn report_failure(report: &FailureReport) {
    eprintln!("[{}] property {}", report.test_name, report.kind);
    if let Some(counterexample) = &report.counterexample {
        eprintln!("  counterexample: {counterexample}");
    }
    eprintln!("  message: {}", report.message);
    eprintln!("  input-hash: {}", report.input_hash);
}

/// Exit code for a completed single-shot outcome.
pub fn exit_code(outcome: &TestOutcome) -> i32 {
    match outcome {
        TestOutcome::Pass => 0,
        TestOutcome::Invalid => INVALID_EXIT_CODE,
        TestOutcome::Fail(_) | TestOutcome::Crash(_) => 101,
    }
}

/// Process entry point: seal the registry, drive the loop, and terminate
/// with the contractual signal. Failures abort (so the fuzzer records the
/// crashing input); an all-invalid run exits with [`INVALID_EXIT_CODE`].
pub fn harness_main(test: &RegisteredTest, link: &mut dyn FuzzerLink) -> ! {
    registry::seal();
    match run_harness(test, link) {
        Ok(LoopExit::Completed(summary)) => {
            let code = if summary.invalid > 0 && summary.passed == 0 {
                INVALID_EXIT_CODE
            } else {
                0
            };
            process::exit(code);
        }
        Ok(LoopExit::Failed(report)) => {
            report_failure(&report);
            process::abort();
        }
        Err(error) => {
            eprintln!("harness link error: {error:#}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::uint8;
    use crate::property::{check, guard};
    use crate::registry::RegisteredTest;
    use std::io::Cursor;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framed = (payload.len() as u32).to_le_bytes().to_vec();
        framed.extend_from_slice(payload);
        framed
    }

    fn passing_test() -> RegisteredTest {
        RegisteredTest::new("passes", uint8(), |_value| {})
    }

    #[test]
    fn persistent_link_handshakes_then_frames_inputs() {
        let mut control = Vec::new();
        control.extend(frame(&[0x07]));
        control.extend(frame(&[]));

        let mut link = PersistentLink::new(Cursor::new(control), Vec::new());
        let test = passing_test();
        let exit = run_harness(&test, &mut link).unwrap();

        // One byte for the first frame, exhaustion on the empty one.
        match exit {
            LoopExit::Completed(summary) => {
                assert_eq!(summary.executions, 2);
                assert_eq!(summary.passed, 1);
                assert_eq!(summary.invalid, 1);
            }
            LoopExit::Failed(report) => panic!("unexpected failure: {}", report.message),
        }

        let mut expected = HANDSHAKE_TOKEN.to_vec();
        expected.extend(STATUS_PASS.to_le_bytes());
        expected.extend(STATUS_SKIP.to_le_bytes());
        assert_eq!(link.status, expected);
    }

    #[test]
    fn persistent_link_rejects_a_truncated_frame() {
        // Length promises four bytes; only two arrive.
        let mut control = (4u32).to_le_bytes().to_vec();
        control.extend([0xAA, 0xBB]);

        let mut link = PersistentLink::new(Cursor::new(control), Vec::new());
        assert!(link.handshake().is_ok());
        assert!(link.next_input().is_err());
    }

    #[test]
    fn failing_iterations_end_the_loop_with_the_report() {
        let mut control = Vec::new();
        control.extend(frame(&[0x10]));
        control.extend(frame(&[0x90]));
        control.extend(frame(&[0x11]));

        let test = RegisteredTest::new("low-bytes-only", uint8(), |value: u8| {
            check(value < 0x80);
        });
        let mut link = PersistentLink::new(Cursor::new(control), Vec::new());
        let exit = run_harness(&test, &mut link).unwrap();

        match exit {
            LoopExit::Failed(report) => assert_eq!(report.test_name, "low-bytes-only"),
            LoopExit::Completed(summary) => panic!("expected a failure, got {summary:?}"),
        }

        // The third frame was never read; the loop stopped at the failure.
        let mut expected = HANDSHAKE_TOKEN.to_vec();
        expected.extend(STATUS_PASS.to_le_bytes());
        expected.extend(STATUS_FAIL.to_le_bytes());
        assert_eq!(link.status, expected);
    }

    #[test]
    fn single_shot_link_yields_the_whole_stream_once() {
        let mut link = SingleShotLink::new(Cursor::new(vec![0x01, 0x02]));
        assert_eq!(link.next_input().unwrap(), Some(vec![0x01, 0x02]));
        assert_eq!(link.next_input().unwrap(), None);
    }

    #[test]
    fn single_shot_invalid_input_counts_as_invalid() {
        let test = RegisteredTest::new("guarded", uint8(), |_value| guard(false));
        let mut link = SingleShotLink::new(Cursor::new(vec![0x01]));
        match run_harness(&test, &mut link).unwrap() {
            LoopExit::Completed(summary) => {
                assert_eq!(summary.executions, 1);
                assert_eq!(summary.invalid, 1);
            }
            LoopExit::Failed(report) => panic!("unexpected failure: {}", report.message),
        }
    }

    #[test]
    fn exit_codes_follow_the_outcome_contract() {
        assert_eq!(exit_code(&TestOutcome::Pass), 0);
        assert_eq!(exit_code(&TestOutcome::Invalid), INVALID_EXIT_CODE);
    }
}
