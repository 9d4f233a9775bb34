use crate::printer::{self, PrintFn};
use crate::source::{ByteSource, Exhausted};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

/// Hard cap on the element count of [`list`] and [`list1`].
///
/// Continuation bytes normally terminate a sequence, but a buffer of
/// all-odd bytes would otherwise grow one element per two bytes until the
/// source runs dry. Generation stops at this bound regardless.
pub const MAX_SEQUENCE_LEN: usize = 4096;

type RunFn<T> = dyn Fn(&mut ByteSource<'_>) -> Result<T, Exhausted> + Send + Sync;

/// A deterministic producer of `T` values, driven entirely by an input
/// byte stream.
///
/// A generator is a plain value: cheap to clone, with no identity and no
/// state of its own. Running it threads a [`ByteSource`] through its tree
/// of sub-generators; for a fixed buffer and a fixed tree the produced
/// value and the number of consumed bytes are always the same, which is
/// what lets a fuzzer replay saved inputs and reproduce outcomes exactly.
///
/// An optional printer rides along for counterexample rendering; attaching
/// one never changes the values produced.
pub struct Gen<T> {
    run: Arc<RunFn<T>>,
    printer: Option<PrintFn<T>>,
}

impl<T> Clone for Gen<T> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            printer: self.printer.clone(),
        }
    }
}

impl<T: 'static> Gen<T> {
    /// Build a generator from a raw run function.
    pub fn from_fn(
        run: impl Fn(&mut ByteSource<'_>) -> Result<T, Exhausted> + Send + Sync + 'static,
    ) -> Self {
        Self {
            run: Arc::new(run),
            printer: None,
        }
    }

    /// Produce one value, advancing the source cursor.
    pub fn run(&self, source: &mut ByteSource<'_>) -> Result<T, Exhausted> {
        (self.run)(source)
    }

    /// Attach a printer used when a failing case involving this
    /// generator's values is reported. Purely decorative.
    pub fn with_printer(mut self, printer: PrintFn<T>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn printer(&self) -> Option<&PrintFn<T>> {
        self.printer.as_ref()
    }

    /// Render a value through the attached printer, falling back to a
    /// placeholder when none is attached.
    pub fn show(&self, value: &T) -> String {
        match &self.printer {
            Some(print) => printer::render(print, value),
            None => printer::UNPRINTABLE.to_string(),
        }
    }

    /// Apply a pure function to this generator's output.
    ///
    /// The result carries no printer (the output type is arbitrary); use
    /// [`Gen::with_printer`] to restore pretty counterexamples.
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Gen<U> {
        let run = self.run;
        Gen::from_fn(move |source| Ok(f(run(source)?)))
    }

    /// Monadic bind: produce a value, then run the generator the
    /// continuation builds from it against the remaining bytes.
    ///
    /// The shape of the overall generator tree now depends on generated
    /// values, so nothing downstream can reason about it statically and no
    /// default printer can be derived. Prefer [`Gen::map`] (or
    /// [`map2`]/[`map3`]/[`map4`]) whenever the result shape does not
    /// genuinely depend on an earlier draw.
    pub fn dynamic_bind<U: 'static>(
        self,
        continuation: impl Fn(T) -> Gen<U> + Send + Sync + 'static,
    ) -> Gen<U> {
        let run = self.run;
        Gen::from_fn(move |source| {
            let value = run(source)?;
            continuation(value).run(source)
        })
    }
}

// ---------------------------------------------------------------------------
// Primitive generators
// ---------------------------------------------------------------------------

/// Word-sized signed integers, full range.
///
/// Decodes as `i64` on every platform so that saved fuzzer inputs replay
/// identically across machines.
pub fn int() -> Gen<i64> {
    Gen::from_fn(|source| source.read_i64()).with_printer(printer::from_display())
}

pub fn uint8() -> Gen<u8> {
    Gen::from_fn(|source| source.read_u8()).with_printer(printer::from_display())
}

pub fn int8() -> Gen<i8> {
    Gen::from_fn(|source| source.read_i8()).with_printer(printer::from_display())
}

pub fn uint16() -> Gen<u16> {
    Gen::from_fn(|source| source.read_u16()).with_printer(printer::from_display())
}

pub fn int16() -> Gen<i16> {
    Gen::from_fn(|source| source.read_i16()).with_printer(printer::from_display())
}

pub fn int32() -> Gen<i32> {
    Gen::from_fn(|source| source.read_i32()).with_printer(printer::from_display())
}

pub fn int64() -> Gen<i64> {
    Gen::from_fn(|source| source.read_i64()).with_printer(printer::from_display())
}

/// Full-range IEEE-754 doubles: NaNs, infinities, and subnormals included.
pub fn float() -> Gen<f64> {
    Gen::from_fn(|source| source.read_double()).with_printer(printer::from_debug())
}

/// Reads one byte; yields `true` iff its low bit is set.
///
/// The policy is part of the wire contract: the same input buffer must
/// reproduce the same boolean forever, or saved seeds stop replaying.
pub fn boolean() -> Gen<bool> {
    Gen::from_fn(|source| Ok(source.read_u8()? & 1 == 1)).with_printer(printer::from_display())
}

/// Variable-length byte string: one length-prefix byte, then that many
/// bytes (0..=255).
pub fn bytes() -> Gen<Vec<u8>> {
    Gen::from_fn(|source| source.read_bytes_var()).with_printer(printer::hex_bytes())
}

/// Exactly `len` bytes.
pub fn bytes_fixed(len: usize) -> Gen<Vec<u8>> {
    Gen::from_fn(move |source| source.read_bytes_fixed(len)).with_printer(printer::hex_bytes())
}

/// Printable-ASCII strings via the variable-length byte reader; each raw
/// byte is folded into `0x20..=0x7E`.
pub fn ascii_string() -> Gen<String> {
    Gen::from_fn(|source| {
        let raw = source.read_bytes_var()?;
        Ok(raw.iter().map(|byte| (byte % 95 + 32) as char).collect())
    })
    .with_printer(printer::quoted_string())
}

/// Integers uniformly spread over `[0, n)` from the fuzzer's point of
/// view. Consumes one 8-byte read.
///
/// # Panics
///
/// Panics at construction when `n < 1`.
pub fn range(n: i64) -> Gen<i64> {
    range_from(0, n)
}

/// Integers in `[min, min + n)`.
///
/// # Panics
///
/// Panics at construction when `n < 1` or when `min + n - 1` overflows.
pub fn range_from(min: i64, n: i64) -> Gen<i64> {
    assert!(n >= 1, "range requires n >= 1, got {n}");
    assert!(
        min.checked_add(n - 1).is_some(),
        "range upper bound min + n - 1 overflows i64"
    );
    Gen::from_fn(move |source| {
        let raw = source.read_u64()?;
        Ok(min + (raw % n as u64) as i64)
    })
    .with_printer(printer::from_display())
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Always yields a clone of `value`; consumes no bytes.
pub fn constant<T>(value: T) -> Gen<T>
where
    T: Clone + Send + Sync + 'static,
{
    Gen::from_fn(move |_source| Ok(value.clone()))
}

/// Run two generators left to right and combine their outputs.
pub fn map2<A, B, R>(
    first: Gen<A>,
    second: Gen<B>,
    f: impl Fn(A, B) -> R + Send + Sync + 'static,
) -> Gen<R>
where
    A: 'static,
    B: 'static,
    R: 'static,
{
    Gen::from_fn(move |source| {
        let a = first.run(source)?;
        let b = second.run(source)?;
        Ok(f(a, b))
    })
}

pub fn map3<A, B, C, R>(
    first: Gen<A>,
    second: Gen<B>,
    third: Gen<C>,
    f: impl Fn(A, B, C) -> R + Send + Sync + 'static,
) -> Gen<R>
where
    A: 'static,
    B: 'static,
    C: 'static,
    R: 'static,
{
    Gen::from_fn(move |source| {
        let a = first.run(source)?;
        let b = second.run(source)?;
        let c = third.run(source)?;
        Ok(f(a, b, c))
    })
}

pub fn map4<A, B, C, D, R>(
    first: Gen<A>,
    second: Gen<B>,
    third: Gen<C>,
    fourth: Gen<D>,
    f: impl Fn(A, B, C, D) -> R + Send + Sync + 'static,
) -> Gen<R>
where
    A: 'static,
    B: 'static,
    C: 'static,
    D: 'static,
    R: 'static,
{
    Gen::from_fn(move |source| {
        let a = first.run(source)?;
        let b = second.run(source)?;
        let c = third.run(source)?;
        let d = fourth.run(source)?;
        Ok(f(a, b, c, d))
    })
}

/// Read one selector byte `b` and run `options[b mod len]`.
///
/// The inherited printer is the first option's, when it has one.
///
/// # Panics
///
/// Panics at construction when `options` is empty.
pub fn choose<T: 'static>(options: Vec<Gen<T>>) -> Gen<T> {
    assert!(!options.is_empty(), "choose requires at least one generator");
    let inherited = options[0].printer.clone();
    let generator = Gen::from_fn(move |source| {
        let selector = source.read_u8()? as usize;
        options[selector % options.len()].run(source)
    });
    match inherited {
        Some(print) => generator.with_printer(print),
        None => generator,
    }
}

/// Read one selector byte: zero yields `None`, anything else runs the
/// inner generator and wraps the result.
pub fn option_of<T: 'static>(inner: Gen<T>) -> Gen<Option<T>> {
    let inner_printer = inner.printer.clone();
    let generator = Gen::from_fn(move |source| {
        if source.read_u8()? == 0 {
            Ok(None)
        } else {
            Ok(Some(inner.run(source)?))
        }
    });
    match inner_printer {
        Some(print) => generator.with_printer(printer::option_of(print)),
        None => generator,
    }
}

/// Run both generators left to right and yield the pair.
pub fn pair<A: 'static, B: 'static>(first: Gen<A>, second: Gen<B>) -> Gen<(A, B)> {
    let combined = match (first.printer.clone(), second.printer.clone()) {
        (Some(a), Some(b)) => Some(printer::tuple_of(a, b)),
        _ => None,
    };
    let generator = map2(first, second, |a, b| (a, b));
    match combined {
        Some(print) => generator.with_printer(print),
        None => generator,
    }
}

/// Read one selector byte; its low bit set picks the `Ok` variant, clear
/// picks the `Err` variant.
pub fn result_of<T: 'static, E: 'static>(ok: Gen<T>, err: Gen<E>) -> Gen<Result<T, E>> {
    let combined = match (ok.printer.clone(), err.printer.clone()) {
        (Some(a), Some(b)) => Some(printer::result_of(a, b)),
        _ => None,
    };
    let generator = Gen::from_fn(move |source| {
        if source.read_u8()? & 1 == 1 {
            Ok(Ok(ok.run(source)?))
        } else {
            Ok(Err(err.run(source)?))
        }
    });
    match combined {
        Some(print) => generator.with_printer(print),
        None => generator,
    }
}

/// Possibly-empty sequences: before each element one continuation byte is
/// read, and the element is produced only when its low bit is set.
///
/// Generation stops unconditionally at [`MAX_SEQUENCE_LEN`] elements.
pub fn list<T: 'static>(element: Gen<T>) -> Gen<Vec<T>> {
    let element_printer = element.printer.clone();
    let generator = Gen::from_fn(move |source| {
        let mut values = Vec::new();
        while values.len() < MAX_SEQUENCE_LEN {
            if source.read_u8()? & 1 == 0 {
                break;
            }
            values.push(element.run(source)?);
        }
        Ok(values)
    });
    match element_printer {
        Some(print) => generator.with_printer(printer::list_of(print)),
        None => generator,
    }
}

/// Like [`list`], but one element is always produced before the
/// continuation loop, so the result is never empty.
pub fn list1<T: 'static>(element: Gen<T>) -> Gen<Vec<T>> {
    let element_printer = element.printer.clone();
    let generator = Gen::from_fn(move |source| {
        let mut values = vec![element.run(source)?];
        while values.len() < MAX_SEQUENCE_LEN {
            if source.read_u8()? & 1 == 0 {
                break;
            }
            values.push(element.run(source)?);
        }
        Ok(values)
    });
    match element_printer {
        Some(print) => generator.with_printer(printer::list_of(print)),
        None => generator,
    }
}

/// Run each part generator in order, drawing a fresh separator between
/// consecutive parts, and concatenate everything.
pub fn concat_gen_list(separator: Gen<String>, parts: Vec<Gen<String>>) -> Gen<String> {
    Gen::from_fn(move |source| {
        let mut joined = String::new();
        for (index, part) in parts.iter().enumerate() {
            if index > 0 {
                joined.push_str(&separator.run(source)?);
            }
            joined.push_str(&part.run(source)?);
        }
        Ok(joined)
    })
    .with_printer(printer::quoted_string())
}

/// Defer construction: the thunk is forced on first use and the resulting
/// generator is memoized. Breaks construction-time cycles when a
/// generator needs to mention itself.
pub fn unlazy<T: 'static>(thunk: impl Fn() -> Gen<T> + Send + Sync + 'static) -> Gen<T> {
    let cell: OnceCell<Gen<T>> = OnceCell::new();
    Gen::from_fn(move |source| cell.get_or_init(|| thunk()).run(source))
}

/// Fixed point of a generator transformer: returns the `g` with
/// `g = f(g)`, for defining recursive generators directly.
///
/// The transformer runs exactly once, against a back-reference that holds
/// only a weak handle on the knot, so recursive trees never form strong
/// reference cycles. Recursion depth is gated purely by the bytes the
/// inner generators consume; any finite buffer terminates.
pub fn fix<T: 'static>(f: impl FnOnce(Gen<T>) -> Gen<T>) -> Gen<T> {
    let cell: Arc<OnceCell<Gen<T>>> = Arc::new(OnceCell::new());
    let weak: Weak<OnceCell<Gen<T>>> = Arc::downgrade(&cell);
    let backref = Gen::from_fn(move |source| {
        let knot = weak
            .upgrade()
            .expect("recursive generator outlived its fixed point");
        let tied = knot
            .get()
            .expect("recursive generator invoked during construction");
        tied.run(source)
    });
    let tied = f(backref);
    if cell.set(tied).is_err() {
        unreachable!("fixed-point cell initialized twice");
    }
    Gen::from_fn(move |source| {
        let tied = cell.get().expect("fixed-point cell is initialized");
        tied.run(source)
    })
}
