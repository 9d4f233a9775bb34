use std::fmt::{self, Debug, Display, Write};
use std::sync::Arc;

/// A printer writes one value into a formatting sink.
///
/// Printers are plain values; attaching one to a generator (see
/// [`Gen::with_printer`](crate::generator::Gen::with_printer)) changes how
/// counterexamples are rendered, never which values are produced.
pub type PrintFn<T> = Arc<dyn Fn(&mut dyn Write, &T) -> fmt::Result + Send + Sync>;

/// Placeholder used when a value has no printer anywhere in its lineage.
pub const UNPRINTABLE: &str = "<unprintable>";

/// Forward format directives to the underlying sink.
pub fn pp(out: &mut dyn Write, args: fmt::Arguments<'_>) -> fmt::Result {
    out.write_fmt(args)
}

pub fn from_display<T: Display + 'static>() -> PrintFn<T> {
    Arc::new(|out, value| pp(out, format_args!("{value}")))
}

pub fn from_debug<T: Debug + 'static>() -> PrintFn<T> {
    Arc::new(|out, value| pp(out, format_args!("{value:?}")))
}

/// Byte strings print as a hex dump, the way fuzzer artifacts are usually
/// inspected.
pub fn hex_bytes() -> PrintFn<Vec<u8>> {
    Arc::new(|out, bytes| {
        out.write_char('[')?;
        for (index, byte) in bytes.iter().enumerate() {
            if index > 0 {
                out.write_char(' ')?;
            }
            pp(out, format_args!("{byte:02x}"))?;
        }
        out.write_char(']')
    })
}

pub fn quoted_string() -> PrintFn<String> {
    Arc::new(|out, value| pp(out, format_args!("{value:?}")))
}

pub fn list_of<T: 'static>(element: PrintFn<T>) -> PrintFn<Vec<T>> {
    Arc::new(move |out, values| {
        out.write_char('[')?;
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                out.write_str("; ")?;
            }
            element(out, value)?;
        }
        out.write_char(']')
    })
}

pub fn option_of<T: 'static>(inner: PrintFn<T>) -> PrintFn<Option<T>> {
    Arc::new(move |out, value| match value {
        Some(inner_value) => {
            out.write_str("Some(")?;
            inner(out, inner_value)?;
            out.write_char(')')
        }
        None => out.write_str("None"),
    })
}

pub fn result_of<T: 'static, E: 'static>(ok: PrintFn<T>, err: PrintFn<E>) -> PrintFn<Result<T, E>> {
    Arc::new(move |out, value| match value {
        Ok(inner) => {
            out.write_str("Ok(")?;
            ok(out, inner)?;
            out.write_char(')')
        }
        Err(inner) => {
            out.write_str("Err(")?;
            err(out, inner)?;
            out.write_char(')')
        }
    })
}

pub fn tuple_of<A: 'static, B: 'static>(first: PrintFn<A>, second: PrintFn<B>) -> PrintFn<(A, B)> {
    Arc::new(move |out, (a, b)| {
        out.write_char('(')?;
        first(out, a)?;
        out.write_str(", ")?;
        second(out, b)?;
        out.write_char(')')
    })
}

/// Render a value through a printer into an owned string.
pub fn render<T>(printer: &PrintFn<T>, value: &T) -> String {
    let mut rendered = String::new();
    if printer(&mut rendered, value).is_err() {
        return UNPRINTABLE.to_string();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_debug_printers_render_values() {
        assert_eq!(render(&from_display::<i64>(), &-42), "-42");
        assert_eq!(render(&from_debug::<&str>(), &"hi"), "\"hi\"");
    }

    #[test]
    fn hex_bytes_prints_space_separated_pairs() {
        assert_eq!(render(&hex_bytes(), &vec![0x00, 0xAB, 0x7F]), "[00 ab 7f]");
        assert_eq!(render(&hex_bytes(), &Vec::new()), "[]");
    }

    #[test]
    fn structural_printers_compose() {
        let ints = list_of(from_display::<i64>());
        assert_eq!(render(&ints, &vec![1, 2, 3]), "[1; 2; 3]");

        let maybe = option_of(from_display::<i64>());
        assert_eq!(render(&maybe, &Some(7)), "Some(7)");
        assert_eq!(render(&maybe, &None), "None");

        let either = result_of(from_display::<i64>(), quoted_string());
        assert_eq!(render(&either, &Ok(1)), "Ok(1)");
        assert_eq!(
            render(&either, &Err("boom".to_string())),
            "Err(\"boom\")"
        );

        let both = tuple_of(from_display::<i64>(), from_display::<i64>());
        assert_eq!(render(&both, &(3, 4)), "(3, 4)");
    }

    #[test]
    fn pp_forwards_format_arguments() {
        let mut out = String::new();
        pp(&mut out, format_args!("{} + {} = {}", 1, 2, 3)).unwrap();
        assert_eq!(out, "1 + 2 = 3");
    }
}
