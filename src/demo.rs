//! Built-in demo DSLs (component N): native Rust replacements for the
//! out-of-scope "load a DSL from a file" step (§6), giving the CLI's
//! `prune`/`enum`/`compile` subcommands something concrete to run, and
//! giving the integration tests fixtures for scenarios S1-S3.

use std::rc::Rc;

use crate::dsl::{Dsl, DslBuilder};
use crate::error::Error;
use crate::value::Value;

fn int_sampler() -> Rc<dyn Fn(u64) -> Value> {
    Rc::new(|i: u64| Value::Int((i % 7) as i64 - 3))
}

/// S1: the smallest useful arithmetic DSL — `1`, `0`, `+`, `*`, `-`.
pub fn arithmetic() -> Dsl {
    DslBuilder::new()
        .primitive("1", "int", Rc::new(|_| Ok(Value::Int(1))))
        .primitive("0", "int", Rc::new(|_| Ok(Value::Int(0))))
        .primitive(
            "+",
            "int -> int -> int",
            Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap().wrapping_add(a[1].as_int().unwrap())))),
        )
        .primitive(
            "*",
            "int -> int -> int",
            Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap().wrapping_mul(a[1].as_int().unwrap())))),
        )
        .primitive(
            "-",
            "int -> int -> int",
            Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap().wrapping_sub(a[1].as_int().unwrap())))),
        )
        .sampler("int", int_sampler())
        .target_type("int")
        .build()
        .expect("built-in arithmetic DSL is well-formed")
}

/// S2: arithmetic plus a boolean conditional — `True`, `>0`, `ite`.
pub fn conditional() -> Dsl {
    DslBuilder::new()
        .primitive("1", "int", Rc::new(|_| Ok(Value::Int(1))))
        .primitive("0", "int", Rc::new(|_| Ok(Value::Int(0))))
        .primitive(
            "+",
            "int -> int -> int",
            Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap().wrapping_add(a[1].as_int().unwrap())))),
        )
        .primitive("True", "bool", Rc::new(|_| Ok(Value::Bool(true))))
        .primitive(
            ">0",
            "int -> bool",
            Rc::new(|a: &[Value]| Ok(Value::Bool(a[0].as_int().unwrap() > 0))),
        )
        .primitive(
            "ite",
            "bool -> 'a[int|bool] -> 'a -> 'a",
            Rc::new(|a: &[Value]| {
                if a[0].as_bool().unwrap() {
                    Ok(a[1].clone())
                } else {
                    Ok(a[2].clone())
                }
            }),
        )
        .sampler("int", int_sampler())
        .sampler("bool", Rc::new(|i: u64| Value::Bool(i % 2 == 0)))
        .target_type("int")
        .build()
        .expect("built-in conditional DSL is well-formed")
}

/// S3: arithmetic with a partial primitive (`/`) whose `ZeroDivisionError`
/// is allow-listed, so evaluating it on a sampled zero denominator
/// collapses to `Value::Bottom` instead of propagating (§4.G step 3).
pub fn division() -> Dsl {
    DslBuilder::new()
        .primitive("1", "int", Rc::new(|_| Ok(Value::Int(1))))
        .primitive("0", "int", Rc::new(|_| Ok(Value::Int(0))))
        .primitive(
            "+",
            "int -> int -> int",
            Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap().wrapping_add(a[1].as_int().unwrap())))),
        )
        .primitive(
            "/",
            "int -> int -> int",
            Rc::new(|a: &[Value]| {
                let x = a[0].as_int().unwrap();
                let y = a[1].as_int().unwrap();
                if y == 0 {
                    Err(Error::SemanticTrap {
                        kind: "ZeroDivisionError".to_string(),
                    })
                } else {
                    Ok(Value::Int(x / y))
                }
            }),
        )
        .sampler("int", int_sampler())
        .skip_exception("ZeroDivisionError")
        .target_type("int")
        .build()
        .expect("built-in division DSL is well-formed")
}

/// Looks a demo DSL up by the name exposed on the CLI's `--dsl` flag.
pub fn by_name(name: &str) -> crate::error::Result<Dsl> {
    match name {
        "arithmetic" => Ok(arithmetic()),
        "conditional" => Ok(conditional()),
        "division" => Ok(division()),
        other => Err(Error::UserInput(format!("unknown demo DSL `{}`", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_demo_dsls_build_without_error() {
        assert!(arithmetic().entry("+").is_some());
        assert!(conditional().entry("True").is_some());
        assert!(division().entry("/").is_some());
    }

    #[test]
    fn unknown_name_is_user_input_error() {
        assert!(matches!(by_name("nope"), Err(Error::UserInput(_))));
    }
}
