//! Commutativity detection (component H): finds, for each primitive with
//! two or more sampleable arguments, every pair of same-typed positions
//! that can be swapped without changing observable behaviour. Restricted
//! to pairwise swaps only; generalising to k-ary argument symmetries is
//! out of scope (§4.H).

use std::collections::HashMap;

use crate::dsl::Dsl;
use crate::evaluator::Evaluator;
use crate::program::Program;
use crate::types::TypeSignature;

/// base primitive name -> swapped argument-position pairs.
pub type CommutativityFacts = HashMap<String, Vec<(usize, usize)>>;

pub fn detect_commutativity(dsl: &Dsl, sample_count: usize, seed: u64) -> CommutativityFacts {
    let mut facts: CommutativityFacts = HashMap::new();
    let mut evaluator = Evaluator::new(dsl, sample_count, seed);

    for entry in dsl.entries() {
        let arity = entry.signature.arity();
        if arity < 2 {
            continue;
        }
        if !entry
            .signature
            .arg_types
            .iter()
            .all(|t| dsl.sampler(t).is_some())
        {
            continue;
        }
        let identity_args: Vec<Program> = (0..arity).map(|i| Program::variable(i as u32)).collect();
        let identity = Program::application(entry.letter.clone(), identity_args.clone());
        let type_req = TypeSignature {
            arg_types: entry.signature.arg_types.clone(),
            return_type: entry.signature.return_type.clone(),
        };
        let _ = evaluator.eval(&identity, &type_req);

        for i in 0..arity {
            for j in (i + 1)..arity {
                if entry.signature.arg_types[i] != entry.signature.arg_types[j] {
                    continue;
                }
                let mut swapped_args = identity_args.clone();
                swapped_args.swap(i, j);
                let swapped = Program::application(entry.letter.clone(), swapped_args);
                if let Ok(Some(representative)) = evaluator.eval(&swapped, &type_req) {
                    if representative == identity {
                        facts.entry(entry.base_name.clone()).or_default().push((i, j));
                    }
                }
            }
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::DslBuilder;
    use crate::value::Value;
    use std::rc::Rc;

    fn dsl_with_commutative_and_non_commutative_ops() -> Dsl {
        DslBuilder::new()
            .primitive(
                "+",
                "int -> int -> int",
                Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap() + a[1].as_int().unwrap()))),
            )
            .primitive(
                "-",
                "int -> int -> int",
                Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap() - a[1].as_int().unwrap()))),
            )
            .sampler("int", Rc::new(|i: u64| Value::Int(i as i64)))
            .build()
            .unwrap()
    }

    #[test]
    fn plus_is_commutative_and_minus_is_not() {
        let dsl = dsl_with_commutative_and_non_commutative_ops();
        let facts = detect_commutativity(&dsl, 8, 1);
        assert_eq!(facts.get("+"), Some(&vec![(0usize, 1usize)]));
        assert!(facts.get("-").is_none());
    }
}
