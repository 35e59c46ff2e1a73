//! Type expressions (component B): arrow types `t1 -> ... -> tn -> tr`,
//! where an individual slot may be a sum type `a|b|c` or a named
//! polymorphic slot `'name[opts]` whose binding is fixed at first
//! occurrence and reused at every later occurrence of the same name.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A fully monomorphic type signature: an ordered list of argument types
/// plus a return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSignature {
    pub arg_types: Vec<String>,
    pub return_type: String,
}

impl TypeSignature {
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }
}

/// Splits a raw type string on `->`, trimming whitespace around each slot.
/// This is the `parse` half of §4.B; it does not expand polymorphism or sum
/// types, it only separates arrow slots.
pub fn parse_slots(raw: &str) -> Result<Vec<String>> {
    let slots: Vec<String> = raw.split("->").map(|s| s.trim().to_string()).collect();
    if slots.iter().any(|s| s.is_empty()) {
        return Err(Error::UserInput(format!("malformed type string: `{}`", raw)));
    }
    Ok(slots)
}

/// One arrow slot, after splitting the `a|b|c` alternatives apart and
/// recognising a `'name[opts]` polymorphic binding.
enum Slot {
    Concrete(Vec<String>),
    Polymorphic(String, Vec<String>),
}

fn parse_slot(raw: &str) -> Slot {
    if let Some(rest) = raw.strip_prefix('\'') {
        if let Some(open) = rest.find('[') {
            if let Some(name_close) = rest[open..].find(']') {
                let name = rest[..open].to_string();
                let opts_str = &rest[open + 1..open + name_close];
                let opts: Vec<String> = opts_str.split('|').map(|s| s.trim().to_string()).collect();
                return Slot::Polymorphic(name, opts);
            }
        }
    }
    let opts: Vec<String> = raw.split('|').map(|s| s.trim().to_string()).collect();
    Slot::Concrete(opts)
}

/// Expands a raw arrow-type string into every monomorphic variant it
/// describes: the Cartesian product of each slot's alternatives, with
/// polymorphic names bound consistently across all their occurrences.
/// Fails with `Error::UserInput` when a `'name` is referenced with no
/// binding (should be impossible since the first occurrence always
/// supplies `[opts]`, but a second occurrence written as `'name` with no
/// brackets and no prior binding is rejected here).
pub fn all_variants(raw: &str) -> Result<Vec<TypeSignature>> {
    let slots = parse_slots(raw)?;
    let mut bindings: HashMap<String, Vec<String>> = HashMap::new();
    let mut per_slot_options: Vec<Vec<String>> = Vec::with_capacity(slots.len());

    for slot in &slots {
        if let Some(rest) = slot.strip_prefix('\'') {
            let has_brackets = rest.contains('[');
            if !has_brackets {
                let name = rest.to_string();
                match bindings.get(&name) {
                    Some(opts) => {
                        per_slot_options.push(opts.clone());
                        continue;
                    }
                    None => {
                        return Err(Error::UserInput(format!(
                            "undefined polymorphic name `'{}`",
                            name
                        )))
                    }
                }
            }
        }
        match parse_slot(slot) {
            Slot::Concrete(opts) => per_slot_options.push(opts),
            Slot::Polymorphic(name, opts) => {
                bindings.entry(name).or_insert_with(|| opts.clone());
                per_slot_options.push(bindings[slot_name(slot)].clone());
            }
        }
    }

    let combos = cartesian_product(&per_slot_options);
    let mut out = Vec::with_capacity(combos.len());
    for combo in combos {
        let (arg_types, return_type) = combo.split_at(combo.len() - 1);
        out.push(TypeSignature {
            arg_types: arg_types.to_vec(),
            return_type: return_type[0].clone(),
        });
    }
    Ok(out)
}

/// Extracts the polymorphic name out of a raw slot string of the form
/// `'name[opts]`, for use as a hash-map key into `bindings`.
fn slot_name(slot: &str) -> &str {
    let rest = slot.strip_prefix('\'').unwrap_or(slot);
    match rest.find('[') {
        Some(i) => &rest[..i],
        None => rest,
    }
}

fn cartesian_product(options: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut result: Vec<Vec<String>> = vec![Vec::new()];
    for opts in options {
        let mut next = Vec::with_capacity(result.len() * opts.len());
        for prefix in &result {
            for opt in opts {
                let mut combo = prefix.clone();
                combo.push(opt.clone());
                next.push(combo);
            }
        }
        result = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_arrow_type() {
        let variants = all_variants("int -> int -> int").unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].arg_types, vec!["int", "int"]);
        assert_eq!(variants[0].return_type, "int");
    }

    #[test]
    fn sum_type_expands_cartesian() {
        let variants = all_variants("int|bool -> int").unwrap();
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn polymorphic_slot_binds_consistently() {
        let variants = all_variants("bool -> 'a[bool|int] -> 'a -> 'a").unwrap();
        // Binding is fixed at first occurrence: 2 variants, not 2*2.
        assert_eq!(variants.len(), 2);
        for v in &variants {
            assert_eq!(v.arg_types[1], v.return_type);
        }
    }

    #[test]
    fn undefined_polymorphic_name_is_user_input_error() {
        let err = all_variants("'a -> int").unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));
    }
}
