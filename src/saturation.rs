//! Grammar by saturation (component I): builds the initial type-indexed
//! DFTA from a DSL and a requested type, generalised by a concrete,
//! composable trio of constraint families (size, depth, commutativity)
//! rather than a fully dynamic-dispatch `Constraint` list — the only
//! combinations this system ever needs are "just size", "just depth",
//! "size and depth jointly" (S5), and any of those further filtered by
//! commutativity (§4.I, SPEC_FULL.md §4.I).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::automaton::Dfta;
use crate::dsl::Dsl;
use crate::types::TypeSignature;

/// A saturation state: the monomorphic type the term produces, plus one
/// `i64` annotation slot per active constraint family (size first, then
/// depth, in that fixed order — see [`SaturationConfig`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SatState {
    pub type_name: String,
    pub annotations: Vec<i64>,
}

impl fmt::Display for SatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.type_name)?;
        for (i, a) in self.annotations.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", a)?;
        }
        write!(f, "]")
    }
}

/// Which constraint families are active, and the commutativity facts
/// (§4.H) to enforce while saturating.
#[derive(Debug, Clone, Default)]
pub struct SaturationConfig {
    pub size: Option<(u32, u32)>,
    pub depth: Option<(u32, u32)>,
    /// base primitive name -> swapped argument-position pairs that must
    /// satisfy `args[i] <= args[j]` under `SatState`'s derived `Ord`.
    pub commutative: HashMap<String, Vec<(usize, usize)>>,
}

impl SaturationConfig {
    fn init_leaf(&self) -> Vec<i64> {
        let mut ann = Vec::new();
        if self.size.is_some() {
            ann.push(1);
        }
        if self.depth.is_some() {
            ann.push(1);
        }
        ann
    }

    /// `None` means the primitive is forbidden at this size/depth.
    fn transition(&self, args: &[SatState]) -> Option<Vec<i64>> {
        let mut out = Vec::new();
        let mut idx = 0;
        if let Some((_, max_s)) = self.size {
            let s: i64 = 1 + args.iter().map(|a| a.annotations[idx]).sum::<i64>();
            if s > max_s as i64 {
                return None;
            }
            out.push(s);
            idx += 1;
        }
        if let Some((_, max_d)) = self.depth {
            let d: i64 = 1 + args.iter().map(|a| a.annotations[idx]).max().unwrap_or(0);
            if d > max_d as i64 {
                return None;
            }
            out.push(d);
        }
        Some(out)
    }

    fn is_final_annotations(&self, ann: &[i64]) -> bool {
        let mut idx = 0;
        if let Some((min_s, max_s)) = self.size {
            let s = ann[idx];
            if s < min_s as i64 || s > max_s as i64 {
                return false;
            }
            idx += 1;
        }
        if let Some((min_d, max_d)) = self.depth {
            let d = ann[idx];
            if d < min_d as i64 || d > max_d as i64 {
                return false;
            }
        }
        true
    }

    fn violates_commutativity(&self, base_name: &str, args: &[SatState]) -> bool {
        if let Some(pairs) = self.commutative.get(base_name) {
            for &(i, j) in pairs {
                if args[i] > args[j] {
                    return true;
                }
            }
        }
        false
    }
}

/// The requested type, or the wildcard wildcard "accept any return type"
/// (§4.I).
pub enum Request {
    Typed(TypeSignature),
    Wildcard { arg_types: Vec<String> },
}

impl Request {
    pub fn arg_types(&self) -> &[String] {
        match self {
            Request::Typed(sig) => &sig.arg_types,
            Request::Wildcard { arg_types } => arg_types,
        }
    }

    fn matches_return(&self, type_name: &str) -> bool {
        match self {
            Request::Typed(sig) => sig.return_type == type_name,
            Request::Wildcard { .. } => true,
        }
    }
}

fn cartesian_states(slots: &[Vec<SatState>]) -> Vec<Vec<SatState>> {
    let mut result: Vec<Vec<SatState>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::with_capacity(result.len() * slot.len().max(1));
        for prefix in &result {
            for s in slot {
                let mut combo = prefix.clone();
                combo.push(s.clone());
                next.push(combo);
            }
        }
        result = next;
    }
    result
}

/// Letter used for the `i`th positional variable of the requested type.
pub fn variable_letter(index: usize) -> String {
    format!("var{}", index)
}

/// Builds the saturated grammar to fixpoint (§4.I).
pub fn grammar_by_saturation(dsl: &Dsl, request: &Request, config: &SaturationConfig) -> Dfta<SatState, String> {
    let mut dfta: Dfta<SatState, String> = Dfta::empty();

    for (i, vtype) in request.arg_types().iter().enumerate() {
        let state = SatState {
            type_name: vtype.clone(),
            annotations: config.init_leaf(),
        };
        dfta.add_rule(variable_letter(i), vec![], state.clone());
        if request.matches_return(&state.type_name) && config.is_final_annotations(&state.annotations) {
            dfta.add_final(state);
        }
    }

    for entry in dsl.entries().filter(|e| e.signature.arity() == 0) {
        let state = SatState {
            type_name: entry.signature.return_type.clone(),
            annotations: config.init_leaf(),
        };
        dfta.add_rule(entry.letter.clone(), vec![], state.clone());
        if request.matches_return(&state.type_name) && config.is_final_annotations(&state.annotations) {
            dfta.add_final(state);
        }
    }

    loop {
        let mut changed = false;
        let mut states_by_type: BTreeMap<String, Vec<SatState>> = BTreeMap::new();
        for s in dfta.all_states() {
            states_by_type.entry(s.type_name.clone()).or_default().push(s);
        }
        for entry in dsl.entries().filter(|e| e.signature.arity() > 0) {
            let slots: Vec<Vec<SatState>> = entry
                .signature
                .arg_types
                .iter()
                .map(|t| states_by_type.get(t).cloned().unwrap_or_default())
                .collect();
            if slots.iter().any(|s| s.is_empty()) {
                continue;
            }
            for combo in cartesian_states(&slots) {
                if config.violates_commutativity(&entry.base_name, &combo) {
                    continue;
                }
                let Some(ann) = config.transition(&combo) else {
                    continue;
                };
                if dfta.read(&entry.letter, &combo).is_some() {
                    continue;
                }
                let dst = SatState {
                    type_name: entry.signature.return_type.clone(),
                    annotations: ann,
                };
                dfta.add_rule(entry.letter.clone(), combo, dst.clone());
                changed = true;
                if request.matches_return(&dst.type_name)
                    && config.is_final_annotations(&dst.annotations)
                    && !dfta.finals().contains(&dst)
                {
                    dfta.add_final(dst);
                }
            }
        }
        if !changed {
            break;
        }
    }
    dfta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::DslBuilder;
    use crate::value::Value;
    use std::rc::Rc;

    fn arithmetic_dsl() -> Dsl {
        DslBuilder::new()
            .primitive("1", "int", Rc::new(|_| Ok(Value::Int(1))))
            .primitive("0", "int", Rc::new(|_| Ok(Value::Int(0))))
            .primitive(
                "+",
                "int -> int -> int",
                Rc::new(|a: &[Value]| Ok(Value::Int(a[0].as_int().unwrap() + a[1].as_int().unwrap()))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn saturation_respects_size_bound() {
        let dsl = arithmetic_dsl();
        let request = Request::Typed(TypeSignature {
            arg_types: vec!["int".to_string()],
            return_type: "int".to_string(),
        });
        let config = SaturationConfig {
            size: Some((1, 4)),
            depth: None,
            commutative: HashMap::new(),
        };
        let dfta = grammar_by_saturation(&dsl, &request, &config);
        assert_eq!(dfta.trees_at_size(5), 0);
        assert!(dfta.trees_at_size(1) > 0);
    }

    #[test]
    fn commutativity_constraint_halves_plus_rules() {
        let dsl = arithmetic_dsl();
        let request = Request::Typed(TypeSignature {
            arg_types: vec!["int".to_string(), "int".to_string()],
            return_type: "int".to_string(),
        });
        let mut commutative = HashMap::new();
        commutative.insert("+".to_string(), vec![(0usize, 1usize)]);
        let unconstrained = SaturationConfig {
            size: Some((1, 3)),
            depth: None,
            commutative: HashMap::new(),
        };
        let constrained = SaturationConfig {
            size: Some((1, 3)),
            depth: None,
            commutative,
        };
        let a = grammar_by_saturation(&dsl, &request, &unconstrained);
        let b = grammar_by_saturation(&dsl, &request, &constrained);
        assert!(b.size() <= a.size());
    }
}
