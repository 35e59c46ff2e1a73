//! The pruning driver (component J): orchestrates saturation, the
//! commutativity filter, and the Enumerator/Evaluator pair into the final
//! pruned automaton.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use crate::automaton::Dfta;
use crate::commutativity::detect_commutativity;
use crate::dsl::Dsl;
use crate::enumerator::{Enumerator, Memo};
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::program::Program;
use crate::saturation::{grammar_by_saturation, Request, SaturationConfig, SatState};
use crate::types::TypeSignature;

pub struct PruneOptions {
    pub size: u32,
    pub sample_count: usize,
    pub seed: u64,
}

pub struct PruneResult {
    pub dfta: Dfta<String, String>,
    /// Every transcribed state's monomorphic type, known for free from the
    /// saturation state it was transcribed from (so a later loop-closure
    /// pass never has to re-infer types from letters).
    pub state_types: HashMap<String, String>,
    pub mega_type_request: TypeSignature,
    pub saturated_rules: usize,
    pub commutativity_pruned_rules: usize,
    pub retained_programs: u64,
    /// Representative program -> every program collapsed onto it, keyed
    /// under `target_type` (§6 JSON equivalence-class artifact).
    pub equivalence_classes: BTreeMap<String, Vec<String>>,
}

/// The per-type variable-slot count a mega type request needs to host the
/// largest program of that type buildable within `size` (§4.J step 1): `n`
/// full batches of the type's max consuming arity, rounded up to cover
/// `size - n - 1` additional slots.
fn mega_variable_slots(size: u32, max_arity: usize) -> usize {
    let n = max_arity;
    let s = size as usize;
    if n == 0 || s < n + 1 {
        return 0;
    }
    n * (1 + (s - n - 1) / n)
}

fn build_mega_type_request(dsl: &Dsl, size: u32, target_type: &str) -> (TypeSignature, Vec<(String, Range<u32>)>) {
    let mut arg_types = Vec::new();
    let mut ranges = Vec::new();
    let mut cursor = 0u32;
    for t in dsl.sampleable_arg_types() {
        let n = dsl.max_arity_for_type(&t);
        let slots = mega_variable_slots(size, n) as u32;
        let start = cursor;
        for _ in 0..slots {
            arg_types.push(t.clone());
        }
        cursor += slots;
        ranges.push((t, start..cursor));
    }
    (
        TypeSignature {
            arg_types,
            return_type: target_type.to_string(),
        },
        ranges,
    )
}

fn collect_variable_indices(program: &Program, used: &mut BTreeSet<u32>) {
    if let Some(i) = program.variable_index() {
        used.insert(i);
        return;
    }
    for a in program.args() {
        collect_variable_indices(a, used);
    }
}

fn rewrite_variables(program: &Program, mapping: &HashMap<u32, u32>) -> Program {
    if let Some(i) = program.variable_index() {
        return Program::variable(*mapping.get(&i).unwrap_or(&i));
    }
    if program.args().is_empty() {
        return program.clone();
    }
    let new_args: Vec<Program> = program.args().iter().map(|a| rewrite_variables(a, mapping)).collect();
    Program::application(program.head().unwrap().to_string(), new_args)
}

/// Renumbers every variable so that, within each type's original index
/// range, only the indices actually used survive, packed from the range's
/// start (§4.J step 5, "variables whose indices were merged collapse to
/// the smallest such index").
fn renumbering(ranges: &[(String, Range<u32>)], memo: &Memo<SatState>) -> HashMap<u32, u32> {
    let mut used: BTreeSet<u32> = BTreeSet::new();
    for rows in memo.values() {
        for row in rows {
            for program in row {
                collect_variable_indices(program, &mut used);
            }
        }
    }
    let mut mapping = HashMap::new();
    for (_, range) in ranges {
        let mut next = range.start;
        for old in used.iter().filter(|i| range.contains(i)) {
            mapping.insert(*old, next);
            next += 1;
        }
    }
    mapping
}

fn transcribe(
    memo: &Memo<SatState>,
    finals: &BTreeSet<SatState>,
    mapping: &HashMap<u32, u32>,
) -> (Dfta<String, String>, HashMap<String, String>) {
    let mut rules: BTreeMap<(String, Vec<String>), String> = BTreeMap::new();
    let mut final_strings: BTreeSet<String> = BTreeSet::new();
    let mut state_types: HashMap<String, String> = HashMap::new();
    for (state, rows) in memo {
        let is_final = finals.contains(state);
        for row in rows {
            for program in row {
                let rewritten = rewrite_variables(program, mapping);
                let key = rewritten.to_string();
                state_types.insert(key.clone(), state.type_name.clone());
                if is_final {
                    final_strings.insert(key.clone());
                }
                if let Some(i) = rewritten.variable_index() {
                    rules.insert((format!("var{}", i), vec![]), key);
                } else if rewritten.args().is_empty() {
                    rules.insert((rewritten.head().unwrap().to_string(), vec![]), key);
                } else {
                    let arg_keys: Vec<String> = rewritten.args().iter().map(|a| a.to_string()).collect();
                    rules.insert((rewritten.head().unwrap().to_string(), arg_keys), key);
                }
            }
        }
    }
    (Dfta::new(rules, final_strings), state_types)
}

/// Runs the full pruning pipeline against `dsl`, producing one representative
/// program per observational-equivalence class of `target_type`, up to
/// `options.size`.
pub fn prune(dsl: &Dsl, target_type: &str, options: &PruneOptions) -> Result<PruneResult> {
    let (mega_type_request, ranges) = build_mega_type_request(dsl, options.size, target_type);
    log::debug!(
        "mega type request for size {}: {} variable slots across {} types",
        options.size,
        mega_type_request.arg_types.len(),
        ranges.len()
    );

    let base_config = SaturationConfig {
        size: Some((1, options.size)),
        depth: None,
        commutative: HashMap::new(),
    };
    let saturated = grammar_by_saturation(dsl, &Request::Typed(mega_type_request.clone()), &base_config);
    log::info!("saturated base grammar: {} rules", saturated.size());

    let commutative = detect_commutativity(dsl, options.sample_count, options.seed);
    let commutativity_config = SaturationConfig {
        size: Some((1, options.size)),
        depth: None,
        commutative,
    };
    let commutativity_pruned = grammar_by_saturation(dsl, &Request::Typed(mega_type_request.clone()), &commutativity_config);
    log::info!("commutativity-pruned grammar: {} rules", commutativity_pruned.size());

    let mut enumerator = Enumerator::new(&commutativity_pruned, options.size as usize);
    let mut evaluator = Evaluator::new(dsl, options.sample_count, options.seed);
    let mut keep = true;
    let mut retained_programs = 0u64;
    while let Some(program) = enumerator.next(keep) {
        keep = evaluator.eval(&program, &mega_type_request)?.is_none();
        if keep {
            retained_programs += 1;
        }
    }
    log::info!("observational-equivalence pruning retained {} programs", retained_programs);
    let equivalence_classes = evaluator.equivalence_classes(target_type);
    evaluator.free_memory();

    let mapping = renumbering(&ranges, enumerator.memo());
    let (dfta, state_types) = transcribe(enumerator.memo(), commutativity_pruned.finals(), &mapping);

    let saturated_total = saturated.trees_until_size(options.size as usize);
    let commutativity_total = commutativity_pruned.trees_until_size(options.size as usize);
    if saturated_total > 0 {
        let survived = retained_programs as f64 / saturated_total as f64;
        let commutativity_fraction = (saturated_total - commutativity_total) as f64 / saturated_total as f64;
        let oe_fraction = (commutativity_total.saturating_sub(retained_programs as u128)) as f64 / saturated_total as f64;
        log::info!(
            "pruning ratios: survived={:.4} commutativity-pruned={:.4} observational-equivalence-pruned={:.4}",
            survived,
            commutativity_fraction,
            oe_fraction
        );
    }

    Ok(PruneResult {
        dfta,
        state_types,
        mega_type_request,
        saturated_rules: saturated.size(),
        commutativity_pruned_rules: commutativity_pruned.size(),
        retained_programs,
        equivalence_classes,
    })
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
            .sampler("int", Rc::new(|i: u64| Value::Int(i as i64)))
            .target_type("int")
            .build()
            .unwrap()
    }

    #[test]
    fn pruned_grammar_has_no_duplicate_final_strings_and_collapses_additive_identity() {
        let dsl = arithmetic_dsl();
        let options = PruneOptions {
            size: 4,
            sample_count: 8,
            seed: 1,
        };
        let result = prune(&dsl, "int", &options).unwrap();
        // (+ 1 0) and (+ 0 1) always evaluate identically over sampled
        // inputs, so at most one of them should survive as a final state.
        assert!(!(result.dfta.finals().contains("(+ 1 0)") && result.dfta.finals().contains("(+ 0 1)")));
        assert!(result.retained_programs > 0);
        assert!(result.commutativity_pruned_rules <= result.saturated_rules);
        // (+ 0 1) and (+ 1 0) collapse onto one representative, so some
        // class has more than one member.
        assert!(result.equivalence_classes.values().any(|members| members.len() > 1));
    }

    #[test]
    fn mega_variable_slots_is_zero_below_arity_threshold() {
        assert_eq!(mega_variable_slots(2, 2), 0);
        assert!(mega_variable_slots(5, 2) > 0);
    }
}
