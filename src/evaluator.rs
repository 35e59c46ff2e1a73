//! The observational-equivalence evaluator (component G): samples inputs
//! per type, evaluates programs against them, and collapses programs with
//! identical output signatures onto a single representative per return
//! type.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use crate::dsl::{Dsl, Semantic};
use crate::error::{Error, Result};
use crate::program::Program;
use crate::types::TypeSignature;
use crate::value::Value;

/// A small deterministic PRNG (xorshift64), so sampling and shuffling are a
/// pure function of the configured seed (§5 fairness/determinism).
struct Xorshift(u64);

impl Xorshift {
    fn new(seed: u64) -> Self {
        Xorshift(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_range(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }

    fn shuffle<T>(&mut self, values: &mut [T]) {
        for i in (1..values.len()).rev() {
            let j = self.next_range(i + 1);
            values.swap(i, j);
        }
    }
}

/// How many attempted collisions to tolerate, per argument, before falling
/// back to cycling sampled values (§4.G step 2).
const COLLISION_BUDGET_PER_ARG: usize = 100;

pub struct Evaluator<'a> {
    dsl: &'a Dsl,
    sample_count: usize,
    rng: Xorshift,
    pools: HashMap<String, Vec<Value>>,
    input_tuples: HashMap<Vec<String>, Rc<Vec<Vec<Value>>>>,
    /// Programs already offered to `eval` once — step 1's "already in the
    /// memo" short circuit.
    classified: HashSet<Program>,
    /// Per-program row of per-input-tuple values, doubling as both the
    /// recursive-evaluation memo (step 3) and the row evicted on
    /// classification (step 4).
    value_memo: HashMap<Program, Vec<Option<Value>>>,
    /// return type -> value signature -> representative program.
    equivalence: HashMap<String, HashMap<Vec<Value>, Program>>,
    /// return type -> representative program -> every program classified
    /// onto it (representative included), for the audit JSON format (§6).
    classes: HashMap<String, HashMap<Program, Vec<Program>>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(dsl: &'a Dsl, sample_count: usize, seed: u64) -> Self {
        Evaluator {
            dsl,
            sample_count: sample_count.max(1),
            rng: Xorshift::new(seed),
            pools: HashMap::new(),
            input_tuples: HashMap::new(),
            classified: HashSet::new(),
            value_memo: HashMap::new(),
            equivalence: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    /// Classifies `program` against `type_req`. `None` means `program` is
    /// itself a fresh representative (keep it); `Some(p)` means an earlier
    /// program `p` already produces the same value signature (drop this
    /// one).
    pub fn eval(&mut self, program: &Program, type_req: &TypeSignature) -> Result<Option<Program>> {
        if self.classified.contains(program) {
            return Ok(None);
        }
        let tuples = self.input_tuples_for(&type_req.arg_types)?;
        let mut signature = Vec::with_capacity(tuples.len());
        for (i, tuple) in tuples.iter().enumerate() {
            signature.push(self.eval_value(program, &tuples, tuple, i)?);
        }
        self.classified.insert(program.clone());
        let table = self.equivalence.entry(type_req.return_type.clone()).or_default();
        let classes = self.classes.entry(type_req.return_type.clone()).or_default();
        if let Some(representative) = table.get(&signature) {
            let representative = representative.clone();
            classes.entry(representative.clone()).or_default().push(program.clone());
            self.value_memo.remove(program);
            Ok(Some(representative))
        } else {
            table.insert(signature, program.clone());
            classes.entry(program.clone()).or_insert_with(|| vec![program.clone()]);
            Ok(None)
        }
    }

    /// Every program classified so far under `return_type`, grouped by
    /// representative (§6 JSON equivalence-class artifact).
    pub fn equivalence_classes(&self, return_type: &str) -> BTreeMap<String, Vec<String>> {
        self.classes
            .get(return_type)
            .into_iter()
            .flatten()
            .map(|(representative, members)| {
                (
                    representative.to_string(),
                    members.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    fn eval_value(
        &mut self,
        program: &Program,
        tuples: &[Vec<Value>],
        tuple: &[Value],
        idx: usize,
    ) -> Result<Value> {
        if let Some(row) = self.value_memo.get(program) {
            if let Some(Some(v)) = row.get(idx) {
                return Ok(v.clone());
            }
        }
        let value = if let Some(var_index) = program.variable_index() {
            tuple[var_index as usize].clone()
        } else {
            let head = program.head().expect("non-variable program has a head letter");
            let semantic = self
                .dsl
                .semantic(head)
                .ok_or_else(|| Error::DomainInvariant(format!("unknown primitive `{}`", head)))?
                .clone();
            let mut arg_values = Vec::with_capacity(program.args().len());
            for a in program.args() {
                arg_values.push(self.eval_value(a, tuples, tuple, idx)?);
            }
            self.apply_semantic(&semantic, &arg_values)?
        };
        let row = self
            .value_memo
            .entry(program.clone())
            .or_insert_with(|| vec![None; tuples.len()]);
        row[idx] = Some(value.clone());
        Ok(value)
    }

    fn apply_semantic(&self, semantic: &Semantic, args: &[Value]) -> Result<Value> {
        match semantic(args) {
            Ok(v) => Ok(v),
            Err(Error::SemanticTrap { kind }) if self.dsl.skip_exceptions().iter().any(|k| k == &kind) => {
                Ok(Value::Bottom)
            }
            Err(e) => Err(e),
        }
    }

    fn input_tuples_for(&mut self, arg_types: &[String]) -> Result<Rc<Vec<Vec<Value>>>> {
        if let Some(cached) = self.input_tuples.get(arg_types) {
            return Ok(cached.clone());
        }
        let built = Rc::new(self.build_input_tuples(arg_types)?);
        self.input_tuples.insert(arg_types.to_vec(), built.clone());
        Ok(built)
    }

    fn build_input_tuples(&mut self, arg_types: &[String]) -> Result<Vec<Vec<Value>>> {
        let arity = arg_types.len();
        if arity == 0 {
            return Ok(vec![Vec::new()]);
        }
        let mut pools: Vec<Vec<Value>> = Vec::with_capacity(arity);
        for t in arg_types {
            pools.push(self.pool_for(t)?.clone());
        }
        let k = self.sample_count;
        let mut tuples: Vec<Vec<Value>> = Vec::with_capacity(k);
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        let max_attempts = COLLISION_BUDGET_PER_ARG * arity;
        let mut attempts = 0;
        while tuples.len() < k && attempts < max_attempts {
            attempts += 1;
            let mut tuple = Vec::with_capacity(arity);
            for pool in &pools {
                let idx = self.rng.next_range(pool.len());
                tuple.push(pool[idx].clone());
            }
            if seen.insert(tuple.clone()) {
                tuples.push(tuple);
            }
        }
        if tuples.len() < k {
            log::warn!(
                "type request {:?} produced only {} of {} requested distinct input tuples after {} attempts; cycling sampled values to fill the remainder",
                arg_types,
                tuples.len(),
                k,
                max_attempts
            );
            let mut cursor = 0usize;
            while tuples.len() < k {
                let tuple: Vec<Value> = pools.iter().map(|pool| pool[cursor % pool.len()].clone()).collect();
                tuples.push(tuple);
                cursor += 1;
            }
        }
        Ok(tuples)
    }

    fn pool_for(&mut self, type_name: &str) -> Result<&Vec<Value>> {
        if !self.pools.contains_key(type_name) {
            let sampler = self
                .dsl
                .sampler(type_name)
                .ok_or_else(|| Error::UserInput(format!("no sampler registered for type `{}`", type_name)))?
                .clone();
            let mut pool: Vec<Value> = (0..self.sample_count as u64).map(|i| sampler(i)).collect();
            if pool.is_empty() {
                return Err(Error::Capacity {
                    type_name: type_name.to_string(),
                    requested: self.sample_count,
                    available: 0,
                });
            }
            self.rng.shuffle(&mut pool);
            self.pools.insert(type_name.to_string(), pool);
        }
        Ok(&self.pools[type_name])
    }

    /// Drops the recursive-evaluation and classification caches, keeping
    /// the equivalence-class map (§5 "caches ... mutated only during that
    /// component's active phase").
    pub fn clean_memoisation(&mut self) {
        self.value_memo.clear();
        self.classified.clear();
    }

    /// Releases everything. Takes `self` by value so it can only be called
    /// once the caller has already transcribed whatever it needed out of
    /// the equivalence map (§5).
    pub fn free_memory(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::DslBuilder;

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

    fn division_dsl() -> Dsl {
        DslBuilder::new()
            .primitive("1", "int", Rc::new(|_| Ok(Value::Int(1))))
            .primitive("0", "int", Rc::new(|_| Ok(Value::Int(0))))
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
            .sampler("int", Rc::new(|i: u64| Value::Int((i % 3) as i64)))
            .skip_exception("ZeroDivisionError")
            .build()
            .unwrap()
    }

    #[test]
    fn identical_signature_collapses_to_representative() {
        let dsl = arithmetic_dsl();
        let mut evaluator = Evaluator::new(&dsl, 4, 1);
        let type_req = TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        };
        let a = Program::application("+", vec![Program::primitive("1"), Program::primitive("0")]);
        let b = Program::application("+", vec![Program::primitive("0"), Program::primitive("1")]);
        assert_eq!(evaluator.eval(&a, &type_req).unwrap(), None);
        assert_eq!(evaluator.eval(&b, &type_req).unwrap(), Some(a));
    }

    #[test]
    fn equivalence_classes_groups_members_under_their_representative() {
        let dsl = arithmetic_dsl();
        let mut evaluator = Evaluator::new(&dsl, 4, 1);
        let type_req = TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        };
        let a = Program::application("+", vec![Program::primitive("1"), Program::primitive("0")]);
        let b = Program::application("+", vec![Program::primitive("0"), Program::primitive("1")]);
        evaluator.eval(&a, &type_req).unwrap();
        evaluator.eval(&b, &type_req).unwrap();
        let classes = evaluator.equivalence_classes("int");
        let members = classes.get(&a.to_string()).expect("a is the representative");
        assert_eq!(members.len(), 2);
        assert!(members.contains(&a.to_string()));
        assert!(members.contains(&b.to_string()));
    }

    #[test]
    fn already_classified_program_short_circuits() {
        let dsl = arithmetic_dsl();
        let mut evaluator = Evaluator::new(&dsl, 4, 1);
        let type_req = TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        };
        let a = Program::primitive("1");
        assert_eq!(evaluator.eval(&a, &type_req).unwrap(), None);
        assert_eq!(evaluator.eval(&a, &type_req).unwrap(), None);
    }

    #[test]
    fn allow_listed_exception_becomes_bottom_instead_of_propagating() {
        let dsl = division_dsl();
        let mut evaluator = Evaluator::new(&dsl, 6, 1);
        let type_req = TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        };
        let program = Program::application("/", vec![Program::primitive("1"), Program::primitive("0")]);
        assert!(evaluator.eval(&program, &type_req).is_ok());
    }
}
