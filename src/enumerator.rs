//! The bottom-up, size-stratified, cooperative enumerator (component F).
//! Implemented as an explicit state machine (`next(keep) -> Option<Program>`)
//! per the design notes, since stable Rust has no first-class generators.
//! Non-final-state candidates are retained into the memo unconditionally
//! and never offered to the driver; only final-state candidates pause for
//! a keep/drop decision.

use std::collections::{HashMap, VecDeque};

use crate::automaton::{Dfta, LetterLabel, StateLabel};
use crate::partitions::compositions;
use crate::program::Program;

/// Converts a rule's letter and already-evaluated argument programs into a
/// `Program`. Letters of the shape `varN` (produced by
/// [`crate::saturation::variable_letter`]) become `Program::variable(N)`;
/// anything else is a primitive leaf or application.
pub fn letter_to_program(letter: &str, args: Vec<Program>) -> Program {
    if args.is_empty() {
        if let Some(rest) = letter.strip_prefix("var") {
            if let Ok(index) = rest.parse::<u32>() {
                return Program::variable(index);
            }
        }
        Program::primitive(letter)
    } else {
        Program::application(letter, args)
    }
}

struct Candidate<S> {
    state: S,
    program: Program,
    is_final: bool,
}

/// Per-state, per-size memoized representative programs (§3 "Enumerator
/// memo").
pub type Memo<S> = HashMap<S, Vec<Vec<Program>>>;

pub struct Enumerator<'a, S: StateLabel, L: LetterLabel> {
    dfta: &'a Dfta<S, L>,
    memo: Memo<S>,
    max_size: usize,
    current_size: usize,
    queue: VecDeque<Candidate<S>>,
    awaiting: Option<(S, usize, Program)>,
    populated: bool,
}

impl<'a, S: StateLabel, L: LetterLabel> Enumerator<'a, S, L> {
    pub fn new(dfta: &'a Dfta<S, L>, max_size: usize) -> Self {
        Enumerator {
            dfta,
            memo: HashMap::new(),
            max_size,
            current_size: 1,
            queue: VecDeque::new(),
            awaiting: None,
            populated: false,
        }
    }

    pub fn memo(&self) -> &Memo<S> {
        &self.memo
    }

    fn retain(&mut self, state: S, size_index: usize, program: Program) {
        let rows = self.memo.entry(state).or_insert_with(|| vec![Vec::new(); self.max_size]);
        rows[size_index].push(program);
    }

    fn populate_size(&mut self, size: usize) {
        let mut candidates = Vec::new();
        if size == 1 {
            for ((letter, args), dst) in self.dfta.rules() {
                if !args.is_empty() {
                    continue;
                }
                let program = letter_to_program(letter, vec![]);
                candidates.push(Candidate {
                    state: dst.clone(),
                    program,
                    is_final: self.dfta.finals().contains(dst),
                });
            }
        } else {
            for ((letter, args), dst) in self.dfta.rules() {
                let k = args.len();
                if k == 0 || size < k + 1 {
                    continue;
                }
                for combo in compositions(k, size - 1) {
                    let mut per_arg: Vec<&Vec<Program>> = Vec::with_capacity(k);
                    let mut ok = true;
                    for (i, &part) in combo.iter().enumerate() {
                        match self.memo.get(&args[i]).and_then(|sizes| sizes.get(part - 1)) {
                            Some(v) if !v.is_empty() => per_arg.push(v),
                            _ => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if !ok {
                        continue;
                    }
                    for tuple in cartesian_programs(&per_arg) {
                        let program = letter_to_program(letter, tuple);
                        candidates.push(Candidate {
                            state: dst.clone(),
                            program,
                            is_final: self.dfta.finals().contains(dst),
                        });
                    }
                }
            }
        }
        self.queue = candidates.into();
    }

    /// Advances the enumerator. `keep` resolves the program most recently
    /// yielded (ignored on the very first call, since nothing is awaiting
    /// a decision yet). Returns the next final-state candidate, or `None`
    /// once every size up to `max_size` has been exhausted.
    pub fn next(&mut self, keep: bool) -> Option<Program> {
        if let Some((state, idx, program)) = self.awaiting.take() {
            if keep {
                self.retain(state, idx, program);
            }
        }
        loop {
            if !self.populated {
                self.populate_size(self.current_size);
                self.populated = true;
            }
            while let Some(candidate) = self.queue.pop_front() {
                if candidate.is_final {
                    self.awaiting = Some((candidate.state.clone(), self.current_size - 1, candidate.program.clone()));
                    return Some(candidate.program);
                } else {
                    self.retain(candidate.state, self.current_size - 1, candidate.program);
                }
            }
            self.current_size += 1;
            if self.current_size > self.max_size {
                return None;
            }
            self.populated = false;
        }
    }
}

fn cartesian_programs(slots: &[&Vec<Program>]) -> Vec<Vec<Program>> {
    let mut result: Vec<Vec<Program>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::with_capacity(result.len() * slot.len());
        for prefix in &result {
            for p in slot.iter() {
                let mut combo = prefix.clone();
                combo.push(p.clone());
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
    use crate::saturation::{grammar_by_saturation, Request, SaturationConfig};
    use crate::dsl::DslBuilder;
    use crate::types::TypeSignature;
    use crate::value::Value;
    use std::rc::Rc;
    use std::collections::HashMap as Map;

    fn arithmetic_dsl() -> crate::dsl::Dsl {
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
    fn keeping_everything_reproduces_trees_at_size() {
        let dsl = arithmetic_dsl();
        let request = Request::Typed(TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        });
        let config = SaturationConfig {
            size: Some((1, 4)),
            depth: None,
            commutative: Map::new(),
        };
        let dfta = grammar_by_saturation(&dsl, &request, &config);
        let mut enumerator = Enumerator::new(&dfta, 4);
        let mut kept_per_size = [0u128; 4];
        let mut keep = true;
        while let Some(p) = enumerator.next(keep) {
            kept_per_size[p.size() as usize - 1] += 1;
            keep = true;
        }
        for size in 1..=4 {
            assert_eq!(dfta.trees_at_size(size), kept_per_size[size - 1]);
        }
    }

    #[test]
    fn no_program_is_yielded_twice() {
        let dsl = arithmetic_dsl();
        let request = Request::Typed(TypeSignature {
            arg_types: vec![],
            return_type: "int".to_string(),
        });
        let config = SaturationConfig {
            size: Some((1, 4)),
            depth: None,
            commutative: Map::new(),
        };
        let dfta = grammar_by_saturation(&dsl, &request, &config);
        let mut enumerator = Enumerator::new(&dfta, 4);
        let mut seen = std::collections::HashSet::new();
        let mut last_size = 0;
        while let Some(p) = enumerator.next(true) {
            assert!(p.size() as usize >= last_size);
            last_size = p.size() as usize;
            assert!(seen.insert(p.to_string()));
        }
    }
}
