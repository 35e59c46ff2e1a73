//! Specialization and its inverse, despecialization (§6): binding a
//! mega-type-request automaton down to one concrete request, and dropping
//! an automaton's concrete variable numbering back to typed placeholders
//! so it can later be re-specialized to a different request.
//!
//! Both operations are state-merging/state-dropping rewrites over an
//! already-transcribed automaton, grounded on the same `map_states`-plus-
//! `reduce` idiom `loop_closure.rs` uses, with despecialize additionally
//! needing a small forced-merge fixpoint (no splitting, only merging, so
//! it always terminates) because collapsing numbered variables of one
//! type onto a single placeholder state can make previously-distinct
//! application rules collide.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::automaton::{classic_state_renaming, Dfta, StateIndex};
use crate::types::TypeSignature;

struct UnionFind(Vec<usize>);

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind((0..n).collect())
    }

    fn find(&mut self, x: usize) -> usize {
        if self.0[x] != x {
            self.0[x] = self.find(self.0[x]);
        }
        self.0[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.0[ra.max(rb)] = ra.min(rb);
        }
    }
}

fn var_index(letter: &str) -> Option<u32> {
    letter.strip_prefix("var").and_then(|rest| rest.parse::<u32>().ok())
}

/// Rewrites every numbered `varN` leaf to the typed placeholder
/// `var_TYPE`, merging to a fixpoint any states this collapse forces
/// together. The inverse of [`specialize`].
pub fn despecialize(dfta: &Dfta<StateIndex, String>, state_types: &HashMap<StateIndex, String>) -> Dfta<StateIndex, String> {
    let states: Vec<StateIndex> = dfta.all_states().into_iter().collect();
    let index_of: HashMap<StateIndex, usize> = states.iter().enumerate().map(|(i, s)| (*s, i)).collect();
    let mut uf = UnionFind::new(states.len());

    let typed_letter = |letter: &str, dst: &StateIndex| -> Option<String> {
        var_index(letter)?;
        state_types.get(dst).map(|t| format!("var_{}", t))
    };

    loop {
        let mut by_key: BTreeMap<(String, Vec<usize>), Vec<usize>> = BTreeMap::new();
        for ((letter, args), dst) in dfta.rules() {
            let key_letter = typed_letter(letter, dst).unwrap_or_else(|| letter.clone());
            let arg_classes: Vec<usize> = args.iter().map(|a| uf.find(index_of[a])).collect();
            by_key.entry((key_letter, arg_classes)).or_default().push(uf.find(index_of[dst]));
        }
        let mut changed = false;
        for dsts in by_key.values() {
            for w in dsts.windows(2) {
                if w[0] != w[1] {
                    uf.union(w[0], w[1]);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let class_of: HashMap<StateIndex, StateIndex> = states
        .iter()
        .map(|s| (*s, StateIndex(uf.find(index_of[s]) as u32)))
        .collect();

    let mut rules: BTreeMap<(String, Vec<StateIndex>), StateIndex> = BTreeMap::new();
    let mut finals: BTreeSet<StateIndex> = BTreeSet::new();
    for ((letter, args), dst) in dfta.rules() {
        let key_letter = typed_letter(letter, dst).unwrap_or_else(|| letter.clone());
        let new_args: Vec<StateIndex> = args.iter().map(|a| class_of[a]).collect();
        rules.insert((key_letter, new_args), class_of[dst]);
    }
    for f in dfta.finals() {
        finals.insert(class_of[f]);
    }
    let mut result = Dfta::new(rules, finals);
    result.reduce();
    let (renamed, _) = classic_state_renaming(&result);
    renamed
}

/// Binds a despecialized (or mega-type-request) automaton down to the
/// concrete `request`: every numbered `varN` actually used in `dfta` is
/// reassigned, within its type, to the `k`-th position of that type in
/// `request.arg_types` (positions wrap modulo the concrete request's
/// slot count for that type, so a mega-sized automaton still specializes
/// rather than losing every program that used a slot beyond the
/// request's arity). A rule whose variable has no matching position in
/// `request` is dropped; the automaton is reduced afterwards so the
/// dangling states this creates disappear.
pub fn specialize(
    dfta: &Dfta<StateIndex, String>,
    state_types: &HashMap<StateIndex, String>,
    request: &TypeSignature,
) -> Dfta<StateIndex, String> {
    let mut positions_by_type: HashMap<String, Vec<u32>> = HashMap::new();
    for (i, t) in request.arg_types.iter().enumerate() {
        positions_by_type.entry(t.clone()).or_default().push(i as u32);
    }

    let mut used_by_type: HashMap<String, BTreeSet<u32>> = HashMap::new();
    for ((letter, args), dst) in dfta.rules() {
        if args.is_empty() {
            if let Some(idx) = var_index(letter) {
                let t = state_types.get(dst).cloned().unwrap_or_default();
                used_by_type.entry(t).or_default().insert(idx);
            }
        }
    }

    let mut rename: HashMap<u32, u32> = HashMap::new();
    for (t, indices) in &used_by_type {
        if let Some(positions) = positions_by_type.get(t) {
            if !positions.is_empty() {
                for (k, &old) in indices.iter().enumerate() {
                    rename.insert(old, positions[k % positions.len()]);
                }
            }
        }
    }

    let mut rules: BTreeMap<(String, Vec<StateIndex>), StateIndex> = BTreeMap::new();
    for ((letter, args), dst) in dfta.rules() {
        let new_letter = match var_index(letter) {
            Some(old) => match rename.get(&old) {
                Some(&new_idx) => format!("var{}", new_idx),
                None => continue,
            },
            None => letter.clone(),
        };
        rules.insert((new_letter, args.clone()), *dst);
    }
    let mut result = Dfta::new(rules, dfta.finals().clone());
    result.reduce();
    let (renamed, _) = classic_state_renaming(&result);
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_int_vars_automaton() -> (Dfta<StateIndex, String>, HashMap<StateIndex, String>) {
        let mut rules = BTreeMap::new();
        rules.insert(("var0".to_string(), vec![]), StateIndex(0));
        rules.insert(("var1".to_string(), vec![]), StateIndex(1));
        rules.insert(
            ("+".to_string(), vec![StateIndex(0), StateIndex(1)]),
            StateIndex(2),
        );
        let finals: BTreeSet<StateIndex> = [StateIndex(2)].into_iter().collect();
        let dfta = Dfta::new(rules, finals);
        let mut types = HashMap::new();
        types.insert(StateIndex(0), "int".to_string());
        types.insert(StateIndex(1), "int".to_string());
        types.insert(StateIndex(2), "int".to_string());
        (dfta, types)
    }

    #[test]
    fn despecialize_collapses_same_typed_variables() {
        let (dfta, types) = two_int_vars_automaton();
        let generic = despecialize(&dfta, &types);
        let var_leaves = generic
            .rules()
            .keys()
            .filter(|(l, args)| args.is_empty() && l.starts_with("var_"))
            .count();
        assert_eq!(var_leaves, 1);
    }

    #[test]
    fn specialize_is_a_partial_inverse_of_despecialize() {
        let (dfta, types) = two_int_vars_automaton();
        let generic = despecialize(&dfta, &types);
        let generic_types: HashMap<StateIndex, String> = generic
            .all_states()
            .into_iter()
            .map(|s| (s, "int".to_string()))
            .collect();
        let request = TypeSignature {
            arg_types: vec!["int".to_string(), "int".to_string()],
            return_type: "int".to_string(),
        };
        let respecialized = specialize(&generic, &generic_types, &request);
        assert!(!respecialized.rules().is_empty());
    }
}
