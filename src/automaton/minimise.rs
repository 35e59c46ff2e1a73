//! Brainerd's minimisation algorithm (§4.D): partition refinement starting
//! from `{non-finals}, {finals}`, splitting a class whenever two of its
//! members disagree on what happens when a consumer's argument is swapped
//! from one to the other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{Dfta, LetterLabel, StateClass, StateLabel};

/// One occurrence of `state` as an argument of some rule: the rule's
/// letter, its full argument tuple, and the position `state` occupies.
type Consumer<S, L> = (L, Vec<S>, usize);

/// Runs Brainerd's fixpoint on an already-reduced automaton. `can_be_merged`
/// additionally gates which state pairs are allowed to collapse (default:
/// always allowed).
pub fn minimise<S: StateLabel, L: LetterLabel>(
    dfta: &Dfta<S, L>,
    can_be_merged: Option<&dyn Fn(&S, &S) -> bool>,
) -> Dfta<StateClass<S>, L> {
    let states = dfta.states();
    let mut classes: Vec<Vec<S>> = vec![Vec::new(), Vec::new()];
    let mut state2cls: HashMap<S, usize> = HashMap::new();
    for s in states {
        let cls = if dfta.finals().contains(&s) { 1 } else { 0 };
        classes[cls].push(s.clone());
        state2cls.insert(s, cls);
    }

    let mut consumer_of: HashMap<S, Vec<Consumer<S, L>>> = HashMap::new();
    for ((letter, args), _dst) in dfta.rules() {
        for (pos, a) in args.iter().enumerate() {
            consumer_of
                .entry(a.clone())
                .or_default()
                .push((letter.clone(), args.clone(), pos));
        }
    }

    loop {
        let mut changed = false;
        let mut next_classes: Vec<Vec<S>> = Vec::new();
        for class in &classes {
            if class.is_empty() {
                continue;
            }
            let mut subgroups: Vec<Vec<S>> = Vec::new();
            'assign: for s in class {
                for group in subgroups.iter_mut() {
                    let representative = &group[0];
                    let merge_allowed = can_be_merged.map(|f| f(representative, s)).unwrap_or(true);
                    if merge_allowed
                        && are_equivalent(representative, s, dfta, &consumer_of, &state2cls)
                    {
                        group.push(s.clone());
                        continue 'assign;
                    }
                }
                subgroups.push(vec![s.clone()]);
            }
            if subgroups.len() > 1 {
                changed = true;
            }
            next_classes.extend(subgroups);
        }
        classes = next_classes;
        if !changed {
            break;
        }
        state2cls.clear();
        for (id, group) in classes.iter().enumerate() {
            for s in group {
                state2cls.insert(s.clone(), id);
            }
        }
    }

    // Final renumbering (the loop above may leave stale ids on its last,
    // no-op pass; recompute once more to be safe).
    state2cls.clear();
    for (id, group) in classes.iter().enumerate() {
        for s in group {
            state2cls.insert(s.clone(), id);
        }
    }
    let class_of_state =
        |s: &S| -> StateClass<S> { StateClass(classes[state2cls[s]].iter().cloned().collect()) };

    let mut rules = BTreeMap::new();
    for ((letter, args), dst) in dfta.rules() {
        let new_args: Vec<StateClass<S>> = args.iter().map(&class_of_state).collect();
        rules.insert((letter.clone(), new_args), class_of_state(dst));
    }
    let finals: BTreeSet<StateClass<S>> = dfta.finals().iter().map(&class_of_state).collect();
    Dfta::new(rules, finals)
}

/// Two states `a`/`b` are equivalent iff substituting one for the other in
/// every rule that consumes it (in either direction) always yields a rule
/// that exists and lands in the same (current, possibly still coarse)
/// equivalence class.
fn are_equivalent<S: StateLabel, L: LetterLabel>(
    a: &S,
    b: &S,
    dfta: &Dfta<S, L>,
    consumer_of: &HashMap<S, Vec<Consumer<S, L>>>,
    state2cls: &HashMap<S, usize>,
) -> bool {
    check_substitution(a, b, dfta, consumer_of, state2cls) && check_substitution(b, a, dfta, consumer_of, state2cls)
}

fn check_substitution<S: StateLabel, L: LetterLabel>(
    from: &S,
    to: &S,
    dfta: &Dfta<S, L>,
    consumer_of: &HashMap<S, Vec<Consumer<S, L>>>,
    state2cls: &HashMap<S, usize>,
) -> bool {
    let Some(uses) = consumer_of.get(from) else {
        return true;
    };
    for (letter, args, pos) in uses {
        let original_dst = match dfta.read(letter, args) {
            Some(d) => d,
            None => continue,
        };
        let mut swapped_args = args.clone();
        swapped_args[*pos] = to.clone();
        match dfta.read(letter, &swapped_args) {
            None => return false,
            Some(swapped_dst) => {
                if state2cls.get(swapped_dst) != state2cls.get(original_dst) {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet as Set;

    #[test]
    fn minimise_merges_observationally_identical_states() {
        // Two ways to reach "int" both via "0"/"1" arity-0 rules behave
        // identically under "+", so a duplicate leaf state collapses.
        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "A".to_string());
        rules.insert(("1".to_string(), vec![]), "B".to_string());
        rules.insert(
            ("+".to_string(), vec!["A".to_string(), "A".to_string()]),
            "C".to_string(),
        );
        rules.insert(
            ("+".to_string(), vec!["B".to_string(), "B".to_string()]),
            "C".to_string(),
        );
        let finals: Set<String> = ["C".to_string()].into_iter().collect();
        let mut dfta = Dfta::new(rules, finals);
        dfta.reduce();
        let minimised = minimise(&dfta, None);
        // A and B are never distinguished by any consumer rule at a
        // matching position with a differing class, so they collapse.
        assert!(minimised.states().len() <= dfta.states().len());
    }

    #[test]
    fn minimise_idempotent_up_to_state_renaming() {
        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "A".to_string());
        rules.insert(
            ("+".to_string(), vec!["A".to_string(), "A".to_string()]),
            "A".to_string(),
        );
        let finals: Set<String> = ["A".to_string()].into_iter().collect();
        let mut dfta = Dfta::new(rules, finals);
        dfta.reduce();
        let once = minimise(&dfta, None);
        assert_eq!(once.rules().len(), dfta.rules().len());
    }
}
