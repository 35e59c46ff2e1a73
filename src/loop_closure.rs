//! Loop closure (component K): after pruning, some final states are
//! *dangling* — they are never used as a rule argument, so no program can
//! grow past them. Redirecting the rules that produce a dangling state `d`
//! onto a consumed state `c` with a compatible (embeddable) term turns the
//! automaton's growth back on while preserving observational equivalence.
//!
//! The embed-plus-mutual-simulation condition from the component design
//! reduces, for the tree-shaped automata this crate transcribes (every
//! state has exactly one defining rule, so its rule graph and its program
//! term carry the same information), to `Program::embeds_into` on the two
//! states' parsed terms: same head at every aligned position, or a
//! variable leaf on the candidate's side.

use std::collections::{BTreeSet, HashMap};

use crate::automaton::{classic_state_renaming, Dfta, StateIndex};
use crate::error::{Error, Result};
use crate::program::Program;

/// Which candidate to redirect a dangling state onto when more than one
/// qualifies (§9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopClosurePolicy {
    /// Take the first candidate in the configured order.
    FirstCandidate,
    /// Prefer the candidate consumed by the fewest other rules, so the
    /// redirect adds the least additional branching at any one state.
    FewestOutgoingDerivations,
}

/// How candidates are ordered before a policy picks among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopClosureCandidateOrder {
    /// Largest (most general) embeddable term first.
    Largest,
    /// Smallest (most specific) embeddable term first.
    MostSpecific,
}

#[derive(Debug, Clone)]
pub struct LoopClosureOptions {
    pub policy: LoopClosurePolicy,
    pub order: LoopClosureCandidateOrder,
}

impl Default for LoopClosureOptions {
    fn default() -> Self {
        LoopClosureOptions {
            policy: LoopClosurePolicy::FewestOutgoingDerivations,
            order: LoopClosureCandidateOrder::Largest,
        }
    }
}

/// Parses a canonical program string (the `Display` format produced by
/// [`crate::program::Program`]) back into a `Program`, purely so this
/// module can run `embeds_into` on transcribed states without threading
/// the original `Program` objects through the pruning driver.
fn parse_program(s: &str) -> Program {
    parse_term(s).0
}

fn parse_term(input: &str) -> (Program, &str) {
    let input = input.trim_start();
    if let Some(rest) = input.strip_prefix('(') {
        let head_end = rest.find(|c: char| c == ' ' || c == ')').unwrap_or(rest.len());
        let head = rest[..head_end].to_string();
        let mut remaining = &rest[head_end..];
        let mut args = Vec::new();
        loop {
            remaining = remaining.trim_start();
            if let Some(r) = remaining.strip_prefix(')') {
                remaining = r;
                break;
            }
            let (arg, r) = parse_term(remaining);
            args.push(arg);
            remaining = r;
        }
        (Program::application(head, args), remaining)
    } else {
        let end = input.find(|c: char| c == ' ' || c == ')').unwrap_or(input.len());
        let token = &input[..end];
        let remaining = &input[end..];
        if let Some(index) = token.strip_prefix("var").and_then(|rest| rest.parse::<u32>().ok()) {
            (Program::variable(index), remaining)
        } else {
            (Program::primitive(token.to_string()), remaining)
        }
    }
}

/// Orders `candidates` per `options.order`, then applies `options.policy` to
/// pick one. `FewestOutgoingDerivations` breaks ties by position in the
/// ordered list (`min_by_key` keeps the first element on a tie), so `order`
/// still governs the outcome when several candidates are equally cheap.
fn select_redirect_target(
    mut candidates: Vec<String>,
    options: &LoopClosureOptions,
    outgoing_count: &HashMap<String, usize>,
) -> String {
    match options.order {
        LoopClosureCandidateOrder::Largest => {
            candidates.sort_by(|a, b| parse_program(b).size().cmp(&parse_program(a).size()).then_with(|| a.cmp(b)))
        }
        LoopClosureCandidateOrder::MostSpecific => {
            candidates.sort_by(|a, b| parse_program(a).size().cmp(&parse_program(b).size()).then_with(|| a.cmp(b)))
        }
    }
    match options.policy {
        LoopClosurePolicy::FirstCandidate => candidates[0].clone(),
        LoopClosurePolicy::FewestOutgoingDerivations => candidates
            .into_iter()
            .enumerate()
            .min_by_key(|(i, c)| (outgoing_count.get(c).copied().unwrap_or(0), *i))
            .map(|(_, c)| c)
            .expect("candidates is non-empty"),
    }
}

/// Runs loop closure on `dfta`, whose states are canonical program strings
/// and whose type each state produces is given by `state_types`.
pub fn close_loops(
    dfta: &Dfta<String, String>,
    state_types: &HashMap<String, String>,
    options: &LoopClosureOptions,
) -> Result<Dfta<StateIndex, String>> {
    if dfta.is_unbounded() {
        return Err(Error::DomainInvariant(
            "loop closure invoked on an already-unbounded automaton".to_string(),
        ));
    }

    let mut consumed: BTreeSet<String> = BTreeSet::new();
    let mut outgoing_count: HashMap<String, usize> = HashMap::new();
    for (_, args) in dfta.rules().keys() {
        for a in args {
            consumed.insert(a.clone());
            *outgoing_count.entry(a.clone()).or_insert(0) += 1;
        }
    }

    let dangling: Vec<String> = dfta
        .all_states()
        .into_iter()
        .filter(|s| !consumed.contains(s))
        .collect();

    let mut redirect: HashMap<String, String> = HashMap::new();
    for d in &dangling {
        let d_type = state_types.get(d);
        let d_term = parse_program(d);
        let candidates: Vec<String> = consumed
            .iter()
            .filter(|c| *c != d)
            .filter(|c| state_types.get(*c) == d_type)
            .filter(|c| parse_program(c).embeds_into(&d_term))
            .cloned()
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let chosen = select_redirect_target(candidates, options, &outgoing_count);
        redirect.insert(d.clone(), chosen);
    }

    let mut rewritten = dfta.map_states(|s| redirect.get(s).cloned().unwrap_or_else(|| s.clone()));
    rewritten.reduce();
    let minimised = rewritten.minimise(None)?;
    let (renamed, _mapping) = classic_state_renaming(&minimised);
    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn dangling_example() -> (Dfta<String, String>, HashMap<String, String>) {
        let mut rules = BTreeMap::new();
        rules.insert(("var0".to_string(), vec![]), "var0".to_string());
        rules.insert(("1".to_string(), vec![]), "1".to_string());
        rules.insert(
            ("+".to_string(), vec!["var0".to_string(), "1".to_string()]),
            "(+ var0 1)".to_string(),
        );
        let finals: BTreeSet<String> = ["(+ var0 1)".to_string()].into_iter().collect();
        let dfta = Dfta::new(rules, finals);
        let mut state_types = HashMap::new();
        state_types.insert("var0".to_string(), "int".to_string());
        state_types.insert("1".to_string(), "int".to_string());
        state_types.insert("(+ var0 1)".to_string(), "int".to_string());
        (dfta, state_types)
    }

    #[test]
    fn dangling_final_state_is_redirected_onto_a_consumed_candidate() {
        let (dfta, types) = dangling_example();
        assert!(!dfta.is_unbounded());
        let closed = close_loops(&dfta, &types, &LoopClosureOptions::default()).unwrap();
        // "var0" trivially embeds into "(+ var0 1)" and is consumed, so the
        // closure should be able to grow past the original bound.
        assert!(closed.is_unbounded());
    }

    #[test]
    fn most_specific_order_breaks_fewest_outgoing_ties_towards_the_smaller_term() {
        let mut outgoing_count = HashMap::new();
        outgoing_count.insert("var0".to_string(), 1);
        outgoing_count.insert("(+ var0 1)".to_string(), 1);
        let candidates = vec!["var0".to_string(), "(+ var0 1)".to_string()];

        let largest = LoopClosureOptions {
            policy: LoopClosurePolicy::FewestOutgoingDerivations,
            order: LoopClosureCandidateOrder::Largest,
        };
        let most_specific = LoopClosureOptions {
            policy: LoopClosurePolicy::FewestOutgoingDerivations,
            order: LoopClosureCandidateOrder::MostSpecific,
        };

        // Both candidates tie on outgoing-derivation count, so the pick is
        // decided entirely by `order`.
        assert_eq!(
            select_redirect_target(candidates.clone(), &largest, &outgoing_count),
            "(+ var0 1)"
        );
        assert_eq!(select_redirect_target(candidates, &most_specific, &outgoing_count), "var0");
    }

    #[test]
    fn refuses_to_run_on_an_already_unbounded_automaton() {
        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "int".to_string());
        rules.insert(
            ("+".to_string(), vec!["int".to_string(), "int".to_string()]),
            "int".to_string(),
        );
        let finals: BTreeSet<String> = ["int".to_string()].into_iter().collect();
        let dfta = Dfta::new(rules, finals);
        let err = close_loops(&dfta, &HashMap::new(), &LoopClosureOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DomainInvariant(_)));
    }
}
