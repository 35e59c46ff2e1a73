//! The DFTA algebra (component D): rules, states, reachability/productivity
//! reduction, product construction, tree counting, unboundedness and
//! max-size/depth analysis. Minimisation (Brainerd's algorithm) lives in
//! the sibling `minimise` module.
//!
//! A `Dfta<S, L>` is generic over its state label `S` and letter label
//! `L`, mirroring the Python original's `DFTA[U, V]`. Rules and finals are
//! kept in `BTreeMap`/`BTreeSet` rather than hash collections specifically
//! so that iteration order is a stable function of the automaton's
//! content, not of insertion order or hash-bucket layout (§5's ordering
//! guarantee).

pub mod minimise;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::partitions::compositions;

/// Bound shared by every state label this module works with.
pub trait StateLabel: Clone + Ord + Eq + Hash + fmt::Debug + fmt::Display {}
impl<T: Clone + Ord + Eq + Hash + fmt::Debug + fmt::Display> StateLabel for T {}

/// Bound shared by every letter label this module works with.
pub trait LetterLabel: Clone + Ord + Eq + Hash + fmt::Debug + fmt::Display {}
impl<T: Clone + Ord + Eq + Hash + fmt::Debug + fmt::Display> LetterLabel for T {}

/// A dense, display-stable state identifier produced by
/// `classic_state_renaming`, analogous to the teacher's own `StateIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateIndex(pub u32);

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A minimisation quotient class: the set of original states merged into
/// one. Wrapped in its own type (rather than using `BTreeSet` directly)
/// purely to give it a `Display` impl, since `StateLabel` requires one and
/// `BTreeSet` has none.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateClass<S: StateLabel>(pub BTreeSet<S>);

impl<S: StateLabel> fmt::Display for StateClass<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, s) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "}}")
    }
}

/// A deterministic finite tree automaton over states `S` and letters `L`.
#[derive(Debug, Clone)]
pub struct Dfta<S: StateLabel, L: LetterLabel> {
    rules: BTreeMap<(L, Vec<S>), S>,
    finals: BTreeSet<S>,
}

impl<S: StateLabel, L: LetterLabel> Dfta<S, L> {
    pub fn new(rules: BTreeMap<(L, Vec<S>), S>, finals: BTreeSet<S>) -> Self {
        Dfta { rules, finals }
    }

    pub fn empty() -> Self {
        Dfta {
            rules: BTreeMap::new(),
            finals: BTreeSet::new(),
        }
    }

    pub fn rules(&self) -> &BTreeMap<(L, Vec<S>), S> {
        &self.rules
    }

    pub fn finals(&self) -> &BTreeSet<S> {
        &self.finals
    }

    pub fn size(&self) -> usize {
        self.rules.len()
    }

    /// Looks up the unique destination for `(letter, children)`, enforcing
    /// the determinism invariant by construction (only one entry can ever
    /// occupy a given key in a `BTreeMap`).
    pub fn read(&self, letter: &L, children: &[S]) -> Option<&S> {
        self.rules.get(&(letter.clone(), children.to_vec()))
    }

    /// Inserts a rule, overwriting any previous destination for the same
    /// key (preserving the determinism invariant).
    pub fn add_rule(&mut self, letter: L, args: Vec<S>, dst: S) {
        self.rules.insert((letter, args), dst);
    }

    pub fn add_final(&mut self, state: S) {
        self.finals.insert(state);
    }

    pub fn alphabet(&self) -> BTreeSet<L> {
        self.rules.keys().map(|(l, _)| l.clone()).collect()
    }

    pub fn max_arity(&self) -> usize {
        self.rules.keys().map(|(_, args)| args.len()).max().unwrap_or(0)
    }

    /// Every state occurring anywhere in the automaton (as a rule
    /// destination, a rule argument, or a final), regardless of
    /// reachability.
    pub fn all_states(&self) -> BTreeSet<S> {
        let mut states: BTreeSet<S> = self.finals.clone();
        for ((_, args), dst) in &self.rules {
            states.insert(dst.clone());
            states.extend(args.iter().cloned());
        }
        states
    }

    /// The bottom-up reachable-state fixpoint (§4.D): a state is reachable
    /// if some rule targeting it has every argument already reachable,
    /// starting from arity-0 rules.
    pub fn reachable_states(&self) -> BTreeSet<S> {
        let mut reachable: BTreeSet<S> = BTreeSet::new();
        loop {
            let mut changed = false;
            for ((_, args), dst) in &self.rules {
                if !reachable.contains(dst) && args.iter().all(|a| reachable.contains(a)) {
                    reachable.insert(dst.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        reachable
    }

    /// Alias kept for parity with the Python original's `states` property.
    pub fn states(&self) -> BTreeSet<S> {
        self.reachable_states()
    }

    /// The co-reachable-from-finals fixpoint: a state is productive if it
    /// is final, or it is an argument of some rule whose destination is
    /// already known to be productive.
    pub fn productive_states(&self) -> BTreeSet<S> {
        let mut productive: BTreeSet<S> = self.finals.clone();
        loop {
            let mut changed = false;
            for ((_, args), dst) in &self.rules {
                if productive.contains(dst) {
                    for a in args {
                        if !productive.contains(a) {
                            productive.insert(a.clone());
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        productive
    }

    pub fn remove_unreachable(&mut self) {
        let reachable = self.reachable_states();
        self.rules
            .retain(|(_, args), dst| reachable.contains(dst) && args.iter().all(|a| reachable.contains(a)));
        self.finals.retain(|f| reachable.contains(f));
    }

    pub fn remove_unproductive(&mut self) {
        let productive = self.productive_states();
        self.rules.retain(|(_, args), dst| {
            productive.contains(dst) && args.iter().all(|a| productive.contains(a))
        });
    }

    /// Reduces to fixpoint: alternates reachability and productivity
    /// pruning until neither changes anything (§4.D, invariant #3 in
    /// §8: `reduce(reduce(G)) == reduce(G)`).
    pub fn reduce(&mut self) {
        loop {
            let before = self.rules.len();
            self.remove_unreachable();
            self.remove_unproductive();
            if self.rules.len() == before {
                break;
            }
        }
    }

    /// `true` once `reduce()` could no longer remove any rule or final —
    /// used by `minimise` to reject unreduced input (§7 DomainInvariant).
    pub fn is_reduced(&self) -> bool {
        let mut probe = self.clone();
        probe.reduce();
        probe.rules.len() == self.rules.len() && probe.finals.len() == self.finals.len()
    }

    /// Groups rules by `(letter, arity)` for the product constructions,
    /// avoiding an O(|rules_a| * |rules_b|) full cross product.
    fn rules_by_letter_arity(&self) -> HashMap<(L, usize), Vec<(Vec<S>, S)>> {
        let mut map: HashMap<(L, usize), Vec<(Vec<S>, S)>> = HashMap::new();
        for ((letter, args), dst) in &self.rules {
            map.entry((letter.clone(), args.len()))
                .or_default()
                .push((args.clone(), dst.clone()));
        }
        map
    }

    fn product_rules(&self, other: &Self) -> BTreeMap<(L, Vec<(S, S)>), (S, S)> {
        let mine = self.rules_by_letter_arity();
        let theirs = other.rules_by_letter_arity();
        let mut rules = BTreeMap::new();
        for (key, left_entries) in &mine {
            if let Some(right_entries) = theirs.get(key) {
                for (args_a, dst_a) in left_entries {
                    for (args_b, dst_b) in right_entries {
                        let args: Vec<(S, S)> = args_a
                            .iter()
                            .zip(args_b.iter())
                            .map(|(a, b)| (a.clone(), b.clone()))
                            .collect();
                        rules.insert((key.0.clone(), args), (dst_a.clone(), dst_b.clone()));
                    }
                }
            }
        }
        rules
    }

    /// Intersection (§4.D): product state space restricted to pairs of
    /// finals.
    pub fn intersect(&self, other: &Self) -> Dfta<(S, S), L> {
        let rules = self.product_rules(other);
        let finals: BTreeSet<(S, S)> = self
            .finals
            .iter()
            .flat_map(|a| other.finals.iter().map(move |b| (a.clone(), b.clone())))
            .collect();
        let mut product = Dfta::new(rules, finals);
        product.reduce();
        product
    }

    /// Union (§4.D): `finals = finals1 x states2 U states1 x finals2`.
    pub fn union(&self, other: &Self) -> Dfta<(S, S), L> {
        let rules = self.product_rules(other);
        let states_a = self.states();
        let states_b = other.states();
        let mut finals: BTreeSet<(S, S)> = self
            .finals
            .iter()
            .flat_map(|a| states_b.iter().map(move |b| (a.clone(), b.clone())))
            .collect();
        finals.extend(
            states_a
                .iter()
                .flat_map(|a| other.finals.iter().map(move |b| (a.clone(), b.clone()))),
        );
        let mut product = Dfta::new(rules, finals);
        product.reduce();
        product
    }

    /// Rewrites every state label through `f`. Rule keys are re-sorted as
    /// a side effect of reinsertion into the `BTreeMap`.
    pub fn map_states<S2: StateLabel>(&self, f: impl Fn(&S) -> S2) -> Dfta<S2, L> {
        let mut rules = BTreeMap::new();
        for ((letter, args), dst) in &self.rules {
            let new_args: Vec<S2> = args.iter().map(&f).collect();
            rules.insert((letter.clone(), new_args), f(dst));
        }
        let finals = self.finals.iter().map(&f).collect();
        Dfta::new(rules, finals)
    }

    /// Rewrites every letter label through `f`.
    pub fn map_alphabet<L2: LetterLabel>(&self, f: impl Fn(&L) -> L2) -> Dfta<S, L2> {
        let mut rules = BTreeMap::new();
        for ((letter, args), dst) in &self.rules {
            rules.insert((f(letter), args.clone()), dst.clone());
        }
        Dfta::new(rules, self.finals.clone())
    }

    /// Per-state tree counts for sizes `1..=max_size` (§4.D Counting).
    /// `count[state][s - 1]` is the number of distinct accepted trees of
    /// size `s` rooted at `state`.
    pub fn count_by_size(&self, max_size: usize) -> BTreeMap<S, Vec<u128>> {
        let mut count: BTreeMap<S, Vec<u128>> = BTreeMap::new();
        for s in self.all_states() {
            count.insert(s, vec![0u128; max_size]);
        }
        if max_size == 0 {
            return count;
        }
        for size in 1..=max_size {
            for ((_letter, args), dst) in &self.rules {
                if args.is_empty() {
                    if size == 1 {
                        if let Some(row) = count.get_mut(dst) {
                            row[0] += 1;
                        }
                    }
                    continue;
                }
                let k = args.len();
                if size < k + 1 {
                    continue;
                }
                for combo in compositions(k, size - 1) {
                    let mut product: u128 = 1;
                    for (arg, &part) in args.iter().zip(combo.iter()) {
                        let c = count.get(arg).map(|row| row[part - 1]).unwrap_or(0);
                        if c == 0 {
                            product = 0;
                            break;
                        }
                        product = product.saturating_mul(c);
                    }
                    if product > 0 {
                        if let Some(row) = count.get_mut(dst) {
                            row[size - 1] = row[size - 1].saturating_add(product);
                        }
                    }
                }
            }
        }
        count
    }

    pub fn trees_at_size(&self, size: usize) -> u128 {
        if size == 0 {
            return 0;
        }
        let count = self.count_by_size(size);
        self.finals
            .iter()
            .map(|f| count.get(f).map(|row| row[size - 1]).unwrap_or(0))
            .fold(0u128, |a, b| a.saturating_add(b))
    }

    pub fn trees_until_size(&self, size: usize) -> u128 {
        if size == 0 {
            return 0;
        }
        let count = self.count_by_size(size);
        let mut total = 0u128;
        for s in 1..=size {
            let row_total = self
                .finals
                .iter()
                .map(|f| count.get(f).map(|row| row[s - 1]).unwrap_or(0))
                .fold(0u128, |a, b| a.saturating_add(b));
            total = total.saturating_add(row_total);
        }
        total
    }

    /// The transitive-closure cycle test (§4.D Unboundedness): build the
    /// argument-consumption graph (`dst -> arg` for every rule) and check
    /// for a cycle via three-colour DFS.
    pub fn is_unbounded(&self) -> bool {
        let mut adjacency: BTreeMap<S, Vec<S>> = BTreeMap::new();
        for ((_letter, args), dst) in &self.rules {
            adjacency.entry(dst.clone()).or_default().extend(args.iter().cloned());
        }
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }
        let mut colour: BTreeMap<S, Colour> = adjacency.keys().map(|s| (s.clone(), Colour::White)).collect();
        for ((_letter, args), dst) in &self.rules {
            colour.entry(dst.clone()).or_insert(Colour::White);
            for a in args {
                colour.entry(a.clone()).or_insert(Colour::White);
            }
        }
        let nodes: Vec<S> = colour.keys().cloned().collect();

        fn visit<S: StateLabel>(
            node: &S,
            adjacency: &BTreeMap<S, Vec<S>>,
            colour: &mut BTreeMap<S, Colour>,
        ) -> bool {
            match colour.get(node) {
                Some(Colour::Black) => return false,
                Some(Colour::Grey) => return true,
                _ => {}
            }
            colour.insert(node.clone(), Colour::Grey);
            if let Some(children) = adjacency.get(node) {
                for child in children {
                    if visit(child, adjacency, colour) {
                        return true;
                    }
                }
            }
            colour.insert(node.clone(), Colour::Black);
            false
        }

        for n in &nodes {
            if colour.get(n) == Some(&Colour::White) && visit(n, &adjacency, &mut colour) {
                return true;
            }
        }
        false
    }

    /// Bottom-up DP for the largest size/depth any state can produce.
    /// `None` if the grammar is unbounded, matching "meaningful only for
    /// bounded grammars" (§4.D).
    pub fn compute_max_size_and_depth(&self) -> Option<(BTreeMap<S, u64>, BTreeMap<S, u64>)> {
        if self.is_unbounded() {
            return None;
        }
        let mut max_size: BTreeMap<S, u64> = BTreeMap::new();
        let mut max_depth: BTreeMap<S, u64> = BTreeMap::new();
        loop {
            let mut changed = false;
            for ((_letter, args), dst) in &self.rules {
                if args.iter().all(|a| max_size.contains_key(a)) {
                    let size: u64 = 1 + args.iter().map(|a| max_size[a]).sum::<u64>();
                    let depth: u64 = 1 + args.iter().map(|a| max_depth.get(a).copied().unwrap_or(0)).max().unwrap_or(0);
                    if size > *max_size.get(dst).unwrap_or(&0) {
                        max_size.insert(dst.clone(), size);
                        changed = true;
                    }
                    if depth > *max_depth.get(dst).unwrap_or(&0) {
                        max_depth.insert(dst.clone(), depth);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        Some((max_size, max_depth))
    }

    pub fn minimise(&self, can_be_merged: Option<&dyn Fn(&S, &S) -> bool>) -> Result<Dfta<StateClass<S>, L>> {
        if !self.is_reduced() {
            return Err(Error::DomainInvariant(
                "minimise invoked on an unreduced automaton".to_string(),
            ));
        }
        Ok(minimise::minimise(self, can_be_merged))
    }
}

/// Renames states to dense, display-stable `StateIndex`es ordered by the
/// original state's `Display` string, so automaton output is stable
/// across runs with identical inputs (§6).
pub fn classic_state_renaming<S: StateLabel, L: LetterLabel>(
    dfta: &Dfta<S, L>,
) -> (Dfta<StateIndex, L>, BTreeMap<S, StateIndex>) {
    let mut ordered: Vec<S> = dfta.all_states().into_iter().collect();
    ordered.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    let mapping: BTreeMap<S, StateIndex> = ordered
        .into_iter()
        .enumerate()
        .map(|(i, s)| (s, StateIndex(i as u32)))
        .collect();
    let renamed = dfta.map_states(|s| mapping[s]);
    (renamed, mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dfta() -> Dfta<String, String> {
        // int -> int automaton: "0", "1" leaves, "+" combines.
        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "int".to_string());
        rules.insert(("1".to_string(), vec![]), "int".to_string());
        rules.insert(
            ("+".to_string(), vec!["int".to_string(), "int".to_string()]),
            "int".to_string(),
        );
        let finals: BTreeSet<String> = ["int".to_string()].into_iter().collect();
        Dfta::new(rules, finals)
    }

    #[test]
    fn reduce_is_idempotent() {
        let mut d = sample_dfta();
        d.reduce();
        let before = d.rules().len();
        d.reduce();
        assert_eq!(d.rules().len(), before);
    }

    #[test]
    fn reachable_and_productive_cover_all_useful_states() {
        let d = sample_dfta();
        assert!(d.reachable_states().contains("int"));
        assert!(d.productive_states().contains("int"));
    }

    #[test]
    fn unreachable_rule_is_pruned() {
        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "int".to_string());
        rules.insert(
            ("f".to_string(), vec!["missing".to_string()]),
            "int".to_string(),
        );
        let finals: BTreeSet<String> = ["int".to_string()].into_iter().collect();
        let mut d = Dfta::new(rules, finals);
        d.reduce();
        assert_eq!(d.rules().len(), 1);
    }

    #[test]
    fn counting_matches_hand_count() {
        let d = sample_dfta();
        // size 1: "0", "1" => 2 programs.
        assert_eq!(d.trees_at_size(1), 2);
        // size 3: "+" applied to two size-1 leaves => 2*2 = 4 programs.
        assert_eq!(d.trees_at_size(3), 4);
        assert_eq!(d.trees_until_size(3), 2 + 0 + 4);
    }

    #[test]
    fn unboundedness_detects_self_loop() {
        let d = sample_dfta();
        assert!(d.is_unbounded());

        let mut rules = BTreeMap::new();
        rules.insert(("0".to_string(), vec![]), "int".to_string());
        let finals: BTreeSet<String> = ["int".to_string()].into_iter().collect();
        let bounded = Dfta::new(rules, finals);
        assert!(!bounded.is_unbounded());
    }

    #[test]
    fn classic_state_renaming_is_display_sorted() {
        let d = sample_dfta();
        let (renamed, mapping) = classic_state_renaming(&d);
        assert_eq!(renamed.rules().len(), d.rules().len());
        assert_eq!(mapping.len(), 1);
    }
}
