//! DSL registry (component C) and the native DSL builder that replaces
//! the out-of-scope "load an arbitrary user module from disk" step (§6).
//!
//! A [`Dsl`] holds, per primitive name, its declared type string, the
//! monomorphic variants that type expands to, and an opaque semantic
//! callable shared by every variant. When a primitive's type expands to
//! more than one variant, each variant is registered under a synthetic
//! `name@variant` letter and the collapse map back to the base name is
//! retained (§4.C).

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::types::{self, TypeSignature};
use crate::value::Value;

pub type Semantic = Rc<dyn Fn(&[Value]) -> std::result::Result<Value, Error>>;
pub type Sampler = Rc<dyn Fn(u64) -> Value>;

/// The separator between a primitive's base name and its variant suffix,
/// chosen (as in the original) to be a sequence unlikely to appear in a
/// user-supplied primitive name.
pub const VARIANT_SEP: &str = "@";

/// A single registered primitive entry: a concrete, monomorphic type plus
/// the semantic shared with every sibling variant.
#[derive(Clone)]
pub struct PrimitiveEntry {
    pub letter: String,
    pub base_name: String,
    pub signature: TypeSignature,
    pub semantic: Semantic,
}

/// The expanded DSL registry (§4.C).
#[derive(Clone)]
pub struct Dsl {
    entries: HashMap<String, PrimitiveEntry>,
    /// synthetic variant letter -> base primitive name, for the final
    /// collapse back (`merge_type_variants`).
    to_merge: HashMap<String, String>,
    samplers: HashMap<String, Sampler>,
    skip_exceptions: Vec<String>,
    target_type: Option<String>,
}

/// Caps a single primitive's polymorphic expansion so a careless `'a[...]`
/// binding cannot blow up memory at load time (§9 design notes).
const MAX_VARIANTS_PER_PRIMITIVE: usize = 64;

impl Dsl {
    pub fn entries(&self) -> impl Iterator<Item = &PrimitiveEntry> {
        self.entries.values()
    }

    pub fn entry(&self, letter: &str) -> Option<&PrimitiveEntry> {
        self.entries.get(letter)
    }

    pub fn semantic(&self, letter: &str) -> Option<&Semantic> {
        self.entries.get(letter).map(|e| &e.semantic)
    }

    pub fn sampler(&self, type_name: &str) -> Option<&Sampler> {
        self.samplers.get(type_name)
    }

    pub fn skip_exceptions(&self) -> &[String] {
        &self.skip_exceptions
    }

    pub fn target_type(&self) -> Option<&str> {
        self.target_type.as_deref()
    }

    pub fn base_name_of(&self, letter: &str) -> &str {
        self.to_merge.get(letter).map(|s| s.as_str()).unwrap_or(letter)
    }

    pub fn to_merge(&self) -> &HashMap<String, String> {
        &self.to_merge
    }

    /// The largest number of arguments any primitive in this DSL takes.
    pub fn max_arity(&self) -> usize {
        self.entries.values().map(|e| e.signature.arity()).max().unwrap_or(0)
    }

    /// Every distinct sampleable argument type that appears across all
    /// primitives (used by the mega-type-request inference, §4.J).
    pub fn sampleable_arg_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .entries
            .values()
            .flat_map(|e| e.signature.arg_types.iter().cloned())
            .filter(|t| self.samplers.contains_key(t))
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// The maximum arity among primitives whose argument list contains
    /// `type_name`, used by the mega-type-request formula (§4.J step 1).
    pub fn max_arity_for_type(&self, type_name: &str) -> usize {
        self.entries
            .values()
            .filter(|e| e.signature.arg_types.iter().any(|t| t == type_name))
            .map(|e| e.signature.arity())
            .max()
            .unwrap_or(0)
    }

    /// Infers, for every reachable state of `dfta`, the monomorphic type it
    /// produces (§4.C `get_state_types`). A letter of the form `var_TYPE`
    /// is a specialize-time variable placeholder naming its own type
    /// directly; any other letter is looked up in this registry. Because
    /// this registry only ever stores fully-disambiguated (post-variant-
    /// expansion) letters, a state's type is always determined the moment
    /// all its rule's sibling states are resolvable — there is no need to
    /// pick among ambiguous candidates the way the un-specialized "base
    /// name" grammars in the original implementation did. A state that the
    /// fixpoint still cannot resolve (because its rules route through a
    /// letter unknown to this registry) is reported as an
    /// `Error::DomainInvariant` (§7's "DFTA contains an ambiguous state
    /// type").
    pub fn get_state_types<S: crate::automaton::StateLabel>(
        &self,
        dfta: &crate::automaton::Dfta<S, String>,
    ) -> Result<HashMap<S, String>> {
        let mut types: HashMap<S, String> = HashMap::new();
        loop {
            let mut changed = false;
            for ((letter, _args), dst) in dfta.rules() {
                if types.contains_key(dst) {
                    continue;
                }
                if let Some(t) = letter.strip_prefix("var_") {
                    types.insert(dst.clone(), t.to_string());
                    changed = true;
                } else if let Some(entry) = self.entry(letter) {
                    types.insert(dst.clone(), entry.signature.return_type.clone());
                    changed = true;
                }
            }
            // A bare `varN` leaf carries no type-bearing letter of its own;
            // its type is recovered from the position it occupies as an
            // argument of some already-typed primitive rule.
            for ((letter, args), _dst) in dfta.rules() {
                if let Some(entry) = self.entry(letter) {
                    for (pos, arg) in args.iter().enumerate() {
                        if !types.contains_key(arg) {
                            if let Some(t) = entry.signature.arg_types.get(pos) {
                                types.insert(arg.clone(), t.clone());
                                changed = true;
                            }
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        for s in dfta.states() {
            if !types.contains_key(&s) {
                return Err(Error::DomainInvariant(format!(
                    "could not determine the type of state `{}`",
                    s
                )));
            }
        }
        Ok(types)
    }

    /// Rewrites each rule of `dfta` to use the specific synthetic variant
    /// whose argument/return types match `state_types` (§4.C). The
    /// pre-image of [`merge_type_variants`]: where that operation collapses
    /// every `name@i` back to the ambiguous base name `name`, this one
    /// picks the unique `name@i` a given rule's argument/result states
    /// resolve to. A letter that already names a registered entry directly
    /// (a single-variant primitive) or is a variable placeholder (`varN`,
    /// `var_TYPE`) passes through unchanged. Fails with
    /// `Error::DomainInvariant` if a base name has no variant matching the
    /// rule's context, or more than one does.
    pub fn map_to_variants<S: crate::automaton::StateLabel>(
        &self,
        dfta: &crate::automaton::Dfta<S, String>,
        state_types: &HashMap<S, String>,
    ) -> Result<crate::automaton::Dfta<S, String>> {
        let mut rules: BTreeMap<(String, Vec<S>), S> = BTreeMap::new();
        for ((letter, args), dst) in dfta.rules() {
            let variants: Vec<&PrimitiveEntry> = self.entries().filter(|e| e.base_name == *letter).collect();
            // A letter already resolvable directly (a single-variant
            // primitive, keyed by its base name) or not naming any
            // registered primitive at all (a variable placeholder or other
            // opaque leaf letter) needs no rewrite.
            let resolved = if self.entry(letter).is_some() || variants.is_empty() {
                letter.clone()
            } else {
                let arg_types: Option<Vec<&str>> = args.iter().map(|a| state_types.get(a).map(|t| t.as_str())).collect();
                let arg_types = arg_types.ok_or_else(|| {
                    Error::DomainInvariant(format!(
                        "cannot resolve variant of `{}`: an argument state's type is unknown",
                        letter
                    ))
                })?;
                let dst_type = state_types.get(dst).map(|t| t.as_str());
                let matches: Vec<&str> = variants
                    .iter()
                    .filter(|e| e.signature.arg_types.len() == arg_types.len())
                    .filter(|e| e.signature.arg_types.iter().zip(&arg_types).all(|(t, a)| t == a))
                    .filter(|e| dst_type.map_or(true, |t| e.signature.return_type == t))
                    .map(|e| e.letter.as_str())
                    .collect();
                match matches.as_slice() {
                    [one] => one.to_string(),
                    [] => {
                        return Err(Error::DomainInvariant(format!(
                            "no variant of `{}` matches its rule's argument/return types",
                            letter
                        )))
                    }
                    _ => {
                        return Err(Error::DomainInvariant(format!(
                            "ambiguous variant of `{}`: more than one candidate matches its rule's argument/return types",
                            letter
                        )))
                    }
                }
            };
            rules.insert((resolved, args.clone()), dst.clone());
        }
        Ok(crate::automaton::Dfta::new(rules, dfta.finals().clone()))
    }

    /// The inverse of variant expansion (§4.C `merge_type_variants`):
    /// rewrites every synthetic `name@i` letter back to its base name.
    pub fn merge_type_variants<S: crate::automaton::StateLabel>(
        &self,
        dfta: &crate::automaton::Dfta<S, String>,
    ) -> crate::automaton::Dfta<S, String> {
        dfta.map_alphabet(|letter| self.base_name_of(letter).to_string())
    }
}

/// Builds a [`Dsl`] from native Rust closures. This is the library's
/// replacement for the out-of-scope "load an arbitrary user DSL file"
/// step: callers link against this crate and populate a `DslBuilder`
/// directly (see [`crate::demo`] for two worked examples used by the CLI
/// and integration tests).
pub struct DslBuilder {
    raw: HashMap<String, (String, Semantic)>,
    samplers: HashMap<String, Sampler>,
    skip_exceptions: Vec<String>,
    target_type: Option<String>,
}

impl Default for DslBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DslBuilder {
    pub fn new() -> Self {
        DslBuilder {
            raw: HashMap::new(),
            samplers: HashMap::new(),
            skip_exceptions: Vec::new(),
            target_type: None,
        }
    }

    pub fn primitive(mut self, name: impl Into<String>, type_str: impl Into<String>, semantic: Semantic) -> Self {
        self.raw.insert(name.into(), (type_str.into(), semantic));
        self
    }

    pub fn sampler(mut self, type_name: impl Into<String>, sampler: Sampler) -> Self {
        self.samplers.insert(type_name.into(), sampler);
        self
    }

    pub fn skip_exception(mut self, kind: impl Into<String>) -> Self {
        self.skip_exceptions.push(kind.into());
        self
    }

    pub fn target_type(mut self, type_str: impl Into<String>) -> Self {
        self.target_type = Some(type_str.into());
        self
    }

    pub fn build(self) -> Result<Dsl> {
        let mut entries = HashMap::new();
        let mut to_merge = HashMap::new();
        for (name, (type_str, semantic)) in &self.raw {
            let variants = types::all_variants(type_str)?;
            if variants.len() > MAX_VARIANTS_PER_PRIMITIVE {
                return Err(Error::UserInput(format!(
                    "primitive `{}` expands to {} variants, exceeding the cap of {}",
                    name,
                    variants.len(),
                    MAX_VARIANTS_PER_PRIMITIVE
                )));
            }
            if variants.len() == 1 {
                entries.insert(
                    name.clone(),
                    PrimitiveEntry {
                        letter: name.clone(),
                        base_name: name.clone(),
                        signature: variants.into_iter().next().unwrap(),
                        semantic: semantic.clone(),
                    },
                );
            } else {
                for (i, signature) in variants.into_iter().enumerate() {
                    let letter = format!("{}{}{}", name, VARIANT_SEP, i);
                    to_merge.insert(letter.clone(), name.clone());
                    entries.insert(
                        letter.clone(),
                        PrimitiveEntry {
                            letter,
                            base_name: name.clone(),
                            signature,
                            semantic: semantic.clone(),
                        },
                    );
                }
            }
        }
        Ok(Dsl {
            entries,
            to_merge,
            samplers: self.samplers,
            skip_exceptions: self.skip_exceptions,
            target_type: self.target_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_add() -> Semantic {
        Rc::new(|args: &[Value]| {
            let a = args[0].as_int().unwrap();
            let b = args[1].as_int().unwrap();
            Ok(Value::Int(a + b))
        })
    }

    #[test]
    fn single_variant_primitive_keeps_its_own_name() {
        let dsl = DslBuilder::new()
            .primitive("+", "int -> int -> int", int_add())
            .build()
            .unwrap();
        assert!(dsl.entry("+").is_some());
        assert_eq!(dsl.max_arity(), 2);
    }

    #[test]
    fn polymorphic_primitive_expands_into_variants() {
        let dsl = DslBuilder::new()
            .primitive(
                "ite",
                "bool -> 'a[bool|int] -> 'a -> 'a",
                Rc::new(|args: &[Value]| Ok(args[1].clone())),
            )
            .build()
            .unwrap();
        let variant_letters: Vec<&String> = dsl.to_merge().keys().collect();
        assert_eq!(variant_letters.len(), 2);
        for letter in variant_letters {
            assert_eq!(dsl.base_name_of(letter), "ite");
        }
    }

    #[test]
    fn map_to_variants_picks_the_variant_matching_known_state_types() {
        let dsl = DslBuilder::new()
            .primitive(
                "ite",
                "bool -> 'a[bool|int] -> 'a -> 'a",
                Rc::new(|args: &[Value]| Ok(args[1].clone())),
            )
            .build()
            .unwrap();

        let mut rules = std::collections::BTreeMap::new();
        rules.insert(("c".to_string(), vec![]), "c".to_string());
        rules.insert(("t".to_string(), vec![]), "t".to_string());
        rules.insert(("e".to_string(), vec![]), "e".to_string());
        rules.insert(
            ("ite".to_string(), vec!["c".to_string(), "t".to_string(), "e".to_string()]),
            "r".to_string(),
        );
        let finals: std::collections::BTreeSet<String> = ["r".to_string()].into_iter().collect();
        let dfta = crate::automaton::Dfta::new(rules, finals);

        let mut state_types = HashMap::new();
        state_types.insert("c".to_string(), "bool".to_string());
        state_types.insert("t".to_string(), "int".to_string());
        state_types.insert("e".to_string(), "int".to_string());
        state_types.insert("r".to_string(), "int".to_string());

        let resolved = dsl.map_to_variants(&dfta, &state_types).unwrap();
        let int_variant_letter = dsl
            .entries()
            .find(|e| e.base_name == "ite" && e.signature.return_type == "int")
            .unwrap()
            .letter
            .clone();
        assert!(resolved.rules().keys().any(|(l, _)| l == &int_variant_letter));
    }

    #[test]
    fn map_to_variants_rejects_a_state_with_no_matching_variant() {
        let dsl = DslBuilder::new()
            .primitive(
                "ite",
                "bool -> 'a[bool|int] -> 'a -> 'a",
                Rc::new(|args: &[Value]| Ok(args[1].clone())),
            )
            .build()
            .unwrap();

        let mut rules = std::collections::BTreeMap::new();
        rules.insert(("c".to_string(), vec![]), "c".to_string());
        rules.insert(("t".to_string(), vec![]), "t".to_string());
        rules.insert(("e".to_string(), vec![]), "e".to_string());
        rules.insert(
            ("ite".to_string(), vec!["c".to_string(), "t".to_string(), "e".to_string()]),
            "r".to_string(),
        );
        let finals: std::collections::BTreeSet<String> = ["r".to_string()].into_iter().collect();
        let dfta = crate::automaton::Dfta::new(rules, finals);

        let mut state_types = HashMap::new();
        state_types.insert("c".to_string(), "bool".to_string());
        state_types.insert("t".to_string(), "string".to_string());
        state_types.insert("e".to_string(), "string".to_string());
        state_types.insert("r".to_string(), "string".to_string());

        assert!(matches!(dsl.map_to_variants(&dfta, &state_types), Err(Error::DomainInvariant(_))));
    }
}
