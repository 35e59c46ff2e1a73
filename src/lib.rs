//! Library crate for pruning program-synthesis grammars by observational
//! equivalence down to a compact deterministic finite tree automaton, with
//! an optional loop-closure pass for unbounded-size coverage.

pub mod automaton;
pub mod commutativity;
pub mod demo;
pub mod dsl;
pub mod enumerator;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod loop_closure;
pub mod options;
pub mod partitions;
pub mod program;
pub mod pruning;
pub mod saturation;
pub mod specialize;
pub mod types;
pub mod value;

use log::info;

use automaton::{classic_state_renaming, Dfta, StateIndex};
use dsl::Dsl;
use error::Result;
use loop_closure::LoopClosureOptions;
use pruning::{PruneOptions, PruneResult};

/// The end-to-end result of [`synthesize`]/[`synthesize_with`]: the pruned
/// (and, unless disabled, loop-closed) automaton together with the pruning
/// driver's bookkeeping.
pub struct SynthesisResult {
    pruned: PruneResult,
    closed: Option<Dfta<StateIndex, String>>,
}

impl SynthesisResult {
    /// The automaton to emit: the loop-closed one if closure ran and
    /// succeeded, otherwise the size-bounded pruned automaton renamed to
    /// dense, display-stable state indices.
    pub fn automaton(&self) -> Dfta<StateIndex, String> {
        match &self.closed {
            Some(closed) => closed.clone(),
            None => classic_state_renaming(&self.pruned.dfta).0,
        }
    }

    pub fn pruned(&self) -> &PruneResult {
        &self.pruned
    }

    pub fn is_loop_closed(&self) -> bool {
        self.closed.is_some()
    }
}

/// Prunes `dsl` down to one representative program per observational-
/// equivalence class of `target_type`, up to `size`, followed by loop
/// closure. Uses the default sample count and seed; see
/// [`synthesize_with`] to control those and to skip loop closure.
pub fn synthesize(dsl: &Dsl, target_type: &str, size: u32) -> Result<SynthesisResult> {
    synthesize_with(
        dsl,
        target_type,
        &PruneOptions {
            size,
            sample_count: 32,
            seed: 1,
        },
        true,
        &LoopClosureOptions::default(),
    )
}

/// Runs the full pipeline: grammar-by-saturation, commutativity pruning,
/// observational-equivalence pruning (component J), then loop closure
/// (component K) unless `run_loop_closure` is `false`.
pub fn synthesize_with(
    dsl: &Dsl,
    target_type: &str,
    options: &PruneOptions,
    run_loop_closure: bool,
    loop_closure_options: &LoopClosureOptions,
) -> Result<SynthesisResult> {
    info!("pruning grammar for target type `{}` up to size {}", target_type, options.size);
    let pruned = pruning::prune(dsl, target_type, options)?;

    let closed = if run_loop_closure {
        info!("running loop closure");
        match loop_closure::close_loops(&pruned.dfta, &pruned.state_types, loop_closure_options) {
            Ok(closed) => Some(closed),
            Err(err) => {
                log::warn!("loop closure did not run: {}", err);
                None
            }
        }
    } else {
        None
    };

    Ok(SynthesisResult { pruned, closed })
}
