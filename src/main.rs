//! CLI binary crate.

use std::io::{self, Write};

use clap::Parser;
use fs_err as fs;

use oequiv::automaton::classic_state_renaming;
use oequiv::error::{exit_code, Error, Result};
use oequiv::loop_closure::LoopClosureOptions;
use oequiv::options::{
    Cli, Command, CompileArgs, CountArgs, ConvertArgs, DespecializeArgs, EnumArgs, InfoArgs, OutputArgs, PruneArgs,
    SpecializeArgs, TraceLevel, UnionArgs,
};
use oequiv::pruning::PruneOptions;
use oequiv::saturation::{grammar_by_saturation, Request, SaturationConfig};
use oequiv::types::{self, TypeSignature};
use oequiv::{demo, format, specialize, synthesize_with};

fn main() {
    if let Err(error) = run() {
        let _ = write!(io::stderr(), "Error: {}", error);
        std::process::exit(exit_code(&error));
    }
}

/// Initializes the logging framework at the given trace level.
///
/// # Errors
///
/// Returns an error if the logging framework has already been initialized.
fn initialize_logging(level: TraceLevel) -> io::Result<()> {
    env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Parses an arrow-typed request string into a concrete `TypeSignature`,
/// rejecting sum/polymorphic slots (only `saturation`'s own internal mega
/// type requests use those; a CLI-supplied request is always monomorphic).
fn parse_request(raw: &str) -> Result<TypeSignature> {
    let slots = types::parse_slots(raw)?;
    let (arg_types, return_type) = slots.split_at(slots.len() - 1);
    for slot in arg_types.iter().chain(return_type.iter()) {
        if slot.contains('|') || slot.starts_with('\'') {
            return Err(Error::UserInput(format!(
                "request slot `{}` must be a single concrete type",
                slot
            )));
        }
    }
    Ok(TypeSignature {
        arg_types: arg_types.to_vec(),
        return_type: return_type[0].clone(),
    })
}

fn write_output(output: &OutputArgs, text: &str) -> Result<()> {
    match &output.output {
        Some(path) => fs::write(path, text).map_err(|e| Error::UserInput(e.to_string())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn read_input(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::UserInput(e.to_string()))
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(cli.trace_level).map_err(|e| Error::UserInput(e.to_string()))?;

    match &cli.command {
        Command::Compile(args) => run_compile(args),
        Command::Prune(args) => run_prune(args),
        Command::Specialize(args) => run_specialize(args),
        Command::Despecialize(args) => run_despecialize(args),
        Command::Count(args) => run_count(args),
        Command::Convert(args) => run_convert(args),
        Command::Union(args) => run_union(args),
        Command::Enum(args) => run_enum(args),
        Command::Info(args) => run_info(args),
    }
}

fn run_compile(args: &CompileArgs) -> Result<()> {
    let dsl = demo::by_name(&args.dsl)?;
    let request = parse_request(&args.request)?;
    let config = SaturationConfig {
        size: Some((1, args.size)),
        depth: None,
        commutative: std::collections::HashMap::new(),
    };
    let dfta = grammar_by_saturation(&dsl, &Request::Typed(request), &config);
    let (renamed, _) = classic_state_renaming(&dfta);
    write_output(&args.output, &format::write_native(&renamed))
}

fn run_prune(args: &PruneArgs) -> Result<()> {
    let dsl = demo::by_name(&args.dsl)?;
    let options = PruneOptions {
        size: args.size,
        sample_count: args.samples,
        seed: args.seed,
    };
    let result = synthesize_with(&dsl, &args.target, &options, !args.no_loop, &LoopClosureOptions::default())?;
    log::info!(
        "saturated {} rules, {} after commutativity pruning, {} programs retained, loop closed: {}",
        result.pruned().saturated_rules,
        result.pruned().commutativity_pruned_rules,
        result.pruned().retained_programs,
        result.is_loop_closed()
    );
    if let Some(path) = &args.classes_json {
        let json = format::equivalence_classes_json(&result.pruned().equivalence_classes)?;
        fs::write(path, json).map_err(|e| Error::UserInput(e.to_string()))?;
    }
    write_output(&args.output, &format::write_native(&result.automaton()))
}

fn run_specialize(args: &SpecializeArgs) -> Result<()> {
    let dsl = demo::by_name(&args.dsl)?;
    let request = parse_request(&args.request)?;
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    let state_types = dsl.get_state_types(&dfta)?;
    let specialized = specialize::specialize(&dfta, &state_types, &request);
    write_output(&args.output, &format::write_native(&specialized))
}

fn run_despecialize(args: &DespecializeArgs) -> Result<()> {
    let dsl = demo::by_name(&args.dsl)?;
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    let state_types = dsl.get_state_types(&dfta)?;
    let despecialized = specialize::despecialize(&dfta, &state_types);
    write_output(&args.output, &format::write_native(&despecialized))
}

fn run_count(args: &CountArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    for size in 1..=args.size as usize {
        println!("{}\t{}", size, dfta.trees_at_size(size));
    }
    Ok(())
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    let (renamed, _) = classic_state_renaming(&dfta);
    write_output(&args.output, &format::write_native(&renamed))
}

fn run_union(args: &UnionArgs) -> Result<()> {
    let first = format::read_native(&read_input(&args.first)?)?;
    let second = format::read_native(&read_input(&args.second)?)?;
    let joined = first.union(&second).map_states(|(a, b)| format!("{}_{}", a, b));
    let (renamed, _) = classic_state_renaming(&joined);
    write_output(&args.output, &format::write_native(&renamed))
}

fn run_enum(args: &EnumArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    let mut enumerator = oequiv::enumerator::Enumerator::new(&dfta, args.size as usize);
    let mut keep = true;
    while let Some(program) = enumerator.next(keep) {
        println!("{}", program);
        keep = true;
    }
    Ok(())
}

fn run_info(args: &InfoArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let dfta = format::read_native(&text)?;
    println!("states: {}", dfta.all_states().len());
    println!("rules: {}", dfta.size());
    println!("finals: {}", dfta.finals().len());
    println!("unbounded: {}", dfta.is_unbounded());
    Ok(())
}
