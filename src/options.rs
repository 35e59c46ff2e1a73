//! Command-line surface (component P): subcommands and flags for the
//! `compile`/`prune`/`specialize`/`despecialize`/`count`/`convert`/`union`/
//! `enum`/`info` operations over DSLs and automaton files (§6 EXTERNAL
//! INTERFACES).

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Verbosity passed to the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for TraceLevel {
    fn default() -> Self {
        TraceLevel::Error
    }
}

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => log::LevelFilter::Off,
            TraceLevel::Error => log::LevelFilter::Error,
            TraceLevel::Warn => log::LevelFilter::Warn,
            TraceLevel::Info => log::LevelFilter::Info,
            TraceLevel::Debug => log::LevelFilter::Debug,
            TraceLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "oequiv",
    version,
    about = "Prune program-synthesis grammars by observational equivalence"
)]
pub struct Cli {
    /// Trace level for the logging framework.
    #[arg(short = 't', long = "trace", value_enum, default_value_t = TraceLevel::Error)]
    pub trace_level: TraceLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Saturate a DSL and a type request into a base grammar.
    Compile(CompileArgs),
    /// Run the full pruning driver (and, unless disabled, loop closure)
    /// against a built-in demo DSL.
    Prune(PruneArgs),
    /// Bind a mega-type-request automaton down to one concrete request.
    Specialize(SpecializeArgs),
    /// Rewrite an automaton's concrete variable leaves back into typed
    /// placeholders.
    Despecialize(DespecializeArgs),
    /// Print tree counts by size for an automaton file.
    Count(CountArgs),
    /// Re-emit an automaton file, normalising its state numbering.
    Convert(ConvertArgs),
    /// Product-intersect two automaton files' languages.
    Union(UnionArgs),
    /// Drive the enumerator directly over an automaton file, printing every
    /// final-state program it yields.
    Enum(EnumArgs),
    /// Print state/rule/final counts and boundedness for an automaton file.
    Info(InfoArgs),
}

/// Flags shared by subcommands that read or write an automaton file.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Where to write the result (native format). Printed to stdout if
    /// omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    /// Name of a built-in demo DSL.
    #[arg(long)]
    pub dsl: String,
    /// Arrow-typed request to saturate against, e.g. `int -> int -> int`.
    #[arg(long)]
    pub request: String,
    /// Maximum program size to saturate up to.
    #[arg(long, default_value_t = 8)]
    pub size: u32,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Name of a built-in demo DSL.
    #[arg(long)]
    pub dsl: String,
    /// The target return type to prune for.
    #[arg(long)]
    pub target: String,
    /// Maximum program size to prune up to.
    #[arg(long, default_value_t = 8)]
    pub size: u32,
    /// Number of sampled inputs the evaluator draws per type.
    #[arg(long, default_value_t = 32)]
    pub samples: usize,
    /// Seed for every deterministic PRNG used by sampling and evaluation.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Skip loop closure; emit only the size-bounded pruned automaton.
    #[arg(long)]
    pub no_loop: bool,
    /// Also write the observational-equivalence classes (representative ->
    /// every collapsed program) as JSON to this path.
    #[arg(long)]
    pub classes_json: Option<String>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct SpecializeArgs {
    /// Automaton file to specialize (native format).
    pub input: String,
    /// Name of the DSL that produced the automaton.
    #[arg(long)]
    pub dsl: String,
    /// Concrete request to bind down to, e.g. `int -> int -> int`.
    #[arg(long)]
    pub request: String,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct DespecializeArgs {
    pub input: String,
    #[arg(long)]
    pub dsl: String,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct CountArgs {
    pub input: String,
    /// Largest size to print the count for.
    #[arg(long, default_value_t = 10)]
    pub size: u32,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    pub input: String,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct UnionArgs {
    pub first: String,
    pub second: String,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct EnumArgs {
    pub input: String,
    /// Largest program size to enumerate up to.
    #[arg(long, default_value_t = 10)]
    pub size: u32,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    pub input: String,
}
