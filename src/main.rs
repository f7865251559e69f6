use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_python_iqtree::io::{read_fasta, read_trees, to_fasta, write_matrix_tsv};
use rust_python_iqtree::model::available_models;
use rust_python_iqtree::options::{
    BuildTreeOptions, FitTreeOptions, IndelDistribution, ModelFinderOptions, RandomTreeOptions,
    SimulationOptions, TreeGenMode,
};
use rust_python_iqtree::report::ModelFinderResult;
use rust_python_iqtree::{IqTree, IqTreeError, Model, NativeEngine, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run IQ-TREE 2 operations from the command line.
#[derive(Parser, Debug)]
#[command(name = "rust-python-iqtree", version, about = "IQ-TREE 2 tree building, comparison and simulation")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Quiet mode: only warnings and errors on stderr
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    /// Let IQ-TREE write its report files into the current directory
    #[arg(long = "keep-files", global = true, default_value_t = false)]
    keep_files: bool,

    /// Let IQ-TREE print its own progress output
    #[arg(long = "engine-output", global = true, default_value_t = false)]
    engine_output: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pairwise Robinson-Foulds distances between the trees of a file
    Rf {
        /// Newick (one per line) or NEXUS tree file
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        /// Output path for TSV distance matrix (.gz to compress)
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Generate random trees
    RandomTree {
        #[arg(short = 'n', long = "num-taxa")]
        num_taxa: i32,
        #[arg(long = "mode", value_enum, default_value_t = ModeArg::YuleHarding)]
        mode: ModeArg,
        #[arg(long = "num-trees", default_value_t = 1)]
        num_trees: i32,
        #[arg(long = "seed", default_value_t = 0)]
        seed: i32,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Maximum-likelihood tree search
    BuildTree {
        #[command(flatten)]
        aln: AlignmentArgs,
        #[arg(short = 'm', long = "model", default_value = "HKY")]
        model: Model,
        /// Ultrafast bootstrap replicates, 0 disables
        #[arg(long = "bootstrap", default_value_t = 0)]
        bootstrap: i32,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Fit a model on a fixed topology and print the report
    FitTree {
        #[command(flatten)]
        aln: AlignmentArgs,
        /// Tree file; the first tree is used
        #[arg(short = 't', long = "tree")]
        tree: PathBuf,
        #[arg(short = 'm', long = "model")]
        model: Model,
        /// Keep the branch lengths of the input tree
        #[arg(long = "fix-branch-lengths", default_value_t = false)]
        fix_branch_lengths: bool,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// List the substitution models the model parser accepts
    Models,
    /// Select a substitution model with ModelFinder
    ModelFinder {
        #[command(flatten)]
        aln: AlignmentArgs,
        #[arg(long = "models", value_delimiter = ',')]
        models: Vec<String>,
        #[arg(long = "freqs", value_delimiter = ',')]
        freqs: Vec<String>,
        #[arg(long = "rates", value_delimiter = ',')]
        rates: Vec<String>,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Jukes-Cantor distance matrix of an alignment
    JcDistances {
        #[command(flatten)]
        aln: AlignmentArgs,
        /// Output path for TSV distance matrix (.gz to compress)
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Neighbour-joining tree from the alignment's Jukes-Cantor distances
    NjTree {
        #[command(flatten)]
        aln: AlignmentArgs,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Consensus of the trees in a file
    Consensus {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long = "min-support", default_value_t = 0.5)]
        min_support: f64,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Simulate an alignment along a tree with AliSim
    Simulate {
        /// Tree file; the first tree is used
        #[arg(short = 't', long = "tree")]
        tree: PathBuf,
        #[arg(short = 'm', long = "model")]
        model: Model,
        #[arg(short = 'l', long = "length", default_value_t = 1000)]
        length: i32,
        #[arg(long = "seed", default_value_t = 0)]
        seed: i32,
        #[arg(long = "insertion-rate", default_value_t = 0.0)]
        insertion_rate: f64,
        #[arg(long = "deletion-rate", default_value_t = 0.0)]
        deletion_rate: f64,
        /// e.g. POW{1.7/100}, GEO{2}, NB{3/1.5}, LAV{1.5/50}
        #[arg(long = "insertion-size")]
        insertion_size: Option<IndelDistribution>,
        #[arg(long = "deletion-size")]
        deletion_size: Option<IndelDistribution>,
        #[arg(long = "root-seq")]
        root_seq: Option<String>,
        #[arg(long = "threads", default_value_t = 1)]
        threads: i32,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print the linked IQ-TREE version
    Version,
}

#[derive(Args, Debug)]
struct AlignmentArgs {
    /// FASTA alignment
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    #[arg(long = "seed", default_value_t = 0)]
    seed: i32,
    /// Threads, 0 lets IQ-TREE decide
    #[arg(long = "threads", default_value_t = 1)]
    threads: i32,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg { YuleHarding, Uniform, Caterpillar, Balanced, BirthDeath, StarTree }

impl From<ModeArg> for TreeGenMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::YuleHarding => TreeGenMode::YuleHarding,
            ModeArg::Uniform => TreeGenMode::Uniform,
            ModeArg::Caterpillar => TreeGenMode::Caterpillar,
            ModeArg::Balanced => TreeGenMode::Balanced,
            ModeArg::BirthDeath => TreeGenMode::BirthDeath,
            ModeArg::StarTree => TreeGenMode::StarTree,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let iq = IqTree::native()
        .with_file_isolation(!cli.keep_files)
        .with_output_suppressed(!cli.engine_output);
    if let Err(e) = run(&iq, cli.command) {
        eprintln!("{e}");
        let code = match e {
            IqTreeError::Conversion { .. } | IqTreeError::InvalidArgument { .. } | IqTreeError::Parse { .. } => 2,
            IqTreeError::Engine(_) => 3,
            IqTreeError::Io(_) => 4,
        };
        std::process::exit(code);
    }
}

fn run(iq: &IqTree<NativeEngine>, command: Command) -> Result<()> {
    let t0 = Instant::now();
    match command {
        Command::Rf { input, output } => {
            let trees = read_trees(&input)?;
            info!("Read {} trees from {:?}", trees.len(), input);
            let mat = iq.pairwise_robinson_foulds(&trees)?;
            let names: Vec<String> = (0..trees.len()).map(|i| format!("tree_{i}")).collect();
            write_matrix_tsv(&output, &names, &mat)?;
            info!("Wrote RF matrix to {:?}", output);
        }
        Command::RandomTree { num_taxa, mode, num_trees, seed, output } => {
            let opts = RandomTreeOptions { num_trees, rand_seed: seed };
            emit(output.as_deref(), &iq.random_tree(num_taxa, mode.into(), &opts)?)?;
        }
        Command::BuildTree { aln, model, bootstrap, output } => {
            let alignment = read_fasta(&aln.input)?;
            info!("Building tree for {} sequences with {model}", alignment.len());
            let opts = BuildTreeOptions { rand_seed: aln.seed, bootstrap_replicates: bootstrap, num_threads: aln.threads };
            emit(output.as_deref(), &iq.build_tree(&alignment, &model, &opts)?)?;
        }
        Command::FitTree { aln, tree, model, fix_branch_lengths, output } => {
            let alignment = read_fasta(&aln.input)?;
            let tree = first_tree(&tree)?;
            let opts = FitTreeOptions {
                branch_lengths_fixed: fix_branch_lengths,
                rand_seed: aln.seed,
                num_threads: aln.threads,
            };
            emit(output.as_deref(), &iq.fit_tree(&alignment, &tree, &model, &opts)?)?;
        }
        Command::ModelFinder { aln, models, freqs, rates, output } => {
            let alignment = read_fasta(&aln.input)?;
            let opts = ModelFinderOptions {
                model_set: models,
                freq_set: freqs,
                rate_set: rates,
                rand_seed: aln.seed,
                num_threads: aln.threads,
            };
            emit(output.as_deref(), &model_finder_table(&iq.model_finder(&alignment, &opts)?))?;
        }
        Command::JcDistances { aln, output } => {
            let alignment = read_fasta(&aln.input)?;
            let matrix = iq.distance_matrix(&alignment, aln.threads)?;
            matrix.write_tsv(&output)?;
            info!("Wrote {}x{} distance matrix to {:?}", matrix.len(), matrix.len(), output);
        }
        Command::NjTree { aln, output } => {
            let alignment = read_fasta(&aln.input)?;
            let matrix = iq.distance_matrix(&alignment, aln.threads)?;
            emit(output.as_deref(), &iq.nj_tree(&matrix.names, &matrix.values)?)?;
        }
        Command::Consensus { input, min_support, output } => {
            let trees = read_trees(&input)?;
            info!("Read {} trees from {:?}", trees.len(), input);
            emit(output.as_deref(), &iq.consensus_tree(&trees, min_support)?)?;
        }
        Command::Simulate {
            tree,
            model,
            length,
            seed,
            insertion_rate,
            deletion_rate,
            insertion_size,
            deletion_size,
            root_seq,
            threads,
            output,
        } => {
            let tree = first_tree(&tree)?;
            let opts = SimulationOptions {
                length,
                rand_seed: seed,
                insertion_rate,
                deletion_rate,
                insertion_size_distribution: insertion_size.unwrap_or_default(),
                deletion_size_distribution: deletion_size.unwrap_or_default(),
                root_seq,
                num_threads: threads,
                ..Default::default()
            };
            let simulated = iq.simulate_alignment(&tree, &model, &opts)?;
            info!("Simulated {} sequences", simulated.len());
            emit(output.as_deref(), &to_fasta(&simulated))?;
        }
        Command::Models => {
            for (kind, name) in available_models() {
                println!("{kind}\t{name}");
            }
        }
        Command::Version => println!("{}", iq.version()?),
    }
    info!("Done in {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn first_tree(path: &Path) -> Result<String> {
    read_trees(path)?
        .into_iter()
        .next()
        .ok_or_else(|| IqTreeError::Parse { what: "tree file", reason: format!("no trees in {path:?}") })
}

/// Selected models first, then one row per model tried.
fn model_finder_table(result: &ModelFinderResult) -> String {
    let mut text = format!(
        "best_model_AIC\t{}\nbest_model_AICc\t{}\nbest_model_BIC\t{}\n\nmodel\tlnL\tnfp\ttree_length\n",
        result.best_aic, result.best_aicc, result.best_bic
    );
    for (model, stats) in &result.model_stats {
        let _ = writeln!(text, "{model}\t{}\t{}\t{}", stats.lnl, stats.nfp, stats.tree_length);
    }
    text
}

fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::write(path, text)?;
            info!("Wrote {:?}", path);
        }
        _ => print!("{text}"),
    }
    Ok(())
}
