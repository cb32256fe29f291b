mod cli;

use anyhow::{anyhow, Result};
use clap::Parser;
use cli::{Cli, Commands, GenerateCommand, Side, TreeCommand};
use common::{ConfigLoader, FsExt};
use dotenv::dotenv;
use engine::{EvaluatorOptions, MemoEvaluator, PositionKey, UciEngine};
use env_logger::Env;
use log::{info, warn};
use repertoire::{
    cache_fingerprint, BookReport, Optimizer, RepertoireOptions, RepertoireSeries, Role,
    SuperBook, SuperBookCache,
};
use tree::{load_stats, PositionTree, TreeBuilder, TreeOptions};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Tree(args) => summarize_tree(args),
    }
}

fn generate(args: &GenerateCommand) -> Result<()> {
    let config = ConfigLoader::new(args.config.relative_to_cwd()?, "repertoire".to_string())?;

    let mut options: RepertoireOptions = config.load()?;
    if let Some(budget) = args.budget {
        options.budget = budget;
    }
    let evaluator_options: EvaluatorOptions = config.load()?;

    let tree = load_tree(&config)?;

    let root_fen = args
        .root
        .clone()
        .or_else(|| config.get("root").and_then(|v| v.as_string()))
        .unwrap_or_else(|| START_FEN.to_string());
    let root_key = PositionKey::normalize(&root_fen);
    let root = tree
        .find(&root_key)
        .ok_or_else(|| anyhow!("Root position {} is not in the tree", root_key))?;
    let role = role_for(args.side, &root_key)?;

    info!(
        "Building a {} move repertoire for {:?} from {} as the {}",
        options.budget, args.side, root_key, role
    );

    let engine = evaluator_options
        .engine_path
        .as_ref()
        .map(UciEngine::spawn)
        .transpose()?;
    let mut evaluator = match &evaluator_options.evaluations_path {
        Some(path) => MemoEvaluator::open(
            path,
            engine,
            evaluator_options.eval_time,
            evaluator_options.optimism.clone(),
        ),
        None => MemoEvaluator::new(
            engine,
            evaluator_options.eval_time,
            evaluator_options.optimism.clone(),
        ),
    };

    let mut cache = match config.get_optional_path("cache_path")? {
        Some(path) => {
            let fingerprint = cache_fingerprint(&options, &tree, &evaluator)?;
            SuperBookCache::open(&path, options.cache.clone(), fingerprint)
        }
        None => SuperBookCache::new(options.cache.clone()),
    };

    let result = Optimizer::new(&tree, &mut evaluator, &options, &mut cache).build(root, role);

    // Whatever was computed stays useful for the next run, even after a failure. The run
    // only added evaluations for positions that had none, so every stored book still
    // holds for the grown table.
    cache.set_fingerprint(cache_fingerprint(&options, &tree, &evaluator)?);
    cache.save()?;
    if evaluator_options.evaluations_path.is_some() {
        evaluator.save()?;
    }

    let book = result?;
    print_book(&book);

    let output = match &args.output {
        Some(output) => Some(output.relative_to_cwd()?),
        None => config.get_optional_path("output_path")?,
    };
    if let Some(output) = output {
        RepertoireSeries::new(&book, role).write_json(&output)?;
        info!("Wrote {} repertoires to {:?}", book.size(), output);
    }

    let report = BookReport::new(&tree, root, &book.book(book.size()), options.report_limit);
    for leaf in report.leaves.iter().take(10) {
        info!("Likely leaf {:.4}: {}", leaf.probability, leaf.position);
    }
    for error in report.errors.iter().take(10) {
        info!(
            "Opponent error {:.6}: {} in {}",
            error.weighted_loss, error.action, error.position
        );
    }

    if args.refine {
        let factor = config
            .get("refine_factor")
            .and_then(|v| v.as_f64())
            .unwrap_or(8000.0);

        info!("Refining {} leaf evaluations", report.leaves.len());
        for leaf in &report.leaves {
            let eval_time = (factor * evaluator_options.eval_time as f64 * leaf.probability) as u64;
            if let Err(err) = evaluator.refine(&leaf.position, eval_time) {
                warn!("Failed to refine {}: {:#}", leaf.position, err);
            }
        }

        if evaluator_options.evaluations_path.is_some() {
            evaluator.save()?;
        }
    }

    Ok(())
}

fn summarize_tree(args: &TreeCommand) -> Result<()> {
    let config = ConfigLoader::new(args.config.relative_to_cwd()?, "repertoire".to_string())?;
    let tree_options: TreeOptions = config.load()?;
    let stats = load_stats(&config.get_relative_path("stats_path")?)?;

    let (tree, summary) = TreeBuilder::new(tree_options).build_with_summary(stats)?;

    info!(
        "Positions: {}, leaves: {}, unreliable: {}, engine suggestions: {}",
        summary.positions, summary.leaves, summary.unreliable, summary.best_move_edges
    );
    let most_played = tree.iter().max_by_key(|(_, node)| node.total_count());
    if let Some((_, node)) = most_played {
        info!("Most played position ({} games): {}", node.total_count(), node.key());
    }

    Ok(())
}

fn load_tree(config: &ConfigLoader) -> Result<PositionTree> {
    let tree_options: TreeOptions = config.load()?;
    let stats_path = config.get_relative_path("stats_path")?;
    let stats = load_stats(&stats_path)?;

    let tree = TreeBuilder::new(tree_options).build(stats)?;
    info!("Built a tree of {} positions from {:?}", tree.len(), stats_path);

    Ok(tree)
}

/// The owner moves at the root when it is their side to move there.
fn role_for(side: Side, root: &PositionKey) -> Result<Role> {
    let to_move = root
        .as_str()
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("Root position {} has no side to move", root))?;

    Ok(if to_move == side.symbol() {
        Role::Mover
    } else {
        Role::Opponent
    })
}

fn print_book(book: &SuperBook) {
    println!("Starting value: {:.6}", book.starting_value());
    for k in 1..=book.size() {
        println!("{} {:.6}", k, book.total_value(k) - book.starting_value());
    }

    let best_size = book.best_size();
    let best = book.book(best_size);
    println!("Best size: {} ({} moves)", best_size, best.len());
    for book_move in best.iter() {
        println!("{}", book_move);
    }
}
