use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[clap(author, version)]
#[clap(name = "Opening Repertoire Optimizer")]
#[clap(about = "Finds the opening moves most worth memorizing", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Generate(GenerateCommand),
    Tree(TreeCommand),
}

#[derive(Args)]
#[clap(about = "Builds the repertoire for every size up to the budget", long_about = None)]
pub struct GenerateCommand {
    #[clap(short, long, default_value_t = String::from("repertoire.conf"))]
    pub config: String,

    #[clap(short, long, value_enum)]
    pub side: Side,

    /// Root position. Defaults to the configured root, then the standard start position.
    #[clap(short, long)]
    pub root: Option<String>,

    #[clap(short, long)]
    pub budget: Option<usize>,

    /// Where to write every repertoire as JSON.
    #[clap(short, long)]
    pub output: Option<String>,

    /// Re-evaluate the most likely leaves with more time after building.
    #[clap(long)]
    pub refine: bool,
}

#[derive(Args)]
#[clap(about = "Builds the position tree and reports on the corpus", long_about = None)]
pub struct TreeCommand {
    #[clap(short, long, default_value_t = String::from("repertoire.conf"))]
    pub config: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn symbol(self) -> &'static str {
        match self {
            Side::White => "w",
            Side::Black => "b",
        }
    }
}
