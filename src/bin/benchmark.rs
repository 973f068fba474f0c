use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use simsweep::algorithm::{
    benchmark::{run_algorithm, Testcase},
    tiled::TileBackend,
    AlgorithmKind, AlignmentOptions,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum AlgorithmType {
    Exhaustive,
    Tiled,
    TiledSequential,
    LineCompare,
}

impl AlgorithmType {
    pub fn convert(self, tile_size: usize) -> (AlgorithmKind, AlignmentOptions) {
        let mut options = AlignmentOptions {
            tile_size,
            ..AlignmentOptions::default()
        };
        let kind = match self {
            AlgorithmType::Exhaustive => AlgorithmKind::Exhaustive,
            AlgorithmType::Tiled => AlgorithmKind::Tiled,
            AlgorithmType::TiledSequential => {
                options.backend = TileBackend::Sequential;
                AlgorithmKind::Tiled
            }
            AlgorithmType::LineCompare => AlgorithmKind::LineCompare,
        };
        (kind, options)
    }
}

#[derive(Parser)]
struct Args {
    #[arg(short, long, default_value_t = String::from(""))]
    filter: String,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 256)]
    tile_size: usize,

    #[arg(value_enum)]
    algorithms: Vec<AlgorithmType>,
}

const SIZES: [usize; 4] = [500, 2000, 5000, 10000];
const ALPHABETS: [usize; 2] = [16, 1000];
const RATE: f64 = 0.2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let regex = Regex::new(&args.filter)?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let mut testcases = vec![];
    for len in SIZES {
        for alphabet in ALPHABETS {
            // Generated before filtering so a case is the same whichever cases are selected.
            let testcase = Testcase::generate(&mut rng, format!("len{len}-alphabet{alphabet}"), len, alphabet, RATE);
            if regex.is_match(&testcase.name) {
                testcases.push(testcase);
            }
        }
    }

    for testcase in testcases {
        println!("Testcase {}", testcase.name);
        for algorithm in args.algorithms.iter() {
            let (kind, options) = algorithm.convert(args.tile_size);
            let measured = run_algorithm(&testcase, kind, &options)?;
            println!(
                "  {algorithm:?}: {:?} in {:.3}s, {} of {} tokens matched",
                measured.strategy,
                measured.elapsed.as_secs_f64(),
                measured.identical[0],
                testcase.sequences[0].len()
            );
        }
    }

    Ok(())
}
